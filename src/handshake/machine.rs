//! The per connection handshake session: a state machine fed by readable
//! bytes that authenticates both sides on a torrent, optionally bootstraps
//! message stream encryption, and hands the connection off to the message
//! layer.

use std::io;

use futures::{Async, Future, Poll};
use rand::{self, Rng};
use tokio_io::{AsyncRead, AsyncWrite};
use tokio_timer::Sleep;

use crate::crypto::dh::{DhLocalKeys, SharedSecret, KEY_LEN};
use crate::crypto::filter::{Rc4Filter, StreamKey};
use crate::crypto::sha1_parts;
use crate::error::{HandshakeError, HandshakeErrorKind, HandshakeResult};
use crate::handshake::config::{EncryptionMode, HandshakerConfig};
use crate::handshake::timer::HandshakeTimer;
use crate::mediator::Mediator;
use crate::message::complete::CompleteMessage;
use crate::message::extensions::{Extensions, NUM_EXTENSION_BYTES};
use crate::message::handshake::{HandshakeMessage, BT_HANDSHAKE_LEN};
use crate::message::protocol::{Protocol, BT_MAGIC};
use crate::peer_io::PeerIo;
use crate::transport::{Reconnector, SocketFuture};
use crate::types::{InfoHash, PeerId, INFO_HASH_LEN, PEER_ID_LEN};

/// Crypto bitmask flag for an unencrypted stream.
pub const CRYPTO_PLAINTEXT: u32 = 0x01;
/// Crypto bitmask flag for an RC4 encrypted stream.
pub const CRYPTO_RC4: u32 = 0x02;

/// Verification constant separating the random key exchange padding from
/// the encrypted payload that follows it.
pub const VC: [u8; 8] = [0u8; 8];

/// Upper bound on every padding segment of the key exchange.
pub const PAD_MAX: usize = 512;

// Magic, reserved bytes and info-hash; the peer id is read on its own so
// incoming connections can be dispatched before it arrives.
const PLAIN_PREFIX_LEN: usize = 48;

// Obfuscated hash, VC, crypto_provide and the Pad C length.
const CRYPTO_PROVIDE_LEN: usize = INFO_HASH_LEN + 8 + 4 + 2;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum State {
    AwaitingHandshake,
    AwaitingPeerId,
    AwaitingYa,
    AwaitingPadA,
    AwaitingCryptoProvide,
    AwaitingPadC,
    AwaitingIa,
    AwaitingPayloadStream,
    AwaitingYb,
    AwaitingVc,
    AwaitingCryptoSelect,
    AwaitingPadD,
}

/// What a state handler decided about the bytes it was offered.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum ReadState {
    /// State advanced, run the next handler immediately.
    ReadNow,
    /// Not enough bytes buffered, resume when more arrive.
    ReadLater,
    /// Terminal success.
    Finished,
}

/// A single peer handshake, driven to completion as a `Future`.
///
/// Resolves with a [`CompleteMessage`] carrying the peer io (ciphers still
/// installed when RC4 was negotiated) once both sides authenticated on the
/// torrent, or with a [`HandshakeError`](crate::HandshakeError) otherwise.
pub struct Handshake<S, M> {
    inner: Option<Inner<S, M>>,
}

impl<S, M> Handshake<S, M>
where
    S: AsyncRead + AsyncWrite,
    M: Mediator,
{
    /// Start a handshake on a connection we dialed, expecting `hash`.
    ///
    /// Whether the session opens with a key exchange or a plain handshake
    /// follows the configured [`EncryptionMode`].
    pub fn initiate(
        mut peer_io: PeerIo<S>,
        hash: InfoHash,
        mediator: M,
        config: HandshakerConfig,
    ) -> HandshakeResult<Handshake<S, M>> {
        peer_io.set_torrent_hash(hash);

        let mut inner = Inner::new(peer_io, mediator, config);
        if inner.encryption_mode == EncryptionMode::ClearPreferred {
            inner.send_plain_handshake()?;
        } else {
            inner.send_ya();
        }

        Ok(Handshake { inner: Some(inner) })
    }

    /// Start a handshake on a connection a remote peer opened with us.
    pub fn accept(peer_io: PeerIo<S>, mediator: M, config: HandshakerConfig) -> Handshake<S, M> {
        Handshake {
            inner: Some(Inner::new(peer_io, mediator, config)),
        }
    }

    /// Install a redial hook, enabling the plaintext and TCP fallbacks for
    /// outgoing sessions that hit a transport error mid key exchange.
    pub fn with_reconnect(mut self, reconnect: Reconnector<S>) -> Handshake<S, M> {
        if let Some(inner) = self.inner.as_mut() {
            inner.reconnect = Some(reconnect);
        }

        self
    }
}

impl<S, M> Future for Handshake<S, M>
where
    S: AsyncRead + AsyncWrite,
    M: Mediator,
{
    type Item = CompleteMessage<S>;
    type Error = HandshakeError;

    fn poll(&mut self) -> Poll<CompleteMessage<S>, HandshakeError> {
        let mut inner = self
            .inner
            .take()
            .expect("mse_handshake: Handshake Polled After Completion");

        match inner.poll_step() {
            Ok(Async::Ready(())) => Ok(Async::Ready(inner.into_complete())),
            Ok(Async::NotReady) => {
                self.inner = Some(inner);

                Ok(Async::NotReady)
            }
            Err(error) => {
                debug!(
                    "mse_handshake: [{}] handshake failed: {}",
                    inner.peer_io.address(),
                    error
                );

                Err(error)
            }
        }
    }
}

struct Inner<S, M> {
    peer_io: PeerIo<S>,
    mediator: M,
    encryption_mode: EncryptionMode,
    state: State,
    dh: DhLocalKeys,
    secret: Option<SharedSecret>,
    peer_extensions: Extensions,
    peer_id: Option<PeerId>,
    have_sent_bt_handshake: bool,
    have_read_anything: bool,
    crypto_provide: u32,
    crypto_select: u32,
    pad_c_len: u16,
    pad_d_len: u16,
    ia_len: u16,
    pad_scan: usize,
    vc_needle: Option<[u8; 8]>,
    done: bool,
    reconnect: Option<Reconnector<S>>,
    pending_socket: Option<SocketFuture<S>>,
    timer: HandshakeTimer,
    deadline: Sleep,
}

impl<S, M> Inner<S, M>
where
    S: AsyncRead + AsyncWrite,
    M: Mediator,
{
    fn new(peer_io: PeerIo<S>, mediator: M, config: HandshakerConfig) -> Inner<S, M> {
        let dh = mediator.private_key();
        let timer = mediator.timer(config.handshake_timeout());
        let deadline = timer.sleep();

        Inner {
            peer_io,
            mediator,
            encryption_mode: config.encryption_mode(),
            state: State::AwaitingHandshake,
            dh,
            secret: None,
            peer_extensions: Extensions::new(),
            peer_id: None,
            have_sent_bt_handshake: false,
            have_read_anything: false,
            crypto_provide: 0,
            crypto_select: 0,
            pad_c_len: 0,
            pad_d_len: 0,
            ia_len: 0,
            pad_scan: 0,
            vc_needle: None,
            done: false,
            reconnect: None,
            pending_socket: None,
            timer,
            deadline,
        }
    }

    //----------------------------------------------------------------------------------//
    // Driver
    //----------------------------------------------------------------------------------//

    fn poll_step(&mut self) -> HandshakeResult<Async<()>> {
        // The deadline outranks everything, a stalled session must die.
        match self.deadline.poll() {
            Ok(Async::NotReady) => {}
            Ok(Async::Ready(())) => {
                warn!(
                    "mse_handshake: [{}] handshake timed out after {:?}",
                    self.peer_io.address(),
                    self.timer.duration()
                );

                return Err(HandshakeErrorKind::Timeout.into());
            }
            Err(error) => {
                warn!(
                    "mse_handshake: [{}] deadline timer failed: {}",
                    self.peer_io.address(),
                    error
                );

                return Err(HandshakeErrorKind::Timeout.into());
            }
        }

        if self.done {
            return self.flush_remaining();
        }

        loop {
            if let Some(mut pending) = self.pending_socket.take() {
                match pending.poll() {
                    Ok(Async::Ready(sock)) => self.resume_plaintext(sock)?,
                    Ok(Async::NotReady) => {
                        self.pending_socket = Some(pending);

                        return Ok(Async::NotReady);
                    }
                    Err(error) => return Err(error.into()),
                }
            }

            if let ReadState::Finished = self.drive()? {
                // Our half of the exchange may still sit in the write
                // buffer; it has to reach the wire before the handoff.
                self.done = true;

                return self.flush_remaining();
            }

            // Handlers want more bytes; move queued writes out and pull
            // whatever the socket has for us.
            if let Err(error) = self.peer_io.poll_flush() {
                self.recover(error)?;
                continue;
            }

            match self.peer_io.poll_fill() {
                Ok(Async::Ready(0)) => {
                    let error = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Peer Closed The Connection",
                    );

                    self.recover(error)?;
                }
                Ok(Async::Ready(_)) => {}
                Ok(Async::NotReady) => return Ok(Async::NotReady),
                Err(error) => self.recover(error)?,
            }
        }
    }

    fn flush_remaining(&mut self) -> HandshakeResult<Async<()>> {
        match self.peer_io.poll_flush() {
            Ok(Async::Ready(())) => Ok(Async::Ready(())),
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Err(error) => Err(error.into()),
        }
    }

    fn drive(&mut self) -> HandshakeResult<ReadState> {
        loop {
            let ret = match self.state {
                State::AwaitingHandshake => self.read_handshake()?,
                State::AwaitingPeerId => self.read_peer_id()?,
                State::AwaitingYa => self.read_ya()?,
                State::AwaitingPadA => self.read_pad_a()?,
                State::AwaitingCryptoProvide => self.read_crypto_provide()?,
                State::AwaitingPadC => self.read_pad_c()?,
                State::AwaitingIa => self.read_ia()?,
                State::AwaitingPayloadStream => self.read_payload_stream()?,
                State::AwaitingYb => self.read_yb()?,
                State::AwaitingVc => self.read_vc()?,
                State::AwaitingCryptoSelect => self.read_crypto_select()?,
                State::AwaitingPadD => self.read_pad_d()?,
            };

            match ret {
                ReadState::ReadNow => {
                    // Re-entering a length prefixed state before the bytes
                    // are buffered would just spin on short reads.
                    let gated = match self.state {
                        State::AwaitingPadC => Some(self.pad_c_len as usize),
                        State::AwaitingPadD => Some(self.pad_d_len as usize),
                        State::AwaitingIa => Some(self.ia_len as usize),
                        _ => None,
                    };

                    if let Some(needed) = gated {
                        if self.peer_io.read_buffer_size() < needed {
                            return Ok(ReadState::ReadLater);
                        }
                    }
                }
                other => return Ok(other),
            }
        }
    }

    fn set_state(&mut self, state: State) {
        debug!(
            "mse_handshake: [{}] {:?} -> {:?}",
            self.peer_io.address(),
            self.state,
            state
        );

        self.state = state;
    }

    fn into_complete(self) -> CompleteMessage<S> {
        let addr = self.peer_io.address();
        let hash = self
            .peer_io
            .torrent_hash()
            .expect("mse_handshake: Handshake Completed Without A Bound Torrent");
        let pid = self
            .peer_id
            .expect("mse_handshake: Handshake Completed Without A Peer Id");

        CompleteMessage::new(self.peer_extensions, hash, pid, addr, self.peer_io)
    }

    //----------------------------------------------------------------------------------//
    // Failure recovery
    //----------------------------------------------------------------------------------//

    /// Decide whether a transport error is worth a fresh connection; on
    /// `Ok(())` a reconnect is pending, otherwise the error is terminal.
    fn recover(&mut self, error: io::Error) -> HandshakeResult<()> {
        let addr = self.peer_io.address();
        if !self.have_read_anything {
            debug!(
                "mse_handshake: [{}] transport error before the peer sent anything: {}",
                addr, error
            );
        }

        let mid_key_exchange =
            self.state == State::AwaitingYb || self.state == State::AwaitingVc;
        if self.peer_io.is_incoming() || !mid_key_exchange {
            return Err(error.into());
        }

        // The peer probably doesn't speak uTP. Only a connect style failure
        // justifies remembering that, and only for a torrent we still have.
        if self.peer_io.is_utp() && self.state == State::AwaitingYb {
            let connect_failure = error.kind() == io::ErrorKind::TimedOut
                || error.kind() == io::ErrorKind::ConnectionRefused;
            if connect_failure {
                if let Some(hash) = self.peer_io.torrent_hash() {
                    if self.mediator.torrent_info(&hash).is_some() {
                        self.mediator.set_utp_failed(&hash, addr);
                    }
                }
            }

            if self.mediator.allows_tcp() && self.begin_reconnect() {
                return Ok(());
            }
        }

        // An error while we were sending a public key may mean the peer
        // doesn't do encryption at all; redial and try plaintext.
        if self.encryption_mode != EncryptionMode::Required
            && self.mediator.allows_tcp()
            && self.begin_reconnect()
        {
            return Ok(());
        }

        Err(error.into())
    }

    fn begin_reconnect(&mut self) -> bool {
        match self.reconnect.as_mut() {
            Some(connect) => {
                debug!(
                    "mse_handshake: [{}] handshake failed, redialing for plaintext",
                    self.peer_io.address()
                );
                self.pending_socket = Some(connect());

                true
            }
            None => false,
        }
    }

    /// A replacement socket arrived; skip the key exchange and open with
    /// the plain handshake.
    fn resume_plaintext(&mut self, sock: S) -> HandshakeResult<()> {
        info!(
            "mse_handshake: [{}] retrying with a plain handshake",
            self.peer_io.address()
        );

        self.peer_io.replace_socket(sock);
        self.secret = None;
        self.vc_needle = None;
        self.pad_scan = 0;
        self.send_plain_handshake()?;

        Ok(())
    }

    //----------------------------------------------------------------------------------//
    // Outgoing key exchange
    //----------------------------------------------------------------------------------//

    // 1 A->B: our public key (Ya) and some padding (Pad A)
    fn send_ya(&mut self) {
        debug!(
            "mse_handshake: [{}] sending A->B: Diffie Hellman Ya, Pad A",
            self.peer_io.address()
        );

        self.send_public_key_and_pad();
        self.set_state(State::AwaitingYb);
    }

    fn read_yb(&mut self) -> HandshakeResult<ReadState> {
        if self.peer_io.read_buffer_size() < BT_MAGIC.len() {
            return Ok(ReadState::ReadLater);
        }

        // An unencrypted peer answers Ya with its plain handshake.
        if self.peer_io.read_buffer_starts_with(&BT_MAGIC[..]) {
            debug!(
                "mse_handshake: [{}] got a plain handshake",
                self.peer_io.address()
            );
            self.set_state(State::AwaitingHandshake);

            return Ok(ReadState::ReadNow);
        }

        if self.peer_io.read_buffer_size() < KEY_LEN {
            return Ok(ReadState::ReadLater);
        }

        debug!(
            "mse_handshake: [{}] got an encrypted handshake",
            self.peer_io.address()
        );
        self.have_read_anything = true;

        let mut peer_public = [0u8; KEY_LEN];
        self.peer_io.read_bytes(&mut peer_public);
        let secret = self.dh.compute_secret(&peer_public);

        let hash = self
            .peer_io
            .torrent_hash()
            .expect("mse_handshake: Outgoing Handshake Requires An Info Hash");

        // 3 A->B: HASH('req1', S), HASH('req2', SKEY) xor HASH('req3', S),
        //         ENCRYPT(VC, crypto_provide, len(PadC), PadC, len(IA)), ENCRYPT(IA)
        self.peer_io.write(&sha1_parts(&[b"req1", secret.as_ref()]));

        let req2 = InfoHash::from(sha1_parts(&[b"req2", hash.as_ref()]));
        let req3 = InfoHash::from(sha1_parts(&[b"req3", secret.as_ref()]));
        self.peer_io.write((req2 ^ req3).as_ref());

        // Everything from the VC on goes out through the cipher.
        self.peer_io.encrypt_init(&secret, &hash);

        self.crypto_provide = crypto_provide_mask(self.encryption_mode);

        let message = self.build_handshake_message()?;
        let mut sealed = Vec::with_capacity(VC.len() + 4 + 2 + 2 + message.len());
        sealed.extend_from_slice(&VC);
        sealed.extend_from_slice(&self.crypto_provide.to_be_bytes());
        // Pad C is reserved for future extensions, standard practice is to
        // send none.
        sealed.extend_from_slice(&0u16.to_be_bytes());
        sealed.extend_from_slice(&(message.len() as u16).to_be_bytes());
        sealed.extend_from_slice(&message);

        self.peer_io.write(&sealed);
        self.have_sent_bt_handshake = true;

        // Expected ENCRYPT(VC) for resynchronizing after Pad B.
        let mut needle = VC;
        let key = StreamKey::decrypt_for(self.peer_io.is_incoming());
        Rc4Filter::new(key, &secret, &hash).apply(&mut needle);
        self.vc_needle = Some(needle);

        self.secret = Some(secret);
        self.pad_scan = 0;
        self.set_state(State::AwaitingVc);

        Ok(ReadState::ReadNow)
    }

    // "Since the length of [Pad B is] unknown, A will be able to
    // resynchronize on ENCRYPT(VC)"
    fn read_vc(&mut self) -> HandshakeResult<ReadState> {
        let needle = self
            .vc_needle
            .expect("mse_handshake: Awaiting VC Without A Computed Needle");

        loop {
            if self.peer_io.read_buffer_size() < needle.len() {
                return Ok(ReadState::ReadLater);
            }

            if self.peer_io.read_buffer_starts_with(&needle) {
                debug!(
                    "mse_handshake: [{}] found ENCRYPT(VC)",
                    self.peer_io.address()
                );

                let secret = self
                    .secret
                    .clone()
                    .expect("mse_handshake: Awaiting VC Without A Shared Secret");
                let hash = self
                    .peer_io
                    .torrent_hash()
                    .expect("mse_handshake: Awaiting VC Without An Info Hash");

                // Consume the constant through the fresh filter so the
                // keystream lines up with the peer's.
                self.peer_io.decrypt_init(&secret, &hash);
                let mut vc = [0u8; 8];
                self.peer_io.read_bytes(&mut vc);

                self.set_state(State::AwaitingCryptoSelect);
                return Ok(ReadState::ReadNow);
            }

            if self.pad_scan == PAD_MAX {
                debug!(
                    "mse_handshake: [{}] couldn't find ENCRYPT(VC)",
                    self.peer_io.address()
                );

                return Err(HandshakeErrorKind::ProtocolViolation(
                    "Could Not Find The Verification Constant Within 512 Bytes".into(),
                )
                .into());
            }

            self.peer_io.read_buffer_drain(1);
            self.pad_scan += 1;
        }
    }

    fn read_crypto_select(&mut self) -> HandshakeResult<ReadState> {
        if self.peer_io.read_buffer_size() < 4 + 2 {
            return Ok(ReadState::ReadLater);
        }

        let crypto_select = self.peer_io.read_u32_be();
        debug!(
            "mse_handshake: [{}] crypto select is {}",
            self.peer_io.address(),
            crypto_select
        );

        if crypto_select & self.crypto_provide == 0 {
            debug!(
                "mse_handshake: [{}] peer selected an encryption option we didn't offer",
                self.peer_io.address()
            );

            return Err(HandshakeErrorKind::ProtocolViolation(
                "Crypto Select Not Within Crypto Provide".into(),
            )
            .into());
        }

        let pad_d_len = self.peer_io.read_u16_be();
        debug!(
            "mse_handshake: [{}] pad_d_len is {}",
            self.peer_io.address(),
            pad_d_len
        );

        if pad_d_len > PAD_MAX as u16 {
            return Err(HandshakeErrorKind::ProtocolViolation(format!(
                "Pad D Length {} Is Too Long",
                pad_d_len
            ))
            .into());
        }

        self.crypto_select = crypto_select;
        self.pad_d_len = pad_d_len;
        self.set_state(State::AwaitingPadD);

        Ok(ReadState::ReadNow)
    }

    fn read_pad_d(&mut self) -> HandshakeResult<ReadState> {
        let needed = self.pad_d_len as usize;
        if self.peer_io.read_buffer_size() < needed {
            return Ok(ReadState::ReadLater);
        }

        self.peer_io.read_buffer_drain(needed);

        if self.crypto_select == CRYPTO_PLAINTEXT {
            // The peer chose cleartext, both keystreams end here.
            self.peer_io.teardown_crypto();
        }

        self.set_state(State::AwaitingHandshake);

        Ok(ReadState::ReadNow)
    }

    //----------------------------------------------------------------------------------//
    // Incoming key exchange
    //----------------------------------------------------------------------------------//

    fn read_ya(&mut self) -> HandshakeResult<ReadState> {
        if self.peer_io.read_buffer_size() < KEY_LEN {
            return Ok(ReadState::ReadLater);
        }

        let mut peer_public = [0u8; KEY_LEN];
        self.peer_io.read_bytes(&mut peer_public);
        self.secret = Some(self.dh.compute_secret(&peer_public));

        // 2 B->A: our public key (Yb) and some padding (Pad B)
        debug!(
            "mse_handshake: [{}] sending B->A: Diffie Hellman Yb, Pad B",
            self.peer_io.address()
        );
        self.send_public_key_and_pad();

        self.pad_scan = 0;
        self.set_state(State::AwaitingPadA);

        Ok(ReadState::ReadNow)
    }

    fn read_pad_a(&mut self) -> HandshakeResult<ReadState> {
        let secret = self
            .secret
            .clone()
            .expect("mse_handshake: Awaiting Pad A Without A Shared Secret");

        // Find the end of Pad A by looking for HASH('req1', S).
        let needle = sha1_parts(&[b"req1", secret.as_ref()]);

        loop {
            if self.peer_io.read_buffer_size() < needle.len() {
                return Ok(ReadState::ReadLater);
            }

            if self.peer_io.read_buffer_starts_with(&needle) {
                debug!(
                    "mse_handshake: [{}] found HASH('req1', S)",
                    self.peer_io.address()
                );

                self.peer_io.read_buffer_drain(needle.len());
                self.set_state(State::AwaitingCryptoProvide);

                return Ok(ReadState::ReadNow);
            }

            if self.pad_scan == PAD_MAX {
                debug!(
                    "mse_handshake: [{}] couldn't find HASH('req1', S)",
                    self.peer_io.address()
                );

                return Err(HandshakeErrorKind::ProtocolViolation(
                    "Could Not Find The Req1 Hash Within 512 Bytes".into(),
                )
                .into());
            }

            self.peer_io.read_buffer_drain(1);
            self.pad_scan += 1;
        }
    }

    fn read_crypto_provide(&mut self) -> HandshakeResult<ReadState> {
        if self.peer_io.read_buffer_size() < CRYPTO_PROVIDE_LEN {
            return Ok(ReadState::ReadLater);
        }

        // HASH('req2', SKEY) xor HASH('req3', S): building the latter and
        // xoring recovers the obfuscated torrent hash the peer wants.
        let mut req2_xor = [0u8; INFO_HASH_LEN];
        self.peer_io.read_bytes(&mut req2_xor);

        let secret = self
            .secret
            .clone()
            .expect("mse_handshake: Awaiting Crypto Provide Without A Shared Secret");
        let req3 = InfoHash::from(sha1_parts(&[b"req3", secret.as_ref()]));
        let obfuscated = InfoHash::from(req2_xor) ^ req3;

        let info = match self.mediator.torrent_info_from_obfuscated(&obfuscated) {
            Some(info) => info,
            None => {
                debug!(
                    "mse_handshake: [{}] can't find that torrent",
                    self.peer_io.address()
                );

                return Err(HandshakeErrorKind::BadTorrent.into());
            }
        };

        debug!(
            "mse_handshake: [{}] got an encrypted handshake for torrent {:?}",
            self.peer_io.address(),
            info.info_hash
        );
        self.peer_io.set_torrent_hash(info.info_hash);

        if info.is_done && self.mediator.is_peer_known_seed(info.id, self.peer_io.address()) {
            debug!(
                "mse_handshake: [{}] another seed tried to reconnect to us",
                self.peer_io.address()
            );

            return Err(HandshakeErrorKind::BothSeeds.into());
        }

        // ENCRYPT(VC, crypto_provide, len(PadC))
        self.peer_io.decrypt_init(&secret, &info.info_hash);

        let mut vc = [0u8; 8];
        self.peer_io.read_bytes(&mut vc);

        self.crypto_provide = self.peer_io.read_u32_be();
        debug!(
            "mse_handshake: [{}] crypto_provide is {}",
            self.peer_io.address(),
            self.crypto_provide
        );

        let pad_c_len = self.peer_io.read_u16_be();
        if pad_c_len > PAD_MAX as u16 {
            return Err(HandshakeErrorKind::ProtocolViolation(format!(
                "Pad C Length {} Is Too Long",
                pad_c_len
            ))
            .into());
        }

        self.pad_c_len = pad_c_len;
        self.set_state(State::AwaitingPadC);

        Ok(ReadState::ReadNow)
    }

    fn read_pad_c(&mut self) -> HandshakeResult<ReadState> {
        let needed = self.pad_c_len as usize + 2;
        if self.peer_io.read_buffer_size() < needed {
            return Ok(ReadState::ReadLater);
        }

        self.peer_io.read_buffer_drain(self.pad_c_len as usize);

        self.ia_len = self.peer_io.read_u16_be();
        debug!(
            "mse_handshake: [{}] ia_len is {}",
            self.peer_io.address(),
            self.ia_len
        );
        self.set_state(State::AwaitingIa);

        Ok(ReadState::ReadNow)
    }

    fn read_ia(&mut self) -> HandshakeResult<ReadState> {
        if self.peer_io.read_buffer_size() < self.ia_len as usize {
            return Ok(ReadState::ReadLater);
        }

        let secret = self
            .secret
            .clone()
            .expect("mse_handshake: Awaiting IA Without A Shared Secret");
        let hash = self
            .peer_io
            .torrent_hash()
            .expect("mse_handshake: Awaiting IA Without An Info Hash");

        let crypto_select = select_crypto(self.encryption_mode, self.crypto_provide);
        if crypto_select == 0 {
            debug!(
                "mse_handshake: [{}] peer didn't offer an encryption mode we like",
                self.peer_io.address()
            );

            return Err(HandshakeErrorKind::ProtocolViolation(
                "No Mutually Supported Encryption Mode".into(),
            )
            .into());
        }

        debug!(
            "mse_handshake: [{}] selecting crypto mode {}",
            self.peer_io.address(),
            crypto_select
        );
        self.crypto_select = crypto_select;

        // 4 B->A: ENCRYPT(VC, crypto_select, len(PadD), PadD)
        self.peer_io.encrypt_init(&secret, &hash);

        let mut reply = Vec::with_capacity(VC.len() + 4 + 2);
        reply.extend_from_slice(&VC);
        reply.extend_from_slice(&crypto_select.to_be_bytes());
        // Pad D is reserved for future extensions, standard practice is to
        // send none.
        reply.extend_from_slice(&0u16.to_be_bytes());
        self.peer_io.write(&reply);

        if crypto_select == CRYPTO_PLAINTEXT {
            // The reply above stays ciphertext, our handshake and the
            // payload stream continue in the clear.
            self.peer_io.drop_encrypt();
        }

        let message = self.build_handshake_message()?;
        self.peer_io.write(&message);
        self.have_sent_bt_handshake = true;

        self.set_state(State::AwaitingPayloadStream);

        Ok(ReadState::ReadNow)
    }

    fn read_payload_stream(&mut self) -> HandshakeResult<ReadState> {
        if self.peer_io.read_buffer_size() < BT_HANDSHAKE_LEN {
            return Ok(ReadState::ReadLater);
        }

        let mut raw = [0u8; BT_HANDSHAKE_LEN];
        self.peer_io.read_bytes(&mut raw);

        let message = match HandshakeMessage::from_bytes(&raw) {
            Ok((_, message)) => message,
            Err(_) => {
                debug!(
                    "mse_handshake: [{}] payload stream didn't decrypt to a handshake",
                    self.peer_io.address()
                );

                return Err(HandshakeErrorKind::EncryptionWrong.into());
            }
        };

        let (prot, ext, hash, pid) = message.into_parts();
        if prot != Protocol::BitTorrent {
            return Err(HandshakeErrorKind::EncryptionWrong.into());
        }

        self.enable_extensions(ext);

        if self.peer_io.torrent_hash() != Some(hash) {
            debug!(
                "mse_handshake: [{}] peer returned the wrong hash",
                self.peer_io.address()
            );

            return Err(HandshakeErrorKind::BadTorrent.into());
        }

        debug!(
            "mse_handshake: [{}] peer id is '{}'",
            self.peer_io.address(),
            pid
        );
        self.check_not_ourselves(pid)?;
        self.peer_id = Some(pid);

        Ok(ReadState::Finished)
    }

    //----------------------------------------------------------------------------------//
    // Plain handshake
    //----------------------------------------------------------------------------------//

    fn read_handshake(&mut self) -> HandshakeResult<ReadState> {
        debug!(
            "mse_handshake: [{}] payload: need {}, got {}",
            self.peer_io.address(),
            PLAIN_PREFIX_LEN,
            self.peer_io.read_buffer_size()
        );

        if self.peer_io.read_buffer_size() < PLAIN_PREFIX_LEN {
            return Ok(ReadState::ReadLater);
        }

        self.have_read_anything = true;

        // The raw peek only distinguishes a cleartext opening; on an
        // already encrypted stream the decrypted name check below decides.
        if self.peer_io.read_buffer_starts_with(&BT_MAGIC[..]) {
            if self.encryption_mode == EncryptionMode::Required {
                debug!(
                    "mse_handshake: [{}] peer is unencrypted, and we're disallowing that",
                    self.peer_io.address()
                );

                return Err(HandshakeErrorKind::EncryptionWrong.into());
            }
        } else if self.peer_io.is_incoming() {
            debug!(
                "mse_handshake: [{}] peer seems to be sending an encrypted handshake",
                self.peer_io.address()
            );

            self.pad_scan = 0;
            self.set_state(State::AwaitingYa);
            return Ok(ReadState::ReadNow);
        }

        let mut name = [0u8; 20];
        self.peer_io.read_bytes(&mut name);
        if name != *BT_MAGIC {
            return Err(HandshakeErrorKind::EncryptionWrong.into());
        }

        let mut reserved = [0u8; NUM_EXTENSION_BYTES];
        self.peer_io.read_bytes(&mut reserved);
        self.enable_extensions(Extensions::from(reserved));

        let mut hash_bytes = [0u8; INFO_HASH_LEN];
        self.peer_io.read_bytes(&mut hash_bytes);
        let hash = InfoHash::from(hash_bytes);

        if self.peer_io.is_incoming() {
            if self.mediator.torrent_info(&hash).is_none() {
                debug!(
                    "mse_handshake: [{}] peer wants a torrent we don't have",
                    self.peer_io.address()
                );

                return Err(HandshakeErrorKind::BadTorrent.into());
            }

            self.peer_io.set_torrent_hash(hash);
        } else if self.peer_io.torrent_hash() != Some(hash) {
            debug!(
                "mse_handshake: [{}] peer returned the wrong hash",
                self.peer_io.address()
            );

            return Err(HandshakeErrorKind::BadTorrent.into());
        }

        // An incoming peer is still waiting for our side of the exchange.
        if !self.have_sent_bt_handshake {
            let message = self.build_handshake_message()?;
            self.peer_io.write(&message);
            self.have_sent_bt_handshake = true;
        }

        self.set_state(State::AwaitingPeerId);

        Ok(ReadState::ReadNow)
    }

    fn read_peer_id(&mut self) -> HandshakeResult<ReadState> {
        if self.peer_io.read_buffer_size() < PEER_ID_LEN {
            return Ok(ReadState::ReadLater);
        }

        let mut id = [0u8; PEER_ID_LEN];
        self.peer_io.read_bytes(&mut id);
        let pid = PeerId::from(id);

        debug!(
            "mse_handshake: [{}] peer id is '{}'",
            self.peer_io.address(),
            pid
        );

        self.check_not_ourselves(pid)?;
        self.peer_id = Some(pid);

        Ok(ReadState::Finished)
    }

    //----------------------------------------------------------------------------------//
    // Shared pieces
    //----------------------------------------------------------------------------------//

    fn send_plain_handshake(&mut self) -> HandshakeResult<()> {
        let message = self.build_handshake_message()?;
        self.peer_io.write(&message);
        self.have_sent_bt_handshake = true;
        self.set_state(State::AwaitingHandshake);

        Ok(())
    }

    fn build_handshake_message(&self) -> HandshakeResult<Vec<u8>> {
        let hash = self
            .peer_io
            .torrent_hash()
            .expect("mse_handshake: Building A Handshake Requires A Bound Torrent");
        let info = self
            .mediator
            .torrent_info(&hash)
            .ok_or(HandshakeErrorKind::BadTorrent)?;

        let mut ext = Extensions::new();
        ext.set_ltep(true);
        ext.set_fext(true);
        // Advertising the DHT depends only on local policy, never on the
        // torrent; we don't accept DHT peers for a private torrent but we
        // participate in the DHT regardless.
        ext.set_dht(self.mediator.allows_dht());

        let message =
            HandshakeMessage::from_parts(Protocol::BitTorrent, ext, hash, info.client_peer_id);

        let mut buffer = Vec::with_capacity(message.write_len());
        message.write_bytes(&mut buffer)?;

        Ok(buffer)
    }

    fn send_public_key_and_pad(&mut self) {
        let public = *self.dh.public_key();
        self.peer_io.write(&public);

        let mut rng = rand::thread_rng();
        let mut pad = [0u8; PAD_MAX];
        let pad_len = rng.gen_range(0, PAD_MAX + 1);
        rng.fill_bytes(&mut pad[..pad_len]);

        self.peer_io.write(&pad[..pad_len]);
    }

    fn enable_extensions(&mut self, ext: Extensions) {
        self.peer_extensions = ext;
        self.peer_io.enable_dht(ext.has_dht());
        self.peer_io.enable_ltep(ext.has_ltep());
        self.peer_io.enable_fext(ext.has_fext());
    }

    fn check_not_ourselves(&self, pid: PeerId) -> HandshakeResult<()> {
        let hash = self
            .peer_io
            .torrent_hash()
            .expect("mse_handshake: Peer Id Arrived Without A Bound Torrent");

        if let Some(info) = self.mediator.torrent_info(&hash) {
            if info.client_peer_id == pid {
                debug!(
                    "mse_handshake: [{}] we've connected to ourselves",
                    self.peer_io.address()
                );

                return Err(HandshakeErrorKind::PeerIsSelf.into());
            }
        }

        Ok(())
    }
}

/// Bitmask of encryption options a side advertises for its mode.
fn crypto_provide_mask(mode: EncryptionMode) -> u32 {
    match mode {
        EncryptionMode::Required => CRYPTO_RC4,
        EncryptionMode::Preferred | EncryptionMode::ClearPreferred => {
            CRYPTO_RC4 | CRYPTO_PLAINTEXT
        }
    }
}

/// Pick the crypto option to answer `crypto_provide` with: the first entry
/// of the mode's preference order that the peer offered, or zero.
fn select_crypto(mode: EncryptionMode, crypto_provide: u32) -> u32 {
    let choices = match mode {
        EncryptionMode::Required => [CRYPTO_RC4, 0],
        EncryptionMode::Preferred => [CRYPTO_RC4, CRYPTO_PLAINTEXT],
        EncryptionMode::ClearPreferred => [CRYPTO_PLAINTEXT, CRYPTO_RC4],
    };

    for &choice in choices.iter() {
        if choice != 0 && crypto_provide & choice != 0 {
            return choice;
        }
    }

    0
}
