use std::fmt;
use std::io::{self, Cursor, Write};
use std::net::SocketAddr;

use bytes::BytesMut;
use futures::{Async, Poll};
use tokio_io::try_nb;
use tokio_io::{AsyncRead, AsyncWrite};

use crate::crypto::dh::SharedSecret;
use crate::crypto::filter::{Rc4Filter, StreamKey};
use crate::types::InfoHash;

const READ_CHUNK: usize = 4 * 1024;

// We can't use the built in frames because they may buffer more bytes than
// the handshake owns. The leftover bytes after the handshake belong to the
// message layer, which receives this object with its buffers intact.
/// Byte stream object a handshake drives: buffered reads and writes over a
/// raw socket, with optional RC4 filters on either direction.
///
/// The read buffer always holds raw wire bytes; the inbound filter runs
/// when bytes are consumed, so peeking compares ciphertext. The outbound
/// filter runs when bytes are queued.
pub struct PeerIo<S> {
    sock: S,
    addr: SocketAddr,
    incoming: bool,
    utp: bool,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    encrypt: Option<Rc4Filter>,
    decrypt: Option<Rc4Filter>,
    torrent_hash: Option<InfoHash>,
    dht: bool,
    ltep: bool,
    fext: bool,
}

impl<S> fmt::Debug for PeerIo<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PeerIo")
            .field("addr", &self.addr)
            .field("incoming", &self.incoming)
            .field("utp", &self.utp)
            .field("torrent_hash", &self.torrent_hash)
            .field("dht", &self.dht)
            .field("ltep", &self.ltep)
            .field("fext", &self.fext)
            .finish()
    }
}

impl<S> PeerIo<S> {
    /// Wrap a socket accepted from a remote peer.
    pub fn incoming(sock: S, addr: SocketAddr) -> PeerIo<S> {
        PeerIo::new(sock, addr, true, false)
    }

    /// Wrap a socket we connected to a remote peer over TCP.
    pub fn outgoing(sock: S, addr: SocketAddr) -> PeerIo<S> {
        PeerIo::new(sock, addr, false, false)
    }

    /// Wrap a socket we connected to a remote peer over uTP.
    pub fn outgoing_utp(sock: S, addr: SocketAddr) -> PeerIo<S> {
        PeerIo::new(sock, addr, false, true)
    }

    fn new(sock: S, addr: SocketAddr, incoming: bool, utp: bool) -> PeerIo<S> {
        PeerIo {
            sock,
            addr,
            incoming,
            utp,
            read_buffer: BytesMut::new(),
            write_buffer: BytesMut::new(),
            encrypt: None,
            decrypt: None,
            torrent_hash: None,
            dht: false,
            ltep: false,
            fext: false,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_incoming(&self) -> bool {
        self.incoming
    }

    pub fn is_utp(&self) -> bool {
        self.utp
    }

    pub fn torrent_hash(&self) -> Option<InfoHash> {
        self.torrent_hash
    }

    pub fn set_torrent_hash(&mut self, hash: InfoHash) {
        self.torrent_hash = Some(hash);
    }

    /// Number of buffered bytes available for consumption.
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer.len()
    }

    /// Whether the raw (not yet decrypted) buffered bytes start with `needle`.
    pub fn read_buffer_starts_with(&self, needle: &[u8]) -> bool {
        self.read_buffer.len() >= needle.len() && self.read_buffer[..needle.len()] == *needle
    }

    /// Throw away `len` buffered bytes, still running them through the
    /// inbound filter so its keystream stays aligned with the peer's.
    pub fn read_buffer_drain(&mut self, len: usize) {
        let mut drained = self.read_buffer.split_to(len);

        if let Some(filter) = self.decrypt.as_mut() {
            filter.apply(&mut drained);
        }
    }

    /// Consume exactly `dst.len()` buffered bytes, decrypted if an inbound
    /// filter is installed. The caller checks availability first.
    pub fn read_bytes(&mut self, dst: &mut [u8]) {
        let mut taken = self.read_buffer.split_to(dst.len());

        if let Some(filter) = self.decrypt.as_mut() {
            filter.apply(&mut taken);
        }

        dst.copy_from_slice(&taken);
    }

    pub fn read_u32_be(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.read_bytes(&mut bytes);

        u32::from_be_bytes(bytes)
    }

    pub fn read_u16_be(&mut self) -> u16 {
        let mut bytes = [0u8; 2];
        self.read_bytes(&mut bytes);

        u16::from_be_bytes(bytes)
    }

    /// Queue bytes for the peer, encrypted if an outbound filter is
    /// installed. Flushing happens asynchronously via `poll_flush`.
    pub fn write(&mut self, bytes: &[u8]) {
        match self.encrypt.as_mut() {
            Some(filter) => {
                let mut sealed = bytes.to_vec();
                filter.apply(&mut sealed);

                self.write_buffer.extend_from_slice(&sealed);
            }
            None => self.write_buffer.extend_from_slice(bytes),
        }
    }

    /// Install the outbound filter; everything written from here on is
    /// encrypted.
    pub fn encrypt_init(&mut self, secret: &SharedSecret, skey: &InfoHash) {
        let key = StreamKey::encrypt_for(self.incoming);

        self.encrypt = Some(Rc4Filter::new(key, secret, skey));
    }

    /// Install the inbound filter; everything consumed from here on is
    /// decrypted.
    pub fn decrypt_init(&mut self, secret: &SharedSecret, skey: &InfoHash) {
        let key = StreamKey::decrypt_for(self.incoming);

        self.decrypt = Some(Rc4Filter::new(key, secret, skey));
    }

    /// Drop the outbound filter only; queued ciphertext is left as is.
    pub fn drop_encrypt(&mut self) {
        self.encrypt = None;
    }

    /// Drop the filters on both directions; the stream continues in the
    /// clear.
    pub fn teardown_crypto(&mut self) {
        self.encrypt = None;
        self.decrypt = None;
    }

    pub fn enable_dht(&mut self, on: bool) {
        self.dht = on;
    }

    pub fn dht_enabled(&self) -> bool {
        self.dht
    }

    pub fn enable_ltep(&mut self, on: bool) {
        self.ltep = on;
    }

    pub fn ltep_enabled(&self) -> bool {
        self.ltep
    }

    pub fn enable_fext(&mut self, on: bool) {
        self.fext = on;
    }

    pub fn fext_enabled(&self) -> bool {
        self.fext
    }

    /// Swap in a freshly connected socket, discarding buffered bytes and
    /// any installed filters. The replacement is always plain TCP.
    pub fn replace_socket(&mut self, sock: S) {
        self.sock = sock;
        self.utp = false;
        self.read_buffer = BytesMut::new();
        self.write_buffer = BytesMut::new();
        self.encrypt = None;
        self.decrypt = None;
    }
}

impl<S> PeerIo<S>
where
    S: AsyncRead,
{
    /// Pull more bytes from the socket into the read buffer.
    ///
    /// Resolves with the number of bytes read; zero means the peer closed
    /// the connection.
    pub fn poll_fill(&mut self) -> Poll<usize, io::Error> {
        self.read_buffer.reserve(READ_CHUNK);

        self.sock.read_buf(&mut self.read_buffer)
    }
}

impl<S> PeerIo<S>
where
    S: AsyncWrite,
{
    /// Push queued bytes out to the socket.
    pub fn poll_flush(&mut self) -> Poll<(), io::Error> {
        while !self.write_buffer.is_empty() {
            let write_result = self.sock.write_buf(&mut Cursor::new(&self.write_buffer));

            match try_nb!(write_result) {
                Async::Ready(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "Failed To Write Bytes",
                    ))
                }
                Async::Ready(written) => {
                    self.write_buffer.split_to(written);
                }
                Async::NotReady => return Ok(Async::NotReady),
            }
        }

        try_nb!(self.sock.flush());

        Ok(Async::Ready(()))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::PeerIo;
    use crate::crypto::dh::DhLocalKeys;
    use crate::types::InfoHash;

    fn any_addr() -> SocketAddr {
        "127.0.0.1:6889".parse().unwrap()
    }

    fn connected_pair() -> (PeerIo<Vec<u8>>, PeerIo<Vec<u8>>) {
        // The sockets are never polled in these tests, a plain sink works.
        (
            PeerIo::outgoing(Vec::new(), any_addr()),
            PeerIo::incoming(Vec::new(), any_addr()),
        )
    }

    fn feed<S>(io: &mut PeerIo<S>, bytes: &[u8]) {
        io.read_buffer.extend_from_slice(bytes);
    }

    #[test]
    fn positive_reads_consume_in_order() {
        let (mut io, _) = connected_pair();
        feed(&mut io, &[0, 0, 1, 5, 0, 3, 9]);

        assert_eq!(7, io.read_buffer_size());
        assert_eq!(261, io.read_u32_be());
        assert_eq!(3, io.read_u16_be());

        let mut last = [0u8; 1];
        io.read_bytes(&mut last);
        assert_eq!([9], last);
        assert_eq!(0, io.read_buffer_size());
    }

    #[test]
    fn positive_peek_sees_raw_bytes_under_decryption() {
        let (mut alice, mut bob) = connected_pair();
        let secret = DhLocalKeys::generate().compute_secret(DhLocalKeys::generate().public_key());
        let skey = InfoHash::from([1u8; 20]);

        alice.encrypt_init(&secret, &skey);
        alice.write(b"sealed");
        let wire = alice.write_buffer.to_vec();
        assert_ne!(&wire[..], b"sealed");

        feed(&mut bob, &wire);
        assert!(bob.read_buffer_starts_with(&wire));

        bob.decrypt_init(&secret, &skey);
        let mut opened = [0u8; 6];
        bob.read_bytes(&mut opened);
        assert_eq!(b"sealed", &opened);
    }

    #[test]
    fn positive_drain_advances_keystream() {
        let (mut alice, mut bob) = connected_pair();
        let secret = DhLocalKeys::generate().compute_secret(DhLocalKeys::generate().public_key());
        let skey = InfoHash::from([1u8; 20]);

        alice.encrypt_init(&secret, &skey);
        alice.write(b"padpadpad");
        alice.write(b"payload");

        bob.decrypt_init(&secret, &skey);
        feed(&mut bob, &alice.write_buffer.to_vec());

        bob.read_buffer_drain(9);

        let mut opened = [0u8; 7];
        bob.read_bytes(&mut opened);
        assert_eq!(b"payload", &opened);
    }

    #[test]
    fn positive_replace_socket_clears_state() {
        let (mut io, _) = connected_pair();
        let secret = DhLocalKeys::generate().compute_secret(DhLocalKeys::generate().public_key());
        let skey = InfoHash::from([1u8; 20]);

        feed(&mut io, b"stale");
        io.encrypt_init(&secret, &skey);
        io.replace_socket(Vec::new());

        assert_eq!(0, io.read_buffer_size());
        io.write(b"plain");
        assert_eq!(b"plain", &io.write_buffer[..]);
    }
}
