//! RC4 stream filters applied to handshake and payload traffic once the
//! encrypted handshake has keyed them.

use rc4::cipher::StreamCipherCoreWrapper;
use rc4::consts::U20;
use rc4::{KeyInit, Rc4, Rc4Core, StreamCipher};

use crate::crypto::dh::SharedSecret;
use crate::crypto::sha1_parts;
use crate::types::InfoHash;

type Rc4Cipher = StreamCipherCoreWrapper<Rc4Core<U20>>;

// The scheme discards the head of the keystream to sidestep the classic
// weak RC4 key schedule bytes.
const KEYSTREAM_DISCARD: usize = 1024;

/// Which of the two directional keystreams a filter runs on.
///
/// `KeyA` keys the initiator-to-receiver stream, `KeyB` the reverse one.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StreamKey {
    KeyA,
    KeyB,
}

impl StreamKey {
    /// Keystream that encrypts bytes leaving a side of the connection.
    pub fn encrypt_for(incoming: bool) -> StreamKey {
        if incoming {
            StreamKey::KeyB
        } else {
            StreamKey::KeyA
        }
    }

    /// Keystream that decrypts bytes arriving at a side of the connection.
    pub fn decrypt_for(incoming: bool) -> StreamKey {
        if incoming {
            StreamKey::KeyA
        } else {
            StreamKey::KeyB
        }
    }

    fn label(self) -> &'static [u8; 4] {
        match self {
            StreamKey::KeyA => b"keyA",
            StreamKey::KeyB => b"keyB",
        }
    }
}

/// One direction of an RC4 encrypted stream, keyed from the shared secret
/// and the torrent the connection authenticated on.
pub struct Rc4Filter {
    cipher: Rc4Cipher,
}

impl Rc4Filter {
    pub fn new(key: StreamKey, secret: &SharedSecret, skey: &InfoHash) -> Rc4Filter {
        let digest = sha1_parts(&[key.label(), secret.as_ref(), skey.as_ref()]);

        let mut cipher = Rc4::<U20>::new((&digest[..]).into());
        let mut discard = [0u8; KEYSTREAM_DISCARD];
        cipher.apply_keystream(&mut discard);

        Rc4Filter { cipher }
    }

    /// Encrypt or decrypt `buf` in place, advancing the keystream.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
    }
}
