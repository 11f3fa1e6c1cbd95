//! Diffie-Hellman key agreement over the 768 bit prime the message stream
//! encryption scheme fixes, with generator 2. Public keys and the shared
//! secret travel as 96 byte big-endian strings, left padded with zeros.

use num_bigint::BigUint;
use num_traits::Num;
use rand::{self, Rng};

/// Wire length of a public key and of the shared secret.
pub const KEY_LEN: usize = 96;

// 160 bits of private key are plenty against a 768 bit modulus.
const PRIVATE_KEY_LEN: usize = 20;

lazy_static! {
    static ref P: BigUint = BigUint::from_str_radix(
        "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
         020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
         4FE1356D6D51C245E485B576625E7EC6F44C42E9A63A36210000000000090563",
        16
    )
    .unwrap();
    static ref G: BigUint = BigUint::from(2u32);
}

/// Our half of a key agreement: an ephemeral private key plus the public
/// key derived from it.
pub struct DhLocalKeys {
    private: BigUint,
    public: [u8; KEY_LEN],
}

impl DhLocalKeys {
    /// Generate a fresh ephemeral key pair.
    pub fn generate() -> DhLocalKeys {
        let mut bytes = [0u8; PRIVATE_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);

        let private = BigUint::from_bytes_be(&bytes);
        let public = to_key_bytes(&G.modpow(&private, &P));

        DhLocalKeys { private, public }
    }

    /// Public key to send to the peer.
    pub fn public_key(&self) -> &[u8; KEY_LEN] {
        &self.public
    }

    /// Combine the peer's public key with our private key into the shared
    /// secret S.
    pub fn compute_secret(&self, peer_public: &[u8]) -> SharedSecret {
        let peer = BigUint::from_bytes_be(peer_public);

        SharedSecret {
            bytes: to_key_bytes(&peer.modpow(&self.private, &P)),
        }
    }
}

/// The agreed secret S, in its 96 byte wire representation.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret {
    bytes: [u8; KEY_LEN],
}

impl AsRef<[u8]> for SharedSecret {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

fn to_key_bytes(n: &BigUint) -> [u8; KEY_LEN] {
    let raw = n.to_bytes_be();
    let mut bytes = [0u8; KEY_LEN];

    bytes[KEY_LEN - raw.len()..].copy_from_slice(&raw);
    bytes
}
