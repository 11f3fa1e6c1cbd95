//! Crypto primitives backing the encrypted handshake: SHA-1 tagging,
//! Diffie-Hellman key agreement, and the RC4 stream filters.

use sha1::{Digest, Sha1};

use crate::types::InfoHash;

pub mod dh;
pub mod filter;

/// SHA-1 over the concatenation of the given parts.
pub fn sha1_parts(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();

    for part in parts {
        hasher.update(part);
    }

    hasher.finalize().into()
}

/// `SHA1("req2" | info_hash)`, the value an encrypted handshake identifies a
/// torrent by without putting the info-hash itself on the wire.
///
/// Torrent tables that want to accept encrypted peers should index their
/// torrents by this value, see `Mediator::torrent_info_from_obfuscated`.
pub fn obfuscated_info_hash(hash: &InfoHash) -> InfoHash {
    InfoHash::from(sha1_parts(&[b"req2", hash.as_ref()]))
}

#[cfg(test)]
mod tests {
    use super::{obfuscated_info_hash, sha1_parts};
    use crate::types::InfoHash;

    #[test]
    fn positive_sha1_concatenation_is_order_sensitive() {
        let ab = sha1_parts(&[b"key", b"stream"]);
        let ba = sha1_parts(&[b"stream", b"key"]);
        let joined = sha1_parts(&[b"keystream"]);

        assert_eq!(ab, joined);
        assert_ne!(ab, ba);
    }

    #[test]
    fn positive_obfuscated_hash_differs_from_hash() {
        let hash = InfoHash::from([7u8; 20]);

        let obfuscated = obfuscated_info_hash(&hash);

        assert_ne!(hash, obfuscated);
        assert_eq!(obfuscated, obfuscated_info_hash(&hash));
    }
}
