use std::fmt;
use std::ops::BitXor;

/// Length of an info-hash.
pub const INFO_HASH_LEN: usize = 20;

/// Length of a peer id.
pub const PEER_ID_LEN: usize = 20;

/// SHA-1 of a torrent's info dictionary, identifying a swarm.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash {
    hash: [u8; INFO_HASH_LEN],
}

impl InfoHash {
    /// Create an `InfoHash` from a slice, which must be exactly 20 bytes.
    pub fn from_hash(hash: &[u8]) -> Option<InfoHash> {
        if hash.len() != INFO_HASH_LEN {
            return None;
        }

        let mut bytes = [0u8; INFO_HASH_LEN];
        bytes.copy_from_slice(hash);

        Some(InfoHash { hash: bytes })
    }
}

impl AsRef<[u8]> for InfoHash {
    fn as_ref(&self) -> &[u8] {
        &self.hash
    }
}

impl From<[u8; INFO_HASH_LEN]> for InfoHash {
    fn from(hash: [u8; INFO_HASH_LEN]) -> InfoHash {
        InfoHash { hash }
    }
}

impl Into<[u8; INFO_HASH_LEN]> for InfoHash {
    fn into(self) -> [u8; INFO_HASH_LEN] {
        self.hash
    }
}

impl PartialEq<[u8]> for InfoHash {
    fn eq(&self, other: &[u8]) -> bool {
        self.hash[..] == *other
    }
}

impl BitXor<InfoHash> for InfoHash {
    type Output = InfoHash;

    fn bitxor(mut self, rhs: InfoHash) -> InfoHash {
        for (dst, src) in self.hash.iter_mut().zip(rhs.hash.iter()) {
            *dst ^= *src;
        }

        self
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.hash {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

/// Id a peer advertises about itself during the handshake.
///
/// Most clients use an azureus style encoding, see
/// http://www.bittorrent.org/beps/bep_0020.html.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId {
    id: [u8; PEER_ID_LEN],
}

impl PeerId {
    /// Create a `PeerId` from a slice, which must be exactly 20 bytes.
    pub fn from_id(id: &[u8]) -> Option<PeerId> {
        if id.len() != PEER_ID_LEN {
            return None;
        }

        let mut bytes = [0u8; PEER_ID_LEN];
        bytes.copy_from_slice(id);

        Some(PeerId { id: bytes })
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.id
    }
}

impl From<[u8; PEER_ID_LEN]> for PeerId {
    fn from(id: [u8; PEER_ID_LEN]) -> PeerId {
        PeerId { id }
    }
}

impl Into<[u8; PEER_ID_LEN]> for PeerId {
    fn into(self) -> [u8; PEER_ID_LEN] {
        self.id
    }
}

impl PartialEq<[u8]> for PeerId {
    fn eq(&self, other: &[u8]) -> bool {
        self.id[..] == *other
    }
}

// Peer ids are mostly printable client tags, show them as such in logs.
impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &byte in &self.id {
            if byte.is_ascii_graphic() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, ".")?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::{InfoHash, PeerId};

    #[test]
    fn positive_info_hash_from_exact_slice() {
        let bytes = [170u8; 20];

        let hash = InfoHash::from_hash(&bytes).unwrap();

        assert_eq!(hash, bytes[..]);
    }

    #[test]
    fn negative_info_hash_from_short_slice() {
        assert!(InfoHash::from_hash(&[170u8; 19]).is_none());
    }

    #[test]
    fn positive_info_hash_xor() {
        let ones = InfoHash::from([0b1111_0000u8; 20]);
        let other = InfoHash::from([0b0011_0011u8; 20]);

        let result = ones ^ other;

        assert_eq!(result, [0b1100_0011u8; 20][..]);
    }

    #[test]
    fn positive_peer_id_display_masks_unprintable() {
        let mut id = *b"-UT2060-000000000000";
        id[8] = 0x01;

        let pid = PeerId::from(id);

        assert_eq!("-UT2060-.00000000000", format!("{}", pid));
    }
}
