use std::cell::RefCell;
use std::net::SocketAddr;

use mse_handshake::crypto::obfuscated_info_hash;
use mse_handshake::{InfoHash, Mediator, PeerId, TorrentId, TorrentInfo};


mod test_encrypted;
mod test_fallback;
mod test_timeout;

/// Mediator over a fixed torrent table, recording uTP failures.
pub struct TestMediator {
    pub torrents: Vec<TorrentInfo>,
    pub allow_dht: bool,
    pub allow_tcp: bool,
    pub known_seeds: Vec<(TorrentId, SocketAddr)>,
    pub utp_failures: RefCell<Vec<(InfoHash, SocketAddr)>>,
}

impl TestMediator {
    pub fn new(hash: InfoHash, client_pid: PeerId) -> TestMediator {
        TestMediator {
            torrents: vec![TorrentInfo {
                info_hash: hash,
                client_peer_id: client_pid,
                id: 1,
                is_done: false,
            }],
            allow_dht: true,
            allow_tcp: true,
            known_seeds: Vec::new(),
            utp_failures: RefCell::new(Vec::new()),
        }
    }
}

impl Mediator for TestMediator {
    fn torrent_info(&self, hash: &InfoHash) -> Option<TorrentInfo> {
        self.torrents
            .iter()
            .find(|info| info.info_hash == *hash)
            .cloned()
    }

    fn torrent_info_from_obfuscated(&self, obfuscated: &InfoHash) -> Option<TorrentInfo> {
        self.torrents
            .iter()
            .find(|info| obfuscated_info_hash(&info.info_hash) == *obfuscated)
            .cloned()
    }

    fn is_peer_known_seed(&self, id: TorrentId, addr: SocketAddr) -> bool {
        self.known_seeds
            .iter()
            .any(|&(seed_id, seed_addr)| seed_id == id && seed_addr == addr)
    }

    fn allows_dht(&self) -> bool {
        self.allow_dht
    }

    fn allows_tcp(&self) -> bool {
        self.allow_tcp
    }

    fn set_utp_failed(&self, hash: &InfoHash, addr: SocketAddr) {
        self.utp_failures.borrow_mut().push((*hash, addr));
    }
}

pub fn any_info_hash() -> InfoHash {
    [55u8; 20].into()
}

pub fn other_info_hash() -> InfoHash {
    [56u8; 20].into()
}

pub fn peer_id(tag: u8) -> PeerId {
    [tag; 20].into()
}

pub fn any_addr() -> SocketAddr {
    "127.0.0.1:6881".parse().unwrap()
}
