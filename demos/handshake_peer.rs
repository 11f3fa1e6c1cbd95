//! Handshake with a live peer: takes an info-hash and a peer address on
//! the command line, dials the peer over TCP, and reports who answered.
//!
//! ```text
//! handshake_peer <40 hex digit info-hash> <ip:port>
//! ```

use std::env;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use rand::{self, Rng};
use tokio_core::reactor::Core;

use mse_handshake::{
    reconnector, Handshake, HandshakerConfig, InfoHash, Mediator, PeerId, PeerIo, TcpTransport,
    TorrentId, TorrentInfo, Transport,
};

struct OneTorrentMediator {
    info: TorrentInfo,
}

impl Mediator for OneTorrentMediator {
    fn torrent_info(&self, hash: &InfoHash) -> Option<TorrentInfo> {
        if self.info.info_hash == *hash {
            Some(self.info)
        } else {
            None
        }
    }

    fn torrent_info_from_obfuscated(&self, _obfuscated: &InfoHash) -> Option<TorrentInfo> {
        None
    }

    fn is_peer_known_seed(&self, _id: TorrentId, _addr: SocketAddr) -> bool {
        false
    }

    fn allows_dht(&self) -> bool {
        false
    }

    fn allows_tcp(&self) -> bool {
        true
    }

    fn set_utp_failed(&self, _hash: &InfoHash, _addr: SocketAddr) {}
}

fn main() {
    let mut args = env::args().skip(1);
    let (hash, addr) = match (args.next(), args.next()) {
        (Some(hex), Some(addr)) => (parse_info_hash(&hex), parse_peer_addr(&addr)),
        _ => usage(),
    };

    let mut core = Core::new().unwrap();
    let handle = core.handle();

    let peer_id = generate_peer_id();
    let mediator = Arc::new(OneTorrentMediator {
        info: TorrentInfo {
            info_hash: hash,
            client_peer_id: peer_id,
            id: 0,
            is_done: false,
        },
    });

    let sock = core
        .run(TcpTransport.connect(&addr, &handle))
        .expect("failed to connect to the peer");

    let handshake = Handshake::initiate(
        PeerIo::outgoing(sock, addr),
        hash,
        mediator,
        HandshakerConfig::default(),
    )
    .unwrap()
    .with_reconnect(reconnector(TcpTransport, addr, handle.clone()));

    let complete = core.run(handshake).expect("handshake failed");

    println!(
        "peer '{}' answered on {} (ltep: {}, fast: {}, dht: {})",
        complete.peer_id(),
        complete.address(),
        complete.extensions().has_ltep(),
        complete.extensions().has_fext(),
        complete.extensions().has_dht()
    );
}

fn usage() -> ! {
    eprintln!("usage: handshake_peer <40 hex digit info-hash> <ip:port>");
    process::exit(2);
}

fn parse_info_hash(hex: &str) -> InfoHash {
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        usage();
    }

    let digits = hex.as_bytes();
    let mut bytes = [0u8; 20];
    for (byte, pair) in bytes.iter_mut().zip(digits.chunks(2)) {
        *byte = (nibble(pair[0]) << 4) | nibble(pair[1]);
    }

    bytes.into()
}

fn nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => unreachable!(),
    }
}

fn parse_peer_addr(addr: &str) -> SocketAddr {
    match addr.parse() {
        Ok(addr) => addr,
        Err(_) => usage(),
    }
}

// Azureus style id, fixed client tag plus a random digit tail.
fn generate_peer_id() -> PeerId {
    let mut id = *b"-MH0100-000000000000";

    let mut rng = rand::thread_rng();
    for digit in id[8..].iter_mut() {
        *digit = b'0' + rng.gen_range(0, 10u8);
    }

    id.into()
}
