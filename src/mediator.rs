use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::dh::DhLocalKeys;
use crate::handshake::timer::HandshakeTimer;
use crate::types::{InfoHash, PeerId};

/// Opaque torrent identifier, stable for the lifetime of the mediator.
pub type TorrentId = u64;

/// What a handshake needs to know about one of our torrents.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TorrentInfo {
    /// The torrent's info-hash.
    pub info_hash: InfoHash,
    /// Peer id we advertise on this torrent.
    pub client_peer_id: PeerId,
    /// Identifier handed back to `is_peer_known_seed`.
    pub id: TorrentId,
    /// Whether we already hold every piece.
    pub is_done: bool,
}

/// Read only window into the client a handshake session runs on behalf of.
///
/// A single mediator typically serves every live handshake; sessions hold a
/// shared handle (see the blanket `Arc` impl) and never mutate it outside
/// of `set_utp_failed`.
pub trait Mediator {
    /// Look up a torrent by its info-hash.
    fn torrent_info(&self, hash: &InfoHash) -> Option<TorrentInfo>;

    /// Look up a torrent by `SHA1("req2" | info_hash)`, the identifier an
    /// encrypted peer opens with (see `crypto::obfuscated_info_hash`).
    fn torrent_info_from_obfuscated(&self, obfuscated: &InfoHash) -> Option<TorrentInfo>;

    /// Whether the given peer is already known to seed the torrent.
    fn is_peer_known_seed(&self, id: TorrentId, addr: SocketAddr) -> bool;

    /// Whether we participate in the DHT (advertised in the reserved bits).
    fn allows_dht(&self) -> bool;

    /// Whether plain TCP connections may be opened, gating uTP and
    /// encryption fallbacks.
    fn allows_tcp(&self) -> bool;

    /// Record that the peer could not complete a uTP connection, so future
    /// dials skip straight to TCP.
    fn set_utp_failed(&self, hash: &InfoHash, addr: SocketAddr);

    /// Ephemeral key material for one session's key exchange.
    fn private_key(&self) -> DhLocalKeys {
        DhLocalKeys::generate()
    }

    /// Timer the session arms its deadline on.
    ///
    /// The default spins up a dedicated wheel; clients juggling many
    /// concurrent handshakes should hand out a shared one instead.
    fn timer(&self, duration: Duration) -> HandshakeTimer {
        let wheel = tokio_timer::wheel()
            .max_timeout(duration + Duration::from_secs(1))
            .build();

        HandshakeTimer::new(wheel, duration)
    }
}

impl<M> Mediator for Arc<M>
where
    M: Mediator,
{
    fn torrent_info(&self, hash: &InfoHash) -> Option<TorrentInfo> {
        (**self).torrent_info(hash)
    }

    fn torrent_info_from_obfuscated(&self, obfuscated: &InfoHash) -> Option<TorrentInfo> {
        (**self).torrent_info_from_obfuscated(obfuscated)
    }

    fn is_peer_known_seed(&self, id: TorrentId, addr: SocketAddr) -> bool {
        (**self).is_peer_known_seed(id, addr)
    }

    fn allows_dht(&self) -> bool {
        (**self).allows_dht()
    }

    fn allows_tcp(&self) -> bool {
        (**self).allows_tcp()
    }

    fn set_utp_failed(&self, hash: &InfoHash, addr: SocketAddr) {
        (**self).set_utp_failed(hash, addr)
    }

    fn private_key(&self) -> DhLocalKeys {
        (**self).private_key()
    }

    fn timer(&self, duration: Duration) -> HandshakeTimer {
        (**self).timer(duration)
    }
}
