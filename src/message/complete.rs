use std::fmt;
use std::net::SocketAddr;

use crate::message::extensions::Extensions;
use crate::peer_io::PeerIo;
use crate::types::{InfoHash, PeerId};

/// Message containing completed handshaking information.
///
/// Hands ownership of the peer io, with whatever stream ciphers the
/// handshake negotiated still installed, over to the message layer.
pub struct CompleteMessage<S> {
    ext: Extensions,
    hash: InfoHash,
    pid: PeerId,
    addr: SocketAddr,
    io: PeerIo<S>,
}

impl<S> fmt::Debug for CompleteMessage<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompleteMessage")
            .field("ext", &self.ext)
            .field("hash", &self.hash)
            .field("pid", &self.pid)
            .field("addr", &self.addr)
            .field("io", &self.io)
            .finish()
    }
}

impl<S> CompleteMessage<S> {
    pub fn new(
        ext: Extensions,
        hash: InfoHash,
        pid: PeerId,
        addr: SocketAddr,
        io: PeerIo<S>,
    ) -> CompleteMessage<S> {
        CompleteMessage {
            ext,
            hash,
            pid,
            addr,
            io,
        }
    }

    /// Extensions the remote peer advertised.
    pub fn extensions(&self) -> &Extensions {
        &self.ext
    }

    pub fn hash(&self) -> &InfoHash {
        &self.hash
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.pid
    }

    pub fn address(&self) -> &SocketAddr {
        &self.addr
    }

    pub fn io(&self) -> &PeerIo<S> {
        &self.io
    }

    pub fn into_parts(self) -> (Extensions, InfoHash, PeerId, SocketAddr, PeerIo<S>) {
        (self.ext, self.hash, self.pid, self.addr, self.io)
    }
}
