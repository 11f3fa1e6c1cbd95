//! Peer handshake machinery for BitTorrent connections: the plain 68 byte
//! protocol handshake, the message stream encryption key exchange in front
//! of it, and the fallbacks between the two.
//!
//! A [`Handshake`] drives one connection as a future over any
//! `AsyncRead + AsyncWrite` socket; torrent lookups, policy, and key
//! material come from a [`Mediator`] the surrounding client implements.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate nom;

pub mod crypto;

mod error;
mod handshake;
mod mediator;
mod message;
mod peer_io;
mod transport;
mod types;

pub use crate::error::{HandshakeError, HandshakeErrorKind, HandshakeResult};
pub use crate::handshake::config::{EncryptionMode, HandshakerConfig};
pub use crate::handshake::machine::{Handshake, CRYPTO_PLAINTEXT, CRYPTO_RC4, PAD_MAX, VC};
pub use crate::handshake::timer::HandshakeTimer;
pub use crate::mediator::{Mediator, TorrentId, TorrentInfo};
pub use crate::message::complete::CompleteMessage;
pub use crate::message::extensions::Extensions;
pub use crate::message::handshake::{HandshakeMessage, BT_HANDSHAKE_LEN};
pub use crate::message::protocol::{Protocol, BT_MAGIC};
pub use crate::peer_io::PeerIo;
pub use crate::transport::{reconnector, Reconnector, SocketFuture, TcpTransport, Transport};
pub use crate::types::{InfoHash, PeerId};
