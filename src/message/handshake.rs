use std::io;
use std::io::Write;
use std::u8;

use crate::message::extensions::{self, Extensions};
use crate::message::protocol::Protocol;
use crate::types::{InfoHash, PeerId, INFO_HASH_LEN, PEER_ID_LEN};

use nom::IResult;

/// Wire size of a plain handshake using the standard BitTorrent protocol string.
pub const BT_HANDSHAKE_LEN: usize = 68;

/// The complete handshake message a peer opens a connection with.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HandshakeMessage {
    prot: Protocol,
    ext: Extensions,
    hash: InfoHash,
    pid: PeerId,
}

impl HandshakeMessage {
    /// Create a new `HandshakeMessage` from the given components.
    pub fn from_parts(
        prot: Protocol,
        ext: Extensions,
        hash: InfoHash,
        pid: PeerId,
    ) -> HandshakeMessage {
        if let Protocol::Custom(ref custom) = prot {
            if custom.len() > u8::max_value() as usize {
                panic!(
                    "mse_handshake: Handshake Message With Protocol Length Greater Than {} Found",
                    u8::max_value()
                )
            }
        }

        HandshakeMessage {
            prot,
            ext,
            hash,
            pid,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], HandshakeMessage> {
        parse_remote_handshake(bytes)
    }

    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        self.prot.write_bytes(&mut writer)?;
        self.ext.write_bytes(&mut writer)?;
        writer.write_all(self.hash.as_ref())?;
        writer.write_all(self.pid.as_ref())?;

        Ok(())
    }

    pub fn write_len(&self) -> usize {
        write_len_with_protocol_len(self.prot.write_len() as u8)
    }

    pub fn into_parts(self) -> (Protocol, Extensions, InfoHash, PeerId) {
        (self.prot, self.ext, self.hash, self.pid)
    }
}

pub fn write_len_with_protocol_len(protocol_len: u8) -> usize {
    1 + (protocol_len as usize) + extensions::NUM_EXTENSION_BYTES + INFO_HASH_LEN + PEER_ID_LEN
}

fn parse_remote_handshake(bytes: &[u8]) -> IResult<&[u8], HandshakeMessage> {
    do_parse!(
        bytes,
        prot: call!(Protocol::from_bytes)
            >> ext: call!(Extensions::from_bytes)
            >> hash: call!(parse_remote_hash)
            >> pid: call!(parse_remote_pid)
            >> (HandshakeMessage::from_parts(prot, ext, hash, pid))
    )
}

fn parse_remote_hash(bytes: &[u8]) -> IResult<&[u8], InfoHash> {
    do_parse!(
        bytes,
        hash: take!(INFO_HASH_LEN) >> (InfoHash::from_hash(hash).unwrap())
    )
}

fn parse_remote_pid(bytes: &[u8]) -> IResult<&[u8], PeerId> {
    do_parse!(
        bytes,
        pid: take!(PEER_ID_LEN) >> (PeerId::from_id(pid).unwrap())
    )
}
