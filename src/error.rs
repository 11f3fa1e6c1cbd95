//! Error types for handshake sessions.

error_chain! {
    types {
        HandshakeError, HandshakeErrorKind, HandshakeResultExt, HandshakeResult;
    }

    foreign_links {
        Io(::std::io::Error);
    }

    errors {
        /// Expected one framing (plain or encrypted) but the peer spoke the other.
        EncryptionWrong {
            description("Peer Used The Wrong Encryption Framing")
            display("Peer Used The Wrong Encryption Framing")
        }
        /// Info-hash mismatch, or a hash we have no torrent for.
        BadTorrent {
            description("Peer Sent A Bad Or Unknown Torrent Hash")
            display("Peer Sent A Bad Or Unknown Torrent Hash")
        }
        /// The remote peer id equals our own; we connected to ourselves.
        PeerIsSelf {
            description("Connected To Ourselves")
            display("Connected To Ourselves")
        }
        /// Both us and the peer are seeds for the torrent.
        BothSeeds {
            description("Both Sides Of The Connection Are Seeds")
            display("Both Sides Of The Connection Are Seeds")
        }
        /// The deadline elapsed before the handshake finished.
        Timeout {
            description("Handshake Timed Out")
            display("Handshake Timed Out")
        }
        /// Malformed or out of range handshake data.
        ProtocolViolation(msg: String) {
            description("Peer Violated The Handshake Protocol")
            display("Peer Violated The Handshake Protocol: {}", msg)
        }
    }
}
