use std::default::Default;
use std::time::Duration;

const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// How eagerly a session encrypts its connections.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EncryptionMode {
    /// Only encrypted connections are acceptable.
    Required,
    /// Try encryption first, fall back to plaintext.
    Preferred,
    /// Speak plaintext first, accept encryption if the peer insists.
    ClearPreferred,
}

/// Configures the internals of a handshake session.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct HandshakerConfig {
    encryption_mode: EncryptionMode,
    handshake_timeout: Duration,
}

impl HandshakerConfig {
    /// Sets how the session negotiates stream encryption.
    pub fn with_encryption_mode(mut self, mode: EncryptionMode) -> HandshakerConfig {
        self.encryption_mode = mode;
        self
    }

    /// Sets the deadline after which an unfinished handshake is abandoned.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> HandshakerConfig {
        self.handshake_timeout = timeout;
        self
    }

    pub fn encryption_mode(&self) -> EncryptionMode {
        self.encryption_mode
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

impl Default for HandshakerConfig {
    fn default() -> HandshakerConfig {
        HandshakerConfig {
            encryption_mode: EncryptionMode::Preferred,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }
}
