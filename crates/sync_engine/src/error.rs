//! Sync engine error types

use thiserror::Error;

/// Failure of a single request/response attempt within a burst
///
/// Attempt errors are transient: the engine logs and skips them.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Send or receive failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No response within the receive timeout
    #[error("timed out waiting for response")]
    Timeout,

    /// Response could not be interpreted
    #[error("malformed response: {message}")]
    Malformed {
        /// What was wrong with the packet
        message: String,
    },
}

impl AttemptError {
    /// Create a malformed-response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Classify an io error, folding timeouts into `Timeout`
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(err),
        }
    }
}

/// Failure of a whole `sync` call; prior state is left untouched
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport could not be opened (DNS failure, bind failure)
    #[error("cannot open transport to '{server}': {source}")]
    Transport {
        server: String,
        #[source]
        source: std::io::Error,
    },

    /// Every attempt of the burst failed
    #[error("sync with '{server}' failed: all {attempts} attempts failed (last: {last_error})")]
    AllAttemptsFailed {
        server: String,
        attempts: u32,
        last_error: String,
    },

    /// Another sync is already running
    #[error("a sync is already in flight")]
    InFlight,

    /// No servers were given
    #[error("no servers configured")]
    NoServers,
}

/// Clock read failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockError {
    /// No offset has been committed yet
    #[error("clock not yet synced")]
    NotSynced,
}
