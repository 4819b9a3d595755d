//! Crate error types.

use thiserror::Error;

/// Coarse classification of an [`Error`], for callers that route on the
/// kind of failure rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The underlying session or library could not be opened or spoken to.
    Transport,
    /// The call was rejected locally, before anything reached a device.
    Usage,
    /// The operation is not legal in the session's current mode.
    State,
    /// The device reported a failure in its command output.
    Device,
}

/// Errors raised by the router session, the dispatchers, and the
/// hypervisor backends.
#[derive(Debug, Error)]
pub enum Error {
    /// The shell process could not be spawned on a PTY.
    #[error("failed to spawn the router shell: {reason}")]
    Spawn { reason: String },

    /// I/O failure while talking to the shell.
    #[error("shell session I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The shell went away before the expected output arrived.
    #[error("the shell session closed before the expected output arrived")]
    SessionClosed,

    /// A configured read deadline expired.
    #[error("timed out waiting for shell output")]
    Timeout,

    /// A prompt pattern from the session configuration failed to compile.
    #[error("invalid prompt pattern: {0}")]
    InvalidPattern(String),

    /// The command did not pass the dispatcher allow-list.
    #[error("{0}")]
    InvalidCommand(String),

    /// The operation is not valid for the session's current mode or flags.
    #[error("{0}")]
    State(String),

    /// The device rejected a set/delete command.
    #[error("configuration command failed: {0}")]
    Config(String),

    /// The device reported a commit failure.
    #[error("commit failed: {0}")]
    Commit(String),

    /// Another commit holds the device's configuration lock.
    #[error("configuration is locked by another commit in progress")]
    ConfigLocked,

    /// The virtualization management library reported a failure.
    #[error("hypervisor operation failed: {0}")]
    Hypervisor(String),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Spawn { .. }
            | Error::Io(_)
            | Error::SessionClosed
            | Error::Timeout
            | Error::Hypervisor(_) => ErrorCategory::Transport,
            Error::InvalidPattern(_) | Error::InvalidCommand(_) => ErrorCategory::Usage,
            Error::State(_) => ErrorCategory::State,
            Error::Config(_) | Error::Commit(_) | Error::ConfigLocked => ErrorCategory::Device,
        }
    }
}
