// ================================================================
// File: maowbeat-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad query or unreachable source. Recovered by advancing the queue.
    #[error("Error playing song: {0}")]
    Resolution(String),

    /// Could not join the requester's voice channel.
    #[error("Could not connect to voice channel: {0}")]
    Connect(String),

    /// Command does not apply to the current playback state, e.g. pause while idle.
    #[error("{0}")]
    InvalidState(String),

    /// Completion for a track that has already been superseded. Never shown to users.
    #[error("Stale completion for generation {received} (current {current})")]
    StaleCallback { received: u64, current: u64 },

    /// The voice transport rejected a control operation or playback failed mid-stream.
    #[error("Voice transport error: {0}")]
    Transport(String),

    #[error("You need to be in a voice channel to use this command!")]
    NotInVoice,

    #[error("I'm already in a different voice channel!")]
    DifferentChannel,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The guild's session shut down before it could answer.
    #[error("Music session for this server is closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand used by the controller for "wrong state" replies.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::InvalidRequest(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::InvalidRequest(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::SessionClosed
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_messages() {
        assert_eq!(
            Error::invalid_state("Nothing is playing!").to_string(),
            "Nothing is playing!"
        );
        assert_eq!(
            Error::Resolution("video unavailable".into()).to_string(),
            "Error playing song: video unavailable"
        );
    }
}
