use shared::CodecError;
use thiserror::Error;

/// Fatal client failures. Any of these ends the session with the server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("connection to the server was lost")]
    ConnectionLost,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Maps a closed stream to `ConnectionLost`
    pub fn from_codec(error: CodecError) -> Self {
        if error.is_closed() {
            ClientError::ConnectionLost
        } else {
            ClientError::Codec(error)
        }
    }
}
