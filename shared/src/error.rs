use crate::tag::Tag;
use thiserror::Error;

/// Failures while framing, encoding or decoding messages
#[derive(Debug, Error)]
pub enum CodecError {
    /// Peer closed the stream, either between frames or in the middle of one
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("unknown tag {0}")]
    UnknownTag(String),

    #[error("value for tag {tag} contains the reserved pad character")]
    ReservedCharacter { tag: Tag },

    #[error("value for tag {tag} is too long ({len} bytes)")]
    ValueTooLong { tag: Tag, len: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True when the peer went away rather than sending garbage
    pub fn is_closed(&self) -> bool {
        match self {
            CodecError::ConnectionClosed => true,
            CodecError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
