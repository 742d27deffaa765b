/// Errors that can occur while building, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A pop asked for more bytes than the body holds.
    #[error("body underflow (requested {requested} bytes, {available} available)")]
    BodyUnderflow { requested: usize, available: usize },

    /// The header carries a kind code the receiver does not know.
    #[error("unknown message kind code {0}")]
    UnknownKind(u32),

    /// The body exceeds the configured maximum size.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
