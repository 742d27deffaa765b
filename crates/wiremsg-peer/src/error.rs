/// Errors that can occur in peer operations.
///
/// Only setup failures reach the caller. Once a connection is running, every
/// failure simply closes it.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wiremsg_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] wiremsg_frame::FrameError),

    /// Socket I/O error.
    #[error("peer I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client answered the handshake nonce with the wrong value.
    #[error("handshake response mismatch")]
    HandshakeMismatch,

    /// The endpoint was already started.
    #[error("endpoint already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, PeerError>;
