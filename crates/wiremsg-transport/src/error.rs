use std::net::SocketAddr;

/// Errors that can occur in transport setup.
///
/// Only synchronous setup failures are represented here. Failures on an
/// established socket are handled by the connection that owns it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host/port pair could not be resolved.
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        source: std::io::Error,
    },

    /// Resolution succeeded but produced no usable address.
    #[error("no address found for {target}")]
    NoAddress { target: String },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred on a transport socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reactor runtime or its thread could not be created.
    #[error("failed to start reactor: {0}")]
    Runtime(std::io::Error),

    /// The reactor has been shut down.
    #[error("reactor shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
