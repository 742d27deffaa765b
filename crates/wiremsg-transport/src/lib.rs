//! TCP transport and reactor for wiremsg.
//!
//! This is the lowest layer of wiremsg. It provides:
//! - Address resolution and listener binding over TCP
//! - The [`Reactor`]: one dedicated background thread driving a
//!   single-threaded async runtime, on which every socket operation of one
//!   endpoint is interleaved cooperatively
//!
//! Everything else builds on top of these two pieces.

pub mod error;
pub mod reactor;
pub mod tcp;

pub use error::{Result, TransportError};
pub use reactor::Reactor;
pub use tcp::{resolve, TcpEndpoint};
