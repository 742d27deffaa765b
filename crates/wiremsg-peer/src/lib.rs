//! Connections and endpoints for wiremsg.
//!
//! This is the "just works" layer. A [`Server`] accepts many clients and a
//! [`Client`] connects to one server; both exchange typed
//! [`Message`](wiremsg_frame::Message)s through a synchronous-looking API
//! (`send`, poll the incoming queue) while a background reactor thread does
//! all socket I/O.

pub mod client;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod queue;
pub mod server;

pub use client::{Client, ClientConfig};
pub use connection::{ClientId, Connection, ConnectionState, OwnedMessage, Role};
pub use error::{PeerError, Result};
pub use handshake::{clock_nonce, scramble, NonceSource, HANDSHAKE_SIZE};
pub use queue::TsQueue;
pub use server::{Server, ServerConfig, ServerHandler, FIRST_CLIENT_ID};
