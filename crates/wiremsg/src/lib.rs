//! Typed, framed messaging between a TCP server and its clients.
//!
//! wiremsg lets a process act as a server accepting many clients, or as a
//! client of one server, exchanging discrete typed messages over TCP. Every
//! connection is validated with a nonce handshake before any message flows,
//! and all socket I/O for an endpoint runs on one background reactor thread.
//!
//! # Crate Structure
//!
//! - [`transport`]: address resolution, listener binding, the reactor
//! - [`frame`]: message kinds, the typed message body, the wire codec
//! - [`peer`]: connections, the handshake, client and server endpoints
//! - [`robot`]: demonstration path server and simulated robot client

/// Re-export transport types.
pub mod transport {
    pub use wiremsg_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wiremsg_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use wiremsg_peer::*;
}

pub mod robot;
