//! Path server: hands each connecting robot a five-goal path.
//!
//! Run with:
//!   cargo run --example path-server
//!
//! In another terminal:
//!   cargo run --example robot-client

use wiremsg::peer::Server;
use wiremsg::robot::{PathServer, RobotMsg};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::<RobotMsg>::bind_port(60000, PathServer::new())?;
    server.start()?;
    eprintln!("Listening on {}", server.local_addr());

    // Dispatch on this thread until the process is killed.
    loop {
        server.update(None, true);
    }
}
