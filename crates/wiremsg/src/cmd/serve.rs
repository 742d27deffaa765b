use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use wiremsg::robot::{PathServer, RobotMsg};
use wiremsg_peer::Server;

use crate::cmd::ServeArgs;
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let addr = SocketAddr::new(args.bind, args.port);
    let mut server = Server::<RobotMsg>::bind(addr, PathServer::new())
        .map_err(|err| peer_error("bind failed", err))?;
    server
        .start()
        .map_err(|err| peer_error("start failed", err))?;
    eprintln!("Listening on {}", server.local_addr());

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut dispatched = 0usize;
    while running.load(Ordering::SeqCst) {
        if server.incoming().wait_timeout(POLL_INTERVAL) {
            dispatched = dispatched.saturating_add(server.update(None, false));
        }
    }

    info!(dispatched, clients = server.client_count(), "shutting down");
    server.stop();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
