use std::time::{Duration, Instant};

use wiremsg_frame::Message;
use wiremsg_peer::{Client, OwnedMessage};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout, false)?;
    let deadline = Instant::now() + wait_timeout;

    let mut client = Client::<u32>::new();
    client
        .connect(&args.host, args.port)
        .map_err(|err| peer_error("connect failed", err))?;
    let peer = format!("{}:{}", args.host, args.port);

    wait_until(deadline, || client.is_ready() || !client.is_connected());
    if !client.is_ready() {
        return Err(not_ready(&client, &peer));
    }

    let body = args.data.as_deref().unwrap_or_default();
    client.send(Message::with_body(args.kind, body.as_bytes()));

    if args.wait {
        let reply = wait_for_reply(&client, deadline)?;
        print_message(&reply.msg, &peer, format);
    } else {
        // Give the reactor the chance to write before the socket closes.
        wait_until(deadline, || {
            client
                .connection()
                .is_none_or(|conn| conn.unsent() == 0 || !conn.is_connected())
        });
    }

    client.disconnect();
    Ok(SUCCESS)
}

fn wait_until(deadline: Instant, mut done: impl FnMut() -> bool) {
    while !done() && Instant::now() < deadline {
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn not_ready(client: &Client<u32>, peer: &str) -> CliError {
    if client.is_connected() {
        CliError::new(TIMEOUT, format!("handshake with {peer} timed out"))
    } else {
        CliError::new(FAILURE, format!("could not connect to {peer}"))
    }
}

fn wait_for_reply(client: &Client<u32>, deadline: Instant) -> CliResult<OwnedMessage<u32>> {
    loop {
        if let Some(reply) = client.incoming().pop_front() {
            return Ok(reply);
        }
        if !client.is_connected() {
            return Err(CliError::new(FAILURE, "server closed the connection"));
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(CliError::new(TIMEOUT, "no reply before --wait-timeout"));
        }
        client
            .incoming()
            .wait_timeout((deadline - now).min(POLL_INTERVAL * 10));
    }
}
