#![cfg(feature = "cli")]

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("port 0 should bind");
    listener.local_addr().expect("bound address").port()
}

fn wiremsg() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_wiremsg"));
    command
        .env_remove("WIREMSG_HOST")
        .env_remove("WIREMSG_PORT")
        .arg("--log-level")
        .arg("error");
    command
}

struct ServeGuard(Child);

impl Drop for ServeGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_serve(port: u16) -> ServeGuard {
    let child = wiremsg()
        .arg("serve")
        .arg("--bind")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    ServeGuard(child)
}

fn send_ping(port: u16) -> std::process::Output {
    wiremsg()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg("--port")
        .arg(port.to_string())
        .arg("--kind")
        .arg("2")
        .arg("--data")
        .arg("hello")
        .arg("--wait")
        .arg("--wait-timeout")
        .arg("2s")
        .output()
        .expect("send should run")
}

#[test]
fn send_ping_to_serve_prints_echo() {
    let port = free_port();
    let _serve = spawn_serve(port);

    let deadline = Instant::now() + Duration::from_secs(10);
    let output = loop {
        let output = send_ping(port);
        if output.status.success() || Instant::now() >= deadline {
            break output;
        }
        thread::sleep(Duration::from_millis(100));
    };

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("send should emit json");
    assert_eq!(payload.get("kind").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        payload.get("kind_name").and_then(|v| v.as_str()),
        Some("ServerPing")
    );
    assert_eq!(payload.get("body").and_then(|v| v.as_str()), Some("hello"));
}

#[test]
fn send_without_server_fails() {
    let port = free_port();
    let output = wiremsg()
        .arg("send")
        .arg("--port")
        .arg(port.to_string())
        .arg("--kind")
        .arg("2")
        .arg("--wait-timeout")
        .arg("2s")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn send_rejects_bad_timeout() {
    let output = wiremsg()
        .arg("send")
        .arg("--kind")
        .arg("2")
        .arg("--wait-timeout")
        .arg("soon")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_crate_version() {
    let output = wiremsg().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("wiremsg {}", env!("CARGO_PKG_VERSION"))
    );
}
