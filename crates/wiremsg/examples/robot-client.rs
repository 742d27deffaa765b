//! Simulated robot: follows paths from a running path server.
//!
//! Run with:
//!   cargo run --example robot-client

use std::time::Duration;

use wiremsg::peer::Client;
use wiremsg::robot::{Robot, RobotMsg};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::<RobotMsg>::new();
    client.connect("127.0.0.1", 60000)?;

    let mut robot = Robot::new().with_step_delay(Duration::from_millis(250));
    let handled = robot.drive(&client, None);

    eprintln!(
        "Server went away after {handled} messages; reached {} goals",
        robot.goals_reached()
    );
    Ok(())
}
