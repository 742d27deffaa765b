use wiremsg::robot::{Robot, RobotMsg};
use wiremsg_peer::Client;

use crate::cmd::{parse_duration, RobotArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS};

pub fn run(args: RobotArgs) -> CliResult<i32> {
    let step_delay = parse_duration(&args.step_delay, true)?;

    let mut client = Client::<RobotMsg>::new();
    client
        .connect(&args.host, args.port)
        .map_err(|err| peer_error("connect failed", err))?;

    let mut robot = Robot::new().with_step_delay(step_delay);
    let steps = robot.drive(&client, args.max_steps);
    let finished = args.max_steps.is_some_and(|max| steps >= max);
    client.disconnect();

    eprintln!(
        "Handled {steps} messages, reached {} goals, battery {}",
        robot.goals_reached(),
        robot.battery()
    );

    if finished {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            FAILURE,
            format!("connection to {}:{} lost", args.host, args.port),
        ))
    }
}
