//! Demonstration applications built on the public endpoint API.
//!
//! [`PathServer`] hands each validated robot a fixed five-goal path, one
//! goal per request, plus random goals and charging stations on demand.
//! [`Robot`] is the matching client: a state machine that requests a path,
//! follows it, and goes to charge when its battery runs low.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::frame::{FrameError, Message, MessageKind};
use crate::peer::{Client, ClientId, Connection, Server, ServerHandler};

/// Message kinds understood by the path server and the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RobotMsg {
    ServerAccept = 0,
    ServerDeny = 1,
    ServerPing = 2,
    MessageAll = 3,
    ServerMessage = 4,
    ServerNewGoal = 5,
    ServerNewPath = 6,
    ServerPathDone = 7,
    ServerCharge = 8,
    RobotGoalRequest = 9,
    RobotLowBattery = 10,
    RobotPathRequest = 11,
    RobotPathDone = 12,
}

impl RobotMsg {
    pub const ALL: [RobotMsg; 13] = [
        RobotMsg::ServerAccept,
        RobotMsg::ServerDeny,
        RobotMsg::ServerPing,
        RobotMsg::MessageAll,
        RobotMsg::ServerMessage,
        RobotMsg::ServerNewGoal,
        RobotMsg::ServerNewPath,
        RobotMsg::ServerPathDone,
        RobotMsg::ServerCharge,
        RobotMsg::RobotGoalRequest,
        RobotMsg::RobotLowBattery,
        RobotMsg::RobotPathRequest,
        RobotMsg::RobotPathDone,
    ];
}

impl MessageKind for RobotMsg {
    fn code(self) -> u32 {
        self as u32
    }

    fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// A point on the map. Travels as `x` then `y`, so it pops back as `y`
/// then `x`.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Goal {
    pub x: f32,
    pub y: f32,
}

/// The path every robot is given, in the order it is handed out.
pub const DEFAULT_PATH: [Goal; 5] = [
    Goal { x: -2.034, y: 6.32 },
    Goal { x: 11.6, y: 11.7 },
    Goal { x: 31.131, y: 22.277 },
    Goal { x: 32.005, y: 22.718 },
    Goal { x: 25.06, y: 21.31 },
];

/// Goals handed out per path before the server answers `ServerPathDone`.
pub const PATH_LENGTH: u32 = 5;

/// Upper bound (exclusive) for random goal coordinates.
pub const GOAL_RANGE: u32 = 100;

/// Upper bound (exclusive) for random charging-station coordinates.
pub const STATION_RANGE: u32 = 10;

pub const FULL_BATTERY: u32 = 170;

/// Battery spent reaching one goal.
pub const GOAL_COST: u32 = 10;

const LOW_BATTERY_AFTER_PATH: u32 = 50;
const LOW_BATTERY_AFTER_GOAL: u32 = 10;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One robot's progress along its path.
#[derive(Debug, Clone)]
struct Route {
    // Reversed, so the next goal is at the tail.
    goals: Vec<Goal>,
    remaining: u32,
}

impl Route {
    fn fresh() -> Self {
        let mut goals = DEFAULT_PATH.to_vec();
        goals.reverse();
        Self {
            goals,
            remaining: PATH_LENGTH,
        }
    }
}

/// Server-side application: hands out paths, goals and charging stations.
pub struct PathServer {
    routes: Mutex<HashMap<ClientId, Route>>,
    rng: Mutex<StdRng>,
}

impl PathServer {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic random goals, for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Goals still to be handed to `client` on its current path.
    pub fn remaining(&self, client: ClientId) -> Option<u32> {
        lock(&self.routes).get(&client).map(|route| route.remaining)
    }

    fn random_pair(&self, range: u32) -> (u32, u32) {
        let mut rng = lock(&self.rng);
        (rng.gen_range(0..range), rng.gen_range(0..range))
    }

    /// The reply to a path request: the next goal, or `ServerPathDone` once
    /// the path is used up (which also starts the path over).
    fn next_path_step(&self, client: ClientId) -> Message<RobotMsg> {
        let mut routes = lock(&self.routes);
        let route = routes.entry(client).or_insert_with(Route::fresh);

        if route.remaining > 0 {
            if let Some(goal) = route.goals.pop() {
                route.remaining -= 1;
                info!(client, x = goal.x, y = goal.y, "sending path goal");
                let mut reply = Message::new(RobotMsg::ServerNewPath);
                reply.push(goal.x).push(goal.y);
                return reply;
            }
        }

        *route = Route::fresh();
        Message::new(RobotMsg::ServerPathDone)
    }
}

impl Default for PathServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerHandler<RobotMsg> for PathServer {
    fn on_client_validated(&self, client: &Connection<RobotMsg>) {
        client.send(Message::new(RobotMsg::ServerAccept));
        lock(&self.routes).insert(client.id(), Route::fresh());
        info!(client = client.id(), "robot accepted");
    }

    fn on_client_disconnect(&self, id: ClientId) {
        lock(&self.routes).remove(&id);
        info!(client = id, "robot removed");
    }

    fn on_message(&self, server: &Server<RobotMsg>, client: ClientId, msg: Message<RobotMsg>) {
        match msg.kind() {
            RobotMsg::ServerPing => {
                info!(client, "ping");
                server.message_client(client, msg);
            }
            RobotMsg::MessageAll => {
                info!(client, "message all");
                let mut out = Message::new(RobotMsg::ServerMessage);
                out.push(client);
                server.broadcast(&out, Some(client));
            }
            RobotMsg::RobotGoalRequest => {
                let (x, y) = self.random_pair(GOAL_RANGE);
                info!(client, x, y, "robot reached goal, sending a new one");
                let mut reply = Message::new(RobotMsg::ServerNewGoal);
                reply.push(x).push(y);
                server.message_client(client, reply);
            }
            RobotMsg::RobotLowBattery => {
                let (x, y) = self.random_pair(STATION_RANGE);
                info!(client, x, y, "robot low on battery, sending charging station");
                let mut reply = Message::new(RobotMsg::ServerCharge);
                reply.push(x).push(y);
                server.message_client(client, reply);
            }
            RobotMsg::RobotPathRequest => {
                let reply = self.next_path_step(client);
                server.message_client(client, reply);
            }
            RobotMsg::RobotPathDone => {
                info!(client, "robot received its path");
            }
            other => debug!(client, kind = ?other, "ignoring message"),
        }
    }
}

impl std::fmt::Debug for PathServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathServer")
            .field("robots", &lock(&self.routes).len())
            .finish()
    }
}

/// Client-side application: a simulated robot.
///
/// [`handle`](Self::handle) consumes one server message and returns the
/// request to send back, if any. Travel and charging take a number of
/// step delays; a zero delay makes the robot instantaneous.
#[derive(Debug, Clone)]
pub struct Robot {
    battery: u32,
    path: Vec<Goal>,
    position: Option<Goal>,
    goals_reached: u64,
    step_delay: Duration,
}

impl Robot {
    pub fn new() -> Self {
        Self {
            battery: FULL_BATTERY,
            path: Vec::new(),
            position: None,
            goals_reached: 0,
            step_delay: Duration::from_secs(1),
        }
    }

    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    pub fn battery(&self) -> u32 {
        self.battery
    }

    /// Goals collected for the path being received.
    pub fn path(&self) -> &[Goal] {
        &self.path
    }

    pub fn position(&self) -> Option<Goal> {
        self.position
    }

    pub fn goals_reached(&self) -> u64 {
        self.goals_reached
    }

    /// React to one message from the server.
    ///
    /// Fails if a message body is shorter than its kind requires.
    pub fn handle(
        &mut self,
        mut msg: Message<RobotMsg>,
    ) -> Result<Option<Message<RobotMsg>>, FrameError> {
        let reply = match msg.kind() {
            RobotMsg::ServerAccept => {
                info!("server accepted connection");
                Some(RobotMsg::RobotPathRequest)
            }
            RobotMsg::ServerMessage => {
                let sender: ClientId = msg.pop()?;
                info!(sender, "hello from another robot");
                None
            }
            RobotMsg::ServerNewGoal => {
                let y: u32 = msg.pop()?;
                let x: u32 = msg.pop()?;
                info!(x, y, "new goal");
                self.travel(Goal {
                    x: x as f32,
                    y: y as f32,
                });
                if self.battery <= LOW_BATTERY_AFTER_GOAL {
                    Some(RobotMsg::RobotLowBattery)
                } else {
                    Some(RobotMsg::RobotPathRequest)
                }
            }
            RobotMsg::ServerCharge => {
                let y: u32 = msg.pop()?;
                let x: u32 = msg.pop()?;
                info!(x, y, "charging station");
                self.pause(2);
                info!("charging");
                self.pause(6);
                self.position = Some(Goal {
                    x: x as f32,
                    y: y as f32,
                });
                self.battery = FULL_BATTERY;
                Some(RobotMsg::RobotPathRequest)
            }
            RobotMsg::ServerNewPath => {
                let y: f32 = msg.pop()?;
                let x: f32 = msg.pop()?;
                info!(x, y, "adding goal to path");
                self.path.push(Goal { x, y });
                Some(RobotMsg::RobotPathRequest)
            }
            RobotMsg::ServerPathDone => {
                info!(goals = self.path.len(), "path received, following it");
                for goal in std::mem::take(&mut self.path) {
                    self.travel(goal);
                }
                if self.battery <= LOW_BATTERY_AFTER_PATH {
                    Some(RobotMsg::RobotLowBattery)
                } else {
                    Some(RobotMsg::RobotPathRequest)
                }
            }
            RobotMsg::ServerDeny => {
                warn!("server denied the robot");
                None
            }
            other => {
                debug!(kind = ?other, "ignoring message");
                None
            }
        };
        Ok(reply.map(Message::new))
    }

    /// Handle messages from `client` until it disconnects or `max_steps`
    /// messages have been handled. Returns the number handled.
    pub fn drive(&mut self, client: &Client<RobotMsg>, max_steps: Option<usize>) -> usize {
        let mut steps = 0;
        while client.is_connected() && max_steps.is_none_or(|max| steps < max) {
            if !client.incoming().wait_timeout(Duration::from_millis(100)) {
                continue;
            }
            let Some(owned) = client.incoming().pop_front() else {
                continue;
            };
            steps += 1;
            match self.handle(owned.msg) {
                Ok(Some(request)) => client.send(request),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "malformed message from server"),
            }
        }
        steps
    }

    fn travel(&mut self, goal: Goal) {
        info!(x = goal.x, y = goal.y, "next goal");
        self.pause(4);
        self.position = Some(goal);
        self.battery = self.battery.saturating_sub(GOAL_COST);
        self.goals_reached += 1;
        info!(battery = self.battery, "reached goal");
    }

    fn pause(&self, steps: u32) {
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay * steps);
        }
    }
}

impl Default for Robot {
    fn default() -> Self {
        Self::new()
    }
}
