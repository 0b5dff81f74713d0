//! # Simulated vehicle
//!
//! [SimVehicle] is the debug driver: an in-process vehicle reachable with `debug://` URIs when the debug driver is
//! enabled in the [FlightConfig](crate::config::FlightConfig). It does not fly anything, it records every command
//! it receives with the time it was received and serves parameters and log variables from memory.
//!
//! It is mostly useful to run the flight programs without hardware and to test code written against
//! [Vehicle](crate::vehicle::Vehicle):
//! ```
//! # use crazyflie_flight::sim::{SimCommand, SimVehicle};
//! # use crazyflie_flight::vehicle::Vehicle;
//! # #[tokio::main] async fn main() -> crazyflie_flight::Result<()> {
//! let sim = SimVehicle::new("debug://0/0");
//! sim.hl_take_off(0.5, 2.0).await?;
//! assert_eq!(
//!     sim.commands()[0].command,
//!     SimCommand::TakeOff { height: 0.5, duration: 2.0 }
//! );
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use crazyflie_lib::{Value, ValueType};
use futures::channel::mpsc;
use futures::StreamExt;
use tokio::time::{Instant, Interval};

use crate::log_config::{LogConfig, LogEntry};
use crate::vehicle::{LogSession, ParamUpdates, Vehicle};
use crate::{Error, Result};

/// Command received by a [SimVehicle]
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    /// [Vehicle::setpoint_hover()]
    Hover {
        /// Body-fixed x velocity (m/s)
        vx: f32,
        /// Body-fixed y velocity (m/s)
        vy: f32,
        /// Yaw rate (deg/s)
        yawrate: f32,
        /// Absolute height (m)
        zdistance: f32,
    },
    /// [Vehicle::setpoint_stop()]
    Stop,
    /// [Vehicle::notify_setpoint_stop()] with the validity in milliseconds
    NotifySetpointStop(u32),
    /// [Vehicle::hl_take_off()]
    TakeOff {
        /// Target height (m)
        height: f32,
        /// Duration (s)
        duration: f32,
    },
    /// [Vehicle::hl_land()]
    Land {
        /// Target height (m)
        height: f32,
        /// Duration (s)
        duration: f32,
    },
    /// [Vehicle::hl_go_to()]
    GoTo {
        /// Target x (m)
        x: f32,
        /// Target y (m)
        y: f32,
        /// Target z (m)
        z: f32,
        /// Target yaw (rad)
        yaw: f32,
        /// Duration (s)
        duration: f32,
        /// Relative to the current position
        relative: bool,
    },
    /// [Vehicle::hl_stop()]
    HlStop,
    /// [Vehicle::param_set()], with the value after conversion to the parameter type
    ParamSet {
        /// Full parameter name
        name: String,
        /// Value written
        value: f64,
    },
}

/// A [SimCommand] and the time it was received
#[derive(Debug, Clone)]
pub struct SimRecord {
    /// Reception time
    pub at: Instant,
    /// Command received
    pub command: SimCommand,
}

const DEFAULT_PARAMS: [(&str, Value); 10] = [
    ("deck.bcFlow", Value::U8(0)),
    ("deck.bcFlow2", Value::U8(1)),
    ("deck.bcZRanger2", Value::U8(0)),
    ("deck.bcLighthouse4", Value::U8(0)),
    ("deck.bcLoco", Value::U8(0)),
    ("deck.bcMultiranger", Value::U8(0)),
    ("deck.bcAI", Value::U8(0)),
    ("stabilizer.controller", Value::U8(0)),
    ("commander.enHighLevel", Value::U8(0)),
    ("kalman.resetEstimation", Value::U8(0)),
];

const DEFAULT_LOG_VARIABLES: [&str; 14] = [
    "stabilizer.roll",
    "stabilizer.pitch",
    "stabilizer.yaw",
    "stateEstimate.x",
    "stateEstimate.y",
    "stateEstimate.z",
    "tdoa2.d7-0",
    "tdoa2.d0-1",
    "tdoa2.d1-2",
    "tdoa2.d2-3",
    "tdoa2.d3-4",
    "tdoa2.d4-5",
    "tdoa2.d5-6",
    "tdoa2.d6-7",
];

type ParamWatchers = Vec<mpsc::UnboundedSender<(String, Value)>>;

struct SimState {
    connected: bool,
    commands: Vec<SimRecord>,
    params: HashMap<String, Value>,
    log_values: BTreeMap<String, f64>,
    active_log_blocks: usize,
    log_samples: usize,
    watchers: ParamWatchers,
}

fn notify_watchers(watchers: &mut ParamWatchers, name: &str, value: Value) {
    // Watchers that have been dropped are removed
    watchers.retain(|watcher| watcher.unbounded_send((name.to_owned(), value)).is_ok());
}

/// Simulated Crazyflie
pub struct SimVehicle {
    uri: String,
    started: Instant,
    state: Arc<Mutex<SimState>>,
}

impl SimVehicle {
    /// Create a connected simulated vehicle
    ///
    /// The vehicle starts with all the `deck.*` parameters of the common decks, only the Flow deck v2 being
    /// attached, and with the stabilizer, state estimate and TDoA2 log variables set to 0.
    pub fn new(uri: &str) -> Self {
        let state = SimState {
            connected: true,
            commands: Vec::new(),
            params: DEFAULT_PARAMS
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            log_values: DEFAULT_LOG_VARIABLES
                .iter()
                .map(|name| ((*name).to_owned(), 0.0))
                .collect(),
            active_log_blocks: 0,
            log_samples: 0,
            watchers: Vec::new(),
        };

        Self {
            uri: uri.to_owned(),
            started: Instant::now(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    fn record(&self, command: SimCommand) -> Result<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(Error::Disconnected);
        }
        state.commands.push(SimRecord {
            at: Instant::now(),
            command,
        });
        Ok(())
    }

    /// Commands received so far, oldest first
    pub fn commands(&self) -> Vec<SimRecord> {
        self.state().commands.clone()
    }

    /// Forget the commands received so far
    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    /// Current value of a parameter
    pub fn param(&self, name: &str) -> Option<Value> {
        self.state().params.get(name).copied()
    }

    /// Change a parameter as the firmware would, watchers are notified
    ///
    /// Unknown parameters are created.
    pub fn update_param(&self, name: &str, value: Value) {
        let mut state = self.state();
        state.params.insert(name.to_owned(), value);
        notify_watchers(&mut state.watchers, name, value);
    }

    /// Remove a parameter from the TOC, for example to simulate an older firmware
    pub fn remove_param(&self, name: &str) {
        self.state().params.remove(name);
    }

    /// Set the value sampled for a log variable, unknown variables are added to the log TOC
    pub fn set_log_value(&self, name: &str, value: f64) {
        self.state().log_values.insert(name.to_owned(), value);
    }

    /// Number of log blocks currently running
    pub fn active_log_blocks(&self) -> usize {
        self.state().active_log_blocks
    }

    /// Number of log samples sent so far, by all log blocks
    pub fn log_samples(&self) -> usize {
        self.state().log_samples
    }

    /// True until [Vehicle::disconnect()] is called
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    // The state stays consistent even if a holder panicked
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Vehicle for SimVehicle {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn param_get(&self, name: &str) -> Result<Value> {
        let state = self.state();
        if !state.connected {
            return Err(Error::Disconnected);
        }
        state
            .params
            .get(name)
            .copied()
            .ok_or_else(|| Error::VariableNotFound(name.to_owned()))
    }

    async fn param_set(&self, name: &str, value: Value) -> Result<()> {
        let current = self.param_get(name).await?;
        let value = Value::from_f64_lossy(ValueType::from(current), value.to_f64_lossy());

        self.record(SimCommand::ParamSet {
            name: name.to_owned(),
            value: value.to_f64_lossy(),
        })?;
        self.update_param(name, value);

        Ok(())
    }

    async fn param_watch(&self) -> ParamUpdates {
        let (tx, rx) = mpsc::unbounded();

        let mut state = self.state();
        if state.connected {
            state.watchers.push(tx);
        }

        rx.boxed()
    }

    async fn setpoint_hover(&self, vx: f32, vy: f32, yawrate: f32, zdistance: f32) -> Result<()> {
        self.record(SimCommand::Hover {
            vx,
            vy,
            yawrate,
            zdistance,
        })
    }

    async fn setpoint_stop(&self) -> Result<()> {
        self.record(SimCommand::Stop)
    }

    async fn notify_setpoint_stop(&self, remain_valid_milliseconds: u32) -> Result<()> {
        self.record(SimCommand::NotifySetpointStop(remain_valid_milliseconds))
    }

    async fn hl_take_off(&self, height: f32, duration: f32) -> Result<()> {
        self.record(SimCommand::TakeOff { height, duration })
    }

    async fn hl_land(&self, height: f32, duration: f32) -> Result<()> {
        self.record(SimCommand::Land { height, duration })
    }

    async fn hl_go_to(
        &self,
        x: f32,
        y: f32,
        z: f32,
        yaw: f32,
        duration: f32,
        relative: bool,
    ) -> Result<()> {
        self.record(SimCommand::GoTo {
            x,
            y,
            z,
            yaw,
            duration,
            relative,
        })
    }

    async fn hl_stop(&self) -> Result<()> {
        self.record(SimCommand::HlStop)
    }

    async fn open_log(&self, config: &LogConfig) -> Result<Box<dyn LogSession>> {
        let mut state = self.state();
        if !state.connected {
            return Err(Error::Disconnected);
        }

        if let Some(missing) = config
            .variables()
            .iter()
            .find(|v| !state.log_values.contains_key(&v.name))
        {
            return Err(Error::VariableNotFound(missing.name.clone()));
        }
        state.active_log_blocks += 1;

        Ok(Box::new(SimLogSession {
            config: config.clone(),
            started: self.started,
            interval: tokio::time::interval(config.period()),
            state: self.state.clone(),
        }))
    }

    async fn disconnect(&self) {
        let mut state = self.state();
        state.connected = false;
        state.watchers.clear();
    }
}

struct SimLogSession {
    config: LogConfig,
    started: Instant,
    interval: Interval,
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl LogSession for SimLogSession {
    async fn next(&mut self) -> Result<LogEntry> {
        self.interval.tick().await;

        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::Disconnected);
        }
        state.log_samples += 1;

        let data: Vec<(String, Value)> = self
            .config
            .variables()
            .iter()
            .map(|v| {
                let value = state.log_values.get(&v.name).copied().unwrap_or_default();
                (v.name.clone(), Value::F32(value as f32))
            })
            .collect();
        let timestamp = self.started.elapsed().as_millis() as u32;

        self.config
            .make_entry(timestamp, data.iter().map(|(name, value)| (name, value)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut state = lock(&self.state);
        state.active_log_blocks = state.active_log_blocks.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_config;

    #[tokio::test]
    async fn param_set_keeps_the_param_type_and_notifies() {
        let sim = SimVehicle::new("debug://0/0");
        let mut watcher = sim.param_watch().await;

        sim.param_set("stabilizer.controller", Value::F32(2.0))
            .await
            .unwrap();

        assert!(matches!(sim.param("stabilizer.controller"), Some(Value::U8(2))));
        let (name, value) = watcher.next().await.unwrap();
        assert_eq!(name, "stabilizer.controller");
        assert_eq!(value.to_f64_lossy(), 2.0);
    }

    #[tokio::test]
    async fn unknown_param_is_an_error() {
        let sim = SimVehicle::new("debug://0/0");
        assert!(matches!(
            sim.param_get("deck.bcNope").await,
            Err(Error::VariableNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn log_session_samples_at_the_config_period() {
        let sim = SimVehicle::new("debug://0/0");
        sim.set_log_value("stabilizer.roll", 1.5);

        let mut session = sim.open_log(&log_config::stabilizer()).await.unwrap();
        assert_eq!(sim.active_log_blocks(), 1);

        let first = session.next().await.unwrap();
        let second = session.next().await.unwrap();
        assert_eq!(second.timestamp - first.timestamp, 10);
        assert_eq!(first.get_f64("stabilizer.roll"), Some(1.5));
        assert_eq!(first.config_name, "Stabilizer");

        session.close().await.unwrap();
        assert_eq!(sim.active_log_blocks(), 0);
    }

    #[tokio::test]
    async fn commands_fail_after_disconnect() {
        let sim = SimVehicle::new("debug://0/0");
        sim.disconnect().await;

        assert!(!sim.is_connected());
        assert!(matches!(sim.setpoint_stop().await, Err(Error::Disconnected)));
        assert!(sim.open_log(&log_config::stabilizer()).await.is_err());
    }
}
