//! # Vehicle session
//!
//! Everything in this crate talks to the Crazyflie through the [Vehicle] trait. It covers the small part of the
//! Crazyflie lib API the commanders and loggers need: parameters, low-level and high-level setpoints and log
//! blocks. Two implementations exist:
//!  - [CrazyflieVehicle](crate::crazyflie::CrazyflieVehicle), a real Crazyflie connected with the
//!    [crazyflie-lib] crate,
//!  - [SimVehicle](crate::sim::SimVehicle), an in-process simulated vehicle reachable with `debug://` URIs.
//!
//! Like the Crazyflie lib subsystems, all methods take `&self` so that a vehicle can be shared between tasks in an
//! `Arc<dyn Vehicle>`. Use [connect()] to open one from a [FlightConfig].
//!
//! High-level commands return as soon as the command has been sent. Callers that need to wait for the end of the
//! movement should wait for the planned duration, counted from the time the command was issued.
//!
//! [crazyflie-lib]: https://crates.io/crates/crazyflie-lib

use std::sync::Arc;

use async_trait::async_trait;
use crazyflie_lib::Value;
use futures::stream::BoxStream;

use crate::config::FlightConfig;
use crate::log_config::{LogConfig, LogEntry};
use crate::sim::SimVehicle;
use crate::Result;

/// Stream of `(group.name, value)` parameter updates
pub type ParamUpdates = BoxStream<'static, (String, Value)>;

/// Connected Crazyflie, real or simulated
#[async_trait]
pub trait Vehicle: Send + Sync {
    /// URI this vehicle is connected to
    fn uri(&self) -> &str;

    /// Read a parameter value
    async fn param_get(&self, name: &str) -> Result<Value>;

    /// Write a parameter value, the value must have the type of the parameter
    async fn param_set(&self, name: &str, value: Value) -> Result<()>;

    /// Subscribe to parameter value changes
    async fn param_watch(&self) -> ParamUpdates;

    /// Hover setpoint: body-fixed x/y velocity (m/s), yaw rate (deg/s) and absolute height (m)
    async fn setpoint_hover(&self, vx: f32, vy: f32, yawrate: f32, zdistance: f32) -> Result<()>;

    /// Stop setpoint, cuts the motors
    async fn setpoint_stop(&self) -> Result<()>;

    /// Lower the priority of the low-level setpoints so that the high-level commander can take over
    async fn notify_setpoint_stop(&self, remain_valid_milliseconds: u32) -> Result<()>;

    /// High-level take-off to `height` meters in `duration` seconds
    async fn hl_take_off(&self, height: f32, duration: f32) -> Result<()>;

    /// High-level landing to `height` meters in `duration` seconds
    async fn hl_land(&self, height: f32, duration: f32) -> Result<()>;

    /// High-level go-to, absolute or relative, yaw in radians
    async fn hl_go_to(
        &self,
        x: f32,
        y: f32,
        z: f32,
        yaw: f32,
        duration: f32,
        relative: bool,
    ) -> Result<()>;

    /// Stop the high-level commander and disable the motors
    async fn hl_stop(&self) -> Result<()>;

    /// Create and start a log block for `config`
    async fn open_log(&self, config: &LogConfig) -> Result<Box<dyn LogSession>>;

    /// End the connection
    async fn disconnect(&self);
}

/// Running log block
#[async_trait]
pub trait LogSession: Send {
    /// Wait for the next sample
    async fn next(&mut self) -> Result<LogEntry>;

    /// Stop the log block in the Crazyflie
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Open a vehicle session
///
/// `debug://` URIs open a [SimVehicle] if the debug driver is enabled in the configuration, any other URI is
/// opened with the Crazyflie lib and uses the TOC cache directory of the configuration.
pub async fn connect(config: &FlightConfig) -> Result<Arc<dyn Vehicle>> {
    config.validate()?;

    if config.is_debug_uri() {
        log::info!("Opening simulated vehicle {}", config.uri);
        return Ok(Arc::new(SimVehicle::new(&config.uri)));
    }

    let vehicle =
        crate::crazyflie::CrazyflieVehicle::connect(&config.uri, config.toc_cache_dir()).await?;

    Ok(Arc::new(vehicle))
}
