//! # Crazyflie flight
//!
//! This crate flies the Crazyflie on top of the [crazyflie-lib] crate. It provides scoped flight sessions that take
//! off when entered and land when left, and telemetry loggers that read log blocks synchronously or from callbacks.
//!
//! ## Status
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [vehicle] | Connection to a real or simulated Crazyflie |
//! | [deck] | Deck detection from the `deck.*` parameters |
//! | [motion_commander] | Velocity based flight with hover setpoints |
//! | [position_hl_commander] | Position based flight with the high-level commander |
//! | [log_config] | Log block definitions |
//! | [logger] | Synchronous and callback based telemetry |
//! | [flights] | Ready-made flight programs |
//!
//! ## Usage
//!
//! The basic procedure to use the crate is:
//!  - Build a [FlightConfig], from the command line or with [FlightConfig::default()]
//!  - Open a vehicle with [connect()], `debug://` URIs open a simulated vehicle
//!  - Enter a commander, fly, and exit it to land
//!  - Drop the vehicle or call [Vehicle::disconnect()]
//!
//! All vehicle functions are only taking an un-mutable reference to self (`&self`), the intention is for the
//! vehicle to be shared between the commanders, loggers and tasks using `Arc<>`.
//!
//! For example:
//! ``` no_run
//! # async fn fly() -> crazyflie_flight::Result<()> {
//! use crazyflie_flight::{motion_commander::MotionCommander, FlightConfig};
//!
//! let config = FlightConfig::default();
//! let vehicle = crazyflie_flight::connect(&config).await?;
//!
//! let mut mc = MotionCommander::enter(vehicle.clone(), config.default_height).await?;
//! mc.forward(0.5, None).await?;
//! mc.turn_left(90.0, None).await?;
//! mc.exit().await?;
//!
//! vehicle.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! [crazyflie-lib]: https://crates.io/crates/crazyflie-lib

#![warn(missing_docs)]

pub mod config;
pub mod crazyflie;
pub mod deck;
mod error;
pub mod flights;
pub mod log_config;
pub mod logger;
pub mod motion_commander;
pub mod param_updates;
pub mod position_hl_commander;
pub mod sim;
pub mod toc_cache;
pub mod vehicle;

pub use crate::config::FlightConfig;
pub use crate::error::{Error, Result};
pub use crate::vehicle::{connect, Vehicle};
pub use crazyflie_lib::{Value, ValueType};
