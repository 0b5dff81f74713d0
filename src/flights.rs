//! # Flight programs
//!
//! Ready-made sequences used by the `motion_flying` and `position_commander` demos. They only need a connected
//! [Vehicle] and can be run against the simulated vehicle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::FlightConfig;
use crate::deck::{DeckMonitor, DeckStatus};
use crate::log_config::{LogConfig, LogEntry};
use crate::logger::{AsyncLogger, SyncLogger};
use crate::motion_commander::MotionCommander;
use crate::position_hl_commander::{Controller, PositionHlCommander};
use crate::vehicle::Vehicle;
use crate::{Error, Result};

/// Result of [fly_if_deck_attached()]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightOutcome {
    /// The deck was attached, the Crazyflie took off and landed
    Flown,
    /// The deck was not attached, or its status could not be read in time
    Skipped(DeckStatus),
}

/// Take off to the default height with the motion commander, hover for `hover` and land
pub async fn take_off_simple(
    vehicle: Arc<dyn Vehicle>,
    default_height: f32,
    hover: Duration,
) -> Result<()> {
    let mut mc = MotionCommander::enter(vehicle, default_height).await?;
    sleep(hover).await;
    mc.stop()?;
    mc.exit().await
}

/// Check that the configured deck is attached and, if so, run [take_off_simple()]
///
/// The deck parameter value and the deck presence are printed on every update.
pub async fn fly_if_deck_attached(
    vehicle: Arc<dyn Vehicle>,
    config: &FlightConfig,
) -> Result<FlightOutcome> {
    let monitor = DeckMonitor::attach_with(vehicle.clone(), &config.deck, |value, status| {
        println!("{}", value);
        if status.is_attached() {
            println!("Deck is attached!");
        } else {
            println!("Deck is NOT attached!");
        }
    })
    .await;

    match monitor.wait_known(config.deck_wait()).await {
        DeckStatus::Attached => {
            take_off_simple(vehicle, config.default_height, config.hover_duration()).await?;
            Ok(FlightOutcome::Flown)
        }
        status => {
            log::warn!("Deck {} is {}, not flying", monitor.deck(), status);
            Ok(FlightOutcome::Skipped(status))
        }
    }
}

/// Like [fly_if_deck_attached()], but a missing deck is an [Error::DeckNotAttached]
pub async fn fly_with_deck(vehicle: Arc<dyn Vehicle>, config: &FlightConfig) -> Result<()> {
    match fly_if_deck_attached(vehicle, config).await? {
        FlightOutcome::Flown => Ok(()),
        FlightOutcome::Skipped(_) => Err(Error::DeckNotAttached(config.deck.clone())),
    }
}

/// Stay connected for `duration`
pub async fn simple_connect(duration: Duration) {
    println!("I'm connected! :D");
    sleep(duration).await;
    println!("Now I will disconnect...");
}

/// Take off, go to (0, 0, 1) and hover there for `hover`
pub async fn simple_sequence(vehicle: Arc<dyn Vehicle>, hover: Duration) -> Result<()> {
    let mut pc = PositionHlCommander::builder(vehicle).enter().await?;
    pc.go_to(0.0, 0.0, Some(1.0), None).await?;
    sleep(hover).await;
    pc.exit().await
}

/// Absolute and relative movements, slow movement and change of the defaults
pub async fn slightly_more_complex_usage(vehicle: Arc<dyn Vehicle>) -> Result<()> {
    let mut pc = PositionHlCommander::builder(vehicle)
        .position(0.0, 0.0, 0.0)
        .default_velocity(0.3)
        .default_height(0.5)
        .controller(Controller::Pid)
        .enter()
        .await?;

    // Go to a coordinate
    pc.go_to(1.0, 1.0, Some(1.0), None).await?;

    // Move relative to the current position
    pc.right(1.0, None).await?;

    // Go to a coordinate and use default height
    pc.go_to(0.0, 0.0, None, None).await?;

    // Go slowly to a coordinate
    pc.go_to(1.0, 1.0, None, Some(0.2)).await?;

    // Set new default velocity and height
    pc.set_default_velocity(0.3)?;
    pc.set_default_height(1.0)?;
    pc.go_to(0.0, 0.0, None, None).await?;

    pc.exit().await
}

/// Print the samples of `configs` as they arrive
///
/// Stops after `limit` samples, or runs until the log blocks end if `limit` is `None`. Returns the number of
/// samples printed.
pub async fn simple_log(
    vehicle: Arc<dyn Vehicle>,
    configs: &[LogConfig],
    limit: Option<usize>,
) -> Result<usize> {
    let mut logger = SyncLogger::connect(vehicle, configs).await?;
    let mut printed = 0;

    let result = loop {
        if limit.map_or(false, |limit| printed >= limit) {
            break Ok(printed);
        }
        match logger.next().await {
            Ok(entry) => {
                println!("{}", entry);
                printed += 1;
            }
            Err(e) => break Err(e),
        }
    };

    logger.disconnect().await;
    result
}

fn print_entry(entry: &LogEntry) {
    println!("{}", entry);
}

/// Print the samples of `config` from a callback for `duration`
pub async fn simple_log_async(
    vehicle: Arc<dyn Vehicle>,
    config: LogConfig,
    duration: Duration,
) -> Result<()> {
    let mut logger = AsyncLogger::new(vehicle, config);
    logger.add_callback(print_entry);
    logger.add_error_callback(|e| log::error!("Log error: {}", e));

    logger.start().await?;
    sleep(duration).await;
    logger.stop().await
}
