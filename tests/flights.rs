// Flight programs run end to end against the simulated vehicle

use std::sync::Arc;
use std::time::Duration;

use crazyflie_flight::flights::{self, FlightOutcome};
use crazyflie_flight::log_config;
use crazyflie_flight::logger::SyncLogger;
use crazyflie_flight::position_hl_commander::{Position, PositionHlCommander};
use crazyflie_flight::sim::{SimCommand, SimVehicle};
use crazyflie_flight::{connect, Error, FlightConfig, Value};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn debug_uri_requires_the_debug_driver() {
    let mut config = FlightConfig::debug("debug://0/0");
    config.enable_debug_driver = false;

    assert!(matches!(connect(&config).await, Err(Error::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn motion_flight_on_a_debug_uri() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = FlightConfig::debug("debug://0/0");
    let vehicle = connect(&config).await?;
    assert_eq!(vehicle.uri(), "debug://0/0");

    let start = Instant::now();
    let outcome = flights::fly_if_deck_attached(vehicle.clone(), &config).await?;
    assert_eq!(outcome, FlightOutcome::Flown);
    assert!(start.elapsed() >= config.hover_duration());

    vehicle.disconnect().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hover_reaches_the_default_height_and_lands() -> Result<(), Box<dyn std::error::Error>> {
    let sim = Arc::new(SimVehicle::new("debug://0/0"));
    flights::take_off_simple(sim.clone(), 0.5, Duration::from_secs(3)).await?;

    let heights: Vec<f32> = sim
        .commands()
        .iter()
        .filter_map(|r| match r.command {
            SimCommand::Hover { zdistance, .. } => Some(zdistance),
            _ => None,
        })
        .collect();

    let top = heights.iter().cloned().fold(0.0, f32::max);
    assert!((top - 0.5).abs() < 1e-3, "top height {}", top);
    assert!(heights.last().map_or(false, |z| *z < 0.05));

    let tail: Vec<SimCommand> = sim
        .commands()
        .iter()
        .rev()
        .take(2)
        .map(|r| r.command.clone())
        .collect();
    assert_eq!(tail, vec![SimCommand::NotifySetpointStop(0), SimCommand::Stop]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn detached_deck_keeps_the_vehicle_on_the_ground() {
    let sim = Arc::new(SimVehicle::new("debug://0/0"));
    sim.update_param("deck.bcFlow2", Value::U8(0));
    let config = FlightConfig::debug("debug://0/0");

    let outcome = flights::fly_if_deck_attached(sim.clone(), &config)
        .await
        .unwrap();
    assert!(matches!(outcome, FlightOutcome::Skipped(_)));
    assert!(sim.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sequence_hovers_at_one_meter() -> Result<(), Box<dyn std::error::Error>> {
    let sim = Arc::new(SimVehicle::new("debug://0/0"));
    flights::simple_sequence(sim.clone(), Duration::from_secs(10)).await?;

    let go_to = sim
        .commands()
        .iter()
        .find_map(|r| match r.command {
            SimCommand::GoTo { x, y, z, .. } => Some((x, y, z)),
            _ => None,
        });
    assert_eq!(go_to, Some((0.0, 0.0, 1.0)));
    assert!(matches!(sim.param("commander.enHighLevel"), Some(Value::U8(1))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn position_is_tracked_across_movements() -> Result<(), Box<dyn std::error::Error>> {
    let sim = Arc::new(SimVehicle::new("debug://0/0"));
    let mut pc = PositionHlCommander::builder(sim.clone()).enter().await?;

    pc.forward(1.0, None).await?;
    pc.left(0.5, None).await?;
    pc.up(0.25, None).await?;
    assert_eq!(pc.position(), Position::new(1.0, 0.5, 0.75));

    pc.exit().await?;
    assert_eq!(sim.commands().last().map(|r| r.command.clone()), Some(SimCommand::HlStop));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn log_entries_follow_the_vehicle() -> Result<(), Box<dyn std::error::Error>> {
    let sim = Arc::new(SimVehicle::new("debug://0/0"));
    sim.set_log_value("stabilizer.roll", 12.5);

    let mut logger = SyncLogger::connect(sim.clone(), &[log_config::stabilizer()]).await?;
    let first = logger.next().await?;
    assert_eq!(first.get_f64("stabilizer.roll"), Some(12.5));

    sim.set_log_value("stabilizer.roll", -3.0);
    tokio::time::sleep(Duration::from_millis(15)).await;
    logger.next().await?;
    let last = logger.next().await?;
    assert_eq!(last.get_f64("stabilizer.roll"), Some(-3.0));
    assert!(last.timestamp > 0);

    logger.disconnect().await;
    assert_eq!(sim.active_log_blocks(), 0);
    Ok(())
}
