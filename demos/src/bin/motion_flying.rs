// Take off, hover and land with the motion commander, only if the flow deck is attached.
//
// Change the URI with `--uri` or the `CRAZYFLIE_URI` environment variable. Use `--uri debug://0/0
// --enable-debug-driver` to fly the simulated vehicle.

use clap::Parser;
use crazyflie_flight::flights::{self, FlightOutcome};
use crazyflie_flight::FlightConfig;

#[derive(Parser)]
#[command(about = "Take off, hover and land if the deck is attached")]
struct Args {
    #[command(flatten)]
    config: FlightConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();

    let args = Args::parse();
    let vehicle = crazyflie_flight::connect(&args.config).await?;

    let result = flights::fly_if_deck_attached(vehicle.clone(), &args.config).await;
    vehicle.disconnect().await;

    if let FlightOutcome::Skipped(status) = result? {
        log::info!("Deck {} is {}", args.config.deck, status);
    }

    Ok(())
}
