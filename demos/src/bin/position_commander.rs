// Fly with the position high-level commander and read telemetry.
//
// This demo requires a positioning system. The default command prints the first tdoa2 log configuration until
// interrupted.

use std::time::Duration;

use clap::{Parser, Subcommand};
use crazyflie_flight::{flights, log_config, FlightConfig};

#[derive(Parser)]
#[command(about = "Position commander and telemetry demos")]
struct Args {
    #[command(flatten)]
    config: FlightConfig,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Print the tdoa2 distances synchronously
    Log {
        /// Stop after this number of samples
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the stabilizer attitude from a callback
    LogAsync {
        /// Logging time (seconds)
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Stay connected for 10 seconds
    Connect,
    /// Take off, go to (0, 0, 1) and hover
    Sequence,
    /// Absolute and relative movements
    Complex,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();

    let args = Args::parse();
    let vehicle = crazyflie_flight::connect(&args.config).await?;

    let result = match args.command.unwrap_or(Command::Log { limit: None }) {
        Command::Log { limit } => {
            let [tdoa_first, _] = log_config::tdoa2();
            flights::simple_log(vehicle.clone(), &[tdoa_first], limit)
                .await
                .map(|_| ())
        }
        Command::LogAsync { seconds } => {
            flights::simple_log_async(
                vehicle.clone(),
                log_config::stabilizer(),
                Duration::from_secs(seconds),
            )
            .await
        }
        Command::Connect => {
            flights::simple_connect(Duration::from_secs(10)).await;
            Ok(())
        }
        Command::Sequence => flights::simple_sequence(vehicle.clone(), Duration::from_secs(10)).await,
        Command::Complex => flights::slightly_more_complex_usage(vehicle.clone()).await,
    };

    vehicle.disconnect().await;
    Ok(result?)
}
