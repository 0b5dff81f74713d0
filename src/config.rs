//! # Flight configuration
//!
//! Every program in this crate connects to one Crazyflie identified by a link URI and flies it with a few default
//! values. [FlightConfig] gathers them. It can be built in code with [FlightConfig::default()] or parsed from the
//! command line with [clap], each option falling back to an environment variable:
//!
//! | Option | Environment | Default |
//! |--------|-------------|---------|
//! | `--uri` | `CRAZYFLIE_URI` | `radio://0/120/2M/E7E7E7EC1D` |
//! | `--cache-dir` | `CRAZYFLIE_CACHE_DIR` | `./cache` |
//! | `--no-cache` | | |
//! | `--enable-debug-driver` | `CRAZYFLIE_DEBUG_DRIVER` | `false` |
//! | `--default-height` | `CRAZYFLIE_DEFAULT_HEIGHT` | `0.5` |
//! | `--default-velocity` | `CRAZYFLIE_DEFAULT_VELOCITY` | `0.3` |
//! | `--hover-time` | `CRAZYFLIE_HOVER_TIME` | `3` |
//! | `--deck` | `CRAZYFLIE_DECK` | `bcFlow2` |
//! | `--deck-timeout` | `CRAZYFLIE_DECK_TIMEOUT` | `1` |

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default link URI
pub const DEFAULT_URI: &str = "radio://0/120/2M/E7E7E7EC1D";
/// Default TOC cache directory
pub const DEFAULT_CACHE_DIR: &str = "./cache";
/// Default flight height in meters
pub const DEFAULT_HEIGHT: f32 = 0.5;
/// Default velocity in meters/second
pub const DEFAULT_VELOCITY: f32 = 0.3;
/// Default deck required by the motion flying program
pub const DEFAULT_DECK: &str = "bcFlow2";

const URI_SCHEMES: [&str; 3] = ["radio", "usb", "debug"];

/// Connection and flight defaults
#[derive(Debug, Clone, clap::Args)]
pub struct FlightConfig {
    /// Link URI of the Crazyflie
    #[arg(long, env = "CRAZYFLIE_URI", default_value = DEFAULT_URI)]
    pub uri: String,

    /// Directory where the log and param TOCs are cached
    #[arg(long, env = "CRAZYFLIE_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Disable the TOC cache
    #[arg(long)]
    pub no_cache: bool,

    /// Accept `debug://` URIs and fly the simulated vehicle
    #[arg(long, env = "CRAZYFLIE_DEBUG_DRIVER")]
    pub enable_debug_driver: bool,

    /// Default flight height (meters)
    #[arg(long, env = "CRAZYFLIE_DEFAULT_HEIGHT", default_value_t = DEFAULT_HEIGHT)]
    pub default_height: f32,

    /// Default velocity (meters/second)
    #[arg(long, env = "CRAZYFLIE_DEFAULT_VELOCITY", default_value_t = DEFAULT_VELOCITY)]
    pub default_velocity: f32,

    /// Hover time (seconds)
    #[arg(long, env = "CRAZYFLIE_HOVER_TIME", default_value_t = 3.0)]
    pub hover_time: f32,

    /// Deck that must be attached before flying (see `deck.*` parameters)
    #[arg(long, env = "CRAZYFLIE_DECK", default_value = DEFAULT_DECK)]
    pub deck: String,

    /// Maximum time to wait for the deck detection (seconds)
    #[arg(long, env = "CRAZYFLIE_DECK_TIMEOUT", default_value_t = 1.0)]
    pub deck_timeout: f32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_owned(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            no_cache: false,
            enable_debug_driver: false,
            default_height: DEFAULT_HEIGHT,
            default_velocity: DEFAULT_VELOCITY,
            hover_time: 3.0,
            deck: DEFAULT_DECK.to_owned(),
            deck_timeout: 1.0,
        }
    }
}

impl FlightConfig {
    /// Configuration flying the simulated vehicle at `uri` (which must be a `debug://` URI)
    pub fn debug(uri: &str) -> Self {
        Self {
            uri: uri.to_owned(),
            no_cache: true,
            enable_debug_driver: true,
            ..Default::default()
        }
    }

    /// Scheme of the configured URI, for example `radio`
    pub fn scheme(&self) -> Option<&str> {
        self.uri.split_once("://").map(|(scheme, _)| scheme)
    }

    /// True if the URI targets the simulated vehicle
    pub fn is_debug_uri(&self) -> bool {
        self.scheme() == Some("debug")
    }

    /// Hover time as a [Duration]
    ///
    /// Zero if the hover time is not a valid duration, see [FlightConfig::validate()].
    pub fn hover_duration(&self) -> Duration {
        Duration::try_from_secs_f32(self.hover_time).unwrap_or_default()
    }

    /// Deck detection timeout as a [Duration]
    ///
    /// Zero if the timeout is not a valid duration, see [FlightConfig::validate()].
    pub fn deck_wait(&self) -> Duration {
        Duration::try_from_secs_f32(self.deck_timeout).unwrap_or_default()
    }

    /// TOC cache directory, or `None` if caching is disabled
    pub fn toc_cache_dir(&self) -> Option<&std::path::Path> {
        if self.no_cache {
            None
        } else {
            Some(&self.cache_dir)
        }
    }

    /// Check the configuration for consistency
    ///
    /// Returns [Error::Config] if the URI scheme is unknown, if a `debug://` URI is used while the debug driver is
    /// disabled, if one of the flight values is not strictly positive, or if a time is not finite or too large to
    /// be waited for.
    pub fn validate(&self) -> Result<()> {
        match self.scheme() {
            Some(scheme) if URI_SCHEMES.contains(&scheme) => (),
            _ => return Err(Error::Config(format!("Unsupported URI {}", self.uri))),
        }

        if self.is_debug_uri() && !self.enable_debug_driver {
            return Err(Error::Config(format!(
                "{} requires the debug driver to be enabled",
                self.uri
            )));
        }

        for (name, value) in [
            ("default height", self.default_height),
            ("default velocity", self.default_velocity),
            ("deck timeout", self.deck_timeout),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::Config(format!("{} must be > 0, got {}", name, value)));
            }
        }

        for (name, value) in [
            ("hover time", self.hover_time),
            ("deck timeout", self.deck_timeout),
        ] {
            if Duration::try_from_secs_f32(value).is_err() {
                return Err(Error::Config(format!("{} of {}s is not a valid duration", name, value)));
            }
        }

        Ok(())
    }
}
