//! # Deck detection
//!
//! Decks are the expansion boards stacked on the Crazyflie. The firmware detects them at startup and publishes one
//! read-only parameter per known deck in the `deck` group, set to a non-zero value when the deck is attached (for
//! example `deck.bcFlow2` for the Flow deck v2).
//!
//! [DeckMonitor] follows such a parameter and exposes its state as a [DeckStatus]. The state is `Unknown` until
//! the first value is received, [DeckMonitor::wait_known()] waits for it instead of guessing a delay.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::param_updates::{ParamCallbacks, ParamDispatcher};
use crate::vehicle::Vehicle;

/// Deck parameter names of the common Bitcraze decks
pub const KNOWN_DECKS: [&str; 7] = [
    "bcFlow",
    "bcFlow2",
    "bcZRanger2",
    "bcLighthouse4",
    "bcLoco",
    "bcMultiranger",
    "bcAI",
];

/// Deck presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckStatus {
    /// No value received yet
    Unknown,
    /// The deck parameter is non-zero
    Attached,
    /// The deck parameter is zero
    Detached,
}

impl DeckStatus {
    /// Status matching a deck parameter value, any non-zero value means attached
    pub fn from_value(value: f64) -> Self {
        if value != 0.0 {
            DeckStatus::Attached
        } else {
            DeckStatus::Detached
        }
    }

    /// True only for [DeckStatus::Attached]
    pub fn is_attached(&self) -> bool {
        *self == DeckStatus::Attached
    }
}

impl fmt::Display for DeckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeckStatus::Unknown => "unknown",
            DeckStatus::Attached => "attached",
            DeckStatus::Detached => "NOT attached",
        })
    }
}

/// Follows the presence of one deck
pub struct DeckMonitor {
    deck: String,
    status: watch::Receiver<DeckStatus>,
    _dispatcher: ParamDispatcher,
}

impl DeckMonitor {
    /// Start following `deck.<deck>` on `vehicle`
    pub async fn attach(vehicle: Arc<dyn Vehicle>, deck: &str) -> Self {
        Self::attach_with(vehicle, deck, |_, _| ()).await
    }

    /// Like [DeckMonitor::attach()], `on_update` is also called with the raw value and the status on every update
    pub async fn attach_with<F>(vehicle: Arc<dyn Vehicle>, deck: &str, on_update: F) -> Self
    where
        F: Fn(f64, DeckStatus) + Send + Sync + 'static,
    {
        if !KNOWN_DECKS.contains(&deck) {
            log::warn!("Unknown deck {}, following deck.{} anyway", deck, deck);
        }

        let (tx, status) = watch::channel(DeckStatus::Unknown);

        let mut callbacks = ParamCallbacks::new();
        callbacks.add_update_callback("deck", Some(deck), move |name, value| {
            let value = value.to_f64_lossy();
            let deck_status = DeckStatus::from_value(value);
            log::info!("Deck is {}! ({} = {})", deck_status, name, value);
            on_update(value, deck_status);
            tx.send_replace(deck_status);
        });
        let dispatcher = callbacks.start(vehicle).await;

        Self {
            deck: deck.to_owned(),
            status,
            _dispatcher: dispatcher,
        }
    }

    /// Name of the followed deck
    pub fn deck(&self) -> &str {
        &self.deck
    }

    /// Last known status
    pub fn status(&self) -> DeckStatus {
        *self.status.borrow()
    }

    /// Wait until the deck status is known, for at most `timeout`
    ///
    /// Returns [DeckStatus::Unknown] if no value was received in time.
    pub async fn wait_known(&self, timeout: Duration) -> DeckStatus {
        let mut status = self.status.clone();
        let known = status.wait_for(|s| *s != DeckStatus::Unknown);
        let known = match tokio::time::timeout(timeout, known).await {
            Ok(Ok(known)) => *known,
            _ => self.status(),
        };
        known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimVehicle;
    use crazyflie_lib::Value;

    #[test]
    fn non_zero_means_attached() {
        assert_eq!(DeckStatus::from_value(1.0), DeckStatus::Attached);
        assert_eq!(DeckStatus::from_value(2.0), DeckStatus::Attached);
        assert_eq!(DeckStatus::from_value(0.0), DeckStatus::Detached);
        assert!(!DeckStatus::Unknown.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn attached_deck_is_detected() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let monitor = DeckMonitor::attach(sim, "bcFlow2").await;

        assert_eq!(
            monitor.wait_known(Duration::from_secs(1)).await,
            DeckStatus::Attached
        );
    }

    #[tokio::test(start_paused = true)]
    async fn status_follows_updates() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let monitor = DeckMonitor::attach(sim.clone(), "bcLoco").await;
        assert_eq!(
            monitor.wait_known(Duration::from_secs(1)).await,
            DeckStatus::Detached
        );

        sim.update_param("deck.bcLoco", Value::U8(1));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(monitor.status(), DeckStatus::Attached);
    }

    #[tokio::test(start_paused = true)]
    async fn every_update_reaches_the_observer() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let monitor = DeckMonitor::attach_with(sim.clone(), "bcFlow2", move |value, status| {
            sink.lock().unwrap().push((value, status));
        })
        .await;
        monitor.wait_known(Duration::from_secs(1)).await;

        sim.update_param("deck.bcFlow2", Value::U8(0));
        sim.update_param("deck.bcFlow2", Value::U8(2));
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1.0, DeckStatus::Attached),
                (0.0, DeckStatus::Detached),
                (2.0, DeckStatus::Attached),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_deck_param_stays_unknown() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        sim.remove_param("deck.bcFlow2");
        let monitor = DeckMonitor::attach(sim, "bcFlow2").await;

        assert_eq!(
            monitor.wait_known(Duration::from_secs(1)).await,
            DeckStatus::Unknown
        );
    }
}
