//! # Parameter update callbacks
//!
//! The Crazyflie lib exposes parameter changes as a single stream of `(group.name, value)` updates. This module
//! routes that stream to callbacks registered for one parameter or for a whole group:
//!
//! ``` no_run
//! # use std::sync::Arc;
//! # use crazyflie_flight::param_updates::ParamCallbacks;
//! # async fn watch(vehicle: Arc<dyn crazyflie_flight::vehicle::Vehicle>) {
//! let mut callbacks = ParamCallbacks::new();
//! callbacks.add_update_callback("deck", Some("bcFlow2"), |name, value| {
//!     println!("{} = {:?}", name, value);
//! });
//! let dispatcher = callbacks.start(vehicle).await;
//! # }
//! ```
//!
//! Once started, the current value of every parameter subscribed by name is read once, so that callbacks are
//! called at least once even if the parameter never changes.

use std::sync::Arc;

use crazyflie_lib::Value;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::vehicle::Vehicle;

type Callback = Box<dyn Fn(&str, Value) + Send + Sync>;

struct Subscription {
    group: String,
    name: Option<String>,
    callback: Callback,
}

impl Subscription {
    fn matches(&self, full_name: &str) -> bool {
        match full_name.split_once('.') {
            Some((group, name)) => {
                self.group == group && self.name.as_deref().map_or(true, |n| n == name)
            }
            None => false,
        }
    }
}

/// Set of parameter update callbacks
#[derive(Default)]
pub struct ParamCallbacks {
    subscriptions: Vec<Subscription>,
}

impl ParamCallbacks {
    /// Empty set of callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for the parameter `group.name`, or for all parameters of `group` if `name` is `None`
    ///
    /// The callback receives the full parameter name and its new value. It is called from the dispatcher task and
    /// should not block.
    pub fn add_update_callback<F>(&mut self, group: &str, name: Option<&str>, callback: F)
    where
        F: Fn(&str, Value) + Send + Sync + 'static,
    {
        self.subscriptions.push(Subscription {
            group: group.to_owned(),
            name: name.map(str::to_owned),
            callback: Box::new(callback),
        });
    }

    /// Call every callback registered for `full_name`, returns the number of callbacks called
    pub fn dispatch(&self, full_name: &str, value: Value) -> usize {
        let mut called = 0;
        for subscription in self.subscriptions.iter().filter(|s| s.matches(full_name)) {
            (subscription.callback)(full_name, value);
            called += 1;
        }
        called
    }

    /// Full names of the parameters subscribed by name
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscriptions
            .iter()
            .filter_map(|s| s.name.as_ref().map(|name| format!("{}.{}", s.group, name)))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Start delivering the updates of `vehicle`
    ///
    /// The subscription to the vehicle is made before this function returns, no update happening after it can be
    /// missed. Delivery stops when the returned [ParamDispatcher] is stopped or dropped, or when the vehicle
    /// disconnects.
    pub async fn start(self, vehicle: Arc<dyn Vehicle>) -> ParamDispatcher {
        let mut updates = vehicle.param_watch().await;
        let callbacks = Arc::new(self);

        let task = tokio::spawn(async move {
            for name in callbacks.names() {
                match vehicle.param_get(&name).await {
                    Ok(value) => {
                        callbacks.dispatch(&name, value);
                    }
                    Err(e) => log::warn!("Cannot read parameter {}: {}", name, e),
                }
            }

            while let Some((name, value)) = updates.next().await {
                log::trace!("Param update {} = {:?}", name, value);
                callbacks.dispatch(&name, value);
            }
            log::debug!("Param update stream closed");
        });

        ParamDispatcher { task }
    }
}

/// Running parameter update delivery
pub struct ParamDispatcher {
    task: JoinHandle<()>,
}

impl ParamDispatcher {
    /// Stop delivering updates
    pub fn stop(self) {
        self.task.abort();
    }

    /// True while updates are delivered
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ParamDispatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
