//! # Telemetry loggers
//!
//! Two ways to read the samples of [LogConfig]s:
//!  - [SyncLogger] pulls the samples, one at a time, from one or more log configurations,
//!  - [AsyncLogger] calls registered callbacks for each sample of one configuration until stopped.
//!
//! Each running log block is served by its own task. The blocks are stopped in the Crazyflie when the logger is
//! disconnected or stopped, and in the background if the logger is dropped.
//!
//! ``` no_run
//! # use std::sync::Arc;
//! # use crazyflie_flight::{log_config, logger::SyncLogger};
//! # async fn read(vehicle: Arc<dyn crazyflie_flight::vehicle::Vehicle>) -> crazyflie_flight::Result<()> {
//! let mut logger = SyncLogger::connect(vehicle, &[log_config::stabilizer()]).await?;
//! for _ in 0..100 {
//!     let entry = logger.next().await?;
//!     println!("{}", entry);
//! }
//! logger.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::log_config::{LogConfig, LogEntry};
use crate::vehicle::{LogSession, Vehicle};
use crate::{Error, Result};

/// Read `session` until stopped or until `deliver` returns false, then close it
async fn pump<F, Fut>(
    mut session: Box<dyn LogSession>,
    mut stop: watch::Receiver<bool>,
    name: String,
    mut deliver: F,
) where
    F: FnMut(Result<LogEntry>) -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            entry = session.next() => {
                let failed = entry.is_err();
                if !deliver(entry).await || failed {
                    break;
                }
            }
        }
    }

    match session.close().await {
        Ok(()) => log::debug!("Log block {} stopped", name),
        Err(e) => log::warn!("Cannot stop log block {}: {}", name, e),
    }
}

async fn open_all(
    vehicle: &Arc<dyn Vehicle>,
    configs: &[LogConfig],
) -> Result<Vec<Box<dyn LogSession>>> {
    let mut sessions = Vec::with_capacity(configs.len());

    for config in configs {
        match vehicle.open_log(config).await {
            Ok(session) => sessions.push(session),
            Err(e) => {
                for session in sessions {
                    let _ = session.close().await;
                }
                return Err(e);
            }
        }
    }

    Ok(sessions)
}

/// Pull based reader of one or more log configurations
pub struct SyncLogger {
    entries: flume::Receiver<Result<LogEntry>>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncLogger {
    /// Start the log configurations and begin receiving their samples
    ///
    /// If one of the configurations cannot be started, the ones already started are stopped and the error is
    /// returned.
    pub async fn connect(vehicle: Arc<dyn Vehicle>, configs: &[LogConfig]) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::LogConfig("No log configuration to start".to_owned()));
        }

        let sessions = open_all(&vehicle, configs).await?;
        let (tx, entries) = flume::unbounded();
        let (stop, stop_rx) = watch::channel(false);

        let tasks = sessions
            .into_iter()
            .zip(configs)
            .map(|(session, config)| {
                let tx = tx.clone();
                tokio::spawn(pump(
                    session,
                    stop_rx.clone(),
                    config.name().to_owned(),
                    move |entry| {
                        let tx = tx.clone();
                        async move { tx.send_async(entry).await.is_ok() }
                    },
                ))
            })
            .collect();

        Ok(Self {
            entries,
            stop,
            tasks,
        })
    }

    /// Wait for the next sample of any of the configurations
    ///
    /// Returns [Error::Disconnected] once all the log blocks have ended.
    pub async fn next(&mut self) -> Result<LogEntry> {
        self.entries
            .recv_async()
            .await
            .map_err(|_| Error::Disconnected)?
    }

    /// Samples as an async stream
    pub fn stream(&self) -> impl Stream<Item = Result<LogEntry>> + '_ {
        self.entries.stream()
    }

    /// True while at least one log block is running
    pub fn is_connected(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop all the log blocks
    pub async fn disconnect(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

type DataCallback = Box<dyn Fn(&LogEntry) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    data: Vec<DataCallback>,
    error: Vec<ErrorCallback>,
}

impl Callbacks {
    fn dispatch(&self, entry: &Result<LogEntry>) {
        match entry {
            Ok(entry) => self.data.iter().for_each(|cb| cb(entry)),
            Err(e) => self.error.iter().for_each(|cb| cb(e)),
        }
    }
}

/// Callback based reader of one log configuration
pub struct AsyncLogger {
    vehicle: Arc<dyn Vehicle>,
    config: LogConfig,
    callbacks: Arc<Mutex<Callbacks>>,
    running: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl AsyncLogger {
    /// Create a stopped logger for `config`
    pub fn new(vehicle: Arc<dyn Vehicle>, config: LogConfig) -> Self {
        Self {
            vehicle,
            config,
            callbacks: Arc::default(),
            running: None,
        }
    }

    /// Log configuration read by this logger
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Register a callback called with every sample, from the logger task
    ///
    /// Callbacks can be added while the logger is running.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        lock(&self.callbacks).data.push(Box::new(callback));
    }

    /// Register a callback called if the log block fails, the logger stops after an error
    pub fn add_error_callback<F>(&self, callback: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        lock(&self.callbacks).error.push(Box::new(callback));
    }

    /// Start the log block
    ///
    /// Returns [Error::LogConfig] if the logger is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::LogConfig(format!(
                "Log config {} already started",
                self.config.name()
            )));
        }

        let session = self.vehicle.open_log(&self.config).await?;
        let (stop, stop_rx) = watch::channel(false);
        let callbacks = self.callbacks.clone();

        let task = tokio::spawn(pump(
            session,
            stop_rx,
            self.config.name().to_owned(),
            move |entry| {
                lock(&callbacks).dispatch(&entry);
                futures::future::ready(true)
            },
        ));
        self.running = Some((stop, task));

        Ok(())
    }

    /// True between [AsyncLogger::start()] and [AsyncLogger::stop()], unless the log block failed
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map_or(false, |(_, task)| !task.is_finished())
    }

    /// Stop the log block, does nothing if not running
    pub async fn stop(&mut self) -> Result<()> {
        if let Some((stop, task)) = self.running.take() {
            let _ = stop.send(true);
            task.await?;
        }
        Ok(())
    }
}

fn lock(callbacks: &Mutex<Callbacks>) -> std::sync::MutexGuard<'_, Callbacks> {
    callbacks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
