//! # Crazyflie backend
//!
//! [Vehicle] implementation over a [Crazyflie] of the Crazyflie lib.

use std::convert::TryInto;
use std::path::Path;

use async_trait::async_trait;
use crazyflie_lib::subsystems::log::{LogPeriod, LogStream};
use crazyflie_lib::{Crazyflie, NoTocCache, Value};
use futures::StreamExt;

use crate::log_config::{LogConfig, LogEntry};
use crate::toc_cache::FileTocCache;
use crate::vehicle::{LogSession, ParamUpdates, Vehicle};
use crate::Result;

/// # Crazyflie connected with the Crazyflie lib
///
/// Dropping this object disconnects the Crazyflie, as does [Vehicle::disconnect()].
pub struct CrazyflieVehicle {
    uri: String,
    cf: Crazyflie,
}

impl CrazyflieVehicle {
    /// Connect to the Crazyflie at `uri`
    ///
    /// If `cache_dir` is set, the log and param TOCs are cached in this directory which makes subsequent
    /// connections to the same firmware much faster.
    pub async fn connect(uri: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let link_context = crazyflie_link::LinkContext::new();

        log::info!("Connecting to {}", uri);
        let cf = match cache_dir {
            Some(dir) => {
                let cache = FileTocCache::new(dir)?;
                Crazyflie::connect_from_uri(&link_context, uri, cache).await?
            }
            None => Crazyflie::connect_from_uri(&link_context, uri, NoTocCache).await?,
        };
        log::info!("Connected to {}", uri);

        Ok(Self {
            uri: uri.to_owned(),
            cf,
        })
    }

    /// Access the underlying Crazyflie lib object
    pub fn crazyflie(&self) -> &Crazyflie {
        &self.cf
    }
}

#[async_trait]
impl Vehicle for CrazyflieVehicle {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn param_get(&self, name: &str) -> Result<Value> {
        let value: Value = self.cf.param.get(name).await?;
        Ok(value)
    }

    async fn param_set(&self, name: &str, value: Value) -> Result<()> {
        self.cf.param.set(name, value).await?;
        Ok(())
    }

    async fn param_watch(&self) -> ParamUpdates {
        self.cf.param.watch_change().await.boxed()
    }

    async fn setpoint_hover(&self, vx: f32, vy: f32, yawrate: f32, zdistance: f32) -> Result<()> {
        self.cf
            .commander
            .setpoint_hover(vx, vy, yawrate, zdistance)
            .await?;
        Ok(())
    }

    async fn setpoint_stop(&self) -> Result<()> {
        self.cf.commander.setpoint_stop().await?;
        Ok(())
    }

    async fn notify_setpoint_stop(&self, remain_valid_milliseconds: u32) -> Result<()> {
        self.cf
            .commander
            .notify_setpoint_stop(remain_valid_milliseconds)
            .await?;
        Ok(())
    }

    async fn hl_take_off(&self, height: f32, duration: f32) -> Result<()> {
        self.cf
            .high_level_commander
            .take_off(height, None, duration, None)
            .await?;
        Ok(())
    }

    async fn hl_land(&self, height: f32, duration: f32) -> Result<()> {
        self.cf
            .high_level_commander
            .land(height, None, duration, None)
            .await?;
        Ok(())
    }

    async fn hl_go_to(
        &self,
        x: f32,
        y: f32,
        z: f32,
        yaw: f32,
        duration: f32,
        relative: bool,
    ) -> Result<()> {
        self.cf
            .high_level_commander
            .go_to(x, y, z, yaw, duration, relative, false, None)
            .await?;
        Ok(())
    }

    async fn hl_stop(&self) -> Result<()> {
        self.cf.high_level_commander.stop(None).await?;
        Ok(())
    }

    async fn open_log(&self, config: &LogConfig) -> Result<Box<dyn LogSession>> {
        let mut block = self.cf.log.create_block().await?;

        for variable in config.variables() {
            block.add_variable(&variable.name).await?;
        }

        let period: LogPeriod = config.period().try_into()?;
        let stream = block.start(period).await?;
        log::debug!(
            "Log block {} started with a period of {:?}",
            config.name(),
            config.period()
        );

        Ok(Box::new(CrazyflieLogSession {
            config: config.clone(),
            stream,
        }))
    }

    async fn disconnect(&self) {
        self.cf.disconnect().await;
    }
}

struct CrazyflieLogSession {
    config: LogConfig,
    stream: LogStream,
}

#[async_trait]
impl LogSession for CrazyflieLogSession {
    async fn next(&mut self) -> Result<LogEntry> {
        let data = self.stream.next().await?;
        self.config.make_entry(data.timestamp, data.data.iter())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let block = self.stream.stop().await?;
        // The block is deleted from the Crazyflie when dropped
        drop(block);
        Ok(())
    }
}
