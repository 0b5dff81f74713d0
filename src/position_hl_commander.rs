//! # Position high-level commander
//!
//! Flies the Crazyflie to absolute positions using the high-level commander of the firmware, which plans a smooth
//! trajectory to each target. A positioning system (Lighthouse, Loco, motion capture...) is required.
//!
//! The commander keeps track of the position it sent the Crazyflie to, so that relative movements (`left()`,
//! `forward()`, ...) and the duration of each movement can be computed on the ground: a movement of `d` meters at
//! `v` m/s takes `d / v` seconds and every function returns once that time has passed.
//!
//! ``` no_run
//! # use std::sync::Arc;
//! # use crazyflie_flight::position_hl_commander::{Controller, PositionHlCommander};
//! # async fn fly(vehicle: Arc<dyn crazyflie_flight::vehicle::Vehicle>) -> crazyflie_flight::Result<()> {
//! let mut pc = PositionHlCommander::builder(vehicle)
//!     .default_velocity(0.3)
//!     .default_height(0.5)
//!     .controller(Controller::Pid)
//!     .enter()
//!     .await?;
//! pc.go_to(1.0, 1.0, Some(1.0), None).await?;
//! pc.right(1.0, None).await?;
//! pc.exit().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crazyflie_lib::Value;
use tokio::time::{sleep_until, Instant};

use crate::vehicle::Vehicle;
use crate::{Error, Result};

/// Default velocity (m/s)
pub const DEFAULT_VELOCITY: f32 = 0.5;
/// Default height (m)
pub const DEFAULT_HEIGHT: f32 = 0.5;
/// Default landing height (m)
pub const DEFAULT_LANDING_HEIGHT: f32 = 0.0;

/// Stabilizer controller, written to the `stabilizer.controller` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    /// PID controller
    Pid = 1,
    /// Mellinger controller
    Mellinger = 2,
    /// INDI controller
    Indi = 3,
    /// Brescianini controller
    Brescianini = 4,
}

/// Position in meters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Meters along the x axis
    pub x: f32,
    /// Meters along the y axis
    pub y: f32,
    /// Height in meters
    pub z: f32,
}

impl Position {
    /// Position at `(x, y, z)`
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`
    pub fn distance(&self, other: &Position) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2) + (other.z - self.z).powi(2))
            .sqrt()
    }
}

/// Builder for a [PositionHlCommander]
pub struct PositionHlCommanderBuilder {
    vehicle: Arc<dyn Vehicle>,
    position: Position,
    default_velocity: f32,
    default_height: f32,
    default_landing_height: f32,
    controller: Option<Controller>,
}

impl PositionHlCommanderBuilder {
    /// Initial position of the Crazyflie
    pub fn position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Position::new(x, y, z);
        self
    }

    /// Velocity used when a movement does not give one (m/s)
    pub fn default_velocity(mut self, velocity: f32) -> Self {
        self.default_velocity = velocity;
        self
    }

    /// Height used by take-off and by `go_to()` without `z` (m)
    pub fn default_height(mut self, height: f32) -> Self {
        self.default_height = height;
        self
    }

    /// Height landings end at (m)
    pub fn default_landing_height(mut self, height: f32) -> Self {
        self.default_landing_height = height;
        self
    }

    /// Controller to activate, the current controller is kept if not set
    pub fn controller(mut self, controller: Controller) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Build the commander without taking off
    pub fn build(self) -> Result<PositionHlCommander> {
        check_positive("default velocity", self.default_velocity)?;
        check_positive("default height", self.default_height)?;

        Ok(PositionHlCommander {
            vehicle: self.vehicle,
            position: self.position,
            default_velocity: self.default_velocity,
            default_height: self.default_height,
            default_landing_height: self.default_landing_height,
            controller: self.controller,
            is_flying: false,
        })
    }

    /// Build the commander, activate the high-level commander and take off
    pub async fn enter(self) -> Result<PositionHlCommander> {
        let mut commander = self.build()?;
        commander.activate().await?;
        commander.take_off(None, None).await?;
        Ok(commander)
    }
}

fn check_positive(name: &str, value: f32) -> Result<f32> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidArgument(format!("{} must be > 0, got {}", name, value)))
    }
}

/// Position based flight session using the high-level commander
pub struct PositionHlCommander {
    vehicle: Arc<dyn Vehicle>,
    position: Position,
    default_velocity: f32,
    default_height: f32,
    default_landing_height: f32,
    controller: Option<Controller>,
    is_flying: bool,
}

impl PositionHlCommander {
    /// Start building a commander with the default values
    pub fn builder(vehicle: Arc<dyn Vehicle>) -> PositionHlCommanderBuilder {
        PositionHlCommanderBuilder {
            vehicle,
            position: Position::default(),
            default_velocity: DEFAULT_VELOCITY,
            default_height: DEFAULT_HEIGHT,
            default_landing_height: DEFAULT_LANDING_HEIGHT,
            controller: None,
        }
    }

    /// Enable the high-level commander and select the controller, if one was configured
    pub async fn activate(&mut self) -> Result<()> {
        self.vehicle
            .param_set("commander.enHighLevel", Value::U8(1))
            .await?;

        if let Some(controller) = self.controller {
            log::debug!("Activating controller {:?}", controller);
            self.vehicle
                .param_set("stabilizer.controller", Value::U8(controller as u8))
                .await?;
        }

        Ok(())
    }

    /// Land and end the session
    pub async fn exit(mut self) -> Result<()> {
        self.land(None, None).await
    }

    /// True between take-off and landing
    pub fn is_flying(&self) -> bool {
        self.is_flying
    }

    /// Position the Crazyflie was last sent to
    pub fn position(&self) -> Position {
        self.position
    }

    /// Change the default velocity, must be > 0
    pub fn set_default_velocity(&mut self, velocity: f32) -> Result<()> {
        self.default_velocity = check_positive("default velocity", velocity)?;
        Ok(())
    }

    /// Change the default height, must be > 0
    pub fn set_default_height(&mut self, height: f32) -> Result<()> {
        self.default_height = check_positive("default height", height)?;
        Ok(())
    }

    fn velocity(&self, velocity: Option<f32>) -> Result<f32> {
        check_positive("velocity", velocity.unwrap_or(self.default_velocity))
    }

    /// Take off to `height` meters (default height if `None`) at `velocity` m/s
    ///
    /// Returns [Error::AlreadyFlying] if the Crazyflie is already flying.
    pub async fn take_off(&mut self, height: Option<f32>, velocity: Option<f32>) -> Result<()> {
        if self.is_flying {
            return Err(Error::AlreadyFlying);
        }
        let height = height.unwrap_or(self.default_height);
        let velocity = self.velocity(velocity)?;

        let duration = (height - self.position.z).abs() / velocity;
        log::info!("Taking off to {}m in {:.2}s", height, duration);

        let start = Instant::now();
        self.is_flying = true;
        self.vehicle.hl_take_off(height, duration).await?;
        sleep_until(start + Duration::from_secs_f32(duration)).await;
        self.position.z = height;

        Ok(())
    }

    /// Land to `landing_height` (default landing height if `None`) at `velocity` m/s and stop the motors
    ///
    /// Does nothing if the Crazyflie is not flying.
    pub async fn land(&mut self, velocity: Option<f32>, landing_height: Option<f32>) -> Result<()> {
        if !self.is_flying {
            return Ok(());
        }
        let landing_height = landing_height.unwrap_or(self.default_landing_height);
        let velocity = self.velocity(velocity)?;

        let duration = (self.position.z - landing_height).max(0.0) / velocity;
        log::info!("Landing in {:.2}s", duration);

        let start = Instant::now();
        self.vehicle.hl_land(landing_height, duration).await?;
        sleep_until(start + Duration::from_secs_f32(duration)).await;
        self.position.z = landing_height;

        self.vehicle.hl_stop().await?;
        self.is_flying = false;

        Ok(())
    }

    /// Go left `distance_m` meters
    pub async fn left(&mut self, distance_m: f32, velocity: Option<f32>) -> Result<()> {
        self.move_distance(0.0, distance_m, 0.0, velocity).await
    }

    /// Go right `distance_m` meters
    pub async fn right(&mut self, distance_m: f32, velocity: Option<f32>) -> Result<()> {
        self.move_distance(0.0, -distance_m, 0.0, velocity).await
    }

    /// Go forward `distance_m` meters
    pub async fn forward(&mut self, distance_m: f32, velocity: Option<f32>) -> Result<()> {
        self.move_distance(distance_m, 0.0, 0.0, velocity).await
    }

    /// Go backwards `distance_m` meters
    pub async fn back(&mut self, distance_m: f32, velocity: Option<f32>) -> Result<()> {
        self.move_distance(-distance_m, 0.0, 0.0, velocity).await
    }

    /// Go up `distance_m` meters
    pub async fn up(&mut self, distance_m: f32, velocity: Option<f32>) -> Result<()> {
        self.move_distance(0.0, 0.0, distance_m, velocity).await
    }

    /// Go down `distance_m` meters
    pub async fn down(&mut self, distance_m: f32, velocity: Option<f32>) -> Result<()> {
        self.move_distance(0.0, 0.0, -distance_m, velocity).await
    }

    /// Move in a straight line relative to the current position, in the world frame
    pub async fn move_distance(
        &mut self,
        distance_x_m: f32,
        distance_y_m: f32,
        distance_z_m: f32,
        velocity: Option<f32>,
    ) -> Result<()> {
        let Position { x, y, z } = self.position;
        self.go_to(
            x + distance_x_m,
            y + distance_y_m,
            Some(z + distance_z_m),
            velocity,
        )
        .await
    }

    /// Go to an absolute position, at the default height if `z` is `None`
    ///
    /// Nothing is sent if the Crazyflie is already at the target.
    pub async fn go_to(
        &mut self,
        x: f32,
        y: f32,
        z: Option<f32>,
        velocity: Option<f32>,
    ) -> Result<()> {
        if !self.is_flying {
            return Err(Error::NotFlying);
        }
        let target = Position::new(x, y, z.unwrap_or(self.default_height));
        let velocity = self.velocity(velocity)?;

        let distance = self.position.distance(&target);
        if distance > 0.0 {
            let duration = distance / velocity;
            log::debug!("Going to {:?} in {:.2}s", target, duration);

            let start = Instant::now();
            self.vehicle
                .hl_go_to(target.x, target.y, target.z, 0.0, duration, false)
                .await?;
            sleep_until(start + Duration::from_secs_f32(duration)).await;
            self.position = target;
        }

        Ok(())
    }
}

impl Drop for PositionHlCommander {
    fn drop(&mut self) {
        if !self.is_flying {
            return;
        }
        log::warn!("Position commander dropped while flying, landing");

        let vehicle = self.vehicle.clone();
        let landing_height = self.default_landing_height;
        let duration = (self.position.z - landing_height).max(0.0) / self.default_velocity;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let start = Instant::now();
                    if let Err(e) = vehicle.hl_land(landing_height, duration).await {
                        log::error!("Landing failed: {}", e);
                        return;
                    }
                    sleep_until(start + Duration::from_secs_f32(duration)).await;
                    if let Err(e) = vehicle.hl_stop().await {
                        log::error!("Cannot stop the high-level commander: {}", e);
                    }
                });
            }
            Err(_) => log::error!("No runtime to land on"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimCommand, SimVehicle};

    fn commands(sim: &SimVehicle) -> Vec<SimCommand> {
        sim.commands().into_iter().map(|r| r.command).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn enter_activates_and_takes_off() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let pc = PositionHlCommander::builder(sim.clone())
            .controller(Controller::Pid)
            .enter()
            .await
            .unwrap();

        assert_eq!(
            commands(&sim),
            vec![
                SimCommand::ParamSet {
                    name: "commander.enHighLevel".to_owned(),
                    value: 1.0
                },
                SimCommand::ParamSet {
                    name: "stabilizer.controller".to_owned(),
                    value: 1.0
                },
                SimCommand::TakeOff {
                    height: 0.5,
                    duration: 1.0
                },
            ]
        );
        assert_eq!(pc.position(), Position::new(0.0, 0.0, 0.5));
        pc.exit().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn go_to_waits_for_distance_over_velocity() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut pc = PositionHlCommander::builder(sim.clone())
            .default_velocity(0.5)
            .enter()
            .await
            .unwrap();
        sim.clear_commands();

        let start = Instant::now();
        pc.go_to(0.0, 2.0, None, None).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert_eq!(
            commands(&sim),
            vec![SimCommand::GoTo {
                x: 0.0,
                y: 2.0,
                z: 0.5,
                yaw: 0.0,
                duration: 4.0,
                relative: false
            }]
        );

        // Already there
        pc.go_to(0.0, 2.0, None, None).await.unwrap();
        assert_eq!(sim.commands().len(), 1);

        pc.right(2.0, Some(1.0)).await.unwrap();
        assert_eq!(pc.position(), Position::new(0.0, 0.0, 0.5));

        pc.exit().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn land_goes_down_and_stops() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut pc = PositionHlCommander::builder(sim.clone())
            .position(1.0, 1.0, 0.0)
            .default_height(1.0)
            .enter()
            .await
            .unwrap();
        sim.clear_commands();

        pc.land(None, None).await.unwrap();
        assert!(!pc.is_flying());
        assert_eq!(
            commands(&sim),
            vec![
                SimCommand::Land {
                    height: 0.0,
                    duration: 2.0
                },
                SimCommand::HlStop
            ]
        );

        assert!(matches!(
            pc.go_to(0.0, 0.0, None, None).await,
            Err(Error::NotFlying)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn defaults_can_be_changed_in_flight() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut pc = PositionHlCommander::builder(sim.clone())
            .enter()
            .await
            .unwrap();

        assert!(pc.set_default_velocity(0.0).is_err());
        pc.set_default_velocity(0.25).unwrap();
        pc.set_default_height(1.0).unwrap();
        sim.clear_commands();

        pc.go_to(0.0, 0.0, None, None).await.unwrap();
        assert_eq!(
            commands(&sim),
            vec![SimCommand::GoTo {
                x: 0.0,
                y: 0.0,
                z: 1.0,
                yaw: 0.0,
                duration: 2.0,
                relative: false
            }]
        );
        pc.exit().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_while_flying_lands() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let pc = PositionHlCommander::builder(sim.clone())
            .enter()
            .await
            .unwrap();
        drop(pc);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let commands = commands(&sim);
        assert_eq!(commands.last(), Some(&SimCommand::HlStop));
        assert!(commands.contains(&SimCommand::Land {
            height: 0.0,
            duration: 1.0
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn take_off_twice_is_an_error() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut pc = PositionHlCommander::builder(sim).enter().await.unwrap();
        assert!(matches!(
            pc.take_off(None, None).await,
            Err(Error::AlreadyFlying)
        ));
        pc.exit().await.unwrap();
    }
}
