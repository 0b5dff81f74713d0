//! # Motion commander
//!
//! The motion commander flies the Crazyflie with velocity commands relative to its own body frame: move forward
//! 1 meter, turn left 90 degrees, go up 20cm... It requires a deck or system able to estimate the velocity and the
//! height of the Crazyflie, typically the Flow deck.
//!
//! While flying, a background task sends a hover setpoint to the Crazyflie every 100ms. The setpoint contains the
//! current x/y velocity and yaw rate, and an absolute height obtained by integrating the requested vertical
//! velocity since the last setpoint change. The blocking movement functions (`forward()`, `turn_left()`, ...) start
//! a motion, wait for the time needed to complete it and stop. The `start_*()` functions start a motion and return
//! immediately, the motion goes on until the next command.
//!
//! The commander takes off when entered and lands when exited:
//! ``` no_run
//! # use std::sync::Arc;
//! # use crazyflie_flight::motion_commander::MotionCommander;
//! # async fn fly(vehicle: Arc<dyn crazyflie_flight::vehicle::Vehicle>) -> crazyflie_flight::Result<()> {
//! let mut mc = MotionCommander::enter(vehicle, 0.5).await?;
//! mc.forward(0.5, None).await?;
//! mc.turn_left(90.0, None).await?;
//! mc.exit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! If the commander is dropped while flying, for example when an error is propagated out of a flight sequence,
//! a landing is started in the background on the current tokio runtime.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crazyflie_lib::Value;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::vehicle::Vehicle;
use crate::{Error, Result};

/// Default velocity for movements (m/s)
pub const VELOCITY: f32 = 0.2;
/// Default rate for turns (degrees/s)
pub const RATE: f32 = 360.0 / 5.0;
/// Default take-off height (m)
pub const DEFAULT_HEIGHT: f32 = 0.3;

const SETPOINT_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct HoverState {
    vx: f32,
    vy: f32,
    vz: f32,
    yawrate: f32,
    z_base: f32,
    z_base_time: Instant,
}

impl HoverState {
    fn height(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.z_base_time).as_secs_f32();
        (self.z_base + self.vz * elapsed).max(0.0)
    }
}

/// Background task sending hover setpoints
struct SetpointLoop {
    state: Arc<Mutex<HoverState>>,
    wake: flume::Sender<()>,
    task: JoinHandle<()>,
}

fn lock(state: &Mutex<HoverState>) -> MutexGuard<'_, HoverState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SetpointLoop {
    fn start(vehicle: Arc<dyn Vehicle>) -> Self {
        let state = Arc::new(Mutex::new(HoverState {
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            yawrate: 0.0,
            z_base: 0.0,
            z_base_time: Instant::now(),
        }));
        let (wake, wakeup) = flume::unbounded();

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SETPOINT_PERIOD);
            loop {
                tokio::select! {
                    _ = interval.tick() => (),
                    woken = wakeup.recv_async() => {
                        if woken.is_err() {
                            break;
                        }
                    }
                }

                let s = *lock(&task_state);
                let z = s.height(Instant::now());
                if let Err(e) = vehicle.setpoint_hover(s.vx, s.vy, s.yawrate, z).await {
                    log::error!("Cannot send hover setpoint: {}", e);
                    break;
                }
            }
        });

        Self { state, wake, task }
    }

    fn height(&self) -> f32 {
        lock(&self.state).height(Instant::now())
    }

    fn set(&self, vx: f32, vy: f32, vz: f32, yawrate: f32) -> Result<()> {
        {
            let mut s = lock(&self.state);
            let now = Instant::now();
            s.z_base = s.height(now);
            s.z_base_time = now;
            s.vx = vx;
            s.vy = vy;
            s.vz = vz;
            s.yawrate = yawrate;
        }
        self.wake.send(())?;
        Ok(())
    }

    async fn stop(self) {
        drop(self.wake);
        let _ = self.task.await;
    }
}

async fn descend(vehicle: Arc<dyn Vehicle>, setpoints: SetpointLoop, velocity: f32) -> Result<()> {
    let height = setpoints.height();
    if height > 0.0 {
        setpoints.set(0.0, 0.0, -velocity, 0.0)?;
        sleep(Duration::from_secs_f32(height / velocity)).await;
        setpoints.set(0.0, 0.0, 0.0, 0.0)?;
    }
    setpoints.stop().await;

    vehicle.setpoint_stop().await?;
    vehicle.notify_setpoint_stop(0).await?;
    Ok(())
}

fn check_positive(name: &str, value: f32) -> Result<f32> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidArgument(format!("{} must be > 0, got {}", name, value)))
    }
}

/// Velocity based flight session
pub struct MotionCommander {
    vehicle: Arc<dyn Vehicle>,
    default_height: f32,
    setpoints: Option<SetpointLoop>,
}

impl MotionCommander {
    /// Create a commander, the Crazyflie does not take off until [MotionCommander::take_off()] is called
    pub fn new(vehicle: Arc<dyn Vehicle>, default_height: f32) -> Self {
        Self {
            vehicle,
            default_height,
            setpoints: None,
        }
    }

    /// Create a commander and take off to `default_height`
    pub async fn enter(vehicle: Arc<dyn Vehicle>, default_height: f32) -> Result<Self> {
        let mut commander = Self::new(vehicle, default_height);
        commander.take_off(None, None).await?;
        Ok(commander)
    }

    /// Land and end the session
    pub async fn exit(mut self) -> Result<()> {
        self.land(None).await
    }

    /// True between take-off and landing
    pub fn is_flying(&self) -> bool {
        self.setpoints.is_some()
    }

    /// Current commanded height (m), 0 when not flying
    pub fn height(&self) -> f32 {
        self.setpoints.as_ref().map_or(0.0, |s| s.height())
    }

    fn setpoints(&self) -> Result<&SetpointLoop> {
        self.setpoints.as_ref().ok_or(Error::NotFlying)
    }

    async fn reset_position_estimator(&self) -> Result<()> {
        self.vehicle
            .param_set("kalman.resetEstimation", Value::U8(1))
            .await?;
        sleep(Duration::from_millis(100)).await;
        self.vehicle
            .param_set("kalman.resetEstimation", Value::U8(0))
            .await?;
        sleep(Duration::from_secs(2)).await;
        Ok(())
    }

    /// Take off to `height` meters (default height if `None`) at `velocity` m/s
    ///
    /// Returns [Error::AlreadyFlying] if the Crazyflie is already flying.
    pub async fn take_off(&mut self, height: Option<f32>, velocity: Option<f32>) -> Result<()> {
        if self.is_flying() {
            return Err(Error::AlreadyFlying);
        }
        let height = check_positive("height", height.unwrap_or(self.default_height))?;
        let velocity = check_positive("velocity", velocity.unwrap_or(VELOCITY))?;

        self.reset_position_estimator().await?;

        log::info!("Taking off to {}m", height);
        self.setpoints = Some(SetpointLoop::start(self.vehicle.clone()));

        let distance = height - self.height();
        self.up(distance, Some(velocity)).await
    }

    /// Descend to the ground at `velocity` m/s and stop the motors
    ///
    /// Does nothing if the Crazyflie is not flying.
    pub async fn land(&mut self, velocity: Option<f32>) -> Result<()> {
        let velocity = check_positive("velocity", velocity.unwrap_or(VELOCITY))?;

        match self.setpoints.take() {
            Some(setpoints) => {
                log::info!("Landing from {}m", setpoints.height());
                descend(self.vehicle.clone(), setpoints, velocity).await
            }
            None => Ok(()),
        }
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

    /// Turn left `angle_degrees` degrees at `rate` degrees/s
    pub async fn turn_left(&mut self, angle_degrees: f32, rate: Option<f32>) -> Result<()> {
        let rate = check_positive("rate", rate.unwrap_or(RATE))?;
        self.start_turn_left(Some(rate))?;
        sleep(Duration::from_secs_f32(angle_degrees.abs() / rate)).await;
        self.stop()
    }

    /// Turn right `angle_degrees` degrees at `rate` degrees/s
    pub async fn turn_right(&mut self, angle_degrees: f32, rate: Option<f32>) -> Result<()> {
        let rate = check_positive("rate", rate.unwrap_or(RATE))?;
        self.start_turn_right(Some(rate))?;
        sleep(Duration::from_secs_f32(angle_degrees.abs() / rate)).await;
        self.stop()
    }

    /// Go `angle_degrees` degrees along a circle to the left of radius `radius_m`
    pub async fn circle_left(
        &mut self,
        radius_m: f32,
        velocity: Option<f32>,
        angle_degrees: f32,
    ) -> Result<()> {
        let velocity = check_positive("velocity", velocity.unwrap_or(VELOCITY))?;
        let distance = 2.0 * radius_m * PI * angle_degrees.abs() / 360.0;

        self.start_circle_left(radius_m, Some(velocity))?;
        sleep(Duration::from_secs_f32(distance / velocity)).await;
        self.stop()
    }

    /// Go `angle_degrees` degrees along a circle to the right of radius `radius_m`
    pub async fn circle_right(
        &mut self,
        radius_m: f32,
        velocity: Option<f32>,
        angle_degrees: f32,
    ) -> Result<()> {
        let velocity = check_positive("velocity", velocity.unwrap_or(VELOCITY))?;
        let distance = 2.0 * radius_m * PI * angle_degrees.abs() / 360.0;

        self.start_circle_right(radius_m, Some(velocity))?;
        sleep(Duration::from_secs_f32(distance / velocity)).await;
        self.stop()
    }

    /// Move in a straight line to a position relative to the current one, in the body frame
    ///
    /// A zero distance does nothing.
    pub async fn move_distance(
        &mut self,
        distance_x_m: f32,
        distance_y_m: f32,
        distance_z_m: f32,
        velocity: Option<f32>,
    ) -> Result<()> {
        self.setpoints()?;
        let velocity = check_positive("velocity", velocity.unwrap_or(VELOCITY))?;

        let distance =
            (distance_x_m.powi(2) + distance_y_m.powi(2) + distance_z_m.powi(2)).sqrt();
        if distance == 0.0 {
            return Ok(());
        }
        let flight_time = distance / velocity;

        let vx = distance_x_m / flight_time;
        let vy = distance_y_m / flight_time;
        let vz = distance_z_m / flight_time;

        self.start_linear_motion(vx, vy, vz, 0.0)?;
        sleep(Duration::from_secs_f32(flight_time)).await;
        self.stop()
    }

    /// Start moving left
    pub fn start_left(&mut self, velocity: Option<f32>) -> Result<()> {
        self.start_linear_motion(0.0, velocity.unwrap_or(VELOCITY), 0.0, 0.0)
    }

    /// Start moving right
    pub fn start_right(&mut self, velocity: Option<f32>) -> Result<()> {
        self.start_linear_motion(0.0, -velocity.unwrap_or(VELOCITY), 0.0, 0.0)
    }

    /// Start moving forward
    pub fn start_forward(&mut self, velocity: Option<f32>) -> Result<()> {
        self.start_linear_motion(velocity.unwrap_or(VELOCITY), 0.0, 0.0, 0.0)
    }

    /// Start moving backwards
    pub fn start_back(&mut self, velocity: Option<f32>) -> Result<()> {
        self.start_linear_motion(-velocity.unwrap_or(VELOCITY), 0.0, 0.0, 0.0)
    }

    /// Start moving up
    pub fn start_up(&mut self, velocity: Option<f32>) -> Result<()> {
        self.start_linear_motion(0.0, 0.0, velocity.unwrap_or(VELOCITY), 0.0)
    }

    /// Start moving down
    pub fn start_down(&mut self, velocity: Option<f32>) -> Result<()> {
        self.start_linear_motion(0.0, 0.0, -velocity.unwrap_or(VELOCITY), 0.0)
    }

    /// Start turning left
    pub fn start_turn_left(&mut self, rate: Option<f32>) -> Result<()> {
        self.start_linear_motion(0.0, 0.0, 0.0, -rate.unwrap_or(RATE))
    }

    /// Start turning right
    pub fn start_turn_right(&mut self, rate: Option<f32>) -> Result<()> {
        self.start_linear_motion(0.0, 0.0, 0.0, rate.unwrap_or(RATE))
    }

    /// Start a circular motion to the left
    pub fn start_circle_left(&mut self, radius_m: f32, velocity: Option<f32>) -> Result<()> {
        let radius_m = check_positive("radius", radius_m)?;
        let velocity = velocity.unwrap_or(VELOCITY);
        let rate = 360.0 * velocity / (2.0 * radius_m * PI);

        self.start_linear_motion(velocity, 0.0, 0.0, -rate)
    }

    /// Start a circular motion to the right
    pub fn start_circle_right(&mut self, radius_m: f32, velocity: Option<f32>) -> Result<()> {
        let radius_m = check_positive("radius", radius_m)?;
        let velocity = velocity.unwrap_or(VELOCITY);
        let rate = 360.0 * velocity / (2.0 * radius_m * PI);

        self.start_linear_motion(velocity, 0.0, 0.0, rate)
    }

    /// Start a linear motion with an optional yaw rotation, in the body frame
    ///
    /// Positive yaw rate turns right.
    pub fn start_linear_motion(
        &mut self,
        velocity_x_m: f32,
        velocity_y_m: f32,
        velocity_z_m: f32,
        rate_yaw: f32,
    ) -> Result<()> {
        self.setpoints()?
            .set(velocity_x_m, velocity_y_m, velocity_z_m, rate_yaw)
    }

    /// Stop any motion and hover in place
    pub fn stop(&mut self) -> Result<()> {
        self.start_linear_motion(0.0, 0.0, 0.0, 0.0)
    }
}

impl Drop for MotionCommander {
    fn drop(&mut self) {
        if let Some(setpoints) = self.setpoints.take() {
            log::warn!("Motion commander dropped while flying, landing");
            let vehicle = self.vehicle.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = descend(vehicle, setpoints, VELOCITY).await {
                            log::error!("Landing failed: {}", e);
                        }
                    });
                }
                Err(_) => {
                    log::error!("No runtime to land on, stopping the setpoints");
                    setpoints.task.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimCommand, SimVehicle};

    fn hover_heights(sim: &SimVehicle) -> Vec<f32> {
        sim.commands()
            .iter()
            .filter_map(|r| match r.command {
                SimCommand::Hover { zdistance, .. } => Some(zdistance),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn take_off_climbs_to_the_default_height() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mc = MotionCommander::enter(sim.clone(), 0.5).await.unwrap();

        assert!(mc.is_flying());
        assert!((mc.height() - 0.5).abs() < 1e-3);

        let commands = sim.commands();
        assert_eq!(
            commands[0].command,
            SimCommand::ParamSet {
                name: "kalman.resetEstimation".to_owned(),
                value: 1.0
            }
        );

        let heights = hover_heights(&sim);
        assert!(heights.len() > 20);
        assert!(heights.windows(2).all(|w| w[1] >= w[0]));
        assert!((heights.last().unwrap() - 0.5).abs() < 0.05);

        mc.exit().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn land_stops_the_motors() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut mc = MotionCommander::enter(sim.clone(), 0.3).await.unwrap();
        mc.land(None).await.unwrap();

        assert!(!mc.is_flying());
        let commands = sim.commands();
        let n = commands.len();
        assert_eq!(commands[n - 2].command, SimCommand::Stop);
        assert_eq!(commands[n - 1].command, SimCommand::NotifySetpointStop(0));
        assert!(hover_heights(&sim).last().unwrap().abs() < 0.05);

        // Landing twice is harmless
        mc.land(None).await.unwrap();
        assert_eq!(sim.commands().len(), n);
    }

    #[tokio::test(start_paused = true)]
    async fn setpoints_are_sent_every_100ms_while_hovering() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut mc = MotionCommander::enter(sim.clone(), 0.3).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        sim.clear_commands();

        sleep(Duration::from_secs(1)).await;
        let commands = sim.commands();
        assert!((9..=11).contains(&commands.len()));
        for pair in commands.windows(2) {
            assert_eq!(pair[1].at - pair[0].at, SETPOINT_PERIOD);
        }

        mc.land(None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn movements_set_body_velocities() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut mc = MotionCommander::enter(sim.clone(), 0.3).await.unwrap();
        sim.clear_commands();

        mc.start_turn_left(None).unwrap();
        sleep(Duration::from_millis(1)).await;
        mc.start_circle_right(0.5, Some(0.5)).unwrap();
        sleep(Duration::from_millis(1)).await;

        let hovers: Vec<SimCommand> = sim.commands().into_iter().map(|r| r.command).collect();
        assert!(hovers.iter().any(|c| matches!(
            c,
            SimCommand::Hover { yawrate, vx, .. } if *yawrate == -RATE && *vx == 0.0
        )));
        assert!(hovers.iter().any(|c| matches!(
            c,
            SimCommand::Hover { yawrate, vx, .. } if (*yawrate - 180.0 / PI).abs() < 1e-3 && *vx == 0.5
        )));

        mc.land(None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn errors_when_not_flying_or_already_flying() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mut mc = MotionCommander::new(sim.clone(), 0.3);

        assert!(matches!(mc.forward(1.0, None).await, Err(Error::NotFlying)));
        assert!(matches!(mc.stop(), Err(Error::NotFlying)));

        mc.take_off(None, None).await.unwrap();
        assert!(matches!(
            mc.take_off(None, None).await,
            Err(Error::AlreadyFlying)
        ));
        assert!(matches!(
            mc.forward(1.0, Some(0.0)).await,
            Err(Error::InvalidArgument(_))
        ));
        mc.land(None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_while_flying_lands() {
        let sim = Arc::new(SimVehicle::new("debug://0/0"));
        let mc = MotionCommander::enter(sim.clone(), 0.3).await.unwrap();
        drop(mc);

        sleep(Duration::from_secs(5)).await;
        let commands = sim.commands();
        assert_eq!(
            commands.last().unwrap().command,
            SimCommand::NotifySetpointStop(0)
        );
    }
}
