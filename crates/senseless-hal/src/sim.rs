//! Headless simulated drive base for tests and the simulation binary.
//!
//! [`SimDriveBase`] integrates unicycle kinematics in fixed simulated time
//! steps.  Two PID loops steer it: turn toward the target, drive, then turn
//! to the target heading.  It keeps two poses:
//!
//! | Pose | Meaning |
//! |---|---|
//! | odometry | where the base *thinks* it is; re-anchored by [`relocalize`][crate::MotionActuator::relocalize] |
//! | truth | where it really is; receives the same commands corrupted by wheel slip |
//!
//! The truth pose is shared through a [`TruthHandle`] so the simulated sensing
//! partner can observe it.  Stalls are injected per command with a seeded RNG,
//! making every run reproducible.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use senseless_hal::{MotionActuator, MoveOutcome, SimDriveBase, SimDriveConfig};
//! use senseless_types::Pose;
//!
//! # tokio_test_block_on(async {
//! let mut base = SimDriveBase::new("drive_base", Pose::default(), SimDriveConfig::default(), 7).unwrap();
//! let outcome = base.move_to(Pose::new(1.0, 0.0, 0.0), Duration::from_secs(20)).await.unwrap();
//! assert_eq!(outcome, MoveOutcome::Arrived);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use senseless_types::{LocError, Pose, wrap_angle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actuator::{MotionActuator, MoveOutcome};
use crate::pid::PidController;

/// Above this heading error the base turns in place instead of driving.
const TURN_IN_PLACE_RAD: f64 = 0.3;

/// Upper bound on integration steps per command, whatever the timeout.
const MAX_STEPS_PER_COMMAND: u64 = 200_000;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Kinematic and fault-injection parameters of the simulated base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimDriveConfig {
    /// Top linear speed (m/s).
    pub max_speed: f64,
    /// Top turn rate (rad/s).
    pub max_turn_rate: f64,
    /// Integration step (ms of simulated time).
    pub control_period_ms: u64,
    /// Position tolerance for "arrived" (m).
    pub arrival_tolerance: f64,
    /// Heading tolerance for "arrived" (rad).
    pub heading_tolerance: f64,
    /// Relative wheel slip: true motion is commanded motion scaled by a
    /// uniform factor in `[1 - slip, 1 + slip]`.
    pub slip: f64,
    /// Probability that a single command stalls and times out without motion.
    pub stall_probability: f64,
    /// Sleep for the simulated duration of each command.
    pub realtime: bool,
}

impl Default for SimDriveConfig {
    fn default() -> Self {
        Self {
            max_speed: 0.5,
            max_turn_rate: 1.5,
            control_period_ms: 50,
            arrival_tolerance: 0.02,
            heading_tolerance: 0.02,
            slip: 0.05,
            stall_probability: 0.0,
            realtime: false,
        }
    }
}

impl SimDriveConfig {
    fn validate(&self) -> Result<(), LocError> {
        let fault = |details: String| LocError::Config(format!("sim drive base: {details}"));
        if !(self.max_speed > 0.0 && self.max_turn_rate > 0.0) {
            return Err(fault("max_speed and max_turn_rate must be > 0".into()));
        }
        if self.control_period_ms == 0 {
            return Err(fault("control_period_ms must be > 0".into()));
        }
        if !(self.arrival_tolerance > 0.0 && self.heading_tolerance > 0.0) {
            return Err(fault("tolerances must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.slip) {
            return Err(fault(format!("slip must be in [0, 1), got {}", self.slip)));
        }
        if !(0.0..=1.0).contains(&self.stall_probability) {
            return Err(fault(format!(
                "stall_probability must be in [0, 1], got {}",
                self.stall_probability
            )));
        }
        Ok(())
    }

    fn period_s(&self) -> f64 {
        self.control_period_ms as f64 / 1000.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ground truth
// ────────────────────────────────────────────────────────────────────────────

/// Read-only handle on the simulated base's true pose.
#[derive(Debug, Clone)]
pub struct TruthHandle(Arc<Mutex<Pose>>);

impl TruthHandle {
    pub fn pose(&self) -> Pose {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimDriveBase
// ────────────────────────────────────────────────────────────────────────────

/// Simulated differential-drive base implementing [`MotionActuator`].
pub struct SimDriveBase {
    id: String,
    config: SimDriveConfig,
    odometry: Pose,
    truth: Arc<Mutex<Pose>>,
    linear: PidController,
    angular: PidController,
    active_target: Option<Pose>,
    rng: StdRng,
}

impl SimDriveBase {
    /// Build a base whose odometry and truth both start at `start`.
    ///
    /// # Errors
    ///
    /// [`LocError::Config`] when `config` is out of range.
    pub fn new(
        id: impl Into<String>,
        start: Pose,
        config: SimDriveConfig,
        seed: u64,
    ) -> Result<Self, LocError> {
        config.validate()?;
        Ok(Self {
            id: id.into(),
            config,
            odometry: start,
            truth: Arc::new(Mutex::new(start)),
            linear: PidController::new(1.5, 0.0, 0.0).with_output_limit(config.max_speed),
            angular: PidController::new(3.0, 0.0, 0.05).with_output_limit(config.max_turn_rate),
            active_target: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn truth_handle(&self) -> TruthHandle {
        TruthHandle(Arc::clone(&self.truth))
    }

    fn true_pose(&self) -> Pose {
        *self.truth.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_true_pose(&self, pose: Pose) {
        *self.truth.lock().unwrap_or_else(PoisonError::into_inner) = pose;
    }

    /// Velocity command `(v, w)` for one step, or `None` once arrived.
    fn command(&mut self, target: &Pose, dt: f64) -> Option<(f64, f64)> {
        let dx = target.x - self.odometry.x;
        let dy = target.y - self.odometry.y;
        let distance = dx.hypot(dy);

        if distance <= self.config.arrival_tolerance {
            let heading_err = wrap_angle(target.heading_rad - self.odometry.heading_rad);
            if heading_err.abs() <= self.config.heading_tolerance {
                return None;
            }
            return Some((0.0, self.angular.update(heading_err, dt)));
        }

        let heading_err = wrap_angle(dy.atan2(dx) - self.odometry.heading_rad);
        let w = self.angular.update(heading_err, dt);
        let v = if heading_err.abs() > TURN_IN_PLACE_RAD {
            0.0
        } else {
            self.linear.update(distance, dt) * heading_err.cos()
        };
        Some((v, w))
    }

    fn integrate(pose: &Pose, v: f64, w: f64, dt: f64) -> Pose {
        let heading = pose.heading_rad + w * dt;
        Pose::new(
            pose.x + v * heading.cos() * dt,
            pose.y + v * heading.sin() * dt,
            heading,
        )
    }

    fn slip_factor(&mut self) -> f64 {
        if self.config.slip > 0.0 {
            1.0 + self.rng.gen_range(-self.config.slip..=self.config.slip)
        } else {
            1.0
        }
    }

    async fn pace(&self, simulated: Duration) {
        if self.config.realtime {
            tokio::time::sleep(simulated).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl MotionActuator for SimDriveBase {
    fn id(&self) -> &str {
        &self.id
    }

    fn relocalize(&mut self, believed: Pose) {
        debug!(actuator = %self.id, from = %self.odometry, to = %believed, "odometry re-anchored");
        self.odometry = believed;
    }

    fn odometry(&self) -> Pose {
        self.odometry
    }

    async fn move_to(&mut self, target: Pose, timeout: Duration) -> Result<MoveOutcome, LocError> {
        if !target.is_finite() {
            return Err(LocError::HardwareFault {
                component: self.id.clone(),
                details: format!("non-finite target {target:?}"),
            });
        }

        if self.active_target != Some(target) {
            self.linear.reset();
            self.angular.reset();
            self.active_target = Some(target);
        }

        if self.config.stall_probability > 0.0 && self.rng.gen_bool(self.config.stall_probability) {
            warn!(actuator = %self.id, %target, "drive base stalled");
            self.pace(timeout).await;
            return Ok(MoveOutcome::TimedOut);
        }

        let dt = self.config.period_s();
        let budget = ((timeout.as_secs_f64() / dt).ceil() as u64).min(MAX_STEPS_PER_COMMAND);
        let mut truth = self.true_pose();
        let mut steps = 0;

        let outcome = loop {
            let Some((v, w)) = self.command(&target, dt) else {
                break MoveOutcome::Arrived;
            };
            if steps == budget {
                break MoveOutcome::TimedOut;
            }
            self.odometry = Self::integrate(&self.odometry, v, w, dt);
            let (sv, sw) = (self.slip_factor(), self.slip_factor());
            truth = Self::integrate(&truth, v * sv, w * sw, dt);
            steps += 1;
        };

        self.set_true_pose(truth);
        if outcome == MoveOutcome::Arrived {
            self.active_target = None;
        }
        let simulated = Duration::from_millis(steps * self.config.control_period_ms);
        debug!(
            actuator = %self.id,
            ?outcome,
            steps,
            odometry = %self.odometry,
            truth = %truth,
            "move command finished"
        );
        self.pace(simulated.min(timeout)).await;
        Ok(outcome)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn exact() -> SimDriveConfig {
        SimDriveConfig {
            slip: 0.0,
            ..SimDriveConfig::default()
        }
    }

    #[tokio::test]
    async fn drives_to_target() {
        let mut base = SimDriveBase::new("base", Pose::default(), exact(), 1).unwrap();
        let target = Pose::new(1.0, 1.0, -1.0);
        let outcome = base.move_to(target, Duration::from_secs(30)).await.unwrap();
        assert_eq!(outcome, MoveOutcome::Arrived);
        assert!(base.odometry().distance_to(&target) <= 0.02 + 1e-9);
        // Without slip the truth follows odometry exactly.
        assert!(base.truth_handle().pose().distance_to(&base.odometry()) < 1e-9);
    }

    #[tokio::test]
    async fn slip_makes_truth_diverge() {
        let cfg = SimDriveConfig {
            slip: 0.2,
            ..SimDriveConfig::default()
        };
        let mut base = SimDriveBase::new("base", Pose::default(), cfg, 42).unwrap();
        base.move_to(Pose::new(3.0, 0.0, 1.0), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(base.truth_handle().pose().distance_to(&base.odometry()) > 1e-6);
    }

    #[tokio::test]
    async fn stall_times_out_without_motion() {
        let cfg = SimDriveConfig {
            stall_probability: 1.0,
            ..exact()
        };
        let mut base = SimDriveBase::new("base", Pose::default(), cfg, 3).unwrap();
        let outcome = base
            .move_to(Pose::new(1.0, 0.0, 0.0), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome, MoveOutcome::TimedOut);
        assert_eq!(base.odometry(), Pose::default());
        assert_eq!(base.truth_handle().pose(), Pose::default());
    }

    #[tokio::test]
    async fn retry_continues_where_it_stopped() {
        let mut base = SimDriveBase::new("base", Pose::default(), exact(), 5).unwrap();
        let target = Pose::new(4.0, 0.0, 0.0);
        let first = base.move_to(target, Duration::from_secs(2)).await.unwrap();
        assert_eq!(first, MoveOutcome::TimedOut);
        let halfway = base.odometry();
        assert!(halfway.x > 0.0 && halfway.x < 4.0);

        let second = base.move_to(target, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second, MoveOutcome::Arrived);
    }

    #[tokio::test]
    async fn relocalize_moves_only_odometry() {
        let mut base = SimDriveBase::new("base", Pose::default(), exact(), 9).unwrap();
        base.relocalize(Pose::new(5.0, 5.0, 0.0));
        assert_eq!(base.odometry(), Pose::new(5.0, 5.0, 0.0));
        assert_eq!(base.truth_handle().pose(), Pose::default());
    }

    #[tokio::test]
    async fn non_finite_target_is_a_hardware_fault() {
        let mut base = SimDriveBase::new("base", Pose::default(), exact(), 0).unwrap();
        let target = Pose {
            x: f64::NAN,
            y: 0.0,
            heading_rad: 0.0,
        };
        let err = base.move_to(target, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, LocError::HardwareFault { .. }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SimDriveConfig {
            stall_probability: 1.5,
            ..SimDriveConfig::default()
        };
        assert!(SimDriveBase::new("base", Pose::default(), cfg, 0).is_err());
    }
}
