//! [`ControllerConfig`] – everything the controller is tuned with.
//!
//! Supplied once at construction and immutable afterwards.  Every section has
//! defaults, so a TOML file only needs the keys it wants to change.  Durations
//! are written in milliseconds.
//!
//! ```toml
//! robot_id = "senseless-1"
//! nominal_dt_ms = 1000
//!
//! [timeouts]
//! listen_timeout_ms = 2000
//!
//! [planner]
//! max_step = 1.5
//! expected_observation = "range_bearing"
//! ```

use std::time::Duration;

use senseless_perception::{MeasurementNoise, PlannerConfig, ProcessNoise};
use senseless_types::LocError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub move_timeout_ms: u64,
    pub listen_timeout_ms: u64,
    pub send_timeout_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            move_timeout_ms: 15_000,
            listen_timeout_ms: 2_000,
            send_timeout_ms: 500,
        }
    }
}

/// Extra attempts after the first one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retries {
    pub move_retries: u32,
    pub send_retries: u32,
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            move_retries: 2,
            send_retries: 3,
        }
    }
}

/// Bounds on how old (or how far in the future) a measurement may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Freshness {
    pub max_measurement_age_ms: u64,
    pub clock_skew_tolerance_ms: u64,
}

impl Default for Freshness {
    fn default() -> Self {
        Self {
            max_measurement_age_ms: 5_000,
            clock_skew_tolerance_ms: 250,
        }
    }
}

/// Configuration of a [`Controller`][crate::Controller].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Identity of this senseless robot on the channel.
    pub robot_id: String,
    /// Time step used for the first prediction, and for every prediction
    /// when `fixed_time_step` is set.
    pub nominal_dt_ms: u64,
    /// Ignore wall-clock time between predictions.
    pub fixed_time_step: bool,
    pub process_noise: ProcessNoise,
    pub measurement_noise: MeasurementNoise,
    pub timeouts: Timeouts,
    pub retries: Retries,
    pub freshness: Freshness,
    pub planner: PlannerConfig,
    /// Consecutive cycles without a belief update before a warning is logged.
    pub miss_alert_threshold: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            robot_id: "senseless-1".to_string(),
            nominal_dt_ms: 1_000,
            fixed_time_step: false,
            process_noise: ProcessNoise::default(),
            measurement_noise: MeasurementNoise::default(),
            timeouts: Timeouts::default(),
            retries: Retries::default(),
            freshness: Freshness::default(),
            planner: PlannerConfig::default(),
            miss_alert_threshold: 3,
        }
    }
}

impl ControllerConfig {
    pub fn nominal_dt(&self) -> Duration {
        Duration::from_millis(self.nominal_dt_ms)
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.move_timeout_ms)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.listen_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.send_timeout_ms)
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// The first problem found, as [`LocError::Config`].
    pub fn validate(&self) -> Result<(), LocError> {
        if self.robot_id.trim().is_empty() {
            return Err(LocError::Config("robot_id must not be empty".into()));
        }
        if self.nominal_dt_ms == 0 {
            return Err(LocError::Config("nominal_dt_ms must be > 0".into()));
        }
        for (name, ms) in [
            ("move_timeout_ms", self.timeouts.move_timeout_ms),
            ("listen_timeout_ms", self.timeouts.listen_timeout_ms),
            ("send_timeout_ms", self.timeouts.send_timeout_ms),
            ("max_measurement_age_ms", self.freshness.max_measurement_age_ms),
        ] {
            if ms == 0 {
                return Err(LocError::Config(format!("{name} must be > 0")));
            }
        }
        if self.miss_alert_threshold == 0 {
            return Err(LocError::Config("miss_alert_threshold must be >= 1".into()));
        }
        self.process_noise.validate()?;
        self.measurement_noise.validate()?;
        self.planner.validate()
    }
}
