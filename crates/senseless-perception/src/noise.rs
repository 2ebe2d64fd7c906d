//! Noise models for the prediction and update steps.
//!
//! Both structs are part of the controller configuration surface and are
//! immutable once the controller is built.

use nalgebra::{Matrix2, Matrix3, Vector3};
use senseless_types::{Displacement, LocError};
use serde::{Deserialize, Serialize};

/// Process noise applied by every prediction step.
///
/// The covariance grows by
/// `diag(q_xy, q_xy, q_heading) * dt + diag(k_xy, k_xy, k_heading) * travel`
/// where `travel = |d_xy| + |d_heading|` of the executed displacement.  When
/// no displacement is known the whole increment is scaled by
/// `stale_inflation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessNoise {
    /// Positional variance rate (m²/s).
    #[serde(default = "default_q_xy")]
    pub q_xy: f64,
    /// Heading variance rate (rad²/s).
    #[serde(default = "default_q_heading")]
    pub q_heading: f64,
    /// Positional variance per unit of travel.
    #[serde(default = "default_k_xy")]
    pub k_xy: f64,
    /// Heading variance per unit of travel.
    #[serde(default = "default_k_heading")]
    pub k_heading: f64,
    /// Multiplier (≥ 1) applied when the prediction runs without odometry.
    #[serde(default = "default_stale_inflation")]
    pub stale_inflation: f64,
}

fn default_q_xy() -> f64 {
    0.002
}
fn default_q_heading() -> f64 {
    0.0005
}
fn default_k_xy() -> f64 {
    0.01
}
fn default_k_heading() -> f64 {
    0.005
}
fn default_stale_inflation() -> f64 {
    4.0
}

impl Default for ProcessNoise {
    fn default() -> Self {
        Self {
            q_xy: default_q_xy(),
            q_heading: default_q_heading(),
            k_xy: default_k_xy(),
            k_heading: default_k_heading(),
            stale_inflation: default_stale_inflation(),
        }
    }
}

impl ProcessNoise {
    /// # Errors
    ///
    /// [`LocError::Config`] when a rate is negative or non-finite, or when
    /// `stale_inflation < 1`.
    pub fn validate(&self) -> Result<(), LocError> {
        for (name, v) in [
            ("q_xy", self.q_xy),
            ("q_heading", self.q_heading),
            ("k_xy", self.k_xy),
            ("k_heading", self.k_heading),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(LocError::Config(format!(
                    "process_noise.{name} must be finite and >= 0, got {v}"
                )));
            }
        }
        if !self.stale_inflation.is_finite() || self.stale_inflation < 1.0 {
            return Err(LocError::Config(format!(
                "process_noise.stale_inflation must be >= 1, got {}",
                self.stale_inflation
            )));
        }
        Ok(())
    }

    /// Covariance increment for a prediction over `dt` seconds.
    pub fn increment(&self, dt: f64, odometry: Option<&Displacement>) -> Matrix3<f64> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let time_part = Matrix3::from_diagonal(&Vector3::new(self.q_xy, self.q_xy, self.q_heading)) * dt;
        match odometry {
            Some(d) => time_part + self.travel_increment(d),
            None => time_part * self.stale_inflation,
        }
    }

    /// Covariance increment attributable to travelling along `d` alone.
    pub fn travel_increment(&self, d: &Displacement) -> Matrix3<f64> {
        let travel = d.linear_norm() + d.angular_norm();
        Matrix3::from_diagonal(&Vector3::new(self.k_xy, self.k_xy, self.k_heading)) * travel
    }
}

/// Measurement noise for the two observation kinds the partner can produce.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementNoise {
    /// Standard deviation of an absolute position fix (m).
    #[serde(default = "default_absolute_std_xy")]
    pub absolute_std_xy: f64,
    /// Standard deviation of an absolute heading fix (rad).
    #[serde(default = "default_absolute_std_heading")]
    pub absolute_std_heading: f64,
    /// Standard deviation of a range reading (m).
    #[serde(default = "default_range_std")]
    pub range_std: f64,
    /// Standard deviation of a bearing reading (rad).
    #[serde(default = "default_bearing_std")]
    pub bearing_std: f64,
}

fn default_absolute_std_xy() -> f64 {
    0.1
}
fn default_absolute_std_heading() -> f64 {
    0.05
}
fn default_range_std() -> f64 {
    0.05
}
fn default_bearing_std() -> f64 {
    0.02
}

impl Default for MeasurementNoise {
    fn default() -> Self {
        Self {
            absolute_std_xy: default_absolute_std_xy(),
            absolute_std_heading: default_absolute_std_heading(),
            range_std: default_range_std(),
            bearing_std: default_bearing_std(),
        }
    }
}

impl MeasurementNoise {
    /// # Errors
    ///
    /// [`LocError::Config`] when any standard deviation is not strictly
    /// positive and finite.  A zero measurement noise would make the
    /// innovation covariance singular for a collapsed belief.
    pub fn validate(&self) -> Result<(), LocError> {
        for (name, v) in [
            ("absolute_std_xy", self.absolute_std_xy),
            ("absolute_std_heading", self.absolute_std_heading),
            ("range_std", self.range_std),
            ("bearing_std", self.bearing_std),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(LocError::Config(format!(
                    "measurement_noise.{name} must be finite and > 0, got {v}"
                )));
            }
        }
        Ok(())
    }

    pub fn absolute_covariance(&self) -> Matrix3<f64> {
        let sxy = self.absolute_std_xy.powi(2);
        Matrix3::from_diagonal(&Vector3::new(sxy, sxy, self.absolute_std_heading.powi(2)))
    }

    pub fn range_bearing_covariance(&self) -> Matrix2<f64> {
        Matrix2::new(self.range_std.powi(2), 0.0, 0.0, self.bearing_std.powi(2))
    }
}
