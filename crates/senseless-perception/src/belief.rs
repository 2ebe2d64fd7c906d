//! Gaussian belief over the senseless robot's planar pose.
//!
//! The belief is `N(μ, Σ)` over `(x, y, heading)`.  It is advanced by
//! [`GaussianBelief::predict`] (widens) and refined by
//! [`GaussianBelief::update`] (narrows), an extended Kalman filter in Joseph
//! form.
//!
//! The scalar uncertainty used throughout the stack is the generalized
//! variance `det(Σ)`:
//!
//! - prediction adds a positive semi-definite increment, so `det` never
//!   decreases;
//! - a Kalman correction yields `Σ⁺ = Σ − K S Kᵀ ≼ Σ`, so `det` never
//!   increases.
//!
//! # Example
//!
//! ```rust
//! use senseless_perception::belief::{BeliefPrior, GaussianBelief};
//! use senseless_perception::noise::{MeasurementNoise, ProcessNoise};
//! use senseless_types::{Displacement, Observation, Pose};
//!
//! let mut belief = GaussianBelief::from_prior(&BeliefPrior::default()).unwrap();
//! let before = belief.uncertainty();
//!
//! belief.predict(None, 0.5, &ProcessNoise::default());
//! assert!(belief.uncertainty() >= before);
//!
//! let fix = Observation::Absolute { pose: Pose::new(1.0, 0.0, 0.0) };
//! belief
//!     .update(&fix, &Displacement::default(), &MeasurementNoise::default())
//!     .unwrap();
//! assert!(belief.mean().x > 0.5);
//! ```

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use senseless_types::{Displacement, LocError, Observation, Pose, wrap_angle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::noise::{MeasurementNoise, ProcessNoise};

/// Below this squared distance a range/bearing observation has no usable
/// geometry.
const MIN_RANGE_SQ: f64 = 1e-9;

/// Relative tolerance used by [`GaussianBelief::is_valid`].
const VALIDITY_TOLERANCE: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// Prior
// ────────────────────────────────────────────────────────────────────────────

/// Initial belief, as supplied by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeliefPrior {
    /// Prior mean.
    #[serde(default)]
    pub pose: Pose,
    /// Standard deviation of x and y (m).
    #[serde(default = "default_std_xy")]
    pub std_xy: f64,
    /// Standard deviation of the heading (rad).
    #[serde(default = "default_std_heading")]
    pub std_heading: f64,
}

fn default_std_xy() -> f64 {
    1.0
}
fn default_std_heading() -> f64 {
    0.5
}

impl Default for BeliefPrior {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            std_xy: default_std_xy(),
            std_heading: default_std_heading(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Update errors
// ────────────────────────────────────────────────────────────────────────────

/// Why a measurement could not be folded into the belief.  The belief is
/// left untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpdateError {
    #[error("observation contains non-finite values")]
    NonFiniteObservation,
    #[error("range/bearing geometry is degenerate (robot on top of partner)")]
    DegenerateGeometry,
    #[error("innovation covariance is singular")]
    SingularInnovation,
    #[error("posterior failed validation")]
    InvalidPosterior,
}

/// Summary of an applied update, used for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateReport {
    pub uncertainty_before: f64,
    pub uncertainty_after: f64,
    /// Euclidean norm of the innovation vector.
    pub innovation_norm: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// GaussianBelief
// ────────────────────────────────────────────────────────────────────────────

/// `N(μ, Σ)` over `(x, y, heading)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBelief {
    mean: Vector3<f64>,
    covariance: Matrix3<f64>,
}

impl GaussianBelief {
    /// Build a belief from a configured prior.
    ///
    /// # Errors
    ///
    /// [`LocError::InvalidBelief`] when the prior mean is not finite or a
    /// standard deviation is not strictly positive.
    pub fn from_prior(prior: &BeliefPrior) -> Result<Self, LocError> {
        if !(prior.std_xy.is_finite() && prior.std_xy > 0.0) {
            return Err(LocError::InvalidBelief(format!(
                "prior std_xy must be finite and > 0, got {}",
                prior.std_xy
            )));
        }
        if !(prior.std_heading.is_finite() && prior.std_heading > 0.0) {
            return Err(LocError::InvalidBelief(format!(
                "prior std_heading must be finite and > 0, got {}",
                prior.std_heading
            )));
        }
        let var_xy = prior.std_xy.powi(2);
        Self::new(
            prior.pose,
            Matrix3::from_diagonal(&Vector3::new(var_xy, var_xy, prior.std_heading.powi(2))),
        )
    }

    /// # Errors
    ///
    /// [`LocError::InvalidBelief`] when the result would not be a valid
    /// distribution.
    pub fn new(mean: Pose, covariance: Matrix3<f64>) -> Result<Self, LocError> {
        let belief = Self {
            mean: Vector3::new(mean.x, mean.y, wrap_angle(mean.heading_rad)),
            covariance,
        };
        if belief.is_valid() {
            Ok(belief)
        } else {
            Err(LocError::InvalidBelief(format!(
                "mean {mean} with covariance {covariance:?} is not a valid Gaussian"
            )))
        }
    }

    pub fn mean(&self) -> Pose {
        Pose::new(self.mean[0], self.mean[1], self.mean[2])
    }

    pub fn covariance(&self) -> &Matrix3<f64> {
        &self.covariance
    }

    /// Row-major copy of the covariance, as carried on the wire.
    pub fn covariance_rows(&self) -> [[f64; 3]; 3] {
        let c = &self.covariance;
        [
            [c[(0, 0)], c[(0, 1)], c[(0, 2)]],
            [c[(1, 0)], c[(1, 1)], c[(1, 2)]],
            [c[(2, 0)], c[(2, 1)], c[(2, 2)]],
        ]
    }

    /// Generalized variance `det(Σ)`.
    pub fn uncertainty(&self) -> f64 {
        self.covariance.determinant()
    }

    /// Total variance `tr(Σ)`.
    pub fn trace(&self) -> f64 {
        self.covariance.trace()
    }

    /// `true` when the mean is finite and `Σ` is a finite, symmetric,
    /// positive semi-definite matrix.
    pub fn is_valid(&self) -> bool {
        if !self.mean.iter().all(|v| v.is_finite()) {
            return false;
        }
        if !self.covariance.iter().all(|v| v.is_finite()) {
            return false;
        }
        let scale = 1.0 + self.covariance.amax();
        let asymmetry = (self.covariance - self.covariance.transpose()).amax();
        if asymmetry > VALIDITY_TOLERANCE * scale {
            return false;
        }
        self.covariance.symmetric_eigenvalues().min() >= -VALIDITY_TOLERANCE * scale
    }

    // ------------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------------

    /// Advance the belief by one motion-model step of `dt` seconds.
    ///
    /// A finite `odometry` shifts the mean and adds travel noise; without it
    /// only the (inflated) time-based noise is added.  Never fails.
    pub fn predict(&mut self, odometry: Option<&Displacement>, dt: f64, noise: &ProcessNoise) {
        let odometry = odometry.filter(|d| d.is_finite());
        if let Some(d) = odometry {
            let moved = self.mean().offset(d);
            self.mean = Vector3::new(moved.x, moved.y, moved.heading_rad);
        }
        self.covariance += noise.increment(dt, odometry);
        self.symmetrize();
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Fold `observation` into the belief.
    ///
    /// The observation was taken after the robot executed `displacement`
    /// from the pose this belief describes; the measurement model is
    /// evaluated at `mean ⊕ displacement`.  The displacement itself is
    /// applied later by the next [`predict`][Self::predict].
    ///
    /// # Errors
    ///
    /// Returns an [`UpdateError`] and leaves the belief unchanged when the
    /// observation cannot be used.
    pub fn update(
        &mut self,
        observation: &Observation,
        displacement: &Displacement,
        noise: &MeasurementNoise,
    ) -> Result<UpdateReport, UpdateError> {
        if !observation.is_finite() || !displacement.is_finite() {
            return Err(UpdateError::NonFiniteObservation);
        }
        let at = self.mean().offset(displacement);

        let (h, r, innovation) = match observation {
            Observation::Absolute { pose } => {
                let innovation = DVector::from_column_slice(&[
                    pose.x - at.x,
                    pose.y - at.y,
                    wrap_angle(pose.heading_rad - at.heading_rad),
                ]);
                let r = noise.absolute_covariance();
                (
                    DMatrix::<f64>::identity(3, 3),
                    DMatrix::from_column_slice(3, 3, r.as_slice()),
                    innovation,
                )
            }
            Observation::RangeBearing {
                partner_pose,
                range,
                bearing_rad,
            } => {
                if *range <= 0.0 {
                    return Err(UpdateError::DegenerateGeometry);
                }
                let (expected_range, expected_bearing, h) =
                    range_bearing_model(&at, partner_pose).ok_or(UpdateError::DegenerateGeometry)?;
                let innovation = DVector::from_column_slice(&[
                    range - expected_range,
                    wrap_angle(bearing_rad - expected_bearing),
                ]);
                let r = noise.range_bearing_covariance();
                (h, DMatrix::from_column_slice(2, 2, r.as_slice()), innovation)
            }
        };

        let innovation_norm = innovation.norm();
        let (correction, covariance) = kalman_correct(&self.covariance, &h, &r, &innovation)
            .ok_or(UpdateError::SingularInnovation)?;

        let candidate = {
            let mut next = Self {
                mean: self.mean + correction,
                covariance,
            };
            next.mean[2] = wrap_angle(next.mean[2]);
            next.symmetrize();
            next
        };
        if !candidate.is_valid() {
            return Err(UpdateError::InvalidPosterior);
        }

        let uncertainty_before = self.uncertainty();
        *self = candidate;
        Ok(UpdateReport {
            uncertainty_before,
            uncertainty_after: self.uncertainty(),
            innovation_norm,
        })
    }

    fn symmetrize(&mut self) {
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared filter math
// ────────────────────────────────────────────────────────────────────────────

/// Expected range, bearing (in the partner's frame) and the 2×3 Jacobian of
/// that observation with respect to the robot pose `at`.
///
/// Returns `None` when the robot sits on top of the partner.
pub(crate) fn range_bearing_model(at: &Pose, partner: &Pose) -> Option<(f64, f64, DMatrix<f64>)> {
    let dx = at.x - partner.x;
    let dy = at.y - partner.y;
    let r2 = dx * dx + dy * dy;
    if r2 < MIN_RANGE_SQ {
        return None;
    }
    let r = r2.sqrt();
    let bearing = wrap_angle(dy.atan2(dx) - partner.heading_rad);
    let h = DMatrix::from_row_slice(2, 3, &[dx / r, dy / r, 0.0, -dy / r2, dx / r2, 0.0]);
    Some((r, bearing, h))
}

/// One Joseph-form Kalman correction.
///
/// Returns the mean correction `K·ν` and the posterior covariance
/// `(I − KH) Σ (I − KH)ᵀ + K R Kᵀ`, or `None` if `HΣHᵀ + R` is singular.
pub(crate) fn kalman_correct(
    covariance: &Matrix3<f64>,
    h: &DMatrix<f64>,
    r: &DMatrix<f64>,
    innovation: &DVector<f64>,
) -> Option<(Vector3<f64>, Matrix3<f64>)> {
    let p = DMatrix::from_column_slice(3, 3, covariance.as_slice());
    let ht = h.transpose();
    let s = h * &p * &ht + r;
    let s_inv = s.try_inverse()?;
    let k = &p * &ht * s_inv;
    let i_kh = DMatrix::<f64>::identity(3, 3) - &k * h;
    let posterior = &i_kh * &p * i_kh.transpose() + &k * r * k.transpose();
    let correction = &k * innovation;
    Some((
        Vector3::from_column_slice(correction.as_slice()),
        Matrix3::from_column_slice(posterior.as_slice()),
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
