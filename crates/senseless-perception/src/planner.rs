//! Rendezvous-pose selection.
//!
//! Picks the pose the senseless robot should drive to before asking its
//! partner for a measurement.  The criterion is the classic active
//! localization one: minimise the *expected* posterior generalized variance.
//!
//! For every candidate pose the planner
//!
//! 1. inflates the current covariance by the travel noise of reaching it, and
//! 2. applies a zero-innovation Kalman correction with the measurement model
//!    linearised at that candidate.
//!
//! The candidate with the smallest `det(Σ⁺)` wins; ties keep the earliest
//! candidate, and the belief mean is always evaluated first.  The function is
//! pure, so identical inputs always give the identical pose.

use nalgebra::{DMatrix, DVector, Matrix3};
use senseless_types::{LocError, Pose};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::debug;

use crate::belief::{GaussianBelief, kalman_correct, range_bearing_model};
use crate::noise::{MeasurementNoise, ProcessNoise};

/// Largest accepted ring size; every candidate costs a Kalman correction.
pub const MAX_CANDIDATES: usize = 4096;

/// Axis-aligned rectangle the robot must stay in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for MapBounds {
    fn default() -> Self {
        Self {
            min_x: -50.0,
            min_y: -50.0,
            max_x: 50.0,
            max_y: 50.0,
        }
    }
}

impl MapBounds {
    pub fn clamp(&self, pose: Pose) -> Pose {
        Pose::new(
            pose.x.clamp(self.min_x, self.max_x),
            pose.y.clamp(self.min_y, self.max_y),
            pose.heading_rad,
        )
    }
}

/// Which observation model the planner should assume the partner uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedObservation {
    #[default]
    Absolute,
    RangeBearing,
}

/// Planner tuning, part of the controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Radius of the candidate ring around the belief mean (m).
    #[serde(default = "default_max_step")]
    pub max_step: f64,
    /// Number of candidates on the ring, `1..=MAX_CANDIDATES`.  Set
    /// `max_step` to 0 to disable the ring.
    #[serde(default = "default_candidate_count")]
    pub candidate_count: usize,
    #[serde(default)]
    pub map_bounds: MapBounds,
    #[serde(default)]
    pub expected_observation: ExpectedObservation,
}

fn default_max_step() -> f64 {
    1.0
}
fn default_candidate_count() -> usize {
    8
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_step: default_max_step(),
            candidate_count: default_candidate_count(),
            map_bounds: MapBounds::default(),
            expected_observation: ExpectedObservation::default(),
        }
    }
}

impl PlannerConfig {
    /// # Errors
    ///
    /// [`LocError::Config`] for a negative step, a ring size outside
    /// `1..=MAX_CANDIDATES` or inverted map bounds.
    pub fn validate(&self) -> Result<(), LocError> {
        if !self.max_step.is_finite() || self.max_step < 0.0 {
            return Err(LocError::Config(format!(
                "planner.max_step must be finite and >= 0, got {}",
                self.max_step
            )));
        }
        if !(1..=MAX_CANDIDATES).contains(&self.candidate_count) {
            return Err(LocError::Config(format!(
                "planner.candidate_count must be in 1..={MAX_CANDIDATES}, got {}",
                self.candidate_count
            )));
        }
        let b = &self.map_bounds;
        if !(b.min_x < b.max_x && b.min_y < b.max_y) {
            return Err(LocError::Config(format!(
                "planner.map_bounds are inverted or empty: {b:?}"
            )));
        }
        Ok(())
    }
}

/// Result of [`select_rendezvous_pose`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendezvousPlan {
    pub target: Pose,
    /// Expected posterior generalized variance at `target`.
    pub expected_uncertainty: f64,
    pub candidates_evaluated: usize,
}

/// Choose the rendezvous pose for the current cycle.
///
/// `partner_hint` is the partner's last known pose, if any.  With a hint the
/// candidate set gains a point `max_step` toward the partner and every
/// candidate heading faces the partner; range/bearing observations can only
/// be scored with a hint.
pub fn select_rendezvous_pose(
    belief: &GaussianBelief,
    partner_hint: Option<&Pose>,
    planner: &PlannerConfig,
    process: &ProcessNoise,
    measurement: &MeasurementNoise,
) -> RendezvousPlan {
    let mean = belief.mean();
    let mut best: Option<(Pose, f64)> = None;
    let mut evaluated = 0;

    for candidate in candidates(&mean, partner_hint, planner) {
        evaluated += 1;
        let score = expected_posterior_uncertainty(
            belief,
            &candidate,
            partner_hint,
            planner.expected_observation,
            process,
            measurement,
        );
        let better = match best {
            None => true,
            Some((_, best_score)) => score < best_score,
        };
        if better {
            best = Some((candidate, score));
        }
    }

    let (target, expected_uncertainty) = best.unwrap_or((mean, belief.uncertainty()));
    debug!(
        %target,
        expected_uncertainty,
        candidates = evaluated,
        "rendezvous pose selected"
    );
    RendezvousPlan {
        target,
        expected_uncertainty,
        candidates_evaluated: evaluated,
    }
}

fn candidates(mean: &Pose, partner_hint: Option<&Pose>, planner: &PlannerConfig) -> Vec<Pose> {
    let face = |x: f64, y: f64| match partner_hint {
        Some(p) if (p.x - x).hypot(p.y - y) > 1e-6 => (p.y - y).atan2(p.x - x),
        _ => mean.heading_rad,
    };
    let place = |x: f64, y: f64| {
        let clamped = planner.map_bounds.clamp(Pose::new(x, y, 0.0));
        Pose::new(clamped.x, clamped.y, face(clamped.x, clamped.y))
    };

    let mut out = Vec::with_capacity(planner.candidate_count.min(MAX_CANDIDATES).saturating_add(2));
    out.push(place(mean.x, mean.y));

    if planner.max_step > 0.0 {
        for i in 0..planner.candidate_count {
            let angle = TAU * i as f64 / planner.candidate_count as f64;
            out.push(place(
                mean.x + planner.max_step * angle.cos(),
                mean.y + planner.max_step * angle.sin(),
            ));
        }
        if let Some(p) = partner_hint {
            let dist = mean.distance_to(p);
            if dist > 1e-6 {
                let step = planner.max_step.min(dist);
                out.push(place(
                    mean.x + step * (p.x - mean.x) / dist,
                    mean.y + step * (p.y - mean.y) / dist,
                ));
            }
        }
    }
    out
}

fn expected_posterior_uncertainty(
    belief: &GaussianBelief,
    candidate: &Pose,
    partner_hint: Option<&Pose>,
    kind: ExpectedObservation,
    process: &ProcessNoise,
    measurement: &MeasurementNoise,
) -> f64 {
    let travel = belief.mean().displacement_to(candidate);
    let inflated: Matrix3<f64> = belief.covariance() + process.travel_increment(&travel);

    let linearised = match (kind, partner_hint) {
        (ExpectedObservation::RangeBearing, Some(partner)) => {
            match range_bearing_model(candidate, partner) {
                Some((_, _, h)) => {
                    let r = measurement.range_bearing_covariance();
                    Some((h, DMatrix::from_column_slice(2, 2, r.as_slice())))
                }
                // Candidate on top of the partner: no usable observation.
                None => None,
            }
        }
        _ => {
            let r = measurement.absolute_covariance();
            Some((
                DMatrix::<f64>::identity(3, 3),
                DMatrix::from_column_slice(3, 3, r.as_slice()),
            ))
        }
    };

    let Some((h, r)) = linearised else {
        return f64::INFINITY;
    };
    let zero = DVector::zeros(h.nrows());
    match kalman_correct(&inflated, &h, &r, &zero) {
        Some((_, posterior)) => posterior.determinant(),
        None => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::BeliefPrior;

    fn belief_at(x: f64, y: f64) -> GaussianBelief {
        GaussianBelief::from_prior(&BeliefPrior {
            pose: Pose::new(x, y, 0.3),
            std_xy: 1.0,
            std_heading: 0.4,
        })
        .unwrap()
    }

    fn plan(belief: &GaussianBelief, hint: Option<&Pose>, planner: &PlannerConfig) -> RendezvousPlan {
        select_rendezvous_pose(
            belief,
            hint,
            planner,
            &ProcessNoise::default(),
            &MeasurementNoise::default(),
        )
    }

    #[test]
    fn absolute_model_without_hint_stays_at_mean() {
        let b = belief_at(0.0, 0.0);
        let p = plan(&b, None, &PlannerConfig::default());
        assert!(p.target.distance_to(&b.mean()) < 1e-12);
        assert!((p.target.heading_rad - b.mean().heading_rad).abs() < 1e-12);
        assert_eq!(p.candidates_evaluated, 1 + PlannerConfig::default().candidate_count);
        assert!(p.expected_uncertainty < b.uncertainty());
    }

    #[test]
    fn selection_is_deterministic() {
        let b = belief_at(1.5, -2.0);
        let hint = Pose::new(6.0, 1.0, 0.0);
        let cfg = PlannerConfig {
            expected_observation: ExpectedObservation::RangeBearing,
            ..PlannerConfig::default()
        };
        let a = plan(&b, Some(&hint), &cfg);
        let c = plan(&b.clone(), Some(&hint), &cfg);
        assert_eq!(a, c);
    }

    #[test]
    fn range_bearing_prefers_moving_toward_partner() {
        let b = belief_at(0.0, 0.0);
        let hint = Pose::new(10.0, 0.0, 0.0);
        let cfg = PlannerConfig {
            expected_observation: ExpectedObservation::RangeBearing,
            max_step: 2.0,
            ..PlannerConfig::default()
        };
        let p = plan(&b, Some(&hint), &cfg);
        assert!(p.target.x > 1.0, "expected a step toward the partner, got {}", p.target);
        // Facing the partner.
        assert!(p.target.heading_rad.abs() < 1e-9);
    }

    #[test]
    fn candidates_are_clamped_to_map() {
        let b = belief_at(49.5, 0.0);
        let cfg = PlannerConfig {
            max_step: 5.0,
            ..PlannerConfig::default()
        };
        for c in candidates(&b.mean(), None, &cfg) {
            assert!(c.x <= cfg.map_bounds.max_x);
        }
    }

    #[test]
    fn zero_step_only_evaluates_mean() {
        let b = belief_at(0.0, 0.0);
        let cfg = PlannerConfig {
            max_step: 0.0,
            ..PlannerConfig::default()
        };
        let p = plan(&b, Some(&Pose::new(3.0, 0.0, 0.0)), &cfg);
        assert_eq!(p.candidates_evaluated, 1);
    }

    #[test]
    fn inverted_bounds_fail_validation() {
        let cfg = PlannerConfig {
            map_bounds: MapBounds {
                min_x: 1.0,
                min_y: 0.0,
                max_x: -1.0,
                max_y: 1.0,
            },
            ..PlannerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ring_size_is_bounded() {
        for bad in [0, MAX_CANDIDATES + 1, usize::MAX] {
            let cfg = PlannerConfig {
                candidate_count: bad,
                ..PlannerConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(LocError::Config(_))), "{bad} accepted");
        }
        let widest = PlannerConfig {
            candidate_count: MAX_CANDIDATES,
            ..PlannerConfig::default()
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn oversized_ring_does_not_panic_unvalidated() {
        let cfg = PlannerConfig {
            candidate_count: usize::MAX,
            max_step: 0.0,
            ..PlannerConfig::default()
        };
        let b = belief_at(0.0, 0.0);
        assert_eq!(plan(&b, None, &cfg).candidates_evaluated, 1);
    }
}
