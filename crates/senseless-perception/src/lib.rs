//! `senseless-perception` – the estimation layer.
//!
//! Owns everything the controller needs to reason about where the senseless
//! robot probably is and where it should go next.
//!
//! # Modules
//!
//! - [`belief`] – [`GaussianBelief`][belief::GaussianBelief]: Gaussian pose
//!   belief with an extended-Kalman predict/update pair.
//! - [`noise`] – [`ProcessNoise`][noise::ProcessNoise] and
//!   [`MeasurementNoise`][noise::MeasurementNoise]: the noise models both
//!   steps consume.
//! - [`planner`] – [`select_rendezvous_pose`][planner::select_rendezvous_pose]:
//!   deterministic choice of the next rendezvous pose by expected posterior
//!   uncertainty.

pub mod belief;
pub mod noise;
pub mod planner;

pub use belief::{BeliefPrior, GaussianBelief, UpdateError, UpdateReport};
pub use noise::{MeasurementNoise, ProcessNoise};
pub use planner::{
    ExpectedObservation, MAX_CANDIDATES, MapBounds, PlannerConfig, RendezvousPlan,
    select_rendezvous_pose,
};
