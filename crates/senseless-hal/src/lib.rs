//! `senseless-hal` – motion hardware abstraction.
//!
//! The controller never talks to motors directly.  It commands a
//! [`MotionActuator`] to reach a pose within a bounded time and gets back a
//! [`MoveOutcome`].  Drivers can be swapped without touching the state
//! machine.
//!
//! # Modules
//!
//! - [`actuator`] – the [`MotionActuator`] contract and [`MoveOutcome`].
//! - [`pid`] – [`PidController`][pid::PidController], the feedback loop the
//!   simulated base steers with.
//! - [`sim`] – [`SimDriveBase`][sim::SimDriveBase]: a headless differential
//!   drive with slip and stall injection, plus a [`TruthHandle`][sim::TruthHandle]
//!   exposing its ground-truth pose to the simulated partner.

pub mod actuator;
pub mod pid;
pub mod sim;

pub use actuator::{MotionActuator, MoveOutcome};
pub use sim::{SimDriveBase, SimDriveConfig, TruthHandle};
