//! `senseless-runtime` – the rendezvous localization engine.
//!
//! Sequences prediction, motion, communication and belief update into one
//! repeating control cycle.
//!
//! # Modules
//!
//! - [`controller`] – [`Controller`]: owns the belief and the active state,
//!   runs one state per [`step`][Controller::step], classifies finished
//!   cycles and stops on cancellation.
//! - [`states`] – [`StateId`]: the seven state bodies and their transition
//!   table.
//! - [`context`] – [`CycleContext`]: per-cycle scratch space, and the
//!   [`CycleOutcome`] each cycle ends with.
//! - [`config`] – [`ControllerConfig`]: noise models, timeouts, retry bounds,
//!   freshness limits and planner tuning.
//! - [`miss_guard`] – [`MissGuard`][miss_guard::MissGuard]: warns when the
//!   robot keeps missing its partner.
//! - [`telemetry`] – [`init_tracing`]: `tracing` subscriber with optional
//!   OTLP export.

pub mod config;
pub mod context;
pub mod controller;
pub mod miss_guard;
pub mod states;
pub mod telemetry;

pub use config::{ControllerConfig, Freshness, Retries, Timeouts};
pub use context::{CycleContext, CycleOutcome, MeasurementRejection};
pub use controller::{CancelHandle, Controller, RunSummary};
pub use states::{Collaborators, StateId};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
