//! [`Controller`] – the rendezvous state-machine driver.
//!
//! Owns the belief, the active [`StateId`], the per-cycle
//! [`CycleContext`] and the collaborators.  Each [`step`][Controller::step]:
//!
//! 1. starts a new cycle when the active state is PredictPriorBelief (fresh
//!    rendezvous id, elapsed time, odometry carried from the last cycle);
//! 2. runs the active state inside a span named after it;
//! 3. applies the returned transition, closing the cycle when it leads back
//!    to PredictPriorBelief.
//!
//! A fatal error leaves the active state unchanged and is returned to the
//! caller.  Cancellation is observed only between states, so no state is
//! ever interrupted.
//!
//! # Example
//!
//! ```rust,no_run
//! use senseless_hal::{SimDriveBase, SimDriveConfig};
//! use senseless_middleware::{BusChannel, EventBus};
//! use senseless_perception::BeliefPrior;
//! use senseless_runtime::{Controller, ControllerConfig};
//! use senseless_types::Pose;
//!
//! # async fn demo() -> Result<(), senseless_types::LocError> {
//! let config = ControllerConfig::default();
//! let base = SimDriveBase::new("drive_base", Pose::default(), SimDriveConfig::default(), 1)?;
//! let channel = BusChannel::new(EventBus::default(), config.robot_id.clone());
//! let mut controller = Controller::new(
//!     config,
//!     &BeliefPrior::default(),
//!     Box::new(base),
//!     Box::new(channel),
//! )?;
//! let summary = controller.run_cycles(10).await?;
//! println!("{summary:?}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use senseless_hal::MotionActuator;
use senseless_middleware::RendezvousChannel;
use senseless_perception::{BeliefPrior, GaussianBelief};
use senseless_types::{Displacement, LocError, Pose, RendezvousId};
use tracing::{Instrument, info, warn};

use crate::config::ControllerConfig;
use crate::context::{CycleContext, CycleOutcome};
use crate::miss_guard::MissGuard;
use crate::states::{Collaborators, StateId};

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable stop request, observed between states.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run summary
// ─────────────────────────────────────────────────────────────────────────────

/// Tally of cycle outcomes since the controller was built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub updated: u64,
    pub missed: u64,
    pub rejected: u64,
    pub motion_failed: u64,
    pub update_skipped: u64,
    pub final_mean: Pose,
    pub final_uncertainty: f64,
}

impl RunSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Updated => self.updated += 1,
            CycleOutcome::MissedRendezvous => self.missed += 1,
            CycleOutcome::Rejected(_) => self.rejected += 1,
            CycleOutcome::MotionFailed => self.motion_failed += 1,
            CycleOutcome::UpdateSkipped => self.update_skipped += 1,
        }
    }
}

/// Data that survives from one cycle into the next.
#[derive(Debug, Default)]
struct Carry {
    odometry: Option<Displacement>,
    partner_hint: Option<Pose>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

pub struct Controller {
    config: ControllerConfig,
    belief: GaussianBelief,
    state: StateId,
    ctx: CycleContext,
    collaborators: Collaborators,
    next_id: RendezvousId,
    carry: Carry,
    last_prediction: Option<Instant>,
    cycles_completed: u64,
    last_outcome: Option<CycleOutcome>,
    miss_guard: MissGuard,
    summary: RunSummary,
    cancel: CancelHandle,
}

impl Controller {
    /// Build a controller starting in PredictPriorBelief.
    ///
    /// # Errors
    ///
    /// [`LocError::Config`] for an invalid configuration,
    /// [`LocError::InvalidBelief`] for an unusable prior.
    pub fn new(
        config: ControllerConfig,
        prior: &BeliefPrior,
        actuator: Box<dyn MotionActuator>,
        channel: Box<dyn RendezvousChannel>,
    ) -> Result<Self, LocError> {
        config.validate()?;
        let belief = GaussianBelief::from_prior(prior)?;
        info!(
            robot_id = %config.robot_id,
            actuator = actuator.id(),
            prior = %belief.mean(),
            uncertainty = belief.uncertainty(),
            "controller ready"
        );
        Ok(Self {
            miss_guard: MissGuard::new(config.miss_alert_threshold),
            config,
            belief,
            state: StateId::INITIAL,
            ctx: CycleContext::default(),
            collaborators: Collaborators { actuator, channel },
            next_id: RendezvousId(1),
            carry: Carry::default(),
            last_prediction: None,
            cycles_completed: 0,
            last_outcome: None,
            summary: RunSummary::default(),
            cancel: CancelHandle::default(),
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn belief(&self) -> &GaussianBelief {
        &self.belief
    }

    pub fn current_state(&self) -> StateId {
        self.state
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Context of the cycle in progress (empty between cycles).
    pub fn context(&self) -> &CycleContext {
        &self.ctx
    }

    pub fn last_outcome(&self) -> Option<&CycleOutcome> {
        self.last_outcome.as_ref()
    }

    /// Belief mean moved through the displacement executed in the last
    /// cycle, which the next prediction has not applied yet.
    pub fn projected_mean(&self) -> Pose {
        let mean = self.belief.mean();
        match &self.carry.odometry {
            Some(d) => mean.offset(d),
            None => mean,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            final_mean: self.belief.mean(),
            final_uncertainty: self.belief.uncertainty(),
            ..self.summary.clone()
        }
    }

    /// Execute exactly one state.
    ///
    /// # Errors
    ///
    /// Fatal errors from the state; the active state is left unchanged.
    pub async fn step(&mut self) -> Result<StateId, LocError> {
        if self.state == StateId::PredictPriorBelief {
            self.begin_cycle();
        }

        let state = self.state;
        let span = state.span(self.cycles_completed + 1, &self.ctx);
        let next = state
            .run(&mut self.belief, &mut self.ctx, &mut self.collaborators, &self.config)
            .instrument(span)
            .await?;

        if next == StateId::PredictPriorBelief {
            self.finish_cycle();
        }
        self.state = next;
        Ok(next)
    }

    /// Run until `cycles` more cycles have completed or cancellation.
    ///
    /// # Errors
    ///
    /// The first fatal error.
    pub async fn run_cycles(&mut self, cycles: u64) -> Result<RunSummary, LocError> {
        self.run_until(Some(self.cycles_completed + cycles)).await
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// The first fatal error.
    pub async fn run(&mut self) -> Result<RunSummary, LocError> {
        self.run_until(None).await
    }

    async fn run_until(&mut self, limit: Option<u64>) -> Result<RunSummary, LocError> {
        loop {
            if self.cancel.is_cancelled() {
                info!(state = %self.state, cycles = self.cycles_completed, "cancellation requested, stopping");
                break;
            }
            if limit.is_some_and(|n| self.cycles_completed >= n) {
                break;
            }
            self.step().await?;
        }
        Ok(self.summary())
    }

    fn begin_cycle(&mut self) {
        let now = Instant::now();
        let dt = match self.last_prediction {
            Some(prev) if !self.config.fixed_time_step => now.duration_since(prev),
            _ => self.config.nominal_dt(),
        };
        self.last_prediction = Some(now);

        self.ctx = CycleContext::begin(self.next_id, dt, self.carry.odometry.take(), self.carry.partner_hint);
        self.next_id = self.next_id.next();
    }

    fn finish_cycle(&mut self) {
        let ctx = std::mem::take(&mut self.ctx);
        let outcome = ctx.outcome.unwrap_or(CycleOutcome::MissedRendezvous);

        self.cycles_completed += 1;
        self.summary.record(&outcome);
        if self.miss_guard.record(outcome.produced_update()) {
            warn!(
                cycles = self.miss_guard.threshold(),
                uncertainty = self.belief.uncertainty(),
                "no belief update for consecutive cycles, uncertainty is only growing"
            );
        }

        self.carry.odometry = ctx.executed;
        self.carry.partner_hint = ctx.partner_hint;

        info!(
            cycle = self.cycles_completed,
            rendezvous_id = %ctx.rendezvous_id,
            %outcome,
            mean = %self.belief.mean(),
            uncertainty = self.belief.uncertainty(),
            "cycle complete"
        );
        self.last_outcome = Some(outcome);
    }
}
