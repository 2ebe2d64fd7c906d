//! The seven states of the rendezvous cycle.
//!
//! ```text
//!  ┌──────────────────────┐
//!  │ PredictPriorBelief   │◄──────────────────────────────────────────┐
//!  └─────────┬────────────┘                                           │
//!            ▼                                                        │
//!  ┌──────────────────────┐                                           │
//!  │ ComputeNextPose      │                                           │
//!  └─────────┬────────────┘                                           │
//!            ▼                                                        │
//!  ┌──────────────────────┐  stalled after retries                    │
//!  │ MoveToRendezvousPose │───────────────────────────────────────────┤
//!  └─────────┬────────────┘                                           │
//!            ▼                                                        │
//!  ┌──────────────────────┐                                           │
//!  │ SendRendezvousBelief │                                           │
//!  └─────────┬────────────┘                                           │
//!            ▼                                                        │
//!  ┌──────────────────────┐  listen timeout                           │
//!  │ ListenForMeasurement │───────────────────────────────────────────┤
//!  └─────────┬────────────┘                                           │
//!            ▼                                                        │
//!  ┌────────────────────────┐  invalid measurement                    │
//!  │ AcknowledgeMeasurement │─────────────────────────────────────────┤
//!  └─────────┬──────────────┘                                         │
//!            ▼                                                        │
//!  ┌──────────────────────┐                                           │
//!  │ UpdateBelief         │───────────────────────────────────────────┘
//!  └──────────────────────┘
//! ```
//!
//! Every state body receives the belief (mutably only for prediction and
//! update), the cycle context and the collaborators it needs, and returns the
//! next [`StateId`].  The controller alone applies the transition.

mod acknowledge;
mod compute_pose;
mod listen;
mod move_to;
mod predict;
mod send;
mod update;

use std::fmt;

use senseless_hal::MotionActuator;
use senseless_middleware::RendezvousChannel;
use senseless_perception::GaussianBelief;
use senseless_types::LocError;
use tracing::{Span, info_span};

use crate::config::ControllerConfig;
use crate::context::CycleContext;

pub use acknowledge::validate_measurement;

/// The external collaborators the states drive.
pub struct Collaborators {
    pub actuator: Box<dyn MotionActuator>,
    pub channel: Box<dyn RendezvousChannel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateId {
    PredictPriorBelief,
    ComputeNextPose,
    MoveToRendezvousPose,
    SendRendezvousBelief,
    ListenForMeasurement,
    AcknowledgeMeasurement,
    UpdateBelief,
}

impl StateId {
    pub const INITIAL: StateId = StateId::PredictPriorBelief;

    pub fn name(self) -> &'static str {
        match self {
            StateId::PredictPriorBelief => "predict_prior_belief",
            StateId::ComputeNextPose => "compute_next_pose",
            StateId::MoveToRendezvousPose => "move_to_rendezvous_pose",
            StateId::SendRendezvousBelief => "send_rendezvous_belief",
            StateId::ListenForMeasurement => "listen_for_measurement",
            StateId::AcknowledgeMeasurement => "acknowledge_measurement",
            StateId::UpdateBelief => "update_belief",
        }
    }

    /// Span wrapping one execution of this state.
    pub fn span(self, cycle: u64, ctx: &CycleContext) -> Span {
        let id = ctx.rendezvous_id.0;
        match self {
            StateId::PredictPriorBelief => info_span!("predict_prior_belief", cycle, rendezvous_id = id),
            StateId::ComputeNextPose => info_span!("compute_next_pose", cycle, rendezvous_id = id),
            StateId::MoveToRendezvousPose => {
                info_span!("move_to_rendezvous_pose", cycle, rendezvous_id = id)
            }
            StateId::SendRendezvousBelief => {
                info_span!("send_rendezvous_belief", cycle, rendezvous_id = id)
            }
            StateId::ListenForMeasurement => {
                info_span!("listen_for_measurement", cycle, rendezvous_id = id)
            }
            StateId::AcknowledgeMeasurement => {
                info_span!("acknowledge_measurement", cycle, rendezvous_id = id)
            }
            StateId::UpdateBelief => info_span!("update_belief", cycle, rendezvous_id = id),
        }
    }

    /// Execute this state once and return the state to run next.
    ///
    /// # Errors
    ///
    /// Only fatal conditions: a closed channel, a hardware fault or a belief
    /// that lost validity.
    pub async fn run(
        self,
        belief: &mut GaussianBelief,
        ctx: &mut CycleContext,
        collaborators: &mut Collaborators,
        config: &ControllerConfig,
    ) -> Result<StateId, LocError> {
        match self {
            StateId::PredictPriorBelief => predict::run(belief, ctx, config),
            StateId::ComputeNextPose => Ok(compute_pose::run(belief, ctx, config)),
            StateId::MoveToRendezvousPose => {
                move_to::run(belief, ctx, collaborators.actuator.as_mut(), config).await
            }
            StateId::SendRendezvousBelief => {
                send::run(belief, ctx, collaborators.channel.as_mut(), config).await
            }
            StateId::ListenForMeasurement => {
                listen::run(ctx, collaborators.channel.as_mut(), config).await
            }
            StateId::AcknowledgeMeasurement => {
                Ok(acknowledge::run(ctx, collaborators.channel.as_mut(), config).await)
            }
            StateId::UpdateBelief => Ok(update::run(belief, ctx, config)),
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
