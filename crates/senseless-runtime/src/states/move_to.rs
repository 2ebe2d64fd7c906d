//! MoveToRendezvousPose: drive to the chosen pose, with bounded retries.
//!
//! When every attempt times out the cycle is abandoned, but whatever the base
//! covered on the way is still recorded as executed motion.  The next
//! prediction then moves the mean by that much and widens for the travel.

use std::time::Duration;

use senseless_hal::{MotionActuator, MoveOutcome};
use senseless_perception::GaussianBelief;
use senseless_types::LocError;
use tracing::{info, warn};

use super::StateId;
use crate::config::ControllerConfig;
use crate::context::{CycleContext, CycleOutcome};

/// Slack granted to a driver past its own timeout before the wait is cut.
const DRIVER_GRACE: Duration = Duration::from_millis(250);

pub(super) async fn run(
    belief: &GaussianBelief,
    ctx: &mut CycleContext,
    actuator: &mut dyn MotionActuator,
    config: &ControllerConfig,
) -> Result<StateId, LocError> {
    let Some(target) = ctx.target else {
        warn!("no rendezvous pose in context");
        ctx.outcome = Some(CycleOutcome::MotionFailed);
        return Ok(StateId::PredictPriorBelief);
    };

    let start = belief.mean();
    actuator.relocalize(start);
    let anchor = actuator.odometry();
    let timeout = config.move_timeout();

    for attempt in 1..=config.retries.move_retries + 1 {
        ctx.move_attempts = attempt;
        let outcome = tokio::time::timeout(timeout + DRIVER_GRACE, actuator.move_to(target, timeout))
            .await
            .unwrap_or(Ok(MoveOutcome::TimedOut))?;
        match outcome {
            MoveOutcome::Arrived => {
                let executed = start.displacement_to(&target);
                info!(
                    actuator = actuator.id(),
                    attempt,
                    %target,
                    travelled = executed.linear_norm(),
                    "arrived at rendezvous pose"
                );
                ctx.executed = Some(executed);
                return Ok(StateId::SendRendezvousBelief);
            }
            MoveOutcome::TimedOut => {
                warn!(actuator = actuator.id(), attempt, %target, "move timed out");
            }
        }
    }

    let partial = anchor.displacement_to(&actuator.odometry());
    warn!(
        attempts = ctx.move_attempts,
        travelled = partial.linear_norm(),
        turned = partial.angular_norm(),
        "giving up on this rendezvous"
    );
    ctx.executed = partial.is_finite().then_some(partial);
    ctx.outcome = Some(CycleOutcome::MotionFailed);
    Ok(StateId::PredictPriorBelief)
}
