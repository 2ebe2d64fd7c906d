//! SendRendezvousBelief: tell the partner where we are going to be.

use std::time::Duration;

use chrono::Utc;
use senseless_middleware::{RendezvousChannel, SendOutcome};
use senseless_perception::GaussianBelief;
use senseless_types::{LocError, RendezvousBelief};
use tracing::{debug, info, warn};

use super::StateId;
use crate::config::ControllerConfig;
use crate::context::CycleContext;

/// Pause between failed attempts, multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

pub(super) async fn run(
    belief: &GaussianBelief,
    ctx: &CycleContext,
    channel: &mut dyn RendezvousChannel,
    config: &ControllerConfig,
) -> Result<StateId, LocError> {
    let request = RendezvousBelief {
        rendezvous_id: ctx.rendezvous_id,
        robot_id: config.robot_id.clone(),
        estimate: belief.mean(),
        covariance: belief.covariance_rows(),
        target: ctx.target.unwrap_or_else(|| belief.mean()),
        sent_at: Utc::now(),
    };

    let attempts = config.retries.send_retries + 1;
    for attempt in 1..=attempts {
        match channel.send(&request, config.send_timeout()).await? {
            SendOutcome::Ack => {
                info!(attempt, estimate = %request.estimate, "rendezvous request delivered");
                return Ok(StateId::ListenForMeasurement);
            }
            SendOutcome::Failed => {
                debug!(attempt, "rendezvous request not delivered");
                if attempt < attempts {
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
            }
        }
    }

    warn!(attempts, "request unconfirmed, listening anyway");
    Ok(StateId::ListenForMeasurement)
}
