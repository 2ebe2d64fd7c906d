//! ListenForMeasurement: bounded wait for the partner's answer.

use std::time::Duration;

use senseless_middleware::{ReceiveOutcome, RendezvousChannel};
use senseless_types::LocError;
use tracing::info;

use super::StateId;
use crate::config::ControllerConfig;
use crate::context::{CycleContext, CycleOutcome};

/// Slack granted to a transport past its own timeout before the wait is cut.
const TRANSPORT_GRACE: Duration = Duration::from_millis(100);

pub(super) async fn run(
    ctx: &mut CycleContext,
    channel: &mut dyn RendezvousChannel,
    config: &ControllerConfig,
) -> Result<StateId, LocError> {
    let timeout = config.listen_timeout();
    let received = tokio::time::timeout(timeout + TRANSPORT_GRACE, channel.receive(ctx.rendezvous_id, timeout))
        .await
        .unwrap_or(Ok(ReceiveOutcome::TimedOut))?;

    match received {
        ReceiveOutcome::Measurement(m) => {
            info!(partner = %m.partner_id, "measurement received");
            ctx.measurement = Some(m);
            Ok(StateId::AcknowledgeMeasurement)
        }
        ReceiveOutcome::TimedOut => {
            info!(timeout_ms = config.timeouts.listen_timeout_ms, "missed rendezvous");
            ctx.outcome = Some(CycleOutcome::MissedRendezvous);
            Ok(StateId::PredictPriorBelief)
        }
    }
}
