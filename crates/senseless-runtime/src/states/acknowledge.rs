//! AcknowledgeMeasurement: confirm receipt, then decide whether the
//! measurement may touch the belief.

use chrono::{DateTime, Utc};
use senseless_middleware::RendezvousChannel;
use senseless_types::{Measurement, Observation, RendezvousId};
use tracing::{debug, warn};

use super::StateId;
use crate::config::{ControllerConfig, Freshness};
use crate::context::{CycleContext, CycleOutcome, MeasurementRejection};

pub(super) async fn run(
    ctx: &mut CycleContext,
    channel: &mut dyn RendezvousChannel,
    config: &ControllerConfig,
) -> StateId {
    let Some(measurement) = ctx.measurement.as_ref() else {
        warn!("nothing to acknowledge");
        ctx.outcome = Some(CycleOutcome::MissedRendezvous);
        return StateId::PredictPriorBelief;
    };

    let delivered = channel.acknowledge(measurement.rendezvous_id).await;
    debug!(delivered, "acknowledgement sent");

    match validate_measurement(
        measurement,
        ctx.rendezvous_id,
        &config.robot_id,
        &config.freshness,
        Utc::now(),
    ) {
        Ok(()) => StateId::UpdateBelief,
        Err(reason) => {
            warn!(%reason, partner = %measurement.partner_id, "measurement rejected");
            ctx.measurement = None;
            ctx.outcome = Some(CycleOutcome::Rejected(reason));
            StateId::PredictPriorBelief
        }
    }
}

/// Check a measurement against the pending rendezvous.
///
/// # Errors
///
/// The first failed check, in this order: rendezvous id, robot id, finite
/// values, positive range, age, clock skew.
pub fn validate_measurement(
    measurement: &Measurement,
    expected: RendezvousId,
    robot_id: &str,
    freshness: &Freshness,
    now: DateTime<Utc>,
) -> Result<(), MeasurementRejection> {
    if measurement.rendezvous_id != expected {
        return Err(MeasurementRejection::WrongRendezvous {
            expected,
            got: measurement.rendezvous_id,
        });
    }
    if measurement.robot_id != robot_id {
        return Err(MeasurementRejection::WrongRobot(measurement.robot_id.clone()));
    }
    if !measurement.observation.is_finite() {
        return Err(MeasurementRejection::NonFinite);
    }
    if let Observation::RangeBearing { range, .. } = measurement.observation
        && range <= 0.0
    {
        return Err(MeasurementRejection::NonPositiveRange(range));
    }

    let limit = |ms: u64| i64::try_from(ms).unwrap_or(i64::MAX);
    let age_ms = (now - measurement.taken_at).num_milliseconds();
    if age_ms > limit(freshness.max_measurement_age_ms) {
        return Err(MeasurementRejection::Stale { age_ms });
    }
    if -age_ms > limit(freshness.clock_skew_tolerance_ms) {
        return Err(MeasurementRejection::FromFuture { ahead_ms: -age_ms });
    }
    Ok(())
}
