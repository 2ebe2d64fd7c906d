//! UpdateBelief: fold the accepted measurement into the belief.

use senseless_perception::GaussianBelief;
use senseless_types::Observation;
use tracing::{info, warn};

use super::StateId;
use crate::config::ControllerConfig;
use crate::context::{CycleContext, CycleOutcome};

pub(super) fn run(belief: &mut GaussianBelief, ctx: &mut CycleContext, config: &ControllerConfig) -> StateId {
    let Some(measurement) = ctx.measurement.take() else {
        warn!("no accepted measurement in context");
        ctx.outcome = Some(CycleOutcome::MissedRendezvous);
        return StateId::PredictPriorBelief;
    };

    if let Observation::RangeBearing { partner_pose, .. } = measurement.observation {
        ctx.partner_hint = Some(partner_pose);
    }

    let displacement = ctx.executed.unwrap_or_default();
    match belief.update(&measurement.observation, &displacement, &config.measurement_noise) {
        Ok(report) => {
            info!(
                before = report.uncertainty_before,
                after = report.uncertainty_after,
                innovation = report.innovation_norm,
                mean = %belief.mean(),
                "belief updated"
            );
            ctx.outcome = Some(CycleOutcome::Updated);
        }
        Err(e) => {
            warn!(error = %e, "update skipped, belief unchanged");
            ctx.outcome = Some(CycleOutcome::UpdateSkipped);
        }
    }
    StateId::PredictPriorBelief
}
