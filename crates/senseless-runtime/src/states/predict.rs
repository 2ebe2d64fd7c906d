//! PredictPriorBelief: advance the belief one motion-model step.

use senseless_perception::GaussianBelief;
use senseless_types::LocError;
use tracing::debug;

use super::StateId;
use crate::config::ControllerConfig;
use crate::context::CycleContext;

pub(super) fn run(
    belief: &mut GaussianBelief,
    ctx: &CycleContext,
    config: &ControllerConfig,
) -> Result<StateId, LocError> {
    let before = belief.uncertainty();
    let mut predicted = belief.clone();
    predicted.predict(ctx.odometry.as_ref(), ctx.dt.as_secs_f64(), &config.process_noise);

    if !predicted.is_valid() {
        return Err(LocError::InvalidBelief(format!(
            "prediction produced an invalid covariance {:?}",
            predicted.covariance_rows()
        )));
    }
    *belief = predicted;

    debug!(
        dt_s = ctx.dt.as_secs_f64(),
        with_odometry = ctx.odometry.is_some(),
        before,
        after = belief.uncertainty(),
        mean = %belief.mean(),
        "prior predicted"
    );
    Ok(StateId::ComputeNextPose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use senseless_perception::BeliefPrior;
    use senseless_types::{Displacement, RendezvousId};
    use std::time::Duration;

    #[test]
    fn prediction_widens_and_moves_on() {
        let mut belief = GaussianBelief::from_prior(&BeliefPrior::default()).unwrap();
        let before = belief.uncertainty();
        let ctx = CycleContext::begin(
            RendezvousId(1),
            Duration::from_secs(1),
            Some(Displacement {
                dx: 1.0,
                dy: 0.0,
                dheading_rad: 0.0,
            }),
            None,
        );
        let next = run(&mut belief, &ctx, &ControllerConfig::default()).unwrap();
        assert_eq!(next, StateId::ComputeNextPose);
        assert!(belief.uncertainty() > before);
        assert!((belief.mean().x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_prediction_keeps_the_last_belief() {
        let mut belief = GaussianBelief::from_prior(&BeliefPrior::default()).unwrap();
        let kept = belief.clone();
        let mut config = ControllerConfig::default();
        config.process_noise.q_xy = f64::NAN;
        let ctx = CycleContext::begin(RendezvousId(1), Duration::from_secs(1), None, None);

        let err = run(&mut belief, &ctx, &config).unwrap_err();
        assert!(matches!(err, LocError::InvalidBelief(_)));
        assert_eq!(belief.mean(), kept.mean());
        assert_eq!(belief.covariance(), kept.covariance());
        assert!(belief.is_valid());
    }
}
