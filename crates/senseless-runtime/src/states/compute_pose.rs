//! ComputeNextPose: choose where to meet the partner.

use senseless_perception::{GaussianBelief, select_rendezvous_pose};
use tracing::info;

use super::StateId;
use crate::config::ControllerConfig;
use crate::context::CycleContext;

pub(super) fn run(belief: &GaussianBelief, ctx: &mut CycleContext, config: &ControllerConfig) -> StateId {
    let plan = select_rendezvous_pose(
        belief,
        ctx.partner_hint.as_ref(),
        &config.planner,
        &config.process_noise,
        &config.measurement_noise,
    );
    info!(
        target = %plan.target,
        expected_uncertainty = plan.expected_uncertainty,
        "rendezvous pose chosen"
    );
    ctx.target = Some(plan.target);
    StateId::MoveToRendezvousPose
}

#[cfg(test)]
mod tests {
    use super::*;
    use senseless_perception::BeliefPrior;
    use senseless_types::{Pose, RendezvousId};
    use std::time::Duration;

    #[test]
    fn same_belief_same_target() {
        let belief = GaussianBelief::from_prior(&BeliefPrior {
            pose: Pose::new(0.5, -0.5, 0.2),
            ..BeliefPrior::default()
        })
        .unwrap();
        let config = ControllerConfig::default();
        let hint = Some(Pose::new(4.0, 4.0, 0.0));

        let mut a = CycleContext::begin(RendezvousId(1), Duration::ZERO, None, hint);
        let mut b = CycleContext::begin(RendezvousId(9), Duration::ZERO, None, hint);
        assert_eq!(run(&belief, &mut a, &config), StateId::MoveToRendezvousPose);
        run(&belief, &mut b, &config);
        assert!(a.target.is_some());
        assert_eq!(a.target, b.target);
    }
}
