//! Wires a [`Controller`] to a simulated base and a sensing partner.

use senseless_hal::{SimDriveBase, TruthHandle};
use senseless_middleware::{BusChannel, EventBus, SensingPartner};
use senseless_runtime::Controller;
use senseless_types::LocError;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;

/// A running simulation: the controller plus what it needs to stay alive.
pub struct Simulation {
    pub controller: Controller,
    pub truth: TruthHandle,
    partner: JoinHandle<()>,
}

impl Simulation {
    /// Must be called from inside a Tokio runtime; the partner is spawned
    /// immediately.
    pub fn build(cfg: &Config) -> Result<Self, LocError> {
        let base = SimDriveBase::new("sim_drive_base", cfg.true_start, cfg.sim, cfg.seed)?;
        let truth = base.truth_handle();

        let bus = EventBus::default();
        let channel = BusChannel::new(bus.clone(), cfg.controller.robot_id.clone());

        let partner_truth = truth.clone();
        let partner = SensingPartner::new(
            cfg.partner.clone(),
            move || partner_truth.pose(),
            cfg.seed.wrapping_add(1),
        )?
        .spawn(bus);

        let controller = Controller::new(cfg.controller.clone(), &cfg.prior, Box::new(base), Box::new(channel))?;
        info!(true_start = %cfg.true_start, seed = cfg.seed, "simulation ready");
        Ok(Self {
            controller,
            truth,
            partner,
        })
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.partner.abort();
    }
}
