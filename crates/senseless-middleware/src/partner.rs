//! Simulated sensing partner.
//!
//! The partner is the robot that *can* see.  It listens for rendezvous
//! requests on the bus, observes the senseless robot's true pose through a
//! caller-supplied closure, corrupts the observation with Gaussian noise and
//! publishes the resulting [`Measurement`].  Until it sees an
//! acknowledgement it re-publishes the measurement a bounded number of
//! times.
//!
//! Randomness (noise and deliberate drops) comes from a seeded RNG so whole
//! simulation runs are reproducible.

use std::f64::consts::TAU;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use senseless_types::{
    Event, EventPayload, LocError, Measurement, Observation, Pose, RendezvousBelief, RendezvousId,
    wrap_angle,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic, TopicReceiver};

const SOURCE: &str = "senseless-middleware::partner";

/// Smallest range the partner ever reports (m).
const MIN_REPORTED_RANGE: f64 = 1e-3;

/// Which kind of observation the partner produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    #[default]
    Absolute,
    RangeBearing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerConfig {
    pub partner_id: String,
    /// The partner's own (perfectly known) pose.
    pub pose: Pose,
    pub mode: ObservationMode,
    pub absolute_std_xy: f64,
    pub absolute_std_heading: f64,
    pub range_std: f64,
    pub bearing_std: f64,
    /// Probability of silently ignoring a request.
    pub drop_probability: f64,
    /// Delay between receiving a request and publishing the answer (ms).
    pub reply_delay_ms: u64,
    /// How long to wait for an acknowledgement before re-publishing (ms).
    pub ack_timeout_ms: u64,
    pub max_resends: u32,
}

impl Default for PartnerConfig {
    fn default() -> Self {
        Self {
            partner_id: "scout".to_string(),
            pose: Pose::new(2.0, -2.0, 0.0),
            mode: ObservationMode::Absolute,
            absolute_std_xy: 0.1,
            absolute_std_heading: 0.05,
            range_std: 0.05,
            bearing_std: 0.02,
            drop_probability: 0.0,
            reply_delay_ms: 5,
            ack_timeout_ms: 50,
            max_resends: 2,
        }
    }
}

impl PartnerConfig {
    fn validate(&self) -> Result<(), LocError> {
        for (name, v) in [
            ("absolute_std_xy", self.absolute_std_xy),
            ("absolute_std_heading", self.absolute_std_heading),
            ("range_std", self.range_std),
            ("bearing_std", self.bearing_std),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(LocError::Config(format!("partner.{name} must be >= 0, got {v}")));
            }
        }
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(LocError::Config(format!(
                "partner.drop_probability must be in [0, 1], got {}",
                self.drop_probability
            )));
        }
        if !self.pose.is_finite() {
            return Err(LocError::Config("partner.pose must be finite".into()));
        }
        Ok(())
    }
}

type TruthFn = Box<dyn Fn() -> Pose + Send + Sync>;

pub struct SensingPartner {
    config: PartnerConfig,
    truth: TruthFn,
    rng: StdRng,
}

impl SensingPartner {
    /// `truth` returns the senseless robot's real pose at the moment of
    /// observation.
    ///
    /// # Errors
    ///
    /// [`LocError::Config`] for negative noise or an out-of-range drop
    /// probability.
    pub fn new(
        config: PartnerConfig,
        truth: impl Fn() -> Pose + Send + Sync + 'static,
        seed: u64,
    ) -> Result<Self, LocError> {
        config.validate()?;
        Ok(Self {
            config,
            truth: Box::new(truth),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Answer one request, or `None` if this request is dropped.
    pub fn observe(&mut self, request: &RendezvousBelief) -> Option<Measurement> {
        if self.config.drop_probability > 0.0 && self.rng.gen_bool(self.config.drop_probability) {
            debug!(rendezvous_id = %request.rendezvous_id, "partner dropping request");
            return None;
        }

        let truth = (self.truth)();
        let observation = match self.config.mode {
            ObservationMode::Absolute => Observation::Absolute {
                pose: Pose::new(
                    truth.x + self.gaussian(self.config.absolute_std_xy),
                    truth.y + self.gaussian(self.config.absolute_std_xy),
                    truth.heading_rad + self.gaussian(self.config.absolute_std_heading),
                ),
            },
            ObservationMode::RangeBearing => {
                let me = self.config.pose;
                let dx = truth.x - me.x;
                let dy = truth.y - me.y;
                let range = dx.hypot(dy) + self.gaussian(self.config.range_std);
                let bearing = dy.atan2(dx) - me.heading_rad + self.gaussian(self.config.bearing_std);
                Observation::RangeBearing {
                    partner_pose: me,
                    range: range.max(MIN_REPORTED_RANGE),
                    bearing_rad: wrap_angle(bearing),
                }
            }
        };

        Some(Measurement {
            rendezvous_id: request.rendezvous_id,
            robot_id: request.robot_id.clone(),
            partner_id: self.config.partner_id.clone(),
            taken_at: Utc::now(),
            observation,
        })
    }

    /// Zero-mean Gaussian sample (Box–Muller).
    fn gaussian(&mut self, std: f64) -> f64 {
        if std == 0.0 {
            return 0.0;
        }
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.r#gen();
        std * (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }

    /// Run the partner as a background task until the bus closes.
    ///
    /// Subscriptions are opened before this returns, so requests published
    /// right after the call are not missed.  Abort the returned handle to
    /// stop the partner.
    pub fn spawn(mut self, bus: EventBus) -> JoinHandle<()> {
        let mut requests = bus.subscribe_to(Topic::RendezvousRequests);
        let mut acks = bus.subscribe_to(Topic::Acknowledgements);
        tokio::spawn(async move {
            info!(partner = %self.config.partner_id, mode = ?self.config.mode, "sensing partner online");
            loop {
                let request = match requests.recv().await {
                    Ok(Event {
                        payload: EventPayload::RendezvousRequest(r),
                        ..
                    }) => r,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "partner request subscriber lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                tokio::time::sleep(Duration::from_millis(self.config.reply_delay_ms)).await;
                let Some(measurement) = self.observe(&request) else {
                    continue;
                };
                self.deliver(&bus, &mut acks, measurement).await;
            }
            info!(partner = %self.config.partner_id, "sensing partner offline");
        })
    }

    async fn deliver(&self, bus: &EventBus, acks: &mut TopicReceiver, measurement: Measurement) {
        let id = measurement.rendezvous_id;
        let robot = measurement.robot_id.clone();
        for attempt in 0..=self.config.max_resends {
            let event = Event::new(SOURCE, EventPayload::Measurement(measurement.clone()));
            if let Err(e) = bus.publish_to(Topic::Measurements, event) {
                debug!(rendezvous_id = %id, attempt, error = %e, "measurement not delivered");
            }
            if wait_for_ack(acks, id, &robot, Duration::from_millis(self.config.ack_timeout_ms)).await {
                debug!(rendezvous_id = %id, attempt, "measurement acknowledged");
                return;
            }
        }
        debug!(rendezvous_id = %id, "giving up on acknowledgement");
    }
}

async fn wait_for_ack(
    acks: &mut TopicReceiver,
    id: RendezvousId,
    robot: &str,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, acks.recv()).await {
            Err(_) => return false,
            Ok(Ok(Event {
                payload:
                    EventPayload::Acknowledgement {
                        rendezvous_id,
                        robot_id,
                    },
                ..
            })) if rendezvous_id == id && robot_id == robot => return true,
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) => return false,
        }
    }
}
