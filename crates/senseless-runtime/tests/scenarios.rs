//! Controller scenarios driven by scripted collaborators.

use std::collections::VecDeque;
use std::f64::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use senseless_hal::{MotionActuator, MoveOutcome, SimDriveBase, SimDriveConfig};
use senseless_middleware::{ReceiveOutcome, RendezvousChannel, SendOutcome};
use senseless_perception::{BeliefPrior, ExpectedObservation};
use senseless_runtime::{
    CancelHandle, Controller, ControllerConfig, CycleOutcome, MeasurementRejection, StateId,
};
use senseless_types::{
    LocError, Measurement, Observation, Pose, RendezvousBelief, RendezvousId, wrap_angle,
};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted collaborators
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ActuatorLog {
    moves: Vec<Pose>,
    anchors: Vec<Pose>,
}

/// Plays back `script`, then arrives forever.  Arriving jumps the odometry
/// to the target; timing out leaves it where it was.
struct ScriptedActuator {
    script: VecDeque<Result<MoveOutcome, LocError>>,
    always: Option<MoveOutcome>,
    at: Pose,
    log: Arc<Mutex<ActuatorLog>>,
}

impl ScriptedActuator {
    fn arriving() -> (Self, Arc<Mutex<ActuatorLog>>) {
        Self::new(Vec::new(), None)
    }

    fn stalled() -> (Self, Arc<Mutex<ActuatorLog>>) {
        Self::new(Vec::new(), Some(MoveOutcome::TimedOut))
    }

    fn new(
        script: Vec<Result<MoveOutcome, LocError>>,
        always: Option<MoveOutcome>,
    ) -> (Self, Arc<Mutex<ActuatorLog>>) {
        let log = Arc::new(Mutex::new(ActuatorLog::default()));
        (
            Self {
                script: script.into(),
                always,
                at: Pose::default(),
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

#[async_trait]
impl MotionActuator for ScriptedActuator {
    fn id(&self) -> &str {
        "scripted_base"
    }

    fn relocalize(&mut self, believed: Pose) {
        self.at = believed;
        self.log.lock().unwrap().anchors.push(believed);
    }

    fn odometry(&self) -> Pose {
        self.at
    }

    async fn move_to(&mut self, target: Pose, _timeout: Duration) -> Result<MoveOutcome, LocError> {
        self.log.lock().unwrap().moves.push(target);
        let outcome = match self.script.pop_front() {
            Some(next) => next?,
            None => self.always.unwrap_or(MoveOutcome::Arrived),
        };
        if outcome == MoveOutcome::Arrived {
            self.at = target;
        }
        Ok(outcome)
    }
}

/// Requests cancellation from inside every move, then arrives.
struct CancellingActuator {
    handle: Arc<OnceLock<CancelHandle>>,
    at: Pose,
}

#[async_trait]
impl MotionActuator for CancellingActuator {
    fn id(&self) -> &str {
        "cancelling_base"
    }

    fn odometry(&self) -> Pose {
        self.at
    }

    async fn move_to(&mut self, target: Pose, _timeout: Duration) -> Result<MoveOutcome, LocError> {
        if let Some(handle) = self.handle.get() {
            handle.cancel();
        }
        self.at = target;
        Ok(MoveOutcome::Arrived)
    }
}

/// What the partner does for one rendezvous.
#[derive(Clone)]
enum Reply {
    Silent,
    Observe(Observation),
    /// Answers with the previous rendezvous id.
    Late(Observation),
}

#[derive(Default)]
struct ChannelLog {
    sent: Vec<RendezvousBelief>,
    acks: Vec<RendezvousId>,
}

struct ScriptedChannel {
    replies: VecDeque<Reply>,
    send_failures: u32,
    log: Arc<Mutex<ChannelLog>>,
}

impl ScriptedChannel {
    fn new(replies: Vec<Reply>) -> (Self, Arc<Mutex<ChannelLog>>) {
        let log = Arc::new(Mutex::new(ChannelLog::default()));
        (
            Self {
                replies: replies.into(),
                send_failures: 0,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    fn measurement(id: RendezvousId, observation: Observation) -> Measurement {
        Measurement {
            rendezvous_id: id,
            robot_id: "senseless-1".into(),
            partner_id: "scripted_partner".into(),
            taken_at: Utc::now(),
            observation,
        }
    }
}

#[async_trait]
impl RendezvousChannel for ScriptedChannel {
    async fn send(
        &mut self,
        request: &RendezvousBelief,
        _timeout: Duration,
    ) -> Result<SendOutcome, LocError> {
        self.log.lock().unwrap().sent.push(request.clone());
        if self.send_failures > 0 {
            self.send_failures -= 1;
            return Ok(SendOutcome::Failed);
        }
        Ok(SendOutcome::Ack)
    }

    async fn receive(
        &mut self,
        id: RendezvousId,
        _timeout: Duration,
    ) -> Result<ReceiveOutcome, LocError> {
        Ok(match self.replies.pop_front().unwrap_or(Reply::Silent) {
            Reply::Silent => ReceiveOutcome::TimedOut,
            Reply::Observe(obs) => ReceiveOutcome::Measurement(Self::measurement(id, obs)),
            Reply::Late(obs) => {
                ReceiveOutcome::Measurement(Self::measurement(RendezvousId(id.0 - 1), obs))
            }
        })
    }

    async fn acknowledge(&mut self, id: RendezvousId) -> bool {
        self.log.lock().unwrap().acks.push(id);
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn origin_prior() -> BeliefPrior {
    BeliefPrior {
        pose: Pose::new(0.0, 0.0, 0.0),
        std_xy: 1.0,
        std_heading: 0.5,
    }
}

fn fix_at(x: f64, y: f64) -> Observation {
    Observation::Absolute {
        pose: Pose::new(x, y, 0.0),
    }
}

fn controller(actuator: impl MotionActuator + 'static, channel: ScriptedChannel) -> Controller {
    let config = ControllerConfig {
        fixed_time_step: true,
        ..ControllerConfig::default()
    };
    Controller::new(config, &origin_prior(), Box::new(actuator), Box::new(channel)).unwrap()
}

/// Step until the controller is back in PredictPriorBelief, returning the
/// states it transitioned to.
async fn finish_cycle(c: &mut Controller) -> Vec<StateId> {
    let mut visited = Vec::new();
    loop {
        let next = c.step().await.unwrap();
        visited.push(next);
        if next == StateId::PredictPriorBelief {
            return visited;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_visits_every_state_and_narrows_belief() {
    let (actuator, moves) = ScriptedActuator::arriving();
    let (channel, log) = ScriptedChannel::new(vec![Reply::Observe(fix_at(1.0, 0.0))]);
    let mut c = controller(actuator, channel);
    let prior_uncertainty = c.belief().uncertainty();

    assert_eq!(c.current_state(), StateId::PredictPriorBelief);
    let visited = finish_cycle(&mut c).await;
    assert_eq!(
        visited,
        vec![
            StateId::ComputeNextPose,
            StateId::MoveToRendezvousPose,
            StateId::SendRendezvousBelief,
            StateId::ListenForMeasurement,
            StateId::AcknowledgeMeasurement,
            StateId::UpdateBelief,
            StateId::PredictPriorBelief,
        ]
    );

    assert_eq!(c.last_outcome(), Some(&CycleOutcome::Updated));
    assert_eq!(c.cycles_completed(), 1);
    assert!(c.belief().mean().x > 0.5, "mean {}", c.belief().mean());
    assert!(c.belief().uncertainty() < prior_uncertainty);
    assert!(c.belief().is_valid());

    let log = log.lock().unwrap();
    assert_eq!(log.sent.len(), 1);
    assert_eq!(log.sent[0].rendezvous_id, RendezvousId(1));
    assert_eq!(log.acks, vec![RendezvousId(1)]);

    // With no partner hint the rendezvous pose is the predicted mean.
    let request = &log.sent[0];
    assert!(request.target.distance_to(&request.estimate) < 1e-12);
    assert!((request.target.heading_rad - request.estimate.heading_rad).abs() < 1e-12);
    let moves = moves.lock().unwrap();
    assert_eq!(moves.anchors.len(), 1);
    assert!(moves.moves[0].distance_to(&origin_prior().pose) < 1e-12);
}

#[tokio::test]
async fn missed_rendezvous_keeps_the_predicted_belief() {
    let (actuator, _) = ScriptedActuator::arriving();
    let (channel, log) = ScriptedChannel::new(vec![Reply::Silent]);
    let mut c = controller(actuator, channel);

    assert_eq!(c.step().await.unwrap(), StateId::ComputeNextPose);
    let predicted = c.belief().clone();

    let visited = finish_cycle(&mut c).await;
    assert_eq!(visited.last(), Some(&StateId::PredictPriorBelief));
    assert!(!visited.contains(&StateId::AcknowledgeMeasurement));
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::MissedRendezvous));
    assert_eq!(c.belief(), &predicted);
    assert!(log.lock().unwrap().acks.is_empty());
}

#[tokio::test]
async fn stalled_motion_never_reaches_the_channel() {
    let (actuator, moves) = ScriptedActuator::stalled();
    let (channel, log) = ScriptedChannel::new(vec![Reply::Observe(fix_at(1.0, 0.0))]);
    let mut c = controller(actuator, channel);

    c.step().await.unwrap();
    let predicted = c.belief().clone();
    let visited = finish_cycle(&mut c).await;

    assert_eq!(
        visited,
        vec![
            StateId::ComputeNextPose,
            StateId::MoveToRendezvousPose,
            StateId::PredictPriorBelief,
        ]
    );
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::MotionFailed));
    assert_eq!(c.belief(), &predicted);

    let retries = ControllerConfig::default().retries.move_retries as usize;
    assert_eq!(moves.lock().unwrap().moves.len(), retries + 1);
    assert!(log.lock().unwrap().sent.is_empty());
}

#[tokio::test]
async fn recovered_motion_proceeds_normally() {
    let (actuator, moves) = ScriptedActuator::new(vec![Ok(MoveOutcome::TimedOut)], None);
    let (channel, _) = ScriptedChannel::new(vec![Reply::Observe(fix_at(0.2, 0.0))]);
    let mut c = controller(actuator, channel);

    c.run_cycles(1).await.unwrap();
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::Updated));
    assert_eq!(moves.lock().unwrap().moves.len(), 2);
}

#[tokio::test]
async fn late_measurement_is_acknowledged_but_rejected() {
    let (actuator, _) = ScriptedActuator::arriving();
    let (channel, log) = ScriptedChannel::new(vec![Reply::Silent, Reply::Late(fix_at(3.0, 3.0))]);
    let mut c = controller(actuator, channel);

    c.run_cycles(1).await.unwrap();
    let before = c.belief().clone();

    // Cycle 2 receives the answer to rendezvous 1.
    c.step().await.unwrap();
    let predicted = c.belief().clone();
    assert!(predicted.uncertainty() >= before.uncertainty());
    finish_cycle(&mut c).await;

    assert_eq!(
        c.last_outcome(),
        Some(&CycleOutcome::Rejected(MeasurementRejection::WrongRendezvous {
            expected: RendezvousId(2),
            got: RendezvousId(1),
        }))
    );
    assert_eq!(c.belief(), &predicted);
    assert_eq!(log.lock().unwrap().acks, vec![RendezvousId(1)]);
}

#[tokio::test]
async fn send_retries_then_listens_anyway() {
    let (actuator, _) = ScriptedActuator::arriving();
    let (mut channel, log) = ScriptedChannel::new(vec![Reply::Observe(fix_at(0.0, 0.0))]);
    channel.send_failures = u32::MAX;
    let mut c = controller(actuator, channel);

    let visited = finish_cycle(&mut c).await;
    assert!(visited.contains(&StateId::ListenForMeasurement));
    let attempts = ControllerConfig::default().retries.send_retries as usize + 1;
    assert_eq!(log.lock().unwrap().sent.len(), attempts);
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::Updated));
}

#[tokio::test]
async fn repeated_misses_only_grow_uncertainty() {
    let (actuator, _) = ScriptedActuator::arriving();
    let (channel, _) = ScriptedChannel::new(Vec::new());
    let mut c = controller(actuator, channel);

    let mut last = c.belief().uncertainty();
    for _ in 0..5 {
        c.run_cycles(1).await.unwrap();
        let now = c.belief().uncertainty();
        assert!(now >= last);
        last = now;
    }
    let summary = c.summary();
    assert_eq!(summary.cycles, 5);
    assert_eq!(summary.missed, 5);
    assert_eq!(summary.updated, 0);
}

#[tokio::test]
async fn rendezvous_ids_increase_every_cycle() {
    let (actuator, _) = ScriptedActuator::arriving();
    let replies = (0..4).map(|i| Reply::Observe(fix_at(0.1 * i as f64, 0.0))).collect();
    let (channel, log) = ScriptedChannel::new(replies);
    let mut c = controller(actuator, channel);

    c.run_cycles(4).await.unwrap();
    let ids: Vec<u64> = log.lock().unwrap().sent.iter().map(|r| r.rendezvous_id.0).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn executed_displacement_feeds_next_prediction() {
    let partner = Pose::new(5.0, 0.0, 0.0);
    let (actuator, _) = ScriptedActuator::arriving();
    let (channel, _) = ScriptedChannel::new(vec![Reply::Observe(Observation::RangeBearing {
        partner_pose: partner,
        range: 5.0,
        bearing_rad: std::f64::consts::PI,
    })]);
    let mut config = ControllerConfig {
        fixed_time_step: true,
        ..ControllerConfig::default()
    };
    config.planner.expected_observation = ExpectedObservation::RangeBearing;
    let mut c = Controller::new(config, &origin_prior(), Box::new(actuator), Box::new(channel)).unwrap();

    c.run_cycles(1).await.unwrap();
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::Updated));

    // Cycle 2 plans with the partner's pose known.
    for _ in 0..3 {
        c.step().await.unwrap();
    }
    assert_eq!(c.current_state(), StateId::SendRendezvousBelief);
    assert!(c.context().partner_hint.is_some());
    let executed = c.context().executed.expect("arrived");
    let expected = c.belief().mean().offset(&executed);

    finish_cycle(&mut c).await;
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::MissedRendezvous));
    let projected = c.projected_mean();
    assert!((projected.x - expected.x).abs() < 1e-9);

    // Cycle 3 prediction applies the displacement executed in cycle 2.
    c.step().await.unwrap();
    let mean = c.belief().mean();
    assert!((mean.x - expected.x).abs() < 1e-9);
    assert!((mean.y - expected.y).abs() < 1e-9);
}

#[tokio::test]
async fn cancellation_stops_between_states() {
    let (actuator, _) = ScriptedActuator::arriving();
    let (channel, _) = ScriptedChannel::new(Vec::new());
    let mut c = controller(actuator, channel);

    let handle = c.cancel_handle();
    handle.cancel();
    let summary = c.run().await.unwrap();
    assert_eq!(summary.cycles, 0);
    assert_eq!(c.current_state(), StateId::PredictPriorBelief);
}

#[tokio::test]
async fn cancellation_during_motion_finishes_that_state_only() {
    let slot = Arc::new(OnceLock::new());
    let actuator = CancellingActuator {
        handle: Arc::clone(&slot),
        at: Pose::default(),
    };
    let (channel, log) = ScriptedChannel::new(vec![Reply::Observe(fix_at(0.0, 0.0))]);
    let mut c = controller(actuator, channel);
    assert!(slot.set(c.cancel_handle()).is_ok());

    let summary = c.run().await.unwrap();
    assert_eq!(summary.cycles, 0);
    assert_eq!(c.current_state(), StateId::SendRendezvousBelief);
    assert!(c.context().executed.is_some());
    assert!(log.lock().unwrap().sent.is_empty());

    // Nothing was lost: stepping by hand resumes at the state that was next.
    assert_eq!(c.step().await.unwrap(), StateId::ListenForMeasurement);
    assert_eq!(log.lock().unwrap().sent.len(), 1);
}

#[tokio::test]
async fn partial_motion_before_a_timeout_reaches_the_next_prediction() {
    let base = SimDriveBase::new("sim_drive_base", Pose::default(), SimDriveConfig::default(), 11).unwrap();
    let truth = base.truth_handle();
    let (channel, _) = ScriptedChannel::new(vec![Reply::Observe(Observation::RangeBearing {
        partner_pose: Pose::new(0.0, 30.0, 0.0),
        range: 30.0,
        bearing_rad: -FRAC_PI_2,
    })]);
    let mut config = ControllerConfig {
        fixed_time_step: true,
        ..ControllerConfig::default()
    };
    config.timeouts.move_timeout_ms = 300;
    config.planner.expected_observation = ExpectedObservation::RangeBearing;
    let mut c = Controller::new(config, &origin_prior(), Box::new(base), Box::new(channel)).unwrap();

    c.run_cycles(1).await.unwrap();
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::Updated));

    // Facing the partner needs a quarter turn; 300 ms per attempt is too short.
    c.run_cycles(1).await.unwrap();
    assert_eq!(c.last_outcome(), Some(&CycleOutcome::MotionFailed));
    let turned = truth.pose().heading_rad;
    assert!(turned > 0.5, "base barely turned: {turned}");

    c.step().await.unwrap();
    let mean = c.belief().mean();
    let cov = c.belief().covariance();
    let real = truth.pose();
    let heading_sigma = cov[(2, 2)].sqrt();
    let heading_err = wrap_angle(real.heading_rad - mean.heading_rad).abs();
    assert!(
        heading_err < 3.0 * heading_sigma,
        "heading {mean} vs truth {real}: error {heading_err:.3} sigma {heading_sigma:.3}"
    );
    assert!((real.x - mean.x).abs() < 3.0 * cov[(0, 0)].sqrt());
    assert!((real.y - mean.y).abs() < 3.0 * cov[(1, 1)].sqrt());
}

#[tokio::test]
async fn hardware_fault_is_fatal_and_keeps_state() {
    let fault = LocError::HardwareFault {
        component: "scripted_base".into(),
        details: "motor driver offline".into(),
    };
    let (actuator, _) = ScriptedActuator::new(vec![Err(fault.clone())], None);
    let (channel, _) = ScriptedChannel::new(Vec::new());
    let mut c = controller(actuator, channel);

    let err = c.run_cycles(3).await.unwrap_err();
    assert_eq!(err, fault);
    assert_eq!(c.current_state(), StateId::MoveToRendezvousPose);
    assert!(c.belief().is_valid());
}

#[tokio::test]
async fn invalid_configuration_is_rejected_up_front() {
    let (actuator, _) = ScriptedActuator::arriving();
    let (channel, _) = ScriptedChannel::new(Vec::new());
    let mut config = ControllerConfig::default();
    config.timeouts.move_timeout_ms = 0;
    let err = Controller::new(config, &origin_prior(), Box::new(actuator), Box::new(channel))
        .err()
        .unwrap();
    assert!(matches!(err, LocError::Config(_)));
}

#[tokio::test]
async fn invalid_prior_is_rejected_up_front() {
    let (actuator, _) = ScriptedActuator::arriving();
    let (channel, _) = ScriptedChannel::new(Vec::new());
    let prior = BeliefPrior {
        std_xy: -1.0,
        ..origin_prior()
    };
    let err = Controller::new(ControllerConfig::default(), &prior, Box::new(actuator), Box::new(channel))
        .err()
        .unwrap();
    assert!(matches!(err, LocError::InvalidBelief(_)));
}
