//! Per-cycle scratch space and the classification of a finished cycle.

use std::fmt;
use std::time::Duration;

use senseless_types::{Displacement, Measurement, Pose, RendezvousId};
use thiserror::Error;

/// Why AcknowledgeMeasurement refused a measurement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementRejection {
    #[error("answers {got} but {expected} is pending")]
    WrongRendezvous {
        expected: RendezvousId,
        got: RendezvousId,
    },
    #[error("addressed to robot {0}")]
    WrongRobot(String),
    #[error("too old ({age_ms} ms)")]
    Stale { age_ms: i64 },
    #[error("taken {ahead_ms} ms in the future")]
    FromFuture { ahead_ms: i64 },
    #[error("non-finite values")]
    NonFinite,
    #[error("non-positive range {0}")]
    NonPositiveRange(f64),
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A measurement was applied to the belief.
    Updated,
    /// No measurement arrived before the listen timeout.
    MissedRendezvous,
    /// A measurement arrived but failed validation.
    Rejected(MeasurementRejection),
    /// The robot never reached the rendezvous pose.
    MotionFailed,
    /// The measurement was valid but the filter could not use it.
    UpdateSkipped,
}

impl CycleOutcome {
    pub fn produced_update(&self) -> bool {
        matches!(self, CycleOutcome::Updated)
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Updated => f.write_str("updated"),
            CycleOutcome::MissedRendezvous => f.write_str("missed_rendezvous"),
            CycleOutcome::Rejected(reason) => write!(f, "rejected ({reason})"),
            CycleOutcome::MotionFailed => f.write_str("motion_failed"),
            CycleOutcome::UpdateSkipped => f.write_str("update_skipped"),
        }
    }
}

/// Scratch space of one cycle.  Created by the controller when a cycle
/// starts and dropped when the cycle ends.
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    pub rendezvous_id: RendezvousId,
    /// Time step for this cycle's prediction.
    pub dt: Duration,
    /// Displacement executed in the previous cycle, complete or partial.
    pub odometry: Option<Displacement>,
    /// Last known partner position.
    pub partner_hint: Option<Pose>,
    /// The rendezvous pose chosen for this cycle.
    pub target: Option<Pose>,
    /// Displacement executed toward `target`, even when the move gave up.
    pub executed: Option<Displacement>,
    pub move_attempts: u32,
    pub measurement: Option<Measurement>,
    pub outcome: Option<CycleOutcome>,
}

impl CycleContext {
    pub fn begin(
        rendezvous_id: RendezvousId,
        dt: Duration,
        odometry: Option<Displacement>,
        partner_hint: Option<Pose>,
    ) -> Self {
        Self {
            rendezvous_id,
            dt,
            odometry,
            partner_hint,
            ..Self::default()
        }
    }
}
