//! The `MotionActuator` contract.
//!
//! A driver moves the robot toward a target pose and reports whether it got
//! there in time.  Running out of time (a stall, an obstacle, slow motors) is
//! an ordinary [`MoveOutcome::TimedOut`]; only a hardware fault that makes
//! further motion impossible is an `Err`.  A base that gave up part-way has
//! still moved, so every driver also reports its own odometry.

use std::time::Duration;

use async_trait::async_trait;
use senseless_types::{LocError, Pose};

/// Result of one bounded motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The base reports it reached the target within tolerance.
    Arrived,
    /// The time bound elapsed first.  The command may be re-issued.
    TimedOut,
}

/// A drive base that can be sent to a pose.
#[async_trait]
pub trait MotionActuator: Send {
    /// Stable identifier, e.g. `"drive_base"`.
    fn id(&self) -> &str;

    /// Re-anchor the driver's odometry frame to the pose the robot currently
    /// believes it is at.
    ///
    /// Called once per cycle before the first [`move_to`][Self::move_to], so
    /// the driver steers relative to the latest belief rather than its own
    /// dead-reckoned drift.  Drivers with an external frame can ignore it.
    fn relocalize(&mut self, _believed: Pose) {}

    /// Where the driver's dead reckoning currently places the base, in the
    /// frame set by the last [`relocalize`][Self::relocalize].
    ///
    /// Read after a move that did not arrive to learn how far the base got.
    fn odometry(&self) -> Pose;

    /// Drive toward `target`, giving up after `timeout`.
    ///
    /// Calling again with the same target after [`MoveOutcome::TimedOut`]
    /// continues from wherever the base stopped.
    ///
    /// # Errors
    ///
    /// [`LocError::HardwareFault`] when the base cannot move at all.
    async fn move_to(&mut self, target: Pose, timeout: Duration) -> Result<MoveOutcome, LocError>;
}
