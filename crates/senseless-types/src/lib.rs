//! `senseless-types` – shared vocabulary of the rendezvous localization stack.
//!
//! Every other crate in the workspace speaks in these types: the pose and
//! displacement value types, the rendezvous identity, the messages exchanged
//! with the sensing partner, the bus [`Event`] envelope and the workspace-wide
//! [`LocError`].

use std::f64::consts::{PI, TAU};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Wrap an angle to the half-open interval `(-π, π]`.
pub fn wrap_angle(angle_rad: f64) -> f64 {
    let wrapped = (angle_rad + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose / Displacement
// ────────────────────────────────────────────────────────────────────────────

/// A planar robot pose in the world frame.
///
/// Immutable once constructed: every operation returns a new value.  The
/// heading is always wrapped to `(-π, π]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// X position (metres).
    pub x: f64,
    /// Y position (metres).
    pub y: f64,
    /// Heading, counter-clockwise from +X (radians).
    pub heading_rad: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading_rad: f64) -> Self {
        Self {
            x,
            y,
            heading_rad: wrap_angle(heading_rad),
        }
    }

    /// Euclidean distance between the two positions (heading ignored).
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// The world-frame displacement that carries `self` onto `target`.
    pub fn displacement_to(&self, target: &Pose) -> Displacement {
        Displacement {
            dx: target.x - self.x,
            dy: target.y - self.y,
            dheading_rad: wrap_angle(target.heading_rad - self.heading_rad),
        }
    }

    /// Apply a world-frame displacement.
    pub fn offset(&self, d: &Displacement) -> Pose {
        Pose::new(self.x + d.dx, self.y + d.dy, self.heading_rad + d.dheading_rad)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading_rad.is_finite()
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3} rad)", self.x, self.y, self.heading_rad)
    }
}

/// A world-frame motion increment, as executed by the drive base.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Displacement {
    pub dx: f64,
    pub dy: f64,
    pub dheading_rad: f64,
}

impl Displacement {
    /// Translational length of the displacement (metres).
    pub fn linear_norm(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    /// Absolute rotation of the displacement (radians).
    pub fn angular_norm(&self) -> f64 {
        self.dheading_rad.abs()
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.dheading_rad.is_finite()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rendezvous identity and messages
// ────────────────────────────────────────────────────────────────────────────

/// Identifier of one rendezvous attempt.  Issued by the senseless robot's
/// controller, strictly increasing across cycles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct RendezvousId(pub u64);

impl RendezvousId {
    pub fn next(self) -> Self {
        RendezvousId(self.0 + 1)
    }
}

impl fmt::Display for RendezvousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rdv-{}", self.0)
    }
}

/// What the partner actually observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Observation {
    /// The partner's fix of the senseless robot's pose in the world frame.
    Absolute { pose: Pose },
    /// Range and bearing to the senseless robot, measured from the partner's
    /// own pose.  `bearing_rad` is relative to the partner's heading.
    RangeBearing {
        partner_pose: Pose,
        range: f64,
        bearing_rad: f64,
    },
}

impl Observation {
    pub fn is_finite(&self) -> bool {
        match self {
            Observation::Absolute { pose } => pose.is_finite(),
            Observation::RangeBearing {
                partner_pose,
                range,
                bearing_rad,
            } => partner_pose.is_finite() && range.is_finite() && bearing_rad.is_finite(),
        }
    }
}

/// A measurement produced by the sensing partner for one rendezvous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// The rendezvous this measurement answers.
    pub rendezvous_id: RendezvousId,
    /// The senseless robot that was observed.
    pub robot_id: String,
    /// The partner that took the measurement.
    pub partner_id: String,
    /// When the observation was taken (partner clock).
    pub taken_at: DateTime<Utc>,
    pub observation: Observation,
}

/// Minimal payload the senseless robot pushes to its partner so the partner
/// can find it and knows which rendezvous to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendezvousBelief {
    pub rendezvous_id: RendezvousId,
    pub robot_id: String,
    /// Current pose estimate (belief mean).
    pub estimate: Pose,
    /// Row-major 3×3 covariance over (x, y, heading).
    pub covariance: [[f64; 3]; 3],
    /// Where the robot committed to be for this rendezvous.
    pub target: Pose,
    pub sent_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the rendezvous bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "senseless-middleware::bus_channel"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a freshly stamped envelope.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that travel between the senseless robot and its partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Senseless robot → partner: "meet me here, this is what I believe".
    RendezvousRequest(RendezvousBelief),
    /// Partner → senseless robot.
    Measurement(Measurement),
    /// Senseless robot → partner: measurement received, stop retrying.
    Acknowledgement {
        rendezvous_id: RendezvousId,
        robot_id: String,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Fatal failures of the localization stack.
///
/// Recoverable conditions (missed rendezvous, stalled motion, failed send)
/// are modelled as outcome enums by the collaborator traits and never
/// surface as a `LocError`.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid belief: {0}")]
    InvalidBelief(String),

    #[error("Rendezvous channel closed: {0}")]
    ChannelClosed(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Serialization Error: {0}")]
    Serialization(String),
}
