//! PID feedback loop used by the simulated drive base.
//!
//! The base runs two of these: one on the remaining distance (output: linear
//! velocity) and one on the heading error (output: turn rate).  Both are fed
//! the *error* directly, so the set-point is implicitly zero.
//!
//! # Example
//!
//! ```rust
//! use senseless_hal::pid::PidController;
//!
//! let mut steer = PidController::new(2.0, 0.0, 0.1).with_output_limit(1.5);
//! let turn_rate = steer.update(0.4, 0.05); // heading error 0.4 rad, dt 50 ms
//! assert!(turn_rate > 0.0 && turn_rate <= 1.5);
//! ```

/// Error-driven PID with a symmetric output clamp and anti-windup.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    integral: f64,
    last_error: Option<f64>,
    limit: f64,
}

impl PidController {
    /// Unclamped controller with the given gains.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            last_error: None,
            limit: f64::INFINITY,
        }
    }

    /// Clamp the output (and the integral contribution) to `[-limit, limit]`.
    pub fn with_output_limit(mut self, limit: f64) -> Self {
        self.limit = limit.abs();
        self
    }

    /// Next control output for `error` after `dt` seconds.
    ///
    /// Returns `0.0` and leaves the state untouched when `dt` is not positive.
    pub fn update(&mut self, error: f64, dt: f64) -> f64 {
        if dt <= 0.0 || !error.is_finite() {
            return 0.0;
        }

        let p = self.kp * error;

        self.integral += error * dt;
        let i = (self.ki * self.integral).clamp(-self.limit, self.limit);
        if self.ki.abs() > f64::EPSILON {
            self.integral = i / self.ki;
        }

        let d = self
            .last_error
            .map_or(0.0, |prev| self.kd * (error - prev) / dt);
        self.last_error = Some(error);

        (p + i + d).clamp(-self.limit, self.limit)
    }

    /// Forget the integral and derivative memory, e.g. on a new target.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}
