//! [`MissGuard`] – detects a run of cycles that never updated the belief.
//!
//! A senseless robot that keeps missing its partner only ever predicts, so
//! its uncertainty grows without bound.  The guard keeps a rolling window of
//! the last `threshold` cycles and fires once when all of them ended without
//! an update.  It re-arms as soon as an update succeeds.
//!
//! # Example
//!
//! ```rust
//! use senseless_runtime::miss_guard::MissGuard;
//!
//! let mut guard = MissGuard::new(3);
//!
//! assert!(!guard.record(false));
//! assert!(!guard.record(false));
//! assert!(guard.record(false)); // third miss in a row → alert
//! assert!(!guard.record(false)); // same streak, already alerted
//!
//! assert!(!guard.record(true)); // an update re-arms the guard
//! ```

use std::collections::VecDeque;

pub struct MissGuard {
    threshold: usize,
    /// `true` for cycles that produced an update.
    history: VecDeque<bool>,
    alerted: bool,
}

impl MissGuard {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            history: VecDeque::with_capacity(threshold),
            alerted: false,
        }
    }

    /// Record one finished cycle.  Returns `true` exactly once per streak,
    /// on the cycle that completes it.
    pub fn record(&mut self, updated: bool) -> bool {
        self.history.push_back(updated);
        while self.history.len() > self.threshold {
            self.history.pop_front();
        }
        if updated {
            self.alerted = false;
            return false;
        }
        if self.is_starving() && !self.alerted {
            self.alerted = true;
            return true;
        }
        false
    }

    /// `true` while the whole window consists of cycles without an update.
    pub fn is_starving(&self) -> bool {
        self.history.len() == self.threshold && self.history.iter().all(|updated| !updated)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
