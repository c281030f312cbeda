//! Drift detection for long-running agent loops.
//!
//! Drift is judged from three counters against hard limits: cycles since the
//! last checkpoint, error rate over a rolling window, and escalations. A
//! limit is breached only when the observed value is strictly greater.
//!
//! Evaluation is a pure function of a [`DriftMetrics`] snapshot; the caller
//! owns the counters (see [`OutcomeWindow`] for the rolling error window).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::DriftConfig;

/// Default size of the rolling outcome window
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Operational counters for one agent at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftMetrics {
    pub cycles_since_checkpoint: u64,
    /// Operations in the rolling window
    pub window_attempts: u64,
    /// Failed operations in the rolling window
    pub window_errors: u64,
    pub escalation_count: u32,
}

impl DriftMetrics {
    /// Failure fraction of the window; 0.0 for an empty window.
    pub fn error_rate(&self) -> f64 {
        if self.window_attempts == 0 {
            return 0.0;
        }
        self.window_errors.min(self.window_attempts) as f64 / self.window_attempts as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftThresholds {
    pub max_cycles: u64,
    pub max_error_rate: f64,
    pub max_escalations: u32,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self::from(&DriftConfig::default())
    }
}

impl From<&DriftConfig> for DriftThresholds {
    fn from(config: &DriftConfig) -> Self {
        Self {
            max_cycles: config.max_cycles,
            max_error_rate: config.max_error_rate,
            max_escalations: config.max_escalations,
        }
    }
}

/// One limit that was exceeded
#[derive(Debug, Clone, PartialEq)]
pub enum DriftBreach {
    Cycles { observed: u64, limit: u64 },
    ErrorRate { observed: f64, limit: f64 },
    Escalations { observed: u32, limit: u32 },
}

impl std::fmt::Display for DriftBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftBreach::Cycles { observed, limit } => {
                write!(f, "cycles {observed} > {limit}")
            }
            DriftBreach::ErrorRate { observed, limit } => {
                write!(f, "error rate {:.1}% > {:.1}%", observed * 100.0, limit * 100.0)
            }
            DriftBreach::Escalations { observed, limit } => {
                write!(f, "escalations {observed} > {limit}")
            }
        }
    }
}

/// Result of evaluating a metrics snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftReport {
    pub breaches: Vec<DriftBreach>,
}

impl DriftReport {
    pub fn is_drifting(&self) -> bool {
        !self.breaches.is_empty()
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.breaches.is_empty() {
            return write!(f, "healthy");
        }
        let parts: Vec<String> = self.breaches.iter().map(|b| b.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriftDetector {
    thresholds: DriftThresholds,
}

impl DriftDetector {
    pub fn new(thresholds: DriftThresholds) -> Self {
        Self { thresholds }
    }

    pub fn from_config(config: &DriftConfig) -> Self {
        Self::new(DriftThresholds::from(config))
    }

    pub fn thresholds(&self) -> &DriftThresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, metrics: &DriftMetrics) -> DriftReport {
        let t = &self.thresholds;
        let mut breaches = Vec::new();

        if metrics.cycles_since_checkpoint > t.max_cycles {
            breaches.push(DriftBreach::Cycles {
                observed: metrics.cycles_since_checkpoint,
                limit: t.max_cycles,
            });
        }

        let rate = metrics.error_rate();
        if rate > t.max_error_rate {
            breaches.push(DriftBreach::ErrorRate {
                observed: rate,
                limit: t.max_error_rate,
            });
        }

        if metrics.escalation_count > t.max_escalations {
            breaches.push(DriftBreach::Escalations {
                observed: metrics.escalation_count,
                limit: t.max_escalations,
            });
        }

        DriftReport { breaches }
    }
}

/// Bounded window of recent operation outcomes (true = failure)
#[derive(Debug, Clone)]
pub struct OutcomeWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
}

impl Default for OutcomeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl OutcomeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, failed: bool) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(failed);
    }

    pub fn record_success(&mut self) {
        self.push(false);
    }

    pub fn record_failure(&mut self) {
        self.push(true);
    }

    pub fn attempts(&self) -> u64 {
        self.outcomes.len() as u64
    }

    pub fn errors(&self) -> u64 {
        self.outcomes.iter().filter(|f| **f).count() as u64
    }

    pub fn clear(&mut self) {
        self.outcomes.clear();
    }

    /// Build a metrics snapshot from this window plus the caller's counters.
    pub fn metrics(&self, cycles_since_checkpoint: u64, escalation_count: u32) -> DriftMetrics {
        DriftMetrics {
            cycles_since_checkpoint,
            window_attempts: self.attempts(),
            window_errors: self.errors(),
            escalation_count,
        }
    }
}
