//! `waypoint drift check` - evaluate a metrics snapshot against the
//! configured thresholds. Exits non-zero when drifting so scripts can branch
//! on it.

use anyhow::{bail, Result};
use colored::Colorize;

use crate::config::Config;
use crate::drift::{DriftDetector, DriftMetrics};

pub fn check(config: &Config, metrics: DriftMetrics) -> Result<()> {
    let detector = DriftDetector::from_config(&config.drift);
    let report = detector.evaluate(&metrics);
    let t = detector.thresholds();

    println!(
        "cycles {}/{}  error rate {:.1}%/{:.1}%  escalations {}/{}",
        metrics.cycles_since_checkpoint,
        t.max_cycles,
        metrics.error_rate() * 100.0,
        t.max_error_rate * 100.0,
        metrics.escalation_count,
        t.max_escalations
    );

    if !report.is_drifting() {
        println!("{} No drift", "✓".green());
        return Ok(());
    }
    for breach in &report.breaches {
        println!("  {} {}", "✗".red(), breach);
    }
    bail!("Drift detected: {report}")
}
