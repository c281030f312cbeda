//! Tracing subscriber setup for the CLI
//!
//! Filter directives come from `WAYPOINT_LOG`, then `RUST_LOG`, then the
//! `-v` count. Output goes to stderr so command output on stdout stays
//! machine readable.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives
pub const LOG_ENV: &str = "WAYPOINT_LOG";

/// Level for this crate at a given `-v` count
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Resolve the filter directives, looking variables up through `lookup`.
pub fn directives<F>(verbosity: u8, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_ENV)
        .or_else(|| lookup("RUST_LOG"))
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("warn,waypoint={}", level_for(verbosity)))
}

pub fn build_filter<F>(verbosity: u8, lookup: F) -> Result<EnvFilter>
where
    F: Fn(&str) -> Option<String>,
{
    let directives = directives(verbosity, lookup);
    EnvFilter::try_new(&directives).with_context(|| format!("Invalid log filter '{directives}'"))
}

/// Install the global subscriber. Call once, from `main`.
pub fn init(verbosity: u8) -> Result<()> {
    let filter = build_filter(verbosity, |key| std::env::var(key).ok())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_verbosity_default() {
        let vars = env(&[]);
        assert_eq!(directives(0, |k| vars.get(k).cloned()), "warn,waypoint=warn");
        assert_eq!(directives(2, |k| vars.get(k).cloned()), "warn,waypoint=debug");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn test_env_precedence() {
        let vars = env(&[("RUST_LOG", "info"), (LOG_ENV, "waypoint=trace")]);
        assert_eq!(directives(0, |k| vars.get(k).cloned()), "waypoint=trace");

        let vars = env(&[("RUST_LOG", "info")]);
        assert_eq!(directives(3, |k| vars.get(k).cloned()), "info");
    }

    #[test]
    fn test_invalid_filter_is_error() {
        let vars = env(&[(LOG_ENV, "waypoint=loud")]);
        assert!(build_filter(0, |k| vars.get(k).cloned()).is_err());
    }
}
