//! Event Replay
//!
//! Drives a monitor from JSON-lines commands, one decision written per
//! line. Lines that fail to parse produce an `{"error": ..}` line and
//! processing continues.
//!
//! ```text
//! {"op":"inspect","fields":{"user":"' OR 1=1 --"},"origin":"10.0.0.1","at":"2024-01-01T12:00:00Z"}
//! {"op":"rate","subject":"alice","resource":"/api"}
//! {"op":"login","subject":"alice","origin":"10.0.0.1","success":false}
//! {"op":"block","origin":"10.0.0.1","duration-secs":600}
//! {"op":"report"}
//! ```

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config;
use crate::detector::InputKind;
use crate::engine::SecurityMonitor;
use crate::scoring::utils;

/// One replayed command
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ReplayCommand {
    /// Inspect request fields; non-string values are ignored
    Inspect {
        fields: Map<String, Value>,
        #[serde(default)]
        subject: Option<String>,
        #[serde(default)]
        origin: Option<String>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// Rate-limit decision
    Rate {
        subject: String,
        resource: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// Login attempt. Without `success` only the lockout check runs.
    Login {
        subject: String,
        origin: String,
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// Administrative block
    #[serde(rename_all = "kebab-case")]
    Block {
        origin: String,
        #[serde(default)]
        duration_secs: Option<u64>,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// Lift an administrative block
    Unblock { origin: String },
    /// Typed input validation
    Validate {
        text: String,
        #[serde(default)]
        kind: InputKind,
    },
    /// Security report
    Report {
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    /// Most recent events
    Events {
        #[serde(default)]
        limit: Option<usize>,
    },
}

/// Counters for a replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Commands applied
    pub commands: usize,
    /// Lines that could not be parsed
    pub errors: usize,
}

/// Apply one command and describe the decision
pub fn apply(monitor: &SecurityMonitor, command: ReplayCommand) -> Value {
    let at = |at: Option<DateTime<Utc>>| at.unwrap_or_else(Utc::now);

    match command {
        ReplayCommand::Inspect {
            fields,
            subject,
            origin,
            at: when,
        } => {
            let fields = fields
                .iter()
                .filter_map(|(name, value)| value.as_str().map(|v| (name.as_str(), v)));
            let result = monitor.inspect(fields, subject.as_deref(), origin.as_deref(), at(when));
            json!({ "op": "inspect", "result": result })
        }
        ReplayCommand::Rate {
            subject,
            resource,
            at: when,
        } => {
            let now = at(when);
            let allowed = monitor.allow_request(&subject, &resource, now);
            let retry_after = if allowed {
                None
            } else {
                monitor
                    .retry_after(&subject, &resource, now)
                    .map(|d| d.num_seconds())
            };
            json!({ "op": "rate", "allowed": allowed, "retry_after_secs": retry_after })
        }
        ReplayCommand::Login {
            subject,
            origin,
            success,
            at: when,
        } => {
            let now = at(when);
            let allowed = monitor.login_allowed(&subject, &origin, now);
            if allowed {
                match success {
                    Some(true) => {
                        monitor.record_login_success(&subject, &origin);
                    }
                    Some(false) => {
                        monitor.record_login_failure(&subject, &origin, now);
                    }
                    None => {}
                }
            }
            json!({
                "op": "login",
                "allowed": allowed,
                "failures": monitor.login_failures(&subject, &origin, now),
            })
        }
        ReplayCommand::Block {
            origin,
            duration_secs,
            reason,
            at: when,
        } => {
            let until = monitor.block_origin(
                &origin,
                duration_secs.map(config::seconds),
                reason.as_deref(),
                at(when),
            );
            json!({ "op": "block", "origin": origin, "blocked_until": until })
        }
        ReplayCommand::Unblock { origin } => {
            let removed = monitor.unblock_origin(&origin);
            json!({ "op": "unblock", "origin": origin, "removed": removed })
        }
        ReplayCommand::Validate { text, kind } => {
            json!({ "op": "validate", "result": monitor.validate_input(&text, kind) })
        }
        ReplayCommand::Report { at: when } => {
            let report = monitor.report(at(when));
            let rating = utils::rating(report.security_score);
            json!({ "op": "report", "report": report, "rating": rating })
        }
        ReplayCommand::Events { limit } => {
            let limit = limit.unwrap_or(monitor.config().event_log.recent_limit);
            json!({ "op": "events", "events": monitor.recent_events(limit) })
        }
    }
}

/// Replay every command in `input`, writing one JSON line per command to `output`
pub fn run<R: BufRead, W: Write>(
    monitor: &SecurityMonitor,
    input: R,
    mut output: W,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (index, line) in input.lines().enumerate() {
        let line = line.context("failed to read replay input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let value = match serde_json::from_str::<ReplayCommand>(trimmed) {
            Ok(command) => {
                stats.commands += 1;
                apply(monitor, command)
            }
            Err(e) => {
                stats.errors += 1;
                warn!(line = index + 1, error = %e, "Skipping malformed replay line");
                json!({ "error": e.to_string(), "line": index + 1 })
            }
        };

        writeln!(output, "{}", value).context("failed to write replay output")?;
    }

    output.flush().context("failed to flush replay output")?;

    info!(
        commands = stats.commands,
        errors = stats.errors,
        "Replay finished"
    );

    Ok(stats)
}
