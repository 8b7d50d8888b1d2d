//! Security Scoring
//!
//! Derives a bounded 0-100 security score from a trailing window of events.
//! The score starts at 100 and every event subtracts a fixed penalty for its
//! type. Penalties accumulate without bound and the result is floored at 0,
//! so a burst of events saturates the score at zero.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::events::{EventLog, EventType, SecurityEvent};

/// Score with no events in the window
pub const BASE_SCORE: u8 = 100;

/// Penalty subtracted for one event of the given type
pub fn penalty(event_type: EventType) -> u32 {
    match event_type {
        EventType::BruteForceDetected => 10,
        EventType::SqlInjection | EventType::XssAttack => 15,
        EventType::RateLimitExceeded => 5,
        _ => 0,
    }
}

/// Compute the security score for a set of events
pub fn score(events: &[SecurityEvent]) -> u8 {
    let total = events
        .iter()
        .fold(0u32, |acc, e| acc.saturating_add(penalty(e.event_type)));

    u32::from(BASE_SCORE).saturating_sub(total) as u8
}

/// Aggregated view of recent security activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityReport {
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
    /// Events in the report window
    pub total_events_24h: usize,
    /// Suspicious events (brute force, SQL injection, XSS) across the retained log
    pub suspicious_activities: usize,
    /// Distinct origins seen in the window, sorted
    pub origins: Vec<String>,
    /// Distinct event types seen in the window, sorted
    pub threat_types: Vec<EventType>,
    /// Score computed over the window
    pub security_score: u8,
}

/// Build a report over the window ending at `now`
pub fn build_report(log: &EventLog, now: DateTime<Utc>, window: Duration) -> SecurityReport {
    let (recent, suspicious_activities) = log.window_and_suspicious(now, window);

    let mut origins: Vec<String> = recent.iter().filter_map(|e| e.origin.clone()).collect();
    origins.sort();
    origins.dedup();

    let mut threat_types: Vec<EventType> = recent.iter().map(|e| e.event_type).collect();
    threat_types.sort();
    threat_types.dedup();

    SecurityReport {
        generated_at: now,
        total_events_24h: recent.len(),
        suspicious_activities,
        origins,
        threat_types,
        security_score: score(&recent),
    }
}

/// Score presentation helpers
pub mod utils {
    /// Qualitative band for a score
    pub fn rating(score: u8) -> &'static str {
        match score {
            90..=u8::MAX => "good",
            70..=89 => "fair",
            40..=69 => "poor",
            _ => "critical",
        }
    }

    /// Format score for display
    pub fn format_score(score: u8) -> String {
        format!("{}/100 ({})", score, rating(score))
    }
}
