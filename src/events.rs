//! Security Event Log
//!
//! Append-only, time-queryable record of everything the monitor detected.
//! All components funnel their detections through [`EventLog::append`];
//! nothing else mutates the log. Events are immutable once appended.
//!
//! Retention is bounded by `max_events` (oldest events are dropped first);
//! `None` keeps every event.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Kind of security event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BruteForceDetected,
    SqlInjection,
    XssAttack,
    RateLimitExceeded,
    ThreatDetected,
    InvalidInput,
    IpBlocked,
    UnauthorizedAccess,
}

impl EventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BruteForceDetected => "BRUTE_FORCE_DETECTED",
            EventType::SqlInjection => "SQL_INJECTION",
            EventType::XssAttack => "XSS_ATTACK",
            EventType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            EventType::ThreatDetected => "THREAT_DETECTED",
            EventType::InvalidInput => "INVALID_INPUT",
            EventType::IpBlocked => "IP_BLOCKED",
            EventType::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
        }
    }

    /// Suspicious activity: brute force, SQL injection and XSS
    pub fn is_suspicious(&self) -> bool {
        matches!(
            self,
            EventType::BruteForceDetected | EventType::SqlInjection | EventType::XssAttack
        )
    }

    /// Events that warrant an immediate alert
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            EventType::BruteForceDetected | EventType::UnauthorizedAccess
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable security event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub event_type: EventType,
    /// Human-readable description
    pub description: String,
    /// Subject the event concerns, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Network origin of the event, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl SecurityEvent {
    /// Create an event without subject or origin
    pub fn new(event_type: EventType, description: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            event_type,
            description: description.into(),
            subject_id: None,
            origin: None,
        }
    }

    /// Attach a subject
    pub fn with_subject(mut self, subject_id: Option<&str>) -> Self {
        self.subject_id = subject_id.map(str::to_string);
        self
    }

    /// Attach an origin
    pub fn with_origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }
}

/// Receiver for critical events.
///
/// Delivery (mail, chat, paging) belongs to the embedding application; the
/// monitor only hands the event over.
pub trait AlertSink: Send + Sync {
    /// Called once for every appended critical event
    fn alert(&self, event: &SecurityEvent);
}

/// Alert sink that writes critical events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, event: &SecurityEvent) {
        error!(
            event_type = %event.event_type,
            subject = event.subject_id.as_deref().unwrap_or("N/A"),
            origin = event.origin.as_deref().unwrap_or("N/A"),
            timestamp = %event.timestamp,
            "SECURITY ALERT: {}",
            event.description
        );
    }
}

/// Append-only security event log
pub struct EventLog {
    events: RwLock<VecDeque<SecurityEvent>>,
    max_events: Option<usize>,
    sink: Arc<dyn AlertSink>,
}

impl EventLog {
    /// Create a log with the given retention cap and the tracing alert sink
    pub fn new(max_events: Option<usize>) -> Self {
        Self::with_sink(max_events, Arc::new(TracingAlertSink))
    }

    /// Create a log that forwards critical events to `sink`
    pub fn with_sink(max_events: Option<usize>, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events,
            sink,
        }
    }

    /// Append an event. The only write path into the log.
    pub fn append(&self, event: SecurityEvent) {
        warn!(
            event_type = %event.event_type,
            subject = ?event.subject_id,
            origin = ?event.origin,
            "SECURITY_EVENT: {} - {}",
            event.event_type,
            event.description
        );

        let critical = event.event_type.is_critical();
        let alert_copy = critical.then(|| event.clone());

        {
            let mut events = self.events.write();
            if let Some(max) = self.max_events {
                while events.len() >= max.max(1) {
                    events.pop_front();
                }
            }
            events.push_back(event);
        }

        if let Some(event) = alert_copy {
            self.sink.alert(&event);
        }
    }

    /// Events with `timestamp >= now - window`, in insertion order
    pub fn events_since(&self, now: DateTime<Utc>, window: Duration) -> Vec<SecurityEvent> {
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.events
            .read()
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// The last `limit` events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        let events = self.events.read();
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    /// Consistent copy of every retained event
    pub fn snapshot(&self) -> Vec<SecurityEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// Events with `timestamp >= now - window` and the retained suspicious
    /// count, both read from one snapshot of the log
    pub fn window_and_suspicious(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> (Vec<SecurityEvent>, usize) {
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let events = self.events.read();
        let recent = events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect();
        let suspicious = events.iter().filter(|e| e.event_type.is_suspicious()).count();
        (recent, suspicious)
    }

    /// Number of retained suspicious events
    pub fn suspicious_count(&self) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.is_suspicious())
            .count()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True if nothing has been logged
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(None)
    }
}
