//! Security Monitor Engine
//!
//! The single owner of all monitoring state: rate-limit and brute-force
//! counters, the origin block list and the event log. Every decision call
//! takes the caller's `now` and returns a plain value; detections are
//! recorded in the event log as a side effect.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::blocklist::{BlockEntry, TemporalBlockList};
use crate::brute_force::BruteForceGuard;
use crate::config::{self, MonitorConfig};
use crate::credential::{self, CredentialHasher, CredentialRecord};
use crate::detector::{self, Classification, InputKind, InputValidation, ThreatDetector};
use crate::events::{AlertSink, EventLog, EventType, SecurityEvent, TracingAlertSink};
use crate::rate_limit::RateLimiter;
use crate::rules::ThreatCategory;
use crate::scoring::{self, SecurityReport};

/// Reason recorded for administrative blocks without one
pub const DEFAULT_BLOCK_REASON: &str = "Suspicious activity";

/// Outcome of inspecting one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InspectionResult {
    /// False if the origin is blocked or a blocking rule matched
    pub allowed: bool,
    /// True if the request was rejected at ingress without classification
    pub origin_blocked: bool,
    /// Catalog matches
    pub classification: Classification,
    /// SQL injection seen by the catalog or the predicate
    pub sql_injection: bool,
    /// XSS seen by the catalog or the predicate
    pub xss: bool,
}

/// Security monitoring engine
pub struct SecurityMonitor {
    config: MonitorConfig,
    detector: ThreatDetector,
    rate_limiter: RateLimiter,
    brute_force: BruteForceGuard,
    blocklist: TemporalBlockList<String>,
    hasher: CredentialHasher,
    log: Arc<EventLog>,
}

impl SecurityMonitor {
    /// Create a monitor that sends critical alerts to the log
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Self::with_alert_sink(config, Arc::new(TracingAlertSink))
    }

    /// Create a monitor that forwards critical events to `sink`
    pub fn with_alert_sink(config: MonitorConfig, sink: Arc<dyn AlertSink>) -> Result<Self> {
        config.validate().context("invalid monitor configuration")?;

        let detector = ThreatDetector::from_config(&config.detection)
            .context("failed to load pattern catalog")?;

        let log = Arc::new(EventLog::with_sink(config.event_log.max_events, sink));

        let rate_limiter = RateLimiter::with_shards(
            config.rate_limit_per_minute,
            config.rate_limit_window(),
            config.shard_count,
            log.clone(),
        );

        let mut brute_force = BruteForceGuard::with_shards(
            config.max_login_attempts,
            config.lockout_duration(),
            config.shard_count,
            log.clone(),
        );
        if config.brute_force.block_on_lockout {
            brute_force = brute_force.with_lockout_blocks();
        }

        info!(
            rules_count = detector.catalog().len(),
            max_login_attempts = config.max_login_attempts,
            lockout_duration_seconds = config.lockout_duration_seconds,
            rate_limit_per_minute = config.rate_limit_per_minute,
            kdf_iterations = config.kdf_iterations,
            max_events = ?config.event_log.max_events,
            shard_count = config.shard_count,
            "Security monitor initialized"
        );

        Ok(Self {
            hasher: CredentialHasher::new(config.kdf_iterations),
            blocklist: TemporalBlockList::with_shards(config.shard_count),
            detector,
            rate_limiter,
            brute_force,
            log,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Field classifier
    pub fn detector(&self) -> &ThreatDetector {
        &self.detector
    }

    /// Event log
    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    // ------------------------------------------------------------------
    // Request inspection
    // ------------------------------------------------------------------

    /// Inspect a request's fields.
    ///
    /// A blocked `origin` is rejected before any rule runs. Otherwise the
    /// fields are classified and at most one event per detection type is
    /// recorded for the request.
    pub fn inspect<I, K, V>(
        &self,
        fields: I,
        subject_id: Option<&str>,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> InspectionResult
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if let Some(origin) = origin {
            if self.is_blocked(origin, now) {
                debug!(origin = origin, "Request from blocked origin");
                return InspectionResult {
                    allowed: false,
                    origin_blocked: true,
                    ..Default::default()
                };
            }
        }

        let fields: Vec<(K, V)> = fields.into_iter().collect();
        let classification = self
            .detector
            .classify(fields.iter().map(|(k, v)| (k.as_ref(), v.as_ref())));

        let sqli_field = classification
            .threats
            .iter()
            .find(|t| t.category == ThreatCategory::SqlInjection)
            .map(|t| t.field.as_str());
        let xss_field = classification
            .threats
            .iter()
            .find(|t| t.category == ThreatCategory::Xss)
            .map(|t| t.field.as_str());

        // Predicates are advisory here; they flag the result but record nothing
        let mut sql_injection = sqli_field.is_some();
        let mut xss = xss_field.is_some();
        for (_, value) in &fields {
            let (value, _) = self.detector.bounded(value.as_ref());
            sql_injection = sql_injection || detector::looks_like_sql_injection(value);
            xss = xss || detector::looks_like_xss(value);
        }

        let record = |event_type: EventType, description: String| {
            self.log.append(
                SecurityEvent::new(event_type, description, now)
                    .with_subject(subject_id)
                    .with_origin(origin),
            );
        };

        if let Some(threat) = classification
            .threats
            .iter()
            .find(|t| t.category == ThreatCategory::InvalidInput)
        {
            record(
                EventType::InvalidInput,
                format!(
                    "Field {} exceeded {} bytes",
                    threat.field,
                    self.detector.max_input_length()
                ),
            );
        }
        if let Some(field) = sqli_field {
            record(
                EventType::SqlInjection,
                format!("SQL injection attempt in field {}", field),
            );
        }
        if let Some(field) = xss_field {
            record(EventType::XssAttack, format!("XSS attempt in field {}", field));
        }
        if let Some(threat) = classification.threats.iter().find(|t| {
            !matches!(
                t.category,
                ThreatCategory::SqlInjection | ThreatCategory::Xss | ThreatCategory::InvalidInput
            )
        }) {
            record(
                EventType::ThreatDetected,
                format!("{} in field {}", threat.rule_name, threat.field),
            );
        }

        InspectionResult {
            allowed: !classification.blocked,
            origin_blocked: false,
            sql_injection,
            xss,
            classification,
        }
    }

    /// Validate a single input value. Pure; nothing is logged.
    pub fn validate_input(&self, text: &str, kind: InputKind) -> InputValidation {
        detector::validate_input(text, kind)
    }

    // ------------------------------------------------------------------
    // Rate limiting and brute force
    // ------------------------------------------------------------------

    /// Admit or reject one request for (subject, resource)
    pub fn allow_request(&self, subject_id: &str, resource: &str, now: DateTime<Utc>) -> bool {
        self.rate_limiter.allow(subject_id, resource, now)
    }

    /// Time until the next request for (subject, resource) would be admitted
    pub fn retry_after(&self, subject_id: &str, resource: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.rate_limiter.retry_after(subject_id, resource, now)
    }

    /// True if a login attempt may proceed for (subject, origin)
    pub fn login_allowed(&self, subject_id: &str, origin: &str, now: DateTime<Utc>) -> bool {
        self.brute_force.allowed(subject_id, origin, now)
    }

    /// Record a confirmed failed login. Returns failures now in the window.
    pub fn record_login_failure(&self, subject_id: &str, origin: &str, now: DateTime<Utc>) -> usize {
        self.brute_force.record_failure(subject_id, origin, now)
    }

    /// Note a successful login. Clears the failure window only when
    /// `clear_failures_on_success` is set; returns true if it did.
    pub fn record_login_success(&self, subject_id: &str, origin: &str) -> bool {
        if !self.config.brute_force.clear_failures_on_success {
            return false;
        }
        self.brute_force.reset(subject_id, origin)
    }

    /// Failed logins currently counted for (subject, origin)
    pub fn login_failures(&self, subject_id: &str, origin: &str, now: DateTime<Utc>) -> usize {
        self.brute_force.failures(subject_id, origin, now)
    }

    // ------------------------------------------------------------------
    // Block list
    // ------------------------------------------------------------------

    /// Block `origin` for `duration` (the configured default if `None`).
    /// Returns the expiry instant.
    pub fn block_origin(
        &self,
        origin: &str,
        duration: Option<Duration>,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let duration = duration
            .unwrap_or_else(|| config::seconds(self.config.blocklist.default_block_seconds));
        let reason = reason.unwrap_or(DEFAULT_BLOCK_REASON);
        let until = self.blocklist.block(origin.to_string(), duration, reason, now);

        self.log.append(
            SecurityEvent::new(
                EventType::IpBlocked,
                format!(
                    "IP {} blocked for {} seconds: {}",
                    origin,
                    duration.num_seconds(),
                    reason
                ),
                now,
            )
            .with_origin(Some(origin)),
        );

        until
    }

    /// Lift a block early. Returns true if one was present.
    pub fn unblock_origin(&self, origin: &str) -> bool {
        let removed = self.blocklist.unblock(&origin.to_string());
        if removed {
            info!(origin = origin, "Origin unblocked");
        }
        removed
    }

    /// Ingress check: true iff `origin` has an unexpired block
    pub fn is_blocked(&self, origin: &str, now: DateTime<Utc>) -> bool {
        self.blocklist.is_blocked(&origin.to_string(), now)
    }

    /// Live block entry for `origin`
    pub fn block_entry(&self, origin: &str, now: DateTime<Utc>) -> Option<BlockEntry<String>> {
        self.blocklist.entry(&origin.to_string(), now)
    }

    /// Record an access attempt the collaborator has already denied
    pub fn record_unauthorized(
        &self,
        subject_id: Option<&str>,
        origin: Option<&str>,
        resource: &str,
        now: DateTime<Utc>,
    ) {
        self.log.append(
            SecurityEvent::new(
                EventType::UnauthorizedAccess,
                format!("Unauthorized access to {}", resource),
                now,
            )
            .with_subject(subject_id)
            .with_origin(origin),
        );
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Hash a password with the configured iteration count
    pub fn hash_credential(&self, password: &str, salt: Option<&[u8]>) -> CredentialRecord {
        self.hasher.hash(password, salt)
    }

    /// Verify a password against a stored record; malformed records never verify
    pub fn verify_credential(&self, password: &str, record: &CredentialRecord) -> bool {
        self.hasher.verify(password, record)
    }

    /// Generate a numeric one-time code
    pub fn generate_code(&self, length: usize) -> String {
        credential::generate_code(length)
    }

    /// Constant-time one-time code check
    pub fn verify_code(&self, candidate: &str, expected: &str) -> bool {
        credential::verify_code(candidate, expected)
    }

    /// Generate a URL-safe random token from `length` bytes
    pub fn generate_token(&self, length: usize) -> String {
        credential::generate_token(length)
    }

    // ------------------------------------------------------------------
    // Events and reporting
    // ------------------------------------------------------------------

    /// Aggregate report over the configured report window
    pub fn report(&self, now: DateTime<Utc>) -> SecurityReport {
        scoring::build_report(&self.log, now, self.config.event_log.report_window())
    }

    /// The last `limit` events, oldest first
    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.log.recent(limit)
    }

    /// Events with `timestamp >= now - window`
    pub fn events_since(&self, now: DateTime<Utc>, window: Duration) -> Vec<SecurityEvent> {
        self.log.events_since(now, window)
    }

    /// Drop idle counters and expired blocks. Returns the number of rows removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let removed = self.rate_limiter.purge_idle(now)
            + self.brute_force.purge(now)
            + self.blocklist.purge_expired(now);
        debug!(removed = removed, "Swept monitor state");
        removed
    }
}
