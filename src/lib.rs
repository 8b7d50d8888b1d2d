//! Zentinel Security Monitor Library
//!
//! A self-contained security monitoring engine: classifies request fields
//! against an ordered pattern catalog, rate-limits subjects per resource,
//! locks out repeated login failures, keeps a temporary origin block list,
//! hashes credentials, and scores recent activity from an event log.
//!
//! # Features
//!
//! - **Pattern Catalog**: SQLi, XSS, path traversal, command injection, RFI and SSRF rules plus configurable suspicious tokens
//! - **Sliding Windows**: Sharded per-key counters with atomic check-and-record
//! - **Brute Force Lockout**: Per (subject, origin) failure windows
//! - **Credential Hashing**: PBKDF2-HMAC-SHA256 with constant-time verification
//! - **Security Score**: Penalty-based score over a trailing window
//!
//! All time is supplied by the caller.
//!
//! # Example
//!
//! ```ignore
//! use chrono::Utc;
//! use zentinel_security_monitor::{MonitorConfig, SecurityMonitor};
//!
//! let monitor = SecurityMonitor::new(MonitorConfig::default())?;
//! let now = Utc::now();
//!
//! let result = monitor.inspect([("user", "' OR 1=1 --")], Some("alice"), Some("10.0.0.1"), now);
//! assert!(!result.allowed);
//!
//! if monitor.login_allowed("alice", "10.0.0.1", now) {
//!     // authenticate, then on failure:
//!     monitor.record_login_failure("alice", "10.0.0.1", now);
//! }
//!
//! println!("score: {}", monitor.report(now).security_score);
//! ```

pub mod blocklist;
pub mod brute_force;
pub mod config;
pub mod credential;
pub mod detector;
pub mod engine;
pub mod events;
pub mod rate_limit;
pub mod replay;
pub mod rules;
pub mod scoring;
pub mod window;

// Re-exports for convenience
pub use blocklist::{BlockEntry, TemporalBlockList};
pub use brute_force::BruteForceGuard;
pub use config::{
    BlockListConfig, BruteForceConfig, DetectionConfig, EventLogConfig, MonitorConfig,
    MonitorConfigJson, RuleSelector,
};
pub use credential::{CredentialHasher, CredentialRecord};
pub use detector::{
    looks_like_sql_injection, looks_like_xss, sanitize, validate_input, Classification,
    InputKind, InputThreat, InputValidation, InputWarning, Threat, ThreatDetector,
};
pub use engine::{InspectionResult, SecurityMonitor};
pub use events::{AlertSink, EventLog, EventType, SecurityEvent, TracingAlertSink};
pub use rate_limit::RateLimiter;
pub use rules::{PatternCatalog, Rule, RuleAction, RuleBuilder, Severity, ThreatCategory};
pub use scoring::{score, SecurityReport};
pub use window::{SlidingWindowCounter, WindowOutcome, WindowedKey};
