//! Monitor Configuration Types
//!
//! Thresholds for rate limiting, brute-force lockout and credential hashing,
//! plus detection and retention settings. Supplied once at construction.

use anyhow::{bail, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::credential::MIN_KDF_ITERATIONS;
use crate::rules::suspicious::DEFAULT_TOKENS;
use crate::window::DEFAULT_SHARDS;

/// Window over which `rate_limit_per_minute` is enforced
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Longest configurable duration (100 years); keeps instant arithmetic in range
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

/// Convert a second count to a `Duration`, saturating at `MAX_DURATION_SECS`
pub fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

/// Security monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Failed logins per (subject, origin) before lockout
    pub max_login_attempts: usize,
    /// Lockout window in seconds
    pub lockout_duration_seconds: u64,
    /// Requests per (subject, resource) per minute
    pub rate_limit_per_minute: usize,
    /// PBKDF2 iteration count
    pub kdf_iterations: u32,
    /// Threat detection configuration
    pub detection: DetectionConfig,
    /// Brute-force guard behaviour
    pub brute_force: BruteForceConfig,
    /// Administrative block list configuration
    pub blocklist: BlockListConfig,
    /// Event log retention and reporting
    pub event_log: EventLogConfig,
    /// Lock shards per counter and block list
    pub shard_count: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_duration_seconds: 900, // 15 minutes
            rate_limit_per_minute: 100,
            kdf_iterations: 100_000,
            detection: DetectionConfig::default(),
            brute_force: BruteForceConfig::default(),
            blocklist: BlockListConfig::default(),
            event_log: EventLogConfig::default(),
            shard_count: DEFAULT_SHARDS,
        }
    }
}

impl MonitorConfig {
    /// Check the configuration for values the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_login_attempts == 0 {
            bail!("max_login_attempts must be at least 1");
        }
        if self.lockout_duration_seconds == 0 {
            bail!("lockout_duration_seconds must be at least 1");
        }
        if self.rate_limit_per_minute == 0 {
            bail!("rate_limit_per_minute must be at least 1");
        }
        if self.kdf_iterations < MIN_KDF_ITERATIONS {
            bail!(
                "kdf_iterations must be at least {} (got {})",
                MIN_KDF_ITERATIONS,
                self.kdf_iterations
            );
        }
        if self.detection.max_input_length == 0 {
            bail!("detection.max_input_length must be at least 1");
        }
        if self.blocklist.default_block_seconds == 0 {
            bail!("blocklist.default_block_seconds must be at least 1");
        }
        if self.event_log.max_events == Some(0) {
            bail!("event_log.max_events must be at least 1 when set");
        }
        if self.shard_count == 0 {
            bail!("shard_count must be at least 1");
        }
        Ok(())
    }

    /// Lockout window
    pub fn lockout_duration(&self) -> Duration {
        seconds(self.lockout_duration_seconds)
    }

    /// Rate limit window
    pub fn rate_limit_window(&self) -> Duration {
        seconds(RATE_LIMIT_WINDOW_SECS)
    }
}

/// Configuration for threat detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetectionConfig {
    /// Enable SQL injection rules
    #[serde(default = "default_true")]
    pub sqli_enabled: bool,
    /// Enable XSS rules
    #[serde(default = "default_true")]
    pub xss_enabled: bool,
    /// Enable path traversal rules
    #[serde(default = "default_true")]
    pub path_traversal_enabled: bool,
    /// Enable command injection rules
    #[serde(default = "default_true")]
    pub command_injection_enabled: bool,
    /// Enable remote file inclusion rules
    #[serde(default = "default_true")]
    pub file_inclusion_enabled: bool,
    /// Enable SSRF rules
    #[serde(default = "default_true")]
    pub ssrf_enabled: bool,
    /// Literal tokens recorded as suspicious
    #[serde(default = "default_suspicious_patterns")]
    pub suspicious_patterns: Vec<String>,
    /// Longest field value inspected, in bytes; longer values are flagged as invalid input
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    /// Rules to leave out of the catalog
    #[serde(default)]
    pub disabled_rules: Vec<RuleSelector>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sqli_enabled: true,
            xss_enabled: true,
            path_traversal_enabled: true,
            command_injection_enabled: true,
            file_inclusion_enabled: true,
            ssrf_enabled: true,
            suspicious_patterns: default_suspicious_patterns(),
            max_input_length: 8192,
            disabled_rules: vec![],
        }
    }
}

fn default_suspicious_patterns() -> Vec<String> {
    DEFAULT_TOKENS.iter().map(|t| t.to_string()).collect()
}

fn default_max_input_length() -> usize {
    8192
}

/// Configuration for the brute-force guard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BruteForceConfig {
    /// Push a lockout entry to a block list on threshold breach for faster rejection
    #[serde(default)]
    pub block_on_lockout: bool,
    /// Clear the failure window when a login succeeds
    #[serde(default)]
    pub clear_failures_on_success: bool,
}

/// Configuration for administrative blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockListConfig {
    /// Block duration when none is given
    #[serde(default = "default_block_seconds")]
    pub default_block_seconds: u64,
}

impl Default for BlockListConfig {
    fn default() -> Self {
        Self {
            default_block_seconds: 3600,
        }
    }
}

fn default_block_seconds() -> u64 {
    3600
}

/// Configuration for the event log and reports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventLogConfig {
    /// Retention cap; `None` keeps every event
    #[serde(default = "default_max_events")]
    pub max_events: Option<usize>,
    /// Report window in hours
    #[serde(default = "default_report_window_hours")]
    pub report_window_hours: u64,
    /// Events returned by the recent-events listing
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            report_window_hours: 24,
            recent_limit: 100,
        }
    }
}

impl EventLogConfig {
    /// Report window
    pub fn report_window(&self) -> Duration {
        seconds(self.report_window_hours.saturating_mul(3600))
    }
}

fn default_max_events() -> Option<usize> {
    Some(100_000)
}

fn default_report_window_hours() -> u64 {
    24
}

fn default_recent_limit() -> usize {
    100
}

/// Rule selector for disabling rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSelector {
    /// Single rule by ID: 942100
    Id(u32),
    /// Pattern: "942*", "942100-942199", "@sqli"
    Pattern(String),
}

impl RuleSelector {
    /// Check if this selector matches a rule
    pub fn matches(&self, rule_id: u32, tags: &[String]) -> bool {
        match self {
            RuleSelector::Id(id) => *id == rule_id,
            RuleSelector::Pattern(pattern) => {
                // Tag match: @tag-name
                if let Some(tag) = pattern.strip_prefix('@') {
                    return tags.iter().any(|t| t == tag);
                }

                // Range match: 942100-942199
                if let Some((start, end)) = pattern.split_once('-') {
                    if let (Ok(start_id), Ok(end_id)) = (start.parse::<u32>(), end.parse::<u32>()) {
                        return rule_id >= start_id && rule_id <= end_id;
                    }
                }

                // Wildcard match: 942*
                if let Some(prefix) = pattern.strip_suffix('*') {
                    return rule_id.to_string().starts_with(prefix);
                }

                pattern == &rule_id.to_string()
            }
        }
    }
}

/// JSON-serializable configuration, e.g. loaded from a file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MonitorConfigJson {
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: usize,
    #[serde(default = "default_lockout_duration")]
    pub lockout_duration_seconds: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
    #[serde(default)]
    pub detection: Option<DetectionConfig>,
    #[serde(default)]
    pub brute_force: Option<BruteForceConfig>,
    #[serde(default)]
    pub blocklist: Option<BlockListConfig>,
    #[serde(default)]
    pub event_log: Option<EventLogConfig>,
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_login_attempts() -> usize {
    5
}

fn default_lockout_duration() -> u64 {
    900
}

fn default_rate_limit() -> usize {
    100
}

fn default_kdf_iterations() -> u32 {
    100_000
}

fn default_shard_count() -> usize {
    DEFAULT_SHARDS
}

impl From<MonitorConfigJson> for MonitorConfig {
    fn from(json: MonitorConfigJson) -> Self {
        MonitorConfig {
            max_login_attempts: json.max_login_attempts,
            lockout_duration_seconds: json.lockout_duration_seconds,
            rate_limit_per_minute: json.rate_limit_per_minute,
            kdf_iterations: json.kdf_iterations,
            detection: json.detection.unwrap_or_default(),
            brute_force: json.brute_force.unwrap_or_default(),
            blocklist: json.blocklist.unwrap_or_default(),
            event_log: json.event_log.unwrap_or_default(),
            shard_count: json.shard_count,
        }
    }
}
