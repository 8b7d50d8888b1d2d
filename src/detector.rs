//! Threat Detector
//!
//! Evaluates request fields against the pattern catalog, and exposes the
//! standalone SQL injection and XSS predicates used for input validation.
//!
//! Detection always runs on the caller's original text. `sanitize` is
//! advisory output only and never feeds back into classification.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DetectionConfig;
use crate::rules::{PatternCatalog, RuleAction, Severity, ThreatCategory};

/// Rule ID reported for over-long field values
pub const INVALID_INPUT_RULE_ID: u32 = 920100;

/// Rule name reported for over-long field values
pub const INVALID_INPUT_RULE_NAME: &str = "Invalid Input";

/// SQL injection predicate patterns, matched case-insensitively
const SQL_INJECTION_PATTERNS: &[&str] = &[
    r"(%27)|(')|(--)|(%23)|(#)",
    r"((%3D)|(=))[^\n]*((%27)|(')|(--)|(%3B)|(;))",
    r"\w*((%27)|('))((%6F)|o|(%4F))((%72)|r|(%52))",
    r"((%27)|('))union",
    r"exec(\s|\+)+(s|x)p\w+",
    r"insert(\s|\+)+into",
    r"drop(\s|\+)+table",
    r"update(\s|\+)+set",
    r"delete(\s|\+)+from",
];

/// XSS predicate patterns, matched case-insensitively
const XSS_PATTERNS: &[&str] = &[
    r"<script>",
    r"javascript:",
    r"onload=",
    r"onerror=",
    r"onclick=",
    r"alert\(",
    r"document\.cookie",
    r"<iframe",
    r"<img src=",
    r"vbscript:",
    r"expression\(",
];

lazy_static! {
    static ref SQL_INJECTION_REGEX: Vec<Regex> = compile_all(SQL_INJECTION_PATTERNS);
    static ref XSS_REGEX: Vec<Regex> = compile_all(XSS_PATTERNS);
    static ref SCRIPT_SPAN: Regex = Regex::new(r"(?is)<script.*?>.*?</script>").unwrap();
    static ref JAVASCRIPT_URI: Regex = Regex::new(r"(?i)javascript:").unwrap();
    static ref EMAIL: Regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref PHONE: Regex = Regex::new(r"^\+?1?\d{9,15}$").unwrap();
    static ref SPECIAL_CHAR: Regex = Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).unwrap();
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
}

/// One rule match on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Threat {
    /// Matching rule ID
    pub rule_id: u32,
    /// Matching rule name
    pub rule_name: String,
    /// Field the match was found in
    pub field: String,
    /// Rule severity
    pub severity: Severity,
    /// Rule category
    pub category: ThreatCategory,
    /// Rule action
    pub action: RuleAction,
}

/// Result of classifying a set of fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// True if any rule matched
    pub matched: bool,
    /// True if any matched rule has the block action
    pub blocked: bool,
    /// Matches in field order, then catalog order
    pub threats: Vec<Threat>,
}

impl Classification {
    /// True if any threat belongs to `category`
    pub fn has_category(&self, category: ThreatCategory) -> bool {
        self.threats.iter().any(|t| t.category == category)
    }

    /// Highest severity among the threats
    pub fn max_severity(&self) -> Option<Severity> {
        self.threats.iter().map(|t| t.severity).max()
    }

    fn push(&mut self, threat: Threat) {
        self.matched = true;
        self.blocked |= threat.action == RuleAction::Block;
        self.threats.push(threat);
    }
}

/// Catalog-driven field classifier
#[derive(Debug, Clone)]
pub struct ThreatDetector {
    catalog: PatternCatalog,
    max_input_length: usize,
}

impl ThreatDetector {
    /// Create a detector over an already loaded catalog
    pub fn new(catalog: PatternCatalog, max_input_length: usize) -> Self {
        Self {
            catalog,
            max_input_length: max_input_length.max(1),
        }
    }

    /// Load the catalog described by `config` and wrap it
    pub fn from_config(config: &DetectionConfig) -> anyhow::Result<Self> {
        let catalog = PatternCatalog::load(config)?;
        Ok(Self::new(catalog, config.max_input_length))
    }

    /// Rules this detector evaluates
    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Longest value inspected in full
    pub fn max_input_length(&self) -> usize {
        self.max_input_length
    }

    /// Classify fields in the order given.
    ///
    /// For each field the catalog is evaluated in order; a blocking match
    /// ends evaluation for that field only. Values longer than
    /// `max_input_length` are reported as invalid input and their leading
    /// `max_input_length` bytes are still inspected.
    pub fn classify<I, K, V>(&self, fields: I) -> Classification
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut result = Classification::default();
        for (field, value) in fields {
            self.classify_field(field.as_ref(), value.as_ref(), &mut result);
        }
        result
    }

    /// Classify a single named value
    pub fn classify_value(&self, field: &str, value: &str) -> Classification {
        let mut result = Classification::default();
        self.classify_field(field, value, &mut result);
        result
    }

    fn classify_field(&self, field: &str, value: &str, result: &mut Classification) {
        let (value, truncated) = self.bounded(value);
        if truncated {
            debug!(
                field = field,
                limit = self.max_input_length,
                "Field exceeds maximum input length"
            );
            result.push(Threat {
                rule_id: INVALID_INPUT_RULE_ID,
                rule_name: INVALID_INPUT_RULE_NAME.to_string(),
                field: field.to_string(),
                severity: Severity::Medium,
                category: ThreatCategory::InvalidInput,
                action: RuleAction::Block,
            });
        }

        for rule in self.catalog.rules() {
            if !rule.matches(value) {
                continue;
            }

            debug!(
                rule_id = rule.id,
                rule_name = %rule.name,
                field = field,
                action = %rule.action,
                "Rule matched"
            );

            result.push(Threat {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                field: field.to_string(),
                severity: rule.severity,
                category: rule.category,
                action: rule.action,
            });

            if rule.is_blocking() {
                break;
            }
        }
    }

    /// Longest prefix of `value` within the input limit, cut at a char
    /// boundary, and whether anything was cut
    pub fn bounded<'a>(&self, value: &'a str) -> (&'a str, bool) {
        if value.len() <= self.max_input_length {
            return (value, false);
        }
        let mut end = self.max_input_length;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        (&value[..end], true)
    }
}

/// True if `text` matches any SQL injection predicate pattern
pub fn looks_like_sql_injection(text: &str) -> bool {
    SQL_INJECTION_REGEX.iter().any(|re| re.is_match(text))
}

/// True if `text` matches any XSS predicate pattern
pub fn looks_like_xss(text: &str) -> bool {
    XSS_REGEX.iter().any(|re| re.is_match(text))
}

/// Trim `text` and strip script spans and `javascript:` prefixes.
///
/// Advisory only: never use the result in place of detection.
pub fn sanitize(text: &str) -> String {
    let trimmed = text.trim();
    let without_scripts = SCRIPT_SPAN.replace_all(trimmed, "");
    JAVASCRIPT_URI.replace_all(&without_scripts, "").into_owned()
}

/// Expected shape of a validated input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    General,
    Email,
    Phone,
    Password,
}

/// Threat found by input validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputThreat {
    SqlInjection,
    XssAttack,
}

/// Format or strength problem found by input validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputWarning {
    InvalidEmailFormat,
    InvalidPhoneFormat,
    PasswordTooShort,
    PasswordNoUppercase,
    PasswordNoLowercase,
    PasswordNoNumber,
    PasswordNoSpecialChar,
}

/// Result of `validate_input`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputValidation {
    pub is_valid: bool,
    pub sanitized: String,
    pub warnings: Vec<InputWarning>,
    pub threats: Vec<InputThreat>,
}

/// Validate `text` as `kind`.
///
/// Injection and XSS hits, or a malformed email or phone number, make the
/// input invalid. Password strength problems are reported as warnings only.
pub fn validate_input(text: &str, kind: InputKind) -> InputValidation {
    let mut threats = Vec::new();
    let mut warnings = Vec::new();

    if looks_like_sql_injection(text) {
        threats.push(InputThreat::SqlInjection);
    }
    if looks_like_xss(text) {
        threats.push(InputThreat::XssAttack);
    }

    let mut format_ok = true;
    match kind {
        InputKind::General => {}
        InputKind::Email => {
            if !EMAIL.is_match(text) {
                format_ok = false;
                warnings.push(InputWarning::InvalidEmailFormat);
            }
        }
        InputKind::Phone => {
            if !PHONE.is_match(text) {
                format_ok = false;
                warnings.push(InputWarning::InvalidPhoneFormat);
            }
        }
        InputKind::Password => {
            if text.chars().count() < 8 {
                warnings.push(InputWarning::PasswordTooShort);
            }
            if !text.chars().any(|c| c.is_ascii_uppercase()) {
                warnings.push(InputWarning::PasswordNoUppercase);
            }
            if !text.chars().any(|c| c.is_ascii_lowercase()) {
                warnings.push(InputWarning::PasswordNoLowercase);
            }
            if !text.chars().any(|c| c.is_ascii_digit()) {
                warnings.push(InputWarning::PasswordNoNumber);
            }
            if !SPECIAL_CHAR.is_match(text) {
                warnings.push(InputWarning::PasswordNoSpecialChar);
            }
        }
    }

    InputValidation {
        is_valid: threats.is_empty() && format_ok,
        sanitized: sanitize(text),
        warnings,
        threats,
    }
}
