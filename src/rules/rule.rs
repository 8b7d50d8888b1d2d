//! Rule types and builder
//!
//! Defines the catalog Rule with its action and severity, plus a builder for
//! declaring rules.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Threat class a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreatCategory {
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
    FileInclusion,
    Ssrf,
    /// Generic suspicious tokens
    Suspicious,
    /// Input rejected before pattern evaluation
    InvalidInput,
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatCategory::SqlInjection => write!(f, "SQL Injection"),
            ThreatCategory::Xss => write!(f, "Cross-Site Scripting"),
            ThreatCategory::PathTraversal => write!(f, "Path Traversal"),
            ThreatCategory::CommandInjection => write!(f, "Command Injection"),
            ThreatCategory::FileInclusion => write!(f, "File Inclusion"),
            ThreatCategory::Ssrf => write!(f, "Server-Side Request Forgery"),
            ThreatCategory::Suspicious => write!(f, "Suspicious Token"),
            ThreatCategory::InvalidInput => write!(f, "Invalid Input"),
        }
    }
}

/// Rule severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// What a match on this rule does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Reject the request; stops further rules for the matched field
    Block,
    /// Record the match and let the request through
    Allow,
    /// Record the match for auditing
    Log,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Block => write!(f, "block"),
            RuleAction::Allow => write!(f, "allow"),
            RuleAction::Log => write!(f, "log"),
        }
    }
}

/// Detection rule with metadata
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique rule ID (e.g., 942100)
    pub id: u32,
    /// Human-readable rule name, reported on match
    pub name: String,
    /// Detailed description
    pub description: String,
    /// Threat class
    pub category: ThreatCategory,
    /// Severity level
    pub severity: Severity,
    /// Action on match
    pub action: RuleAction,
    /// Compiled case-insensitive pattern
    pub pattern: Regex,
    /// Raw pattern string
    pub pattern_str: String,
    /// Searchable tags
    pub tags: Vec<String>,
}

impl Rule {
    /// True if the pattern occurs anywhere in `value`
    pub fn matches(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }

    /// True if a match stops evaluation for the field
    pub fn is_blocking(&self) -> bool {
        self.action == RuleAction::Block
    }
}

/// Builder for creating rules with a fluent API
pub struct RuleBuilder {
    id: u32,
    name: String,
    description: String,
    category: ThreatCategory,
    severity: Severity,
    action: RuleAction,
    pattern: String,
    tags: Vec<String>,
}

impl RuleBuilder {
    /// Create a new rule builder with required fields
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: String::new(),
            category: ThreatCategory::Suspicious,
            severity: Severity::Medium,
            action: RuleAction::Log,
            pattern: String::new(),
            tags: vec![],
        }
    }

    /// Set the description
    pub fn description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    /// Set the threat category
    pub fn category(mut self, category: ThreatCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the severity
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the action
    pub fn action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    /// Set the regex pattern
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = pattern.to_string();
        self
    }

    /// Match `literal` verbatim instead of as a regex
    pub fn literal(mut self, literal: &str) -> Self {
        self.pattern = regex::escape(literal);
        self
    }

    /// Add multiple tags
    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|s| s.to_string()));
        self
    }

    /// Build the rule. Patterns always match case-insensitively.
    pub fn build(self) -> Result<Rule, regex::Error> {
        let pattern = RegexBuilder::new(&self.pattern)
            .case_insensitive(true)
            .build()?;
        Ok(Rule {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
            severity: self.severity,
            action: self.action,
            pattern,
            pattern_str: self.pattern,
            tags: self.tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_builder() {
        let rule = RuleBuilder::new(942100, "SQL Injection")
            .description("Detects quote and comment sequences")
            .category(ThreatCategory::SqlInjection)
            .severity(Severity::High)
            .action(RuleAction::Block)
            .pattern(r"(%27)|(')|(--)|(%23)")
            .tags(&["sqli"])
            .build()
            .unwrap();

        assert_eq!(rule.id, 942100);
        assert_eq!(rule.category, ThreatCategory::SqlInjection);
        assert_eq!(rule.severity, Severity::High);
        assert!(rule.is_blocking());
        assert!(rule.matches("' OR 1=1 --"));
        assert!(!rule.matches("plain text"));
    }

    #[test]
    fn test_patterns_are_case_insensitive() {
        let rule = RuleBuilder::new(941100, "XSS Attack")
            .pattern(r"<script>|javascript:")
            .build()
            .unwrap();

        assert!(rule.matches("<SCRIPT>alert(1)</SCRIPT>"));
        assert!(rule.matches("JavaScript:void(0)"));
    }

    #[test]
    fn test_literal_pattern_is_escaped() {
        let rule = RuleBuilder::new(990001, "Suspicious Token: exec(")
            .literal("exec(")
            .build()
            .unwrap();

        assert!(rule.matches("exec(cmd)"));
        assert!(!rule.matches("execute"));
        assert_eq!(rule.action, RuleAction::Log);
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let result = RuleBuilder::new(1, "broken").pattern("(unclosed").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Severity::High.to_string(), "high");
        assert_eq!(RuleAction::Block.to_string(), "block");
        assert_eq!(ThreatCategory::SqlInjection.to_string(), "SQL Injection");
    }
}
