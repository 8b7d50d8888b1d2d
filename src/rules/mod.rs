//! Pattern Catalog
//!
//! The immutable, ordered set of detection rules. Firewall rules come first
//! in their fixed order, followed by the suspicious-token class. Loaded
//! once when the monitor is constructed.

pub mod rule;

pub mod firewall;
pub mod suspicious;

pub use rule::{Rule, RuleAction, RuleBuilder, Severity, ThreatCategory};

use crate::config::{DetectionConfig, RuleSelector};
use anyhow::{Context, Result};

/// Ordered, immutable rule catalog
#[derive(Debug, Clone)]
pub struct PatternCatalog {
    rules: Vec<Rule>,
}

impl PatternCatalog {
    /// Load the catalog described by `config`
    pub fn load(config: &DetectionConfig) -> Result<Self> {
        let mut rules = firewall::rules(config).context("failed to compile firewall rules")?;
        rules.extend(
            suspicious::rules(&config.suspicious_patterns)
                .context("failed to compile suspicious token rules")?,
        );

        Ok(Self {
            rules: filter_rules(&rules, &config.disabled_rules),
        })
    }

    /// Build a catalog from an explicit rule list, keeping its order
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if the catalog holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Get rule by ID
    pub fn get(&self, id: u32) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Get rules by category
    pub fn by_category(&self, category: ThreatCategory) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.category == category)
            .collect()
    }
}

/// Drop rules matched by any disabled selector, preserving order
pub fn filter_rules(rules: &[Rule], disabled: &[RuleSelector]) -> Vec<Rule> {
    rules
        .iter()
        .filter(|rule| !disabled.iter().any(|s| s.matches(rule.id, &rule.tags)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_default_catalog() {
        let catalog = PatternCatalog::load(&DetectionConfig::default()).unwrap();
        assert_eq!(catalog.len(), 6 + suspicious::DEFAULT_TOKENS.len());

        // Firewall rules come before suspicious tokens
        assert_eq!(catalog.rules()[0].name, "SQL Injection");
        assert_eq!(catalog.rules()[6].category, ThreatCategory::Suspicious);
    }

    #[test]
    fn test_by_category() {
        let catalog = PatternCatalog::load(&DetectionConfig::default()).unwrap();
        assert_eq!(catalog.by_category(ThreatCategory::Xss).len(), 1);
        assert_eq!(
            catalog.by_category(ThreatCategory::Suspicious).len(),
            suspicious::DEFAULT_TOKENS.len()
        );
        assert!(catalog.get(942100).is_some());
    }

    #[test]
    fn test_disabled_selectors() {
        let config = DetectionConfig {
            disabled_rules: vec![
                RuleSelector::Id(930100),
                RuleSelector::Pattern("@suspicious".to_string()),
            ],
            ..Default::default()
        };
        let catalog = PatternCatalog::load(&config).unwrap();

        assert_eq!(catalog.len(), 5);
        assert!(catalog.get(930100).is_none());
        assert!(catalog.by_category(ThreatCategory::Suspicious).is_empty());
    }

    #[test]
    fn test_invalid_custom_token_is_escaped() {
        let config = DetectionConfig {
            suspicious_patterns: vec!["((".to_string()],
            ..Default::default()
        };
        let catalog = PatternCatalog::load(&config).unwrap();
        assert_eq!(catalog.by_category(ThreatCategory::Suspicious).len(), 1);
    }
}
