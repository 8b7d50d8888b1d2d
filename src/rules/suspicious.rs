//! Suspicious Token Rules
//!
//! Literal tokens that are worth recording but not blocking on their own.
//! Built from the configured token list; each token is matched verbatim.

use crate::rules::{Rule, RuleAction, RuleBuilder, Severity, ThreatCategory};
use anyhow::Result;

/// First rule ID of the suspicious-token range
pub const RULE_ID_BASE: u32 = 990000;

/// Default token list
pub const DEFAULT_TOKENS: &[&str] = &[
    "<script>",
    "javascript:",
    "DROP TABLE",
    "UNION SELECT",
    "1=1",
    "OR 1=1",
    "exec(",
    "eval(",
    "base64_decode",
];

pub fn rules(tokens: &[String]) -> Result<Vec<Rule>> {
    tokens
        .iter()
        .filter(|t| !t.trim().is_empty())
        .enumerate()
        .map(|(i, token)| {
            let rule = RuleBuilder::new(
                RULE_ID_BASE + i as u32 + 1,
                &format!("Suspicious Token: {}", token),
            )
            .description("Configured suspicious token")
            .category(ThreatCategory::Suspicious)
            .severity(Severity::Medium)
            .action(RuleAction::Log)
            .literal(token)
            .tags(&["suspicious"])
            .build()?;
            Ok(rule)
        })
        .collect()
}
