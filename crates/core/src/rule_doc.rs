//! Rule document decoding.
//!
//! A rule document is a stream of YAML blocks separated by `---`, one rule
//! per block:
//!
//! ```text
//! ---
//! name: step1_last_name
//! description: last_name
//! priority: 1
//! condition: "step1_first_Name.equalsIgnoreCase('Doe')"
//! actions:
//!     - "calculation = 1"
//! ```
//!
//! Decoding is purely structural: condition and action text is carried as
//! written and compiled later by the evaluator.

use serde::{Deserialize, Serialize};

use crate::error::RuleDocError;

/// Priority assigned to blocks that do not declare one. Sorts after every
/// explicitly prioritised rule.
pub const DEFAULT_PRIORITY: u32 = 2_147_483_646;

/// One rule as written in a rule document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub description: String,
    /// Lower value evaluates first.
    pub priority: u32,
    pub condition: String,
    pub actions: Vec<String>,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        RuleSpec {
            name: name.into(),
            description: String::new(),
            priority: DEFAULT_PRIORITY,
            condition: condition.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }
}

/// Raw block shape. Unknown keys are dropped by serde.
#[derive(Debug, Deserialize)]
struct RawRuleBlock {
    name: Option<serde_yaml::Value>,
    description: Option<serde_yaml::Value>,
    priority: Option<serde_yaml::Value>,
    condition: Option<serde_yaml::Value>,
    actions: Option<serde_yaml::Value>,
}

/// Parse a rule document into its rules, in document order.
///
/// Empty and whitespace-only documents yield no rules.
pub fn parse(document: &str) -> Result<Vec<RuleSpec>, RuleDocError> {
    let mut rules: Vec<RuleSpec> = Vec::new();
    if document.trim().is_empty() {
        return Ok(rules);
    }

    for (idx, doc) in serde_yaml::Deserializer::from_str(document).enumerate() {
        let block = idx + 1;
        let value = serde_yaml::Value::deserialize(doc)
            .map_err(|e| RuleDocError::malformed(block, None, e.to_string()))?;
        if value.is_null() {
            continue;
        }
        if !value.is_mapping() {
            return Err(RuleDocError::malformed(
                block,
                None,
                "rule block must be a mapping of keys to values",
            ));
        }
        let raw: RawRuleBlock = serde_yaml::from_value(value)
            .map_err(|e| RuleDocError::malformed(block, None, e.to_string()))?;
        let rule = decode_block(block, raw)?;

        if rules.iter().any(|r| r.name == rule.name) {
            return Err(RuleDocError::malformed(
                block,
                Some(&rule.name),
                "duplicate rule name",
            ));
        }
        rules.push(rule);
    }

    Ok(rules)
}

fn decode_block(block: usize, raw: RawRuleBlock) -> Result<RuleSpec, RuleDocError> {
    let name = raw
        .name
        .as_ref()
        .and_then(scalar_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RuleDocError::malformed(block, None, "missing 'name'"))?;

    let condition = raw
        .condition
        .as_ref()
        .and_then(scalar_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RuleDocError::malformed(block, Some(&name), "missing 'condition'"))?;

    let description = raw
        .description
        .as_ref()
        .and_then(scalar_text)
        .unwrap_or_default();

    let priority = match &raw.priority {
        None | Some(serde_yaml::Value::Null) => DEFAULT_PRIORITY,
        Some(v) => decode_priority(v).ok_or_else(|| {
            RuleDocError::malformed(
                block,
                Some(&name),
                format!("priority must be a non-negative integer, got {:?}", v),
            )
        })?,
    };

    let actions = match &raw.actions {
        None | Some(serde_yaml::Value::Null) => Vec::new(),
        Some(serde_yaml::Value::Sequence(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let text = scalar_text(item).ok_or_else(|| {
                    RuleDocError::malformed(block, Some(&name), "each action must be a string")
                })?;
                out.push(text.trim().to_string());
            }
            out
        }
        Some(single) => {
            let text = scalar_text(single).ok_or_else(|| {
                RuleDocError::malformed(block, Some(&name), "'actions' must be a list")
            })?;
            vec![text.trim().to_string()]
        }
    };

    Ok(RuleSpec {
        name,
        description,
        priority,
        condition,
        actions,
    })
}

fn decode_priority(v: &serde_yaml::Value) -> Option<u32> {
    match v {
        serde_yaml::Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        serde_yaml::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn scalar_text(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LAST_NAME_RULE: &str = "---\n\
        name: step1_last_name\n\
        description: last_name\n\
        priority: 1\n\
        condition: \"step1_first_Name.equalsIgnoreCase('Doe')\"\n\
        actions:\n    - \" calculation = 1\"";

    #[test]
    fn parse_single_rule() {
        let rules = parse(LAST_NAME_RULE).unwrap();
        assert_eq!(rules.len(), 1);
        let r = &rules[0];
        assert_eq!(r.name, "step1_last_name");
        assert_eq!(r.description, "last_name");
        assert_eq!(r.priority, 1);
        assert_eq!(r.condition, "step1_first_Name.equalsIgnoreCase('Doe')");
        assert_eq!(r.actions, vec!["calculation = 1"]);
    }

    #[test]
    fn parse_is_deterministic() {
        assert_eq!(parse(LAST_NAME_RULE).unwrap(), parse(LAST_NAME_RULE).unwrap());
    }

    #[test]
    fn parse_multiple_blocks_in_document_order() {
        let doc = r#"
name: second
priority: 2
condition: "true"
---
name: first
priority: 1
condition: "a == 1"
actions:
  - "x = 1"
  - "y = x + 1"
---
"#;
        let rules = parse(doc).unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(rules[1].actions, vec!["x = 1", "y = x + 1"]);
    }

    #[test]
    fn parse_empty_and_whitespace_documents() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   \n\t\n").unwrap().is_empty());
    }

    #[test]
    fn parse_defaults() {
        let rules = parse("name: r\ncondition: \"a == 1\"\n").unwrap();
        assert_eq!(rules[0].description, "");
        assert_eq!(rules[0].priority, DEFAULT_PRIORITY);
        assert!(rules[0].actions.is_empty());
    }

    #[test]
    fn parse_ignores_unknown_keys() {
        let doc = "name: r\ncondition: \"true\"\nowner: clinic\ntags: [a, b]\n";
        let rules = parse(doc).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "r");
    }

    #[test]
    fn parse_missing_name() {
        let err = parse("condition: \"true\"\n").unwrap_err();
        match err {
            RuleDocError::MalformedRuleDocument { block, rule, message } => {
                assert_eq!(block, 1);
                assert_eq!(rule, None);
                assert!(message.contains("name"));
            }
        }
    }

    #[test]
    fn parse_missing_condition() {
        let err = parse("name: r\nactions:\n  - \"x = 1\"\n").unwrap_err();
        match err {
            RuleDocError::MalformedRuleDocument { rule, message, .. } => {
                assert_eq!(rule.as_deref(), Some("r"));
                assert!(message.contains("condition"));
            }
        }
    }

    #[test]
    fn parse_negative_priority_rejected() {
        let err = parse("name: r\npriority: -1\ncondition: \"true\"\n").unwrap_err();
        assert!(matches!(err, RuleDocError::MalformedRuleDocument { .. }));
    }

    #[test]
    fn parse_non_numeric_priority_rejected() {
        let err = parse("name: r\npriority: high\ncondition: \"true\"\n").unwrap_err();
        assert!(matches!(err, RuleDocError::MalformedRuleDocument { .. }));
    }

    #[test]
    fn parse_fractional_priority_rejected() {
        let err = parse("name: r\npriority: 1.5\ncondition: \"true\"\n").unwrap_err();
        assert!(matches!(err, RuleDocError::MalformedRuleDocument { .. }));
    }

    #[test]
    fn parse_duplicate_name_rejected() {
        let doc = "name: r\ncondition: \"true\"\n---\nname: r\ncondition: \"false\"\n";
        let err = parse(doc).unwrap_err();
        match err {
            RuleDocError::MalformedRuleDocument { block, message, .. } => {
                assert_eq!(block, 2);
                assert!(message.contains("duplicate"));
            }
        }
    }

    #[test]
    fn parse_rejects_non_mapping_block() {
        let err = parse("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, RuleDocError::MalformedRuleDocument { .. }));
    }

    #[test]
    fn parse_invalid_yaml_names_block() {
        let doc = "name: a\ncondition: \"true\"\n---\nname: b\nactions: [\"x = 1\"\n";
        match parse(doc).unwrap_err() {
            RuleDocError::MalformedRuleDocument { block, rule, .. } => {
                assert_eq!(block, 2);
                assert_eq!(rule, None);
            }
        }
    }

    #[test]
    fn parse_does_not_compile_expressions() {
        // Garbage condition text is carried through untouched.
        let rules = parse("name: r\ncondition: \"((( ==\"\n").unwrap();
        assert_eq!(rules[0].condition, "((( ==");
    }

    #[test]
    fn builder_helpers() {
        let r = RuleSpec::new("r", "a == 1")
            .with_priority(3)
            .with_description("d")
            .with_action("x = 1");
        assert_eq!(r.priority, 3);
        assert_eq!(r.description, "d");
        assert_eq!(r.actions, vec!["x = 1"]);
    }
}
