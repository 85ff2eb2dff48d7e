use thiserror::Error;

/// An expression that could not be tokenized or parsed.
///
/// `pos` is the character offset in `expr` where the problem was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error in '{expr}' at {pos}: {message}")]
pub struct SyntaxError {
    pub expr: String,
    pub pos: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(expr: &str, pos: usize, message: impl Into<String>) -> Self {
        SyntaxError {
            expr: expr.to_owned(),
            pos,
            message: message.into(),
        }
    }
}

/// Errors raised while decoding a rule document.
///
/// Any of these is fatal to loading that one document; rules loaded from
/// other documents are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleDocError {
    /// A block is not valid YAML, is missing a required key, has a bad
    /// priority, or reuses a name.
    #[error("malformed rule document (block {block}{}): {message}", rule_suffix(.rule))]
    MalformedRuleDocument {
        block: usize,
        rule: Option<String>,
        message: String,
    },
}

impl RuleDocError {
    pub fn malformed(block: usize, rule: Option<&str>, message: impl Into<String>) -> Self {
        RuleDocError::MalformedRuleDocument {
            block,
            rule: rule.map(str::to_owned),
            message: message.into(),
        }
    }
}

fn rule_suffix(rule: &Option<String>) -> String {
    match rule {
        Some(name) => format!(", rule '{}'", name),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display_names_rule() {
        let err = RuleDocError::malformed(2, Some("bmi"), "missing 'condition'");
        assert_eq!(
            err.to_string(),
            "malformed rule document (block 2, rule 'bmi'): missing 'condition'"
        );
    }

    #[test]
    fn malformed_display_without_rule() {
        let err = RuleDocError::malformed(1, None, "missing 'name'");
        assert_eq!(
            err.to_string(),
            "malformed rule document (block 1): missing 'name'"
        );
    }

    #[test]
    fn syntax_error_display() {
        let err = SyntaxError::new("a ==", 4, "unexpected end of expression");
        assert_eq!(
            err.to_string(),
            "syntax error in 'a ==' at 4: unexpected end of expression"
        );
    }
}
