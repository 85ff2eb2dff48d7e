//! formflow-eval: expression evaluation and the prioritised rule engine.
//!
//! Conditions and actions arrive as text (see `formflow-core`), are compiled
//! once, and are evaluated against an [`Environment`] of field values.
//! Evaluation never writes to the caller's environment: actions land in a
//! separate derived environment the caller can inspect or apply.

pub mod numeric;
pub mod predicate;
pub mod rules;
pub mod types;

pub use rules::{RuleFailure, RuleRun, RuleSet};
pub use types::{Environment, EvalError, Value};

use formflow_core::{Assignment, Expr};

/// Compile a condition or value expression.
pub fn compile(expr: &str) -> Result<Expr, EvalError> {
    Ok(formflow_core::parse_expr(expr)?)
}

/// Compile an action statement `variable = expression`.
pub fn compile_action(stmt: &str) -> Result<Assignment, EvalError> {
    Ok(formflow_core::parse_assignment(stmt)?)
}

/// Compile and evaluate `expr` against `env`.
pub fn evaluate(expr: &str, env: &Environment) -> Result<Value, EvalError> {
    let compiled = compile(expr)?;
    predicate::eval_expr(&compiled, env)
}

/// Execute one action statement, reading from `env` and writing the
/// assignment into `result`. `env` is never modified.
///
/// Returns the assigned variable name.
pub fn apply_action(
    stmt: &str,
    env: &Environment,
    result: &mut Environment,
) -> Result<String, EvalError> {
    let Assignment { target, value } = compile_action(stmt)?;
    let v = predicate::eval_expr(&value, env)?;
    result.insert(target.clone(), v);
    Ok(target)
}

/// Run `rules` against `env`. See [`RuleSet::run`].
pub fn run(rules: &[formflow_core::RuleSpec], env: &Environment) -> RuleRun {
    rules::run(rules, env)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_condition_text() {
        let mut env = Environment::new();
        env.insert("step1_first_Name", Value::text("DOE"));
        assert_eq!(
            evaluate("step1_first_Name.equalsIgnoreCase('Doe')", &env).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn evaluate_syntax_error() {
        let err = evaluate("a = 1", &Environment::new()).unwrap_err();
        match err {
            EvalError::Syntax(e) => assert_eq!(e.expr, "a = 1"),
            other => panic!("expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn apply_action_writes_result_only() {
        let mut env = Environment::new();
        env.insert("w", Value::number(10));
        let before = env.clone();
        let mut result = Environment::new();
        let target = apply_action("calc = w * 2", &env, &mut result).unwrap();
        assert_eq!(target, "calc");
        assert_eq!(result.get("calc"), Some(&Value::number(20)));
        assert_eq!(env, before);
    }

    #[test]
    fn apply_action_requires_assignment() {
        let mut result = Environment::new();
        assert!(apply_action("w * 2", &Environment::new(), &mut result).is_err());
        assert!(result.is_empty());
    }
}
