//! Prioritised rule evaluation.
//!
//! Rules run in ascending priority order, ties kept in document order. Each
//! rule sees the derived environment accumulated by the rules before it. A
//! rule that fails to compile or evaluate is reported and treated as not
//! fired; the run continues with the next rule.

use formflow_core::{parse_assignment, parse_expr, Assignment, Expr, RuleSpec};
use tracing::{debug, warn};

use crate::predicate::eval_expr;
use crate::types::{Environment, EvalError, Value};

/// A rule whose condition or actions could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule: String,
    pub error: EvalError,
}

/// Outcome of one rule-engine pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleRun {
    /// Every rule name in the order it was evaluated.
    pub evaluated: Vec<String>,
    /// Names of rules whose condition held and whose actions all applied.
    pub fired_rules: Vec<String>,
    /// Input environment plus every fired rule's assignments.
    pub derived: Environment,
    pub failures: Vec<RuleFailure>,
}

impl RuleRun {
    pub fn has_fired(&self, rule: &str) -> bool {
        self.fired_rules.iter().any(|r| r == rule)
    }

    /// Only the bindings the run added or changed.
    pub fn assignments(&self, input: &Environment) -> Environment {
        self.derived.diff_from(input)
    }
}

struct CompiledRule {
    spec: RuleSpec,
    compiled: Result<(Expr, Vec<Assignment>), EvalError>,
}

impl CompiledRule {
    fn compile(spec: RuleSpec) -> Self {
        let compiled = compile_rule(&spec);
        CompiledRule { spec, compiled }
    }
}

fn compile_rule(spec: &RuleSpec) -> Result<(Expr, Vec<Assignment>), EvalError> {
    let condition = parse_expr(&spec.condition)?;
    let actions = spec
        .actions
        .iter()
        .map(|a| parse_assignment(a).map_err(EvalError::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((condition, actions))
}

/// A sorted, compiled rule collection. Compiles once, runs many times.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.names())
            .finish()
    }
}

impl RuleSet {
    pub fn new(rules: Vec<RuleSpec>) -> Self {
        let mut set = RuleSet::default();
        set.add_rules(rules);
        set
    }

    /// Append rules (e.g. from another step's document) and re-sort.
    /// The sort is stable, so earlier-added rules win ties.
    pub fn add_rules(&mut self, rules: Vec<RuleSpec>) {
        self.rules
            .extend(rules.into_iter().map(CompiledRule::compile));
        self.rules.sort_by_key(|r| r.spec.priority);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.spec.name.as_str()).collect()
    }

    pub fn specs(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter().map(|r| &r.spec)
    }

    /// Evaluate every rule against a private copy of `env`.
    pub fn run(&self, env: &Environment) -> RuleRun {
        let mut run = RuleRun {
            derived: env.clone(),
            ..RuleRun::default()
        };

        for rule in &self.rules {
            let name = &rule.spec.name;
            run.evaluated.push(name.clone());

            match eval_rule(rule, &run.derived) {
                Ok(Some(assigned)) => {
                    debug!(rule = %name, assignments = assigned.len(), "rule fired");
                    for (target, value) in assigned {
                        run.derived.insert(target, value);
                    }
                    run.fired_rules.push(name.clone());
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(rule = %name, %error, "rule failed, treated as not fired");
                    run.failures.push(RuleFailure {
                        rule: name.clone(),
                        error,
                    });
                }
            }
        }

        run
    }
}

/// Evaluate a single rule. Returns the assignments to apply if the condition
/// holds, `None` if it does not.
///
/// Actions see the effects of earlier actions of the same rule, but nothing
/// is written to `env` here, so a failing action discards the whole rule.
fn eval_rule(
    rule: &CompiledRule,
    env: &Environment,
) -> Result<Option<Vec<(String, Value)>>, EvalError> {
    let (condition, actions) = rule.compiled.as_ref().map_err(Clone::clone)?;

    let holds = eval_expr(condition, env)?.as_bool()?;
    if !holds {
        return Ok(None);
    }

    if actions.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let mut scratch = env.clone();
    let mut assigned = Vec::with_capacity(actions.len());
    for action in actions {
        let value = eval_expr(&action.value, &scratch)?;
        scratch.insert(action.target.clone(), value.clone());
        assigned.push((action.target.clone(), value));
    }
    Ok(Some(assigned))
}

/// One-shot convenience: sort, compile and run `rules` against `env`.
pub fn run(rules: &[RuleSpec], env: &Environment) -> RuleRun {
    RuleSet::new(rules.to_vec()).run(env)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, priority: u32, condition: &str, actions: &[&str]) -> RuleSpec {
        let mut r = RuleSpec::new(name, condition).with_priority(priority);
        for a in actions {
            r = r.with_action(*a);
        }
        r
    }

    fn name_env() -> Environment {
        let mut env = Environment::new();
        env.insert("step1_first_Name", Value::text("Doe"));
        env
    }

    #[test]
    fn fired_rule_writes_derived() {
        let rules = vec![rule(
            "step1_last_name",
            1,
            "step1_first_Name.equalsIgnoreCase('Doe')",
            &["calculation = 1"],
        )];
        let out = run(&rules, &name_env());
        assert_eq!(out.fired_rules, vec!["step1_last_name"]);
        assert_eq!(out.derived.get("calculation"), Some(&Value::number(1)));
        assert!(out.failures.is_empty());
        assert!(out.has_fired("step1_last_name"));
    }

    #[test]
    fn false_condition_does_not_fire() {
        let rules = vec![rule("r", 1, "step1_first_Name == 'Smith'", &["x = 1"])];
        let out = run(&rules, &name_env());
        assert!(out.fired_rules.is_empty());
        assert_eq!(out.derived, name_env());
    }

    #[test]
    fn evaluation_sorted_by_priority_stable_on_ties() {
        let rules = vec![
            rule("c", 5, "true", &[]),
            rule("a", 1, "true", &[]),
            rule("b", 5, "true", &[]),
            rule("d", 0, "true", &[]),
        ];
        let out = run(&rules, &Environment::new());
        assert_eq!(out.evaluated, vec!["d", "a", "c", "b"]);
    }

    #[test]
    fn later_rule_sees_earlier_assignment() {
        let rules = vec![
            rule("second", 2, "bmi > 20", &["flag = true"]),
            rule("first", 1, "true", &["bmi = w / 4"]),
        ];
        let mut env = Environment::new();
        env.insert("w", Value::number(100));
        let out = run(&rules, &env);
        assert_eq!(out.fired_rules, vec!["first", "second"]);
        assert_eq!(out.derived.get("flag"), Some(&Value::Bool(true)));
    }

    #[test]
    fn unbound_variable_is_partial_failure() {
        let rules = vec![
            rule("early", 1, "step2_weight > 10", &["x = 1"]),
            rule("late", 2, "true", &["y = 2"]),
        ];
        let out = run(&rules, &Environment::new());
        assert_eq!(out.fired_rules, vec!["late"]);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].rule, "early");
        assert!(matches!(
            out.failures[0].error,
            EvalError::UnboundVariable { .. }
        ));
    }

    #[test]
    fn failing_action_discards_rule_assignments() {
        let rules = vec![rule("r", 1, "true", &["a = 1", "b = missing + 1"])];
        let out = run(&rules, &Environment::new());
        assert!(out.fired_rules.is_empty());
        assert!(out.derived.get("a").is_none());
        assert_eq!(out.failures.len(), 1);
    }

    #[test]
    fn actions_chain_within_rule() {
        let rules = vec![rule("r", 1, "true", &["a = 2", "b = a * 3"])];
        let out = run(&rules, &Environment::new());
        assert_eq!(out.derived.get("b"), Some(&Value::number(6)));
    }

    #[test]
    fn syntax_error_reported_every_run() {
        let set = RuleSet::new(vec![rule("bad", 1, "a ==", &[])]);
        for _ in 0..2 {
            let out = set.run(&Environment::new());
            assert_eq!(out.failures.len(), 1);
            assert!(matches!(out.failures[0].error, EvalError::Syntax(_)));
        }
    }

    #[test]
    fn non_bool_condition_is_failure() {
        let out = run(&[rule("r", 1, "1 + 1", &[])], &Environment::new());
        assert!(matches!(
            out.failures[0].error,
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn run_does_not_mutate_input() {
        let env = name_env();
        let before = env.clone();
        let rules = vec![rule("r", 1, "true", &["step1_first_Name = 'Smith'"])];
        let out = run(&rules, &env);
        assert_eq!(env, before);
        assert_eq!(
            out.assignments(&env).get("step1_first_Name"),
            Some(&Value::text("Smith"))
        );
    }

    #[test]
    fn add_rules_resorts() {
        let mut set = RuleSet::new(vec![rule("b", 2, "true", &[])]);
        set.add_rules(vec![rule("a", 1, "true", &[])]);
        assert_eq!(set.names(), vec!["a", "b"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_rule_set() {
        let out = RuleSet::default().run(&name_env());
        assert!(out.evaluated.is_empty());
        assert_eq!(out.derived, name_env());
    }
}
