//! Rule engine behaviour over parsed rule documents.
//!
//! Each test starts from YAML rule text, the same input the wizard loads
//! from disk, and checks ordering, isolation of the caller's environment,
//! and tolerance of per-rule failures.

use formflow_core::rule_doc;
use formflow_eval::{Environment, EvalError, RuleSet, Value};
use rust_decimal::Decimal;

// ──────────────────────────────────────────────
// Test helpers
// ──────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

const VITALS_RULES: &str = r#"
---
name: bmi_category
description: classify bmi
priority: 3
condition: "bmi >= 25"
actions:
  - "overweight = true"
---
name: compute_bmi
description: bmi from weight and height
priority: 1
condition: "step1_weight > 0 && step1_height > 0"
actions:
  - "bmi = step1_weight / (step1_height * step1_height)"
---
name: greeting
priority: 3
condition: "step1_first_Name.equalsIgnoreCase('doe')"
actions:
  - "greeting = 'Hello ' + step1_first_Name"
---
name: pregnancy_check
description: references a field from a later step
priority: 2
condition: "step3_pregnant == 'yes'"
actions:
  - "anc_visit = true"
"#;

fn vitals_env() -> Environment {
    let mut env = Environment::new();
    env.insert("step1_weight", Value::text("90"));
    // Text times Text is not numeric, so one operand must be a Number
    env.insert("step1_height", Value::Number(Decimal::new(15, 1)));
    env.insert("step1_first_Name", Value::text("Doe"));
    env
}

// ──────────────────────────────────────────────
// Ordering
// ──────────────────────────────────────────────

#[test]
fn evaluation_order_non_decreasing_priority_document_order_on_ties() {
    let specs = rule_doc::parse(VITALS_RULES).unwrap();
    let out = RuleSet::new(specs.clone()).run(&vitals_env());

    assert_eq!(
        out.evaluated,
        vec!["compute_bmi", "pregnancy_check", "bmi_category", "greeting"]
    );

    let priority = |name: &str| {
        specs
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.priority)
            .unwrap()
    };
    for pair in out.evaluated.windows(2) {
        assert!(priority(&pair[0]) <= priority(&pair[1]));
    }
}

// ──────────────────────────────────────────────
// Derived environment
// ──────────────────────────────────────────────

#[test]
fn derived_values_flow_to_later_rules() {
    init_tracing();
    let specs = rule_doc::parse(VITALS_RULES).unwrap();
    let out = formflow_eval::run(&specs, &vitals_env());

    assert_eq!(
        out.fired_rules,
        vec!["compute_bmi", "bmi_category", "greeting"]
    );
    assert_eq!(out.derived.get("bmi"), Some(&Value::number(40)));
    assert_eq!(out.derived.get("overweight"), Some(&Value::Bool(true)));
    assert_eq!(
        out.derived.get("greeting"),
        Some(&Value::text("Hello Doe"))
    );
}

#[test]
fn run_never_mutates_input_environment() {
    let specs = rule_doc::parse(VITALS_RULES).unwrap();
    let env = vitals_env();
    let before = env.clone();
    let set = RuleSet::new(specs);
    let first = set.run(&env);
    let second = set.run(&env);
    assert_eq!(env, before);
    assert_eq!(first, second);
}

// ──────────────────────────────────────────────
// Partial failure
// ──────────────────────────────────────────────

#[test]
fn missing_later_step_field_does_not_abort_run() {
    init_tracing();
    let specs = rule_doc::parse(VITALS_RULES).unwrap();
    let out = RuleSet::new(specs).run(&vitals_env());

    assert_eq!(out.failures.len(), 1);
    assert_eq!(out.failures[0].rule, "pregnancy_check");
    assert_eq!(
        out.failures[0].error,
        EvalError::UnboundVariable {
            name: "step3_pregnant".to_string()
        }
    );
    assert!(!out.has_fired("pregnancy_check"));
    assert!(out.has_fired("greeting"));
}

#[test]
fn type_mismatch_is_reported_and_skipped() {
    let doc = r#"
name: bad_compare
priority: 1
condition: "step1_first_Name > 3"
---
name: still_runs
priority: 2
condition: "true"
actions:
  - "done = true"
"#;
    let specs = rule_doc::parse(doc).unwrap();
    let out = RuleSet::new(specs).run(&vitals_env());
    assert!(matches!(
        out.failures[0].error,
        EvalError::TypeMismatch { .. }
    ));
    assert_eq!(out.fired_rules, vec!["still_runs"]);
}

#[test]
fn uncompilable_rule_does_not_block_others() {
    let doc = r#"
name: broken
priority: 1
condition: "step1_weight >"
---
name: fine
priority: 1
condition: "step1_weight == 90"
actions:
  - "heavy = true"
"#;
    let specs = rule_doc::parse(doc).unwrap();
    let out = RuleSet::new(specs).run(&vitals_env());
    assert!(matches!(out.failures[0].error, EvalError::Syntax(_)));
    assert_eq!(out.fired_rules, vec!["fine"]);
}
