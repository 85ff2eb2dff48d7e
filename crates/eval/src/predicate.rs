//! Expression evaluator.
//!
//! Walks a compiled [`Expr`] tree against an [`Environment`]. Logical nodes
//! short-circuit, so the right operand of a decided `and`/`or` is never
//! evaluated and cannot raise `UnboundVariable`.

use formflow_core::{Expr, Literal};

use crate::numeric;
use crate::types::{Environment, EvalError, Value};

/// Evaluate an expression tree against an environment.
pub fn eval_expr(expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(lit) => eval_literal(lit),

        Expr::Var(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnboundVariable { name: name.clone() }),

        Expr::Not(inner) => {
            let v = eval_expr(inner, env)?;
            Ok(Value::Bool(!logical_operand(&v, "not")?))
        }

        Expr::Neg(inner) => numeric::negate(&eval_expr(inner, env)?),

        Expr::And(left, right) => {
            if !logical_operand(&eval_expr(left, env)?, "and")? {
                return Ok(Value::Bool(false));
            }
            let r = logical_operand(&eval_expr(right, env)?, "and")?;
            Ok(Value::Bool(r))
        }

        Expr::Or(left, right) => {
            if logical_operand(&eval_expr(left, env)?, "or")? {
                return Ok(Value::Bool(true));
            }
            let r = logical_operand(&eval_expr(right, env)?, "or")?;
            Ok(Value::Bool(r))
        }

        Expr::Compare { op, left, right } => {
            let l = eval_expr(left, env)?;
            let r = eval_expr(right, env)?;
            Ok(Value::Bool(numeric::compare_values(&l, &r, *op)?))
        }

        Expr::Arith { op, left, right } => {
            let l = eval_expr(left, env)?;
            let r = eval_expr(right, env)?;
            numeric::eval_arith(&l, &r, *op)
        }

        Expr::Call {
            receiver,
            method,
            args,
        } => {
            let recv = eval_expr(receiver, env)?;
            let mut arg_vals = Vec::with_capacity(args.len());
            for a in args {
                arg_vals.push(eval_expr(a, env)?);
            }
            call_method(&recv, method, &arg_vals)
        }
    }
}

fn eval_literal(lit: &Literal) -> Result<Value, EvalError> {
    match lit {
        Literal::Bool(b) => Ok(Value::Bool(*b)),
        Literal::Text(s) => Ok(Value::Text(s.clone())),
        Literal::Number(n) => {
            numeric::parse_decimal(n)
                .map(Value::Number)
                .ok_or_else(|| EvalError::Arithmetic {
                    message: format!("numeric literal '{}' out of range", n),
                })
        }
    }
}

fn logical_operand(v: &Value, op: &str) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(EvalError::mismatch(
            op,
            format!("expected Bool, got {}", other.type_name()),
        )),
    }
}

// ──────────────────────────────────────────────
// Text methods
// ──────────────────────────────────────────────

fn call_method(recv: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let expected = match method {
        "equalsIgnoreCase" | "equals" | "contains" | "startsWith" => 1,
        "isEmpty" => 0,
        _ => {
            return Err(EvalError::UnknownMethod {
                method: method.to_string(),
            })
        }
    };
    if args.len() != expected {
        return Err(EvalError::Arity {
            method: method.to_string(),
            expected,
            got: args.len(),
        });
    }

    let s = text_operand(recv, method, "receiver")?;
    let result = match method {
        "isEmpty" => s.is_empty(),
        _ => {
            let arg = text_operand(&args[0], method, "argument")?;
            match method {
                "equalsIgnoreCase" => s.to_lowercase() == arg.to_lowercase(),
                "equals" => s == arg,
                "contains" => s.contains(arg),
                _ => s.starts_with(arg),
            }
        }
    };
    Ok(Value::Bool(result))
}

fn text_operand<'v>(v: &'v Value, method: &str, role: &str) -> Result<&'v str, EvalError> {
    match v {
        Value::Text(s) => Ok(s),
        other => Err(EvalError::mismatch(
            method,
            format!("{} must be Text, got {}", role, other.type_name()),
        )),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_core::parse_expr;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.insert("step1_first_Name", Value::text("doe"));
        env.insert("step1_age", Value::number(30));
        env.insert("step1_weight", Value::text("70"));
        env.insert("flag", Value::Bool(true));
        env
    }

    fn eval(src: &str) -> Result<Value, EvalError> {
        eval_expr(&parse_expr(src).unwrap(), &env())
    }

    #[test]
    fn equals_ignore_case() {
        assert_eq!(
            eval("step1_first_Name.equalsIgnoreCase('Doe')").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval("step1_first_Name.equals('Doe')").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn text_methods() {
        assert_eq!(eval("step1_first_Name.contains('o')").unwrap(), Value::Bool(true));
        assert_eq!(eval("step1_first_Name.startsWith('x')").unwrap(), Value::Bool(false));
        assert_eq!(eval("step1_first_Name.isEmpty()").unwrap(), Value::Bool(false));
        assert_eq!(eval("''.isEmpty()").unwrap(), Value::Bool(true));
    }

    #[test]
    fn method_errors() {
        assert!(matches!(
            eval("step1_first_Name.length()").unwrap_err(),
            EvalError::UnknownMethod { .. }
        ));
        assert!(matches!(
            eval("step1_first_Name.equals()").unwrap_err(),
            EvalError::Arity { expected: 1, got: 0, .. }
        ));
        assert!(matches!(
            eval("step1_age.equals('30')").unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn unbound_variable() {
        match eval("missing == 1").unwrap_err() {
            EvalError::UnboundVariable { name } => assert_eq!(name, "missing"),
            other => panic!("expected UnboundVariable, got {:?}", other),
        }
    }

    #[test]
    fn and_short_circuits_unbound_right() {
        assert_eq!(eval("false && missing == 1").unwrap(), Value::Bool(false));
        assert_eq!(eval("flag or missing").unwrap(), Value::Bool(true));
        assert!(eval("flag && missing").is_err());
    }

    #[test]
    fn logical_operands_must_be_bool() {
        assert!(matches!(
            eval("step1_age && flag").unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
        assert!(matches!(
            eval("!step1_first_Name").unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn numeric_comparison_and_coercion() {
        assert_eq!(eval("step1_age >= 18").unwrap(), Value::Bool(true));
        assert_eq!(eval("step1_weight > 65.5").unwrap(), Value::Bool(true));
        assert_eq!(eval("step1_age == -30").unwrap(), Value::Bool(false));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("step1_age * 2 + 1").unwrap(), Value::number(61));
        assert_eq!(eval("-(step1_age) + 1").unwrap(), Value::number(-29));
        assert!(matches!(
            eval("step1_age / 0").unwrap_err(),
            EvalError::Arithmetic { .. }
        ));
    }

    #[test]
    fn not_and_precedence() {
        assert_eq!(
            eval("not step1_age < 18 and flag").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval("!(flag || false)").unwrap(), Value::Bool(false));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let e = parse_expr("step1_age * 3 > 50 && step1_first_Name.equalsIgnoreCase('DOE')")
            .unwrap();
        let env = env();
        assert_eq!(eval_expr(&e, &env).unwrap(), eval_expr(&e, &env).unwrap());
    }
}
