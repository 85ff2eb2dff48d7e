//! Decimal arithmetic and value comparison.
//!
//! All arithmetic uses `rust_decimal::Decimal` with checked operations. No
//! `f64` anywhere in the evaluation path.
//!
//! The only implicit coercion: a `Text` operand whose trimmed content parses
//! as a decimal is read as a `Number` when the other operand is a `Number`.

use std::cmp::Ordering;
use std::str::FromStr;

use formflow_core::{ArithOp, CompareOp};
use rust_decimal::Decimal;

use crate::types::{EvalError, Value};

/// Parse a numeric literal exactly as written.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    Decimal::from_str(t).ok()
}

/// Read `v` as a number, allowing numeric text.
fn coerce_number(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(d) => Some(*d),
        Value::Text(s) => parse_decimal(s),
        Value::Bool(_) => None,
    }
}

/// Resolve a mixed Number/Text pair into two numbers, if the coercion rule
/// applies.
fn numeric_pair(left: &Value, right: &Value) -> Option<(Decimal, Decimal)> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Some((*l, *r)),
        (Value::Number(_), Value::Text(_)) | (Value::Text(_), Value::Number(_)) => {
            Some((coerce_number(left)?, coerce_number(right)?))
        }
        _ => None,
    }
}

fn apply_ordering(ord: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Neq => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Lte => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Gte => ord != Ordering::Less,
    }
}

/// Compare two values with the given operator.
///
/// Numbers support every operator. Text and Bool pairs support only `==`
/// and `!=`. Mixed kinds are a type mismatch unless the numeric-text rule
/// applies.
pub fn compare_values(left: &Value, right: &Value, op: CompareOp) -> Result<bool, EvalError> {
    if let Some((l, r)) = numeric_pair(left, right) {
        return Ok(apply_ordering(l.cmp(&r), op));
    }

    match (left, right) {
        (Value::Text(l), Value::Text(r)) => equality_only(l == r, op, "Text"),
        (Value::Bool(l), Value::Bool(r)) => equality_only(l == r, op, "Bool"),
        _ => Err(EvalError::mismatch(
            op.symbol(),
            format!(
                "cannot compare {} with {}",
                describe(left),
                describe(right)
            ),
        )),
    }
}

fn equality_only(equal: bool, op: CompareOp, kind: &str) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq => Ok(equal),
        CompareOp::Neq => Ok(!equal),
        other => Err(EvalError::mismatch(
            other.symbol(),
            format!("{kind} supports only == and !="),
        )),
    }
}

/// Apply an arithmetic operator.
pub fn eval_arith(left: &Value, right: &Value, op: ArithOp) -> Result<Value, EvalError> {
    if op == ArithOp::Add {
        if let (Value::Text(l), Value::Text(r)) = (left, right) {
            return Ok(Value::Text(format!("{l}{r}")));
        }
    }

    let (l, r) = numeric_pair(left, right).ok_or_else(|| {
        EvalError::mismatch(
            op.symbol(),
            format!(
                "cannot apply to {} and {}",
                describe(left),
                describe(right)
            ),
        )
    })?;

    let result = match op {
        ArithOp::Add => l.checked_add(r),
        ArithOp::Sub => l.checked_sub(r),
        ArithOp::Mul => l.checked_mul(r),
        ArithOp::Div | ArithOp::Rem if r.is_zero() => {
            return Err(EvalError::Arithmetic {
                message: format!("division by zero in '{}'", op.symbol()),
            })
        }
        ArithOp::Div => l.checked_div(r),
        ArithOp::Rem => l.checked_rem(r),
    };

    result.map(Value::Number).ok_or_else(|| EvalError::Arithmetic {
        message: format!("overflow in '{}'", op.symbol()),
    })
}

/// Unary minus.
pub fn negate(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Number(d) => Ok(Value::Number(-*d)),
        other => Err(EvalError::mismatch(
            "-",
            format!("cannot negate {}", describe(other)),
        )),
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::Text(s) => format!("Text '{}'", s),
        other => other.type_name().to_string(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
