//! Runtime values, the variable environment, and evaluation errors.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;

use formflow_core::SyntaxError;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors that can occur while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The expression references a variable absent from the environment.
    #[error("unbound variable: {name}")]
    UnboundVariable { name: String },

    /// An operator or method was applied to incompatible value kinds.
    #[error("type mismatch in '{op}': {message}")]
    TypeMismatch { op: String, message: String },

    /// Division by zero or decimal overflow.
    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },

    /// A method call the grammar does not know.
    #[error("unknown method '{method}'")]
    UnknownMethod { method: String },

    /// A known method called with the wrong number of arguments.
    #[error("method '{method}' expects {expected} argument(s), got {got}")]
    Arity {
        method: String,
        expected: usize,
        got: usize,
    },

    /// The condition or action text does not parse.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl EvalError {
    pub(crate) fn mismatch(op: &str, message: impl Into<String>) -> Self {
        EvalError::TypeMismatch {
            op: op.to_string(),
            message: message.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A field or variable value. Numbers are `rust_decimal::Decimal`, never `f64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Number(Decimal),
    Text(String),
}

impl Value {
    /// Returns a human-readable kind name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
        }
    }

    /// Extracts a boolean or returns a type error.
    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::mismatch(
                "condition",
                format!("expected Bool, got {}", other.type_name()),
            )),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn number(n: impl Into<Decimal>) -> Self {
        Value::Number(n.into())
    }

    /// Convert a JSON scalar. Arrays, objects and null have no value form.
    pub fn from_json(v: &serde_json::Value) -> Option<Value> {
        match v {
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Number(n) => n.to_string().parse::<Decimal>().ok().map(Value::Number),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            // Decimal string form keeps the exact value
            Value::Number(d) => serde_json::Value::String(d.normalize().to_string()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(d) => write!(f, "{}", d.normalize()),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

// ──────────────────────────────────────────────
// Environment
// ──────────────────────────────────────────────

/// Variable name to value bindings for one evaluation pass.
///
/// Ordered by name so debug output and JSON export are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(pub BTreeMap<String, Value>);

impl Environment {
    pub fn new() -> Self {
        Environment(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Bindings present in `self` that are absent from or differ in `base`.
    pub fn diff_from(&self, base: &Environment) -> Environment {
        self.0
            .iter()
            .filter(|(k, v)| base.get(k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Environment(iter.into_iter().collect())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
