//! formflow-core: rule documents and expression compilation.
//!
//! Turns the textual inputs of a form into structured values:
//!
//! - [`rule_doc::parse()`] -- YAML rule document to ordered [`RuleSpec`]s
//! - [`parse_expr()`] / [`parse_assignment()`] -- condition and action text
//!   to [`Expr`] / [`Assignment`] trees
//!
//! Nothing here evaluates; see `formflow-eval`.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod rule_doc;

// ── Convenience re-exports ───────────────────────────────────────────

pub use ast::{ArithOp, Assignment, CompareOp, Expr, Literal};
pub use error::{RuleDocError, SyntaxError};
pub use parser::{parse_assignment, parse_expr};
pub use rule_doc::{RuleSpec, DEFAULT_PRIORITY};
