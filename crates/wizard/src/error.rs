use formflow_core::RuleDocError;
use formflow_eval::EvalError;

/// Errors raised by a [`FileSource`](crate::source::FileSource).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("form or rule file not found: {id}")]
    NotFound { id: String },

    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },

    /// The form file is not valid JSON, or not a JSON object.
    #[error("invalid form document '{id}': {message}")]
    InvalidForm { id: String, message: String },

    #[error(transparent)]
    Rules(#[from] RuleDocError),
}

/// Errors surfaced by the wizard to its caller.
///
/// Per-rule evaluation failures and invalid fields are not errors: the
/// former are reported in the rule run, the latter as validation statuses.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    /// A step named by the schema (or by a `next` link) does not exist.
    #[error("step schema not found: {step}")]
    MissingStepSchema { step: String },

    /// The schema document is structurally unusable.
    #[error("malformed form schema: {message}")]
    MalformedSchema { message: String },

    /// A field address does not resolve to a field in the schema.
    #[error("field not found: {step}#{key}")]
    FieldNotFound { step: String, key: String },

    /// The session already reached `Submitted` or `Abandoned`.
    #[error("wizard session is closed ({phase})")]
    SessionClosed { phase: String },

    #[error("invalid countdown: {message}")]
    InvalidCountdown { message: String },

    /// There is no earlier step to go back to.
    #[error("already at the first step")]
    AtFirstStep,

    /// A background task was dropped before reporting its result.
    #[error("background task did not complete: {message}")]
    Background { message: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    RuleDoc(#[from] RuleDocError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl WizardError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        WizardError::MalformedSchema {
            message: message.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
