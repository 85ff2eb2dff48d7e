//! formflow-wizard: multi-step form navigation.
//!
//! A [`FormSchema`] is read from a JSON form document; rule documents it
//! references are loaded through a [`FileSource`] and run by the
//! `formflow-eval` rule engine. The [`Wizard`] walks the steps, validating
//! required fields and driving an injected [`Presentation`].

pub mod config;
pub mod error;
pub mod executor;
pub mod navigator;
pub mod presentation;
pub mod schema;
pub mod source;
pub mod state;
pub mod status;
pub mod wizard;

pub use config::FormConfig;
pub use error::{SourceError, WizardError};
pub use executor::{BackgroundExecutor, CancelFlag, InlineExecutor, TokioExecutor};
pub use navigator::{create_values, extract_required_fields, ValueRecord};
pub use presentation::{CountdownAlarm, Presentation, SilentAlarm};
pub use schema::{FieldSpec, FieldType, FormSchema, OptionSpec, RequiredSpec, StepSpec};
pub use source::{DiskFileSource, FileSource, StaticFileSource};
pub use state::{WizardPhase, WizardState};
pub use status::{field_address, ValidationReason, ValidationStatus};
pub use wizard::{NextOutcome, PendingValidation, StepValidation, SubmitOutcome, Wizard, WizardDeps};
