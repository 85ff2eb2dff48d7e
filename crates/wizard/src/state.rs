//! Mutable per-session wizard state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use time::OffsetDateTime;

use crate::status::{ValidationStatus, ADDRESS_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardPhase {
    Active,
    Submitted,
    Abandoned,
}

impl WizardPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WizardPhase::Active)
    }
}

impl fmt::Display for WizardPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardPhase::Active => f.write_str("active"),
            WizardPhase::Submitted => f.write_str("submitted"),
            WizardPhase::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Session state, owned by exactly one [`Wizard`](crate::wizard::Wizard).
///
/// `invalid_fields` is always the set of addresses whose status in
/// `statuses` is invalid; both change only through [`record`](Self::record)
/// and [`clear`](Self::clear).
#[derive(Debug, Clone)]
pub struct WizardState {
    pub current_step: String,
    /// Steps left behind by forward moves, most recent last.
    pub step_history: Vec<String>,
    pub phase: WizardPhase,
    pub countdown_deadline: Option<OffsetDateTime>,
    invalid_fields: BTreeSet<String>,
    statuses: BTreeMap<String, ValidationStatus>,
}

impl WizardState {
    pub fn new(first_step: impl Into<String>) -> Self {
        WizardState {
            current_step: first_step.into(),
            step_history: Vec::new(),
            phase: WizardPhase::Active,
            countdown_deadline: None,
            invalid_fields: BTreeSet::new(),
            statuses: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, status: ValidationStatus) {
        if status.valid {
            self.invalid_fields.remove(&status.field_address);
        } else {
            self.invalid_fields.insert(status.field_address.clone());
        }
        self.statuses.insert(status.field_address.clone(), status);
    }

    pub fn clear(&mut self, address: &str) -> Option<ValidationStatus> {
        self.invalid_fields.remove(address);
        self.statuses.remove(address)
    }

    pub fn status(&self, address: &str) -> Option<&ValidationStatus> {
        self.statuses.get(address)
    }

    pub fn invalid_fields(&self) -> &BTreeSet<String> {
        &self.invalid_fields
    }

    /// Invalid addresses belonging to `step`, in address order.
    pub fn invalid_under(&self, step: &str) -> Vec<String> {
        let prefix = format!("{step}{ADDRESS_SEPARATOR}");
        self.invalid_fields
            .iter()
            .filter(|a| a.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
