use std::fmt;

/// Separator between step name and field key in a field address.
pub const ADDRESS_SEPARATOR: char = '#';

/// `step1` + `first_name` -> `step1#first_name`.
pub fn field_address(step: &str, key: &str) -> String {
    format!("{step}{ADDRESS_SEPARATOR}{key}")
}

/// Split an address back into `(step, key)`.
pub fn split_address(address: &str) -> Option<(&str, &str)> {
    address.split_once(ADDRESS_SEPARATOR)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    /// A required field holds no value. Recomputed on every refresh.
    RequiredFieldMissing,
    /// A verdict reported by the widget itself (regex, range, ...).
    Widget(String),
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::RequiredFieldMissing => f.write_str("required field missing"),
            ValidationReason::Widget(msg) => f.write_str(msg),
        }
    }
}

/// Latest validation verdict for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationStatus {
    pub field_address: String,
    pub valid: bool,
    pub reason: Option<ValidationReason>,
}

impl ValidationStatus {
    pub fn valid(field_address: impl Into<String>) -> Self {
        ValidationStatus {
            field_address: field_address.into(),
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(field_address: impl Into<String>, reason: ValidationReason) -> Self {
        ValidationStatus {
            field_address: field_address.into(),
            valid: false,
            reason: Some(reason),
        }
    }

    pub fn required_missing(field_address: impl Into<String>) -> Self {
        Self::invalid(field_address, ValidationReason::RequiredFieldMissing)
    }

    pub fn is_required_missing(&self) -> bool {
        self.reason == Some(ValidationReason::RequiredFieldMissing)
    }

    /// Step part of the address.
    pub fn step(&self) -> Option<&str> {
        split_address(&self.field_address).map(|(step, _)| step)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
