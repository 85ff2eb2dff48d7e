//! Form-level configuration read from the top level of a form document.

use serde::{Deserialize, Serialize};

/// Settings that sit beside the `stepN` objects in a form document.
///
/// Unknown top-level keys (including the steps themselves) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    /// Whether invalid fields block advancement. Absent means yes.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub validate_on_submit: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub encounter_type: Option<String>,
    /// Declared number of steps, informational only.
    #[serde(default, deserialize_with = "lenient_string")]
    pub count: Option<String>,
    /// Countdown length used when a countdown field declares none.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub countdown_seconds: Option<u64>,
}

impl FormConfig {
    pub fn from_json(form: &serde_json::Value) -> Self {
        // Settings decode leniently one by one; only a non-object form lands
        // in the fallback.
        serde_json::from_value(form.clone()).unwrap_or_else(|err| {
            tracing::warn!(%err, "ignoring unreadable form configuration");
            FormConfig::default()
        })
    }

    /// Missing configuration fails closed: validation is required.
    pub fn validate_on_submit(&self) -> bool {
        self.validate_on_submit.unwrap_or(true)
    }
}

/// Accepts `true`, `"true"`, `false`, `"false"` (any case) and null.
fn lenient_bool<'de, D>(d: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// `count` appears as both `"3"` and `3` in form files. Anything else is
/// dropped.
fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Non-negative integer as a number or numeric string.
fn lenient_u64<'de, D>(d: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_on_submit_defaults_to_required() {
        let cfg = FormConfig::from_json(&json!({ "step1": {} }));
        assert_eq!(cfg.validate_on_submit, None);
        assert!(cfg.validate_on_submit());
    }

    #[test]
    fn validate_on_submit_explicit() {
        assert!(FormConfig::from_json(&json!({ "validate_on_submit": true })).validate_on_submit());
        assert!(!FormConfig::from_json(&json!({ "validate_on_submit": false })).validate_on_submit());
        assert!(!FormConfig::from_json(&json!({ "validate_on_submit": "False" })).validate_on_submit());
    }

    #[test]
    fn unreadable_flag_fails_closed() {
        let cfg = FormConfig::from_json(&json!({ "validate_on_submit": "maybe" }));
        assert!(cfg.validate_on_submit());
    }

    #[test]
    fn reads_pass_through_settings() {
        let cfg = FormConfig::from_json(&json!({
            "count": 3,
            "encounter_type": "ANC",
            "countdown_seconds": 120,
            "step1": { "title": "Start" }
        }));
        assert_eq!(cfg.count.as_deref(), Some("3"));
        assert_eq!(cfg.encounter_type.as_deref(), Some("ANC"));
        assert_eq!(cfg.countdown_seconds, Some(120));
    }

    #[test]
    fn bad_setting_only_drops_itself() {
        let cfg = FormConfig::from_json(&json!({
            "validate_on_submit": false,
            "encounter_type": { "code": 5 },
            "countdown_seconds": -3
        }));
        assert!(!cfg.validate_on_submit());
        assert_eq!(cfg.encounter_type, None);
        assert_eq!(cfg.countdown_seconds, None);

        let cfg = FormConfig::from_json(&json!({
            "validate_on_submit": "false",
            "encounter_type": 5,
            "countdown_seconds": "120"
        }));
        assert!(!cfg.validate_on_submit());
        assert_eq!(cfg.encounter_type.as_deref(), Some("5"));
        assert_eq!(cfg.countdown_seconds, Some(120));
    }
}
