//! Typed view of a JSON form document.
//!
//! A form document is a JSON object whose `stepN` keys hold the steps and
//! whose remaining top-level keys hold form configuration:
//!
//! ```text
//! {
//!   "count": "2",
//!   "validate_on_submit": true,
//!   "step1": { "title": "Client", "next": "step2", "fields": [ ... ] },
//!   "step2": { "title": "Vitals", "fields": [ ... ] }
//! }
//! ```
//!
//! Field objects keep every key the engine does not interpret in
//! `metadata`, so nothing from the source document is lost.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::FormConfig;
use crate::error::WizardError;

/// Prefix shared by the pass-through coding keys (`openmrs_entity`,
/// `openmrs_entity_id`, `openmrs_entity_parent`, ...).
pub const EXTERNAL_ATTRIBUTE_PREFIX: &str = "openmrs_entity";

/// Metadata key marking a field as carrying a countdown.
pub const COUNTDOWN_TIME_VALUE: &str = "countdown_time_value";
pub const COUNTDOWN_TIME_UNIT: &str = "countdown_time_unit";

// ──────────────────────────────────────────────
// Field types
// ──────────────────────────────────────────────

/// Widget type of a field. Unknown type strings are kept verbatim in
/// `Other` so newer forms still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    EditText,
    CheckBox,
    MultiSelectList,
    NativeRadio,
    ExtendedRadioButton,
    Spinner,
    DatePicker,
    TimePicker,
    ChooseImage,
    Countdown,
    ExpansionPanel,
    Label,
    Hidden,
    Other(String),
}

/// How a field's selections are encoded on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    /// Several options may be active at once.
    Multi,
    /// Exactly one option is active.
    Single,
    Scalar,
}

impl FieldType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "edit_text" => FieldType::EditText,
            "check_box" => FieldType::CheckBox,
            "multi_select_list" => FieldType::MultiSelectList,
            "native_radio" => FieldType::NativeRadio,
            "extended_radio_button" => FieldType::ExtendedRadioButton,
            "spinner" => FieldType::Spinner,
            "date_picker" => FieldType::DatePicker,
            "time_picker" => FieldType::TimePicker,
            "choose_image" => FieldType::ChooseImage,
            "countdown_timer" | "countdown" => FieldType::Countdown,
            "expansion_panel" => FieldType::ExpansionPanel,
            "label" => FieldType::Label,
            "hidden" => FieldType::Hidden,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::EditText => "edit_text",
            FieldType::CheckBox => "check_box",
            FieldType::MultiSelectList => "multi_select_list",
            FieldType::NativeRadio => "native_radio",
            FieldType::ExtendedRadioButton => "extended_radio_button",
            FieldType::Spinner => "spinner",
            FieldType::DatePicker => "date_picker",
            FieldType::TimePicker => "time_picker",
            FieldType::ChooseImage => "choose_image",
            FieldType::Countdown => "countdown",
            FieldType::ExpansionPanel => "expansion_panel",
            FieldType::Label => "label",
            FieldType::Hidden => "hidden",
            FieldType::Other(name) => name,
        }
    }

    pub fn selection_kind(&self) -> SelectionKind {
        match self {
            FieldType::CheckBox | FieldType::MultiSelectList => SelectionKind::Multi,
            FieldType::NativeRadio | FieldType::ExtendedRadioButton => SelectionKind::Single,
            _ => SelectionKind::Scalar,
        }
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        FieldType::from_name(&s)
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Required metadata
// ──────────────────────────────────────────────

/// When a field must carry a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredSpec {
    Never,
    Always,
    /// Required iff the named rule fired in the latest rule run.
    Rule(String),
}

impl RequiredSpec {
    /// Read `v_required` / `required` metadata in any of its shapes:
    /// `"true"`, `true`, `{"value": "true"}`, `{"rule": "name"}`.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Bool(true) => RequiredSpec::Always,
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => RequiredSpec::Always,
            Value::Object(obj) => {
                if let Some(rule) = obj.get("rule").and_then(Value::as_str) {
                    let rule = rule.trim();
                    if !rule.is_empty() {
                        return RequiredSpec::Rule(rule.to_string());
                    }
                }
                obj.get("value")
                    .map(RequiredSpec::from_json)
                    .unwrap_or(RequiredSpec::Never)
            }
            _ => RequiredSpec::Never,
        }
    }
}

// ──────────────────────────────────────────────
// Options and fields
// ──────────────────────────────────────────────

/// One selectable option of a choice field.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub key: String,
    pub text: String,
    /// For check boxes, `"true"` when the option is ticked.
    pub value: Option<String>,
    /// Pass-through coding identifiers, preserved verbatim.
    pub external_attributes: Map<String, Value>,
}

impl OptionSpec {
    pub fn from_json(v: &Value) -> Result<Self, WizardError> {
        let obj = v
            .as_object()
            .ok_or_else(|| WizardError::malformed("option must be a JSON object"))?;
        Ok(OptionSpec {
            key: text_of(obj.get("key")).unwrap_or_default(),
            text: text_of(obj.get("text")).unwrap_or_default(),
            value: text_of(obj.get("value")),
            external_attributes: external_attributes(obj),
        })
    }

    pub fn is_selected(&self) -> bool {
        self.value
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

/// One form field, possibly embedding a sub-form.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub key: String,
    pub field_type: FieldType,
    pub required: RequiredSpec,
    pub value: Option<Value>,
    pub options: Vec<OptionSpec>,
    /// Sub-form fields of a composite field such as an expansion panel.
    pub fields: Vec<FieldSpec>,
    pub external_attributes: Map<String, Value>,
    /// Every key not interpreted above.
    pub metadata: Map<String, Value>,
}

impl FieldSpec {
    pub fn from_json(v: &Value) -> Result<Self, WizardError> {
        let obj = v
            .as_object()
            .ok_or_else(|| WizardError::malformed("field must be a JSON object"))?;

        let key = text_of(obj.get("key")).unwrap_or_default();
        let field_type = FieldType::from_name(obj.get("type").and_then(Value::as_str).unwrap_or(""));
        let required = obj
            .get("v_required")
            .or_else(|| obj.get("required"))
            .map(RequiredSpec::from_json)
            .unwrap_or(RequiredSpec::Never);

        let options = match obj.get("options") {
            Some(Value::Array(items)) => items
                .iter()
                .map(OptionSpec::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        let fields = match obj.get("fields") {
            Some(Value::Array(items)) => parse_fields(items)
                .map_err(|e| WizardError::malformed(format!("in sub-form of '{}': {}", key, e)))?,
            _ => Vec::new(),
        };

        let metadata = obj
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    "key" | "type" | "v_required" | "required" | "value" | "options" | "fields"
                ) && !k.starts_with(EXTERNAL_ATTRIBUTE_PREFIX)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(FieldSpec {
            key,
            field_type,
            required,
            value: obj.get("value").filter(|v| !v.is_null()).cloned(),
            options,
            fields,
            external_attributes: external_attributes(obj),
            metadata,
        })
    }

    pub fn is_composite(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Countdown fields are typed `countdown` or carry a countdown value.
    pub fn is_countdown(&self) -> bool {
        self.field_type == FieldType::Countdown || self.metadata.contains_key(COUNTDOWN_TIME_VALUE)
    }

    /// Options a user has selected, in declaration order.
    pub fn selected_options(&self) -> Vec<&OptionSpec> {
        match self.field_type.selection_kind() {
            SelectionKind::Multi => {
                let listed = self.value_texts();
                self.options
                    .iter()
                    .filter(|o| o.is_selected() || listed.iter().any(|k| k == &o.key))
                    .collect()
            }
            SelectionKind::Single => {
                let current = self.value_texts();
                self.options
                    .iter()
                    .filter(|o| current.first().is_some_and(|k| k == &o.key))
                    .collect()
            }
            SelectionKind::Scalar => Vec::new(),
        }
    }

    /// True when the field holds no user-supplied value.
    pub fn is_empty(&self) -> bool {
        match self.field_type.selection_kind() {
            SelectionKind::Multi => self.selected_options().is_empty(),
            _ => self.value_texts().is_empty(),
        }
    }

    /// The field value as non-empty text items. Arrays contribute one item
    /// per scalar element.
    pub fn value_texts(&self) -> Vec<String> {
        let scalar = |v: &Value| text_of(Some(v)).filter(|s| !s.trim().is_empty());
        match &self.value {
            Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
            Some(v) => scalar(v).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Depth-first search of this field and its sub-form.
    pub fn find(&self, key: &str) -> Option<&FieldSpec> {
        if self.key == key {
            return Some(self);
        }
        self.fields.iter().find_map(|f| f.find(key))
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut FieldSpec> {
        if self.key == key {
            return Some(self);
        }
        self.fields.iter_mut().find_map(|f| f.find_mut(key))
    }
}

fn parse_fields(items: &[Value]) -> Result<Vec<FieldSpec>, WizardError> {
    items.iter().map(FieldSpec::from_json).collect()
}

// ──────────────────────────────────────────────
// Steps and forms
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub name: String,
    pub title: String,
    /// Identifier of the following step; empty on the last step.
    pub next: String,
    pub fields: Vec<FieldSpec>,
}

impl StepSpec {
    fn from_json(name: &str, v: &Value) -> Result<Self, WizardError> {
        let obj = v
            .as_object()
            .ok_or_else(|| WizardError::malformed(format!("step '{}' must be an object", name)))?;
        let fields = match obj.get("fields") {
            Some(Value::Array(items)) => parse_fields(items)
                .map_err(|e| WizardError::malformed(format!("in step '{}': {}", name, e)))?,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(WizardError::malformed(format!(
                    "'fields' of step '{}' must be an array",
                    name
                )))
            }
        };
        Ok(StepSpec {
            name: name.to_string(),
            title: text_of(obj.get("title")).unwrap_or_default(),
            next: text_of(obj.get("next"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            fields,
        })
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find_map(|f| f.find(key))
    }

    /// Every field of the step including sub-form fields, depth first.
    pub fn all_fields(&self) -> Vec<&FieldSpec> {
        fn walk<'a>(fields: &'a [FieldSpec], out: &mut Vec<&'a FieldSpec>) {
            for f in fields {
                out.push(f);
                walk(&f.fields, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.fields, &mut out);
        out
    }

    pub fn has_countdown(&self) -> bool {
        self.all_fields().iter().any(|f| f.is_countdown())
    }
}

/// A parsed form document.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSchema {
    /// Steps in document order.
    pub steps: Vec<StepSpec>,
    pub config: FormConfig,
}

impl FormSchema {
    pub fn from_json(form: &Value) -> Result<Self, WizardError> {
        let obj = form
            .as_object()
            .ok_or_else(|| WizardError::malformed("form document must be a JSON object"))?;
        let mut steps = Vec::new();
        for (k, v) in obj {
            if is_step_key(k) {
                steps.push(StepSpec::from_json(k, v)?);
            }
        }
        Ok(FormSchema {
            steps,
            config: FormConfig::from_json(form),
        })
    }

    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// `step1` when present, otherwise the first step in the document.
    pub fn first_step(&self) -> Option<&str> {
        self.step("step1")
            .or_else(|| self.steps.first())
            .map(|s| s.name.as_str())
    }

    pub fn field(&self, step: &str, key: &str) -> Option<&FieldSpec> {
        self.step(step).and_then(|s| s.field(key))
    }

    pub fn field_mut(&mut self, step: &str, key: &str) -> Option<&mut FieldSpec> {
        self.steps
            .iter_mut()
            .find(|s| s.name == step)
            .and_then(|s| s.fields.iter_mut().find_map(|f| f.find_mut(key)))
    }

    /// Names of rule files referenced anywhere in the form, first-seen order.
    ///
    /// Fields point at rule documents through `"rules-file"` entries nested
    /// under their `relevance`, `calculation` or `constraints` metadata.
    pub fn rule_files(&self) -> Vec<String> {
        fn scan(v: &Value, out: &mut Vec<String>) {
            match v {
                Value::Object(map) => {
                    for (k, inner) in map {
                        match (k.as_str(), inner) {
                            ("rules-file", Value::String(name)) => {
                                if !out.contains(name) {
                                    out.push(name.clone());
                                }
                            }
                            _ => scan(inner, out),
                        }
                    }
                }
                Value::Array(items) => items.iter().for_each(|i| scan(i, out)),
                _ => {}
            }
        }
        let mut out = Vec::new();
        for step in &self.steps {
            for field in step.all_fields() {
                for v in field.metadata.values() {
                    scan(v, &mut out);
                }
            }
        }
        out
    }
}

fn is_step_key(k: &str) -> bool {
    k.strip_prefix("step")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn external_attributes(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter()
        .filter(|(k, _)| k.starts_with(EXTERNAL_ATTRIBUTE_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Scalar JSON as text. Arrays, objects and null have none.
pub(crate) fn text_of(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
