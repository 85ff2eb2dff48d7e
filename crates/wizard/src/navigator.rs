//! Form schema navigation: required-field discovery, selection encoding,
//! value export and environment binding.
//!
//! Everything here reads immutable schema structures and is safe to call
//! from background work.

use serde_json::{Map, Value as Json};

use formflow_eval::{Environment, RuleRun, Value};

use crate::error::WizardError;
use crate::schema::{FieldSpec, FieldType, FormSchema, OptionSpec, RequiredSpec, SelectionKind};

/// Key under which [`annotate_required_fields`] stores the required keys.
pub const REQUIRED_FIELDS: &str = "required_fields";

// ──────────────────────────────────────────────
// Required fields
// ──────────────────────────────────────────────

/// Whether `field` is required given the latest rule run.
///
/// Without a rule run, rule-dependent fields count as not required.
pub fn is_required(field: &FieldSpec, rules: Option<&RuleRun>) -> bool {
    match &field.required {
        RequiredSpec::Never => false,
        RequiredSpec::Always => true,
        RequiredSpec::Rule(name) => rules.is_some_and(|run| run.has_fired(name)),
    }
}

/// Keys of every required field, descending into sub-forms. First-seen
/// order, no duplicates.
pub fn extract_required_fields(fields: &[FieldSpec], rules: Option<&RuleRun>) -> Vec<String> {
    fn walk(fields: &[FieldSpec], rules: Option<&RuleRun>, out: &mut Vec<String>) {
        for field in fields {
            if is_required(field, rules) && !field.key.is_empty() && !out.contains(&field.key) {
                out.push(field.key.clone());
            }
            walk(&field.fields, rules, out);
        }
    }
    let mut out = Vec::new();
    walk(fields, rules, &mut out);
    out
}

/// Write the required keys of `sub_fields` into the composite field object
/// under `required_fields`.
pub fn annotate_required_fields(
    composite: &mut Map<String, Json>,
    sub_fields: &[FieldSpec],
    rules: Option<&RuleRun>,
) {
    let keys = extract_required_fields(sub_fields, rules)
        .into_iter()
        .map(Json::String)
        .collect();
    composite.insert(REQUIRED_FIELDS.to_string(), Json::Array(keys));
}

// ──────────────────────────────────────────────
// Selection encoding
// ──────────────────────────────────────────────

/// Encode one selection as `{field_key: "<canonical string>"}`.
///
/// - multi choice: `<option_key>:<option_text>:<bound_value>;<type>`
/// - single choice: `<bound_value>:<option_text>;<type>`
/// - anything else: `<bound_value>;<type>`
///
/// Multi-choice values keep the option key because several options of the
/// same field can be active at once.
pub fn build_selection_value(
    field_key: &str,
    option_key: &str,
    bound_value: &str,
    field_type: &FieldType,
    option_text: &str,
) -> Map<String, Json> {
    let encoded = match field_type.selection_kind() {
        SelectionKind::Multi => format!("{option_key}:{option_text}:{bound_value};{field_type}"),
        SelectionKind::Single => format!("{bound_value}:{option_text};{field_type}"),
        SelectionKind::Scalar => format!("{bound_value};{field_type}"),
    };
    let mut out = Map::new();
    out.insert(field_key.to_string(), Json::String(encoded));
    out
}

/// An option's pass-through attributes tagged with the field they were
/// exported under.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionAttributes {
    pub context_key: String,
    pub option_key: String,
    pub attributes: Map<String, Json>,
}

impl OptionAttributes {
    pub fn to_json(&self) -> Json {
        let mut obj = self.attributes.clone();
        obj.insert("key".to_string(), Json::String(self.context_key.clone()));
        obj.insert(
            "option_key".to_string(),
            Json::String(self.option_key.clone()),
        );
        Json::Object(obj)
    }
}

/// Append exactly one attribute record for `option`. Empty attribute
/// values are carried as they are.
pub fn extract_option_attributes(
    accumulator: &mut Vec<OptionAttributes>,
    option: &OptionSpec,
    context_key: &str,
) {
    accumulator.push(OptionAttributes {
        context_key: context_key.to_string(),
        option_key: option.key.clone(),
        attributes: option.external_attributes.clone(),
    });
}

// ──────────────────────────────────────────────
// Value export
// ──────────────────────────────────────────────

/// Exported value of one sub-form field.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    pub key: String,
    pub field_type: FieldType,
    /// Encoded selections, see [`build_selection_value`].
    pub values: Vec<String>,
    pub external_attributes: Map<String, Json>,
    pub option_attributes: Vec<OptionAttributes>,
}

impl ValueRecord {
    pub fn to_json(&self) -> Json {
        let mut obj = self.external_attributes.clone();
        obj.insert("key".to_string(), Json::String(self.key.clone()));
        obj.insert("type".to_string(), Json::String(self.field_type.to_string()));
        obj.insert(
            "values".to_string(),
            Json::Array(self.values.iter().cloned().map(Json::String).collect()),
        );
        obj.insert(
            "openmrs_attributes".to_string(),
            Json::Array(self.option_attributes.iter().map(|a| a.to_json()).collect()),
        );
        Json::Object(obj)
    }
}

/// One record per field that carries a value, in field order.
pub fn create_values(fields: &[FieldSpec]) -> Vec<ValueRecord> {
    fields.iter().filter_map(value_record).collect()
}

fn value_record(field: &FieldSpec) -> Option<ValueRecord> {
    if field.is_empty() {
        return None;
    }

    let mut values = Vec::new();
    let mut option_attributes = Vec::new();
    let mut push_encoded = |map: Map<String, Json>| {
        values.extend(map.into_iter().filter_map(|(_, v)| v.as_str().map(str::to_string)));
    };

    match field.field_type.selection_kind() {
        SelectionKind::Multi => {
            for option in field.selected_options() {
                let bound = option.value.as_deref().unwrap_or("true");
                push_encoded(build_selection_value(
                    &field.key,
                    &option.key,
                    bound,
                    &field.field_type,
                    &option.text,
                ));
                extract_option_attributes(&mut option_attributes, option, &field.key);
            }
        }
        SelectionKind::Single => {
            for option in field.selected_options() {
                push_encoded(build_selection_value(
                    &field.key,
                    &option.key,
                    &option.key,
                    &field.field_type,
                    &option.text,
                ));
                extract_option_attributes(&mut option_attributes, option, &field.key);
            }
        }
        SelectionKind::Scalar => {
            for v in field.value_texts() {
                push_encoded(build_selection_value(&field.key, "", &v, &field.field_type, ""));
            }
        }
    }

    Some(ValueRecord {
        key: field.key.clone(),
        field_type: field.field_type.clone(),
        values,
        external_attributes: field.external_attributes.clone(),
        option_attributes,
    })
}

// ──────────────────────────────────────────────
// Environment binding and step resolution
// ──────────────────────────────────────────────

/// Variable name rule authors use for a field: `<step>_<key>`.
pub fn variable_name(step: &str, key: &str) -> String {
    format!("{step}_{key}")
}

/// Bind every valued field of every step into an environment.
///
/// Text binds as `Text`, JSON numbers as `Number`, booleans as `Bool`.
/// Multi-choice fields bind the comma-joined keys of their selected
/// options. Fields without a value stay unbound.
pub fn bind_environment(schema: &FormSchema) -> Environment {
    let mut env = Environment::new();
    for step in &schema.steps {
        for field in step.all_fields() {
            if field.key.is_empty() {
                continue;
            }
            if let Some(v) = field_value(field) {
                env.insert(variable_name(&step.name, &field.key), v);
            }
        }
    }
    env
}

fn field_value(field: &FieldSpec) -> Option<Value> {
    if field.field_type.selection_kind() == SelectionKind::Multi {
        let keys: Vec<&str> = field
            .selected_options()
            .iter()
            .map(|o| o.key.as_str())
            .collect();
        return (!keys.is_empty()).then(|| Value::Text(keys.join(",")));
    }
    match field.value.as_ref()? {
        Json::Array(_) => {
            let items = field.value_texts();
            (!items.is_empty()).then(|| Value::Text(items.join(",")))
        }
        other => Value::from_json(other),
    }
}

/// Title and next-step link of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTarget {
    pub title: String,
    /// Empty on the last step.
    pub next: String,
}

pub fn resolve_step(schema: &FormSchema, step: &str) -> Result<StepTarget, WizardError> {
    let spec = schema
        .step(step)
        .ok_or_else(|| WizardError::MissingStepSchema {
            step: step.to_string(),
        })?;
    Ok(StepTarget {
        title: spec.title.clone(),
        next: spec.next.clone(),
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
