//! File source trait and implementations.
//!
//! A `FileSource` asynchronously supplies form documents and rule documents
//! by identifier. Each wizard session holds its own source instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use formflow_core::{rule_doc, RuleSpec};

use crate::error::SourceError;

/// Directory under the source root holding form documents.
pub const FORM_DIR: &str = "json.form";
/// Directory under the source root holding rule documents.
pub const RULE_DIR: &str = "rule";

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

#[async_trait]
pub trait FileSource: Send + Sync {
    /// Load a form document. Returns the JSON exactly as stored.
    async fn get_form_from_file(&self, id: &str) -> Result<serde_json::Value, SourceError>;

    /// Load and parse a rule document, rules in document order.
    async fn get_rules_from_file(&self, id: &str) -> Result<Vec<RuleSpec>, SourceError>;
}

fn parse_form(id: &str, text: &str) -> Result<serde_json::Value, SourceError> {
    let form: serde_json::Value =
        serde_json::from_str(text).map_err(|e| SourceError::InvalidForm {
            id: id.to_string(),
            message: e.to_string(),
        })?;
    if !form.is_object() {
        return Err(SourceError::InvalidForm {
            id: id.to_string(),
            message: "expected a JSON object".to_string(),
        });
    }
    Ok(form)
}

// ──────────────────────────────────────────────
// DiskFileSource
// ──────────────────────────────────────────────

/// Reads `<root>/json.form/<id>.json` and `<root>/rule/<id>`.
#[derive(Debug, Clone)]
pub struct DiskFileSource {
    root: PathBuf,
}

impl DiskFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskFileSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn form_path(&self, id: &str) -> PathBuf {
        let file = if id.ends_with(".json") {
            id.to_string()
        } else {
            format!("{id}.json")
        };
        self.root.join(FORM_DIR).join(file)
    }

    pub fn rule_path(&self, id: &str) -> PathBuf {
        self.root.join(RULE_DIR).join(id)
    }

    async fn read(&self, id: &str, path: &Path) -> Result<String, SourceError> {
        tracing::debug!(path = %path.display(), "reading");
        tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound { id: id.to_string() }
            } else {
                SourceError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

#[async_trait]
impl FileSource for DiskFileSource {
    async fn get_form_from_file(&self, id: &str) -> Result<serde_json::Value, SourceError> {
        let text = self.read(id, &self.form_path(id)).await?;
        parse_form(id, &text)
    }

    async fn get_rules_from_file(&self, id: &str) -> Result<Vec<RuleSpec>, SourceError> {
        let text = self.read(id, &self.rule_path(id)).await?;
        Ok(rule_doc::parse(&text)?)
    }
}

// ──────────────────────────────────────────────
// StaticFileSource
// ──────────────────────────────────────────────

/// Serves documents held in memory. Useful for embedded forms and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFileSource {
    forms: HashMap<String, String>,
    rules: HashMap<String, String>,
}

impl StaticFileSource {
    pub fn new() -> Self {
        StaticFileSource::default()
    }

    pub fn with_form(mut self, id: impl Into<String>, json: impl Into<String>) -> Self {
        self.forms.insert(id.into(), json.into());
        self
    }

    pub fn with_rules(mut self, id: impl Into<String>, document: impl Into<String>) -> Self {
        self.rules.insert(id.into(), document.into());
        self
    }
}

#[async_trait]
impl FileSource for StaticFileSource {
    async fn get_form_from_file(&self, id: &str) -> Result<serde_json::Value, SourceError> {
        let text = self
            .forms
            .get(id)
            .ok_or_else(|| SourceError::NotFound { id: id.to_string() })?;
        parse_form(id, text)
    }

    async fn get_rules_from_file(&self, id: &str) -> Result<Vec<RuleSpec>, SourceError> {
        let text = self
            .rules
            .get(id)
            .ok_or_else(|| SourceError::NotFound { id: id.to_string() })?;
        Ok(rule_doc::parse(text)?)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_serves_and_parses() {
        let src = StaticFileSource::new()
            .with_form("anc", r#"{"step1": {"fields": []}}"#)
            .with_rules("anc_rules.yml", "name: r\ncondition: \"true\"\n");
        let form = src.get_form_from_file("anc").await.unwrap();
        assert!(form.get("step1").is_some());
        let rules = src.get_rules_from_file("anc_rules.yml").await.unwrap();
        assert_eq!(rules[0].name, "r");
    }

    #[tokio::test]
    async fn static_source_missing_ids() {
        let src = StaticFileSource::new();
        assert!(matches!(
            src.get_form_from_file("nope").await.unwrap_err(),
            SourceError::NotFound { .. }
        ));
        assert!(matches!(
            src.get_rules_from_file("nope").await.unwrap_err(),
            SourceError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn non_object_form_rejected() {
        let src = StaticFileSource::new().with_form("list", "[1, 2]");
        assert!(matches!(
            src.get_form_from_file("list").await.unwrap_err(),
            SourceError::InvalidForm { .. }
        ));
    }

    #[tokio::test]
    async fn malformed_rules_propagate() {
        let src = StaticFileSource::new().with_rules("bad", "condition: \"true\"\n");
        assert!(matches!(
            src.get_rules_from_file("bad").await.unwrap_err(),
            SourceError::Rules(_)
        ));
    }

    #[test]
    fn disk_paths() {
        let src = DiskFileSource::new("/data");
        assert_eq!(src.form_path("anc"), PathBuf::from("/data/json.form/anc.json"));
        assert_eq!(src.form_path("anc.json"), PathBuf::from("/data/json.form/anc.json"));
        assert_eq!(src.rule_path("anc_rules.yml"), PathBuf::from("/data/rule/anc_rules.yml"));
    }
}
