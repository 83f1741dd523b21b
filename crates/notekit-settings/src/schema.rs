//! Settings schema
//!
//! The static description of every recognized setting: its expected kind,
//! its default value and an optional description. Default settings, patch
//! validation and load-time merging are all derived from the schema.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SettingsError, SettingsResult, ValidationIssue};
use crate::settings::{Settings, SettingsPatch};

/// Key of the single setting shipped with the plugin template
pub const EXAMPLE_SETTING_KEY: &str = "exampleSetting";

/// Default value of [`EXAMPLE_SETTING_KEY`]
pub const EXAMPLE_SETTING_DEFAULT: &str = "default value";

/// Expected JSON kind of a setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    /// JSON string
    String,
    /// JSON boolean
    Bool,
    /// JSON number without fractional part
    Integer,
    /// Any JSON number
    Number,
    /// Array of JSON strings
    StringList,
    /// Any non-null JSON value
    Any,
}

impl SettingKind {
    /// Check whether a value is acceptable for this kind
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Any => !value.is_null(),
        }
    }

    /// Name used in schema files and diagnostics
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::StringList => "string_list",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Short name of a JSON value's type, for diagnostics
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Definition of one recognized setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDef {
    /// Expected kind
    #[serde(rename = "type")]
    pub kind: SettingKind,
    /// Fallback value
    pub default: Value,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SettingDef {
    /// Create definition without description
    #[inline]
    #[must_use]
    pub fn new(kind: SettingKind, default: impl Into<Value>) -> Self {
        Self {
            kind,
            default: default.into(),
            description: None,
        }
    }

    /// Attach a description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// How a persisted blob was turned into settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing persisted yet; defaults used
    FirstRun,
    /// Blob merged over defaults
    Merged {
        /// Schema keys absent from the blob, filled from defaults
        filled: Vec<String>,
        /// Keys outside the schema, dropped
        dropped: Vec<String>,
    },
    /// Blob rejected; defaults used
    Rejected(Vec<ValidationIssue>),
}

impl LoadOutcome {
    /// Check if the resolved settings should be written back
    ///
    /// A rejected blob is never overwritten; it stays on disk until the
    /// next explicit save or update.
    #[must_use]
    pub fn needs_write_back(&self) -> bool {
        match self {
            Self::FirstRun => true,
            Self::Merged { filled, dropped } => !filled.is_empty() || !dropped.is_empty(),
            Self::Rejected(_) => false,
        }
    }

    /// Check if the persisted blob was discarded in favour of defaults
    #[inline]
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Ordered set of setting definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, SettingDef>",
    into = "IndexMap<String, SettingDef>"
)]
pub struct Schema {
    defs: IndexMap<String, SettingDef>,
}

impl Schema {
    /// Start building a schema
    #[inline]
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Schema of the plugin template: a single string setting
    #[must_use]
    pub fn template() -> Self {
        let mut defs = IndexMap::new();
        defs.insert(
            EXAMPLE_SETTING_KEY.to_string(),
            SettingDef::new(SettingKind::String, EXAMPLE_SETTING_DEFAULT)
                .with_description("Example setting"),
        );
        Self { defs }
    }

    /// Parse a schema from its JSON representation
    ///
    /// # Errors
    /// Returns `SettingsError::Schema` if the JSON is malformed or a default
    /// does not match its declared kind
    pub fn from_json_str(json: &str) -> SettingsResult<Self> {
        serde_json::from_str(json).map_err(|e| SettingsError::Schema(e.to_string()))
    }

    /// Get definition for key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SettingDef> {
        self.defs.get(key)
    }

    /// Check if key is recognized
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.defs.contains_key(key)
    }

    /// Recognized keys in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    /// Definitions in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingDef)> {
        self.defs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of recognized keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Check if schema has no keys
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Default settings: every key mapped to its fallback value
    #[must_use]
    pub fn defaults(&self) -> Settings {
        self.defs
            .iter()
            .map(|(key, def)| (key.clone(), def.default.clone()))
            .collect()
    }

    fn check_entry(&self, key: &str, value: &Value) -> Option<ValidationIssue> {
        match self.defs.get(key) {
            None => Some(ValidationIssue::UnknownKey(key.to_string())),
            Some(def) if !def.kind.accepts(value) => Some(ValidationIssue::WrongKind {
                key: key.to_string(),
                expected: def.kind,
                found: json_type_name(value),
            }),
            Some(_) => None,
        }
    }

    /// Issues with a partial update
    #[must_use]
    pub fn patch_issues(&self, patch: &SettingsPatch) -> Vec<ValidationIssue> {
        patch
            .iter()
            .filter_map(|(key, value)| self.check_entry(key, value))
            .collect()
    }

    /// Issues with a complete settings value
    ///
    /// Reports every unknown key, every mistyped key and every missing key.
    #[must_use]
    pub fn complete_issues(&self, values: &Map<String, Value>) -> Vec<ValidationIssue> {
        let mut issues: Vec<_> = values
            .iter()
            .filter_map(|(key, value)| self.check_entry(key, value))
            .collect();
        issues.extend(
            self.keys()
                .filter(|key| !values.contains_key(*key))
                .map(|key| ValidationIssue::Missing(key.to_string())),
        );
        issues
    }

    /// Validate a partial update
    ///
    /// # Errors
    /// Returns `SettingsError::Validation` listing every offending key
    pub fn check_patch(&self, patch: &SettingsPatch) -> SettingsResult<()> {
        let issues = self.patch_issues(patch);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Validation(issues))
        }
    }

    /// Validate a complete settings value
    ///
    /// # Errors
    /// Returns `SettingsError::Validation` listing every offending key
    pub fn check_complete(&self, settings: &Settings) -> SettingsResult<()> {
        let issues = self.complete_issues(settings.as_map());
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::Validation(issues))
        }
    }

    /// Turn a persisted blob into complete settings
    ///
    /// - absent or `null` blob → defaults
    /// - object → shallow merge over defaults; keys outside the schema are
    ///   dropped, and any mistyped schema key rejects the whole blob
    /// - anything else → defaults
    #[must_use]
    pub fn resolve(&self, blob: Option<&Value>) -> (Settings, LoadOutcome) {
        let map = match blob {
            None | Some(Value::Null) => return (self.defaults(), LoadOutcome::FirstRun),
            Some(Value::Object(map)) => map,
            Some(other) => {
                let issue = ValidationIssue::NotAnObject(json_type_name(other));
                return (self.defaults(), LoadOutcome::Rejected(vec![issue]));
            }
        };

        let mut dropped = Vec::new();
        let mut mistyped = Vec::new();
        for (key, value) in map {
            match self.check_entry(key, value) {
                Some(ValidationIssue::UnknownKey(key)) => dropped.push(key),
                Some(issue) => mistyped.push(issue),
                None => {}
            }
        }

        if !mistyped.is_empty() {
            return (self.defaults(), LoadOutcome::Rejected(mistyped));
        }

        let mut values = Map::new();
        let mut filled = Vec::new();
        for (key, def) in &self.defs {
            match map.get(key) {
                Some(value) => {
                    values.insert(key.clone(), value.clone());
                }
                None => {
                    filled.push(key.clone());
                    values.insert(key.clone(), def.default.clone());
                }
            }
        }

        (
            Settings::from_map(values),
            LoadOutcome::Merged { filled, dropped },
        )
    }
}

impl TryFrom<IndexMap<String, SettingDef>> for Schema {
    type Error = SettingsError;

    fn try_from(defs: IndexMap<String, SettingDef>) -> Result<Self, Self::Error> {
        defs.into_iter()
            .fold(Schema::builder(), |builder, (key, def)| builder.define(key, def))
            .build()
    }
}

impl From<Schema> for IndexMap<String, SettingDef> {
    fn from(schema: Schema) -> Self {
        schema.defs
    }
}

/// Builder for [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    defs: IndexMap<String, SettingDef>,
    errors: Vec<String>,
}

impl SchemaBuilder {
    /// Declare a setting
    #[must_use]
    pub fn setting(self, key: impl Into<String>, kind: SettingKind, default: impl Into<Value>) -> Self {
        self.define(key, SettingDef::new(kind, default))
    }

    /// Declare a setting from a full definition
    #[must_use]
    pub fn define(mut self, key: impl Into<String>, def: SettingDef) -> Self {
        let key = key.into();
        if key.is_empty() {
            self.errors.push("setting key is empty".to_string());
        } else if !def.kind.accepts(&def.default) {
            self.errors.push(format!(
                "default for '{key}' must be {}, found {}",
                def.kind,
                json_type_name(&def.default)
            ));
        } else if self.defs.insert(key.clone(), def).is_some() {
            self.errors.push(format!("setting '{key}' declared twice"));
        }
        self
    }

    /// Finish the schema
    ///
    /// # Errors
    /// Returns `SettingsError::Schema` for empty or duplicate keys and for
    /// defaults that do not match their declared kind
    pub fn build(self) -> SettingsResult<Schema> {
        if self.errors.is_empty() {
            Ok(Schema { defs: self.defs })
        } else {
            Err(SettingsError::Schema(self.errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder()
            .setting("theme", SettingKind::String, "light")
            .setting("fontSize", SettingKind::Integer, 14)
            .setting("spellcheck", SettingKind::Bool, true)
            .build()
            .unwrap()
    }

    #[test]
    fn kind_accepts() {
        assert!(SettingKind::String.accepts(&json!("x")));
        assert!(!SettingKind::String.accepts(&json!(1)));
        assert!(SettingKind::Integer.accepts(&json!(3)));
        assert!(!SettingKind::Integer.accepts(&json!(3.5)));
        assert!(SettingKind::Number.accepts(&json!(3.5)));
        assert!(SettingKind::StringList.accepts(&json!(["a", "b"])));
        assert!(SettingKind::StringList.accepts(&json!([])));
        assert!(!SettingKind::StringList.accepts(&json!(["a", 1])));
        assert!(SettingKind::Any.accepts(&json!({"nested": true})));
        assert!(!SettingKind::Any.accepts(&Value::Null));
    }

    #[test]
    fn template_defaults() {
        let defaults = Schema::template().defaults();
        assert_eq!(defaults.to_value(), json!({"exampleSetting": "default value"}));
    }

    #[test]
    fn builder_rejects_mistyped_default() {
        let err = Schema::builder()
            .setting("fontSize", SettingKind::Integer, "big")
            .build()
            .unwrap_err();
        assert!(matches!(err, SettingsError::Schema(_)));
        assert!(err.to_string().contains("fontSize"));
    }

    #[test]
    fn builder_rejects_duplicates_and_empty_keys() {
        let err = Schema::builder()
            .setting("a", SettingKind::Bool, true)
            .setting("a", SettingKind::Bool, false)
            .setting("", SettingKind::Bool, false)
            .build()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("declared twice"));
        assert!(message.contains("empty"));
    }

    #[test]
    fn schema_from_json() {
        let schema = Schema::from_json_str(
            r#"{
                "exampleSetting": { "type": "string", "default": "default value" },
                "tags": { "type": "string_list", "default": [], "description": "Tags" }
            }"#,
        )
        .unwrap();
        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["exampleSetting", "tags"]);
        assert_eq!(schema.get("tags").unwrap().description.as_deref(), Some("Tags"));
    }

    #[test]
    fn schema_from_json_validates_defaults() {
        let err = Schema::from_json_str(r#"{ "n": { "type": "integer", "default": "x" } }"#)
            .unwrap_err();
        assert!(matches!(err, SettingsError::Schema(_)));
    }

    #[test]
    fn resolve_absent_and_null() {
        let schema = schema();
        let (settings, outcome) = schema.resolve(None);
        assert_eq!(settings, schema.defaults());
        assert_eq!(outcome, LoadOutcome::FirstRun);

        let (settings, outcome) = schema.resolve(Some(&Value::Null));
        assert_eq!(settings, schema.defaults());
        assert_eq!(outcome, LoadOutcome::FirstRun);
    }

    #[test]
    fn resolve_fills_missing_and_drops_unknown() {
        let schema = schema();
        let blob = json!({"theme": "dark", "legacy": 1});
        let (settings, outcome) = schema.resolve(Some(&blob));
        assert_eq!(
            settings.to_value(),
            json!({"theme": "dark", "fontSize": 14, "spellcheck": true})
        );
        assert_eq!(
            outcome,
            LoadOutcome::Merged {
                filled: vec!["fontSize".to_string(), "spellcheck".to_string()],
                dropped: vec!["legacy".to_string()],
            }
        );
        assert!(outcome.needs_write_back());
    }

    #[test]
    fn resolve_complete_blob_needs_no_write_back() {
        let schema = schema();
        let blob = json!({"theme": "dark", "fontSize": 10, "spellcheck": false});
        let (settings, outcome) = schema.resolve(Some(&blob));
        assert_eq!(settings.to_value(), blob);
        assert!(!outcome.needs_write_back());
    }

    #[test]
    fn resolve_rejects_mistyped_blob() {
        let schema = schema();
        let blob = json!({"theme": "dark", "fontSize": "huge"});
        let (settings, outcome) = schema.resolve(Some(&blob));
        assert_eq!(settings, schema.defaults());
        match outcome {
            LoadOutcome::Rejected(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].key(), Some("fontSize"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn resolve_rejects_non_object() {
        let schema = schema();
        for blob in [json!("a string"), json!([1, 2]), json!(42), json!(true)] {
            let (settings, outcome) = schema.resolve(Some(&blob));
            assert_eq!(settings, schema.defaults());
            assert!(outcome.is_rejected());
            assert!(!outcome.needs_write_back());
        }
    }

    #[test]
    fn complete_issues_reports_everything() {
        let schema = schema();
        let values = json!({"theme": 3, "extra": true});
        let issues = schema.complete_issues(values.as_object().unwrap());
        assert!(issues.contains(&ValidationIssue::UnknownKey("extra".into())));
        assert!(issues.contains(&ValidationIssue::Missing("fontSize".into())));
        assert!(issues.contains(&ValidationIssue::Missing("spellcheck".into())));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::WrongKind { key, .. } if key == "theme")));
    }

    #[test]
    fn patch_check() {
        let schema = schema();
        let ok = SettingsPatch::new().set("theme", "dark");
        assert!(schema.check_patch(&ok).is_ok());

        let bad = SettingsPatch::new().set("theme", 1).set("nope", 2);
        let err = schema.check_patch(&bad).unwrap_err();
        assert_eq!(err.issues().len(), 2);
    }
}
