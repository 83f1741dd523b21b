//! Settings values and partial updates
//!
//! `Settings` is a flat key → JSON value mapping. It is never edited in
//! place by the store: every change produces a new value.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SettingsError, SettingsResult};

/// Complete settings value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: Map<String, Value>,
}

impl Settings {
    /// Create from a JSON object map
    #[inline]
    #[must_use]
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Create from typed struct
    ///
    /// # Errors
    /// Returns `SettingsError::InvalidValue` if the struct does not serialize
    /// to a JSON object
    pub fn from_typed<T: Serialize>(value: &T) -> SettingsResult<Self> {
        match serde_json::to_value(value) {
            Ok(Value::Object(values)) => Ok(Self { values }),
            Ok(other) => Err(SettingsError::invalid_value(
                "<root>",
                format!("expected an object, found {}", crate::schema::json_type_name(&other)),
            )),
            Err(e) => Err(SettingsError::invalid_value("<root>", e.to_string())),
        }
    }

    /// Get raw value for key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get value for key converted to `T`
    ///
    /// # Errors
    /// - `SettingsError::UnknownKey` if the key is absent
    /// - `SettingsError::InvalidValue` if the value does not convert
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SettingsResult<T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| SettingsError::invalid_value(key, e.to_string()))
    }

    /// Convert the whole value to a typed struct
    ///
    /// # Errors
    /// Returns `SettingsError::InvalidValue` if the shape does not match `T`
    pub fn to_typed<T: DeserializeOwned>(&self) -> SettingsResult<T> {
        serde_json::from_value(self.to_value())
            .map_err(|e| SettingsError::invalid_value("<root>", e.to_string()))
    }

    /// Check if key is present
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys in map order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Entries in map order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow underlying map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Take underlying map
    #[inline]
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    /// Blob representation handed to the persistence backend
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Shallow merge: keys in `patch` override, every other key is kept
    #[must_use]
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let mut values = self.values.clone();
        for (key, value) in patch.iter() {
            values.insert(key.to_string(), value.clone());
        }
        Self { values }
    }

    /// Keys whose values differ between `self` and `other`
    #[must_use]
    pub fn changed_keys(&self, other: &Settings) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .iter()
            .filter(|(key, value)| other.values.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        keys.extend(
            other
                .values
                .keys()
                .filter(|key| !self.values.contains_key(*key))
                .cloned(),
        );
        keys
    }
}

impl FromIterator<(String, Value)> for Settings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Partial settings used by updates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsPatch {
    values: Map<String, Value>,
}

impl SettingsPatch {
    /// Create empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entry (builder style)
    #[inline]
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Add entry in place
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Create from a JSON object map
    #[inline]
    #[must_use]
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Create from a JSON value
    ///
    /// # Errors
    /// Returns `SettingsError::InvalidValue` if the value is not an object
    pub fn from_value(value: Value) -> SettingsResult<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(SettingsError::invalid_value(
                "<patch>",
                format!("expected an object, found {}", crate::schema::json_type_name(&other)),
            )),
        }
    }

    /// Entries in map order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if patch is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for SettingsPatch {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
