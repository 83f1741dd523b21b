//! Error types for plugin settings
//!
//! Provides error handling for:
//! - Schema construction and validation issues
//! - Key lookups outside the schema
//! - Persistence backend failures (load/save)

use std::fmt;
use std::path::PathBuf;

use crate::schema::SettingKind;

/// A single problem found while checking settings against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Key is not part of the schema
    UnknownKey(String),

    /// Key is part of the schema but its value has the wrong kind
    WrongKind {
        /// Offending key
        key: String,
        /// Kind declared by the schema
        expected: SettingKind,
        /// Short name of the JSON type found
        found: &'static str,
    },

    /// Required key absent from a complete settings value
    Missing(String),

    /// Persisted blob is not a JSON object
    NotAnObject(&'static str),

    /// Persisted blob could not be decoded at all
    Undecodable(String),
}

impl ValidationIssue {
    /// Key the issue refers to, if any
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::UnknownKey(key) | Self::Missing(key) | Self::WrongKind { key, .. } => Some(key),
            Self::NotAnObject(_) | Self::Undecodable(_) => None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey(key) => write!(f, "unknown setting key '{key}'"),
            Self::WrongKind {
                key,
                expected,
                found,
            } => write!(f, "'{key}' expects {expected}, found {found}"),
            Self::Missing(key) => write!(f, "missing setting '{key}'"),
            Self::NotAnObject(found) => write!(f, "settings blob must be an object, found {found}"),
            Self::Undecodable(reason) => write!(f, "settings blob is undecodable: {reason}"),
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by a persistence backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// IO error while reading or writing the blob
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Blob exists but cannot be decoded
    #[error("corrupt settings blob: {0}")]
    Corrupt(String),

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create corrupt-blob error
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt(reason.into())
    }

    /// Check if error means the stored blob is unreadable rather than unreachable
    #[inline]
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}

/// Main settings error type
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Lookup of a key outside the schema
    #[error("unknown setting key: '{0}'")]
    UnknownKey(String),

    /// Settings or patch rejected by the schema
    #[error("invalid settings: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Stored value cannot be converted to the requested type
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Persistence backend failed
    #[error("persistence failed: {0}")]
    Backend(#[from] BackendError),

    /// Schema definition is inconsistent
    #[error("schema error: {0}")]
    Schema(String),
}

impl SettingsError {
    /// Create invalid value error
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Issues carried by a validation error (empty for other variants)
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Validation(issues) => issues,
            _ => &[],
        }
    }

    /// Check if error came from the persistence backend
    #[inline]
    #[must_use]
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Result type alias for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_display() {
        let err = SettingsError::UnknownKey("fontSize".to_string());
        assert_eq!(err.to_string(), "unknown setting key: 'fontSize'");
    }

    #[test]
    fn validation_display_joins_issues() {
        let err = SettingsError::Validation(vec![
            ValidationIssue::UnknownKey("extra".to_string()),
            ValidationIssue::WrongKind {
                key: "exampleSetting".to_string(),
                expected: SettingKind::String,
                found: "number",
            },
        ]);
        assert_eq!(
            err.to_string(),
            "invalid settings: unknown setting key 'extra'; 'exampleSetting' expects string, found number"
        );
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn backend_error_conversion() {
        let err: SettingsError = BackendError::Other("disk full".to_string()).into();
        assert!(err.is_backend());
        assert!(err.issues().is_empty());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn corrupt_is_distinguished_from_io() {
        assert!(BackendError::corrupt("bad json").is_corrupt());
        let io = BackendError::io_error(
            "/tmp/data.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!io.is_corrupt());
        assert!(io.to_string().contains("/tmp/data.json"));
    }

    #[test]
    fn issue_key_lookup() {
        assert_eq!(ValidationIssue::Missing("a".into()).key(), Some("a"));
        assert_eq!(ValidationIssue::NotAnObject("string").key(), None);
    }
}
