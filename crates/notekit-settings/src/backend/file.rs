//! JSON file backend
//!
//! Stores the blob as pretty-printed JSON. Writes go to a temp file that is
//! renamed over the target, so the file is either the old or the new blob,
//! never a partial write.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::SettingsBackend;
use crate::error::BackendError;

/// File name of a plugin's settings blob inside its directory
pub const DATA_FILE_NAME: &str = "data.json";

/// Sequence for temp file names, unique across writers in this process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Backend persisting the blob to a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Create backend for an explicit file path
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create backend for `{plugins_dir}/{plugin_id}/data.json`
    ///
    /// # Errors
    /// Returns `BackendError::Other` if the plugin id is empty or escapes
    /// the plugins directory
    pub fn for_plugin(plugins_dir: impl AsRef<Path>, plugin_id: &str) -> Result<Self, BackendError> {
        if plugin_id.is_empty() {
            return Err(BackendError::Other("plugin id is empty".to_string()));
        }
        if is_path_escape(plugin_id) || plugin_id.contains(['/', '\\']) {
            return Err(BackendError::Other(format!(
                "plugin id \"{plugin_id}\" is not a plain directory name"
            )));
        }
        Ok(Self::new(
            plugins_dir.as_ref().join(plugin_id).join(DATA_FILE_NAME),
        ))
    }

    /// Path of the blob file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map_or_else(|| DATA_FILE_NAME.into(), |n| n.to_string_lossy().into_owned());
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!("{file_name}.tmp.{}.{seq}", std::process::id()))
    }
}

/// Returns true if a relative path attempts to escape its root via `..`
/// or absolute components, or names the root itself via `.`
fn is_path_escape(relative: &str) -> bool {
    let path = Path::new(relative);
    if path.is_absolute() {
        return true;
    }
    path.components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[async_trait]
impl SettingsBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<Value>, BackendError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io_error(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| BackendError::corrupt(format!("{}: {e}", self.path.display())))
    }

    async fn save(&self, blob: &Value) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::io_error(parent, e))?;
        }

        let json = serde_json::to_string_pretty(blob)
            .map_err(|e| BackendError::Other(format!("failed to serialize settings: {e}")))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| BackendError::io_error(&temp, e))?;

        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(BackendError::io_error(&self.path, e));
        }

        tracing::debug!(path = %self.path.display(), "settings blob written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn path_escape_rejects_parent_dir() {
        assert!(is_path_escape("../evil"));
        assert!(is_path_escape("foo/../bar"));
        assert!(is_path_escape(".."));
    }

    #[test]
    fn path_escape_rejects_absolute() {
        assert!(is_path_escape("/etc/passwd"));
    }

    #[test]
    fn path_escape_allows_plain_names() {
        assert!(!is_path_escape("my-plugin"));
        assert!(!is_path_escape("data.json"));
    }

    #[test]
    fn for_plugin_resolves_data_file() {
        let backend = JsonFileBackend::for_plugin("/vault/plugins", "my-plugin").unwrap();
        assert!(backend.path().ends_with("my-plugin/data.json"));
    }

    #[test]
    fn for_plugin_rejects_bad_ids() {
        assert!(JsonFileBackend::for_plugin("/vault/plugins", "").is_err());
        assert!(JsonFileBackend::for_plugin("/vault/plugins", "../evil").is_err());
        assert!(JsonFileBackend::for_plugin("/vault/plugins", "a/b").is_err());
        assert!(JsonFileBackend::for_plugin("/vault/plugins", "/abs").is_err());
        assert!(JsonFileBackend::for_plugin("/vault/plugins", ".").is_err());
    }

    #[test]
    fn path_escape_rejects_current_dir() {
        assert!(is_path_escape("."));
        assert!(is_path_escape("./"));
    }

    #[test]
    fn temp_paths_are_unique_per_write() {
        let first = JsonFileBackend::new("/vault/data.json");
        let second = JsonFileBackend::new("/vault/data.json");
        let a = first.temp_path();
        let b = second.temp_path();
        let c = first.temp_path();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.parent(), Some(Path::new("/vault")));
    }

    #[tokio::test]
    async fn concurrent_backends_on_one_path_both_land() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let first = JsonFileBackend::new(&path);
        let second = JsonFileBackend::new(&path);

        let va = json!({"a": 1});
        let vb = json!({"a": 2});
        let (a, b) = tokio::join!(first.save(&va), second.save(&vb));
        a.unwrap();
        b.unwrap();

        let loaded = first.load().await.unwrap().unwrap();
        assert!(loaded == json!({"a": 1}) || loaded == json!({"a": 2}));
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("data.json"));
        assert_eq!(backend.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(JsonFileBackend::new(path).load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileBackend::new(path).load().await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn save_creates_dirs_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::for_plugin(dir.path(), "my-plugin").unwrap();
        let blob = json!({"exampleSetting": "custom"});

        backend.save(&blob).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), Some(blob));

        // temp file renamed away
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("my-plugin"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["data.json".to_string()]);
    }

    #[tokio::test]
    async fn save_overwrites_previous_blob() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("data.json"));
        backend.save(&json!({"a": 1})).await.unwrap();
        backend.save(&json!({"a": 2})).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), Some(json!({"a": 2})));
    }
}
