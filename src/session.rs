// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Session-scoped persistence.
//!
//! Two [`SessionStore`] implementations: an in-memory map for a single
//! process, and a JSON file that lets consecutive CLI runs share one
//! "session".

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::core::error::{PageFlowError, Result};
use crate::core::traits::SessionStore;

/// Key of the environment override.
pub const ENVIRONMENT_KEY: &str = "environment";

/// Key of the marker set once the fonts stylesheet has loaded.
pub const FONTS_LOADED_KEY: &str = "fonts-loaded";

/// Key of the global configuration blob; locale blobs use `config:{locale}`.
pub const CONFIG_KEY: &str = "config";

/// Session key for a configuration blob.
pub fn config_key(locale: Option<&str>) -> String {
    match locale {
        Some(locale) => format!("{}:{}", CONFIG_KEY, locale),
        None => CONFIG_KEY.to_string(),
    }
}

/// An in-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        _ = self
            .entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A session store backed by a JSON object on disk. The whole object is
/// rewritten on every `set`.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileSessionStore {
    /// Opens the store, starting empty when the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| PageFlowError::io_error(path.clone(), e))?;
            serde_json::from_str(&content).map_err(|e| {
                PageFlowError::config_error(
                    format!("Invalid session file: {}", e),
                    Some(path.clone()),
                )
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        _ = entries.insert(key.to_string(), value.to_string());
        let serialized =
            serde_json::to_string_pretty(&*entries).map_err(|e| {
                PageFlowError::internal_error(format!(
                    "Failed to serialise session: {}",
                    e
                ))
            })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PageFlowError::io_error(parent.to_path_buf(), e)
            })?;
        }
        fs::write(&self.path, serialized)
            .map_err(|e| PageFlowError::io_error(self.path.clone(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_keys() {
        assert_eq!(config_key(None), "config");
        assert_eq!(config_key(Some("ar")), "config:ar");
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty());
        store.set(ENVIRONMENT_KEY, "stage").unwrap();
        store.set(ENVIRONMENT_KEY, "dev").unwrap();
        assert_eq!(store.get(ENVIRONMENT_KEY).as_deref(), Some("dev"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(FONTS_LOADED_KEY), None);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        assert_eq!(store.get(CONFIG_KEY), None);
        store.set(CONFIG_KEY, r#"{"data":[]}"#).unwrap();

        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(CONFIG_KEY).as_deref(),
            Some(r#"{"data":[]}"#)
        );
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        assert!(FileSessionStore::open(&path).is_err());
    }
}
