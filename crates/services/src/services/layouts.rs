//! Dashboard layouts stored as one JSON file per layout.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde_json::Value;
use thiserror::Error;
use utils::validate::{self, ValidationError};
use uuid::Uuid;

const EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error(transparent)]
    InvalidName(#[from] ValidationError),
    #[error("layout '{0}' not found")]
    NotFound(String),
    #[error("layout '{0}' already exists")]
    AlreadyExists(String),
    #[error("layout '{name}' is not valid JSON: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("layout storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct LayoutStore {
    dir: PathBuf,
}

impl LayoutStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validated names only ever resolve to a direct child of the store.
    fn path_for(&self, name: &str) -> Result<PathBuf, LayoutError> {
        let name = validate::layout_name(name)?;
        Ok(self.dir.join(format!("{name}.{EXTENSION}")))
    }

    /// Create or replace a layout. The file is written under a unique
    /// temporary name and renamed into place, so concurrent saves never
    /// leave a half written layout behind.
    pub async fn save(&self, name: &str, data: &Value) -> Result<(), LayoutError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(data).map_err(|source| LayoutError::Corrupt {
            name: name.to_string(),
            source,
        })?;
        let staging = self.dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&staging, body).await?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err.into());
        }
        tracing::debug!(layout = name, "layout saved");
        Ok(())
    }

    /// Layout names, sorted. A store that was never written to is empty.
    pub async fn list(&self) -> Result<Vec<String>, LayoutError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate::layout_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn load(&self, name: &str) -> Result<Value, LayoutError> {
        let path = self.path_for(name)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(LayoutError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&raw).map_err(|source| LayoutError::Corrupt {
            name: name.to_string(),
            source,
        })
    }

    pub async fn delete(&self, name: &str) -> Result<(), LayoutError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(LayoutError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Rename without overwriting an existing layout.
    pub async fn rename(&self, old_name: &str, new_name: &str) -> Result<(), LayoutError> {
        let from = self.path_for(old_name)?;
        let to = self.path_for(new_name)?;
        if !tokio::fs::try_exists(&from).await? {
            return Err(LayoutError::NotFound(old_name.to_string()));
        }
        if tokio::fs::try_exists(&to).await? {
            return Err(LayoutError::AlreadyExists(new_name.to_string()));
        }
        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> (tempfile::TempDir, LayoutStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LayoutStore::new(dir.path().join("layouts"));
        (dir, store)
    }

    #[tokio::test]
    async fn save_load_and_list() {
        let (_dir, store) = store();
        let layout = json!({"lg": [{"i": "quota", "name": "Quota", "x": 0, "y": 0, "w": 4, "h": 2}]});
        store.save("work", &layout).await.unwrap();
        store.save("Home Screen", &json!({})).await.unwrap();

        assert_eq!(store.load("work").await.unwrap(), layout);
        assert_eq!(store.list().await.unwrap(), vec!["Home Screen", "work"]);
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let (_dir, store) = store();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let (_dir, store) = store();
        for name in ["../escape", "a/b", ".hidden", ""] {
            assert!(
                matches!(store.save(name, &json!({})).await, Err(LayoutError::InvalidName(_))),
                "{name:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn missing_layouts_are_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.load("nope").await, Err(LayoutError::NotFound(_))));
        assert!(matches!(store.delete("nope").await, Err(LayoutError::NotFound(_))));
    }

    #[tokio::test]
    async fn corrupt_file_is_distinguished_from_missing() {
        let (_dir, store) = store();
        tokio::fs::create_dir_all(store.dir()).await.unwrap();
        tokio::fs::write(store.dir().join("broken.json"), "{").await.unwrap();
        assert!(matches!(store.load("broken").await, Err(LayoutError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn rename_refuses_to_overwrite() {
        let (_dir, store) = store();
        store.save("a", &json!(1)).await.unwrap();
        store.save("b", &json!(2)).await.unwrap();
        assert!(matches!(store.rename("a", "b").await, Err(LayoutError::AlreadyExists(_))));

        store.rename("a", "c").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["b", "c"]);
        assert_eq!(store.load("c").await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let (_dir, store) = store();
        store.save("a", &json!(1)).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
