//! Local filesystem object store.
//!
//! Default blob backend for dev and self-hosted deployments; cloud buckets
//! plug in behind the same trait. Files live under
//! `<root>/<uuid prefix>/<uuid>/<filename>` so no single directory grows
//! unbounded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use talentforge_ai::object_store::{ObjectMetadata, ObjectStore, ObjectStoreError};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(ObjectStoreError::Unavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ObjectStoreError> {
        // Stored paths are always relative; anything trying to climb out of
        // the root is rejected.
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ObjectStoreError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        bytes: &[u8],
        metadata: ObjectMetadata,
    ) -> Result<String, ObjectStoreError> {
        let filename = if metadata.filename.is_empty()
            || metadata.filename.contains('/')
            || metadata.filename.contains("..")
        {
            "upload.bin".to_string()
        } else {
            metadata.filename
        };

        let id = Uuid::now_v7().to_string();
        let relative = PathBuf::from(&id[..2]).join(&id).join(&filename);
        let full = self.root.join(&relative);

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?;
        }
        fs::write(&full, bytes)
            .await
            .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?;

        Ok(relative.to_string_lossy().into_owned())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(ObjectStoreError::Unavailable(e.to_string())),
        }
    }

    async fn sign(&self, path: &str) -> Result<String, ObjectStoreError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(ObjectStoreError::NotFound(path.to_string()));
        }
        Ok(format!("file://{}", full.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_sign_round_trip() {
        let dir = std::env::temp_dir().join(format!("talentforge-store-{}", Uuid::now_v7()));
        let store = LocalObjectStore::new(&dir).unwrap();

        let path = store
            .put(
                b"plain resume text",
                ObjectMetadata {
                    filename: "resume.txt".to_string(),
                    content_type: "text/plain".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(store.get(&path).await.unwrap(), b"plain resume text");
        assert!(store.sign(&path).await.unwrap().starts_with("file://"));

        fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = std::env::temp_dir().join(format!("talentforge-store-{}", Uuid::now_v7()));
        let store = LocalObjectStore::new(&dir).unwrap();

        assert!(matches!(
            store.get("../../etc/passwd").await.unwrap_err(),
            ObjectStoreError::NotFound(_)
        ));
    }
}
