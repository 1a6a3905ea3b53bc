use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ObjectStore, StoredObject, check_bucket, check_path};
use crate::error::{BackendError, ErrorKind};

/// [`ObjectStore`] on the local filesystem, one directory per bucket.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    /// `public_base` prefixes the URLs handed back to clients.
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, BackendError> {
        let bucket = check_bucket(bucket)?;
        let path = check_path(path)?;
        Ok(self.root.join(bucket).join(path))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        upsert: bool,
    ) -> Result<(), BackendError> {
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut options = fs::OpenOptions::new();
        options.write(true);
        if upsert {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(&target).await.map_err(|e| {
            let err = BackendError::from(e);
            if err.kind == ErrorKind::Conflict {
                BackendError::new(ErrorKind::Conflict, "The resource already exists")
            } else {
                err
            }
        })?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let target = self.object_path(bucket, path)?;
        Ok(fs::read(&target).await?)
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        for path in paths {
            let target = self.object_path(bucket, path)?;
            match fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, BackendError> {
        let mut dir = self.root.join(check_bucket(bucket)?);
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() {
            dir = dir.join(check_path(prefix)?);
        }

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                objects.push(StoredObject {
                    name,
                    id: None,
                    size: None,
                    content_type: None,
                    updated_at: None,
                });
                continue;
            }
            let id = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            objects.push(StoredObject {
                name,
                id: Some(id),
                size: Some(meta.len()),
                content_type: None,
                updated_at: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base,
            bucket,
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost/files");

        store
            .put("docs", "lodge/a.txt", b"hello".to_vec(), "text/plain", false)
            .await
            .unwrap();
        store
            .put("docs", "lodge/sub/b.txt", b"x".to_vec(), "text/plain", false)
            .await
            .unwrap();
        assert_eq!(store.get("docs", "lodge/a.txt").await.unwrap(), b"hello");

        let listed = store.list("docs", "lodge").await.unwrap();
        let names: Vec<_> = listed.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert!(listed[1].is_directory_marker());
        assert_eq!(listed[0].id.as_deref(), Some("lodge/a.txt"));

        store
            .remove("docs", &["lodge/a.txt".to_string()])
            .await
            .unwrap();
        let err = store.get("docs", "lodge/a.txt").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn put_without_upsert_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost/files");
        store
            .put("b", "x.txt", b"1".to_vec(), "text/plain", false)
            .await
            .unwrap();
        let err = store
            .put("b", "x.txt", b"2".to_vec(), "text/plain", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        store
            .put("b", "x.txt", b"2".to_vec(), "text/plain", true)
            .await
            .unwrap();
        assert_eq!(store.get("b", "x.txt").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn bucket_cannot_reach_into_another() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost/files");
        store
            .put("documents", "lodge/minutes.txt", b"secret".to_vec(), "text/plain", false)
            .await
            .unwrap();

        let err = store.get("documents/lodge", "minutes.txt").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err = store.list("avatars/../documents", "lodge").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err = store
            .put("avatars/x", "y.png", b"1".to_vec(), "image/png", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn listing_a_missing_bucket_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://localhost/files");
        assert!(store.list("nothing", "").await.unwrap().is_empty());
    }
}
