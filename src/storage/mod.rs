//! Object storage: named buckets addressed by slash-separated paths.

pub mod http;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;

/// Placeholder object the hosted store keeps inside otherwise empty folders.
pub const FOLDER_PLACEHOLDER: &str = ".emptyFolderPlaceholder";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredObject {
    pub name: String,
    /// `None` marks a folder.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredObject {
    pub fn is_directory_marker(&self) -> bool {
        self.id.is_none() || self.name == FOLDER_PLACEHOLDER
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` at `path`. Without `upsert`, an existing object is a conflict.
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), BackendError>;

    async fn get(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError>;

    /// Direct children of `prefix`, folders included.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, BackendError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Rejects empty segments and parent references in bucket paths.
pub fn check_path(path: &str) -> Result<&str, BackendError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty()
        || trimmed
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(BackendError::validation(format!("invalid object path: {:?}", path)));
    }
    Ok(trimmed)
}

/// A bucket is one path segment of letters, digits, `-` and `_`.
pub fn check_bucket(bucket: &str) -> Result<&str, BackendError> {
    if bucket.is_empty()
        || !bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BackendError::validation(format!("invalid bucket: {:?}", bucket)));
    }
    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths() {
        assert_eq!(check_path("/docs/a.pdf").unwrap(), "docs/a.pdf");
        assert!(check_path("docs/../secret").is_err());
        assert!(check_path("a//b").is_err());
        assert!(check_path("").is_err());
    }

    #[test]
    fn buckets_are_single_segments() {
        assert_eq!(check_bucket("lodge-logos").unwrap(), "lodge-logos");
        for bad in ["", "avatars/../documents", "a/b", "..", "/avatars", "docs\\x"] {
            assert!(check_bucket(bad).is_err(), "{:?} accepted", bad);
        }
    }
}
