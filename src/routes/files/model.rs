use serde::{Deserialize, Serialize};

/// Buckets readable without a session.
pub const PUBLIC_BUCKETS: &[&str] = &["avatars", "lodge-logos"];

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Original file name; the stored name is derived from it.
    pub name: String,
    #[serde(default)]
    pub folder: String,
}

#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    #[serde(default)]
    pub folder: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectPath {
    pub bucket: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct PublicUrlResponse {
    pub url: String,
}
