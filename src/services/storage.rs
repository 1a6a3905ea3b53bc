use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::base::{ServiceResult, run};
use crate::error::BackendError;
use crate::storage::{ObjectStore, check_path};

const TEXT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Milliseconds since the epoch, strictly increasing within the process.
fn unique_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// Keeps ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn unique_file_name(original: &str) -> String {
    format!("{}_{}", unique_millis(), sanitize_file_name(original))
}

fn join(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpload {
    pub name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub url: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct StorageService {
    store: Arc<dyn ObjectStore>,
}

impl StorageService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Stores the file under `folder`. Without `file_name`, a unique
    /// `<millis>_<sanitized original>` name is generated.
    pub async fn upload_file(
        &self,
        bucket: &str,
        folder: &str,
        file: FileUpload,
        file_name: Option<&str>,
    ) -> ServiceResult<UploadedFile> {
        run("storage.upload_file", async {
            if file.bytes.is_empty() {
                return Err(BackendError::validation("file is empty"));
            }
            let name = match file_name {
                Some(name) => sanitize_file_name(name),
                None => unique_file_name(&file.name),
            };
            let path = join(folder, &name);
            check_path(&path)?;
            self.store
                .put(bucket, &path, file.bytes, &file.content_type, false)
                .await?;
            tracing::debug!("Stored {} in bucket {}", path, bucket);
            Ok(UploadedFile {
                url: self.store.public_url(bucket, &path),
                path,
            })
        })
        .await
    }

    pub async fn download_file(&self, bucket: &str, path: &str) -> ServiceResult<Vec<u8>> {
        run("storage.download_file", self.store.get(bucket, path)).await
    }

    pub async fn delete_file(&self, bucket: &str, path: &str) -> ServiceResult<()> {
        run("storage.delete_file", async {
            self.store.remove(bucket, &[check_path(path)?.to_string()]).await
        })
        .await
    }

    /// Files directly under `folder`, folders and placeholders left out.
    pub async fn list_files(&self, bucket: &str, folder: &str) -> ServiceResult<Vec<FileEntry>> {
        run("storage.list_files", async {
            let objects = self.store.list(bucket, folder).await?;
            Ok(objects
                .into_iter()
                .filter(|o| !o.is_directory_marker())
                .map(|o| {
                    let path = join(folder, &o.name);
                    FileEntry {
                        url: self.store.public_url(bucket, &path),
                        name: o.name,
                        path,
                        size: o.size,
                        content_type: o.content_type,
                        updated_at: o.updated_at,
                    }
                })
                .collect())
        })
        .await
    }

    pub fn get_public_url(&self, bucket: &str, path: &str) -> String {
        self.store.public_url(bucket, path)
    }

    /// Writes `content` as a UTF-8 text object at `path`, replacing any previous one.
    pub async fn upload_text_file(
        &self,
        bucket: &str,
        path: &str,
        content: &str,
    ) -> ServiceResult<UploadedFile> {
        run("storage.upload_text_file", async {
            let path = check_path(path)?.to_string();
            self.store
                .put(bucket, &path, content.as_bytes().to_vec(), TEXT_CONTENT_TYPE, true)
                .await?;
            Ok(UploadedFile {
                url: self.store.public_url(bucket, &path),
                path,
            })
        })
        .await
    }

    pub async fn get_text_file(&self, bucket: &str, path: &str) -> ServiceResult<String> {
        run("storage.get_text_file", async {
            let bytes = self.store.get(bucket, path).await?;
            String::from_utf8(bytes)
                .map_err(|_| BackendError::validation(format!("{} is not UTF-8 text", path)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::LocalObjectStore;

    fn service(dir: &tempfile::TempDir) -> StorageService {
        StorageService::new(Arc::new(LocalObjectStore::new(dir.path(), "http://files.local")))
    }

    fn upload(name: &str) -> FileUpload {
        FileUpload {
            name: name.into(),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("Compte rendu (v2).pdf"), "Compte_rendu__v2_.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name("été.txt"), "_t_.txt");
    }

    #[test]
    fn stamps_strictly_increase() {
        let stamps: Vec<i64> = (0..200).map(|_| unique_millis()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn same_source_twice_gives_two_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = service(&dir);
        let a = storage
            .upload_file("documents", "lodge-1", upload("rituel.pdf"), None)
            .await
            .into_result()
            .unwrap();
        let b = storage
            .upload_file("documents", "lodge-1", upload("rituel.pdf"), None)
            .await
            .into_result()
            .unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.path.starts_with("lodge-1/") && a.path.ends_with("_rituel.pdf"));
        assert_eq!(a.url, format!("http://files.local/documents/{}", a.path));
    }

    #[tokio::test]
    async fn explicit_name_collides() {
        let dir = tempfile::tempdir().unwrap();
        let storage = service(&dir);
        storage
            .upload_file("documents", "", upload("x.pdf"), Some("fixed.pdf"))
            .await
            .into_result()
            .unwrap();
        let again = storage
            .upload_file("documents", "", upload("x.pdf"), Some("fixed.pdf"))
            .await;
        assert_eq!(again.error.unwrap().kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn listing_skips_folders() {
        let dir = tempfile::tempdir().unwrap();
        let storage = service(&dir);
        storage
            .upload_file("documents", "lodge-1", upload("a.pdf"), Some("a.pdf"))
            .await;
        storage
            .upload_file("documents", "lodge-1/archive", upload("b.pdf"), Some("b.pdf"))
            .await;
        let files = storage
            .list_files("documents", "lodge-1")
            .await
            .into_result()
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "lodge-1/a.pdf");
        assert_eq!(files[0].url, "http://files.local/documents/lodge-1/a.pdf");
    }

    #[tokio::test]
    async fn text_files_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = service(&dir);
        storage
            .upload_text_file("notes", "minutes/2026-01.txt", "première version")
            .await
            .into_result()
            .unwrap();
        storage
            .upload_text_file("notes", "minutes/2026-01.txt", "seconde version")
            .await
            .into_result()
            .unwrap();
        let text = storage
            .get_text_file("notes", "minutes/2026-01.txt")
            .await
            .into_result()
            .unwrap();
        assert_eq!(text, "seconde version");

        storage.delete_file("notes", "minutes/2026-01.txt").await.into_result().unwrap();
        let missing = storage.get_text_file("notes", "minutes/2026-01.txt").await;
        assert_eq!(missing.error.unwrap().kind, ErrorKind::NotFound);
    }
}
