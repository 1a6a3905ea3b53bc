use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ObjectStore, StoredObject, check_bucket, check_path};
use crate::error::BackendError;

const LIST_LIMIT: u32 = 1000;

/// [`ObjectStore`] over the hosted storage endpoints at `<backend>/storage/v1`.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl From<ListedObject> for StoredObject {
    fn from(item: ListedObject) -> Self {
        let meta = item.metadata.unwrap_or(Value::Null);
        StoredObject {
            name: item.name,
            id: item.id,
            size: meta.get("size").and_then(Value::as_u64),
            content_type: meta
                .get("mimetype")
                .and_then(Value::as_str)
                .map(str::to_string),
            updated_at: item.updated_at,
        }
    }
}

impl HttpObjectStore {
    pub fn new(client: Client, backend_url: &str, anon_key: &str) -> Self {
        Self {
            client,
            base_url: format!("{}/storage/v1", backend_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        tracing::debug!("Storage endpoint answered {}: {}", status, message);
        Err(BackendError::from_status(status.as_u16(), message))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), BackendError> {
        let bucket = check_bucket(bucket)?;
        let path = check_path(path)?;
        let request = self
            .request(reqwest::Method::POST, &format!("object/{}/{}", bucket, path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes);
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let bucket = check_bucket(bucket)?;
        let path = check_path(path)?;
        let request = self.request(reqwest::Method::GET, &format!("object/{}/{}", bucket, path));
        let response = Self::check(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        let bucket = check_bucket(bucket)?;
        for path in paths {
            check_path(path)?;
        }
        let request = self
            .request(reqwest::Method::DELETE, &format!("object/{}", bucket))
            .json(&json!({ "prefixes": paths }));
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, BackendError> {
        let bucket = check_bucket(bucket)?;
        let request = self
            .request(reqwest::Method::POST, &format!("object/list/{}", bucket))
            .json(&json!({
                "prefix": prefix.trim_matches('/'),
                "limit": LIST_LIMIT,
                "offset": 0,
                "sortBy": { "column": "name", "order": "asc" },
            }));
        let response = Self::check(request.send().await?).await?;
        let items: Vec<ListedObject> = response.json().await?;
        Ok(items.into_iter().map(StoredObject::from).collect())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_layout() {
        let store = HttpObjectStore::new(Client::new(), "https://x.example.co/", "anon");
        assert_eq!(
            store.public_url("avatars", "/u1/me.png"),
            "https://x.example.co/storage/v1/object/public/avatars/u1/me.png"
        );
    }

    #[test]
    fn listed_folder_has_no_id() {
        let items: Vec<ListedObject> = serde_json::from_value(json!([
            {"name": "sub", "id": null, "updated_at": null, "metadata": null},
            {"name": "a.txt", "id": "0d1", "updated_at": "2024-05-01T10:00:00Z",
             "metadata": {"size": 12, "mimetype": "text/plain"}}
        ]))
        .unwrap();
        let objects: Vec<StoredObject> = items.into_iter().map(StoredObject::from).collect();
        assert!(objects[0].is_directory_marker());
        assert!(!objects[1].is_directory_marker());
        assert_eq!(objects[1].size, Some(12));
        assert_eq!(objects[1].content_type.as_deref(), Some("text/plain"));
    }
}
