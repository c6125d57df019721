//! Object storage for generated images and narration.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Client;
use tracing::info;
use uuid::Uuid;

use crate::error::StorageError;

/// Stored bytes plus the content type they were uploaded with.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;

    async fn fetch(&self, key: &str) -> Result<StoredObject, StorageError>;
}

/// Uploads under a fresh `<uuid><ext>` key and returns the public URL.
pub async fn upload_media(
    storage: &dyn MediaStorage,
    bytes: Bytes,
    ext: &str,
    content_type: &str,
) -> Result<String, StorageError> {
    let key = format!("{}{}", Uuid::new_v4(), ext);
    storage.put(&key, bytes, content_type).await?;
    Ok(storage.public_url(&key))
}

/// Supabase Storage bucket accessed over its REST API.
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(client: Client, base_url: String, api_key: String, bucket: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url, api_key, bucket }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl MediaStorage for SupabaseStorage {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        let size = bytes.len();
        let response = self.client
            .post(self.object_url(key))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status: status.as_u16(), body });
        }
        info!(key, size, content_type, "📦 Uploaded object");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, key)
    }

    async fn fetch(&self, key: &str) -> Result<StoredObject, StorageError> {
        let response = self.client
            .get(self.object_url(key))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            // Supabase answers 400 for missing objects in some versions
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status: status.as_u16(), body });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(StoredObject { bytes: response.bytes().await?, content_type })
    }
}

/// In-process storage served back through `GET /media/{key}`.
pub struct MemoryStorage {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        let base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self { base_url, objects: RwLock::default() }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl MediaStorage for MemoryStorage {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        let object = StoredObject { bytes, content_type: content_type.to_string() };
        self.objects.write().insert(key.to_string(), object);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/media/{}", self.base_url, key)
    }

    async fn fetch(&self, key: &str) -> Result<StoredObject, StorageError> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_generates_unique_keys_and_resolvable_urls() {
        let storage = MemoryStorage::new("http://localhost:8000/");
        let a = upload_media(&storage, Bytes::from_static(b"one"), ".png", "image/png").await.unwrap();
        let b = upload_media(&storage, Bytes::from_static(b"two"), ".png", "image/png").await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("http://localhost:8000/media/"));
        assert!(a.ends_with(".png"));
        assert_eq!(storage.len(), 2);

        let key = a.rsplit('/').next().unwrap();
        let object = storage.fetch(key).await.unwrap();
        assert_eq!(&object.bytes[..], b"one");
        assert_eq!(object.content_type, "image/png");
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let storage = MemoryStorage::new("http://x");
        storage.put("k.mp3", Bytes::from_static(b"old"), "audio/mpeg").await.unwrap();
        storage.put("k.mp3", Bytes::from_static(b"new"), "audio/mpeg").await.unwrap();
        assert_eq!(&storage.fetch("k.mp3").await.unwrap().bytes[..], b"new");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let storage = MemoryStorage::new("http://x");
        assert!(matches!(storage.fetch("nope").await, Err(StorageError::NotFound(k)) if k == "nope"));
    }

    #[test]
    fn supabase_urls() {
        let s = SupabaseStorage::new(Client::new(), "https://proj.supabase.co/".into(), "key".into(), "edu-tale-assets".into());
        assert_eq!(s.public_url("a.png"), "https://proj.supabase.co/storage/v1/object/public/edu-tale-assets/a.png");
        assert_eq!(s.object_url("a.png"), "https://proj.supabase.co/storage/v1/object/edu-tale-assets/a.png");
    }
}
