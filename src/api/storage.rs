use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{LmsError, LmsResult};

const STORAGE_BASE: &str = "https://firebasestorage.googleapis.com/v0/b";

/// Where attachment bytes go. Callers only keep the returned reference.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> LmsResult<String>;
}

/// True for values that already point at uploaded content.
pub fn is_reference(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("https://") || value.starts_with("http://") || value.starts_with("memory://")
}

/// Read a local attachment and upload it under `{folder}/{uuid}-{file name}`.
pub async fn upload_file(blobs: &dyn BlobStore, folder: &str, local_path: &str) -> LmsResult<String> {
    let path = Path::new(local_path.trim());
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LmsError::Attachment(format!("Cannot read {}: {}", path.display(), e)))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment");

    let remote_path = format!("{}/{}-{}", folder, uuid::Uuid::new_v4().simple(), file_name);
    log::debug!("Uploading {} ({} bytes) to {}", path.display(), bytes.len(), remote_path);
    blobs.upload(&remote_path, bytes).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    download_tokens: Option<String>,
}

/// Firebase Storage via its REST upload endpoint.
#[derive(Clone)]
pub struct FirebaseStorage {
    client: reqwest::Client,
    bucket: String,
    id_token: Option<String>,
}

impl FirebaseStorage {
    pub fn new(bucket: impl Into<String>, id_token: Option<String>) -> LmsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            bucket: bucket.into(),
            id_token,
        })
    }

    fn objects_url(&self) -> LmsResult<Url> {
        Url::parse(&format!("{}/{}/o", STORAGE_BASE, self.bucket))
            .map_err(|e| LmsError::Attachment(format!("Invalid storage bucket: {}", e)))
    }

    /// `.../o/{url-encoded object name}?alt=media&token=..`
    fn download_url(&self, object: &str, token: Option<&str>) -> LmsResult<String> {
        let mut url = self.objects_url()?;
        url.path_segments_mut()
            .map_err(|_| LmsError::Attachment("Storage URL cannot be a base".to_string()))?
            .push(object);
        url.query_pairs_mut().append_pair("alt", "media");
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.to_string())
    }
}

#[async_trait]
impl BlobStore for FirebaseStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> LmsResult<String> {
        let mut url = self.objects_url()?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        if let Some(token) = &self.id_token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Firebase {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("Upload of {} failed with {}: {}", path, status, body);
            return Err(if status.is_server_error() {
                LmsError::BackendUnavailable(detail)
            } else {
                LmsError::ValidationRejected(detail)
            });
        }

        let uploaded: UploadResponse = response.json().await.map_err(|e| {
            LmsError::BackendUnavailable(format!("Failed to parse upload response: {}", e))
        })?;
        // Several tokens may come back comma separated; any one works.
        let token = uploaded
            .download_tokens
            .as_deref()
            .and_then(|t| t.split(',').next());
        self.download_url(&uploaded.name, token)
    }
}

/// Keeps nothing; hands back a `memory://` reference.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore;

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> LmsResult<String> {
        log::trace!("MemoryBlobStore: accepted {} bytes for {}", bytes.len(), path);
        Ok(format!("memory://{}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_encodes_object_name() {
        let storage = FirebaseStorage::new("lms.appspot.com", None).unwrap();
        let url = storage
            .download_url("assignments/abc-essay 1.pdf", Some("tok"))
            .unwrap();
        assert_eq!(
            url,
            "https://firebasestorage.googleapis.com/v0/b/lms.appspot.com/o/assignments%2Fabc-essay%201.pdf?alt=media&token=tok"
        );
    }

    #[test]
    fn test_reference_detection() {
        assert!(is_reference("https://example.com/a.pdf"));
        assert!(is_reference("memory://results/x.pdf"));
        assert!(!is_reference("/home/teacher/essay.pdf"));
        assert!(!is_reference(""));
    }

    #[tokio::test]
    async fn test_upload_file_reads_local_path() {
        let path = std::env::temp_dir().join(format!("lms-upload-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"chapter one").unwrap();

        let reference = upload_file(&MemoryBlobStore, "assignments", path.to_str().unwrap())
            .await
            .unwrap();
        assert!(reference.starts_with("memory://assignments/"));
        assert!(reference.ends_with(path.file_name().unwrap().to_str().unwrap()));

        std::fs::remove_file(&path).ok();

        let err = upload_file(&MemoryBlobStore, "assignments", path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LmsError::Attachment(_)));
    }
}
