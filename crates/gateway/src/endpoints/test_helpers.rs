//! # Shared helpers for endpoint tests
//!
//! In-memory storage mock, settings fixture and a minimal multipart encoder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde::de::DeserializeOwned;
use tokio::io::AsyncReadExt;
use tower::ServiceExt;

use crate::config::{AppState, Settings, DEFAULT_GCS_ENDPOINT};
use crate::storage::{ObjectContent, ObjectStorage, StorageError};

pub const BOUNDARY: &str = "uproxy-test-boundary";
pub const PUBLIC_BASE: &str = "https://storage.example.test/test-bucket";

/// Object as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub public: bool,
    /// Content arrived as a spooled temporary file
    pub from_file: bool,
}

/// `ObjectStorage` that keeps objects in memory and can be told to fail.
#[derive(Default)]
pub struct MockStorage {
    pub objects: Mutex<HashMap<String, StoredObject>>,
    pub put_calls: AtomicUsize,
    pub fail_put: AtomicBool,
    pub fail_publish: AtomicBool,
}

impl MockStorage {
    pub fn objects(&self) -> HashMap<String, StoredObject> {
        self.objects.lock().unwrap().clone()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MockStorage {
    async fn put_object(
        &self,
        name: &str,
        content: ObjectContent,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 503,
                body: "simulated network failure".to_string(),
            });
        }
        let (content, from_file) = read_content(content).await;
        self.objects.lock().unwrap().insert(
            name.to_string(),
            StoredObject {
                content,
                from_file,
                content_type: content_type.map(str::to_string),
                public: false,
            },
        );
        Ok(())
    }

    async fn make_public(&self, name: &str) -> Result<(), StorageError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 403,
                body: "simulated ACL failure".to_string(),
            });
        }
        match self.objects.lock().unwrap().get_mut(name) {
            Some(object) => {
                object.public = true;
                Ok(())
            }
            None => Err(StorageError::Status {
                status: 404,
                body: "no such object".to_string(),
            }),
        }
    }

    async fn delete_object(&self, name: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!("{PUBLIC_BASE}/{name}")
    }
}

/// Reads an object body back, noting whether it came from a file.
pub async fn read_content(content: ObjectContent) -> (Vec<u8>, bool) {
    match content {
        ObjectContent::Memory(bytes) => (bytes.to_vec(), false),
        ObjectContent::File { mut file, len } => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf.len() as u64, len);
            (buf, true)
        }
    }
}

/// Settings with no restrictions; storage is injected so the credential
/// path is never read.
pub fn test_settings() -> Settings {
    Settings {
        bucket: "test-bucket".to_string(),
        credentials_path: PathBuf::from("/unused/credentials.json"),
        allowed_extensions: None,
        max_file_size_bytes: None,
        host: "127.0.0.1".to_string(),
        port: 0,
        gcs_endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
    }
}

pub fn test_router(settings: Settings, storage: Arc<MockStorage>) -> Router {
    crate::endpoints::build_router(Arc::new(AppState::with_storage(settings, storage)))
}

/// Minimal `multipart/form-data` encoder.
#[derive(Default)]
pub struct FormBuilder {
    body: Vec<u8>,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(
        mut self,
        name: &str,
        filename: Option<&str>,
        content_type: Option<&str>,
        content: &[u8],
    ) -> Self {
        let mut head = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"");
        if let Some(filename) = filename {
            head.push_str(&format!("; filename=\"{filename}\""));
        }
        head.push_str("\r\n");
        if let Some(content_type) = content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str("\r\n");
        self.body.extend_from_slice(head.as_bytes());
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

/// Single-file form, the shape real clients send.
pub fn file_form(filename: &str, content_type: Option<&str>, content: &[u8]) -> Vec<u8> {
    FormBuilder::new()
        .file("file", Some(filename), content_type, content)
        .build()
}

/// POST /upload with an honest `Content-Length`.
pub fn upload_request(body: Vec<u8>) -> Request<Body> {
    let len = body.len().to_string();
    upload_request_with_length(body, Some(&len))
}

/// POST /upload with an arbitrary (or no) `Content-Length`.
pub fn upload_request_with_length(body: Vec<u8>, content_length: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(len) = content_length {
        builder = builder.header(CONTENT_LENGTH, len);
    }
    builder.body(Body::from(body)).unwrap()
}

/// Sends `request` through `router` and decodes the JSON body.
pub async fn send<T: DeserializeOwned>(router: Router, request: Request<Body>) -> (StatusCode, T) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("non-JSON response ({status}): {e}: {bytes:?}"));
    (status, body)
}
