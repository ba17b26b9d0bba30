//! # Object storage
//!
//! Abstract interface to the bucket that receives uploads. The Cloud Storage
//! implementation lives in the `gcs` submodule; handlers only see the trait.

pub mod gcs;

pub use gcs::GcsStorage;

use bytes::Bytes;
use tokio::fs::File;

/// Storage backend failure. Kept distinct from validation errors so the
/// handler can map it to a generic 500 without inspecting it.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Credential file unreadable or malformed
    #[error("invalid credentials: {0}")]
    Credentials(String),
    /// Configured API endpoint cannot be used as a base URL
    #[error("invalid storage endpoint: {0}")]
    InvalidEndpoint(String),
    /// OAuth2 token could not be obtained
    #[error("access token request failed: {0}")]
    Token(String),
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// API answered with a non-success status
    #[error("storage API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body of an object to be written.
pub enum ObjectContent {
    /// Fully buffered in memory
    Memory(Bytes),
    /// Spooled to a temporary file, positioned at its start
    File { file: File, len: u64 },
}

impl ObjectContent {
    /// Size of the body in bytes.
    pub fn len(&self) -> u64 {
        match self {
            ObjectContent::Memory(bytes) => bytes.len() as u64,
            ObjectContent::File { len, .. } => *len,
        }
    }

    /// Request body streaming the content; a file is read as it is sent.
    pub fn into_body(self) -> reqwest::Body {
        match self {
            ObjectContent::Memory(bytes) => reqwest::Body::from(bytes),
            ObjectContent::File { file, .. } => reqwest::Body::from(file),
        }
    }
}

impl From<Bytes> for ObjectContent {
    fn from(bytes: Bytes) -> Self {
        ObjectContent::Memory(bytes)
    }
}

/// Abstract interface of an object storage bucket.
///
/// Implementations must be safe for concurrent use from many request tasks.
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Creates (or replaces) `name` with `content`. The content type falls
    /// back to `application/octet-stream` when the client declared none.
    async fn put_object(
        &self,
        name: &str,
        content: ObjectContent,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Grants unauthenticated read access to `name`.
    async fn make_public(&self, name: &str) -> Result<(), StorageError>;

    /// Removes `name`. Used to clean up an object that could not be published.
    async fn delete_object(&self, name: &str) -> Result<(), StorageError>;

    /// Public URL of `name`, valid once the object is readable.
    fn public_url(&self, name: &str) -> String;
}
