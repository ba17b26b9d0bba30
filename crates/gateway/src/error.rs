//! # Gateway error type
//!
//! Every failure of the upload path is an `UploadError`, converted once into
//! the `{code, name, description}` envelope. Backend and internal details are
//! logged here and replaced by fixed client-facing messages.

use std::any::Any;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uproxy_types::Envelope;

use crate::storage::StorageError;

pub const MISSING_FILENAME: &str = "A filename must be supplied";
pub const FILE_TYPE_NOT_ALLOWED: &str = "File type is not allowed";
pub const FILE_TOO_LARGE: &str = "Uploaded file exceeds the configured maximum size";
pub const STORAGE_FAILURE: &str = "Failed to upload file to Google Cloud Storage";
pub const UNEXPECTED_FAILURE: &str = "Unexpected internal server error";

/// Upload gateway error type.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Missing filename, disallowed extension, malformed form data
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Upload exceeded the configured ceiling
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// Storage backend rejected or failed an operation
    #[error("storage backend failure: {0}")]
    Storage(String),
    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl UploadError {
    pub fn missing_filename() -> Self {
        Self::BadRequest(MISSING_FILENAME.to_string())
    }

    pub fn file_type_not_allowed() -> Self {
        Self::BadRequest(FILE_TYPE_NOT_ALLOWED.to_string())
    }

    pub fn file_too_large() -> Self {
        Self::PayloadTooLarge(FILE_TOO_LARGE.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::BadRequest(_) => StatusCode::BAD_REQUEST,
            UploadError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Storage(_) | UploadError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        UploadError::Storage(err.to_string())
    }
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        // The route-level body limit surfaces as a 413 from the multipart reader
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return UploadError::file_too_large();
        }
        UploadError::BadRequest(format!("Failed to read multipart data: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for UploadError {
    fn from(rejection: MultipartRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return UploadError::file_too_large();
        }
        UploadError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        let description = match self {
            UploadError::BadRequest(message) | UploadError::PayloadTooLarge(message) => message,
            UploadError::Storage(detail) => {
                tracing::error!(error = %detail, "storage backend failure");
                STORAGE_FAILURE.to_string()
            }
            UploadError::Internal(detail) => {
                tracing::error!(error = %detail, "unexpected failure");
                UNEXPECTED_FAILURE.to_string()
            }
        };
        envelope_response(status, description)
    }
}

/// Canonical status phrase, e.g. "Payload Too Large".
pub fn status_name(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Error")
}

/// Error envelope with the matching response status.
pub fn envelope_response(status: StatusCode, description: impl Into<String>) -> Response {
    let envelope = Envelope::error(status.as_u16(), status_name(status), description);
    (status, Json(envelope)).into_response()
}

/// Response for a panicking handler; the panic payload is only logged.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    UploadError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn envelope_of(response: Response) -> (StatusCode, Envelope) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_errors_keep_their_message() {
        let (status, env) = envelope_of(UploadError::file_type_not_allowed().into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(env.code, 400);
        assert_eq!(env.name, "Bad Request");
        assert_eq!(env.description, FILE_TYPE_NOT_ALLOWED);

        let (status, env) = envelope_of(UploadError::file_too_large().into_response()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(env.code, 413);
        assert_eq!(env.name, "Payload Too Large");
        assert_eq!(env.description, FILE_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_storage_error_details_are_not_leaked() {
        let err: UploadError = StorageError::Status {
            status: 403,
            body: "secret-service-account@project.iam".to_string(),
        }
        .into();
        let (status, env) = envelope_of(err.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(env.name, "Internal Server Error");
        assert_eq!(env.description, STORAGE_FAILURE);
    }

    #[tokio::test]
    async fn test_internal_error_details_are_not_leaked() {
        let err = UploadError::Internal("connection pool poisoned".to_string());
        let (status, env) = envelope_of(err.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(env.description, UNEXPECTED_FAILURE);
    }

    #[tokio::test]
    async fn test_panic_maps_to_generic_500() {
        let (status, env) = envelope_of(handle_panic(Box::new("index out of bounds"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(env.code, 500);
        assert_eq!(env.description, UNEXPECTED_FAILURE);

        let (_, env) = envelope_of(handle_panic(Box::new(String::from("boom")))).await;
        assert_eq!(env.description, UNEXPECTED_FAILURE);
    }
}
