//! # uproxy shared types
//!
//! Wire-level structures returned by the upload proxy.
//!
//! ## Envelope
//! Every response of `POST /upload`, success or failure, carries the same
//! three fields so that clients can handle all outcomes uniformly:
//!
//! ```json
//! {"code": 200, "name": "Success", "description": "https://storage.googleapis.com/bucket/abc.png"}
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Status phrase used in place of the canonical "OK" for successful uploads.
pub const SUCCESS_NAME: &str = "Success";

/// Uniform response body of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// HTTP status code, mirrored from the response status line
    pub code: u16,
    /// Canonical status phrase ("Bad Request", "Payload Too Large", ...)
    pub name: String,
    /// Error message, or the public URL of the stored object on success
    pub description: String,
}

impl Envelope {
    /// Builds a success envelope pointing at the stored object.
    pub fn success(public_url: impl Into<String>) -> Self {
        Self {
            code: 200,
            name: SUCCESS_NAME.to_string(),
            description: public_url.into(),
        }
    }

    /// Builds an error envelope. `name` is expected to be the canonical
    /// phrase for `code`.
    pub fn error(code: u16, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            description: description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Body of `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let env = Envelope::success("https://example.com/b/x.png");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "code": 200,
                "name": "Success",
                "description": "https://example.com/b/x.png",
            })
        );
    }

    #[test]
    fn test_error_envelope_has_exactly_three_fields() {
        let env = Envelope::error(400, "Bad Request", "File type is not allowed");
        let value = serde_json::to_value(&env).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["code"], 400);
        assert_eq!(obj["name"], "Bad Request");
    }

    #[test]
    fn test_health_status_ok() {
        let body = serde_json::to_string(&HealthStatus::ok()).unwrap();
        assert_eq!(body, r#"{"status":"ok"}"#);
    }
}
