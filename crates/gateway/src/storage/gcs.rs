//! # Google Cloud Storage backend
//!
//! `ObjectStorage` implementation over the Cloud Storage JSON API.
//!
//! ## Authentication
//! The service account key file supplies `client_email`, `private_key` and
//! `token_uri`. An RS256-signed JWT assertion is exchanged at `token_uri`
//! for an OAuth2 access token, cached until shortly before it expires.
//!
//! ## Calls
//! - upload: `POST {endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={name}`
//! - publish: `POST {endpoint}/storage/v1/b/{bucket}/o/{name}/acl` (`allUsers` / `READER`)
//! - delete: `DELETE {endpoint}/storage/v1/b/{bucket}/o/{name}`
//! - public URL: `{endpoint}/{bucket}/{name}`

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{ObjectContent, ObjectStorage, StorageError};

const DEVSTORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Lifetime requested for the JWT assertion (Google caps it at one hour)
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// A cached token is refreshed once it has less than this left
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Bound on establishing any connection to the token or API endpoint
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on a whole token exchange. Uploads get no overall timeout since
/// their duration grows with the object size.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields of a service account key file that the client needs.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
    }
}

/// Cloud Storage bucket client authenticated with a service account.
pub struct GcsStorage {
    http_client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
    token_timeout: Duration,
}

impl GcsStorage {
    /// Builds a client from a service account JSON key file.
    pub async fn from_credentials_file(
        path: &Path,
        bucket: &str,
        endpoint: &str,
    ) -> Result<Self, StorageError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::Credentials(format!("{}: {e}", path.display())))?;
        let key: ServiceAccountKey = serde_json::from_slice(&raw)
            .map_err(|e| StorageError::Credentials(format!("{}: {e}", path.display())))?;
        Self::from_service_account(key, bucket, endpoint)
    }

    fn from_service_account(
        key: ServiceAccountKey,
        bucket: &str,
        endpoint: &str,
    ) -> Result<Self, StorageError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| StorageError::Credentials(format!("private_key is not a valid RSA key: {e}")))?;

        let endpoint = Url::parse(endpoint)
            .map_err(|e| StorageError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::InvalidEndpoint(endpoint.to_string()));
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            endpoint,
            bucket: bucket.to_string(),
            client_email: key.client_email,
            token_uri: key.token_uri,
            signing_key,
            token: Mutex::new(None),
            token_timeout: TOKEN_REQUEST_TIMEOUT,
        })
    }

    /// Endpoint URL with `segments` appended, each percent-encoded.
    fn url_with_path(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, name: &str) -> Result<Url, StorageError> {
        self.url_with_path(&["storage", "v1", "b", &self.bucket, "o", name])
    }

    /// Returns a valid access token, fetching a new one when the cached
    /// token is missing or about to expire. The lock is held across the
    /// exchange so concurrent callers share a single refresh.
    async fn access_token(&self) -> Result<String, StorageError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<CachedToken, StorageError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StorageError::Token(format!("system clock error: {e}")))?
            .as_secs();

        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: DEVSTORAGE_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| StorageError::Token(format!("failed to sign assertion: {e}")))?;

        tracing::debug!(token_uri = %self.token_uri, "requesting access token");
        let response = self
            .http_client
            .post(&self.token_uri)
            .timeout(self.token_timeout)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let token: TokenResponse = ensure_success(response).await?.json().await?;

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

/// Passes a 2xx response through, turns anything else into `StorageError::Status`.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl ObjectStorage for GcsStorage {
    async fn put_object(
        &self,
        name: &str,
        content: ObjectContent,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut url = self.url_with_path(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);

        let token = self.access_token().await?;
        let size = content.len();
        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
            .header(CONTENT_LENGTH, size)
            .body(content.into_body())
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::debug!(bucket = %self.bucket, object_name = name, size, "object uploaded");
        Ok(())
    }

    async fn make_public(&self, name: &str) -> Result<(), StorageError> {
        let mut url = self.object_url(name)?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidEndpoint(self.endpoint.to_string()))?
            .push("acl");

        let token = self.access_token().await?;
        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<(), StorageError> {
        let url = self.object_url(name)?;
        let token = self.access_token().await?;
        let response = self
            .http_client
            .delete(url)
            .bearer_auth(token)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        match self.url_with_path(&[&self.bucket, name]) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}/{}/{}",
                self.endpoint.as_str().trim_end_matches('/'),
                self.bucket,
                name
            ),
        }
    }
}
