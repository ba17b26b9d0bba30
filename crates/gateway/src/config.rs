//! # Gateway configuration and shared state
//!
//! Settings are read from the process environment exactly once at startup
//! and never mutated afterwards. `AppState` pairs them with the storage
//! client, which is built lazily by the first request that needs it.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::OnceCell;

use crate::error::UploadError;
use crate::storage::{GcsStorage, ObjectStorage};

/// Default bind host when `UPROXY_HOST` is unset.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default bind port when `UPROXY_PORT` is unset.
pub const DEFAULT_PORT: u16 = 8000;
/// Default Cloud Storage API endpoint.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

pub(crate) const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Slack granted to the server-level body limit on top of the file ceiling,
/// covering multipart boundaries and part headers.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Runtime configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Target bucket (`GCP_BUCKET`)
    pub bucket: String,
    /// Service account key file (`GCP_CREDENTIALS_PATH`)
    pub credentials_path: PathBuf,
    /// Normalized allow-list (`ALLOWED_FILES`). `None` means no restriction;
    /// when present the set is never empty.
    pub allowed_extensions: Option<HashSet<String>>,
    /// Upload ceiling in bytes (`UPROXY_MAX_FILESIZE`, given in MiB)
    pub max_file_size_bytes: Option<u64>,
    /// Bind host (`UPROXY_HOST`)
    pub host: String,
    /// Bind port (`UPROXY_PORT`)
    pub port: u16,
    /// Storage API base URL (`GCS_ENDPOINT`)
    pub gcs_endpoint: String,
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bucket = var("GCP_BUCKET")
            .context("GCP_BUCKET environment variable is required")?
            .trim()
            .to_string();

        let credentials_path = PathBuf::from(
            var("GCP_CREDENTIALS_PATH")
                .context("GCP_CREDENTIALS_PATH environment variable is required")?
                .trim(),
        );
        if !credentials_path.is_file() {
            bail!(
                "Credentials file '{}' does not exist or is not a file",
                credentials_path.display()
            );
        }

        let allowed_extensions = parse_allowed_extensions(var("ALLOWED_FILES").as_deref());

        let max_file_size_bytes = var("UPROXY_MAX_FILESIZE")
            .map(|raw| parse_max_file_size(&raw))
            .transpose()?;

        let host = var("UPROXY_HOST")
            .map(|host| host.trim().to_string())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match var("UPROXY_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("UPROXY_PORT must be a valid port number, got '{raw}'"))?,
            None => DEFAULT_PORT,
        };

        let gcs_endpoint = var("GCS_ENDPOINT")
            .map(|endpoint| endpoint.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_GCS_ENDPOINT.to_string());

        Ok(Self {
            bucket,
            credentials_path,
            allowed_extensions,
            max_file_size_bytes,
            host,
            port,
            gcs_endpoint,
        })
    }

    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Server-level request body limit for the upload route. `None` disables
    /// the limit entirely; streaming enforcement in the handler stays
    /// authoritative either way.
    pub fn request_body_limit(&self) -> Option<usize> {
        self.max_file_size_bytes
            .map(|max| max.saturating_add(MULTIPART_OVERHEAD_BYTES))
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
    }
}

/// Normalizes a comma separated extension list to `.ext` lower-case form.
/// Blank entries are skipped; a list with no usable entry yields `None`.
pub fn parse_allowed_extensions(raw: Option<&str>) -> Option<HashSet<String>> {
    let extensions: HashSet<String> = raw?
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty() && item != ".")
        .map(|item| {
            if item.starts_with('.') {
                item
            } else {
                format!(".{item}")
            }
        })
        .collect();

    (!extensions.is_empty()).then_some(extensions)
}

fn parse_max_file_size(raw: &str) -> anyhow::Result<u64> {
    let megabytes: i64 = raw
        .trim()
        .parse()
        .context("UPROXY_MAX_FILESIZE must be an integer representing megabytes")?;
    if megabytes <= 0 {
        bail!("UPROXY_MAX_FILESIZE must be greater than zero");
    }
    (megabytes as u64)
        .checked_mul(BYTES_PER_MEGABYTE)
        .context("UPROXY_MAX_FILESIZE is too large")
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Gateway shared state, handed to every handler through axum `State`.
pub struct AppState {
    /// Immutable configuration
    pub settings: Settings,
    /// Storage client. Filled at most once; concurrent first callers wait on
    /// the same initialization.
    storage: OnceCell<Arc<dyn ObjectStorage>>,
}

impl AppState {
    /// State whose storage client is built from the credential file on first use.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            storage: OnceCell::new(),
        }
    }

    /// State with an already constructed storage backend.
    pub fn with_storage(settings: Settings, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            settings,
            storage: OnceCell::new_with(Some(storage)),
        }
    }

    /// Returns the storage client, constructing it on first call.
    pub async fn storage(&self) -> Result<&dyn ObjectStorage, UploadError> {
        let storage = self
            .storage
            .get_or_try_init(|| async {
                let gcs = GcsStorage::from_credentials_file(
                    &self.settings.credentials_path,
                    &self.settings.bucket,
                    &self.settings.gcs_endpoint,
                )
                .await?;
                tracing::info!(bucket = %self.settings.bucket, "Cloud Storage client initialized");
                Ok::<Arc<dyn ObjectStorage>, crate::storage::StorageError>(Arc::new(gcs))
            })
            .await
            .map_err(|e| UploadError::Internal(format!("storage client initialization failed: {e}")))?;
        Ok(&**storage)
    }
}
