//! # /upload handler

use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use uproxy_types::Envelope;

use crate::config::AppState;
use crate::error::UploadError;

use super::policy::{
    declared_content_length, generate_object_name, is_extension_allowed, normalize_extension,
};
use super::spool::spool_field;
use super::FILE_FIELD;

/// POST /upload — store one file and return its public URL.
///
/// Fields other than `file` are skipped. Only the first `file` field is
/// processed; the rest of the form is never read.
pub async fn handle_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Envelope>, UploadError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        return store_upload(&state, &headers, field).await.map(Json);
    }

    Err(UploadError::missing_filename())
}

/// Validates, buffers and stores a single file field.
async fn store_upload(
    state: &AppState,
    headers: &HeaderMap,
    mut field: Field<'_>,
) -> Result<Envelope, UploadError> {
    let settings = &state.settings;

    // Step 1: filename presence
    // Only an absent or empty name counts as missing; the name is never trimmed.
    let filename = field
        .file_name()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(UploadError::missing_filename)?;

    // Step 2: extension allow-list
    let extension = normalize_extension(&filename);
    if !is_extension_allowed(settings.allowed_extensions.as_ref(), &extension) {
        tracing::info!(filename = %filename, extension = %extension, "rejected disallowed file type");
        return Err(UploadError::file_type_not_allowed());
    }

    // Step 3: declared size fast path. The streaming check below stays authoritative.
    if let Some(max) = settings.max_file_size_bytes {
        if let Some(declared) = declared_content_length(headers).filter(|len| *len > max) {
            tracing::info!(declared, max_size = max, "rejected upload by declared Content-Length");
            return Err(UploadError::file_too_large());
        }
    }

    let content_type = field.content_type().map(str::to_string);

    // Step 4: buffer the body under the hard ceiling
    let spool = spool_field(&mut field, settings.max_file_size_bytes).await?;
    drop(field);
    let spilled = spool.is_spilled();
    let content = spool.into_content().await?;
    let size = content.len();

    // Step 5: unguessable object name
    let object_name = generate_object_name(&extension);

    // Steps 6-7: write, then publish. Nothing reaches the backend before this point.
    let storage = state.storage().await?;
    storage
        .put_object(&object_name, content, content_type.as_deref())
        .await?;

    if let Err(err) = storage.make_public(&object_name).await {
        if let Err(cleanup) = storage.delete_object(&object_name).await {
            tracing::warn!(
                object_name = %object_name,
                error = %cleanup,
                "failed to remove object after publish failure"
            );
        }
        return Err(err.into());
    }

    // Step 8
    let public_url = storage.public_url(&object_name);
    tracing::info!(
        object_name = %object_name,
        total_size = size,
        spilled,
        content_type = ?content_type,
        "upload stored"
    );
    Ok(Envelope::success(public_url))
}
