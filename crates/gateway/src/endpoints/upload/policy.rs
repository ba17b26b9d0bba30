//! # Upload policy
//!
//! Pure checks applied before any byte of the body is buffered, and the
//! naming scheme of stored objects.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;

use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Random bytes behind every object name (43 URL-safe characters once encoded).
pub(crate) const OBJECT_TOKEN_BYTES: usize = 32;

/// Lower-cased, dot-prefixed extension of the file's base name, or `""`.
///
/// Directory components sent by some clients are ignored. Names without a
/// dot, names that only start with a dot (`.bashrc`) and names ending in a
/// dot all have no extension.
pub(crate) fn normalize_extension(filename: &str) -> String {
    let base = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(filename);
    Path::new(base)
        .extension()
        .and_then(OsStr::to_str)
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Whether `extension` passes the configured allow-list. Without a list
/// every extension, including none, is accepted.
pub(crate) fn is_extension_allowed(allowed: Option<&HashSet<String>>, extension: &str) -> bool {
    match allowed {
        None => true,
        Some(set) => !extension.is_empty() && set.contains(extension),
    }
}

/// Declared `Content-Length`, if present and numeric. Anything unparsable
/// is treated as unknown.
pub(crate) fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Unguessable object name: OS-random token followed by the extension.
pub(crate) fn generate_object_name(extension: &str) -> String {
    let mut token = [0u8; OBJECT_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut token);
    format!("{}{extension}", URL_SAFE_NO_PAD.encode(token))
}
