//! # POST /upload
//!
//! Streams a single multipart file field into the bucket and answers with
//! the public URL of the stored object.
//!
//! ## Module layout
//! - `handler`: request handling, validation order, backend calls
//! - `policy`: extension allow-list, declared length, object naming
//! - `spool`: request-scoped buffer with the hard size ceiling

mod handler;
mod policy;
mod spool;

pub use handler::handle_upload;

/// Multipart field that carries the file.
pub(crate) const FILE_FIELD: &str = "file";
