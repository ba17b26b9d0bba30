//! # Upload spool
//!
//! Request-scoped sink for the file body. Small uploads stay in memory; once
//! the running total passes the spill threshold the buffered bytes move to an
//! anonymous temporary file and the rest of the body is appended there. The
//! ceiling is checked before every append, so the spool never holds more than
//! the configured maximum. Dropping the spool on any early return releases
//! the buffer and closes (and thereby removes) the temporary file.

use std::io::SeekFrom;

use axum::extract::multipart::Field;
use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::UploadError;
use crate::storage::ObjectContent;

/// Bytes kept in memory before the spool moves to disk.
pub(crate) const SPILL_THRESHOLD: u64 = 5 * 1024 * 1024;
/// Initial in-memory capacity; the buffer grows as data arrives.
const INITIAL_CAPACITY: usize = 8 * 1024;

enum Sink {
    Memory(BytesMut),
    Disk(File),
}

pub(crate) struct UploadSpool {
    sink: Sink,
    len: u64,
    max_bytes: Option<u64>,
    spill_threshold: u64,
}

impl UploadSpool {
    pub(crate) fn new(max_bytes: Option<u64>) -> Self {
        Self::with_spill_threshold(max_bytes, SPILL_THRESHOLD)
    }

    pub(crate) fn with_spill_threshold(max_bytes: Option<u64>, spill_threshold: u64) -> Self {
        Self {
            sink: Sink::Memory(BytesMut::with_capacity(INITIAL_CAPACITY)),
            len: 0,
            max_bytes,
            spill_threshold,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn is_spilled(&self) -> bool {
        matches!(self.sink, Sink::Disk(_))
    }

    /// Appends `chunk`, or refuses it if the running total would pass the ceiling.
    pub(crate) async fn push(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let total = self.len.saturating_add(chunk.len() as u64);
        if self.max_bytes.is_some_and(|max| total > max) {
            return Err(UploadError::file_too_large());
        }

        if total > self.spill_threshold {
            if let Sink::Memory(buf) = &self.sink {
                let file = spill_to_disk(buf).await?;
                tracing::debug!(total_size = total, "upload spool moved to disk");
                self.sink = Sink::Disk(file);
            }
        }

        match &mut self.sink {
            Sink::Memory(buf) => buf.extend_from_slice(chunk),
            Sink::Disk(file) => file.write_all(chunk).await.map_err(spool_io_error)?,
        }
        self.len = total;
        Ok(())
    }

    /// Hands the spooled body over for upload. A spilled file is flushed and
    /// rewound to its start.
    pub(crate) async fn into_content(self) -> Result<ObjectContent, UploadError> {
        match self.sink {
            Sink::Memory(buf) => Ok(ObjectContent::Memory(buf.freeze())),
            Sink::Disk(mut file) => {
                file.flush().await.map_err(spool_io_error)?;
                file.seek(SeekFrom::Start(0)).await.map_err(spool_io_error)?;
                Ok(ObjectContent::File {
                    file,
                    len: self.len,
                })
            }
        }
    }
}

async fn spill_to_disk(buffered: &[u8]) -> Result<File, UploadError> {
    let mut file = File::from_std(tempfile::tempfile().map_err(spool_io_error)?);
    file.write_all(buffered).await.map_err(spool_io_error)?;
    Ok(file)
}

fn spool_io_error(err: std::io::Error) -> UploadError {
    UploadError::Internal(format!("upload spool I/O failed: {err}"))
}

/// Drains a multipart field into a fresh spool, aborting as soon as the
/// ceiling is crossed. This is the authoritative size check: it does not
/// depend on anything the client declared.
pub(crate) async fn spool_field(
    field: &mut Field<'_>,
    max_bytes: Option<u64>,
) -> Result<UploadSpool, UploadError> {
    let mut spool = UploadSpool::new(max_bytes);
    while let Some(chunk) = field.chunk().await? {
        if let Err(err) = spool.push(&chunk).await {
            tracing::warn!(
                total_size = spool.len() + chunk.len() as u64,
                max_size = ?max_bytes,
                "upload exceeded the configured maximum size, aborting"
            );
            return Err(err);
        }
    }
    Ok(spool)
}
