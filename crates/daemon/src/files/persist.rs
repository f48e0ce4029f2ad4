//! Writing received files to the save directory.
//!
//! A file is always created exclusively, so an existing file is never
//! overwritten. Timestamps are applied after the content is on disk; metadata
//! failures are logged and otherwise ignored.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::FileTransferFrame;
use thiserror::Error;
use tracing::{debug, warn};

use super::format::fallback_name;
use super::naming::{sanitize_file_name, NamingError, UniqueNameResolver};
use crate::platform::MetadataApplier;

/// Errors while writing file content.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The file could not be created or written.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PersistError {
    fn io(path: &Path, source: io::Error) -> Self {
        PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Errors while storing a whole frame.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Outcome of a successful store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Where the content landed.
    pub path: PathBuf,
    /// Number of content bytes written.
    pub bytes_written: u64,
    /// Whether embedded capture metadata could be inspected.
    pub capture_metadata_applied: bool,
}

/// Stores frames in a single directory under collision-free names.
pub struct PersistenceSink {
    resolver: UniqueNameResolver,
    metadata: Arc<dyn MetadataApplier>,
}

impl PersistenceSink {
    pub fn new(resolver: UniqueNameResolver, metadata: Arc<dyn MetadataApplier>) -> Self {
        Self { resolver, metadata }
    }

    /// The directory files are stored in.
    pub fn directory(&self) -> &Path {
        self.resolver.directory()
    }

    /// Write `content` to a new file at `path` and stamp its modification time.
    ///
    /// Fails if `path` already exists. A write error may leave a partial file.
    pub fn persist(&self, path: &Path, content: &[u8], last_modified: f64) -> Result<(), PersistError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| PersistError::io(path, e))?;

        write_content(path, file, content)?;
        self.apply_metadata(path, last_modified);
        Ok(())
    }

    /// Name, write and stamp a received frame.
    pub fn store(&self, frame: &FileTransferFrame) -> Result<StoredFile, StoreError> {
        let mut desired = sanitize_file_name(&frame.file_name);
        if desired.is_empty() {
            desired = fallback_name(&frame.content);
            debug!(fallback = %desired, "Client sent no usable file name");
        }

        let (path, file) = self.resolver.create_unique(&desired)?;
        write_content(&path, file, &frame.content)?;
        let capture_metadata_applied = self.apply_metadata(&path, frame.last_modified);

        Ok(StoredFile {
            path,
            bytes_written: frame.content.len() as u64,
            capture_metadata_applied,
        })
    }

    fn apply_metadata(&self, path: &Path, last_modified: f64) -> bool {
        if let Err(e) = self.metadata.apply_modified_time(path, last_modified) {
            warn!(
                path = %path.display(),
                last_modified,
                error = %e,
                "Failed to set modification time"
            );
        }
        self.metadata.apply_capture_metadata(path)
    }
}

/// Write and sync. A failure leaves whatever was written in place.
fn write_content(path: &Path, mut file: File, content: &[u8]) -> Result<(), PersistError> {
    write_all_to(path, &mut file, content)?;
    file.sync_all().map_err(|e| PersistError::io(path, e))
}

fn write_all_to<W: Write>(path: &Path, writer: &mut W, content: &[u8]) -> Result<(), PersistError> {
    writer
        .write_all(content)
        .and_then(|()| writer.flush())
        .map_err(|e| PersistError::io(path, e))
}
