//! Platform capabilities consumed by the daemon.
//!
//! The upload path never talks to the operating system's dialogs or metadata
//! APIs directly. It goes through two narrow traits:
//!
//! - [`DirectorySelector`]: picks the save directory once at startup
//! - [`MetadataApplier`]: stamps timestamps onto stored files, best effort
//!
//! Defaults are no-ops so the session logic has no platform dependency; the
//! binary wires in [`FileTimeMetadata`] and a configured or prompted directory.

pub mod exif;
pub mod metadata;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

pub use metadata::FileTimeMetadata;

/// Chooses the directory that receives uploads.
pub trait DirectorySelector: Send + Sync {
    /// Returns the selected directory, or `None` when nothing was chosen.
    fn select_directory(&self) -> Option<PathBuf>;
}

/// Applies timestamps and capture metadata to a stored file.
///
/// Failures are reported but never invalidate a file that is already on disk.
pub trait MetadataApplier: Send + Sync {
    /// Set the file's modification time from milliseconds since the Unix epoch.
    fn apply_modified_time(&self, path: &Path, epoch_ms: f64) -> io::Result<()>;

    /// Apply metadata embedded in the file itself (e.g. the EXIF capture date).
    ///
    /// Returns `false` when the file could not be inspected.
    fn apply_capture_metadata(&self, path: &Path) -> bool;
}

/// Metadata applier that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadata;

impl MetadataApplier for NoopMetadata {
    fn apply_modified_time(&self, _path: &Path, _epoch_ms: f64) -> io::Result<()> {
        Ok(())
    }

    fn apply_capture_metadata(&self, _path: &Path) -> bool {
        false
    }
}

/// Directory selector that never selects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

impl DirectorySelector for NoDirectory {
    fn select_directory(&self) -> Option<PathBuf> {
        None
    }
}

/// A directory chosen ahead of time (CLI flag, config file or environment).
#[derive(Debug, Clone)]
pub struct FixedDirectory(pub PathBuf);

impl DirectorySelector for FixedDirectory {
    fn select_directory(&self) -> Option<PathBuf> {
        if self.0.is_dir() {
            Some(absolute(&self.0))
        } else {
            tracing::error!(path = %self.0.display(), "Save directory does not exist");
            None
        }
    }
}

/// Asks for the save directory on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptDirectory;

impl PromptDirectory {
    /// Run the prompt against arbitrary input and output streams.
    ///
    /// Empty input or end of input selects nothing. A path that is not an
    /// existing directory is reported and asked for again.
    pub fn prompt_with<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> Option<PathBuf> {
        loop {
            write!(output, "Directory to save received files into: ").ok()?;
            output.flush().ok()?;

            let mut line = String::new();
            if input.read_line(&mut line).ok()? == 0 {
                return None;
            }

            let answer = line.trim();
            if answer.is_empty() {
                return None;
            }

            let path = PathBuf::from(answer);
            if path.is_dir() {
                return Some(absolute(&path));
            }
            writeln!(output, "Not a directory: {}", path.display()).ok()?;
        }
    }
}

impl DirectorySelector for PromptDirectory {
    fn select_directory(&self) -> Option<PathBuf> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.prompt_with(stdin.lock(), stdout.lock())
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
