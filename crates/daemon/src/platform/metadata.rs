//! File timestamp handling backed by the `filetime` crate.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use chrono::{Local, TimeZone};
use filetime::{set_file_mtime, FileTime};
use protocol::millis_to_system_time;
use tracing::{debug, warn};

use super::exif::read_date_time_original;
use super::MetadataApplier;

/// How much of a file is scanned for an EXIF block.
const EXIF_SCAN_LIMIT: u64 = 256 * 1024;

/// Applies modification times with `filetime` and reads EXIF capture dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTimeMetadata;

impl MetadataApplier for FileTimeMetadata {
    fn apply_modified_time(&self, path: &Path, epoch_ms: f64) -> io::Result<()> {
        let time = millis_to_system_time(epoch_ms).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("timestamp out of range: {}", epoch_ms),
            )
        })?;
        set_file_mtime(path, FileTime::from_system_time(time))
    }

    fn apply_capture_metadata(&self, path: &Path) -> bool {
        let head = match read_head(path, EXIF_SCAN_LIMIT) {
            Ok(head) => head,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read file for capture metadata");
                return false;
            }
        };

        // No capture date is not a failure; the client timestamp stays in place.
        let Some(taken) = read_date_time_original(&head) else {
            return true;
        };
        let Some(local) = Local.from_local_datetime(&taken).earliest() else {
            debug!(path = %path.display(), %taken, "Capture date does not exist in local time");
            return true;
        };

        let time = FileTime::from_unix_time(local.timestamp(), local.timestamp_subsec_nanos());
        if let Err(e) = set_file_mtime(path, time) {
            warn!(path = %path.display(), error = %e, "Failed to apply capture date");
        } else {
            debug!(path = %path.display(), %taken, "Applied capture date");
        }
        true
    }
}

fn read_head(path: &Path, limit: u64) -> io::Result<Vec<u8>> {
    let mut head = Vec::new();
    File::open(path)?.take(limit).read_to_end(&mut head)?;
    Ok(head)
}
