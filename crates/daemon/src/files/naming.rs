//! Collision-free output names.
//!
//! A desired name `photo.jpg` maps to `photo.jpg`, then `photo_1.jpg`,
//! `photo_2.jpg`, ... up to [`MAX_SUFFIX`]. Names are derived from what is on
//! disk, never from an in-process counter, so sessions on different threads
//! agree on the namespace.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Highest numeric suffix tried before giving up on a name.
pub const MAX_SUFFIX: u32 = 500_000;

/// Longest name (in bytes) kept from the client, leaving room for a suffix.
const MAX_NAME_BYTES: usize = 200;

/// Characters that are not allowed in a stored file name.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Errors that can occur while picking an output name.
#[derive(Debug, Error)]
pub enum NamingError {
    /// Every candidate up to the suffix bound is taken.
    #[error("no free name for {desired:?}: all suffixes up to {max_suffix} are taken")]
    ExhaustedNamespace { desired: String, max_suffix: u32 },

    /// The filesystem could not be queried.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Map raw client name bytes onto a single safe path component.
///
/// Directory components are dropped, control and reserved characters become
/// `_`, and trailing dots and spaces are trimmed. Returns an empty string
/// when nothing usable is left.
pub fn sanitize_file_name(raw: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(raw);
    let last = lossy.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        return String::new();
    }

    truncate_name(trimmed)
}

/// Shorten an over-long name, keeping its extension.
fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }

    let (stem, ext) = split_name(name);
    let ext = if ext.len() < MAX_NAME_BYTES / 2 { ext } else { "" };
    let mut end = MAX_NAME_BYTES - ext.len();
    while !stem.is_char_boundary(end.min(stem.len())) {
        end -= 1;
    }
    format!("{}{}", &stem[..end.min(stem.len())], ext)
}

/// Split a file name into stem and extension (the extension keeps its dot).
///
/// The split happens at the last dot; a leading dot does not start an
/// extension, so `.profile` has none.
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Resolves desired file names to non-colliding paths in one directory.
#[derive(Debug, Clone)]
pub struct UniqueNameResolver {
    directory: PathBuf,
    max_suffix: u32,
}

impl UniqueNameResolver {
    /// Create a resolver for `directory` with the default suffix bound.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_suffix: MAX_SUFFIX,
        }
    }

    /// Override the suffix bound.
    pub fn with_max_suffix(mut self, max_suffix: u32) -> Self {
        self.max_suffix = max_suffix;
        self
    }

    /// The directory names are resolved in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The suffix bound in effect.
    pub fn max_suffix(&self) -> u32 {
        self.max_suffix
    }

    /// Candidate paths in the order they are tried.
    fn candidates<'a>(&'a self, desired: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        let (stem, ext) = split_name(desired);
        std::iter::once(self.directory.join(desired)).chain(
            (1..=self.max_suffix)
                .map(move |counter| self.directory.join(format!("{}_{}{}", stem, counter, ext))),
        )
    }

    fn exhausted(&self, desired: &str) -> NamingError {
        NamingError::ExhaustedNamespace {
            desired: desired.to_string(),
            max_suffix: self.max_suffix,
        }
    }

    /// Return the first candidate path that does not exist.
    ///
    /// The check is not atomic with any later creation; use
    /// [`create_unique`](Self::create_unique) when several writers may race.
    pub fn resolve(&self, desired: &str) -> Result<PathBuf, NamingError> {
        for candidate in self.candidates(desired) {
            match fs::symlink_metadata(&candidate) {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
                Err(e) => return Err(NamingError::Io(e)),
            }
        }
        Err(self.exhausted(desired))
    }

    /// Claim the first free candidate by creating it exclusively.
    ///
    /// A candidate created by someone else between attempts is skipped, so two
    /// writers with the same desired name always end up with distinct files.
    pub fn create_unique(&self, desired: &str) -> Result<(PathBuf, File), NamingError> {
        for candidate in self.candidates(desired) {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(NamingError::Io(e)),
            }
        }
        Err(self.exhausted(desired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"taken").unwrap();
    }

    #[test]
    fn test_resolve_absent_returns_name_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = UniqueNameResolver::new(temp_dir.path());

        let path = resolver.resolve("a.jpg").unwrap();

        assert_eq!(path, temp_dir.path().join("a.jpg"));
    }

    #[test]
    fn test_resolve_first_collision() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.jpg");
        let resolver = UniqueNameResolver::new(temp_dir.path());

        assert_eq!(
            resolver.resolve("a.jpg").unwrap(),
            temp_dir.path().join("a_1.jpg")
        );
    }

    #[test]
    fn test_resolve_second_collision() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.jpg");
        touch(temp_dir.path(), "a_1.jpg");
        let resolver = UniqueNameResolver::new(temp_dir.path());

        assert_eq!(
            resolver.resolve("a.jpg").unwrap(),
            temp_dir.path().join("a_2.jpg")
        );
    }

    #[test]
    fn test_resolve_fills_gaps() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.jpg");
        touch(temp_dir.path(), "a_2.jpg");
        let resolver = UniqueNameResolver::new(temp_dir.path());

        assert_eq!(
            resolver.resolve("a.jpg").unwrap(),
            temp_dir.path().join("a_1.jpg")
        );
    }

    #[test]
    fn test_resolve_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "README");
        let resolver = UniqueNameResolver::new(temp_dir.path());

        assert_eq!(
            resolver.resolve("README").unwrap(),
            temp_dir.path().join("README_1")
        );
    }

    #[test]
    fn test_resolve_exhausted_namespace() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.jpg");
        for i in 1..=3 {
            touch(temp_dir.path(), &format!("a_{}.jpg", i));
        }
        let resolver = UniqueNameResolver::new(temp_dir.path()).with_max_suffix(3);

        let result = resolver.resolve("a.jpg");

        assert!(matches!(
            result,
            Err(NamingError::ExhaustedNamespace { max_suffix: 3, .. })
        ));
    }

    #[test]
    fn test_default_max_suffix() {
        let resolver = UniqueNameResolver::new("/tmp");
        assert_eq!(resolver.max_suffix(), 500_000);
    }

    #[test]
    fn test_create_unique_claims_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = UniqueNameResolver::new(temp_dir.path());

        let (first, _f1) = resolver.create_unique("x.bin").unwrap();
        let (second, _f2) = resolver.create_unique("x.bin").unwrap();
        let (third, _f3) = resolver.create_unique("x.bin").unwrap();

        assert_eq!(first, temp_dir.path().join("x.bin"));
        assert_eq!(second, temp_dir.path().join("x_1.bin"));
        assert_eq!(third, temp_dir.path().join("x_2.bin"));
    }

    #[test]
    fn test_create_unique_exhausted() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.jpg");
        touch(temp_dir.path(), "a_1.jpg");
        let resolver = UniqueNameResolver::new(temp_dir.path()).with_max_suffix(1);

        assert!(matches!(
            resolver.create_unique("a.jpg"),
            Err(NamingError::ExhaustedNamespace { .. })
        ));
    }

    #[test]
    fn test_create_unique_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = UniqueNameResolver::new(temp_dir.path().join("missing"));

        assert!(matches!(
            resolver.create_unique("a.jpg"),
            Err(NamingError::Io(_))
        ));
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("a.jpg"), ("a", ".jpg"));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_name("README"), ("README", ""));
        assert_eq!(split_name(".profile"), (".profile", ""));
    }

    #[test]
    fn test_sanitize_plain_name() {
        assert_eq!(sanitize_file_name(b"x.bin"), "x.bin");
        assert_eq!(sanitize_file_name("été.png".as_bytes()), "été.png");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name(b"../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(b"C:\\Users\\me\\pic.jpg"), "pic.jpg");
        assert_eq!(sanitize_file_name(b"/abs/path/"), "");
    }

    #[test]
    fn test_sanitize_rejects_dot_names() {
        assert_eq!(sanitize_file_name(b".."), "");
        assert_eq!(sanitize_file_name(b"."), "");
        assert_eq!(sanitize_file_name(b"   "), "");
        assert_eq!(sanitize_file_name(b""), "");
    }

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_file_name(b"a:b*c?.txt"), "a_b_c_.txt");
        assert_eq!(sanitize_file_name(b"tab\there.txt"), "tab_here.txt");
        assert_eq!(sanitize_file_name(b"name. . "), "name");
    }

    #[test]
    fn test_sanitize_invalid_utf8() {
        assert_eq!(sanitize_file_name(&[b'a', 0xFF, b'.', b'b']), "a\u{FFFD}.b");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = format!("{}.jpg", "x".repeat(400));

        let name = sanitize_file_name(long.as_bytes());

        assert_eq!(name.len(), MAX_NAME_BYTES);
        assert!(name.ends_with(".jpg"));
    }
}
