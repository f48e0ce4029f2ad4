//! Storage of received files.
//!
//! - [`naming`]: sanitizing client names and picking collision-free paths
//! - [`format`]: content sniffing for nameless uploads
//! - [`persist`]: exclusive creation, write and timestamp application
//!
//! # Safety of client names
//!
//! Client-supplied names are reduced to a single path component before use.
//! A stored file always lands directly in the save directory and never
//! replaces an existing file.

pub mod format;
pub mod naming;
pub mod persist;

pub use format::{detect_format, fallback_name, ImageFormat};
pub use naming::{sanitize_file_name, NamingError, UniqueNameResolver, MAX_SUFFIX};
pub use persist::{PersistError, PersistenceSink, StoreError, StoredFile};
