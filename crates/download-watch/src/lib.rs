//! Download synchronization and artifact archiving.
//!
//! [`DownloadWatch`] attributes new files in the shared download directory
//! to the action that triggered them via before/after snapshots; the
//! archive module moves completed artifacts into their deterministic final
//! layout (semantic prefixes, zip extraction, fixed-name replacement).

pub mod archive;
pub mod errors;
pub mod watch;

pub use archive::{
    apply_prefix, extract_archive, replace_file, sanitize_component, unique_destination,
};
pub use errors::DownloadError;
pub use watch::{await_quiescent, DownloadWatch, NameFilter, WatchConfig};
