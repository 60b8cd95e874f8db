//! Durable on-disk note buffer.
//!
//! Incoming note events are spooled per identity until they have been applied
//! to the vault:
//!
//! ```text
//! <spool_dir>/<identity>/<key>.json               - pending entry (raw event JSON)
//! <spool_dir>/<identity>/.<key>.json.<random>.tmp  - entry being written
//! ```
//!
//! # Crash Safety
//!
//! - Entries are written atomically (temp file + fsync + rename + dir fsync)
//! - Draining removes exactly the delivered entry files and fsyncs the directory
//! - Orphaned temp files are removed before a buffer is watched
//!
//! # Ordering
//!
//! Keys sort in arrival order (see [`next_entry_key`]); the listing of a
//! buffer is always in key order, which is the order entries are applied in.
//! An entry whose write finishes after a later key was already delivered is
//! delivered with the next batch; draining only ever removes delivered keys.

pub mod drain;
pub mod entry;

pub use drain::{cleanup_temp_files, drain_entries, list_pending};
pub use entry::{
    SpoolError, buffer_dir, entry_path, next_entry_key, spool_entry, validate_identity,
    validate_key,
};
