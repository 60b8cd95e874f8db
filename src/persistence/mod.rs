//! Durable file writes.
//!
//! Every file this crate writes (note files in the vault, buffer entries in
//! the spool, the settings file) goes through [`write_atomic`], so a crash
//! leaves either the old or the new contents on disk, never a mix.

pub mod atomic;
pub mod fsync;

pub use atomic::{TEMP_SUFFIX, is_temp_name, write_atomic};
pub use fsync::{fsync_dir, fsync_file};
