//! Core domain types for note synchronisation.

pub mod event;
pub mod ids;

pub use event::{Batch, BufferEntry, Event, NewlinePolicy, PathSpec};
pub use ids::{EntryKey, Identity};
