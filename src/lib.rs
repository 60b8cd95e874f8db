//! notesync - applies remotely queued note events to a local notes vault.
//!
//! Events arrive through a signed webhook and are spooled per identity. A
//! subscription delivers each identity's buffer as an ordered batch, the batch
//! is appended to vault files one event at a time, and the buffer is drained
//! only once the whole batch has been written.

pub mod ack;
pub mod config;
pub mod engine;
pub mod notice;
pub mod persistence;
pub mod sequencer;
pub mod server;
pub mod source;
pub mod spool;
pub mod subscription;
pub mod types;
pub mod vault;
pub mod webhooks;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_utils;
