//! Storage Node Module
//!
//! An in-memory stand-in for a storage node, speaking the same wire messages
//! as a real one. Used by the `node` subcommand and by the test clusters.
//!
//! ## Core Concepts
//! - **History**: Every archive of a (avatar, key, segment) appends a version. Destroy
//!   appends a tombstone. Reads see the newest entry.
//! - **Uploads**: Start/Next/Final are accepted strictly in sequence order and verified
//!   against the running checksum before the segment is stored.
//! - **Read cursors**: Segments larger than one slice are returned as a first chunk plus
//!   `RetrieveKeyNext` chunks.

pub mod memory;
pub mod service;
pub mod types;

pub use memory::MemoryNode;
