//! Segmented Archive Cluster Library
//!
//! A coordination layer that stores each key as one segment per storage node
//! and reads it back, routing around failed nodes with handoff.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`segment`**: Splits content into per-node segments and slices with Adler-32 and
//!   digest checksums, and joins them back.
//! - **`messages`**: The binary node protocol: message kinds, request ids, result codes
//!   and the fixed-layout codec.
//! - **`placement`**: The node ring. Primary and handoff routing per segment, node health
//!   and the recovery probe that brings down nodes back.
//! - **`correlator`**: Matches replies to the request that is waiting for them.
//! - **`transport`**: Delivers frames to nodes, in process or over TCP.
//! - **`archive`** / **`retrieve`**: The coordinators that fan a key out across the ring
//!   and gather it back.
//! - **`node`**: An in-memory storage node speaking the same protocol.
//! - **`gateway`**: The HTTP front end and space accounting hooks.

pub mod accounting;
pub mod archive;
pub mod config;
pub mod context;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod node;
pub mod placement;
pub mod retrieve;
pub mod segment;
pub mod transport;

#[cfg(test)]
mod test_support;
