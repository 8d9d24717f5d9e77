//! Retrieve Coordination Module
//!
//! Reads every segment of a key back from the cluster and reassembles it.
//!
//! ## Core Concepts
//! - **Routing**: Each segment tries the primary (if up), then its handoff nodes. Reads
//!   never mark nodes down; only the write path does.
//! - **Chunks**: The start reply carries the first chunk; `RetrieveKeyNext` pulls the rest.
//! - **Verification**: Every segment is checked against the checksum its node reports.
//! - **Consistency**: Segment count must match the ring and sizes must add up to the total.

pub mod retriever;

pub use retriever::{RetrievedKey, Retriever};
