//! Archive Coordination Module
//!
//! Writes a key across the cluster: one segment per node, each segment
//! routed independently and handed off when its destination fails.
//!
//! ## Core Concepts
//! - **Fan-out / fan-in**: Every segment runs concurrently. The archive succeeds only
//!   when every segment has been acknowledged.
//! - **Entire vs sliced**: A segment that fits in one slice travels as `ArchiveKeyEntire`.
//!   Larger ones go out as Start, Next..., Final, each step waiting for its reply.
//! - **Handoff**: A failed destination is marked down and the segment starts over on
//!   the next handoff node with a fresh request id and slice sequence.
//! - **Destroy**: Tombstones are written through the same routing.

pub mod archiver;
pub mod destroyer;

pub use archiver::Archiver;
pub use destroyer::Destroyer;
