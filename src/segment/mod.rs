//! Segment Splitting Module
//!
//! Turns a blob into one segment per storage node, and a segment into the
//! slices that travel on the wire.
//!
//! ## Core Concepts
//! - **Segments**: Contiguous and balanced. Sizes differ by at most one byte, the shorter ones last.
//! - **Slices**: Bounded pieces of a segment, numbered from 0, sent strictly in order.
//! - **Checksums**: Adler-32 plus a 16-byte digest, threaded from slice to slice so the
//!   last slice carries the checksum of the whole segment.

pub mod checksum;
pub mod splitter;
