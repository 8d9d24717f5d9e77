//! Placement Module
//!
//! Decides which storage node holds each segment and where a segment goes
//! while its node is unavailable.
//!
//! ## Core Concepts
//! - **Primary**: Segment `i` belongs to the `i`-th configured node. This never changes.
//! - **Health**: Every node is Up or Down. The write path marks nodes down when they fail;
//!   the recovery probe marks them up again once they answer.
//! - **Handoff**: While a primary is down its segments go to the next live nodes in ring
//!   order. The list is cached for the duration of the outage so reads find what writes stored.
//! - **Routes**: `SegmentRoute` walks the primary and handoff list for one segment.

pub mod probe;
pub mod ring;
pub mod route;
pub mod types;

#[cfg(test)]
mod tests;
