//! Space Accounting Module
//!
//! Reports how much storage an avatar gains or loses with each archive and
//! destroy. The coordinator only emits usage events; what happens to them is
//! up to the `SpaceAccounting` implementation.

pub mod ledger;

pub use ledger::SpaceLedger;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpaceUsage {
    pub avatar_id: u64,
    pub timestamp: f64,
    /// Bytes added (positive) or released (negative).
    pub delta: i64,
}

pub trait SpaceAccounting: Send + Sync {
    fn record(&self, usage: SpaceUsage);
}
