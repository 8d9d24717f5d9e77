use super::{SpaceAccounting, SpaceUsage};
use dashmap::DashMap;

/// In-memory running total per avatar.
#[derive(Default)]
pub struct SpaceLedger {
    totals: DashMap<u64, i64>,
}

impl SpaceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usage(&self, avatar_id: u64) -> i64 {
        self.totals.get(&avatar_id).map(|total| *total).unwrap_or(0)
    }

    pub fn avatars(&self) -> Vec<u64> {
        let mut avatars: Vec<u64> = self.totals.iter().map(|entry| *entry.key()).collect();
        avatars.sort_unstable();
        avatars
    }
}

impl SpaceAccounting for SpaceLedger {
    fn record(&self, usage: SpaceUsage) {
        tracing::debug!(
            "Avatar {} space delta {} at {}",
            usage.avatar_id,
            usage.delta,
            usage.timestamp
        );
        *self.totals.entry(usage.avatar_id).or_insert(0) += usage.delta;
    }
}
