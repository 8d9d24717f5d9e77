use super::ring::NodeRing;
use super::types::NodeId;

/// Ordered destinations for one segment of one operation.
///
/// Yields the primary first when it is up, then the handoff list. The handoff
/// list is only fetched once the primary has been skipped or has failed, so a
/// `mark_down` issued by the caller in between is already reflected in it.
pub struct SegmentRoute {
    segment_index: usize,
    primary_checked: bool,
    handoffs: Option<Vec<NodeId>>,
    next_handoff: usize,
}

impl SegmentRoute {
    pub fn new(segment_index: usize) -> Self {
        Self {
            segment_index,
            primary_checked: false,
            handoffs: None,
            next_handoff: 0,
        }
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn next(&mut self, ring: &NodeRing) -> Option<NodeId> {
        if !self.primary_checked {
            self.primary_checked = true;
            let primary = ring.primary_for(self.segment_index);
            if !ring.is_down(&primary) {
                return Some(primary);
            }
            tracing::debug!(
                "Segment {} primary {} is down, routing to handoff",
                self.segment_index + 1,
                primary
            );
        }

        let handoffs = self
            .handoffs
            .get_or_insert_with(|| ring.handoff_nodes_for(self.segment_index));
        let node = handoffs.get(self.next_handoff).cloned();
        self.next_handoff += 1;
        node
    }
}
