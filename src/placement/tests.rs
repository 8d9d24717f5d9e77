//! Placement Module Tests
//!
//! ## Test Scopes
//! - **Ring**: Stable primaries, handoff selection, idempotent health transitions.
//! - **Routes**: Destination order for one segment.
//! - **Probe**: Down nodes that answer again are marked up.

#[cfg(test)]
mod tests {
    use crate::placement::probe::probe_down_nodes;
    use crate::placement::ring::NodeRing;
    use crate::placement::route::SegmentRoute;
    use crate::placement::types::{NodeId, NodeState};
    use crate::test_support::{NodeBehaviour, TestCluster};
    use std::sync::Arc;

    fn ring(count: usize) -> NodeRing {
        let nodes = (0..count).map(|i| NodeId::new(format!("n{}", i))).collect();
        NodeRing::new(nodes, 2)
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|name| NodeId::from(*name)).collect()
    }

    fn drain(route: &mut SegmentRoute, ring: &NodeRing) -> Vec<NodeId> {
        std::iter::from_fn(|| route.next(ring)).collect()
    }

    // ============================================================
    // RING TESTS
    // ============================================================

    #[test]
    fn test_primary_is_stable() {
        let ring = ring(10);

        for i in 0..10 {
            assert_eq!(ring.primary_for(i), NodeId::new(format!("n{}", i)));
            assert_eq!(ring.primary_for(i), ring.primary_for(i + 10));
        }

        ring.mark_down(&NodeId::from("n3"));
        ring.mark_up(&NodeId::from("n3"));
        assert_eq!(ring.primary_for(3), NodeId::from("n3"));
    }

    #[test]
    fn test_handoffs_skip_primary_and_down_nodes() {
        let ring = ring(10);
        assert_eq!(ring.handoff_nodes_for(9), ids(&["n0", "n1"]));

        ring.mark_down(&NodeId::from("n5"));
        let handoffs = ring.handoff_nodes_for(4);
        assert_eq!(handoffs, ids(&["n6", "n7"]));

        ring.mark_down(&NodeId::from("n4"));
        let handoffs = ring.handoff_nodes_for(4);
        assert!(!handoffs.is_empty());
        assert!(!handoffs.contains(&NodeId::from("n4")));
        assert!(!handoffs.contains(&NodeId::from("n5")));
    }

    #[test]
    fn test_mark_transitions_are_idempotent() {
        let ring = ring(3);
        let node = NodeId::from("n1");

        assert!(ring.mark_down(&node));
        assert!(!ring.mark_down(&node));
        assert!(ring.is_down(&node));
        assert_eq!(ring.health(&node).unwrap().state, NodeState::Down);

        assert!(ring.mark_up(&node));
        assert!(!ring.mark_up(&node));
        assert!(!ring.is_down(&node));
        assert_eq!(ring.health(&node).unwrap().transitions, 2);

        assert!(!ring.mark_down(&NodeId::from("unknown")));
        assert!(!ring.contains(&NodeId::from("unknown")));
    }

    #[test]
    fn test_handoffs_are_cached_during_outage() {
        let ring = ring(10);
        ring.mark_down(&NodeId::from("n0"));
        assert_eq!(ring.handoff_nodes_for(0), ids(&["n1", "n2"]));

        // Unrelated failures leave the cached route alone.
        ring.mark_down(&NodeId::from("n5"));
        assert_eq!(ring.handoff_nodes_for(0), ids(&["n1", "n2"]));

        // Losing a node on the route recomputes it.
        ring.mark_down(&NodeId::from("n1"));
        assert_eq!(ring.handoff_nodes_for(0), ids(&["n2", "n3"]));
    }

    #[test]
    fn test_mark_up_forgets_cached_route() {
        let ring = ring(5);
        ring.mark_down(&NodeId::from("n0"));
        ring.mark_down(&NodeId::from("n1"));
        assert_eq!(ring.handoff_nodes_for(0), ids(&["n2", "n3"]));

        ring.mark_up(&NodeId::from("n0"));
        ring.mark_up(&NodeId::from("n1"));
        ring.mark_down(&NodeId::from("n0"));
        assert_eq!(ring.handoff_nodes_for(0), ids(&["n1", "n2"]));
    }

    #[test]
    fn test_single_node_ring_has_no_handoffs() {
        let ring = ring(1);
        ring.mark_down(&NodeId::from("n0"));
        assert!(ring.handoff_nodes_for(0).is_empty());
        assert_eq!(ring.down_nodes(), ids(&["n0"]));
    }

    #[tokio::test]
    async fn test_concurrent_lookups_agree() {
        let ring = Arc::new(ring(10));
        ring.mark_down(&NodeId::from("n2"));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let ring = Arc::clone(&ring);
            handles.push(tokio::spawn(async move { ring.handoff_nodes_for(2) }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), ids(&["n3", "n4"]));
        }
    }

    // ============================================================
    // ROUTE TESTS
    // ============================================================

    #[test]
    fn test_route_tries_primary_then_handoffs() {
        let ring = ring(5);
        let mut route = SegmentRoute::new(1);

        assert_eq!(route.segment_index(), 1);
        assert_eq!(drain(&mut route, &ring), ids(&["n1", "n2", "n3"]));
        assert!(route.next(&ring).is_none());
    }

    #[test]
    fn test_route_skips_down_primary() {
        let ring = ring(5);
        ring.mark_down(&NodeId::from("n1"));

        let mut route = SegmentRoute::new(1);
        assert_eq!(drain(&mut route, &ring), ids(&["n2", "n3"]));
    }

    #[test]
    fn test_route_sees_primary_marked_down_mid_walk() {
        let ring = ring(5);
        let mut route = SegmentRoute::new(0);

        assert_eq!(route.next(&ring), Some(NodeId::from("n0")));
        ring.mark_down(&NodeId::from("n0"));
        ring.mark_down(&NodeId::from("n1"));

        assert_eq!(drain(&mut route, &ring), ids(&["n2", "n3"]));
    }

    // ============================================================
    // PROBE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_probe_marks_answering_nodes_up() {
        let cluster = TestCluster::start(3, 1024);
        let ring = &cluster.ctx.ring;
        ring.mark_down(&cluster.node_id(0));
        ring.mark_down(&cluster.node_id(1));
        cluster.set_behaviour(1, NodeBehaviour::Silent);

        let recovered = probe_down_nodes(&cluster.ctx).await;

        assert_eq!(recovered, 1);
        assert!(!ring.is_down(&cluster.node_id(0)));
        assert!(ring.is_down(&cluster.node_id(1)));
    }

    #[tokio::test]
    async fn test_probe_counts_error_reply_as_alive() {
        let cluster = TestCluster::start(2, 1024);
        cluster.ctx.ring.mark_down(&cluster.node_id(1));
        cluster.set_behaviour(1, NodeBehaviour::Failing);

        assert_eq!(probe_down_nodes(&cluster.ctx).await, 1);
        assert!(cluster.ctx.ring.down_nodes().is_empty());
    }
}
