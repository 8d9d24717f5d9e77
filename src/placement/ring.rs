use super::types::{NodeHealth, NodeId, NodeState};
use crate::config::ClusterConfig;

use dashmap::DashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Placement and health state for a fixed set of storage nodes.
///
/// Segment `i` (0-based) is owned by `nodes[i]`. When that node is down the
/// segment is routed to its ring successors, skipping nodes that are down
/// themselves. Reads go straight to the `DashMap`s; every health transition
/// is serialized through `transitions`.
pub struct NodeRing {
    nodes: Vec<NodeId>,
    handoff_count: usize,
    health: DashMap<NodeId, NodeHealth>,
    /// Handoff routing cached while a segment's primary is down.
    handoffs: DashMap<usize, Vec<NodeId>>,
    transitions: Mutex<()>,
}

impl NodeRing {
    pub fn new(nodes: Vec<NodeId>, handoff_count: usize) -> Self {
        let health = DashMap::new();
        for node in &nodes {
            health.insert(node.clone(), NodeHealth::up());
        }

        Self {
            nodes,
            handoff_count,
            health,
            handoffs: DashMap::new(),
            transitions: Mutex::new(()),
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(config.node_ids(), config.handoff_count)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.health.contains_key(node)
    }

    /// The node that owns `segment_index` while it is up.
    pub fn primary_for(&self, segment_index: usize) -> NodeId {
        self.nodes[segment_index % self.nodes.len()].clone()
    }

    pub fn is_down(&self, node: &NodeId) -> bool {
        self.health
            .get(node)
            .map(|health| health.is_down())
            .unwrap_or(false)
    }

    pub fn health(&self, node: &NodeId) -> Option<NodeHealth> {
        self.health.get(node).map(|health| health.clone())
    }

    pub fn down_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| self.is_down(node))
            .cloned()
            .collect()
    }

    /// Marks `node` down. Returns `false` if it already was (or is unknown).
    ///
    /// Cached handoff lists that route through `node` are dropped so the next
    /// lookup picks a live successor instead.
    pub fn mark_down(&self, node: &NodeId) -> bool {
        let _guard = self.lock_transitions();

        let Some(mut health) = self.health.get_mut(node) else {
            tracing::warn!("mark_down for unknown node {}", node);
            return false;
        };
        if health.is_down() {
            return false;
        }
        health.state = NodeState::Down;
        health.changed_at = Instant::now();
        health.transitions += 1;
        drop(health);

        self.handoffs.retain(|_, route| !route.contains(node));

        tracing::warn!("Node {} marked down", node);
        true
    }

    /// Marks `node` up again and forgets the handoff routing of the segments
    /// it is primary for. Returns `false` if it was not down.
    pub fn mark_up(&self, node: &NodeId) -> bool {
        let _guard = self.lock_transitions();

        let Some(mut health) = self.health.get_mut(node) else {
            tracing::warn!("mark_up for unknown node {}", node);
            return false;
        };
        if !health.is_down() {
            return false;
        }
        health.state = NodeState::Up;
        health.changed_at = Instant::now();
        health.transitions += 1;
        drop(health);

        let len = self.nodes.len();
        self.handoffs
            .retain(|segment_index, _| &self.nodes[*segment_index % len] != node);

        tracing::info!("Node {} marked up", node);
        true
    }

    /// Alternate destinations for `segment_index`, in ring-successor order.
    ///
    /// The primary is never part of the list and neither is any node that is
    /// down at the time the list is computed. While the primary is down the
    /// list is cached, so every operation during one outage routes the same
    /// way.
    pub fn handoff_nodes_for(&self, segment_index: usize) -> Vec<NodeId> {
        let segment_index = segment_index % self.nodes.len();
        let primary = &self.nodes[segment_index];

        if !self.is_down(primary) {
            return self.compute_handoffs(segment_index);
        }

        if let Some(cached) = self.handoffs.get(&segment_index) {
            return cached.value().clone();
        }

        let _guard = self.lock_transitions();
        if !self.is_down(primary) {
            return self.compute_handoffs(segment_index);
        }
        self.handoffs
            .entry(segment_index)
            .or_insert_with(|| self.compute_handoffs(segment_index))
            .value()
            .clone()
    }

    fn compute_handoffs(&self, segment_index: usize) -> Vec<NodeId> {
        let len = self.nodes.len();
        (1..len)
            .map(|offset| &self.nodes[(segment_index + offset) % len])
            .filter(|node| !self.is_down(node))
            .take(self.handoff_count)
            .cloned()
            .collect()
    }

    fn lock_transitions(&self) -> MutexGuard<'_, ()> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
