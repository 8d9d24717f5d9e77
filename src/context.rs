//! Shared state for the archive, retrieve and destroy coordinators.

use crate::config::ClusterConfig;
use crate::correlator::{ReplyCorrelator, ReplyFailure};
use crate::messages::Message;
use crate::placement::ring::NodeRing;
use crate::placement::route::SegmentRoute;
use crate::placement::types::NodeId;
use crate::segment::checksum::DigestAlgorithm;
use crate::transport::Dispatcher;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct CoordinatorContext {
    pub ring: Arc<NodeRing>,
    pub correlator: Arc<ReplyCorrelator>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub reply_timeout: Duration,
    pub slice_size: usize,
    pub digest: DigestAlgorithm,
    pub max_object_size: u64,
}

impl CoordinatorContext {
    pub fn new(
        config: &ClusterConfig,
        ring: Arc<NodeRing>,
        correlator: Arc<ReplyCorrelator>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            ring,
            correlator,
            dispatcher,
            reply_timeout: config.reply_timeout(),
            slice_size: config.slice_size,
            digest: config.digest,
            max_object_size: config.max_object_size,
        }
    }

    /// Sends `message` to `node` and waits for the matching reply.
    pub async fn request(&self, node: &NodeId, message: Message) -> Result<Message, ReplyFailure> {
        let Some(expected) = message.kind().reply_kind() else {
            return Err(ReplyFailure::Dispatch(format!(
                "{} is not a request",
                message.kind()
            )));
        };

        let pending = self
            .correlator
            .register(message.request_id(), node.clone(), expected);
        self.dispatcher
            .send(node, message)
            .map_err(|e| ReplyFailure::Dispatch(e.to_string()))?;

        pending.wait(self.reply_timeout).await
    }

    /// Runs `attempt` against the write destinations of one segment until one
    /// succeeds. Every node that fails is marked down before the next
    /// destination is tried.
    ///
    /// Returns the node that took the write, or every (node, reason) tried.
    pub async fn write_with_handoff<T, F, Fut>(
        &self,
        segment_index: usize,
        mut attempt: F,
    ) -> Result<(NodeId, T), Vec<(NodeId, String)>>
    where
        F: FnMut(NodeId) -> Fut,
        Fut: Future<Output = Result<T, ReplyFailure>>,
    {
        let mut route = SegmentRoute::new(segment_index);
        let mut failures = Vec::new();

        while let Some(node) = route.next(&self.ring) {
            match attempt(node.clone()).await {
                Ok(value) => {
                    if !failures.is_empty() {
                        tracing::info!(
                            "Segment {} handed off to {} after {} failure(s)",
                            segment_index + 1,
                            node,
                            failures.len()
                        );
                    }
                    return Ok((node, value));
                }
                Err(failure) => {
                    tracing::warn!(
                        "Segment {} failed on {}: {}",
                        segment_index + 1,
                        node,
                        failure
                    );
                    self.ring.mark_down(&node);
                    failures.push((node, failure.to_string()));
                }
            }
        }

        Err(failures)
    }
}
