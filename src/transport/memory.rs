use super::Dispatcher;
use super::frame::Frame;
use crate::error::{Error, Result};
use crate::messages::Message;
use crate::placement::types::NodeId;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// In-process dispatcher: one unbounded channel of encoded frames per node.
#[derive(Default)]
pub struct MemoryDispatcher {
    queues: DashMap<NodeId, mpsc::UnboundedSender<Frame>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or replaces) the queue for `node` and returns its receiving end.
    pub fn connect(&self, node: NodeId) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.insert(node, tx);
        rx
    }

    /// Drops the queue for `node`. Later sends fail with
    /// [`Error::NodeUnavailable`] until it connects again.
    pub fn disconnect(&self, node: &NodeId) {
        if self.queues.remove(node).is_some() {
            tracing::info!("Disconnected {}", node);
        }
    }
}

impl Dispatcher for MemoryDispatcher {
    fn send(&self, node: &NodeId, message: Message) -> Result<()> {
        let Some(queue) = self.queues.get(node) else {
            return Err(Error::NodeUnavailable {
                node: node.clone(),
                reason: "not connected".into(),
            });
        };

        tracing::debug!("Queueing {} for {}", message.kind(), node);
        queue
            .send(Frame::from_message(&message))
            .map_err(|_| Error::NodeUnavailable {
                node: node.clone(),
                reason: "queue closed".into(),
            })
    }
}
