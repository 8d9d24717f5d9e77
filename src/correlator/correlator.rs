use super::types::{CorrelationKey, ReplyFailure};
use crate::messages::{Message, MessageKind, RequestId};
use crate::placement::types::NodeId;

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

struct PendingEntry {
    serial: u64,
    expected: MessageKind,
    slot: oneshot::Sender<Message>,
}

#[derive(Default)]
pub struct ReplyCorrelator {
    pending: DashMap<CorrelationKey, PendingEntry>,
    next_serial: AtomicU64,
}

impl ReplyCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in the `expected` reply to `request_id` from `node`.
    /// Must be called before the request is sent.
    pub fn register(
        self: &Arc<Self>,
        request_id: RequestId,
        node: NodeId,
        expected: MessageKind,
    ) -> PendingReply {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let (slot, receiver) = oneshot::channel();
        let key = CorrelationKey { request_id, node };

        let previous = self.pending.insert(
            key.clone(),
            PendingEntry {
                serial,
                expected,
                slot,
            },
        );
        if let Some(previous) = previous {
            tracing::warn!(
                "Replaced pending {} for {} on {}",
                previous.expected,
                key.request_id,
                key.node
            );
        }

        PendingReply {
            correlator: Arc::clone(self),
            key,
            serial,
            receiver: Some(receiver),
        }
    }

    /// Hands `message` from `from` to its waiter. Returns `false` when nobody
    /// is waiting for it.
    pub fn deliver(&self, from: &NodeId, message: Message) -> bool {
        let key = CorrelationKey {
            request_id: message.request_id(),
            node: from.clone(),
        };
        let kind = message.kind();

        match self
            .pending
            .remove_if(&key, |_, entry| entry.expected == kind)
        {
            Some((_, entry)) => {
                tracing::debug!("Delivering {} for {} from {}", kind, key.request_id, from);
                entry.slot.send(message).is_ok()
            }
            None => {
                if let Some(entry) = self.pending.get(&key) {
                    tracing::warn!(
                        "Unexpected {} for {} from {} (waiting for {})",
                        kind,
                        key.request_id,
                        from,
                        entry.expected
                    );
                } else {
                    tracing::debug!(
                        "Dropping late {} for {} from {}",
                        kind,
                        key.request_id,
                        from
                    );
                }
                false
            }
        }
    }

    /// Decodes a raw reply body and delivers it.
    pub fn deliver_frame(&self, from: &NodeId, kind: u8, body: &[u8]) -> bool {
        let decoded = MessageKind::from_u8(kind).and_then(|kind| Message::decode(kind, body));
        match decoded {
            Ok(message) => self.deliver(from, message),
            Err(e) => {
                tracing::warn!("Discarding malformed reply from {}: {}", from, e);
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: RequestId, node: &NodeId) -> bool {
        self.pending.contains_key(&CorrelationKey {
            request_id,
            node: node.clone(),
        })
    }

    fn forget(&self, key: &CorrelationKey, serial: u64) {
        self.pending.remove_if(key, |_, entry| entry.serial == serial);
    }
}

/// A registered wait for one reply. Dropping it removes the registration.
pub struct PendingReply {
    correlator: Arc<ReplyCorrelator>,
    key: CorrelationKey,
    serial: u64,
    receiver: Option<oneshot::Receiver<Message>>,
}

impl PendingReply {
    /// Waits up to `timeout` for the reply. Error replies come back as
    /// [`ReplyFailure::Failed`].
    pub async fn wait(mut self, timeout: Duration) -> Result<Message, ReplyFailure> {
        let Some(receiver) = self.receiver.take() else {
            return Err(ReplyFailure::Closed);
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(message)) if message.is_error() => Err(ReplyFailure::Failed(message)),
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(ReplyFailure::Closed),
            Err(_) => {
                tracing::debug!(
                    "Timed out after {:?} waiting on {} for {}",
                    timeout,
                    self.key.node,
                    self.key.request_id
                );
                Err(ReplyFailure::TimedOut)
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.correlator.forget(&self.key, self.serial);
    }
}
