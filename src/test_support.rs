//! In-process test cluster.
//!
//! Builds a ring of `MemoryNode`s behind a `MemoryDispatcher`, records every
//! request each node receives, and lets a test make any node go silent or
//! answer every request with an error.

use crate::config::ClusterConfig;
use crate::context::CoordinatorContext;
use crate::correlator::ReplyCorrelator;
use crate::messages::types::{ArchiveErrorCode, AuditErrorCode, RetrieveErrorCode};
use crate::messages::*;
use crate::node::MemoryNode;
use crate::placement::ring::NodeRing;
use crate::placement::types::NodeId;
use crate::transport::MemoryDispatcher;

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBehaviour {
    Healthy,
    /// Receives requests and never answers.
    Silent,
    /// Answers every request with an error reply.
    Failing,
    /// Answers the first `n` requests it sees from now on, then fails.
    FailAfter(usize),
    /// Answers `RetrieveKeyStart` with this error code, everything else normally.
    RetrieveError(RetrieveErrorCode),
    /// Rejects archives and destroys of this segment number, everything else normally.
    RejectSegment(u8),
    /// Serves reads with the first byte of every first chunk flipped.
    CorruptReads,
}

#[derive(Default)]
pub struct MessageRecorder {
    received: Mutex<Vec<(NodeId, Message)>>,
}

impl MessageRecorder {
    fn record(&self, node: &NodeId, message: &Message) {
        if let Ok(mut received) = self.received.lock() {
            received.push((node.clone(), message.clone()));
        }
    }

    pub fn all(&self) -> Vec<(NodeId, Message)> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn received_by(&self, node: &NodeId) -> Vec<Message> {
        self.all()
            .into_iter()
            .filter(|(to, _)| to == node)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut received) = self.received.lock() {
            received.clear();
        }
    }
}

pub struct TestCluster {
    pub config: ClusterConfig,
    pub ctx: Arc<CoordinatorContext>,
    pub nodes: Vec<Arc<MemoryNode>>,
    pub recorder: Arc<MessageRecorder>,
    pub dispatcher: Arc<MemoryDispatcher>,
    behaviours: Arc<DashMap<NodeId, NodeBehaviour>>,
}

impl TestCluster {
    /// Starts `node_count` healthy nodes. Must run inside a tokio runtime.
    pub fn start(node_count: usize, slice_size: usize) -> Self {
        let mut config = ClusterConfig::local(node_count, 0);
        config.slice_size = slice_size;
        config.reply_timeout_ms = 200;
        Self::with_config(config)
    }

    pub fn with_config(config: ClusterConfig) -> Self {
        let ring = Arc::new(NodeRing::from_config(&config));
        let correlator = Arc::new(ReplyCorrelator::new());
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let recorder = Arc::new(MessageRecorder::default());
        let behaviours = Arc::new(DashMap::new());

        let mut nodes = Vec::new();
        for id in config.node_ids() {
            let node = Arc::new(MemoryNode::new(
                id.clone(),
                config.nodes.len() as u32,
                config.slice_size,
                config.digest,
            ));
            behaviours.insert(id.clone(), NodeBehaviour::Healthy);

            let mut requests = dispatcher.connect(id.clone());
            let node_task = Arc::clone(&node);
            let correlator = Arc::clone(&correlator);
            let recorder = Arc::clone(&recorder);
            let behaviours = Arc::clone(&behaviours);
            tokio::spawn(async move {
                while let Some(frame) = requests.recv().await {
                    let Ok(message) = frame.to_message() else {
                        continue;
                    };
                    recorder.record(&id, &message);

                    let behaviour = behaviours
                        .get(&id)
                        .map(|b| *b)
                        .unwrap_or(NodeBehaviour::Healthy);
                    let reply = match behaviour {
                        NodeBehaviour::Healthy => node_task.handle(message),
                        NodeBehaviour::Silent => None,
                        NodeBehaviour::Failing => error_reply(&message),
                        NodeBehaviour::FailAfter(0) => {
                            behaviours.insert(id.clone(), NodeBehaviour::Failing);
                            error_reply(&message)
                        }
                        NodeBehaviour::FailAfter(n) => {
                            behaviours.insert(id.clone(), NodeBehaviour::FailAfter(n - 1));
                            node_task.handle(message)
                        }
                        NodeBehaviour::RetrieveError(code) => match &message {
                            Message::RetrieveKeyStart(m) => {
                                Some(Message::RetrieveKeyStartReply(RetrieveKeyStartReply {
                                    request_id: m.request_id,
                                    result: Err(code.reply("injected retrieve error")),
                                }))
                            }
                            _ => node_task.handle(message),
                        },
                        NodeBehaviour::RejectSegment(number) => match &message {
                            Message::ArchiveKeyEntire(m) if m.segment_number == number => {
                                error_reply(&message)
                            }
                            Message::ArchiveKeyStart(m) if m.segment_number == number => {
                                error_reply(&message)
                            }
                            Message::DestroyKey(m) if m.segment_number == number => {
                                error_reply(&message)
                            }
                            _ => node_task.handle(message),
                        },
                        NodeBehaviour::CorruptReads => corrupt_first_chunk(node_task.handle(message)),
                    };
                    if let Some(reply) = reply {
                        correlator.deliver(&id, reply);
                    }
                }
            });
            nodes.push(node);
        }

        let ctx = Arc::new(CoordinatorContext::new(
            &config,
            ring,
            correlator,
            dispatcher.clone(),
        ));

        Self {
            config,
            ctx,
            nodes,
            recorder,
            dispatcher,
            behaviours,
        }
    }

    pub fn node_id(&self, index: usize) -> NodeId {
        self.nodes[index].name().clone()
    }

    pub fn set_behaviour(&self, index: usize, behaviour: NodeBehaviour) {
        self.behaviours.insert(self.node_id(index), behaviour);
    }
}

/// The error reply a node would send back for `request`.
pub fn error_reply(request: &Message) -> Option<Message> {
    let request_id = request.request_id();

    Some(match request {
        Message::ArchiveKeyEntire(_) | Message::ArchiveKeyFinal(_) => {
            Message::ArchiveKeyFinalReply(ArchiveKeyFinalReply {
                request_id,
                result: archive_error(),
            })
        }
        Message::ArchiveKeyStart(_) => Message::ArchiveKeyStartReply(StatusReply {
            request_id,
            result: archive_error(),
        }),
        Message::ArchiveKeyNext(_) => Message::ArchiveKeyNextReply(StatusReply {
            request_id,
            result: archive_error(),
        }),
        Message::RetrieveKeyStart(_) => Message::RetrieveKeyStartReply(RetrieveKeyStartReply {
            request_id,
            result: Err(RetrieveErrorCode::Database.reply("injected failure")),
        }),
        Message::RetrieveKeyNext(_) => Message::RetrieveKeyNextReply(RetrieveKeyNextReply {
            request_id,
            result: Err(RetrieveErrorCode::Exception.reply("injected failure")),
        }),
        Message::DestroyKey(_) => Message::DestroyKeyReply(DestroyKeyReply {
            request_id,
            result: archive_error(),
        }),
        Message::AntiEntropyAudit(_) => Message::AntiEntropyAuditReply(StatusReply {
            request_id,
            result: Err(AuditErrorCode::OtherError.reply("injected failure")),
        }),
        _ => return None,
    })
}

fn corrupt_first_chunk(reply: Option<Message>) -> Option<Message> {
    match reply {
        Some(Message::RetrieveKeyStartReply(mut reply)) => {
            if let Ok(segment) = reply.result.as_mut()
                && !segment.data.is_empty()
            {
                let mut data = segment.data.to_vec();
                data[0] ^= 0xff;
                segment.data = Bytes::from(data);
            }
            Some(Message::RetrieveKeyStartReply(reply))
        }
        other => other,
    }
}

fn archive_error<T>() -> Result<T, ReplyError> {
    Err(ArchiveErrorCode::Exception.reply("injected failure"))
}
