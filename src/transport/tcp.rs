use super::Dispatcher;
use super::frame::{Frame, read_frame, write_frame};
use crate::config::ClusterConfig;
use crate::correlator::ReplyCorrelator;
use crate::error::{Error, Result};
use crate::messages::Message;
use crate::placement::types::NodeId;

use dashmap::DashMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

/// Dispatcher over TCP. Each node gets a writer task, started on first use,
/// that connects lazily and reconnects after a write error. Frames sent while
/// a node is unreachable are dropped; their waiters time out.
pub struct TcpDispatcher {
    addrs: HashMap<NodeId, SocketAddr>,
    queues: DashMap<NodeId, mpsc::UnboundedSender<Frame>>,
    correlator: Arc<ReplyCorrelator>,
}

impl TcpDispatcher {
    pub fn new(config: &ClusterConfig, correlator: Arc<ReplyCorrelator>) -> Self {
        let addrs = config
            .nodes
            .iter()
            .map(|node| (NodeId::new(&node.name), node.addr))
            .collect();

        Self {
            addrs,
            queues: DashMap::new(),
            correlator,
        }
    }

    fn spawn_connection(&self, node: NodeId, addr: SocketAddr) -> mpsc::UnboundedSender<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = Arc::clone(&self.correlator);
        tokio::spawn(async move {
            connection_loop(node, addr, rx, correlator).await;
        });
        tx
    }
}

impl Dispatcher for TcpDispatcher {
    fn send(&self, node: &NodeId, message: Message) -> Result<()> {
        let Some(addr) = self.addrs.get(node).copied() else {
            return Err(Error::Dispatch {
                node: node.clone(),
                reason: "node has no configured address".into(),
            });
        };

        let frame = Frame::from_message(&message);
        let mut queue = self
            .queues
            .entry(node.clone())
            .or_insert_with(|| self.spawn_connection(node.clone(), addr));

        if let Err(mpsc::error::SendError(frame)) = queue.send(frame) {
            tracing::warn!("Connection task for {} ended, restarting", node);
            *queue = self.spawn_connection(node.clone(), addr);
            queue.send(frame).map_err(|_| Error::NodeUnavailable {
                node: node.clone(),
                reason: "connection task unavailable".into(),
            })?;
        }

        tracing::debug!("Queued {} for {} at {}", message.kind(), node, addr);
        Ok(())
    }
}

async fn connection_loop(
    node: NodeId,
    addr: SocketAddr,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    correlator: Arc<ReplyCorrelator>,
) {
    let mut writer: Option<OwnedWriteHalf> = None;

    while let Some(frame) = rx.recv().await {
        if writer.is_none() {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    tracing::info!("Connected to {} at {}", node, addr);
                    let (read_half, write_half) = stream.into_split();
                    tokio::spawn(reply_loop(node.clone(), read_half, Arc::clone(&correlator)));
                    writer = Some(write_half);
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to {} at {}: {}", node, addr, e);
                    continue;
                }
            }
        }

        if let Some(stream) = writer.as_mut()
            && let Err(e) = write_frame(stream, &frame).await
        {
            tracing::warn!("Write to {} failed, dropping connection: {}", node, e);
            writer = None;
        }
    }

    tracing::debug!("Connection task for {} stopped", node);
}

async fn reply_loop(
    node: NodeId,
    mut reader: tokio::net::tcp::OwnedReadHalf,
    correlator: Arc<ReplyCorrelator>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                correlator.deliver_frame(&node, frame.kind, &frame.body);
            }
            Ok(None) => {
                tracing::debug!("{} closed the connection", node);
                break;
            }
            Err(e) => {
                tracing::warn!("Reading replies from {} failed: {}", node, e);
                break;
            }
        }
    }
}
