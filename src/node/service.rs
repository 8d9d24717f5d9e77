use super::memory::MemoryNode;
use crate::correlator::ReplyCorrelator;
use crate::error::Result;
use crate::transport::Frame;
use crate::transport::frame::{read_frame, write_frame};

use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Serves requests queued by a `MemoryDispatcher`, delivering replies
/// straight to the coordinator's correlator.
pub async fn serve_memory(
    node: Arc<MemoryNode>,
    mut requests: mpsc::UnboundedReceiver<Frame>,
    correlator: Arc<ReplyCorrelator>,
) {
    while let Some(frame) = requests.recv().await {
        match frame.to_message() {
            Ok(message) => {
                if let Some(reply) = node.handle(message) {
                    correlator.deliver(node.name(), reply);
                }
            }
            Err(e) => tracing::warn!("{} discarding malformed frame: {}", node.name(), e),
        }
    }
    tracing::debug!("{} request queue closed", node.name());
}

/// Accepts coordinator connections and answers each request frame on the
/// connection it arrived on.
pub async fn serve_tcp(node: Arc<MemoryNode>, listener: TcpListener) -> Result<()> {
    tracing::info!(
        "Storage node {} listening on {}",
        node.name(),
        listener.local_addr()?
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!("{} accepted connection from {}", node.name(), peer);

        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(&node, stream).await {
                tracing::warn!("{} connection from {} failed: {}", node.name(), peer, e);
            }
        });
    }
}

async fn handle_connection(node: &MemoryNode, mut stream: TcpStream) -> Result<()> {
    while let Some(frame) = read_frame(&mut stream).await? {
        let message = match frame.to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("{} discarding malformed frame: {}", node.name(), e);
                continue;
            }
        };

        if let Some(reply) = node.handle(message) {
            write_frame(&mut stream, &Frame::from_message(&reply)).await?;
        }
    }
    Ok(())
}
