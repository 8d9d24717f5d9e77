use super::protocol::{AuditReport, ClusterStatus, NodeAudit, NodeStatus};
use crate::accounting::{SpaceAccounting, SpaceUsage};
use crate::archive::{Archiver, Destroyer};
use crate::context::CoordinatorContext;
use crate::correlator::ReplyFailure;
use crate::error::{Error, Result};
use crate::messages::{AntiEntropyAudit, Message, RequestId};
use crate::retrieve::{RetrievedKey, Retriever};

use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub size: u64,
    pub previous_size: u64,
}

pub struct StorageGateway {
    ctx: Arc<CoordinatorContext>,
    accounting: Arc<dyn SpaceAccounting>,
}

impl StorageGateway {
    pub fn new(ctx: Arc<CoordinatorContext>, accounting: Arc<dyn SpaceAccounting>) -> Self {
        Self { ctx, accounting }
    }

    pub fn context(&self) -> &Arc<CoordinatorContext> {
        &self.ctx
    }

    pub async fn archive(
        &self,
        avatar_id: u64,
        key: &str,
        version: u32,
        timestamp: f64,
        content: Bytes,
    ) -> Result<ArchiveOutcome> {
        let size = content.len() as u64;
        self.check_size(size)?;
        let previous_size = Archiver::new(Arc::clone(&self.ctx), avatar_id, key, version, timestamp)
            .archive_final(content)
            .await?;

        self.accounting.record(SpaceUsage {
            avatar_id,
            timestamp,
            delta: size as i64 - previous_size as i64,
        });

        Ok(ArchiveOutcome {
            size,
            previous_size,
        })
    }

    /// Collects `stream` and archives it. The whole body is needed up front
    /// because segment boundaries depend on the total size, so a body past
    /// `max_object_size` is refused as soon as it crosses the limit.
    pub async fn archive_stream<S, E>(
        &self,
        avatar_id: u64,
        key: &str,
        version: u32,
        timestamp: f64,
        stream: S,
    ) -> Result<ArchiveOutcome>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        let mut content = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::ContentStream(e.to_string()))?;
            self.check_size((content.len() + chunk.len()) as u64)?;
            content.extend_from_slice(&chunk);
        }

        self.archive(avatar_id, key, version, timestamp, content.freeze())
            .await
    }

    pub fn max_object_size(&self) -> u64 {
        self.ctx.max_object_size
    }

    fn check_size(&self, size: u64) -> Result<()> {
        let limit = self.ctx.max_object_size;
        if size > limit {
            return Err(Error::ObjectTooLarge { size, limit });
        }
        Ok(())
    }

    /// Tombstoned keys are reported as [`Error::KeyNotFound`].
    pub async fn retrieve(&self, avatar_id: u64, key: &str) -> Result<RetrievedKey> {
        match Retriever::new(Arc::clone(&self.ctx), avatar_id, key)
            .retrieve()
            .await
        {
            Err(Error::Tombstoned(key)) => Err(Error::KeyNotFound(key)),
            other => other,
        }
    }

    pub async fn destroy(&self, avatar_id: u64, key: &str, timestamp: f64) -> Result<u64> {
        let destroyed_size = Destroyer::new(Arc::clone(&self.ctx), avatar_id, key, timestamp)
            .destroy()
            .await?;

        if destroyed_size > 0 {
            self.accounting.record(SpaceUsage {
                avatar_id,
                timestamp,
                delta: -(destroyed_size as i64),
            });
        }
        Ok(destroyed_size)
    }

    /// Asks every live node to audit `avatar_id`. Down nodes are reported
    /// without being contacted.
    pub async fn audit(&self, avatar_id: u64) -> AuditReport {
        let ring = &self.ctx.ring;
        let audits = ring.nodes().iter().map(|node| async move {
            if ring.is_down(node) {
                return NodeAudit {
                    node: node.to_string(),
                    ok: false,
                    error: Some("node is down".into()),
                };
            }

            let request = Message::AntiEntropyAudit(AntiEntropyAudit {
                request_id: RequestId::new(),
                avatar_id,
            });
            let error = match self.ctx.request(node, request).await {
                Ok(_) => None,
                Err(ReplyFailure::Failed(reply)) => Some(
                    reply
                        .reply_error()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "audit failed".into()),
                ),
                Err(failure) => Some(failure.to_string()),
            };

            NodeAudit {
                node: node.to_string(),
                ok: error.is_none(),
                error,
            }
        });

        let nodes = join_all(audits).await;
        let failed = nodes.iter().filter(|n| !n.ok).count();
        if failed > 0 {
            tracing::warn!("Audit of avatar {}: {} node(s) failed", avatar_id, failed);
        } else {
            tracing::info!("Audit of avatar {} passed on every node", avatar_id);
        }

        AuditReport { avatar_id, nodes }
    }

    pub fn status(&self) -> ClusterStatus {
        let ring = &self.ctx.ring;
        let nodes = ring
            .nodes()
            .iter()
            .filter_map(|node| {
                ring.health(node).map(|health| NodeStatus {
                    node: node.to_string(),
                    up: !health.is_down(),
                    transitions: health.transitions,
                    seconds_in_state: health.changed_at.elapsed().as_secs_f64(),
                })
            })
            .collect();

        ClusterStatus {
            nodes,
            pending_replies: self.ctx.correlator.pending_count(),
        }
    }
}

pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
