use crate::context::CoordinatorContext;
use crate::correlator::ReplyFailure;
use crate::error::{Error, Result};
use crate::messages::*;
use crate::placement::types::NodeId;

use futures::future::join_all;
use std::sync::Arc;

/// Writes a tombstone for every segment of a key.
pub struct Destroyer {
    ctx: Arc<CoordinatorContext>,
    avatar_id: u64,
    key: String,
    timestamp: f64,
}

impl Destroyer {
    pub fn new(
        ctx: Arc<CoordinatorContext>,
        avatar_id: u64,
        key: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        Self {
            ctx,
            avatar_id,
            key: key.into(),
            timestamp,
        }
    }

    /// Returns the size of the destroyed key (0 if it did not exist).
    pub async fn destroy(&self) -> Result<u64> {
        tracing::info!("Destroying {} for avatar {}", self.key, self.avatar_id);

        let results = join_all((0..self.ctx.ring.len()).map(move |index| {
            self.ctx
                .write_with_handoff(index, move |node| self.send_tombstone(node, index))
        }))
        .await;

        let mut destroyed_size = 0;
        let mut failure = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok((_, size)) => destroyed_size = destroyed_size.max(size),
                Err(attempts) => {
                    let segment_number = (index + 1) as u8;
                    tracing::error!(
                        "Destroy of {} failed: segment {} exhausted {} destination(s)",
                        self.key,
                        segment_number,
                        attempts.len()
                    );
                    failure.get_or_insert(Error::DestroyFailed {
                        segment_number,
                        attempts,
                    });
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(destroyed_size),
        }
    }

    async fn send_tombstone(
        &self,
        node: NodeId,
        index: usize,
    ) -> std::result::Result<u64, ReplyFailure> {
        let reply = self
            .ctx
            .request(
                &node,
                Message::DestroyKey(DestroyKey {
                    request_id: RequestId::new(),
                    avatar_id: self.avatar_id,
                    timestamp: self.timestamp,
                    segment_number: (index + 1) as u8,
                    key: self.key.clone(),
                }),
            )
            .await?;

        match reply {
            Message::DestroyKeyReply(DestroyKeyReply {
                result: Ok(size), ..
            }) => Ok(size),
            other => Err(ReplyFailure::Failed(other)),
        }
    }
}
