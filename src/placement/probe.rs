use crate::context::CoordinatorContext;
use crate::correlator::ReplyFailure;
use crate::messages::{AntiEntropyAudit, Message, RequestId};

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Periodically checks on down nodes and marks them up once they answer.
pub async fn run_recovery_probe(ctx: Arc<CoordinatorContext>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!("Recovery probe running every {:?}", interval);

    loop {
        ticker.tick().await;
        let recovered = probe_down_nodes(&ctx).await;
        if recovered > 0 {
            tracing::info!("Recovery probe restored {} node(s)", recovered);
        }
    }
}

/// Sends an audit to every down node. Any reply, error replies included,
/// means the node is reachable again. Returns how many nodes were marked up.
pub async fn probe_down_nodes(ctx: &CoordinatorContext) -> usize {
    let down = ctx.ring.down_nodes();
    if down.is_empty() {
        return 0;
    }

    let probes = down.iter().map(|node| async move {
        let audit = Message::AntiEntropyAudit(AntiEntropyAudit {
            request_id: RequestId::new(),
            avatar_id: 0,
        });
        match ctx.request(node, audit).await {
            Ok(_) | Err(ReplyFailure::Failed(_)) => ctx.ring.mark_up(node),
            Err(failure) => {
                tracing::debug!("Node {} still unreachable: {}", node, failure);
                false
            }
        }
    });

    join_all(probes)
        .await
        .into_iter()
        .filter(|recovered| *recovered)
        .count()
}
