//! Gateway Tests
//!
//! ## Test Scopes
//! - **Facade**: Archive, retrieve and destroy through `StorageGateway`.
//! - **Not found**: Tombstoned keys are reported as missing.
//! - **Accounting**: Space deltas for overwrites and destroys.
//! - **Audit / status**: Per-node audit outcomes and ring health.
//! - **Size limit**: Bodies over `max_object_size` are refused before any node
//!   sees them.
//! - **Handlers**: HTTP status codes and response bodies.

#[cfg(test)]
mod tests {
    use crate::accounting::SpaceLedger;
    use crate::config::ClusterConfig;
    use crate::error::Error;
    use crate::gateway::handlers::{
        handle_archive, handle_audit, handle_destroy, handle_retrieve, handle_status, status_for,
    };
    use crate::gateway::protocol::{ArchiveParams, DestroyParams};
    use crate::gateway::StorageGateway;
    use crate::messages::Message;
    use crate::test_support::{NodeBehaviour, TestCluster};

    use axum::body::Body;
    use axum::extract::{Extension, Path, Query};
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
    use bytes::Bytes;
    use std::sync::Arc;

    const AVATAR: u64 = 2002;

    fn gateway(cluster: &TestCluster) -> (Arc<StorageGateway>, Arc<SpaceLedger>) {
        let ledger = Arc::new(SpaceLedger::new());
        let gateway = StorageGateway::new(Arc::clone(&cluster.ctx), ledger.clone());
        (Arc::new(gateway), ledger)
    }

    // ============================================================
    // FACADE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_archive_then_retrieve() {
        let cluster = TestCluster::start(4, 64);
        let (gateway, _) = gateway(&cluster);
        let content = Bytes::from(vec![7u8; 1000]);

        let outcome = gateway
            .archive(AVATAR, "photos/cat.jpg", 1, 10.0, content.clone())
            .await
            .unwrap();
        assert_eq!(outcome.size, 1000);
        assert_eq!(outcome.previous_size, 0);

        let retrieved = gateway.retrieve(AVATAR, "photos/cat.jpg").await.unwrap();
        assert_eq!(retrieved.content, content);
        assert_eq!(retrieved.total_size, 1000);
        assert_eq!(retrieved.timestamp, 10.0);
    }

    #[tokio::test]
    async fn test_archive_stream_concatenates_chunks() {
        let cluster = TestCluster::start(3, 1024);
        let (gateway, _) = gateway(&cluster);
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"segmented ")),
            Ok(Bytes::from_static(b"world")),
        ]);

        let outcome = gateway
            .archive_stream(AVATAR, "greeting", 1, 20.0, chunks)
            .await
            .unwrap();
        assert_eq!(outcome.size, 21);

        let retrieved = gateway.retrieve(AVATAR, "greeting").await.unwrap();
        assert_eq!(&retrieved.content[..], b"hello segmented world");
    }

    #[tokio::test]
    async fn test_archive_stream_error_sends_nothing() {
        let cluster = TestCluster::start(3, 1024);
        let (gateway, ledger) = gateway(&cluster);
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("client went away")),
        ]);

        let result = gateway
            .archive_stream(AVATAR, "broken", 1, 20.0, chunks)
            .await;

        assert!(matches!(result, Err(Error::ContentStream(_))));
        assert!(cluster.recorder.all().is_empty());
        assert_eq!(ledger.usage(AVATAR), 0);
    }

    #[tokio::test]
    async fn test_tombstoned_key_is_not_found() {
        let cluster = TestCluster::start(4, 1024);
        let (gateway, _) = gateway(&cluster);
        gateway
            .archive(AVATAR, "doomed", 1, 10.0, Bytes::from_static(b"short lived"))
            .await
            .unwrap();

        let destroyed = gateway.destroy(AVATAR, "doomed", 11.0).await.unwrap();
        assert_eq!(destroyed, 11);

        let result = gateway.retrieve(AVATAR, "doomed").await;
        assert!(matches!(result, Err(Error::KeyNotFound(ref key)) if key == "doomed"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let cluster = TestCluster::start(4, 1024);
        let (gateway, _) = gateway(&cluster);

        let result = gateway.retrieve(AVATAR, "never-written").await;

        assert!(matches!(result, Err(Error::KeyNotFound(_))));
    }

    // ============================================================
    // ACCOUNTING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_overwrite_records_size_difference() {
        let cluster = TestCluster::start(4, 1024);
        let (gateway, ledger) = gateway(&cluster);

        gateway
            .archive(AVATAR, "doc", 1, 10.0, Bytes::from(vec![1u8; 400]))
            .await
            .unwrap();
        assert_eq!(ledger.usage(AVATAR), 400);

        let outcome = gateway
            .archive(AVATAR, "doc", 2, 11.0, Bytes::from(vec![2u8; 100]))
            .await
            .unwrap();
        assert!(outcome.previous_size > 0);
        assert_eq!(ledger.usage(AVATAR), 400 + 100 - outcome.previous_size as i64);
        assert_eq!(ledger.avatars(), vec![AVATAR]);
    }

    #[tokio::test]
    async fn test_destroy_releases_space() {
        let cluster = TestCluster::start(4, 1024);
        let (gateway, ledger) = gateway(&cluster);
        gateway
            .archive(AVATAR, "doc", 1, 10.0, Bytes::from(vec![1u8; 400]))
            .await
            .unwrap();

        let destroyed = gateway.destroy(AVATAR, "doc", 12.0).await.unwrap();

        assert_eq!(ledger.usage(AVATAR), 400 - destroyed as i64);
    }

    #[tokio::test]
    async fn test_failed_archive_records_nothing() {
        let cluster = TestCluster::start(3, 1024);
        let (gateway, ledger) = gateway(&cluster);
        for index in 0..3 {
            cluster.set_behaviour(index, NodeBehaviour::Failing);
        }

        let result = gateway
            .archive(AVATAR, "doc", 1, 10.0, Bytes::from(vec![1u8; 30]))
            .await;

        assert!(matches!(result, Err(Error::ArchiveFailed { .. })));
        assert_eq!(ledger.usage(AVATAR), 0);
        assert!(ledger.avatars().is_empty());
    }

    // ============================================================
    // AUDIT / STATUS TESTS
    // ============================================================

    #[tokio::test]
    async fn test_audit_reports_every_node() {
        let cluster = TestCluster::start(4, 1024);
        let (gateway, _) = gateway(&cluster);
        cluster.set_behaviour(1, NodeBehaviour::Failing);
        cluster.ctx.ring.mark_down(&cluster.node_id(3));

        let report = gateway.audit(AVATAR).await;

        assert_eq!(report.avatar_id, AVATAR);
        assert_eq!(report.nodes.len(), 4);
        assert!(report.nodes[0].ok);
        assert!(!report.nodes[1].ok);
        assert!(report.nodes[2].ok);
        assert!(!report.nodes[3].ok);
        assert_eq!(report.nodes[3].error.as_deref(), Some("node is down"));

        let audited_down_node = cluster
            .recorder
            .received_by(&cluster.node_id(3))
            .iter()
            .any(|m| matches!(m, Message::AntiEntropyAudit(_)));
        assert!(!audited_down_node);
    }

    #[tokio::test]
    async fn test_status_reflects_ring_health() {
        let cluster = TestCluster::start(3, 1024);
        let (gateway, _) = gateway(&cluster);
        cluster.ctx.ring.mark_down(&cluster.node_id(2));

        let status = gateway.status();

        assert_eq!(status.nodes.len(), 3);
        assert_eq!(status.nodes[0].node, "node-00");
        assert!(status.nodes[0].up);
        assert_eq!(status.nodes[0].transitions, 0);
        assert!(!status.nodes[2].up);
        assert_eq!(status.nodes[2].transitions, 1);
        assert_eq!(status.pending_replies, 0);
    }

    // ============================================================
    // SIZE LIMIT TESTS
    // ============================================================

    fn limited_cluster(max_object_size: u64) -> TestCluster {
        let mut config = ClusterConfig::local(3, 0);
        config.reply_timeout_ms = 200;
        config.max_object_size = max_object_size;
        TestCluster::with_config(config)
    }

    #[tokio::test]
    async fn test_archive_over_limit_is_refused() {
        let cluster = limited_cluster(16);
        let (gateway, ledger) = gateway(&cluster);

        let exact = gateway
            .archive(AVATAR, "fits", 1, 1.0, Bytes::from(vec![1u8; 16]))
            .await
            .unwrap();
        assert_eq!(exact.size, 16);
        cluster.recorder.clear();

        let result = gateway
            .archive(AVATAR, "too-big", 1, 1.0, Bytes::from(vec![1u8; 17]))
            .await;
        assert!(matches!(
            result,
            Err(Error::ObjectTooLarge { size: 17, limit: 16 })
        ));
        assert!(cluster.recorder.all().is_empty());
        assert_eq!(ledger.usage(AVATAR), 16);
    }

    #[tokio::test]
    async fn test_archive_stream_stops_at_limit() {
        let cluster = limited_cluster(16);
        let (gateway, _) = gateway(&cluster);
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 10])),
            Ok(Bytes::from(vec![0u8; 10])),
            Err(std::io::Error::other("never read")),
        ]);

        let result = gateway
            .archive_stream(AVATAR, "stream", 1, 1.0, chunks)
            .await;

        assert!(matches!(
            result,
            Err(Error::ObjectTooLarge { size: 20, limit: 16 })
        ));
        assert!(cluster.recorder.all().is_empty());
    }

    #[tokio::test]
    async fn test_handle_archive_rejects_declared_length() {
        let cluster = limited_cluster(16);
        let (gateway, _) = gateway(&cluster);
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1000"));

        let (status, response) = handle_archive(
            Extension(Arc::clone(&gateway)),
            Path((AVATAR, "declared".to_string())),
            Query(ArchiveParams::default()),
            headers,
            Body::from("small"),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!response.success);
        assert!(cluster.recorder.all().is_empty());

        let (status, _) = handle_archive(
            Extension(gateway),
            Path((AVATAR, "undeclared".to_string())),
            Query(ArchiveParams::default()),
            HeaderMap::new(),
            Body::from(vec![9u8; 32]),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(cluster.recorder.all().is_empty());
    }

    // ============================================================
    // HANDLER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_handlers_archive_retrieve_destroy() {
        let cluster = TestCluster::start(4, 1024);
        let (gateway, _) = gateway(&cluster);
        let key = || Path((AVATAR, "notes.txt".to_string()));

        let (status, response) = handle_archive(
            Extension(Arc::clone(&gateway)),
            key(),
            Query(ArchiveParams {
                version: Some(3),
                timestamp: Some(40.0),
            }),
            HeaderMap::new(),
            Body::from("remember the milk"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        assert_eq!(response.size, 17);
        assert_eq!(response.previous_size, 0);

        let retrieved = handle_retrieve(Extension(Arc::clone(&gateway)), key()).await;
        assert_eq!(retrieved.status(), StatusCode::OK);
        let body = axum::body::to_bytes(retrieved.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"remember the milk");

        let (status, response) = handle_destroy(
            Extension(Arc::clone(&gateway)),
            key(),
            Query(DestroyParams {
                timestamp: Some(41.0),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        assert_eq!(response.destroyed_size, 17);

        let gone = handle_retrieve(Extension(Arc::clone(&gateway)), key()).await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handle_archive_without_destinations() {
        let cluster = TestCluster::start(2, 1024);
        let (gateway, _) = gateway(&cluster);
        cluster.ctx.ring.mark_down(&cluster.node_id(0));
        cluster.ctx.ring.mark_down(&cluster.node_id(1));

        let (status, response) = handle_archive(
            Extension(gateway),
            Path((AVATAR, "doc".to_string())),
            Query(ArchiveParams::default()),
            HeaderMap::new(),
            Body::from("payload"),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_handle_audit_and_status() {
        let cluster = TestCluster::start(3, 1024);
        let (gateway, _) = gateway(&cluster);

        let (status, report) = handle_audit(Extension(Arc::clone(&gateway)), Path(AVATAR)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(report.nodes.iter().all(|node| node.ok));

        cluster.set_behaviour(0, NodeBehaviour::Failing);
        let (status, _) = handle_audit(Extension(Arc::clone(&gateway)), Path(AVATAR)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let cluster_status = handle_status(Extension(gateway)).await;
        assert_eq!(cluster_status.nodes.len(), 3);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status_for(&Error::KeyNotFound("k".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::ContentStream("eof".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::SegmentUnavailable { segment_number: 2 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::ObjectTooLarge { size: 2, limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_for(&Error::Inconsistent("sizes".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
