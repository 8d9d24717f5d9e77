use axum::{
    Json, Router,
    body::Body,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

use super::protocol::{
    ArchiveParams, ArchiveResponse, AuditReport, ClusterStatus, DestroyParams, DestroyResponse,
    ErrorResponse,
};
use super::service::{StorageGateway, now_timestamp};
use crate::error::Error;

pub fn router(gateway: Arc<StorageGateway>) -> Router {
    Router::new()
        .route(
            "/:avatar_id/data/*key",
            post(handle_archive)
                .get(handle_retrieve)
                .delete(handle_destroy),
        )
        .route("/:avatar_id/audit", get(handle_audit))
        .route("/status", get(handle_status))
        .layer(Extension(gateway))
}

pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::KeyNotFound(_) | Error::Tombstoned(_) => StatusCode::NOT_FOUND,
        Error::ContentStream(_) => StatusCode::BAD_REQUEST,
        Error::ObjectTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::ArchiveFailed { .. }
        | Error::DestroyFailed { .. }
        | Error::SegmentUnavailable { .. }
        | Error::NodeUnavailable { .. }
        | Error::TimeoutWaitingOnInsert(_)
        | Error::Dispatch { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_archive(
    Extension(gateway): Extension<Arc<StorageGateway>>,
    Path((avatar_id, key)): Path<(u64, String)>,
    Query(params): Query<ArchiveParams>,
    headers: HeaderMap,
    body: Body,
) -> (StatusCode, Json<ArchiveResponse>) {
    let timestamp = params.timestamp.unwrap_or_else(now_timestamp);
    let version = params.version.unwrap_or(0);

    // Refuse a declared oversize body before reading any of it.
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let result = match declared {
        Some(size) if size > gateway.max_object_size() => Err(Error::ObjectTooLarge {
            size,
            limit: gateway.max_object_size(),
        }),
        _ => {
            gateway
                .archive_stream(avatar_id, &key, version, timestamp, body.into_data_stream())
                .await
        }
    };

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ArchiveResponse {
                success: true,
                size: outcome.size,
                previous_size: outcome.previous_size,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to archive {}: {}", key, e);
            (
                status_for(&e),
                Json(ArchiveResponse {
                    success: false,
                    size: 0,
                    previous_size: 0,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_retrieve(
    Extension(gateway): Extension<Arc<StorageGateway>>,
    Path((avatar_id, key)): Path<(u64, String)>,
) -> Response {
    match gateway.retrieve(avatar_id, &key).await {
        Ok(retrieved) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            retrieved.content,
        )
            .into_response(),
        Err(e) => {
            if e.is_not_found() {
                tracing::debug!("Key {} not found", key);
            } else {
                tracing::error!("Failed to retrieve {}: {}", key, e);
            }
            (
                status_for(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn handle_destroy(
    Extension(gateway): Extension<Arc<StorageGateway>>,
    Path((avatar_id, key)): Path<(u64, String)>,
    Query(params): Query<DestroyParams>,
) -> (StatusCode, Json<DestroyResponse>) {
    let timestamp = params.timestamp.unwrap_or_else(now_timestamp);

    match gateway.destroy(avatar_id, &key, timestamp).await {
        Ok(destroyed_size) => (
            StatusCode::OK,
            Json(DestroyResponse {
                success: true,
                destroyed_size,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to destroy {}: {}", key, e);
            (
                status_for(&e),
                Json(DestroyResponse {
                    success: false,
                    destroyed_size: 0,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_audit(
    Extension(gateway): Extension<Arc<StorageGateway>>,
    Path(avatar_id): Path<u64>,
) -> (StatusCode, Json<AuditReport>) {
    let report = gateway.audit(avatar_id).await;
    let status = if report.nodes.iter().all(|node| node.ok) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn handle_status(
    Extension(gateway): Extension<Arc<StorageGateway>>,
) -> Json<ClusterStatus> {
    Json(gateway.status())
}
