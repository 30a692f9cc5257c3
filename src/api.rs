//! HTTP API endpoints for local controllers.
//!
//! A UI (or a script) uses these to read the server status and to push a
//! document update to every connected client.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::protocol::{BroadcastRequest, BroadcastResponse, ErrorResponse};
use crate::server::AppState;
use crate::types::ServerStatus;

/// GET /api/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    Json(ServerStatus {
        running: true,
        port: state.local_addr.port(),
        bind_address: Some(state.local_addr.to_string()),
        client_count: state.hub.client_count().await,
    })
}

/// POST /api/documents/broadcast
pub async fn broadcast_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BroadcastRequest>,
) -> Response {
    match state
        .hub
        .broadcast_document_update(req.doc_id, req.title, req.content)
        .await
    {
        Ok(delivered) => Json(BroadcastResponse { delivered }).into_response(),
        Err(e) => {
            tracing::error!("Failed to broadcast document {}: {}", req.doc_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::tests::MockSink;
    use crate::hub::{BroadcastHub, Connection};
    use crate::observer::TracingObserver;
    use crate::server::{router, session_signals};
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let (sessions, _control) = session_signals();
        Arc::new(AppState {
            hub: Arc::new(BroadcastHub::new(Arc::new(TracingObserver))),
            local_addr: "127.0.0.1:8080".parse().unwrap(),
            sessions,
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_client_count() {
        let state = state();
        let sink = Arc::new(MockSink::default());
        state
            .hub
            .on_connection_opened(Connection::with_id("a".to_string(), sink))
            .await;

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["running"], true);
        assert_eq!(body["port"], 8080);
        assert_eq!(body["clientCount"], 1);
        assert_eq!(body["bindAddress"], "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_broadcast_endpoint_pushes_update() {
        let state = state();
        let sink = Arc::new(MockSink::default());
        state
            .hub
            .on_connection_opened(Connection::with_id("a".to_string(), sink.clone()))
            .await;

        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/documents/broadcast")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"docId":5,"title":"Plan","content":"Draft"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["delivered"], 1);

        let relayed = sink.relayed();
        assert_eq!(relayed.len(), 1);
        let update: Value = serde_json::from_str(&relayed[0]).unwrap();
        assert_eq!(update["kind"], "document_update");
        assert_eq!(update["docId"], 5);
        assert_eq!(update["title"], "Plan");
        assert_eq!(update["content"], "Draft");
    }

    #[tokio::test]
    async fn test_broadcast_endpoint_rejects_malformed_body() {
        let response = router(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/documents/broadcast")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"title":"Plan"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
