//! Axum router construction.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/encrypt", post(handlers::encrypt))
        .route("/decrypt", post(handlers::decrypt))
        .route("/rotate", post(handlers::rotate))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use envelope_common::protocol::{HealthResponse, RecordResponse, RotateResponse};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::service::{EncryptionService, ServiceOptions};

    fn ready_state() -> AppState {
        let service = EncryptionService::new(ServiceOptions::for_tests());
        service.initialize(Some(&[0x33u8; 32][..])).unwrap();
        AppState::new(Arc::new(service), "X-Classification".into())
    }

    fn record_request(uri: &str, classification: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("X-Classification", classification)
            .body(Body::from(json!({ "payload": payload }).to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn health_returns_503_when_not_initialised() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 503);
        let body: HealthResponse = body_json(resp).await;
        assert!(!body.ready);
        assert!(body.key_version.is_none());
    }

    #[tokio::test]
    async fn health_reports_key_version_when_ready() {
        let state = ready_state();
        let expected = state.service.current_key_version().unwrap().to_string();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = build(state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: HealthResponse = body_json(resp).await;
        assert_eq!(body.key_version.as_deref(), Some(expected.as_str()));
        assert!(!body.ephemeral_key);
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_over_http() {
        let state = ready_state();
        let record = json!({"id": "123", "name": "John Doe", "ssn": "123-45-6789"});

        let resp = build(state.clone())
            .oneshot(record_request("/encrypt", "CONFIDENTIAL", record.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let encrypted: RecordResponse = body_json(resp).await;
        assert_eq!(encrypted.payload["name"], "John Doe");
        assert_eq!(encrypted.payload["ssn"]["algorithm"], "AES-256-GCM");

        let resp = build(state)
            .oneshot(record_request("/decrypt", "CONFIDENTIAL", encrypted.payload))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let decrypted: RecordResponse = body_json(resp).await;
        assert_eq!(decrypted.payload, record);
    }

    #[tokio::test]
    async fn encrypt_without_master_key_returns_503() {
        let resp = build(AppState::default())
            .oneshot(record_request("/encrypt", "INTERNAL", json!({"email": "a@b.com"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn tampered_payload_returns_422() {
        let state = ready_state();
        let payload = state
            .service
            .encrypt_value("123-45-6789", crate::Classification::Confidential)
            .unwrap();
        let mut value = payload.to_value();
        value["keyVersion"] = json!("v1");

        let resp = build(state)
            .oneshot(record_request("/decrypt", "CONFIDENTIAL", json!({ "ssn": value })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn bad_classification_returns_400() {
        let resp = build(ready_state())
            .oneshot(record_request("/encrypt", "SECRET", json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rotate_route_advances_version() {
        let state = ready_state();
        let before = state.service.current_key_version().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/rotate")
            .body(Body::empty())
            .unwrap();
        let resp = build(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: RotateResponse = body_json(resp).await;
        assert_ne!(body.key_version, before.to_string());
        assert_eq!(state.service.current_key_version().unwrap().to_string(), body.key_version);
    }
}
