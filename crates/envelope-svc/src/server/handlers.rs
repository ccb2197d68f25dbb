//! Axum request handlers for all service endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use envelope_common::protocol::{
    ErrorResponse, HealthResponse, RecordRequest, RecordResponse, RotateResponse,
};
use envelope_common::ServiceError;
use serde_json::Value;
use tracing::warn;

use super::state::AppState;
use crate::error::EnvelopeError;
use crate::policy::Classification;
use crate::service::EncryptionService;

/// `POST /encrypt`: encrypt the policy fields of the request record.
///
/// The classification is read from the configured header (default
/// `X-Classification`).
pub async fn encrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordRequest>,
) -> Response {
    let classification = match classification_from_headers(&headers, &state.classification_header) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let record = req.payload;
    match run_blocking(&state, move |svc| svc.encrypt_object(&record, classification)).await {
        Ok(payload) => (StatusCode::OK, Json(RecordResponse { payload })).into_response(),
        Err(e) => {
            warn!(error = %e, classification = %classification, "encryption failed");
            error_response(e)
        }
    }
}

/// `POST /decrypt`: decrypt the encrypted policy fields of the request record.
pub async fn decrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordRequest>,
) -> Response {
    let classification = match classification_from_headers(&headers, &state.classification_header) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let record = req.payload;
    match run_blocking(&state, move |svc| svc.decrypt_object(&record, classification)).await {
        Ok(payload) => (StatusCode::OK, Json(RecordResponse { payload })).into_response(),
        Err(e) => {
            warn!(error = %e, classification = %classification, "decryption failed");
            error_response(e)
        }
    }
}

/// `POST /rotate`: advance the current key version.
pub async fn rotate(State(state): State<AppState>) -> Response {
    match state.service.rotate_keys() {
        Ok(version) => {
            let body = RotateResponse {
                key_version: version.to_string(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(e.into()),
    }
}

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` once a master key is loaded, `503 Service Unavailable`
/// before that.
pub async fn health(State(state): State<AppState>) -> Response {
    let key_version = state.service.current_key_version();
    let ready = key_version.is_some();

    let (status_code, status_str) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        ready,
        key_version: key_version.map(|v| v.to_string()),
        ephemeral_key: state.service.is_ephemeral(),
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn classification_from_headers(headers: &HeaderMap, header_name: &str) -> Result<Classification, ServiceError> {
    let value = headers
        .get(header_name)
        .ok_or_else(|| ServiceError::BadRequest(format!("missing {header_name} header")))?;
    let label = value.to_str().map_err(|_| {
        ServiceError::BadRequest(format!("{header_name} header contains non-ASCII characters"))
    })?;
    label
        .parse::<Classification>()
        .map_err(|e| EnvelopeError::from(e).into())
}

/// Run a record operation on the blocking pool: a DEK cache miss is a full
/// PBKDF2 derivation and must not stall the async workers.
async fn run_blocking<F>(state: &AppState, op: F) -> Result<Value, ServiceError>
where
    F: FnOnce(&EncryptionService) -> Result<Value, EnvelopeError> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || op(&service))
        .await
        .map_err(|e| ServiceError::Internal(format!("worker task failed: {e}")))?
        .map_err(ServiceError::from)
}

fn error_response(err: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::new(err.code(), err.to_string()))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn classification_header_parsed_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Classification", HeaderValue::from_static("restricted"));
        assert_eq!(
            classification_from_headers(&headers, "X-Classification").unwrap(),
            Classification::Restricted
        );
    }

    #[test]
    fn missing_header_is_bad_request() {
        let err = classification_from_headers(&HeaderMap::new(), "X-Classification").unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("missing X-Classification"));
    }

    #[test]
    fn unknown_classification_is_bad_request() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Classification", HeaderValue::from_static("TOP_SECRET"));
        let err = classification_from_headers(&headers, "X-Classification").unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("TOP_SECRET"));
    }

    #[test]
    fn error_response_uses_mapped_status() {
        let resp = error_response(ServiceError::Unauthenticated);
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
