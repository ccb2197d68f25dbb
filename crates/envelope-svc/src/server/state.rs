//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::service::{EncryptionService, ServiceOptions};

/// Application state shared across all request handlers.
///
/// All fields are `Arc`-wrapped so that Axum can clone the state for each
/// request without copying the service.
#[derive(Clone)]
pub struct AppState {
    /// The encryption service.
    pub service: Arc<EncryptionService>,
    /// Name of the HTTP header carrying each request's classification.
    pub classification_header: Arc<String>,
}

impl AppState {
    /// Create a new [`AppState`] around `service`.
    pub fn new(service: Arc<EncryptionService>, classification_header: String) -> Self {
        Self {
            service,
            classification_header: Arc::new(classification_header),
        }
    }
}

impl Default for AppState {
    /// An uninitialised service with default options, suitable for tests.
    fn default() -> Self {
        Self::new(
            Arc::new(EncryptionService::new(ServiceOptions::default())),
            "X-Classification".into(),
        )
    }
}
