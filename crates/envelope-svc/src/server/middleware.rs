//! Axum middleware settings applied to the router.
//!
//! Includes request tracing, timeout enforcement, and response compression.

use std::time::Duration;

/// Default per-request timeout applied to all routes.
///
/// Generous because a DEK cache miss runs a full PBKDF2 derivation.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
