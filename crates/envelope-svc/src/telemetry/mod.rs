//! Tracing setup: structured JSON logs, optionally with OTLP span export.
//!
//! # Telemetry invariants
//!
//! - **No plaintext field values or key material** may appear in any span
//!   attribute or log field. Classification labels, key versions and field
//!   counts are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   overrides it.

pub mod init;

pub use init::init_telemetry;
