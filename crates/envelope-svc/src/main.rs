//! `envelope-svc` — service binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise telemetry (JSON logs, optional OTLP export).
//! 3. Load the classification policy (defaults plus optional override file).
//! 4. Construct the [`EncryptionService`] and load the master key.
//! 5. Spawn background key rotation, if configured.
//! 6. Build the Axum router and start the HTTP server.

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::info;

use envelope_svc::config::Config;
use envelope_svc::crypto::KeyDerivationEngine;
use envelope_svc::server::{self, state::AppState};
use envelope_svc::service::rotation_task;
use envelope_svc::{telemetry, ClassificationPolicy, EncryptionService, ServiceOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "envelope-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Classification policy
    // -----------------------------------------------------------------------
    let policy = match &cfg.policy_path {
        Some(path) => ClassificationPolicy::from_file(Path::new(path))
            .context("failed to load classification policy")?,
        None => ClassificationPolicy::default(),
    };

    // -----------------------------------------------------------------------
    // 4. Encryption service + master key
    // -----------------------------------------------------------------------
    let options = ServiceOptions {
        kdf: KeyDerivationEngine::new(cfg.kdf_iterations)?,
        allow_ephemeral_key: cfg.allow_ephemeral_key,
        policy,
    };
    let service = Arc::new(EncryptionService::new(options));
    match cfg.master_key_source() {
        Some(source) => service.initialize_from(source.as_ref())?,
        None => service.initialize(None)?,
    }

    // -----------------------------------------------------------------------
    // 5. Background tasks
    // -----------------------------------------------------------------------
    let _rotation = (cfg.key_rotation_interval_secs > 0).then(|| {
        rotation_task(
            Arc::clone(&service),
            Duration::from_secs(cfg.key_rotation_interval_secs),
        )
    });

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(service, cfg.classification_header.clone());
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
