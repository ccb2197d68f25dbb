//! Configuration loading and validation for the service binary.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is missing or invalid.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::DEFAULT_ITERATIONS;
use crate::keys::{Base64KeySource, FileKeySource, MasterKeySource};

/// Validated service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Master key as standard base64. Mutually exclusive with `master_key_file`.
    #[serde(default)]
    pub master_key: Option<String>,

    /// Path to a file holding the master key (base64 text or raw bytes).
    #[serde(default)]
    pub master_key_file: Option<String>,

    /// Start with a generated, process-local master key when none is configured.
    /// Everything encrypted under such a key is lost on restart.
    #[serde(default)]
    pub allow_ephemeral_key: bool,

    /// PBKDF2 iteration count for DEK derivation.
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Optional YAML/JSON classification-policy override file.
    #[serde(default)]
    pub policy_path: Option<String>,

    /// How often (seconds) to rotate the current key version. `0` disables.
    #[serde(default)]
    pub key_rotation_interval_secs: u64,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// HTTP header naming the classification of each request.
    #[serde(default = "default_classification_header")]
    pub classification_header: String,

    /// OTLP endpoint for span export. Logs only when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_kdf_iterations() -> u32 {
    DEFAULT_ITERATIONS
}
fn default_listen_port() -> u16 {
    8080
}
fn default_classification_header() -> String {
    "X-Classification".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("master_key_file", &self.master_key_file)
            .field("allow_ephemeral_key", &self.allow_ephemeral_key)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("policy_path", &self.policy_path)
            .field("key_rotation_interval_secs", &self.key_rotation_interval_secs)
            .field("listen_port", &self.listen_port)
            .field("classification_header", &self.classification_header)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        let has_key = non_blank(&self.master_key);
        let has_key_file = non_blank(&self.master_key_file);

        if has_key && has_key_file {
            anyhow::bail!("set only one of MASTER_KEY and MASTER_KEY_FILE");
        }
        if !has_key && !has_key_file && !self.allow_ephemeral_key {
            anyhow::bail!(
                "MASTER_KEY or MASTER_KEY_FILE is required (set ALLOW_EPHEMERAL_KEY=true for local development only)"
            );
        }
        if self.kdf_iterations < DEFAULT_ITERATIONS {
            anyhow::bail!("KDF_ITERATIONS must be >= {DEFAULT_ITERATIONS}");
        }
        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be > 0");
        }
        if self.classification_header.trim().is_empty() {
            anyhow::bail!("CLASSIFICATION_HEADER must not be empty");
        }
        Ok(())
    }

    /// The configured master key source, or `None` to fall back to an
    /// ephemeral key.
    pub fn master_key_source(&self) -> Option<Box<dyn MasterKeySource>> {
        match (&self.master_key, &self.master_key_file) {
            (Some(key), _) if !key.trim().is_empty() => Some(Box::new(Base64KeySource::new(key.clone()))),
            (_, Some(path)) if !path.trim().is_empty() => Some(Box::new(FileKeySource::new(PathBuf::from(path)))),
            _ => None,
        }
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
