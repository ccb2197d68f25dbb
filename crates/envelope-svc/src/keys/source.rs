//! Sources of master key material.
//!
//! Fetching from a secret manager is the embedding application's concern; it
//! hands the resulting bytes in through one of these sources (or implements
//! [`MasterKeySource`] itself). Sources run only at initialisation, never on
//! the encrypt/decrypt path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroizing;

use super::{MasterKey, MIN_MASTER_KEY_LEN};

/// Supplies raw master key material.
#[cfg_attr(test, mockall::automock)]
pub trait MasterKeySource: Send + Sync {
    /// Load the key. Called once per (re-)initialisation.
    fn load(&self) -> Result<MasterKey>;

    /// Non-secret description for logs (e.g. `"env"`, a file path).
    fn describe(&self) -> String;
}

/// Master key supplied as standard base64 text, typically via `MASTER_KEY`.
pub struct Base64KeySource {
    encoded: Zeroizing<String>,
}

impl Base64KeySource {
    /// Wrap base64-encoded key material.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: Zeroizing::new(encoded.into()),
        }
    }
}

impl MasterKeySource for Base64KeySource {
    fn load(&self) -> Result<MasterKey> {
        let raw = Zeroizing::new(
            STANDARD
                .decode(self.encoded.trim())
                .context("master key is not valid standard base64")?,
        );
        MasterKey::from_bytes(&raw).context("invalid master key")
    }

    fn describe(&self) -> String {
        "env".into()
    }
}

/// Master key read from a file, e.g. a secret mounted by the orchestrator.
///
/// The file may hold base64 text (surrounding whitespace ignored) or raw bytes.
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    /// Read key material from `path` on every load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MasterKeySource for FileKeySource {
    fn load(&self) -> Result<MasterKey> {
        let contents = Zeroizing::new(
            std::fs::read(&self.path)
                .with_context(|| format!("failed to read master key file {}", self.path.display()))?,
        );

        let decoded = std::str::from_utf8(&contents)
            .ok()
            .and_then(|text| STANDARD.decode(text.trim()).ok())
            .filter(|bytes| bytes.len() >= MIN_MASTER_KEY_LEN)
            .map(Zeroizing::new);

        let material: &[u8] = match &decoded {
            Some(bytes) => bytes.as_slice(),
            None => contents.as_slice(),
        };
        MasterKey::from_bytes(material)
            .with_context(|| format!("invalid master key in {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
