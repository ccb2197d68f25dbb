//! Master key material, its sources, and the key version registry.
//!
//! # Lifecycle
//!
//! 1. At startup the binary resolves a [`MasterKeySource`] from configuration
//!    and hands the loaded [`MasterKey`] to the service.
//! 2. The master key lives only in process memory and is zeroed on drop.
//! 3. Each [`KeyVersionRegistry`] belongs to exactly one master key; replacing
//!    the master key replaces the registry.
//!
//! # Security invariants
//!
//! - Master key and DEK bytes are **never** logged, serialised, or included in traces.

pub mod registry;
pub mod source;

pub use registry::{KeyVersion, KeyVersionRegistry};
pub use source::{Base64KeySource, FileKeySource, MasterKeySource};

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use thiserror::Error;
use zeroize::Zeroizing;

/// Minimum accepted master key length in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Errors produced when loading master key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key material is shorter than [`MIN_MASTER_KEY_LEN`].
    #[error("master key too short: expected at least {MIN_MASTER_KEY_LEN} bytes, got {0}")]
    TooShort(usize),
}

/// Raw master key material.
pub struct MasterKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl MasterKey {
    /// Copy `material` into a new master key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::TooShort`] if fewer than [`MIN_MASTER_KEY_LEN`] bytes are supplied.
    pub fn from_bytes(material: &[u8]) -> Result<Self, KeyError> {
        if material.len() < MIN_MASTER_KEY_LEN {
            return Err(KeyError::TooShort(material.len()));
        }
        Ok(Self {
            bytes: Zeroizing::new(material.to_vec()),
        })
    }

    /// Generate a random, process-local key.
    ///
    /// Anything encrypted under it is unrecoverable once the process exits.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; MIN_MASTER_KEY_LEN]);
        OsRng.fill_bytes(bytes.as_mut_slice());
        Self { bytes }
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
