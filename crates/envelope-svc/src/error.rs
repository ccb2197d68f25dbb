//! Service-level error taxonomy.

use envelope_common::ServiceError;
use thiserror::Error;

use crate::crypto::{CipherError, KdfError};
use crate::keys::source::MasterKeySource;
use crate::keys::KeyError;
use crate::policy::{PathError, PolicyError};

/// Errors surfaced by [`crate::EncryptionService`].
///
/// None of these are downgraded to a plaintext fallback; object-level
/// operations abort on the first one.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// No master key is loaded, or the supplied one is unusable.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The authentication tag did not verify: tampering, corruption, or the
    /// wrong key version.
    #[error("payload failed authentication")]
    Authentication,

    /// A value could not be serialised, or a payload field is malformed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A classification label outside the supported set.
    #[error("unsupported classification: {0}")]
    UnsupportedClassification(String),

    /// A field path could not be written into the record.
    #[error(transparent)]
    InvalidFieldPath(#[from] PathError),
}

impl EnvelopeError {
    pub(crate) fn not_initialised() -> Self {
        Self::KeyDerivation("no master key loaded; call initialize first".into())
    }

    pub(crate) fn key_source(source: &dyn MasterKeySource, err: &anyhow::Error) -> Self {
        Self::KeyDerivation(format!(
            "failed to load master key from {}: {err:#}",
            source.describe()
        ))
    }
}

impl From<CipherError> for EnvelopeError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::AuthenticationFailed => Self::Authentication,
            CipherError::InvalidNonceLength(_) => Self::Serialization(e.to_string()),
            CipherError::AeadFailure => Self::Serialization(e.to_string()),
        }
    }
}

impl From<KdfError> for EnvelopeError {
    fn from(e: KdfError) -> Self {
        Self::KeyDerivation(e.to_string())
    }
}

impl From<KeyError> for EnvelopeError {
    fn from(e: KeyError) -> Self {
        Self::KeyDerivation(e.to_string())
    }
}

impl From<PolicyError> for EnvelopeError {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::UnsupportedClassification(label) => Self::UnsupportedClassification(label),
            PolicyError::InvalidPath(p) => Self::InvalidFieldPath(p),
            other => Self::Serialization(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<EnvelopeError> for ServiceError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::KeyDerivation(msg) => ServiceError::Unavailable(msg),
            EnvelopeError::Authentication => ServiceError::Unauthenticated,
            EnvelopeError::Serialization(msg) => ServiceError::BadRequest(msg),
            EnvelopeError::UnsupportedClassification(label) => {
                ServiceError::BadRequest(format!("unsupported classification: {label}"))
            }
            EnvelopeError::InvalidFieldPath(p) => ServiceError::Internal(p.to_string()),
        }
    }
}
