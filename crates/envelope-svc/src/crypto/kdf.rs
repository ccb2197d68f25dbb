//! PBKDF2-HMAC-SHA-256 derivation of per-purpose DEKs from the master key.
//!
//! The salt is `classification label || key version`, so every
//! (classification, version) pair yields its own key and the same pair always
//! yields the same key. That determinism is what lets the service decrypt
//! payloads from any past version without storing derived keys.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use super::cipher::{Dek, KEY_LEN};
use crate::keys::{KeyVersion, MasterKey};
use crate::policy::Classification;

/// Production iteration count.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Errors produced when configuring key derivation.
#[derive(Debug, Error)]
pub enum KdfError {
    /// PBKDF2 needs at least one iteration.
    #[error("KDF iteration count must be non-zero")]
    ZeroIterations,
}

/// Derives [`Dek`]s from a [`MasterKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDerivationEngine {
    iterations: u32,
}

impl KeyDerivationEngine {
    /// Create an engine with a custom iteration count.
    ///
    /// # Errors
    ///
    /// Returns [`KdfError::ZeroIterations`] if `iterations` is zero.
    pub fn new(iterations: u32) -> Result<Self, KdfError> {
        if iterations == 0 {
            return Err(KdfError::ZeroIterations);
        }
        Ok(Self { iterations })
    }

    /// Iteration count used for every derivation.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive the DEK for `classification` at `version`.
    ///
    /// CPU-bound: at the default iteration count this takes a noticeable
    /// fraction of a second, which is why derived keys are cached.
    pub fn derive_key(
        &self,
        master: &MasterKey,
        classification: Classification,
        version: &KeyVersion,
    ) -> Dek {
        let salt = salt_for(classification, version);
        let okm = derive_bytes(master.expose(), &salt, self.iterations);
        Dek::from_key_bytes(&okm)
    }
}

impl Default for KeyDerivationEngine {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

fn salt_for(classification: Classification, version: &KeyVersion) -> Vec<u8> {
    let label = classification.label().as_bytes();
    let version = version.as_str().as_bytes();
    let mut salt = Vec::with_capacity(label.len() + version.len());
    salt.extend_from_slice(label);
    salt.extend_from_slice(version);
    salt
}

fn derive_bytes(material: &[u8], salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(material, salt, iterations, &mut okm[..]);
    okm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::{decrypt, encrypt};

    const FAST: u32 = 1_000;

    fn master() -> MasterKey {
        MasterKey::from_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(KeyDerivationEngine::new(0).is_err());
        assert_eq!(KeyDerivationEngine::default().iterations(), DEFAULT_ITERATIONS);
    }

    #[test]
    fn matches_rfc7914_pbkdf2_sha256_vector() {
        let okm = derive_bytes(b"passwd", b"salt", 1);
        let expected: [u8; KEY_LEN] = [
            0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16, 0x91, 0xc2, 0x25, 0x44,
            0xb6, 0x05, 0xf9, 0x41, 0x85, 0x21, 0x6d, 0xde, 0x04, 0x65, 0xe6, 0x8b, 0x9d, 0x57,
            0xc2, 0x0d, 0xac, 0xbc,
        ];
        assert_eq!(*okm, expected);
    }

    #[test]
    fn salt_is_label_then_version() {
        let v = KeyVersion::from("v42");
        assert_eq!(salt_for(Classification::Restricted, &v), b"RESTRICTEDv42".to_vec());
    }

    #[test]
    fn derivation_is_deterministic() {
        let engine = KeyDerivationEngine::new(FAST).unwrap();
        let v = KeyVersion::from("v1");
        let a = engine.derive_key(&master(), Classification::Confidential, &v);
        let b = engine.derive_key(&master(), Classification::Confidential, &v);
        let (ct, nonce) = encrypt(b"payload", &a).unwrap();
        assert_eq!(decrypt(&ct, &nonce, &b).unwrap(), b"payload");
    }

    #[test]
    fn version_and_classification_separate_keys() {
        let engine = KeyDerivationEngine::new(FAST).unwrap();
        let v1 = KeyVersion::from("v1");
        let v2 = KeyVersion::from("v2");
        let base = engine.derive_key(&master(), Classification::Confidential, &v1);
        let (ct, nonce) = encrypt(b"payload", &base).unwrap();

        let other_version = engine.derive_key(&master(), Classification::Confidential, &v2);
        assert!(decrypt(&ct, &nonce, &other_version).is_err());

        let other_class = engine.derive_key(&master(), Classification::Restricted, &v1);
        assert!(decrypt(&ct, &nonce, &other_class).is_err());
    }
}
