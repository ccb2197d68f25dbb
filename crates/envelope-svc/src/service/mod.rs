//! [`EncryptionService`]: the public orchestrator.
//!
//! Composes the classification policy, the field walker, the key registry,
//! key derivation, and the cipher into value-level and record-level
//! operations.
//!
//! # State
//!
//! `Uninitialized → Ready`. [`EncryptionService::initialize`] loads the master
//! key and issues the first key version in one step; every encrypt, decrypt
//! and rotate call requires `Ready` and fails with
//! [`EnvelopeError::KeyDerivation`] otherwise.
//!
//! # Concurrency
//!
//! Every operation captures the current keyring (master key + registry) and
//! key version once, up front. Rotation and re-initialisation swap pointers
//! and never disturb in-flight calls, which finish with what they captured.

pub mod rotation;

pub use rotation::rotation_task;

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{SubsecRound, Utc};
use envelope_common::protocol::{EncryptedPayload, ALGORITHM};
use serde::{de::{DeserializeOwned, IgnoredAny}, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{cipher, Dek, KeyDerivationEngine};
use crate::error::EnvelopeError;
use crate::keys::{KeyVersion, KeyVersionRegistry, MasterKey, MasterKeySource};
use crate::policy::{get_nested_value, set_nested_value, Classification, ClassificationPolicy};

/// Construction-time settings for an [`EncryptionService`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Derivation engine; production uses the default iteration count.
    pub kdf: KeyDerivationEngine,
    /// Permit [`EncryptionService::initialize`] without key material.
    pub allow_ephemeral_key: bool,
    /// Initial classification policy.
    pub policy: ClassificationPolicy,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            kdf: KeyDerivationEngine::default(),
            allow_ephemeral_key: false,
            policy: ClassificationPolicy::default(),
        }
    }
}

#[cfg(test)]
impl ServiceOptions {
    pub(crate) fn for_tests() -> Self {
        Self {
            kdf: KeyDerivationEngine::new(1_000).unwrap(),
            allow_ephemeral_key: true,
            policy: ClassificationPolicy::default(),
        }
    }
}

/// Lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No master key loaded.
    Uninitialized,
    /// Master key loaded and a key version is current.
    Ready,
}

/// Master key plus the registry of versions derived from it.
struct Keyring {
    master: MasterKey,
    registry: KeyVersionRegistry,
    ephemeral: bool,
}

/// Field-level envelope encryption service.
///
/// Construct once at startup and share by reference (`Arc`).
pub struct EncryptionService {
    kdf: KeyDerivationEngine,
    allow_ephemeral_key: bool,
    policy: ArcSwap<ClassificationPolicy>,
    keyring: ArcSwapOption<Keyring>,
}

impl EncryptionService {
    /// Create an uninitialised service.
    pub fn new(options: ServiceOptions) -> Self {
        Self {
            kdf: options.kdf,
            allow_ephemeral_key: options.allow_ephemeral_key,
            policy: ArcSwap::from_pointee(options.policy),
            keyring: ArcSwapOption::empty(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Load master key material and become `Ready`.
    ///
    /// Calling this again re-initialises: the new master key replaces the old
    /// one together with its key registry. With `None`, an ephemeral key is
    /// generated, but only if [`ServiceOptions::allow_ephemeral_key`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::KeyDerivation`] if the material is too short,
    /// or if it is absent and ephemeral keys are not allowed. The previous
    /// state is kept on error.
    pub fn initialize(&self, material: Option<&[u8]>) -> Result<(), EnvelopeError> {
        let (master, ephemeral) = match material {
            Some(bytes) => (MasterKey::from_bytes(bytes)?, false),
            None if self.allow_ephemeral_key => {
                warn!(
                    "no master key supplied: using an EPHEMERAL master key; \
                     data encrypted by this process becomes undecryptable when it exits"
                );
                (MasterKey::generate(), true)
            }
            None => {
                return Err(EnvelopeError::KeyDerivation(
                    "no master key supplied and ephemeral keys are not allowed".into(),
                ))
            }
        };
        self.install(master, ephemeral);
        Ok(())
    }

    /// Load the master key from `source` and become `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::KeyDerivation`] if the source fails. The
    /// previous state is kept on error.
    pub fn initialize_from(&self, source: &dyn MasterKeySource) -> Result<(), EnvelopeError> {
        let master = source
            .load()
            .map_err(|e| EnvelopeError::key_source(source, &e))?;
        info!(source = %source.describe(), "master key loaded");
        self.install(master, false);
        Ok(())
    }

    fn install(&self, master: MasterKey, ephemeral: bool) {
        let keyring = Keyring {
            master,
            registry: KeyVersionRegistry::new(),
            ephemeral,
        };
        let version = keyring.registry.current();
        let previous = self.keyring.swap(Some(Arc::new(keyring)));
        info!(
            key_version = %version,
            ephemeral,
            reinitialised = previous.is_some(),
            "encryption service ready"
        );
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        if self.keyring.load().is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Uninitialized
        }
    }

    /// Version new encryptions are tagged with, if `Ready`.
    pub fn current_key_version(&self) -> Option<KeyVersion> {
        self.keyring
            .load_full()
            .map(|k| KeyVersion::clone(&k.registry.current()))
    }

    /// Whether the loaded master key is ephemeral.
    pub fn is_ephemeral(&self) -> bool {
        self.keyring.load_full().is_some_and(|k| k.ephemeral)
    }

    /// Advance the current key version.
    ///
    /// Payloads under earlier versions stay decryptable.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::KeyDerivation`] if no master key is loaded;
    /// nothing changes in that case.
    pub fn rotate_keys(&self) -> Result<KeyVersion, EnvelopeError> {
        let keyring = self.keyring()?;
        let version = keyring.registry.rotate();
        info!(key_version = %version, "keys rotated");
        Ok(KeyVersion::clone(&version))
    }

    // -----------------------------------------------------------------------
    // Policy
    // -----------------------------------------------------------------------

    /// Snapshot of the active classification policy.
    pub fn policy(&self) -> Arc<ClassificationPolicy> {
        self.policy.load_full()
    }

    /// Atomically replace the classification policy.
    pub fn replace_policy(&self, policy: ClassificationPolicy) {
        self.policy.store(Arc::new(policy));
        info!("classification policy replaced");
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    /// Encrypt a single value.
    ///
    /// Strings are encrypted as their UTF-8 text; anything else is first
    /// serialised to canonical JSON. A string whose text would itself parse as
    /// JSON (`"42"`, `"true"`, `"{}"`) is stored JSON-quoted so it reads back
    /// as a string. [`Self::encrypt_object`] uses the same encoding per field.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::Serialization`] if `value` cannot be represented as
    /// JSON, [`EnvelopeError::KeyDerivation`] if not `Ready`.
    pub fn encrypt_value<T>(&self, value: &T, classification: Classification) -> Result<EncryptedPayload, EnvelopeError>
    where
        T: Serialize + ?Sized,
    {
        let keyring = self.keyring()?;
        let plaintext = encode_plaintext(&serde_json::to_value(value)?)?;
        let version = keyring.registry.current();
        self.seal(&keyring, &version, classification, plaintext.as_bytes())
    }

    /// Decrypt a payload to its plaintext text.
    ///
    /// String values come back as the original string; other values come
    /// back as their JSON text.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::Authentication`] on tampering or a key mismatch,
    /// [`EnvelopeError::Serialization`] on malformed payload fields or
    /// non-UTF-8 plaintext.
    pub fn decrypt_value(&self, payload: &EncryptedPayload, classification: Classification) -> Result<String, EnvelopeError> {
        let keyring = self.keyring()?;
        let plaintext = self.open(&keyring, payload, classification)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| EnvelopeError::Serialization("plaintext is not valid UTF-8".into()))?;
        Ok(serde_json::from_str::<String>(text).unwrap_or_else(|_| text.to_owned()))
    }

    /// Decrypt a payload and deserialise it into `T`.
    ///
    /// JSON plaintext is parsed as `T`; plaintext that is not JSON is offered
    /// to `T` as a bare string, which is how string values are stored.
    ///
    /// # Errors
    ///
    /// As [`Self::decrypt_value`], plus [`EnvelopeError::Serialization`] if
    /// the plaintext does not fit `T`.
    pub fn decrypt_value_as<T>(&self, payload: &EncryptedPayload, classification: Classification) -> Result<T, EnvelopeError>
    where
        T: DeserializeOwned,
    {
        let keyring = self.keyring()?;
        let plaintext = self.open(&keyring, payload, classification)?;
        Ok(serde_json::from_value(decode_plaintext(&plaintext)?)?)
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Return a copy of `record` with every field the policy lists for
    /// `classification` replaced by an encrypted payload.
    ///
    /// Absent and `null` fields are skipped, as are fields that already hold
    /// a payload. Field values use the [`Self::encrypt_value`] encoding, so a
    /// field payload decrypts the same through either API and
    /// [`Self::decrypt_object`] restores its exact type. All fields are
    /// sealed under the same key version.
    ///
    /// # Errors
    ///
    /// The first field failure aborts the call; no partially encrypted record
    /// is returned.
    pub fn encrypt_object(&self, record: &Value, classification: Classification) -> Result<Value, EnvelopeError> {
        let keyring = self.keyring()?;
        let policy = self.policy.load();
        let mut out = record.clone();

        let version = keyring.registry.current();
        let mut sealed = 0usize;
        for path in policy.fields(classification) {
            let plaintext = match get_nested_value(&out, path) {
                None => continue,
                Some(v) if EncryptedPayload::from_value(v).is_some() => continue,
                Some(v) => encode_plaintext(v)?,
            };
            let payload = self.seal(&keyring, &version, classification, plaintext.as_bytes())?;
            set_nested_value(&mut out, path, payload.to_value())?;
            sealed += 1;
        }

        debug!(
            classification = %classification,
            key_version = %version,
            fields = sealed,
            "record encrypted"
        );
        Ok(out)
    }

    /// Return a copy of `record` with every policy field that holds an
    /// encrypted payload replaced by its plaintext value.
    ///
    /// Fields that are not payload-shaped are passed through unchanged, so
    /// decrypting plaintext or an already-decrypted record is a no-op.
    /// Paths are visited in reverse policy order so that a field sealed
    /// inside a later-sealed parent is opened after its parent.
    ///
    /// # Errors
    ///
    /// The first field failure aborts the call; no partially decrypted record
    /// is returned.
    pub fn decrypt_object(&self, record: &Value, classification: Classification) -> Result<Value, EnvelopeError> {
        let keyring = self.keyring()?;
        let policy = self.policy.load();
        let mut out = record.clone();

        let mut opened = 0usize;
        for path in policy.fields(classification).iter().rev() {
            let Some(payload) = get_nested_value(&out, path).and_then(EncryptedPayload::from_value) else {
                continue;
            };
            let plaintext = self.open(&keyring, &payload, classification)?;
            let value = decode_plaintext(&plaintext)?;
            set_nested_value(&mut out, path, value)?;
            opened += 1;
        }

        debug!(classification = %classification, fields = opened, "record decrypted");
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn keyring(&self) -> Result<Arc<Keyring>, EnvelopeError> {
        self.keyring
            .load_full()
            .ok_or_else(EnvelopeError::not_initialised)
    }

    fn dek(&self, keyring: &Keyring, classification: Classification, version: &KeyVersion) -> Arc<Dek> {
        keyring.registry.get_or_derive(classification, version, || {
            self.kdf.derive_key(&keyring.master, classification, version)
        })
    }

    fn seal(
        &self,
        keyring: &Keyring,
        version: &KeyVersion,
        classification: Classification,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload, EnvelopeError> {
        let dek = self.dek(keyring, classification, version);
        let (ciphertext, nonce) = cipher::encrypt(plaintext, &dek)?;
        Ok(EncryptedPayload {
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(nonce),
            key_version: version.to_string(),
            algorithm: ALGORITHM.to_owned(),
            encrypted_at: Utc::now().trunc_subsecs(3),
        })
    }

    fn open(
        &self,
        keyring: &Keyring,
        payload: &EncryptedPayload,
        classification: Classification,
    ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        if payload.algorithm != ALGORITHM {
            return Err(EnvelopeError::Serialization(format!(
                "unsupported algorithm {:?}",
                payload.algorithm
            )));
        }
        if payload.key_version.is_empty() {
            return Err(EnvelopeError::Serialization("payload has an empty key version".into()));
        }
        let ciphertext = STANDARD
            .decode(&payload.ciphertext)
            .map_err(|e| EnvelopeError::Serialization(format!("ciphertext is not valid base64: {e}")))?;
        let nonce = STANDARD
            .decode(&payload.iv)
            .map_err(|e| EnvelopeError::Serialization(format!("iv is not valid base64: {e}")))?;

        let version = KeyVersion::from(payload.key_version.as_str());
        if let Some(dek) = keyring.registry.cached(classification, &version) {
            return Ok(Zeroizing::new(cipher::decrypt(&ciphertext, &nonce, &dek)?));
        }

        // The version comes from the caller; cache its key only once a tag
        // has verified under it.
        debug!(classification = %classification, key_version = %version, "deriving DEK for decryption");
        let dek = self.kdf.derive_key(&keyring.master, classification, &version);
        let plaintext = Zeroizing::new(cipher::decrypt(&ciphertext, &nonce, &dek)?);
        keyring.registry.insert(classification, &version, dek);
        Ok(plaintext)
    }
}

/// Plaintext text for one value: a string is its own text unless that text
/// would parse as JSON; anything else is canonical JSON.
fn encode_plaintext(value: &Value) -> Result<Zeroizing<String>, EnvelopeError> {
    match value {
        Value::String(s) if serde_json::from_str::<IgnoredAny>(s).is_err() => Ok(Zeroizing::new(s.clone())),
        other => Ok(Zeroizing::new(serde_json::to_string(other)?)),
    }
}

/// Inverse of [`encode_plaintext`]. Text that is not JSON is a bare string.
fn decode_plaintext(plaintext: &[u8]) -> Result<Value, EnvelopeError> {
    if let Ok(value) = serde_json::from_slice(plaintext) {
        return Ok(value);
    }
    std::str::from_utf8(plaintext)
        .map(|text| Value::String(text.to_owned()))
        .map_err(|_| EnvelopeError::Serialization("plaintext is not valid UTF-8".into()))
}
