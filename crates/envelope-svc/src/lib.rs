//! `envelope-svc`: field-level envelope encryption.
//!
//! Selectively encrypts the fields of arbitrary JSON records according to a
//! classification policy. Per-purpose data encryption keys are derived from a
//! single master key, and key versions can be rotated without breaking any
//! previously written ciphertext.
//!
//! ```no_run
//! use envelope_svc::{Classification, EncryptionService, ServiceOptions};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), envelope_svc::EnvelopeError> {
//! let service = EncryptionService::new(ServiceOptions::default());
//! service.initialize(Some(&[0u8; 32][..]))?;
//!
//! let record = json!({"id": "123", "ssn": "123-45-6789"});
//! let sealed = service.encrypt_object(&record, Classification::Confidential)?;
//! assert_eq!(service.decrypt_object(&sealed, Classification::Confidential)?, record);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod policy;
pub mod server;
pub mod service;
pub mod telemetry;

pub use envelope_common::EncryptedPayload;
pub use error::EnvelopeError;
pub use keys::{KeyVersion, MasterKey, MasterKeySource};
pub use policy::{Classification, ClassificationPolicy, FieldPath};
pub use service::{EncryptionService, ServiceOptions, ServiceState};
