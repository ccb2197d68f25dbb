//! AES-256-GCM field encryption primitives and per-purpose key derivation.
//!
//! This module is free of HTTP and policy concerns. It provides the opaque
//! [`Dek`] handle, the PBKDF2 engine that produces it from the master key, and
//! the low-level encrypt/decrypt operations used by the service layer.

pub mod cipher;
pub mod kdf;

pub use cipher::{Dek, CipherError, KEY_LEN, NONCE_LEN};
pub use kdf::{KdfError, KeyDerivationEngine, DEFAULT_ITERATIONS};
