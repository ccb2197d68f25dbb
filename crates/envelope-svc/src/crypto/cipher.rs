//! AES-256-GCM encryption and decryption of byte payloads.
//!
//! Every call to [`encrypt`] draws a fresh 96-bit nonce from the OS CSPRNG.
//! GCM nonce reuse under one key breaks both confidentiality and
//! authentication, so nonces are never derived, counted, or accepted from
//! callers on the encrypt path.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The tag did not verify: tampered data, wrong key, or wrong key version.
    #[error("authentication tag verification failed")]
    AuthenticationFailed,

    /// The supplied nonce is not [`NONCE_LEN`] bytes.
    #[error("invalid nonce length: expected {NONCE_LEN} bytes, got {0}")]
    InvalidNonceLength(usize),

    /// AES-GCM encryption failed (plaintext beyond the GCM length limit).
    #[error("aead encryption failed")]
    AeadFailure,
}

/// Data Encryption Key handle.
///
/// Holds the initialised AES-256-GCM key schedule only; the raw key bytes are
/// dropped (and zeroed) as soon as the handle is built and cannot be read back.
pub struct Dek {
    cipher: Aes256Gcm,
}

impl Dek {
    /// Build a handle from raw key bytes. The caller owns zeroing `key`.
    pub(crate) fn from_key_bytes(key: &[u8; KEY_LEN]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material — not even in debug builds.
        f.write_str("Dek([REDACTED])")
    }
}

/// Encrypt `plaintext` under `dek`.
///
/// Returns the ciphertext (with the 128-bit tag appended) and the random nonce
/// it was sealed with.
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] only if the plaintext exceeds the GCM
/// message length limit.
pub fn encrypt(plaintext: &[u8], dek: &Dek) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CipherError> {
    use aes_gcm::aead::rand_core::RngCore;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = dek
        .cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CipherError::AeadFailure)?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypt `ciphertext` (tag appended) sealed with `nonce` under `dek`.
///
/// # Errors
///
/// Returns [`CipherError::InvalidNonceLength`] if `nonce` is not
/// [`NONCE_LEN`] bytes, and [`CipherError::AuthenticationFailed`] if the tag
/// does not verify. No plaintext is ever returned for a failed tag.
pub fn decrypt(ciphertext: &[u8], nonce: &[u8], dek: &Dek) -> Result<Vec<u8>, CipherError> {
    if nonce.len() != NONCE_LEN {
        return Err(CipherError::InvalidNonceLength(nonce.len()));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CipherError::AuthenticationFailed);
    }
    dek.cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_dek() -> Dek {
        use aes_gcm::aead::rand_core::RngCore;
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Dek::from_key_bytes(&key)
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let dek = random_dek();
        let plaintext = b"123-45-6789";
        let (ct, nonce) = encrypt(plaintext, &dek).unwrap();
        assert_eq!(ct.len(), plaintext.len() + TAG_LEN);
        assert_eq!(decrypt(&ct, &nonce, &dek).unwrap(), plaintext);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let dek = random_dek();
        let (ct, nonce) = encrypt(b"", &dek).unwrap();
        assert_eq!(ct.len(), TAG_LEN);
        assert!(decrypt(&ct, &nonce, &dek).unwrap().is_empty());
    }

    #[test]
    fn same_plaintext_yields_fresh_nonce_and_ciphertext() {
        let dek = random_dek();
        let (ct1, n1) = encrypt(b"same", &dek).unwrap();
        let (ct2, n2) = encrypt(b"same", &dek).unwrap();
        assert_ne!(n1, n2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let (ct, nonce) = encrypt(b"secret", &random_dek()).unwrap();
        assert!(matches!(
            decrypt(&ct, &nonce, &random_dek()),
            Err(CipherError::AuthenticationFailed)
        ));
    }

    #[test]
    fn every_ciphertext_bit_flip_is_detected() {
        let dek = random_dek();
        let (ct, nonce) = encrypt(b"tamper me", &dek).unwrap();
        for bit in 0..ct.len() * 8 {
            let mut tampered = ct.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            assert!(
                matches!(decrypt(&tampered, &nonce, &dek), Err(CipherError::AuthenticationFailed)),
                "bit {bit} flip was accepted"
            );
        }
    }

    #[test]
    fn every_nonce_bit_flip_is_detected() {
        let dek = random_dek();
        let (ct, nonce) = encrypt(b"tamper me", &dek).unwrap();
        for bit in 0..NONCE_LEN * 8 {
            let mut tampered = nonce;
            tampered[bit / 8] ^= 1 << (bit % 8);
            assert!(decrypt(&ct, &tampered, &dek).is_err(), "bit {bit} flip was accepted");
        }
    }

    #[test]
    fn short_nonce_rejected() {
        let dek = random_dek();
        let (ct, _) = encrypt(b"x", &dek).unwrap();
        assert!(matches!(
            decrypt(&ct, &[0u8; 8], &dek),
            Err(CipherError::InvalidNonceLength(8))
        ));
    }

    #[test]
    fn truncated_ciphertext_fails_auth() {
        let dek = random_dek();
        let (ct, nonce) = encrypt(b"x", &dek).unwrap();
        assert!(decrypt(&ct[..4], &nonce, &dek).is_err());
    }

    #[test]
    fn dek_redacted_in_debug() {
        assert!(format!("{:?}", random_dek()).contains("REDACTED"));
    }
}
