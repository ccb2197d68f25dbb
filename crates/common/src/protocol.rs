//! Request and response types exchanged between components.
//!
//! [`EncryptedPayload`] is the only artifact that crosses into storage layers;
//! its JSON shape is fixed and is what the service uses to recognise an
//! encrypted field structurally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Algorithm identifier carried by every payload.
pub const ALGORITHM: &str = "AES-256-GCM";

// ---------------------------------------------------------------------------
// Encrypted payload
// ---------------------------------------------------------------------------

/// A single encrypted value.
///
/// ```json
/// {
///   "ciphertext": "<standard base64>",
///   "iv": "<standard base64, 12 raw bytes>",
///   "keyVersion": "<string>",
///   "algorithm": "AES-256-GCM",
///   "encryptedAt": "<ISO-8601 timestamp>"
/// }
/// ```
///
/// `ciphertext` and `iv` stay base64 text here; decoding happens in the
/// service so that a malformed encoding surfaces as a serialization error
/// rather than as "not a payload".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EncryptedPayload {
    /// Ciphertext with the 16-byte authentication tag appended.
    pub ciphertext: String,
    /// 96-bit nonce.
    pub iv: String,
    /// Key version the DEK was derived for.
    pub key_version: String,
    /// Always [`ALGORITHM`].
    pub algorithm: String,
    /// Time of encryption.
    pub encrypted_at: DateTime<Utc>,
}

impl EncryptedPayload {
    /// Recognise a JSON value as an encrypted payload.
    ///
    /// Returns `None` for anything that is not an object with exactly the
    /// payload fields and the expected algorithm identifier.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let payload: Self = serde_json::from_value(value.clone()).ok()?;
        (payload.algorithm == ALGORITHM).then_some(payload)
    }

    /// Convert into the JSON value written back into a record.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "ciphertext": self.ciphertext,
            "iv": self.iv,
            "keyVersion": self.key_version,
            "algorithm": self.algorithm,
            "encryptedAt": self.encrypted_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        })
    }
}

// ---------------------------------------------------------------------------
// Record endpoints
// ---------------------------------------------------------------------------

/// Request body for `POST /encrypt` and `POST /decrypt`.
///
/// The classification is named in the classification request header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRequest {
    /// Arbitrary JSON record.
    pub payload: serde_json::Value,
}

/// Successful response body for `POST /encrypt` and `POST /decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    /// Copy of the input record with the policy fields transformed.
    pub payload: serde_json::Value,
}

/// Successful response body for `POST /rotate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateResponse {
    /// The version that is now current.
    pub key_version: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether a master key is loaded and a key version is current.
    pub ready: bool,
    /// Current key version, if ready.
    pub key_version: Option<String>,
    /// Whether the master key is an ephemeral, process-local key.
    pub ephemeral_key: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "ciphertext": "AAAA",
            "iv": "AAAAAAAAAAAAAAAA",
            "keyVersion": "v1700000000000",
            "algorithm": "AES-256-GCM",
            "encryptedAt": "2024-01-01T00:00:00.000Z"
        })
    }

    #[test]
    fn payload_recognised_from_value() {
        let p = EncryptedPayload::from_value(&sample()).unwrap();
        assert_eq!(p.key_version, "v1700000000000");
        assert_eq!(p.algorithm, ALGORITHM);
    }

    #[test]
    fn payload_value_uses_wire_field_names() {
        let p = EncryptedPayload::from_value(&sample()).unwrap();
        let v = p.to_value();
        assert_eq!(v, sample());
    }

    #[test]
    fn plain_values_are_not_payloads() {
        assert!(EncryptedPayload::from_value(&json!("123-45-6789")).is_none());
        assert!(EncryptedPayload::from_value(&json!({"ssn": "x"})).is_none());
        assert!(EncryptedPayload::from_value(&json!(null)).is_none());
    }

    #[test]
    fn extra_or_missing_fields_are_not_payloads() {
        let mut extra = sample();
        extra["note"] = json!("x");
        assert!(EncryptedPayload::from_value(&extra).is_none());

        let mut missing = sample();
        missing.as_object_mut().unwrap().remove("iv");
        assert!(EncryptedPayload::from_value(&missing).is_none());
    }

    #[test]
    fn foreign_algorithm_is_not_a_payload() {
        let mut other = sample();
        other["algorithm"] = json!("ChaCha20-Poly1305");
        assert!(EncryptedPayload::from_value(&other).is_none());
    }

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("bad_request", "missing classification header");
        assert_eq!(e.code, "bad_request");
        assert!(e.message.contains("missing classification header"));
    }

    #[test]
    fn health_response_serde() {
        let h = HealthResponse {
            status: "ok".into(),
            ready: true,
            key_version: Some("v1".into()),
            ephemeral_key: false,
        };
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["keyVersion"], "v1");
        let decoded: HealthResponse = serde_json::from_value(json).unwrap();
        assert!(decoded.ready);
    }
}
