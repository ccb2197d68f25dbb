//! Classification labels and the field-path policy attached to each of them.
//!
//! # Responsibilities
//!
//! - Define the closed set of [`Classification`]s.
//! - Map each classification to the ordered list of [`FieldPath`]s that must
//!   be encrypted for it. `PUBLIC` always maps to nothing.
//! - Load host-application overrides from a YAML or JSON document.
//!
//! # Module invariants
//!
//! - **No crypto dependencies.** This module must not import anything from
//!   `crate::crypto` or `crate::keys`.

pub mod path;

pub use path::{get_nested_value, set_nested_value, FieldPath, PathError};

use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors from policy parsing and classification lookup.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A label did not name one of the four classifications.
    #[error("unsupported classification: {0}")]
    UnsupportedClassification(String),

    /// An override tried to attach fields to `PUBLIC`.
    #[error("PUBLIC classification must not list any fields")]
    PublicNotEmpty,

    /// A configured field path is invalid.
    #[error("invalid field path in policy: {0}")]
    InvalidPath(#[from] PathError),

    /// The policy document is neither valid YAML nor valid JSON.
    #[error("failed to parse policy document: {0}")]
    Parse(String),

    /// The policy file could not be read.
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Sensitivity label of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl Classification {
    /// Every classification, least sensitive first.
    pub const ALL: [Classification; 4] = [
        Classification::Public,
        Classification::Internal,
        Classification::Confidential,
        Classification::Restricted,
    ];

    /// Canonical upper-case label; also the KDF salt prefix.
    pub fn label(self) -> &'static str {
        match self {
            Classification::Public => "PUBLIC",
            Classification::Internal => "INTERNAL",
            Classification::Confidential => "CONFIDENTIAL",
            Classification::Restricted => "RESTRICTED",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Classification {
    type Err = PolicyError;

    /// Parse a label, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Classification::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| PolicyError::UnsupportedClassification(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// Classification → ordered field paths to encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationPolicy {
    internal: Vec<FieldPath>,
    confidential: Vec<FieldPath>,
    restricted: Vec<FieldPath>,
}

/// On-disk override format: classification label → field list.
///
/// Listed classifications replace the defaults; omitted ones keep them.
///
/// ```yaml
/// CONFIDENTIAL: [ssn, email, driver.licenseNumber]
/// RESTRICTED: [ssn, email, bankAccount]
/// ```
type PolicyDocument = BTreeMap<Classification, Vec<String>>;

impl ClassificationPolicy {
    /// A policy that encrypts nothing for any classification.
    pub fn empty() -> Self {
        Self {
            internal: Vec::new(),
            confidential: Vec::new(),
            restricted: Vec::new(),
        }
    }

    /// Field paths to encrypt for `classification`, in order.
    pub fn fields(&self, classification: Classification) -> &[FieldPath] {
        match classification {
            Classification::Public => &[],
            Classification::Internal => &self.internal,
            Classification::Confidential => &self.confidential,
            Classification::Restricted => &self.restricted,
        }
    }

    /// Replace the field list of one classification.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPath`] for a malformed path and
    /// [`PolicyError::PublicNotEmpty`] if fields are given for `PUBLIC`.
    pub fn with_fields<I, S>(mut self, classification: Classification, paths: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = paths
            .into_iter()
            .map(|p| FieldPath::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        match classification {
            Classification::Public if parsed.is_empty() => {}
            Classification::Public => return Err(PolicyError::PublicNotEmpty),
            Classification::Internal => self.internal = parsed,
            Classification::Confidential => self.confidential = parsed,
            Classification::Restricted => self.restricted = parsed,
        }
        Ok(self)
    }

    /// Apply an override document (YAML, or JSON) on top of `self`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] if the text is neither YAML nor JSON in
    /// the override format, plus any error from [`Self::with_fields`].
    pub fn with_overrides(self, text: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = if let Ok(parsed) = serde_yaml::from_str(text) {
            parsed
        } else {
            serde_json::from_str(text).map_err(|e| PolicyError::Parse(e.to_string()))?
        };

        doc.into_iter()
            .try_fold(self, |policy, (classification, paths)| {
                policy.with_fields(classification, paths)
            })
    }

    /// Load the default policy with the overrides in the file at `path` applied.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Io`] if the file cannot be read, plus any error
    /// from [`Self::with_overrides`].
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let policy = Self::default().with_overrides(&text)?;
        info!(
            path = %path.display(),
            internal = policy.internal.len(),
            confidential = policy.confidential.len(),
            restricted = policy.restricted.len(),
            "classification policy loaded"
        );
        Ok(policy)
    }
}

const INTERNAL_FIELDS: &[&str] = &["email", "phone"];

const CONFIDENTIAL_FIELDS: &[&str] = &[
    "ssn",
    "email",
    "phone",
    "dateOfBirth",
    "driver.ssn",
    "driver.licenseNumber",
];

const RESTRICTED_FIELDS: &[&str] = &[
    "ssn",
    "email",
    "phone",
    "dateOfBirth",
    "address",
    "bankAccount",
    "creditCard",
    "medicalInfo",
    "driver.ssn",
    "driver.licenseNumber",
];

impl Default for ClassificationPolicy {
    fn default() -> Self {
        // Every built-in literal must parse; `default_policy_keeps_all_builtin_paths`
        // pins the counts so a rejected literal cannot drop out silently.
        let parse = |paths: &[&str]| -> Vec<FieldPath> {
            let parsed: Vec<FieldPath> = paths.iter().filter_map(|p| FieldPath::parse(p).ok()).collect();
            debug_assert_eq!(parsed.len(), paths.len(), "built-in field path rejected");
            parsed
        };
        Self {
            internal: parse(INTERNAL_FIELDS),
            confidential: parse(CONFIDENTIAL_FIELDS),
            restricted: parse(RESTRICTED_FIELDS),
        }
    }
}
