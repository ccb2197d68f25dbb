//! [`KeyVersionRegistry`]: current key version plus the derived-DEK cache.
//!
//! Reads are lock-free through `arc-swap`. The cache is copy-on-write: a miss
//! derives the key outside any lock and publishes a new map, so a derived key
//! is immutable once visible. Rotation swaps the current-version pointer under
//! a mutex that only serialises concurrent rotations; readers never wait on it.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use arc_swap::ArcSwap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::Dek;
use crate::policy::Classification;

/// Identifier of one generation of derived keys, e.g. `v1718035200000`.
///
/// Issued versions are `v` followed by strictly increasing millisecond
/// timestamps. Versions read back from payloads are treated as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyVersion(String);

impl KeyVersion {
    fn issued_at(millis: u64) -> Self {
        Self(format!("v{millis}"))
    }

    /// The version string as written into payloads.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyVersion {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for KeyVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type DekCache = HashMap<(Classification, KeyVersion), Arc<Dek>>;

/// Tracks the current key version and caches derived DEKs.
pub struct KeyVersionRegistry {
    current: ArcSwap<KeyVersion>,
    last_issued: Mutex<u64>,
    cache: ArcSwap<DekCache>,
}

impl KeyVersionRegistry {
    /// Create a registry with a freshly issued current version.
    pub fn new() -> Self {
        let millis = now_millis();
        Self {
            current: ArcSwap::from_pointee(KeyVersion::issued_at(millis)),
            last_issued: Mutex::new(millis),
            cache: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// The version new encryptions are tagged with.
    pub fn current(&self) -> Arc<KeyVersion> {
        self.current.load_full()
    }

    /// Issue a new version and make it current.
    ///
    /// Cached keys for earlier versions are kept; they stay valid for
    /// decryption.
    pub fn rotate(&self) -> Arc<KeyVersion> {
        let mut last = self
            .last_issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = now_millis().max(*last + 1);
        *last = next;
        let version = Arc::new(KeyVersion::issued_at(next));
        self.current.store(Arc::clone(&version));
        version
    }

    /// Return the cached DEK for `(classification, version)`, deriving and
    /// caching it with `derive` on a miss.
    ///
    /// Two threads missing on the same entry may both derive; derivation is
    /// deterministic, so whichever result is published first is kept.
    pub fn get_or_derive<F>(
        &self,
        classification: Classification,
        version: &KeyVersion,
        derive: F,
    ) -> Arc<Dek>
    where
        F: FnOnce() -> Dek,
    {
        if let Some(dek) = self.cached(classification, version) {
            return dek;
        }
        debug!(classification = %classification, key_version = %version, "deriving DEK");
        self.insert(classification, version, derive())
    }

    /// The cached DEK for `(classification, version)`, if any.
    pub fn cached(&self, classification: Classification, version: &KeyVersion) -> Option<Arc<Dek>> {
        self.cache
            .load()
            .get(&(classification, version.clone()))
            .map(Arc::clone)
    }

    /// Publish `dek` for `(classification, version)` and return the cached
    /// entry. An entry that is already present wins over `dek`.
    ///
    /// Only insert keys that are known to be genuine: every entry lives as
    /// long as the registry.
    pub fn insert(&self, classification: Classification, version: &KeyVersion, dek: Dek) -> Arc<Dek> {
        let key = (classification, version.clone());
        let derived = Arc::new(dek);
        self.cache.rcu(|map| {
            let mut next = DekCache::clone(map);
            next.entry(key.clone())
                .or_insert_with(|| Arc::clone(&derived));
            next
        });
        self.cache
            .load()
            .get(&key)
            .map(Arc::clone)
            .unwrap_or(derived)
    }

    /// Number of cached DEKs.
    pub fn cached_keys(&self) -> usize {
        self.cache.load().len()
    }
}

impl Default for KeyVersionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyVersionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVersionRegistry")
            .field("current", &self.current.load().as_str())
            .field("cached_keys", &self.cached_keys())
            .finish()
    }
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
