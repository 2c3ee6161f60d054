//! State digests.
//!
//! SHA-256 over a tagged, length-prefixed encoding of engine state, used to
//! check that preferences evolve identically across runs.

use sha2::{Digest, Sha256};

use super::Variant;

/// Digest output (32 bytes)
pub type StateHash = [u8; 32];

/// Incremental digest of engine state. Feed order is part of the digest.
pub struct StateHasher {
    inner: Sha256,
}

impl StateHasher {
    /// Hasher whose digests are separated from other domains by `domain`.
    pub fn new(domain: &[u8]) -> Self {
        let mut inner = Sha256::new();
        inner.update(domain);
        Self { inner }
    }

    /// Hasher for [`crate::prefs::StdPreferences`].
    pub fn for_preferences() -> Self {
        Self::new(b"STMG_PREFERENCES_V1")
    }

    /// Feed a flag.
    pub fn flag(&mut self, value: bool) {
        self.inner.update([u8::from(value)]);
    }

    /// Feed a count or index, widened to 64 bits.
    pub fn count(&mut self, value: usize) {
        self.inner.update((value as u64).to_le_bytes());
    }

    /// Feed a string prefixed by its byte length.
    pub fn text(&mut self, value: &str) {
        self.count(value.len());
        self.inner.update(value.as_bytes());
    }

    /// Feed an option value with its kind tag.
    pub fn value(&mut self, value: &Variant) {
        match *value {
            Variant::Null => self.inner.update([0]),
            Variant::Int(n) => {
                self.inner.update([1]);
                self.inner.update(n.to_le_bytes());
            }
            Variant::Bool(b) => {
                self.inner.update([2]);
                self.flag(b);
            }
        }
    }

    /// Feed a list of option values.
    pub fn values(&mut self, values: &[Variant]) {
        for value in values {
            self.value(value);
        }
    }

    /// Finish the digest.
    pub fn finalize(self) -> StateHash {
        self.inner.finalize().into()
    }
}

// =============================================================================
// TESTS
// =============================================================================
