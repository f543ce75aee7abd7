//! Identity interning for arena addressing.
//!
//! External identities (task and server ids) are strings; the chain model
//! addresses nodes by dense integer keys instead. An identity keeps its key
//! for the life of the interner, so a removed id that is added again maps back
//! to the same slot and never aliases a different identity.

use rustc_hash::FxHashMap;

use crate::models::ArenaKey;

/// String interner mapping identities to stable arena keys.
#[derive(Debug, Clone)]
pub struct IdInterner<K> {
    to_key: FxHashMap<String, K>,
}

impl<K: ArenaKey> IdInterner<K> {
    /// Create a new interner with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_key: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Intern an identity, returning its key.
    /// If already interned, returns the existing key.
    pub fn intern(&mut self, id: &str) -> K {
        if let Some(&key) = self.to_key.get(id) {
            return key;
        }
        let key = K::from_index(self.to_key.len() as u32);
        self.to_key.insert(id.to_string(), key);
        key
    }

    /// Key for an identity, if it was ever interned.
    #[inline]
    pub fn get(&self, id: &str) -> Option<K> {
        self.to_key.get(id).copied()
    }
}

impl<K: ArenaKey> Default for IdInterner<K> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
