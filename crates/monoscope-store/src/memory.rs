use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{IdentityStore, StoreError};

/// In-process store. Clones share the same map, which is how agents in one
/// session scope see each other's writes.
#[derive(Clone, Debug, Default)]
pub struct MemoryIdentityStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every key, as when the browsing context ends.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _ = self
            .entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _ = self.entries.write().remove(key);
        Ok(())
    }
}
