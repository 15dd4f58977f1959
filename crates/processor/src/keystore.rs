//! Locally held symmetric keys

use std::collections::BTreeMap;
use std::fmt;

use zeroize::Zeroizing;

/// Named symmetric keys available to this server
pub trait SymmetricKeyStore: Send + Sync + fmt::Debug {
    /// Names of every stored key
    fn key_names(&self) -> Vec<String>;

    /// Raw key bytes by name
    fn key(&self, name: &str) -> Option<Zeroizing<Vec<u8>>>;
}

/// In-memory key store
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: BTreeMap<String, Zeroizing<Vec<u8>>>,
}

impl MemoryKeyStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a key
    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.keys.insert(name.into(), Zeroizing::new(key.into()));
        self
    }
}

impl fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("names", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SymmetricKeyStore for MemoryKeyStore {
    fn key_names(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    fn key(&self, name: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.keys.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryKeyStore::new().with_key("sharedSecret", vec![0x40; 16]);
        assert_eq!(store.key_names(), vec!["sharedSecret".to_owned()]);
        assert_eq!(store.key("sharedSecret").unwrap().len(), 16);
        assert!(store.key("other").is_none());
        assert!(!format!("{store:?}").contains("64"));
    }
}
