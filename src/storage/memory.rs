// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;
use crate::pkcs11::*;
use crate::storage::{SecureStorage, StorageInfo};

/// Volatile storage, items live as long as the last clone of the
/// storage handle. Clones share the same items.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    fn items(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.items.lock().map_err(|_| to_rv!(CKR_GENERAL_ERROR))
    }

    /// Names of all the stored items
    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        match self.items() {
            Ok(items) => items.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl SecureStorage for MemoryStorage {
    fn create(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut items = self.items()?;
        if items.contains_key(name) {
            return Err(CKR_GENERAL_ERROR)?;
        }
        items.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        match self.items()?.get(name) {
            Some(data) => Ok(data.clone()),
            None => err_not_found!(name.to_string()),
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        match self.items()?.get_mut(name) {
            Some(item) => {
                item.clear();
                item.extend_from_slice(data);
                Ok(())
            }
            None => err_not_found!(name.to_string()),
        }
    }

    fn remove(&self, name: &str) -> Result<()> {
        match self.items()?.remove(name) {
            Some(_) => Ok(()),
            None => err_not_found!(name.to_string()),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.items()?.contains_key(name))
    }
}

#[derive(Debug)]
pub struct MemoryStorageInfo {
    db_type: &'static str,
}

impl StorageInfo for MemoryStorageInfo {
    fn new(&self, _conf: &str) -> Result<Arc<dyn SecureStorage>> {
        Ok(Arc::new(MemoryStorage::new()))
    }

    fn dbtype(&self) -> &str {
        self.db_type
    }
}

pub static DBINFO: MemoryStorageInfo = MemoryStorageInfo { db_type: "memory" };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_items() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        storage.create("a", b"one").unwrap();
        assert!(storage.create("a", b"two").is_err());
        assert_eq!(clone.read("a").unwrap(), b"one");
        clone.write("a", b"three").unwrap();
        assert_eq!(storage.read("a").unwrap(), b"three");
        assert!(storage.write("b", b"x").unwrap_err().is_not_found());
        storage.remove("a").unwrap();
        assert!(!clone.exists("a").unwrap());
        assert!(clone.read("a").unwrap_err().is_not_found());
    }
}
