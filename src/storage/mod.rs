// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! This module defines the secure storage interface (`SecureStorage`
//! trait) the token uses to persist its state and its objects, and the
//! helpers to instantiate the available backends.
//!
//! Storage items are flat named byte blobs: the per token database
//! `token.db.<N>`, the per user PIN keys and one blob per persistent
//! object, named after the object UUID.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;
use crate::pkcs11::*;

use once_cell::sync::Lazy;

pub mod file;
pub mod memory;

/// Trait for discovering available storage backend types.
///
/// Each backend implementation provides a static instance of this trait
/// which is registered in the `STORAGE_TYPES` list.
pub trait StorageInfo: Debug + Send + Sync {
    /// Creates a new instance of the storage backend.
    fn new(&self, conf: &str) -> Result<Arc<dyn SecureStorage>>;
    /// Returns the unique name identifying this storage backend type.
    fn dbtype(&self) -> &str;
}

/// The interface of the secure persistent storage facility.
pub trait SecureStorage: Debug + Send + Sync {
    /// Creates a new item, fails if an item with the same name exists.
    fn create(&self, name: &str, data: &[u8]) -> Result<()>;
    /// Reads the full content of an item.
    /// Returns a not found error if the item does not exist.
    fn read(&self, name: &str) -> Result<Vec<u8>>;
    /// Replaces the full content of an existing item.
    fn write(&self, name: &str, data: &[u8]) -> Result<()>;
    /// Deletes an item.
    fn remove(&self, name: &str) -> Result<()>;
    /// Checks whether an item exists.
    fn exists(&self, name: &str) -> Result<bool>;
}

static STORAGE_TYPES: Lazy<Vec<&'static dyn StorageInfo>> = Lazy::new(|| {
    let mut v = Vec::<&'static dyn StorageInfo>::with_capacity(2);
    v.push(&file::DBINFO);
    v.push(&memory::DBINFO);
    v
});

/// Factory function to create a new storage backend instance.
///
/// Finds the appropriate backend based on the provided `name` string and
/// instantiates it using the configuration string `conf`.
pub fn new_storage(name: &str, conf: &str) -> Result<Arc<dyn SecureStorage>> {
    for info in STORAGE_TYPES.iter() {
        if name == info.dbtype() {
            return info.new(conf);
        }
    }
    error!("Unknown storage type {}", name);
    Err(CKR_TOKEN_NOT_RECOGNIZED)?
}
