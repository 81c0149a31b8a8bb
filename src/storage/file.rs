// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::pkcs11::*;
use crate::storage::{SecureStorage, StorageInfo};

/// Storage backed by a directory, one file per item
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: &str) -> Result<FileStorage> {
        if dir.is_empty() {
            return Err(CKR_TOKEN_NOT_RECOGNIZED)?;
        }
        fs::create_dir_all(dir)?;
        Ok(FileStorage {
            dir: PathBuf::from(dir),
        })
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        /* item names are flat */
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(CKR_ARGUMENTS_BAD)?;
        }
        Ok(self.dir.join(name))
    }
}

impl SecureStorage for FileStorage {
    fn create(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path(name)?;
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                error!("Storage item {} already exists", name);
                return Err(CKR_GENERAL_ERROR)?;
            }
            Err(e) => return Err(e)?,
        };
        if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(e)?;
        }
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(name)?)?)
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.path(name)?)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        Ok(fs::remove_file(self.path(name)?)?)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path(name)?.is_file())
    }
}

#[derive(Debug)]
pub struct FileStorageInfo {
    db_type: &'static str,
}

impl StorageInfo for FileStorageInfo {
    fn new(&self, conf: &str) -> Result<Arc<dyn SecureStorage>> {
        Ok(Arc::new(FileStorage::new(conf)?))
    }

    fn dbtype(&self) -> &str {
        self.db_type
    }
}

pub static DBINFO: FileStorageInfo = FileStorageInfo { db_type: "file" };
