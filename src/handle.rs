// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Handle directories.
//!
//! Clients never see internal identifiers, only 32 bit handles minted by
//! a directory owned by the entity that scopes them: session handles are
//! scoped to a client, object handles to a session.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::Result;
use crate::pkcs11::*;

use bimap::hash::BiHashMap;

/// Bidirectional map between handles and the values they designate.
///
/// Handle 0 is never minted, it is `CK_INVALID_HANDLE`.
#[derive(Debug)]
pub struct Handles<T: Eq + Hash> {
    map: BiHashMap<CK_ULONG, T>,
    next: CK_ULONG,
}

impl<T: Eq + Hash + Debug> Handles<T> {
    pub fn new() -> Handles<T> {
        Handles {
            map: BiHashMap::new(),
            next: 1,
        }
    }

    /// Returns a fresh handle mapped to `value`.
    ///
    /// Fails if `value` already has a handle.
    pub fn mint(&mut self, value: T) -> Result<CK_ULONG> {
        if self.map.contains_right(&value) {
            error!("{:?} already has a handle", value);
            return Err(CKR_GENERAL_ERROR)?;
        }
        /* skip over handles still in use after a wrap around */
        loop {
            let handle = self.next;
            self.next = match self.next.checked_add(1) {
                Some(n) => n,
                None => 1,
            };
            if handle == CK_INVALID_HANDLE || self.map.contains_left(&handle)
            {
                continue;
            }
            if self.map.insert_no_overwrite(handle, value).is_err() {
                return Err(CKR_GENERAL_ERROR)?;
            }
            return Ok(handle);
        }
    }

    pub fn get(&self, handle: CK_ULONG) -> Option<&T> {
        self.map.get_by_left(&handle)
    }

    /// Reverse lookup
    pub fn get_by_value(&self, value: &T) -> Option<CK_ULONG> {
        self.map.get_by_right(value).copied()
    }

    /// Releases a handle, returning the value it designated
    pub fn remove(&mut self, handle: CK_ULONG) -> Option<T> {
        self.map.remove_by_left(&handle).map(|(_, v)| v)
    }

    pub fn remove_value(&mut self, value: &T) -> Option<CK_ULONG> {
        self.map.remove_by_right(value).map(|(h, _)| h)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All the live handles, in no particular order
    pub fn handles(&self) -> Vec<CK_ULONG> {
        self.map.left_values().copied().collect()
    }

    /// Releases every handle whose value satisfies `f`
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.map.retain(|_, v| f(v));
    }
}
