// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Serialized attribute lists.
//!
//! An attribute list is a self describing blob: an 8 byte header
//! `{attrs_size: u32, attrs_count: u32}` followed by `attrs_count`
//! records `{id: u32, size: u32, value: [u8; size]}`. All integers are
//! little endian. The same format is used for client templates, for
//! objects held in memory and for objects persisted in secure storage.

use crate::error::Result;
use crate::helpers::{attr_name, attribute_is_boolean, attribute_is_template};
use crate::pkcs11::*;

pub const ATTRS_HEAD_SIZE: usize = 8;
pub const ATTR_REF_SIZE: usize = 8;

#[inline]
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// An owned attribute list.
///
/// Mutation may reallocate the storage, so borrowed views returned by
/// the getters never outlive a change of the list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    count: u32,
    data: Vec<u8>,
}

impl Attributes {
    pub fn new() -> Attributes {
        Attributes {
            count: 0,
            data: Vec::new(),
        }
    }

    /// Parses a serialized list, checking the header is consistent
    /// with the records it describes.
    pub fn from_bytes(buf: &[u8]) -> Result<Attributes> {
        let size = match read_u32(buf, 0) {
            Some(s) => s as usize,
            None => return Err(CKR_ARGUMENTS_BAD)?,
        };
        let count = match read_u32(buf, 4) {
            Some(c) => c,
            None => return Err(CKR_ARGUMENTS_BAD)?,
        };
        if buf.len() != ATTRS_HEAD_SIZE + size {
            return Err(CKR_ARGUMENTS_BAD)?;
        }
        let attrs = Attributes {
            count: count,
            data: buf[ATTRS_HEAD_SIZE..].to_vec(),
        };
        let mut found = 0u32;
        for item in attrs.raw_iter() {
            item?;
            found += 1;
        }
        if found != count {
            return Err(CKR_ARGUMENTS_BAD)?;
        }
        Ok(attrs)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.size());
        v.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        v.extend_from_slice(&self.count.to_le_bytes());
        v.extend_from_slice(&self.data);
        v
    }

    /// Total serialized size, header included
    pub fn size(&self) -> usize {
        ATTRS_HEAD_SIZE + self.data.len()
    }

    pub fn attrs_size(&self) -> usize {
        self.data.len()
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn raw_iter(&self) -> RawIter<'_> {
        RawIter {
            data: &self.data,
            offset: 0,
        }
    }

    /// Iterates over `(id, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (CK_ATTRIBUTE_TYPE, &[u8])> {
        self.raw_iter()
            .filter_map(|r| r.ok())
            .map(|(_, id, value)| (id, value))
    }

    /// Appends a record; duplicates are not checked.
    pub fn add(&mut self, id: CK_ATTRIBUTE_TYPE, value: &[u8]) {
        self.data.extend_from_slice(&id.to_le_bytes());
        self.data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.data.extend_from_slice(value);
        self.count += 1;
    }

    pub fn add_bool(&mut self, id: CK_ATTRIBUTE_TYPE, value: bool) {
        self.add(id, &[if value { CK_TRUE } else { CK_FALSE }]);
    }

    pub fn add_u32(&mut self, id: CK_ATTRIBUTE_TYPE, value: u32) {
        self.add(id, &value.to_le_bytes());
    }

    /// Replaces every record with this identifier by a single one
    pub fn set(&mut self, id: CK_ATTRIBUTE_TYPE, value: &[u8]) {
        while self.remove(id).is_ok() {}
        self.add(id, value);
    }

    fn find_offset(&self, id: CK_ATTRIBUTE_TYPE) -> Option<(usize, usize)> {
        for item in self.raw_iter() {
            match item {
                Ok((offset, aid, value)) if aid == id => {
                    return Some((offset, ATTR_REF_SIZE + value.len()))
                }
                Ok(_) => (),
                Err(_) => return None,
            }
        }
        None
    }

    /// Removes the first record with this identifier
    pub fn remove(&mut self, id: CK_ATTRIBUTE_TYPE) -> Result<()> {
        match self.find_offset(id) {
            Some((offset, len)) => {
                self.data.drain(offset..offset + len);
                self.count -= 1;
                Ok(())
            }
            None => err_not_found!(attr_name(id).to_string()),
        }
    }

    /// Removes every record with this identifier, failing if none is
    /// found or if more than `max_check` instances are present, which
    /// denotes a corrupted list.
    pub fn remove_check(
        &mut self,
        id: CK_ATTRIBUTE_TYPE,
        max_check: usize,
    ) -> Result<()> {
        let found = self.iter().filter(|(aid, _)| *aid == id).count();
        if found == 0 || found > max_check {
            error!("Found {} instances of {}", found, attr_name(id));
            return Err(CKR_FUNCTION_FAILED)?;
        }
        for _ in 0..found {
            self.remove(id)?;
        }
        Ok(())
    }

    /// Returns the value of the first record with this identifier
    pub fn get_ptr(&self, id: CK_ATTRIBUTE_TYPE) -> Result<&[u8]> {
        match self.iter().find(|(aid, _)| *aid == id) {
            Some((_, value)) => Ok(value),
            None => err_not_found!(attr_name(id).to_string()),
        }
    }

    /// Returns the values of all the records with this identifier
    pub fn get_all(&self, id: CK_ATTRIBUTE_TYPE) -> Vec<&[u8]> {
        self.iter()
            .filter(|(aid, _)| *aid == id)
            .map(|(_, value)| value)
            .collect()
    }

    /// Copies the value into `out`, whose size must match exactly.
    pub fn get(&self, id: CK_ATTRIBUTE_TYPE, out: &mut [u8]) -> Result<()> {
        let value = self.get_ptr(id)?;
        if value.len() != out.len() {
            return Err(CKR_BUFFER_TOO_SMALL)?;
        }
        out.copy_from_slice(value);
        Ok(())
    }

    pub fn get_u32(&self, id: CK_ATTRIBUTE_TYPE) -> Result<u32> {
        let mut v = [0u8; 4];
        self.get(id, &mut v)?;
        Ok(u32::from_le_bytes(v))
    }

    /// Reads a boolean attribute; absent or malformed values read as
    /// false. Defaults are applied at object creation, not here.
    pub fn get_bool(&self, id: CK_ATTRIBUTE_TYPE) -> bool {
        let mut v = [0u8; 1];
        match self.get(id, &mut v) {
            Ok(()) => v[0] != CK_FALSE,
            Err(_) => false,
        }
    }

    pub fn has(&self, id: CK_ATTRIBUTE_TYPE) -> bool {
        self.iter().any(|(aid, _)| aid == id)
    }

    pub fn get_class(&self) -> CK_OBJECT_CLASS {
        self.get_u32(CKA_CLASS).unwrap_or(CKO_UNDEFINED_ID)
    }

    pub fn get_type(&self) -> CK_KEY_TYPE {
        self.get_u32(CKA_KEY_TYPE).unwrap_or(CKK_UNDEFINED_ID)
    }

    /// Checks every record of `reference` has a byte identical
    /// counterpart in this list. An empty reference matches nothing.
    pub fn matches(&self, reference: &Attributes) -> bool {
        if reference.is_empty() {
            return false;
        }
        for (id, value) in reference.iter() {
            if attribute_is_boolean(id) {
                let want = value.first().map_or(false, |b| *b != CK_FALSE);
                if !self.has(id) || self.get_bool(id) != want {
                    return false;
                }
                continue;
            }
            if !self.get_all(id).iter().any(|v| *v == value) {
                return false;
            }
        }
        true
    }

    /// Dumps the list at trace level, nested templates are rendered
    /// one level deeper.
    pub fn trace(&self, prefix: &str) {
        trace!(
            "{},--- (serial object) Attributes list --------",
            prefix
        );
        trace!(
            "{}| {} item(s) - {} bytes",
            prefix,
            self.count,
            self.data.len()
        );
        self.trace_items(prefix, 0);
        trace!("{}`-----------------------", prefix);
    }

    fn trace_items(&self, prefix: &str, depth: usize) {
        let indent = "    ".repeat(depth);
        for (id, value) in self.iter() {
            trace!(
                "{}| {}{} (0x{:x}) {} byte(s): {}",
                prefix,
                indent,
                attr_name(id),
                id,
                value.len(),
                hex::encode(&value[..value.len().min(32)])
            );
            if attribute_is_template(id) && depth == 0 {
                if let Ok(inner) = Attributes::from_bytes(value) {
                    inner.trace_items(prefix, depth + 1);
                }
            }
        }
    }
}

struct RawIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for RawIter<'a> {
    type Item = Result<(usize, CK_ATTRIBUTE_TYPE, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let start = self.offset;
        let parsed = read_u32(self.data, start).and_then(|id| {
            let size = read_u32(self.data, start + 4)? as usize;
            let end = (start + ATTR_REF_SIZE).checked_add(size)?;
            let value = self.data.get(start + ATTR_REF_SIZE..end)?;
            Some((id, value, end))
        });
        match parsed {
            Some((id, value, end)) => {
                self.offset = end;
                Some(Ok((start, id, value)))
            }
            None => {
                self.offset = self.data.len();
                Some(Err(CKR_ARGUMENTS_BAD.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.add_u32(CKA_CLASS, CKO_SECRET_KEY);
        attrs.add_bool(CKA_ENCRYPT, true);
        attrs.add(CKA_LABEL, b"label");
        attrs
    }

    #[test]
    fn header_consistency() {
        let attrs = sample();
        assert_eq!(attrs.count(), 3);
        assert_eq!(attrs.attrs_size(), 3 * ATTR_REF_SIZE + 4 + 1 + 5);
        let bytes = attrs.to_bytes();
        assert_eq!(read_u32(&bytes, 0), Some(attrs.attrs_size() as u32));
        assert_eq!(read_u32(&bytes, 4), Some(3));
        assert_eq!(Attributes::from_bytes(&bytes).unwrap(), attrs);
    }

    #[test]
    fn malformed_blobs() {
        let mut bytes = sample().to_bytes();
        bytes[4] = 4;
        assert!(Attributes::from_bytes(&bytes).is_err());
        let bytes = sample().to_bytes();
        assert!(Attributes::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(Attributes::from_bytes(&[0u8; 4]).is_err());
        assert!(Attributes::from_bytes(&[0u8; 8]).unwrap().is_empty());
    }

    #[test]
    fn getters() {
        let attrs = sample();
        assert_eq!(attrs.get_class(), CKO_SECRET_KEY);
        assert_eq!(attrs.get_type(), CKK_UNDEFINED_ID);
        assert!(attrs.get_bool(CKA_ENCRYPT));
        assert!(!attrs.get_bool(CKA_DECRYPT));
        assert_eq!(attrs.get_ptr(CKA_LABEL).unwrap(), b"label");

        let mut short = [0u8; 2];
        let err = attrs.get(CKA_LABEL, &mut short).unwrap_err();
        assert_eq!(err.rv(), CKR_BUFFER_TOO_SMALL);
        assert!(attrs.get_ptr(CKA_VALUE).unwrap_err().is_not_found());
    }

    #[test]
    fn remove_and_readd() {
        let mut attrs = sample();
        let orig = attrs.clone();
        attrs.remove(CKA_LABEL).unwrap();
        assert_eq!(attrs.count(), 2);
        assert!(attrs.remove(CKA_LABEL).unwrap_err().is_not_found());
        attrs.add(CKA_LABEL, b"label");
        assert_eq!(attrs, orig);

        attrs.add(CKA_LABEL, b"other");
        assert_eq!(attrs.get_all(CKA_LABEL).len(), 2);
        let err = attrs.remove_check(CKA_LABEL, 1).unwrap_err();
        assert_eq!(err.rv(), CKR_FUNCTION_FAILED);
        attrs.remove_check(CKA_LABEL, 2).unwrap();
        assert!(!attrs.has(CKA_LABEL));
        assert_eq!(attrs.count(), 2);
        let err = attrs.remove_check(CKA_LABEL, 2).unwrap_err();
        assert_eq!(err.rv(), CKR_FUNCTION_FAILED);
    }

    #[test]
    fn matching() {
        let attrs = sample();
        let mut reference = Attributes::new();
        assert!(!attrs.matches(&reference));

        reference.add_u32(CKA_CLASS, CKO_SECRET_KEY);
        assert!(attrs.matches(&reference));

        reference.add_bool(CKA_ENCRYPT, true);
        assert!(attrs.matches(&reference));

        let mut other = reference.clone();
        other.add_bool(CKA_DECRYPT, false);
        assert!(!attrs.matches(&other));

        reference.add(CKA_LABEL, b"lab");
        assert!(!attrs.matches(&reference));
    }
}
