// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Readers and writers for the serialized command arguments.

use crate::attribute::{read_u32, Attributes, ATTRS_HEAD_SIZE};
use crate::error::Result;
use crate::pkcs11::*;

/// A cursor over a serialized argument buffer.
///
/// Every read fails with `CKR_ARGUMENTS_BAD` if it would overflow the
/// buffer.
#[derive(Debug)]
pub struct SerialArgs<'a> {
    buf: &'a [u8],
    pos: usize,
}

/// A mechanism reference `{id: u32, size: u32, params: [u8; size]}`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MechanismParams {
    pub id: CK_MECHANISM_TYPE,
    pub params: Vec<u8>,
}

impl<'a> SerialArgs<'a> {
    pub fn new(buf: &'a [u8]) -> SerialArgs<'a> {
        SerialArgs { buf: buf, pos: 0 }
    }

    /// Returns an alias to the next `size` bytes of the input
    pub fn get_ptr(&mut self, size: usize) -> Result<&'a [u8]> {
        let end = match self.pos.checked_add(size) {
            Some(e) if e <= self.buf.len() => e,
            _ => {
                error!(
                    "arg too short: pos {} size {} len {}",
                    self.pos,
                    size,
                    self.buf.len()
                );
                return Err(CKR_ARGUMENTS_BAD)?;
            }
        };
        let data = &self.buf[self.pos..end];
        self.pos = end;
        Ok(data)
    }

    /// Copies the next `out.len()` bytes
    pub fn get(&mut self, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(self.get_ptr(out.len())?);
        Ok(())
    }

    /// Returns an owned copy of the next `size` bytes
    pub fn alloc_get(&mut self, size: usize) -> Result<Vec<u8>> {
        Ok(self.get_ptr(size)?.to_vec())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let mut v = [0u8; 4];
        self.get(&mut v)?;
        Ok(u32::from_le_bytes(v))
    }

    /// Reads a single `{id, size, data}` reference
    pub fn alloc_get_one_attribute(&mut self) -> Result<MechanismParams> {
        let id = self.get_u32()?;
        let size = self.get_u32()? as usize;
        let params = self.alloc_get(size)?;
        Ok(MechanismParams {
            id: id,
            params: params,
        })
    }

    /// Reads a complete serialized attribute list
    pub fn alloc_get_attributes(&mut self) -> Result<Attributes> {
        let head = self.get_ptr(ATTRS_HEAD_SIZE)?;
        let size = match read_u32(head, 0) {
            Some(s) => s as usize,
            None => return Err(CKR_ARGUMENTS_BAD)?,
        };
        let start = self.pos - ATTRS_HEAD_SIZE;
        self.get_ptr(size)?;
        Attributes::from_bytes(&self.buf[start..self.pos])
    }

    pub fn remaining_bytes(&self) -> bool {
        self.pos < self.buf.len()
    }

    /// Fails if any byte was left unread
    pub fn check_consumed(&self) -> Result<()> {
        if self.remaining_bytes() {
            error!("Unexpected trailing bytes in arguments");
            return Err(CKR_ARGUMENTS_BAD)?;
        }
        Ok(())
    }
}

/// Accumulates serialized outputs
#[derive(Debug, Default)]
pub struct Serializer {
    buf: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Serializer {
        Serializer { buf: Vec::new() }
    }

    pub fn put(&mut self, data: &[u8]) -> &mut Serializer {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Serializer {
        self.put(&value.to_le_bytes())
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Serializer {
        self.put(&value.to_le_bytes())
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Serializer {
        self.put(&[value])
    }

    /// Appends a string, truncated or padded with blanks to `size`
    pub fn put_padded(&mut self, s: &[u8], size: usize) -> &mut Serializer {
        let mut field = vec![b' '; size];
        let len = s.len().min(size);
        field[..len].copy_from_slice(&s[..len]);
        self.put(&field)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_reads() {
        let mut s = Serializer::new();
        s.put_u32(7).put_u32(3).put(b"abc");
        let buf = s.finish();
        let mut args = SerialArgs::new(&buf);
        assert_eq!(args.get_u32().unwrap(), 7);
        let mech = args.alloc_get_one_attribute().unwrap();
        assert_eq!(mech.id, 3);
        assert_eq!(mech.params, b"abc");
        assert!(!args.remaining_bytes());
        args.check_consumed().unwrap();
        assert_eq!(args.get_u32().unwrap_err().rv(), CKR_ARGUMENTS_BAD);
    }

    #[test]
    fn overflowing_reference() {
        let mut s = Serializer::new();
        s.put_u32(1).put_u32(0xffff_fff0);
        let buf = s.finish();
        let mut args = SerialArgs::new(&buf);
        let err = args.alloc_get_one_attribute().unwrap_err();
        assert_eq!(err.rv(), CKR_ARGUMENTS_BAD);
    }

    #[test]
    fn attribute_lists() {
        let mut attrs = Attributes::new();
        attrs.add_u32(CKA_CLASS, CKO_DATA);
        let mut s = Serializer::new();
        s.put_u32(1).put(&attrs.to_bytes()).put_u8(0);
        let buf = s.finish();
        let mut args = SerialArgs::new(&buf);
        args.get_u32().unwrap();
        assert_eq!(args.alloc_get_attributes().unwrap(), attrs);
        assert!(args.remaining_bytes());
        assert_eq!(args.check_consumed().unwrap_err().rv(), CKR_ARGUMENTS_BAD);
    }

    #[test]
    fn padded_strings() {
        let mut s = Serializer::new();
        s.put_padded(b"abc", 5).put_padded(b"toolong", 3);
        assert_eq!(s.finish(), b"abc  too");
    }
}
