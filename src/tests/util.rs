// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use super::*;

/// Builds an attribute template, one `(kind, id, value)` entry per
/// attribute where kind is `u32`, `bool` or `bytes`
macro_rules! make_template {
    ($(($kind:ident, $id:expr, $value:expr)),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut t = Attributes::new();
        $( make_template!(@add t, $kind, $id, $value); )*
        t
    }};
    (@add $t:ident, u32, $id:expr, $value:expr) => {
        $t.add_u32($id, $value)
    };
    (@add $t:ident, bool, $id:expr, $value:expr) => {
        $t.add_bool($id, $value)
    };
    (@add $t:ident, bytes, $id:expr, $value:expr) => {
        $t.add($id, $value)
    };
}

macro_rules! ret_or_panic {
    ($ret:expr) => {
        match $ret {
            Ok(r) => r,
            Err(e) => panic!("{e}"),
        }
    };
}

pub const P256_PARAMS: &[u8] =
    &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
pub const P384_PARAMS: &[u8] = &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x22];
pub const P521_PARAMS: &[u8] = &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x23];
pub const SECP112R1_PARAMS: &[u8] =
    &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x06];

pub fn le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

/// Serializes a mechanism reference
pub fn mechanism(id: CK_MECHANISM_TYPE, params: &[u8]) -> Vec<u8> {
    let mut s = Serializer::new();
    s.put_u32(id).put_u32(params.len() as u32).put(params);
    s.finish()
}

/// Serializes a list of u32 followed by raw bytes
pub fn ctrl(values: &[u32], tail: &[u8]) -> Vec<u8> {
    let mut s = Serializer::new();
    for v in values {
        s.put_u32(*v);
    }
    s.put(tail);
    s.finish()
}

pub fn gcm_params(iv: &[u8], aad: &[u8], tag_bits: u32) -> Vec<u8> {
    let mut s = Serializer::new();
    s.put_u32(iv.len() as u32)
        .put(iv)
        .put_u32(aad.len() as u32)
        .put(aad)
        .put_u32(tag_bits);
    s.finish()
}

pub fn ecdh_params(kdf: CK_ULONG, shared: &[u8], public: &[u8]) -> Vec<u8> {
    let mut s = Serializer::new();
    s.put_u32(kdf)
        .put_u32(shared.len() as u32)
        .put(shared)
        .put_u32(public.len() as u32)
        .put(public);
    s.finish()
}

pub fn aes_template(len: u32) -> Attributes {
    make_template!(
        (u32, CKA_CLASS, CKO_SECRET_KEY),
        (u32, CKA_KEY_TYPE, CKK_AES),
        (u32, CKA_VALUE_LEN, len),
        (bool, CKA_ENCRYPT, true),
        (bool, CKA_DECRYPT, true),
    )
}

pub fn data_template(label: &[u8], value: &[u8]) -> Attributes {
    make_template!(
        (u32, CKA_CLASS, CKO_DATA),
        (bytes, CKA_LABEL, label),
        (bytes, CKA_VALUE, value),
    )
}

pub fn ec_templates(params: &[u8]) -> (Attributes, Attributes) {
    let public = make_template!(
        (bytes, CKA_EC_PARAMS, params),
        (bool, CKA_VERIFY, true),
    );
    let private = make_template!(
        (bool, CKA_SIGN, true),
        (bool, CKA_DERIVE, true),
        (bool, CKA_SENSITIVE, true),
    );
    (public, private)
}

pub fn rsa_templates(bits: u32) -> (Attributes, Attributes) {
    let public = make_template!(
        (u32, CKA_MODULUS_BITS, bits),
        (bool, CKA_VERIFY, true),
        (bool, CKA_ENCRYPT, true),
    );
    let private = make_template!(
        (bool, CKA_SIGN, true),
        (bool, CKA_DECRYPT, true),
        (bool, CKA_SENSITIVE, true),
    );
    (public, private)
}
