// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! AES ciphers and authenticated modes, MACs, secret key generation and
//! AES based key derivation.

use std::fmt::Debug;

use crate::attribute::Attributes;
use crate::error::Result;
use crate::get_random_data;
use crate::helpers::*;
use crate::pkcs11::vendor::*;
use crate::pkcs11::*;
use crate::serializer::{MechanismParams, SerialArgs};

use super::MechOperation;

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::{U12, U13, U16};
use aes_gcm::aead::{AeadInPlace, KeyInit, Nonce, Tag};
use aes_gcm::AesGcm;
use ccm::Ccm;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt};
use cmac::Cmac;
use hmac::{Hmac, Mac};
use zeroize::Zeroizing;

const AES_BLOCK_SIZE: usize = 16;
const GCM_IV_SIZE: usize = 12;
const AEAD_TAG_SIZE: usize = 16;

/// AES key lengths, in bytes
pub(crate) fn check_aes_key_len(len: usize) -> Result<()> {
    match len {
        16 | 24 | 32 => Ok(()),
        _ => {
            error!("Invalid AES key length {}", len);
            Err(CKR_KEY_SIZE_RANGE)?
        }
    }
}

fn param_invalid(_: crate::error::Error) -> crate::error::Error {
    to_rv!(CKR_MECHANISM_PARAM_INVALID)
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    dst.iter_mut().zip(src.iter()).for_each(|(d, s)| *d ^= *s);
}

#[derive(Clone)]
enum AesKey {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesKey {
    fn new(raw: &[u8]) -> Result<AesKey> {
        check_aes_key_len(raw.len())?;
        let key = match raw.len() {
            16 => Aes128::new_from_slice(raw).map(AesKey::Aes128),
            24 => Aes192::new_from_slice(raw).map(AesKey::Aes192),
            _ => Aes256::new_from_slice(raw).map(AesKey::Aes256),
        };
        key.map_err(|_| to_rv!(CKR_KEY_SIZE_RANGE))
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesKey::Aes128(k) => k.encrypt_block(block),
            AesKey::Aes192(k) => k.encrypt_block(block),
            AesKey::Aes256(k) => k.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesKey::Aes128(k) => k.decrypt_block(block),
            AesKey::Aes192(k) => k.decrypt_block(block),
            AesKey::Aes256(k) => k.decrypt_block(block),
        }
    }

    /// Encrypts whole blocks in ECB mode, or CBC mode when a chaining
    /// value is provided
    fn encrypt_blocks(&self, chain: Option<&mut [u8; 16]>, data: &mut [u8]) {
        match chain {
            Some(chain) => {
                for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
                    xor_into(block, chain);
                    self.encrypt_block(block);
                    chain.copy_from_slice(block);
                }
            }
            None => {
                for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
                    self.encrypt_block(block);
                }
            }
        }
    }

    fn decrypt_blocks(&self, chain: Option<&mut [u8; 16]>, data: &mut [u8]) {
        match chain {
            Some(chain) => {
                for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
                    let mut next = [0u8; AES_BLOCK_SIZE];
                    next.copy_from_slice(block);
                    self.decrypt_block(block);
                    xor_into(block, chain);
                    *chain = next;
                }
            }
            None => {
                for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
                    self.decrypt_block(block);
                }
            }
        }
    }
}

/// AES in the ECB, CBC, CBC with padding, CTS and CTR modes
#[derive(Clone)]
pub(crate) struct CipherOperation {
    mechanism: CK_MECHANISM_TYPE,
    encrypt: bool,
    key: AesKey,
    /// Chaining value, or counter block in CTR mode
    iv: [u8; 16],
    ctr_bits: u32,
    buffer: Zeroizing<Vec<u8>>,
    keystream: Zeroizing<Vec<u8>>,
}

impl Debug for CipherOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherOperation")
            .field("mechanism", &mechanism_name(self.mechanism))
            .field("encrypt", &self.encrypt)
            .finish()
    }
}

impl CipherOperation {
    pub fn new(
        function: ProcessingFunc,
        mechanism: &MechanismParams,
        key: &[u8],
    ) -> Result<CipherOperation> {
        let encrypt = match function {
            ProcessingFunc::Encrypt => true,
            ProcessingFunc::Decrypt => false,
            _ => return Err(CKR_MECHANISM_INVALID)?,
        };
        let mut iv = [0u8; AES_BLOCK_SIZE];
        let mut ctr_bits = 0;
        let mut args = SerialArgs::new(&mechanism.params);
        match mechanism.id {
            CKM_AES_ECB => (),
            CKM_AES_CBC | CKM_AES_CBC_PAD | CKM_AES_CTS => {
                args.get(&mut iv).map_err(param_invalid)?;
            }
            CKM_AES_CTR => {
                ctr_bits = args.get_u32().map_err(param_invalid)?;
                args.get(&mut iv).map_err(param_invalid)?;
                if ctr_bits == 0 || ctr_bits > 128 {
                    error!("Invalid counter size {}", ctr_bits);
                    return Err(CKR_MECHANISM_PARAM_INVALID)?;
                }
            }
            _ => return Err(CKR_MECHANISM_INVALID)?,
        }
        args.check_consumed().map_err(param_invalid)?;

        Ok(CipherOperation {
            mechanism: mechanism.id,
            encrypt: encrypt,
            key: AesKey::new(key)?,
            iv: iv,
            ctr_bits: ctr_bits,
            buffer: Zeroizing::new(Vec::new()),
            keystream: Zeroizing::new(Vec::new()),
        })
    }

    fn len_error(&self) -> crate::error::Error {
        if self.encrypt {
            to_rv!(SKS_CKR_DATA_LEN_RANGE)
        } else {
            to_rv!(SKS_CKR_ENCRYPTED_DATA_LEN_RANGE)
        }
    }

    /// Processes whole blocks in the ECB or CBC mode
    fn crypt_blocks(&mut self, data: &mut [u8]) {
        let chain = match self.mechanism {
            CKM_AES_ECB => None,
            _ => Some(&mut self.iv),
        };
        if self.encrypt {
            self.key.encrypt_blocks(chain, data);
        } else {
            self.key.decrypt_blocks(chain, data);
        }
    }

    /// Takes the `len` first buffered bytes and processes them
    fn process_buffered(&mut self, len: usize) -> Vec<u8> {
        let mut out: Vec<u8> = self.buffer.drain(..len).collect();
        self.crypt_blocks(&mut out);
        out
    }

    fn next_counter(&mut self) {
        let mask = match self.ctr_bits {
            128 => u128::MAX,
            bits => (1u128 << bits) - 1,
        };
        let value = u128::from_be_bytes(self.iv);
        let next = (value & !mask) | (value.wrapping_add(1) & mask);
        self.iv = next.to_be_bytes();
    }

    fn ctr_update(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        for byte in out.iter_mut() {
            if self.keystream.is_empty() {
                let mut block = self.iv;
                self.key.encrypt_block(&mut block);
                self.keystream.extend_from_slice(&block);
                self.next_counter();
            }
            *byte ^= self.keystream.remove(0);
        }
        out
    }

    /// Ciphertext stealing, CS3 variant: the last two blocks are always
    /// swapped.
    fn cts_final(&mut self) -> Result<Vec<u8>> {
        let total = self.buffer.len();
        if total < AES_BLOCK_SIZE {
            return Err(self.len_error());
        }
        if total == AES_BLOCK_SIZE {
            return Ok(self.process_buffered(total));
        }
        let tail = total - AES_BLOCK_SIZE;
        let mut out = vec![0u8; total];
        if self.encrypt {
            let mut last = [0u8; AES_BLOCK_SIZE];
            last.copy_from_slice(&self.buffer[..AES_BLOCK_SIZE]);
            xor_into(&mut last, &self.iv);
            self.key.encrypt_block(&mut last);
            let mut stolen = [0u8; AES_BLOCK_SIZE];
            stolen[..tail].copy_from_slice(&self.buffer[AES_BLOCK_SIZE..]);
            xor_into(&mut stolen, &last);
            self.key.encrypt_block(&mut stolen);
            out[..AES_BLOCK_SIZE].copy_from_slice(&stolen);
            out[AES_BLOCK_SIZE..].copy_from_slice(&last[..tail]);
        } else {
            let mut inner = [0u8; AES_BLOCK_SIZE];
            inner.copy_from_slice(&self.buffer[..AES_BLOCK_SIZE]);
            self.key.decrypt_block(&mut inner);
            let mut previous = [0u8; AES_BLOCK_SIZE];
            previous[..tail].copy_from_slice(&self.buffer[AES_BLOCK_SIZE..]);
            previous[tail..].copy_from_slice(&inner[tail..]);
            let mut plain_tail = inner;
            xor_into(&mut plain_tail[..tail], &previous[..tail]);
            let mut plain = previous;
            self.key.decrypt_block(&mut plain);
            xor_into(&mut plain, &self.iv);
            out[..AES_BLOCK_SIZE].copy_from_slice(&plain);
            out[AES_BLOCK_SIZE..].copy_from_slice(&plain_tail[..tail]);
        }
        self.buffer.clear();
        Ok(out)
    }
}

impl MechOperation for CipherOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.mechanism == CKM_AES_CTR {
            return Ok(self.ctr_update(data));
        }
        self.buffer.extend_from_slice(data);
        let len = self.buffer.len();
        let ready = match self.mechanism {
            CKM_AES_CBC_PAD if !self.encrypt && len > 0 => {
                (len - 1) / AES_BLOCK_SIZE * AES_BLOCK_SIZE
            }
            CKM_AES_CTS if len > 2 * AES_BLOCK_SIZE => {
                (len - AES_BLOCK_SIZE - 1) / AES_BLOCK_SIZE * AES_BLOCK_SIZE
            }
            CKM_AES_CTS => 0,
            _ => len / AES_BLOCK_SIZE * AES_BLOCK_SIZE,
        };
        Ok(self.process_buffered(ready))
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        match self.mechanism {
            CKM_AES_CTR => Ok(Vec::new()),
            CKM_AES_CTS => self.cts_final(),
            CKM_AES_CBC_PAD if self.encrypt => {
                let pad = AES_BLOCK_SIZE - self.buffer.len();
                self.buffer.resize(AES_BLOCK_SIZE, pad as u8);
                Ok(self.process_buffered(AES_BLOCK_SIZE))
            }
            CKM_AES_CBC_PAD => {
                if self.buffer.len() != AES_BLOCK_SIZE {
                    return Err(self.len_error());
                }
                let mut out = self.process_buffered(AES_BLOCK_SIZE);
                let pad = out[AES_BLOCK_SIZE - 1] as usize;
                if pad == 0
                    || pad > AES_BLOCK_SIZE
                    || out[AES_BLOCK_SIZE - pad..].iter().any(|b| *b as usize != pad)
                {
                    error!("Invalid padding");
                    return Err(self.len_error());
                }
                out.truncate(AES_BLOCK_SIZE - pad);
                Ok(out)
            }
            _ => {
                if !self.buffer.is_empty() {
                    error!("{} bytes left over", self.buffer.len());
                    return Err(self.len_error());
                }
                Ok(Vec::new())
            }
        }
    }
}

/// Seals or opens data with an AEAD cipher. The tag is appended to, or
/// taken from, the end of the data.
fn aead_crypt<A: AeadInPlace + KeyInit>(
    encrypt: bool,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    data: &mut Vec<u8>,
) -> Result<()> {
    let cipher =
        A::new_from_slice(key).map_err(|_| to_rv!(CKR_KEY_SIZE_RANGE))?;
    let nonce = Nonce::<A>::from_slice(nonce);
    if encrypt {
        let tag = cipher
            .encrypt_in_place_detached(nonce, aad, data.as_mut_slice())
            .map_err(|_| to_rv!(CKR_FUNCTION_FAILED))?;
        data.extend_from_slice(&tag);
    } else {
        if data.len() < AEAD_TAG_SIZE {
            return Err(SKS_CKR_ENCRYPTED_DATA_LEN_RANGE)?;
        }
        let tag_offset = data.len() - AEAD_TAG_SIZE;
        let tag = Tag::<A>::clone_from_slice(&data[tag_offset..]);
        data.truncate(tag_offset);
        if cipher
            .decrypt_in_place_detached(nonce, aad, data.as_mut_slice(), &tag)
            .is_err()
        {
            error!("Authentication tag mismatch");
            return Err(CKR_SIGNATURE_INVALID)?;
        }
    }
    Ok(())
}

fn gcm_crypt(
    encrypt: bool,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    data: &mut Vec<u8>,
) -> Result<()> {
    match key.len() {
        16 => aead_crypt::<AesGcm<Aes128, U12>>(encrypt, key, nonce, aad, data),
        24 => aead_crypt::<AesGcm<Aes192, U12>>(encrypt, key, nonce, aad, data),
        32 => aead_crypt::<AesGcm<Aes256, U12>>(encrypt, key, nonce, aad, data),
        _ => Err(CKR_KEY_SIZE_RANGE)?,
    }
}

fn ccm_crypt(
    encrypt: bool,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    data: &mut Vec<u8>,
) -> Result<()> {
    match (key.len(), nonce.len()) {
        (16, 12) => {
            aead_crypt::<Ccm<Aes128, U16, U12>>(encrypt, key, nonce, aad, data)
        }
        (16, 13) => {
            aead_crypt::<Ccm<Aes128, U16, U13>>(encrypt, key, nonce, aad, data)
        }
        (24, 12) => {
            aead_crypt::<Ccm<Aes192, U16, U12>>(encrypt, key, nonce, aad, data)
        }
        (24, 13) => {
            aead_crypt::<Ccm<Aes192, U16, U13>>(encrypt, key, nonce, aad, data)
        }
        (32, 12) => {
            aead_crypt::<Ccm<Aes256, U16, U12>>(encrypt, key, nonce, aad, data)
        }
        (32, 13) => {
            aead_crypt::<Ccm<Aes256, U16, U13>>(encrypt, key, nonce, aad, data)
        }
        (16 | 24 | 32, _) => Err(CKR_MECHANISM_PARAM_INVALID)?,
        _ => Err(CKR_KEY_SIZE_RANGE)?,
    }
}

/// AES GCM and CCM. Data is collected until the final step, which
/// returns the whole ciphertext and tag, or the plaintext once the tag
/// is verified.
#[derive(Clone)]
pub(crate) struct AeadOperation {
    mechanism: CK_MECHANISM_TYPE,
    encrypt: bool,
    key: Zeroizing<Vec<u8>>,
    nonce: Vec<u8>,
    aad: Vec<u8>,
    data_len: Option<usize>,
    data: Zeroizing<Vec<u8>>,
}

impl Debug for AeadOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadOperation")
            .field("mechanism", &mechanism_name(self.mechanism))
            .field("encrypt", &self.encrypt)
            .field("nonce", &hex::encode(&self.nonce))
            .finish()
    }
}

impl AeadOperation {
    pub fn new(
        function: ProcessingFunc,
        mechanism: &MechanismParams,
        key: &[u8],
    ) -> Result<AeadOperation> {
        let encrypt = match function {
            ProcessingFunc::Encrypt => true,
            ProcessingFunc::Decrypt => false,
            _ => return Err(CKR_MECHANISM_INVALID)?,
        };
        check_aes_key_len(key.len())?;

        let mut args = SerialArgs::new(&mechanism.params);
        let (data_len, nonce, aad, tag_len) = match mechanism.id {
            CKM_AES_GCM => {
                let len = args.get_u32().map_err(param_invalid)?;
                let iv = args.alloc_get(len as usize).map_err(param_invalid)?;
                let len = args.get_u32().map_err(param_invalid)?;
                let aad =
                    args.alloc_get(len as usize).map_err(param_invalid)?;
                let tag_bits = args.get_u32().map_err(param_invalid)?;
                if iv.len() != GCM_IV_SIZE {
                    error!("Unsupported GCM IV length {}", iv.len());
                    return Err(CKR_MECHANISM_PARAM_INVALID)?;
                }
                (None, iv, aad, tag_bits as usize / 8)
            }
            CKM_AES_CCM => {
                let data_len = args.get_u32().map_err(param_invalid)?;
                let len = args.get_u32().map_err(param_invalid)?;
                let nonce =
                    args.alloc_get(len as usize).map_err(param_invalid)?;
                let len = args.get_u32().map_err(param_invalid)?;
                let aad =
                    args.alloc_get(len as usize).map_err(param_invalid)?;
                let mac_len = args.get_u32().map_err(param_invalid)?;
                if nonce.len() != 12 && nonce.len() != 13 {
                    error!("Unsupported CCM nonce length {}", nonce.len());
                    return Err(CKR_MECHANISM_PARAM_INVALID)?;
                }
                (Some(data_len as usize), nonce, aad, mac_len as usize)
            }
            _ => return Err(CKR_MECHANISM_INVALID)?,
        };
        args.check_consumed().map_err(param_invalid)?;
        if tag_len != AEAD_TAG_SIZE {
            error!("Unsupported tag length {}", tag_len);
            return Err(CKR_MECHANISM_PARAM_INVALID)?;
        }

        Ok(AeadOperation {
            mechanism: mechanism.id,
            encrypt: encrypt,
            key: Zeroizing::new(key.to_vec()),
            nonce: nonce,
            aad: aad,
            data_len: data_len,
            data: Zeroizing::new(Vec::new()),
        })
    }
}

impl MechOperation for AeadOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.data.extend_from_slice(data);
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        if let Some(expected) = self.data_len {
            let len = match self.encrypt {
                true => self.data.len(),
                false => self.data.len().saturating_sub(AEAD_TAG_SIZE),
            };
            if len != expected {
                error!("CCM data length {} instead of {}", len, expected);
                return Err(if self.encrypt {
                    SKS_CKR_DATA_LEN_RANGE
                } else {
                    SKS_CKR_ENCRYPTED_DATA_LEN_RANGE
                })?;
            }
        }
        let mut data = self.data.to_vec();
        let ret = match self.mechanism {
            CKM_AES_GCM => gcm_crypt(
                self.encrypt,
                &self.key,
                &self.nonce,
                &self.aad,
                &mut data,
            ),
            _ => ccm_crypt(
                self.encrypt,
                &self.key,
                &self.nonce,
                &self.aad,
                &mut data,
            ),
        };
        self.data.clear();
        ret.map(|_| data)
    }
}

#[derive(Clone)]
enum HmacState {
    Md5(Hmac<md5::Md5>),
    Sha1(Hmac<sha1::Sha1>),
    Sha224(Hmac<sha2::Sha224>),
    Sha256(Hmac<sha2::Sha256>),
    Sha384(Hmac<sha2::Sha384>),
    Sha512(Hmac<sha2::Sha512>),
}

macro_rules! hmac_new {
    ($variant:ident, $hash:ty, $key:expr) => {
        <Hmac<$hash> as Mac>::new_from_slice($key)
            .map(HmacState::$variant)
            .map_err(|_| to_rv!(CKR_KEY_SIZE_RANGE))
    };
}

impl HmacState {
    fn new(mechanism: CK_MECHANISM_TYPE, key: &[u8]) -> Result<HmacState> {
        match mechanism {
            CKM_MD5_HMAC => hmac_new!(Md5, md5::Md5, key),
            CKM_SHA_1_HMAC => hmac_new!(Sha1, sha1::Sha1, key),
            CKM_SHA224_HMAC => hmac_new!(Sha224, sha2::Sha224, key),
            CKM_SHA256_HMAC => hmac_new!(Sha256, sha2::Sha256, key),
            CKM_SHA384_HMAC => hmac_new!(Sha384, sha2::Sha384, key),
            CKM_SHA512_HMAC => hmac_new!(Sha512, sha2::Sha512, key),
            _ => Err(CKR_MECHANISM_INVALID)?,
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            HmacState::Md5(m) => m.update(data),
            HmacState::Sha1(m) => m.update(data),
            HmacState::Sha224(m) => m.update(data),
            HmacState::Sha256(m) => m.update(data),
            HmacState::Sha384(m) => m.update(data),
            HmacState::Sha512(m) => m.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            HmacState::Md5(m) => m.finalize().into_bytes().to_vec(),
            HmacState::Sha1(m) => m.finalize().into_bytes().to_vec(),
            HmacState::Sha224(m) => m.finalize().into_bytes().to_vec(),
            HmacState::Sha256(m) => m.finalize().into_bytes().to_vec(),
            HmacState::Sha384(m) => m.finalize().into_bytes().to_vec(),
            HmacState::Sha512(m) => m.finalize().into_bytes().to_vec(),
        }
    }
}

#[derive(Clone)]
enum CmacState {
    Aes128(Cmac<Aes128>),
    Aes192(Cmac<Aes192>),
    Aes256(Cmac<Aes256>),
}

impl CmacState {
    fn new(key: &[u8]) -> Result<CmacState> {
        check_aes_key_len(key.len())?;
        let state = match key.len() {
            16 => <Cmac<Aes128> as Mac>::new_from_slice(key)
                .map(CmacState::Aes128),
            24 => <Cmac<Aes192> as Mac>::new_from_slice(key)
                .map(CmacState::Aes192),
            _ => <Cmac<Aes256> as Mac>::new_from_slice(key)
                .map(CmacState::Aes256),
        };
        state.map_err(|_| to_rv!(CKR_KEY_SIZE_RANGE))
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            CmacState::Aes128(m) => m.update(data),
            CmacState::Aes192(m) => m.update(data),
            CmacState::Aes256(m) => m.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            CmacState::Aes128(m) => m.finalize().into_bytes().to_vec(),
            CmacState::Aes192(m) => m.finalize().into_bytes().to_vec(),
            CmacState::Aes256(m) => m.finalize().into_bytes().to_vec(),
        }
    }
}

/// AES-XCBC-MAC (RFC 3566)
#[derive(Clone)]
struct XcbcState {
    k1: AesKey,
    k2: [u8; 16],
    k3: [u8; 16],
    chain: [u8; 16],
    buffer: Vec<u8>,
}

impl XcbcState {
    fn new(key: &[u8]) -> Result<XcbcState> {
        if key.len() != 16 {
            error!("XCBC-MAC requires a 128 bit key");
            return Err(CKR_KEY_SIZE_RANGE)?;
        }
        let key = AesKey::new(key)?;
        let mut k1 = [0x01u8; 16];
        let mut k2 = [0x02u8; 16];
        let mut k3 = [0x03u8; 16];
        key.encrypt_block(&mut k1);
        key.encrypt_block(&mut k2);
        key.encrypt_block(&mut k3);
        Ok(XcbcState {
            k1: AesKey::new(&k1)?,
            k2: k2,
            k3: k3,
            chain: [0u8; 16],
            buffer: Vec::new(),
        })
    }

    fn update(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        /* the last block, even complete, is processed at final */
        while self.buffer.len() > AES_BLOCK_SIZE {
            let block: Vec<u8> = self.buffer.drain(..AES_BLOCK_SIZE).collect();
            xor_into(&mut self.chain, &block);
            self.k1.encrypt_block(&mut self.chain);
        }
    }

    fn finalize(mut self) -> Vec<u8> {
        let mut last = [0u8; AES_BLOCK_SIZE];
        let len = self.buffer.len();
        last[..len].copy_from_slice(&self.buffer);
        if len == AES_BLOCK_SIZE {
            xor_into(&mut last, &self.k2);
        } else {
            last[len] = 0x80;
            xor_into(&mut last, &self.k3);
        }
        xor_into(&mut self.chain, &last);
        self.k1.encrypt_block(&mut self.chain);
        self.chain.to_vec()
    }
}

#[derive(Clone)]
enum MacState {
    Hmac(HmacState),
    Cmac(CmacState),
    Xcbc(XcbcState),
    Gmac {
        key: Zeroizing<Vec<u8>>,
        iv: [u8; 12],
        aad: Vec<u8>,
    },
}

/// Message authentication codes, used to sign and verify
#[derive(Clone)]
pub(crate) struct MacOperation {
    mechanism: CK_MECHANISM_TYPE,
    state: Option<MacState>,
    output_len: usize,
}

impl Debug for MacOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacOperation")
            .field("mechanism", &mechanism_name(self.mechanism))
            .field("output_len", &self.output_len)
            .finish()
    }
}

impl MacOperation {
    pub fn new(
        mechanism: &MechanismParams,
        key: &[u8],
    ) -> Result<MacOperation> {
        let mut args = SerialArgs::new(&mechanism.params);
        let (state, output_len) = match mechanism.id {
            CKM_AES_CMAC => (MacState::Cmac(CmacState::new(key)?), 16),
            CKM_AES_CMAC_GENERAL => {
                let len = args.get_u32().map_err(param_invalid)? as usize;
                if len == 0 || len > AES_BLOCK_SIZE {
                    return Err(CKR_MECHANISM_PARAM_INVALID)?;
                }
                (MacState::Cmac(CmacState::new(key)?), len)
            }
            CKM_AES_XCBC_MAC => (MacState::Xcbc(XcbcState::new(key)?), 16),
            CKM_AES_GMAC => {
                check_aes_key_len(key.len())?;
                let mut iv = [0u8; GCM_IV_SIZE];
                args.get(&mut iv).map_err(param_invalid)?;
                let state = MacState::Gmac {
                    key: Zeroizing::new(key.to_vec()),
                    iv: iv,
                    aad: Vec::new(),
                };
                (state, AEAD_TAG_SIZE)
            }
            id => {
                let state = HmacState::new(id, key)?;
                let len = match &state {
                    HmacState::Md5(_) => 16,
                    HmacState::Sha1(_) => 20,
                    HmacState::Sha224(_) => 28,
                    HmacState::Sha256(_) => 32,
                    HmacState::Sha384(_) => 48,
                    HmacState::Sha512(_) => 64,
                };
                (MacState::Hmac(state), len)
            }
        };
        args.check_consumed().map_err(param_invalid)?;
        Ok(MacOperation {
            mechanism: mechanism.id,
            state: Some(state),
            output_len: output_len,
        })
    }
}

impl MechOperation for MacOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match &mut self.state {
            Some(MacState::Hmac(s)) => s.update(data),
            Some(MacState::Cmac(s)) => s.update(data),
            Some(MacState::Xcbc(s)) => s.update(data),
            Some(MacState::Gmac { aad, .. }) => aad.extend_from_slice(data),
            None => return Err(CKR_OPERATION_NOT_INITIALIZED)?,
        }
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        let mut mac = match self.state.take() {
            Some(MacState::Hmac(s)) => s.finalize(),
            Some(MacState::Cmac(s)) => s.finalize(),
            Some(MacState::Xcbc(s)) => s.finalize(),
            Some(MacState::Gmac { key, iv, aad }) => {
                let mut tag = Vec::new();
                gcm_crypt(true, &key, &iv, &aad, &mut tag)?;
                tag
            }
            None => return Err(CKR_OPERATION_NOT_INITIALIZED)?,
        };
        mac.truncate(self.output_len);
        Ok(mac)
    }
}

/// Fills the value of a generated secret key with random bytes
pub(crate) fn generate_key(attrs: &mut Attributes) -> Result<()> {
    if attrs.has(CKA_VALUE) {
        error!("Generated key template sets a value");
        return Err(CKR_TEMPLATE_INCONSISTENT)?;
    }
    let key_type = attrs.get_type();
    let len = match attrs.get_u32(CKA_VALUE_LEN) {
        Ok(l) => l,
        Err(_) => return Err(CKR_TEMPLATE_INCOMPLETE)?,
    };
    let size = secret_value_bytes(key_type, len);
    if key_type == CKK_AES {
        check_aes_key_len(size)?;
    }
    let mut value = Zeroizing::new(vec![0u8; size]);
    get_random_data(&mut value)?;
    attrs.add(CKA_VALUE, &value);
    Ok(())
}

/// Derives a secret by encrypting the mechanism data with the parent
/// key, in the ECB or CBC mode
pub(crate) fn encrypt_data_derive(
    mechanism: &MechanismParams,
    key: &[u8],
) -> Result<Vec<u8>> {
    let aes = AesKey::new(key)?;
    let mut args = SerialArgs::new(&mechanism.params);
    let mut iv = [0u8; AES_BLOCK_SIZE];
    if mechanism.id == CKM_AES_CBC_ENCRYPT_DATA {
        args.get(&mut iv).map_err(param_invalid)?;
    }
    let len = args.get_u32().map_err(param_invalid)? as usize;
    let mut data = args.alloc_get(len).map_err(param_invalid)?;
    args.check_consumed().map_err(param_invalid)?;
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        error!("Derivation data is not a multiple of the block size");
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    }
    match mechanism.id {
        CKM_AES_ECB_ENCRYPT_DATA => aes.encrypt_blocks(None, &mut data),
        CKM_AES_CBC_ENCRYPT_DATA => aes.encrypt_blocks(Some(&mut iv), &mut data),
        _ => return Err(CKR_MECHANISM_INVALID)?,
    }
    Ok(data)
}
