// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! RSA and elliptic curve keys: signatures, encryption, key pair
//! generation and ECDH key derivation.

use std::fmt::Debug;

use crate::attribute::Attributes;
use crate::error::{Error, Result};
use crate::helpers::*;
use crate::pkcs11::vendor::*;
use crate::pkcs11::*;
use crate::serializer::{MechanismParams, SerialArgs};

use super::{hash_size, HashState, MechOperation};

use constant_time_eq::constant_time_eq;
use num_bigint::BigUint;
use num_traits::One;
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::elliptic_curve::sec1::ToEncodedPoint;

const P256_OID: asn1::ObjectIdentifier = asn1::oid!(1, 2, 840, 10045, 3, 1, 7);
const P384_OID: asn1::ObjectIdentifier = asn1::oid!(1, 3, 132, 0, 34);

const DEFAULT_PUBLIC_EXPONENT: u32 = 65537;

fn param_invalid(_: Error) -> Error {
    to_rv!(CKR_MECHANISM_PARAM_INVALID)
}

fn incomplete(_: Error) -> Error {
    to_rv!(CKR_TEMPLATE_INCOMPLETE)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Curve {
    P256,
    P384,
}

impl Curve {
    fn from_params(params: &[u8]) -> Result<Curve> {
        let oid = match asn1::parse_single::<asn1::ObjectIdentifier>(params) {
            Ok(o) => o,
            Err(_) => return Err(CKR_DOMAIN_PARAMS_INVALID)?,
        };
        if oid == P256_OID {
            Ok(Curve::P256)
        } else if oid == P384_OID {
            Ok(Curve::P384)
        } else {
            error!("Unsupported curve {:?}", oid);
            Err(CKR_CURVE_NOT_SUPPORTED)?
        }
    }

    fn field_size(self) -> usize {
        match self {
            Curve::P256 => 32,
            Curve::P384 => 48,
        }
    }
}

#[derive(Clone)]
pub(crate) enum EcPublic {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
}

#[derive(Clone)]
pub(crate) enum EcPrivate {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
}

impl EcPrivate {
    fn public(&self) -> EcPublic {
        match self {
            EcPrivate::P256(k) => EcPublic::P256(k.public_key()),
            EcPrivate::P384(k) => EcPublic::P384(k.public_key()),
        }
    }
}

/// Normalizes an encoded EC point to the uncompressed SEC1 form. Raw
/// coordinates and DER OCTET STRING wrapping are accepted.
fn sec1_point(encoded: &[u8], curve: Curve) -> Option<Vec<u8>> {
    let field = curve.field_size();
    if encoded.len() == 2 * field {
        let mut point = vec![0x04];
        point.extend_from_slice(encoded);
        return Some(point);
    }
    if encoded.len() == 2 * field + 1 && encoded[0] == 0x04 {
        return Some(encoded.to_vec());
    }
    match asn1::parse_single::<&[u8]>(encoded) {
        Ok(inner) if inner.len() == 2 * field + 1 && inner[0] == 0x04 => {
            Some(inner.to_vec())
        }
        _ => None,
    }
}

fn ec_public_from_point(point: &[u8], curve: Curve) -> Result<EcPublic> {
    let sec1 = match sec1_point(point, curve) {
        Some(p) => p,
        None => return Err(CKR_ATTRIBUTE_VALUE_INVALID)?,
    };
    let key = match curve {
        Curve::P256 => {
            p256::PublicKey::from_sec1_bytes(&sec1).map(EcPublic::P256)
        }
        Curve::P384 => {
            p384::PublicKey::from_sec1_bytes(&sec1).map(EcPublic::P384)
        }
    };
    key.map_err(|_| to_rv!(CKR_ATTRIBUTE_VALUE_INVALID))
}

/// The key material of an object in the form the crypto code consumes
#[derive(Clone)]
pub(crate) enum BackendKey {
    Secret(Zeroizing<Vec<u8>>),
    RsaPublic(RsaPublicKey),
    RsaPrivate(Box<RsaPrivateKey>),
    EcPublic(EcPublic),
    EcPrivate(EcPrivate),
}

impl Debug for BackendKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            BackendKey::Secret(s) => return write!(f, "Secret({})", s.len()),
            BackendKey::RsaPublic(_) => "RsaPublic",
            BackendKey::RsaPrivate(_) => "RsaPrivate",
            BackendKey::EcPublic(_) => "EcPublic",
            BackendKey::EcPrivate(_) => "EcPrivate",
        };
        write!(f, "{}", kind)
    }
}

fn rsa_uint(attrs: &Attributes, id: CK_ATTRIBUTE_TYPE) -> Result<rsa::BigUint> {
    let value = attrs.get_ptr(id).map_err(incomplete)?;
    Ok(rsa::BigUint::from_bytes_be(value))
}

fn to_uint(value: &rsa::BigUint) -> BigUint {
    BigUint::from_bytes_be(&value.to_bytes_be())
}

impl BackendKey {
    pub fn from_attributes(attrs: &Attributes) -> Result<BackendKey> {
        match (attrs.get_class(), attrs.get_type()) {
            (CKO_SECRET_KEY, _) => {
                let value = attrs.get_ptr(CKA_VALUE).map_err(incomplete)?;
                Ok(BackendKey::Secret(Zeroizing::new(value.to_vec())))
            }
            (CKO_PUBLIC_KEY, CKK_RSA) => {
                let n = rsa_uint(attrs, CKA_MODULUS)?;
                let e = rsa_uint(attrs, CKA_PUBLIC_EXPONENT)?;
                match RsaPublicKey::new(n, e) {
                    Ok(k) => Ok(BackendKey::RsaPublic(k)),
                    Err(_) => Err(CKR_ATTRIBUTE_VALUE_INVALID)?,
                }
            }
            (CKO_PRIVATE_KEY, CKK_RSA) => {
                let n = rsa_uint(attrs, CKA_MODULUS)?;
                let e = rsa_uint(attrs, CKA_PUBLIC_EXPONENT)?;
                let d = rsa_uint(attrs, CKA_PRIVATE_EXPONENT)?;
                let primes = vec![
                    rsa_uint(attrs, CKA_PRIME_1)?,
                    rsa_uint(attrs, CKA_PRIME_2)?,
                ];
                match RsaPrivateKey::from_components(n, e, d, primes) {
                    Ok(k) => Ok(BackendKey::RsaPrivate(Box::new(k))),
                    Err(_) => Err(CKR_ATTRIBUTE_VALUE_INVALID)?,
                }
            }
            (CKO_PUBLIC_KEY, CKK_EC) => {
                let params =
                    attrs.get_ptr(CKA_EC_PARAMS).map_err(incomplete)?;
                let curve = Curve::from_params(params)?;
                let point = match attrs.get_ptr(CKA_EC_POINT) {
                    Ok(p) => p.to_vec(),
                    Err(_) => {
                        let x = attrs
                            .get_ptr(CKA_EC_POINT_X)
                            .map_err(incomplete)?;
                        let y = attrs
                            .get_ptr(CKA_EC_POINT_Y)
                            .map_err(incomplete)?;
                        [x, y].concat()
                    }
                };
                Ok(BackendKey::EcPublic(ec_public_from_point(&point, curve)?))
            }
            (CKO_PRIVATE_KEY, CKK_EC) => {
                let params =
                    attrs.get_ptr(CKA_EC_PARAMS).map_err(incomplete)?;
                let value = attrs.get_ptr(CKA_VALUE).map_err(incomplete)?;
                let key = match Curve::from_params(params)? {
                    Curve::P256 => {
                        p256::SecretKey::from_slice(value).map(EcPrivate::P256)
                    }
                    Curve::P384 => {
                        p384::SecretKey::from_slice(value).map(EcPrivate::P384)
                    }
                };
                match key {
                    Ok(k) => Ok(BackendKey::EcPrivate(k)),
                    Err(_) => Err(CKR_ATTRIBUTE_VALUE_INVALID)?,
                }
            }
            (class, key_type) => {
                error!(
                    "No key material for {} {}",
                    class_name(class),
                    key_type_name(key_type)
                );
                Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?
            }
        }
    }

    /// The raw value of a secret key
    pub fn secret(&self) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            BackendKey::Secret(v) => Ok(v.clone()),
            _ => Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?,
        }
    }

    fn rsa_public(&self) -> Result<RsaPublicKey> {
        match self {
            BackendKey::RsaPublic(k) => Ok(k.clone()),
            BackendKey::RsaPrivate(k) => Ok(k.to_public_key()),
            _ => Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?,
        }
    }

    fn rsa_private(&self) -> Result<&RsaPrivateKey> {
        match self {
            BackendKey::RsaPrivate(k) => Ok(k.as_ref()),
            _ => Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?,
        }
    }

    fn ec_public(&self) -> Result<EcPublic> {
        match self {
            BackendKey::EcPublic(k) => Ok(k.clone()),
            BackendKey::EcPrivate(k) => Ok(k.public()),
            _ => Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?,
        }
    }

    fn ec_private(&self) -> Result<&EcPrivate> {
        match self {
            BackendKey::EcPrivate(k) => Ok(k),
            _ => Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?,
        }
    }
}

/// Expands to `$body` with `$d` aliased to the digest of a hash
/// mechanism
macro_rules! with_digest {
    ($hash:expr, $d:ident => $body:expr) => {
        match $hash {
            CKM_SHA_1 => {
                type $d = sha1::Sha1;
                Ok($body)
            }
            CKM_SHA224 => {
                type $d = sha2::Sha224;
                Ok($body)
            }
            CKM_SHA256 => {
                type $d = sha2::Sha256;
                Ok($body)
            }
            CKM_SHA384 => {
                type $d = sha2::Sha384;
                Ok($body)
            }
            CKM_SHA512 => {
                type $d = sha2::Sha512;
                Ok($body)
            }
            _ => Err(to_rv!(CKR_MECHANISM_PARAM_INVALID)),
        }
    };
}

/// Hash computed by the hash-then-sign mechanisms
fn signature_hash(mechanism: CK_MECHANISM_TYPE) -> Option<CK_MECHANISM_TYPE> {
    match mechanism {
        CKM_SHA1_RSA_PKCS | CKM_SHA1_RSA_PKCS_PSS | CKM_ECDSA_SHA1 => {
            Some(CKM_SHA_1)
        }
        CKM_SHA224_RSA_PKCS | CKM_SHA224_RSA_PKCS_PSS | CKM_ECDSA_SHA224 => {
            Some(CKM_SHA224)
        }
        CKM_SHA256_RSA_PKCS | CKM_SHA256_RSA_PKCS_PSS | CKM_ECDSA_SHA256 => {
            Some(CKM_SHA256)
        }
        CKM_SHA384_RSA_PKCS | CKM_SHA384_RSA_PKCS_PSS | CKM_ECDSA_SHA384 => {
            Some(CKM_SHA384)
        }
        CKM_SHA512_RSA_PKCS | CKM_SHA512_RSA_PKCS_PSS | CKM_ECDSA_SHA512 => {
            Some(CKM_SHA512)
        }
        _ => None,
    }
}

fn mgf_hash(mgf: u32) -> Result<CK_MECHANISM_TYPE> {
    Ok(match mgf {
        CKG_MGF1_SHA1 => CKM_SHA_1,
        CKG_MGF1_SHA224 => CKM_SHA224,
        CKG_MGF1_SHA256 => CKM_SHA256,
        CKG_MGF1_SHA384 => CKM_SHA384,
        CKG_MGF1_SHA512 => CKM_SHA512,
        _ => return Err(CKR_MECHANISM_PARAM_INVALID)?,
    })
}

fn rsa_error(e: rsa::Error) -> Error {
    match e {
        rsa::Error::MessageTooLong => to_rv!(SKS_CKR_DATA_LEN_RANGE),
        rsa::Error::Decryption => to_rv!(SKS_CKR_ENCRYPTED_DATA_LEN_RANGE),
        rsa::Error::Verification => to_rv!(CKR_SIGNATURE_INVALID),
        e => {
            error!("RSA operation failed: {}", e);
            to_rv!(CKR_FUNCTION_FAILED)
        }
    }
}

/// Computes `input ^ exp mod n` without padding, the output is left
/// padded to the modulus length
fn rsa_raw(
    n: &rsa::BigUint,
    exp: &rsa::BigUint,
    input: &[u8],
    len_error: CK_RV,
) -> Result<Vec<u8>> {
    let n = to_uint(n);
    let size = ((n.bits() + 7) / 8) as usize;
    let m = BigUint::from_bytes_be(input);
    if input.len() > size || m >= n {
        return Err(len_error)?;
    }
    let out = m.modpow(&to_uint(exp), &n).to_bytes_be();
    let mut padded = vec![0u8; size - out.len()];
    padded.extend_from_slice(&out);
    Ok(padded)
}

/// RSA PKCS#1 v1.5, PSS, OAEP and raw operations
#[derive(Clone)]
pub(crate) struct RsaOperation {
    mechanism: CK_MECHANISM_TYPE,
    function: ProcessingFunc,
    key: BackendKey,
    /// Hash of the padding scheme
    hash: CK_MECHANISM_TYPE,
    salt_len: usize,
    label: Option<String>,
    digest: Option<HashState>,
    data: Zeroizing<Vec<u8>>,
}

impl Debug for RsaOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaOperation")
            .field("mechanism", &mechanism_name(self.mechanism))
            .field("function", &self.function)
            .field("key", &self.key)
            .finish()
    }
}

impl RsaOperation {
    pub fn new(
        function: ProcessingFunc,
        mechanism: &MechanismParams,
        key: BackendKey,
    ) -> Result<RsaOperation> {
        match function {
            ProcessingFunc::Sign | ProcessingFunc::Decrypt => {
                key.rsa_private()?;
            }
            ProcessingFunc::Verify | ProcessingFunc::Encrypt => {
                key.rsa_public()?;
            }
            _ => return Err(CKR_MECHANISM_INVALID)?,
        }

        let digest_hash = signature_hash(mechanism.id);
        let mut hash = digest_hash.unwrap_or(CK_UNAVAILABLE_INFORMATION);
        let mut salt_len = 0;
        let mut label = None;
        let mut args = SerialArgs::new(&mechanism.params);
        match mechanism.id {
            CKM_RSA_PKCS_PSS | CKM_SHA1_RSA_PKCS_PSS
            | CKM_SHA224_RSA_PKCS_PSS | CKM_SHA256_RSA_PKCS_PSS
            | CKM_SHA384_RSA_PKCS_PSS | CKM_SHA512_RSA_PKCS_PSS => {
                let param_hash = args.get_u32().map_err(param_invalid)?;
                let mgf = args.get_u32().map_err(param_invalid)?;
                salt_len = args.get_u32().map_err(param_invalid)? as usize;
                if digest_hash.is_some_and(|h| h != param_hash)
                    || mgf_hash(mgf)? != param_hash
                {
                    error!("PSS hash parameters mismatch");
                    return Err(CKR_MECHANISM_PARAM_INVALID)?;
                }
                hash = param_hash;
            }
            CKM_RSA_PKCS_OAEP => {
                hash = args.get_u32().map_err(param_invalid)?;
                let mgf = args.get_u32().map_err(param_invalid)?;
                let source_type = args.get_u32().map_err(param_invalid)?;
                let len = args.get_u32().map_err(param_invalid)?;
                let source =
                    args.alloc_get(len as usize).map_err(param_invalid)?;
                if mgf_hash(mgf)? != hash {
                    error!("OAEP hash parameters mismatch");
                    return Err(CKR_MECHANISM_PARAM_INVALID)?;
                }
                match source_type {
                    0 if source.is_empty() => (),
                    CKZ_DATA_SPECIFIED => {
                        if !source.is_empty() {
                            match String::from_utf8(source) {
                                Ok(s) => label = Some(s),
                                Err(_) => {
                                    return Err(CKR_MECHANISM_PARAM_INVALID)?
                                }
                            }
                        }
                    }
                    _ => return Err(CKR_MECHANISM_PARAM_INVALID)?,
                }
            }
            _ => (),
        }
        args.check_consumed().map_err(param_invalid)?;
        if hash != CK_UNAVAILABLE_INFORMATION {
            hash_size(hash)?;
        }

        let digest = match digest_hash {
            Some(h) => Some(HashState::new(h)?),
            None => None,
        };
        Ok(RsaOperation {
            mechanism: mechanism.id,
            function: function,
            key: key,
            hash: hash,
            salt_len: salt_len,
            label: label,
            digest: digest,
            data: Zeroizing::new(Vec::new()),
        })
    }

    /// The message digest, or the accumulated data of the mechanisms
    /// that take it verbatim
    fn take_input(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let input = match self.digest.take() {
            Some(d) => Zeroizing::new(d.finalize()),
            None => Zeroizing::new(self.data.to_vec()),
        };
        self.data.clear();
        if self.mechanism == CKM_RSA_PKCS_PSS
            && input.len() != hash_size(self.hash)?
        {
            error!("PSS input is not a {} digest", mechanism_name(self.hash));
            return Err(SKS_CKR_DATA_LEN_RANGE)?;
        }
        Ok(input)
    }

    fn pkcs1v15(&self) -> Result<Pkcs1v15Sign> {
        if self.mechanism == CKM_RSA_PKCS {
            return Ok(Pkcs1v15Sign::new_unprefixed());
        }
        with_digest!(self.hash, D => Pkcs1v15Sign::new::<D>())
    }

    fn pss(&self) -> Result<Pss> {
        with_digest!(self.hash, D => Pss::new_with_salt::<D>(self.salt_len))
    }

    fn oaep(&self) -> Result<Oaep> {
        with_digest!(self.hash, D => match &self.label {
            Some(l) => Oaep::new_with_label::<D, _>(l.clone()),
            None => Oaep::new::<D>(),
        })
    }

    fn is_pss(&self) -> bool {
        matches!(
            self.mechanism,
            CKM_RSA_PKCS_PSS
                | CKM_SHA1_RSA_PKCS_PSS
                | CKM_SHA224_RSA_PKCS_PSS
                | CKM_SHA256_RSA_PKCS_PSS
                | CKM_SHA384_RSA_PKCS_PSS
                | CKM_SHA512_RSA_PKCS_PSS
        )
    }

    fn sign(&mut self) -> Result<Vec<u8>> {
        let input = self.take_input()?;
        let key = self.key.rsa_private()?;
        if self.mechanism == CKM_RSA_X_509 {
            return rsa_raw(key.n(), key.d(), &input, SKS_CKR_DATA_LEN_RANGE);
        }
        let ret = if self.is_pss() {
            key.sign_with_rng(&mut OsRng, self.pss()?, &input)
        } else {
            key.sign_with_rng(&mut OsRng, self.pkcs1v15()?, &input)
        };
        ret.map_err(rsa_error)
    }

    fn encrypt(&mut self) -> Result<Vec<u8>> {
        let input = self.take_input()?;
        let key = self.key.rsa_public()?;
        let ret = match self.mechanism {
            CKM_RSA_X_509 => {
                return rsa_raw(
                    key.n(),
                    key.e(),
                    &input,
                    SKS_CKR_DATA_LEN_RANGE,
                )
            }
            CKM_RSA_PKCS_OAEP => key.encrypt(&mut OsRng, self.oaep()?, &input),
            _ => key.encrypt(&mut OsRng, Pkcs1v15Encrypt, &input),
        };
        ret.map_err(rsa_error)
    }

    fn decrypt(&mut self) -> Result<Vec<u8>> {
        let input = self.take_input()?;
        let key = self.key.rsa_private()?;
        let ret = match self.mechanism {
            CKM_RSA_X_509 => {
                return rsa_raw(
                    key.n(),
                    key.d(),
                    &input,
                    SKS_CKR_ENCRYPTED_DATA_LEN_RANGE,
                )
            }
            CKM_RSA_PKCS_OAEP => {
                key.decrypt_blinded(&mut OsRng, self.oaep()?, &input)
            }
            _ => key.decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, &input),
        };
        ret.map_err(rsa_error)
    }
}

impl MechOperation for RsaOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match &mut self.digest {
            Some(d) => d.update(data),
            None => self.data.extend_from_slice(data),
        }
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        match self.function {
            ProcessingFunc::Sign => self.sign(),
            ProcessingFunc::Encrypt => self.encrypt(),
            ProcessingFunc::Decrypt => self.decrypt(),
            _ => Err(CKR_GENERAL_ERROR)?,
        }
    }

    fn verify_final(&mut self, signature: &[u8]) -> Result<()> {
        let input = self.take_input()?;
        let key = self.key.rsa_public()?;
        let ret = if self.mechanism == CKM_RSA_X_509 {
            let recovered =
                rsa_raw(key.n(), key.e(), signature, CKR_SIGNATURE_INVALID)?;
            let pad = recovered.len().saturating_sub(input.len());
            let mut expected = vec![0u8; pad];
            expected.extend_from_slice(&input);
            if constant_time_eq(&recovered, &expected) {
                Ok(())
            } else {
                Err(rsa::Error::Verification)
            }
        } else if self.is_pss() {
            key.verify(self.pss()?, &input, signature)
        } else {
            key.verify(self.pkcs1v15()?, &input, signature)
        };
        ret.map_err(|_| to_rv!(CKR_SIGNATURE_INVALID))
    }
}

/// ECDSA with raw `r||s` signatures
#[derive(Clone)]
pub(crate) struct EcdsaOperation {
    mechanism: CK_MECHANISM_TYPE,
    function: ProcessingFunc,
    key: BackendKey,
    digest: Option<HashState>,
    data: Vec<u8>,
}

impl Debug for EcdsaOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaOperation")
            .field("mechanism", &mechanism_name(self.mechanism))
            .field("function", &self.function)
            .finish()
    }
}

macro_rules! ecdsa_sign {
    ($curve:ident, $secret:expr, $hashed:expr) => {{
        let signer = $curve::ecdsa::SigningKey::from($secret.clone());
        let signature: $curve::ecdsa::Signature = signer
            .sign_prehash($hashed)
            .map_err(|_| to_rv!(CKR_FUNCTION_FAILED))?;
        signature.to_bytes().to_vec()
    }};
}

macro_rules! ecdsa_verify {
    ($curve:ident, $public:expr, $hashed:expr, $signature:expr) => {{
        let verifier = $curve::ecdsa::VerifyingKey::from($public);
        match $curve::ecdsa::Signature::from_slice($signature) {
            Ok(s) => verifier.verify_prehash($hashed, &s).is_ok(),
            Err(_) => false,
        }
    }};
}

impl EcdsaOperation {
    pub fn new(
        function: ProcessingFunc,
        mechanism: &MechanismParams,
        key: BackendKey,
    ) -> Result<EcdsaOperation> {
        match function {
            ProcessingFunc::Sign => {
                key.ec_private()?;
            }
            ProcessingFunc::Verify => {
                key.ec_public()?;
            }
            _ => return Err(CKR_MECHANISM_INVALID)?,
        }
        if !mechanism.params.is_empty() {
            return Err(CKR_MECHANISM_PARAM_INVALID)?;
        }
        let digest = match signature_hash(mechanism.id) {
            Some(h) => Some(HashState::new(h)?),
            None => None,
        };
        Ok(EcdsaOperation {
            mechanism: mechanism.id,
            function: function,
            key: key,
            digest: digest,
            data: Vec::new(),
        })
    }

    fn take_input(&mut self) -> Vec<u8> {
        match self.digest.take() {
            Some(d) => d.finalize(),
            None => std::mem::take(&mut self.data),
        }
    }
}

impl MechOperation for EcdsaOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match &mut self.digest {
            Some(d) => d.update(data),
            None => self.data.extend_from_slice(data),
        }
        Ok(Vec::new())
    }

    fn finalize(&mut self) -> Result<Vec<u8>> {
        if self.function != ProcessingFunc::Sign {
            return Err(CKR_GENERAL_ERROR)?;
        }
        let hashed = self.take_input();
        Ok(match self.key.ec_private()? {
            EcPrivate::P256(k) => ecdsa_sign!(p256, k, &hashed),
            EcPrivate::P384(k) => ecdsa_sign!(p384, k, &hashed),
        })
    }

    fn verify_final(&mut self, signature: &[u8]) -> Result<()> {
        let hashed = self.take_input();
        let valid = match &self.key.ec_public()? {
            EcPublic::P256(k) => ecdsa_verify!(p256, k, &hashed, signature),
            EcPublic::P384(k) => ecdsa_verify!(p384, k, &hashed, signature),
        };
        if !valid {
            return Err(CKR_SIGNATURE_INVALID)?;
        }
        Ok(())
    }
}

fn generate_rsa(
    pub_attrs: &mut Attributes,
    priv_attrs: &mut Attributes,
) -> Result<()> {
    let bits = pub_attrs.get_u32(CKA_MODULUS_BITS).map_err(incomplete)?;
    if let Some((min, max)) = key_size_range(CKK_RSA) {
        if bits < min || bits > max {
            return Err(CKR_KEY_SIZE_RANGE)?;
        }
    }
    let exponent = match pub_attrs.get_ptr(CKA_PUBLIC_EXPONENT) {
        Ok(e) => rsa::BigUint::from_bytes_be(e),
        Err(_) => rsa::BigUint::from(DEFAULT_PUBLIC_EXPONENT),
    };
    let key = RsaPrivateKey::new_with_exp(&mut OsRng, bits as usize, &exponent);
    let key = match key {
        Ok(k) => k,
        Err(e) => {
            error!("RSA key generation failed: {}", e);
            return Err(CKR_FUNCTION_FAILED)?;
        }
    };

    let modulus = key.n().to_bytes_be();
    let public_exponent = key.e().to_bytes_be();
    pub_attrs.set(CKA_MODULUS, &modulus);
    pub_attrs.set(CKA_PUBLIC_EXPONENT, &public_exponent);

    let primes = key.primes();
    if primes.len() != 2 {
        return Err(CKR_FUNCTION_FAILED)?;
    }
    let d = to_uint(key.d());
    let p = to_uint(&primes[0]);
    let q = to_uint(&primes[1]);
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let dp = &d % (&p - &one);
    let dq = &d % (&q - &one);
    let qinv = q.modpow(&(&p - &two), &p);

    priv_attrs.set(CKA_MODULUS, &modulus);
    priv_attrs.set(CKA_PUBLIC_EXPONENT, &public_exponent);
    priv_attrs.set(CKA_PRIVATE_EXPONENT, &Zeroizing::new(d.to_bytes_be()));
    priv_attrs.set(CKA_PRIME_1, &Zeroizing::new(p.to_bytes_be()));
    priv_attrs.set(CKA_PRIME_2, &Zeroizing::new(q.to_bytes_be()));
    priv_attrs.set(CKA_EXPONENT_1, &Zeroizing::new(dp.to_bytes_be()));
    priv_attrs.set(CKA_EXPONENT_2, &Zeroizing::new(dq.to_bytes_be()));
    priv_attrs.set(CKA_COEFFICIENT, &Zeroizing::new(qinv.to_bytes_be()));
    Ok(())
}

fn generate_ec(
    pub_attrs: &mut Attributes,
    priv_attrs: &mut Attributes,
) -> Result<()> {
    let params = pub_attrs
        .get_ptr(CKA_EC_PARAMS)
        .map_err(incomplete)?
        .to_vec();
    let (point, value) = match Curve::from_params(&params)? {
        Curve::P256 => {
            let key = p256::SecretKey::random(&mut OsRng);
            let point = key.public_key().to_encoded_point(false);
            (point.as_bytes().to_vec(), key.to_bytes().to_vec())
        }
        Curve::P384 => {
            let key = p384::SecretKey::random(&mut OsRng);
            let point = key.public_key().to_encoded_point(false);
            (point.as_bytes().to_vec(), key.to_bytes().to_vec())
        }
    };
    let value = Zeroizing::new(value);
    pub_attrs.set(CKA_EC_POINT, &asn1::write_single(&point.as_slice())?);
    priv_attrs.set(CKA_EC_PARAMS, &params);
    priv_attrs.set(CKA_VALUE, &value);
    Ok(())
}

/// Generates the key material of a key pair and stores it in the
/// public and private key attributes
pub(crate) fn generate_key_pair(
    pub_attrs: &mut Attributes,
    priv_attrs: &mut Attributes,
) -> Result<()> {
    match pub_attrs.get_type() {
        CKK_RSA => generate_rsa(pub_attrs, priv_attrs),
        CKK_EC => generate_ec(pub_attrs, priv_attrs),
        _ => Err(CKR_TEMPLATE_INCONSISTENT)?,
    }
}

/// ECDH with a peer public value. Only the null KDF is supported, the
/// shared secret is the X coordinate of the agreed point.
pub(crate) fn ecdh_derive(params: &[u8], key: &BackendKey) -> Result<Vec<u8>> {
    let mut args = SerialArgs::new(params);
    let kdf = args.get_u32().map_err(param_invalid)?;
    let len = args.get_u32().map_err(param_invalid)?;
    let shared = args.alloc_get(len as usize).map_err(param_invalid)?;
    let len = args.get_u32().map_err(param_invalid)?;
    let public = args.alloc_get(len as usize).map_err(param_invalid)?;
    args.check_consumed().map_err(param_invalid)?;
    if kdf != CKD_NULL || !shared.is_empty() {
        error!("Unsupported ECDH key derivation function {}", kdf);
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    }

    let secret = match key.ec_private()? {
        EcPrivate::P256(k) => {
            let peer = match ec_public_from_point(&public, Curve::P256) {
                Ok(EcPublic::P256(p)) => p,
                _ => return Err(CKR_MECHANISM_PARAM_INVALID)?,
            };
            let shared = p256::ecdh::diffie_hellman(
                k.to_nonzero_scalar(),
                peer.as_affine(),
            );
            shared.raw_secret_bytes().to_vec()
        }
        EcPrivate::P384(k) => {
            let peer = match ec_public_from_point(&public, Curve::P384) {
                Ok(EcPublic::P384(p)) => p,
                _ => return Err(CKR_MECHANISM_PARAM_INVALID)?,
            };
            let shared = p384::ecdh::diffie_hellman(
                k.to_nonzero_scalar(),
                peer.as_affine(),
            );
            shared.raw_secret_bytes().to_vec()
        }
    };
    Ok(secret)
}
