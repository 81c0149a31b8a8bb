// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Closed enumerations of the token ABI as lookup tables: attribute sizes,
//! supported mechanisms and the functions they allow, key size ranges and
//! printable names used in traces.

use crate::pkcs11::vendor::*;
use crate::pkcs11::*;

/// The function a processing (or an object creation) is performed for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingFunc {
    Encrypt,
    Decrypt,
    Sign,
    Verify,
    Digest,
    SignRecover,
    VerifyRecover,
    Derive,
    Wrap,
    Unwrap,
    Generate,
    GeneratePair,
    Import,
    Copy,
}

/// The stage of a processing a command drives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingStep {
    Init,
    Update,
    Oneshot,
    Final,
}

struct AttrInfo {
    id: CK_ATTRIBUTE_TYPE,
    size: usize,
    name: &'static str,
}

macro_rules! attr_info {
    ($id:ident, $size:expr) => {
        AttrInfo {
            id: $id,
            size: $size,
            name: stringify!($id),
        }
    };
}

static ATTRIBUTES: &[AttrInfo] = &[
    attr_info!(CKA_TOKEN, 1),
    attr_info!(CKA_PRIVATE, 1),
    attr_info!(CKA_TRUSTED, 1),
    attr_info!(CKA_SENSITIVE, 1),
    attr_info!(CKA_ENCRYPT, 1),
    attr_info!(CKA_DECRYPT, 1),
    attr_info!(CKA_WRAP, 1),
    attr_info!(CKA_UNWRAP, 1),
    attr_info!(CKA_SIGN, 1),
    attr_info!(CKA_SIGN_RECOVER, 1),
    attr_info!(CKA_VERIFY, 1),
    attr_info!(CKA_VERIFY_RECOVER, 1),
    attr_info!(CKA_DERIVE, 1),
    attr_info!(CKA_EXTRACTABLE, 1),
    attr_info!(CKA_LOCAL, 1),
    attr_info!(CKA_NEVER_EXTRACTABLE, 1),
    attr_info!(CKA_ALWAYS_SENSITIVE, 1),
    attr_info!(CKA_MODIFIABLE, 1),
    attr_info!(CKA_COPYABLE, 1),
    attr_info!(CKA_DESTROYABLE, 1),
    attr_info!(CKA_ALWAYS_AUTHENTICATE, 1),
    attr_info!(CKA_WRAP_WITH_TRUSTED, 1),
    attr_info!(CKA_LABEL, 0),
    attr_info!(CKA_VALUE, 0),
    attr_info!(CKA_VALUE_LEN, 4),
    attr_info!(CKA_WRAP_TEMPLATE, 0),
    attr_info!(CKA_UNWRAP_TEMPLATE, 0),
    attr_info!(CKA_DERIVE_TEMPLATE, 0),
    attr_info!(CKA_START_DATE, 8),
    attr_info!(CKA_END_DATE, 8),
    attr_info!(CKA_OBJECT_ID, 0),
    attr_info!(CKA_APPLICATION, 0),
    attr_info!(CKA_MECHANISM_TYPE, 4),
    attr_info!(CKA_ID, 0),
    attr_info!(CKA_ALLOWED_MECHANISMS, 0),
    attr_info!(CKA_CLASS, 4),
    attr_info!(CKA_KEY_TYPE, 4),
    attr_info!(CKA_EC_POINT, 0),
    attr_info!(CKA_EC_PARAMS, 0),
    attr_info!(CKA_MODULUS, 0),
    attr_info!(CKA_MODULUS_BITS, 4),
    attr_info!(CKA_PUBLIC_EXPONENT, 0),
    attr_info!(CKA_PRIVATE_EXPONENT, 0),
    attr_info!(CKA_PRIME_1, 0),
    attr_info!(CKA_PRIME_2, 0),
    attr_info!(CKA_EXPONENT_1, 0),
    attr_info!(CKA_EXPONENT_2, 0),
    attr_info!(CKA_COEFFICIENT, 0),
    attr_info!(CKA_SUBJECT, 0),
    attr_info!(CKA_PUBLIC_KEY_INFO, 0),
    attr_info!(CKA_EC_POINT_X, 0),
    attr_info!(CKA_EC_POINT_Y, 0),
];

fn attr_info(id: CK_ATTRIBUTE_TYPE) -> Option<&'static AttrInfo> {
    if id == CKA_UNDEFINED_ID {
        return None;
    }
    ATTRIBUTES.iter().find(|a| a.id == id)
}

/// Boolean attributes live in the low identifier range and are one
/// byte wide.
pub fn attribute_is_boolean(id: CK_ATTRIBUTE_TYPE) -> bool {
    id <= CKA_BOOLPROPS_MAX
}

pub fn attribute_is_known(id: CK_ATTRIBUTE_TYPE) -> bool {
    attr_info(id).is_some()
}

/// Returns the fixed byte size of an attribute, or 0 for variable size
/// attributes (and unknown ones).
pub fn attribute_fixed_size(id: CK_ATTRIBUTE_TYPE) -> usize {
    match attr_info(id) {
        Some(a) => a.size,
        None => 0,
    }
}

/// Attributes whose value is itself a serialized attribute list
pub fn attribute_is_template(id: CK_ATTRIBUTE_TYPE) -> bool {
    matches!(
        id,
        CKA_WRAP_TEMPLATE | CKA_UNWRAP_TEMPLATE | CKA_DERIVE_TEMPLATE
    )
}

pub fn attr_name(id: CK_ATTRIBUTE_TYPE) -> &'static str {
    match attr_info(id) {
        Some(a) => a.name,
        None => "CKA_<unknown>",
    }
}

pub fn class_is_valid(class: CK_OBJECT_CLASS) -> bool {
    matches!(
        class,
        CKO_SECRET_KEY
            | CKO_PUBLIC_KEY
            | CKO_PRIVATE_KEY
            | CKO_OTP_KEY
            | CKO_CERTIFICATE
            | CKO_DATA
            | CKO_DOMAIN_PARAMETERS
            | CKO_HW_FEATURE
            | CKO_MECHANISM
    )
}

pub fn class_is_key(class: CK_OBJECT_CLASS) -> bool {
    matches!(class, CKO_SECRET_KEY | CKO_PUBLIC_KEY | CKO_PRIVATE_KEY)
}

pub fn key_type_is_symmetric(key_type: CK_KEY_TYPE) -> bool {
    matches!(
        key_type,
        CKK_AES
            | CKK_GENERIC_SECRET
            | CKK_MD5_HMAC
            | CKK_SHA_1_HMAC
            | CKK_SHA224_HMAC
            | CKK_SHA256_HMAC
            | CKK_SHA384_HMAC
            | CKK_SHA512_HMAC
    )
}

pub fn key_type_is_asymmetric(key_type: CK_KEY_TYPE) -> bool {
    matches!(key_type, CKK_EC | CKK_RSA | CKK_DSA | CKK_DH)
}

pub fn class_name(class: CK_OBJECT_CLASS) -> &'static str {
    match class {
        CKO_SECRET_KEY => "CKO_SECRET_KEY",
        CKO_PUBLIC_KEY => "CKO_PUBLIC_KEY",
        CKO_PRIVATE_KEY => "CKO_PRIVATE_KEY",
        CKO_OTP_KEY => "CKO_OTP_KEY",
        CKO_CERTIFICATE => "CKO_CERTIFICATE",
        CKO_DATA => "CKO_DATA",
        CKO_DOMAIN_PARAMETERS => "CKO_DOMAIN_PARAMETERS",
        CKO_HW_FEATURE => "CKO_HW_FEATURE",
        CKO_MECHANISM => "CKO_MECHANISM",
        CKO_UNDEFINED_ID => "CKO_UNDEFINED_ID",
        _ => "CKO_<unknown>",
    }
}

pub fn key_type_name(key_type: CK_KEY_TYPE) -> &'static str {
    match key_type {
        CKK_AES => "CKK_AES",
        CKK_GENERIC_SECRET => "CKK_GENERIC_SECRET",
        CKK_MD5_HMAC => "CKK_MD5_HMAC",
        CKK_SHA_1_HMAC => "CKK_SHA_1_HMAC",
        CKK_SHA224_HMAC => "CKK_SHA224_HMAC",
        CKK_SHA256_HMAC => "CKK_SHA256_HMAC",
        CKK_SHA384_HMAC => "CKK_SHA384_HMAC",
        CKK_SHA512_HMAC => "CKK_SHA512_HMAC",
        CKK_EC => "CKK_EC",
        CKK_RSA => "CKK_RSA",
        CKK_DSA => "CKK_DSA",
        CKK_DH => "CKK_DH",
        CKK_UNDEFINED_ID => "CKK_UNDEFINED_ID",
        _ => "CKK_<unknown>",
    }
}

/* Mechanism table */

const ENC: CK_FLAGS = CKF_ENCRYPT;
const DEC: CK_FLAGS = CKF_DECRYPT;
const DIG: CK_FLAGS = CKF_DIGEST;
const SIG: CK_FLAGS = CKF_SIGN;
const VER: CK_FLAGS = CKF_VERIFY;
const SRC: CK_FLAGS = CKF_SIGN_RECOVER;
const VRC: CK_FLAGS = CKF_VERIFY_RECOVER;
const DER: CK_FLAGS = CKF_DERIVE;
const WRA: CK_FLAGS = CKF_WRAP;
const UNW: CK_FLAGS = CKF_UNWRAP;
const GEN: CK_FLAGS = CKF_GENERATE;
const GPA: CK_FLAGS = CKF_GENERATE_KEY_PAIR;

/// Mask of the flags that describe processing functions
pub const CKF_FUNCTIONS_MASK: CK_FLAGS = ENC
    | DEC
    | DIG
    | SIG
    | VER
    | SRC
    | VRC
    | DER
    | WRA
    | UNW
    | GEN
    | GPA;

struct MechanismInfo {
    id: CK_MECHANISM_TYPE,
    flags: CK_FLAGS,
    one_shot: bool,
    available: bool,
    name: &'static str,
}

macro_rules! mech {
    ($id:ident, $flags:expr, $one_shot:expr, $available:expr) => {
        MechanismInfo {
            id: $id,
            flags: $flags,
            one_shot: $one_shot,
            available: $available,
            name: stringify!($id),
        }
    };
}

static MECHANISMS: &[MechanismInfo] = &[
    mech!(CKM_AES_ECB, ENC | DEC | DER | WRA | UNW, false, true),
    mech!(CKM_AES_CBC, ENC | DEC | DER | WRA | UNW, false, true),
    mech!(CKM_AES_CBC_PAD, ENC | DEC | DER | WRA | UNW, false, true),
    mech!(CKM_AES_CTS, ENC | DEC | WRA | UNW, false, true),
    mech!(CKM_AES_CTR, ENC | DEC | WRA | UNW, false, true),
    mech!(CKM_AES_GCM, ENC | DEC | WRA | UNW, false, true),
    mech!(CKM_AES_CCM, ENC | DEC | WRA | UNW, false, true),
    mech!(CKM_AES_GMAC, SIG | VER | DER, false, true),
    mech!(CKM_AES_CMAC, SIG | VER, false, true),
    mech!(CKM_AES_CMAC_GENERAL, SIG | VER, false, true),
    mech!(CKM_AES_ECB_ENCRYPT_DATA, DER, false, true),
    mech!(CKM_AES_CBC_ENCRYPT_DATA, DER, false, true),
    mech!(CKM_AES_KEY_GEN, GEN, false, true),
    mech!(CKM_GENERIC_SECRET_KEY_GEN, GEN, false, true),
    mech!(CKM_MD5_HMAC, SIG | VER, false, true),
    mech!(CKM_SHA_1_HMAC, SIG | VER, false, true),
    mech!(CKM_SHA224_HMAC, SIG | VER, false, true),
    mech!(CKM_SHA256_HMAC, SIG | VER, false, true),
    mech!(CKM_SHA384_HMAC, SIG | VER, false, true),
    mech!(CKM_SHA512_HMAC, SIG | VER, false, true),
    mech!(CKM_AES_XCBC_MAC, SIG | VER, false, true),
    mech!(CKM_EC_KEY_PAIR_GEN, GPA, false, true),
    mech!(CKM_ECDSA, SIG | VER, true, true),
    mech!(CKM_ECDSA_SHA1, SIG | VER, false, true),
    mech!(CKM_ECDSA_SHA224, SIG | VER, false, true),
    mech!(CKM_ECDSA_SHA256, SIG | VER, false, true),
    mech!(CKM_ECDSA_SHA384, SIG | VER, false, true),
    mech!(CKM_ECDSA_SHA512, SIG | VER, false, true),
    mech!(CKM_ECDH1_DERIVE, DER, false, true),
    mech!(CKM_ECDH1_COFACTOR_DERIVE, DER, false, true),
    mech!(CKM_ECMQV_DERIVE, DER, false, false),
    mech!(CKM_ECDH_AES_KEY_WRAP, WRA | UNW, false, false),
    mech!(CKM_RSA_PKCS_KEY_PAIR_GEN, GPA, false, true),
    mech!(CKM_RSA_PKCS, ENC | DEC | SIG | VER | SRC | VRC | WRA | UNW, true, true),
    mech!(CKM_RSA_PKCS_PSS, SIG | VER, true, true),
    mech!(CKM_RSA_PKCS_OAEP, ENC | DEC | WRA | UNW, true, true),
    mech!(CKM_RSA_9796, SIG | VER | SRC | VRC | WRA | UNW, true, false),
    mech!(CKM_RSA_X_509, ENC | DEC | SIG | VER | SRC | VRC | WRA | UNW, true, true),
    mech!(CKM_SHA1_RSA_PKCS, SIG | VER, false, true),
    mech!(CKM_SHA1_RSA_PKCS_PSS, SIG | VER, false, true),
    mech!(CKM_SHA256_RSA_PKCS, SIG | VER, false, true),
    mech!(CKM_SHA384_RSA_PKCS, SIG | VER, false, true),
    mech!(CKM_SHA512_RSA_PKCS, SIG | VER, false, true),
    mech!(CKM_SHA256_RSA_PKCS_PSS, SIG | VER, false, true),
    mech!(CKM_SHA384_RSA_PKCS_PSS, SIG | VER, false, true),
    mech!(CKM_SHA512_RSA_PKCS_PSS, SIG | VER, false, true),
    mech!(CKM_SHA224_RSA_PKCS, SIG | VER, false, true),
    mech!(CKM_SHA224_RSA_PKCS_PSS, SIG | VER, false, true),
    mech!(CKM_RSA_AES_KEY_WRAP, WRA | UNW, false, false),
    mech!(CKM_MD5, DIG, false, false),
    mech!(CKM_SHA_1, DIG, false, false),
    mech!(CKM_SHA224, DIG, false, false),
    mech!(CKM_SHA256, DIG, false, false),
    mech!(CKM_SHA384, DIG, false, false),
    mech!(CKM_SHA512, DIG, false, false),
];

fn mech_info(id: CK_MECHANISM_TYPE) -> Option<&'static MechanismInfo> {
    MECHANISMS.iter().find(|m| m.id == id)
}

/// The mechanism identifier is part of the ABI enumeration
pub fn mechanism_is_valid(id: CK_MECHANISM_TYPE) -> bool {
    mech_info(id).is_some()
}

/// The mechanism is known and implemented by this token
pub fn mechanism_is_supported(id: CK_MECHANISM_TYPE) -> bool {
    match mech_info(id) {
        Some(m) => m.available,
        None => false,
    }
}

pub fn mechanism_is_one_shot(id: CK_MECHANISM_TYPE) -> bool {
    match mech_info(id) {
        Some(m) => m.one_shot,
        None => false,
    }
}

/// Flags reported in the mechanism info, 0 for unknown mechanisms
pub fn mechanism_supported_flags(id: CK_MECHANISM_TYPE) -> CK_FLAGS {
    match mech_info(id) {
        Some(m) => m.flags,
        None => 0,
    }
}

/// Identifiers of all the mechanisms the token implements, in table
/// order
pub fn supported_mechanisms() -> Vec<CK_MECHANISM_TYPE> {
    MECHANISMS
        .iter()
        .filter(|m| m.available)
        .map(|m| m.id)
        .collect()
}

/// Screens a set of function flags against the mechanism table.
///
/// Returns the subset of the requested function flags the mechanism
/// does not allow: 0 means the request is allowed. Unknown mechanisms
/// never pass.
pub fn check_mechanism_flags(id: CK_MECHANISM_TYPE, flags: CK_FLAGS) -> CK_FLAGS {
    let test_flags = flags & CKF_FUNCTIONS_MASK;
    match mech_info(id) {
        Some(m) => {
            let denied = test_flags & !m.flags;
            if denied != 0 {
                error!(
                    "{} flags: 0x{:x} vs 0x{:x}",
                    m.name, test_flags, m.flags
                );
            }
            denied
        }
        None => {
            if test_flags != 0 {
                test_flags
            } else {
                CKF_FUNCTIONS_MASK
            }
        }
    }
}

/// Maps a processing function to its mechanism flag, 0 for the
/// functions that need no mechanism support.
pub fn function_to_flag(function: ProcessingFunc) -> CK_FLAGS {
    match function {
        ProcessingFunc::Encrypt => CKF_ENCRYPT,
        ProcessingFunc::Decrypt => CKF_DECRYPT,
        ProcessingFunc::Sign => CKF_SIGN,
        ProcessingFunc::Verify => CKF_VERIFY,
        ProcessingFunc::Digest => CKF_DIGEST,
        ProcessingFunc::SignRecover => CKF_SIGN_RECOVER,
        ProcessingFunc::VerifyRecover => CKF_VERIFY_RECOVER,
        ProcessingFunc::Derive => CKF_DERIVE,
        ProcessingFunc::Wrap => CKF_WRAP,
        ProcessingFunc::Unwrap => CKF_UNWRAP,
        ProcessingFunc::Generate => CKF_GENERATE,
        ProcessingFunc::GeneratePair => CKF_GENERATE_KEY_PAIR,
        ProcessingFunc::Import | ProcessingFunc::Copy => 0,
    }
}

/// Key size range reported in mechanism information, in bytes for
/// AES and HMAC mechanisms and in bits for the others.
pub fn mechanism_key_size(id: CK_MECHANISM_TYPE) -> (CK_ULONG, CK_ULONG) {
    match id {
        CKM_GENERIC_SECRET_KEY_GEN => (1, 4096),
        CKM_MD5_HMAC => (16, 16),
        CKM_SHA_1_HMAC => (20, 20),
        CKM_SHA224_HMAC => (28, 28),
        CKM_SHA256_HMAC => (32, 32),
        CKM_SHA384_HMAC => (48, 48),
        CKM_SHA512_HMAC => (64, 64),
        CKM_AES_XCBC_MAC => (16, 16),
        CKM_AES_ECB | CKM_AES_CBC | CKM_AES_CBC_PAD | CKM_AES_CTS
        | CKM_AES_CTR | CKM_AES_GCM | CKM_AES_CCM | CKM_AES_GMAC
        | CKM_AES_CMAC | CKM_AES_CMAC_GENERAL | CKM_AES_ECB_ENCRYPT_DATA
        | CKM_AES_CBC_ENCRYPT_DATA | CKM_AES_KEY_GEN => (16, 32),
        CKM_EC_KEY_PAIR_GEN | CKM_ECDSA | CKM_ECDSA_SHA1
        | CKM_ECDSA_SHA224 | CKM_ECDSA_SHA256 | CKM_ECDSA_SHA384
        | CKM_ECDSA_SHA512 | CKM_ECDH1_DERIVE | CKM_ECDH1_COFACTOR_DERIVE
        | CKM_ECMQV_DERIVE | CKM_ECDH_AES_KEY_WRAP => (160, 521),
        CKM_RSA_PKCS_KEY_PAIR_GEN | CKM_RSA_PKCS | CKM_RSA_PKCS_PSS
        | CKM_RSA_PKCS_OAEP | CKM_RSA_9796 | CKM_RSA_X_509
        | CKM_SHA1_RSA_PKCS | CKM_SHA1_RSA_PKCS_PSS | CKM_SHA256_RSA_PKCS
        | CKM_SHA384_RSA_PKCS | CKM_SHA512_RSA_PKCS
        | CKM_SHA256_RSA_PKCS_PSS | CKM_SHA384_RSA_PKCS_PSS
        | CKM_SHA512_RSA_PKCS_PSS | CKM_SHA224_RSA_PKCS
        | CKM_SHA224_RSA_PKCS_PSS | CKM_RSA_AES_KEY_WRAP => (256, 4096),
        _ => (0, 0),
    }
}

/// Valid key size range of a key type, used when creating keys. Secret
/// keys are measured through `CKA_VALUE_LEN` (bits for generic secrets,
/// bytes otherwise), RSA keys through `CKA_MODULUS_BITS`.
pub fn key_size_range(key_type: CK_KEY_TYPE) -> Option<(u32, u32)> {
    match key_type {
        CKK_GENERIC_SECRET => Some((1, 4096)),
        CKK_MD5_HMAC => Some((16, 16)),
        CKK_SHA_1_HMAC => Some((20, 20)),
        CKK_SHA224_HMAC => Some((28, 28)),
        CKK_SHA256_HMAC => Some((32, 32)),
        CKK_SHA384_HMAC => Some((48, 48)),
        CKK_SHA512_HMAC => Some((64, 64)),
        CKK_AES => Some((16, 32)),
        CKK_EC => Some((160, 521)),
        CKK_RSA | CKK_DSA | CKK_DH => Some((256, 4096)),
        _ => None,
    }
}

/// Byte length of a secret key value given its `CKA_VALUE_LEN`
pub fn secret_value_bytes(key_type: CK_KEY_TYPE, value_len: u32) -> usize {
    match key_type {
        CKK_GENERIC_SECRET => (value_len as usize + 7) / 8,
        _ => value_len as usize,
    }
}

pub fn mechanism_name(id: CK_MECHANISM_TYPE) -> &'static str {
    match id {
        SKS_PROCESSING_IMPORT => "SKS_PROCESSING_IMPORT",
        SKS_PROCESSING_COPY => "SKS_PROCESSING_COPY",
        _ => match mech_info(id) {
            Some(m) => m.name,
            None => "CKM_<unknown>",
        },
    }
}

pub fn rv_name(rv: CK_RV) -> &'static str {
    match rv {
        CKR_OK => "CKR_OK",
        CKR_GENERAL_ERROR => "CKR_GENERAL_ERROR",
        CKR_DEVICE_MEMORY => "CKR_DEVICE_MEMORY",
        CKR_ARGUMENTS_BAD => "CKR_ARGUMENTS_BAD",
        CKR_BUFFER_TOO_SMALL => "CKR_BUFFER_TOO_SMALL",
        CKR_FUNCTION_FAILED => "CKR_FUNCTION_FAILED",
        CKR_SIGNATURE_INVALID => "CKR_SIGNATURE_INVALID",
        CKR_ATTRIBUTE_TYPE_INVALID => "CKR_ATTRIBUTE_TYPE_INVALID",
        CKR_ATTRIBUTE_VALUE_INVALID => "CKR_ATTRIBUTE_VALUE_INVALID",
        CKR_OBJECT_HANDLE_INVALID => "CKR_OBJECT_HANDLE_INVALID",
        CKR_KEY_HANDLE_INVALID => "CKR_KEY_HANDLE_INVALID",
        CKR_MECHANISM_INVALID => "CKR_MECHANISM_INVALID",
        CKR_SESSION_HANDLE_INVALID => "CKR_SESSION_HANDLE_INVALID",
        CKR_SLOT_ID_INVALID => "CKR_SLOT_ID_INVALID",
        CKR_MECHANISM_PARAM_INVALID => "CKR_MECHANISM_PARAM_INVALID",
        CKR_TEMPLATE_INCONSISTENT => "CKR_TEMPLATE_INCONSISTENT",
        CKR_TEMPLATE_INCOMPLETE => "CKR_TEMPLATE_INCOMPLETE",
        CKR_PIN_INCORRECT => "CKR_PIN_INCORRECT",
        CKR_PIN_LOCKED => "CKR_PIN_LOCKED",
        CKR_PIN_EXPIRED => "CKR_PIN_EXPIRED",
        CKR_PIN_INVALID => "CKR_PIN_INVALID",
        CKR_PIN_LEN_RANGE => "CKR_PIN_LEN_RANGE",
        CKR_SESSION_EXISTS => "CKR_SESSION_EXISTS",
        CKR_SESSION_READ_ONLY => "CKR_SESSION_READ_ONLY",
        CKR_SESSION_READ_WRITE_SO_EXISTS => "CKR_SESSION_READ_WRITE_SO_EXISTS",
        CKR_OPERATION_ACTIVE => "CKR_OPERATION_ACTIVE",
        CKR_KEY_FUNCTION_NOT_PERMITTED => "CKR_KEY_FUNCTION_NOT_PERMITTED",
        CKR_OPERATION_NOT_INITIALIZED => "CKR_OPERATION_NOT_INITIALIZED",
        CKR_TOKEN_WRITE_PROTECTED => "CKR_TOKEN_WRITE_PROTECTED",
        CKR_TOKEN_NOT_PRESENT => "CKR_TOKEN_NOT_PRESENT",
        CKR_TOKEN_NOT_RECOGNIZED => "CKR_TOKEN_NOT_RECOGNIZED",
        CKR_ACTION_PROHIBITED => "CKR_ACTION_PROHIBITED",
        CKR_ATTRIBUTE_READ_ONLY => "CKR_ATTRIBUTE_READ_ONLY",
        CKR_PIN_TOO_WEAK => "CKR_PIN_TOO_WEAK",
        CKR_CURVE_NOT_SUPPORTED => "CKR_CURVE_NOT_SUPPORTED",
        CKR_DOMAIN_PARAMS_INVALID => "CKR_DOMAIN_PARAMS_INVALID",
        CKR_USER_ALREADY_LOGGED_IN => "CKR_USER_ALREADY_LOGGED_IN",
        CKR_USER_ANOTHER_ALREADY_LOGGED_IN => {
            "CKR_USER_ANOTHER_ALREADY_LOGGED_IN"
        }
        CKR_USER_NOT_LOGGED_IN => "CKR_USER_NOT_LOGGED_IN",
        CKR_USER_PIN_NOT_INITIALIZED => "CKR_USER_PIN_NOT_INITIALIZED",
        CKR_USER_TOO_MANY_TYPES => "CKR_USER_TOO_MANY_TYPES",
        CKR_USER_TYPE_INVALID => "CKR_USER_TYPE_INVALID",
        CKR_SESSION_READ_ONLY_EXISTS => "CKR_SESSION_READ_ONLY_EXISTS",
        CKR_KEY_SIZE_RANGE => "CKR_KEY_SIZE_RANGE",
        CKR_ATTRIBUTE_SENSITIVE => "CKR_ATTRIBUTE_SENSITIVE",
        SKS_RV_NOT_FOUND => "SKS_RV_NOT_FOUND",
        SKS_RV_NOT_IMPLEMENTED => "SKS_RV_NOT_IMPLEMENTED",
        SKS_CKR_DATA_LEN_RANGE => "SKS_CKR_DATA_LEN_RANGE",
        SKS_CKR_ENCRYPTED_DATA_LEN_RANGE => "SKS_CKR_ENCRYPTED_DATA_LEN_RANGE",
        _ => "CKR_<unknown>",
    }
}

pub fn command_name(cmd: u32) -> &'static str {
    match cmd {
        SKS_CMD_PING => "PING",
        SKS_CMD_SLOT_LIST => "SLOT_LIST",
        SKS_CMD_SLOT_INFO => "SLOT_INFO",
        SKS_CMD_TOKEN_INFO => "TOKEN_INFO",
        SKS_CMD_MECHANISM_IDS => "MECHANISM_IDS",
        SKS_CMD_MECHANISM_INFO => "MECHANISM_INFO",
        SKS_CMD_INIT_TOKEN => "INIT_TOKEN",
        SKS_CMD_INIT_PIN => "INIT_PIN",
        SKS_CMD_SET_PIN => "SET_PIN",
        SKS_CMD_LOGIN => "LOGIN",
        SKS_CMD_LOGOUT => "LOGOUT",
        SKS_CMD_OPEN_RO_SESSION => "OPEN_RO_SESSION",
        SKS_CMD_OPEN_RW_SESSION => "OPEN_RW_SESSION",
        SKS_CMD_CLOSE_SESSION => "CLOSE_SESSION",
        SKS_CMD_SESSION_INFO => "SESSION_INFO",
        SKS_CMD_CLOSE_ALL_SESSIONS => "CLOSE_ALL_SESSIONS",
        SKS_CMD_GET_SESSION_STATE => "GET_SESSION_STATE",
        SKS_CMD_SET_SESSION_STATE => "SET_SESSION_STATE",
        SKS_CMD_IMPORT_OBJECT => "IMPORT_OBJECT",
        SKS_CMD_COPY_OBJECT => "COPY_OBJECT",
        SKS_CMD_DESTROY_OBJECT => "DESTROY_OBJECT",
        SKS_CMD_FIND_OBJECTS_INIT => "FIND_OBJECTS_INIT",
        SKS_CMD_FIND_OBJECTS => "FIND_OBJECTS",
        SKS_CMD_FIND_OBJECTS_FINAL => "FIND_OBJECTS_FINAL",
        SKS_CMD_GET_OBJECT_SIZE => "GET_OBJECT_SIZE",
        SKS_CMD_GET_ATTRIBUTE_VALUE => "GET_ATTRIBUTE_VALUE",
        SKS_CMD_SET_ATTRIBUTE_VALUE => "SET_ATTRIBUTE_VALUE",
        SKS_CMD_GENERATE_KEY => "GENERATE_KEY",
        SKS_CMD_ENCRYPT_INIT => "ENCRYPT_INIT",
        SKS_CMD_DECRYPT_INIT => "DECRYPT_INIT",
        SKS_CMD_ENCRYPT_UPDATE => "ENCRYPT_UPDATE",
        SKS_CMD_DECRYPT_UPDATE => "DECRYPT_UPDATE",
        SKS_CMD_ENCRYPT_FINAL => "ENCRYPT_FINAL",
        SKS_CMD_DECRYPT_FINAL => "DECRYPT_FINAL",
        SKS_CMD_ENCRYPT_ONESHOT => "ENCRYPT_ONESHOT",
        SKS_CMD_DECRYPT_ONESHOT => "DECRYPT_ONESHOT",
        SKS_CMD_SIGN_INIT => "SIGN_INIT",
        SKS_CMD_VERIFY_INIT => "VERIFY_INIT",
        SKS_CMD_SIGN_UPDATE => "SIGN_UPDATE",
        SKS_CMD_VERIFY_UPDATE => "VERIFY_UPDATE",
        SKS_CMD_SIGN_FINAL => "SIGN_FINAL",
        SKS_CMD_VERIFY_FINAL => "VERIFY_FINAL",
        SKS_CMD_SIGN_ONESHOT => "SIGN_ONESHOT",
        SKS_CMD_VERIFY_ONESHOT => "VERIFY_ONESHOT",
        SKS_CMD_DERIVE_KEY => "DERIVE_KEY",
        SKS_CMD_GENERATE_KEY_PAIR => "GENERATE_KEY_PAIR",
        _ => "<unknown>",
    }
}
