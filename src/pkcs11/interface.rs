// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Client/TA ABI identifiers.
//!
//! All identifiers exchanged with the client library are 32 bit wide,
//! regardless of the size of a `CK_ULONG` on the client side.

pub type CK_ULONG = u32;
pub type CK_RV = CK_ULONG;
pub type CK_FLAGS = CK_ULONG;
pub type CK_SLOT_ID = CK_ULONG;
pub type CK_SESSION_HANDLE = CK_ULONG;
pub type CK_OBJECT_HANDLE = CK_ULONG;
pub type CK_ATTRIBUTE_TYPE = CK_ULONG;
pub type CK_OBJECT_CLASS = CK_ULONG;
pub type CK_KEY_TYPE = CK_ULONG;
pub type CK_MECHANISM_TYPE = CK_ULONG;
pub type CK_USER_TYPE = CK_ULONG;
pub type CK_STATE = CK_ULONG;
pub type CK_BBOOL = u8;

pub const CK_TRUE: CK_BBOOL = 1;
pub const CK_FALSE: CK_BBOOL = 0;

pub const CK_INVALID_HANDLE: CK_ULONG = 0;
pub const CK_UNAVAILABLE_INFORMATION: CK_ULONG = 0xFFFF_FFFF;
pub const CK_UNDEFINED_ID: CK_ULONG = CK_UNAVAILABLE_INFORMATION;

/* TA version */
pub const SKS_VERSION_MAJOR: u32 = 0;
pub const SKS_VERSION_MINOR: u32 = 1;
pub const SKS_VERSION_PATCH: u32 = 0;

/* Commands */
pub const SKS_CMD_PING: u32 = 0;
pub const SKS_CMD_SLOT_LIST: u32 = 1;
pub const SKS_CMD_SLOT_INFO: u32 = 2;
pub const SKS_CMD_TOKEN_INFO: u32 = 3;
pub const SKS_CMD_MECHANISM_IDS: u32 = 4;
pub const SKS_CMD_MECHANISM_INFO: u32 = 5;
pub const SKS_CMD_INIT_TOKEN: u32 = 6;
pub const SKS_CMD_INIT_PIN: u32 = 7;
pub const SKS_CMD_SET_PIN: u32 = 8;
pub const SKS_CMD_LOGIN: u32 = 9;
pub const SKS_CMD_LOGOUT: u32 = 10;
pub const SKS_CMD_OPEN_RO_SESSION: u32 = 11;
pub const SKS_CMD_OPEN_RW_SESSION: u32 = 12;
pub const SKS_CMD_CLOSE_SESSION: u32 = 13;
pub const SKS_CMD_SESSION_INFO: u32 = 14;
pub const SKS_CMD_CLOSE_ALL_SESSIONS: u32 = 15;
pub const SKS_CMD_GET_SESSION_STATE: u32 = 16;
pub const SKS_CMD_SET_SESSION_STATE: u32 = 17;
pub const SKS_CMD_IMPORT_OBJECT: u32 = 18;
pub const SKS_CMD_COPY_OBJECT: u32 = 19;
pub const SKS_CMD_DESTROY_OBJECT: u32 = 20;
pub const SKS_CMD_FIND_OBJECTS_INIT: u32 = 21;
pub const SKS_CMD_FIND_OBJECTS: u32 = 22;
pub const SKS_CMD_FIND_OBJECTS_FINAL: u32 = 23;
pub const SKS_CMD_GET_OBJECT_SIZE: u32 = 24;
pub const SKS_CMD_GET_ATTRIBUTE_VALUE: u32 = 25;
pub const SKS_CMD_SET_ATTRIBUTE_VALUE: u32 = 26;
pub const SKS_CMD_GENERATE_KEY: u32 = 27;
pub const SKS_CMD_ENCRYPT_INIT: u32 = 28;
pub const SKS_CMD_DECRYPT_INIT: u32 = 29;
pub const SKS_CMD_ENCRYPT_UPDATE: u32 = 30;
pub const SKS_CMD_DECRYPT_UPDATE: u32 = 31;
pub const SKS_CMD_ENCRYPT_FINAL: u32 = 32;
pub const SKS_CMD_DECRYPT_FINAL: u32 = 33;
pub const SKS_CMD_ENCRYPT_ONESHOT: u32 = 34;
pub const SKS_CMD_DECRYPT_ONESHOT: u32 = 35;
pub const SKS_CMD_SIGN_INIT: u32 = 36;
pub const SKS_CMD_VERIFY_INIT: u32 = 37;
pub const SKS_CMD_SIGN_UPDATE: u32 = 38;
pub const SKS_CMD_VERIFY_UPDATE: u32 = 39;
pub const SKS_CMD_SIGN_FINAL: u32 = 40;
pub const SKS_CMD_VERIFY_FINAL: u32 = 41;
pub const SKS_CMD_SIGN_ONESHOT: u32 = 42;
pub const SKS_CMD_VERIFY_ONESHOT: u32 = 43;
pub const SKS_CMD_DERIVE_KEY: u32 = 44;
pub const SKS_CMD_GENERATE_KEY_PAIR: u32 = 45;

/* Structure sizes */
pub const SKS_SLOT_DESC_SIZE: usize = 64;
pub const SKS_SLOT_MANUFACTURER_SIZE: usize = 32;
pub const SKS_TOKEN_LABEL_SIZE: usize = 32;
pub const SKS_TOKEN_MANUFACTURER_SIZE: usize = 32;
pub const SKS_TOKEN_MODEL_SIZE: usize = 16;
pub const SKS_TOKEN_SERIALNUM_SIZE: usize = 16;
pub const SKS_TOKEN_PIN_SIZE_MAX: usize = 32;
pub const SKS_TOKEN_PIN_SIZE_MIN: usize = 4;

/* pkcs11_slot_info: description, manufacturer, flags, hw[2], fw[2] */
pub const SKS_SLOT_INFO_SIZE: usize =
    SKS_SLOT_DESC_SIZE + SKS_SLOT_MANUFACTURER_SIZE + 4 + 2 + 2;
/* pkcs11_token_info: strings, flags, 10 counters, hw[2], fw[2], utc[16] */
pub const SKS_TOKEN_INFO_SIZE: usize = SKS_TOKEN_LABEL_SIZE
    + SKS_TOKEN_MANUFACTURER_SIZE
    + SKS_TOKEN_MODEL_SIZE
    + SKS_TOKEN_SERIALNUM_SIZE
    + 4
    + 10 * 4
    + 2
    + 2
    + 16;
/* pkcs11_mechanism_info: min, max, flags */
pub const SKS_MECHANISM_INFO_SIZE: usize = 3 * 4;
/* pkcs11_session_info: slot, state, flags, device error */
pub const SKS_SESSION_INFO_SIZE: usize = 4 * 4;

/* Slot flags */
pub const CKF_TOKEN_PRESENT: CK_FLAGS = 1 << 0;
pub const CKF_REMOVABLE_DEVICE: CK_FLAGS = 1 << 1;
pub const CKF_HW_SLOT: CK_FLAGS = 1 << 2;

/* Token flags */
pub const CKF_RNG: CK_FLAGS = 1 << 0;
pub const CKF_WRITE_PROTECTED: CK_FLAGS = 1 << 1;
pub const CKF_LOGIN_REQUIRED: CK_FLAGS = 1 << 2;
pub const CKF_USER_PIN_INITIALIZED: CK_FLAGS = 1 << 3;
pub const CKF_RESTORE_KEY_NOT_NEEDED: CK_FLAGS = 1 << 4;
pub const CKF_CLOCK_ON_TOKEN: CK_FLAGS = 1 << 5;
pub const CKF_PROTECTED_AUTHENTICATION_PATH: CK_FLAGS = 1 << 6;
pub const CKF_DUAL_CRYPTO_OPERATIONS: CK_FLAGS = 1 << 7;
pub const CKF_TOKEN_INITIALIZED: CK_FLAGS = 1 << 8;
pub const CKF_USER_PIN_COUNT_LOW: CK_FLAGS = 1 << 9;
pub const CKF_USER_PIN_FINAL_TRY: CK_FLAGS = 1 << 10;
pub const CKF_USER_PIN_LOCKED: CK_FLAGS = 1 << 11;
pub const CKF_USER_PIN_TO_BE_CHANGED: CK_FLAGS = 1 << 12;
pub const CKF_SO_PIN_COUNT_LOW: CK_FLAGS = 1 << 13;
pub const CKF_SO_PIN_FINAL_TRY: CK_FLAGS = 1 << 14;
pub const CKF_SO_PIN_LOCKED: CK_FLAGS = 1 << 15;
pub const CKF_SO_PIN_TO_BE_CHANGED: CK_FLAGS = 1 << 16;
pub const CKF_ERROR_STATE: CK_FLAGS = 1 << 17;

/* Session flags */
pub const CKF_RW_SESSION: CK_FLAGS = 1 << 1;
pub const CKF_SERIAL_SESSION: CK_FLAGS = 1 << 2;

/* Mechanism flags */
pub const CKF_HW: CK_FLAGS = 1 << 0;
pub const CKF_ENCRYPT: CK_FLAGS = 1 << 8;
pub const CKF_DECRYPT: CK_FLAGS = 1 << 9;
pub const CKF_DIGEST: CK_FLAGS = 1 << 10;
pub const CKF_SIGN: CK_FLAGS = 1 << 11;
pub const CKF_SIGN_RECOVER: CK_FLAGS = 1 << 12;
pub const CKF_VERIFY: CK_FLAGS = 1 << 13;
pub const CKF_VERIFY_RECOVER: CK_FLAGS = 1 << 14;
pub const CKF_GENERATE: CK_FLAGS = 1 << 15;
pub const CKF_GENERATE_KEY_PAIR: CK_FLAGS = 1 << 16;
pub const CKF_WRAP: CK_FLAGS = 1 << 17;
pub const CKF_UNWRAP: CK_FLAGS = 1 << 18;
pub const CKF_DERIVE: CK_FLAGS = 1 << 19;
pub const CKF_EC_F_P: CK_FLAGS = 1 << 20;
pub const CKF_EC_F_2M: CK_FLAGS = 1 << 21;
pub const CKF_EC_ECPARAMETERS: CK_FLAGS = 1 << 22;
pub const CKF_EC_NAMEDCURVE: CK_FLAGS = 1 << 23;
pub const CKF_EC_UNCOMPRESS: CK_FLAGS = 1 << 24;
pub const CKF_EC_COMPRESS: CK_FLAGS = 1 << 25;

/* User types */
pub const CKU_SO: CK_USER_TYPE = 0;
pub const CKU_USER: CK_USER_TYPE = 1;
pub const CKU_CONTEXT_SPECIFIC: CK_USER_TYPE = 2;

/* Session states */
pub const CKS_RO_PUBLIC_SESSION: CK_STATE = 0;
pub const CKS_RO_USER_FUNCTIONS: CK_STATE = 1;
pub const CKS_RW_PUBLIC_SESSION: CK_STATE = 2;
pub const CKS_RW_USER_FUNCTIONS: CK_STATE = 3;
pub const CKS_RW_SO_FUNCTIONS: CK_STATE = 4;

/* Return codes */
pub const CKR_OK: CK_RV = 0x0000_0000;
pub const CKR_GENERAL_ERROR: CK_RV = 0x0000_0001;
pub const CKR_DEVICE_MEMORY: CK_RV = 0x0000_0002;
pub const CKR_ARGUMENTS_BAD: CK_RV = 0x0000_0003;
pub const CKR_BUFFER_TOO_SMALL: CK_RV = 0x0000_0004;
pub const CKR_FUNCTION_FAILED: CK_RV = 0x0000_0005;
pub const CKR_SIGNATURE_INVALID: CK_RV = 0x0000_0007;
pub const CKR_ATTRIBUTE_TYPE_INVALID: CK_RV = 0x0000_0008;
pub const CKR_ATTRIBUTE_VALUE_INVALID: CK_RV = 0x0000_0009;
pub const CKR_OBJECT_HANDLE_INVALID: CK_RV = 0x0000_000a;
pub const CKR_KEY_HANDLE_INVALID: CK_RV = 0x0000_000b;
pub const CKR_MECHANISM_INVALID: CK_RV = 0x0000_000c;
pub const CKR_SESSION_HANDLE_INVALID: CK_RV = 0x0000_000d;
pub const CKR_SLOT_ID_INVALID: CK_RV = 0x0000_000e;
pub const CKR_MECHANISM_PARAM_INVALID: CK_RV = 0x0000_000f;
pub const CKR_TEMPLATE_INCONSISTENT: CK_RV = 0x0000_0010;
pub const CKR_TEMPLATE_INCOMPLETE: CK_RV = 0x0000_0011;
pub const CKR_PIN_INCORRECT: CK_RV = 0x0000_0012;
pub const CKR_PIN_LOCKED: CK_RV = 0x0000_0013;
pub const CKR_PIN_EXPIRED: CK_RV = 0x0000_0014;
pub const CKR_PIN_INVALID: CK_RV = 0x0000_0015;
pub const CKR_PIN_LEN_RANGE: CK_RV = 0x0000_0016;
pub const CKR_SESSION_EXISTS: CK_RV = 0x0000_0017;
pub const CKR_SESSION_READ_ONLY: CK_RV = 0x0000_0018;
pub const CKR_SESSION_READ_WRITE_SO_EXISTS: CK_RV = 0x0000_0019;
pub const CKR_OPERATION_ACTIVE: CK_RV = 0x0000_001a;
pub const CKR_KEY_FUNCTION_NOT_PERMITTED: CK_RV = 0x0000_001b;
pub const CKR_OPERATION_NOT_INITIALIZED: CK_RV = 0x0000_001c;
pub const CKR_TOKEN_WRITE_PROTECTED: CK_RV = 0x0000_001d;
pub const CKR_TOKEN_NOT_PRESENT: CK_RV = 0x0000_001e;
pub const CKR_TOKEN_NOT_RECOGNIZED: CK_RV = 0x0000_001f;
pub const CKR_ACTION_PROHIBITED: CK_RV = 0x0000_0020;
pub const CKR_ATTRIBUTE_READ_ONLY: CK_RV = 0x0000_0021;
pub const CKR_PIN_TOO_WEAK: CK_RV = 0x0000_0022;
pub const CKR_CURVE_NOT_SUPPORTED: CK_RV = 0x0000_0023;
pub const CKR_DOMAIN_PARAMS_INVALID: CK_RV = 0x0000_0024;
pub const CKR_USER_ALREADY_LOGGED_IN: CK_RV = 0x0000_0025;
pub const CKR_USER_ANOTHER_ALREADY_LOGGED_IN: CK_RV = 0x0000_0026;
pub const CKR_USER_NOT_LOGGED_IN: CK_RV = 0x0000_0027;
pub const CKR_USER_PIN_NOT_INITIALIZED: CK_RV = 0x0000_0028;
pub const CKR_USER_TOO_MANY_TYPES: CK_RV = 0x0000_0029;
pub const CKR_USER_TYPE_INVALID: CK_RV = 0x0000_002a;
pub const CKR_SESSION_READ_ONLY_EXISTS: CK_RV = 0x0000_002b;
pub const CKR_KEY_SIZE_RANGE: CK_RV = 0x0000_002c;
pub const CKR_ATTRIBUTE_SENSITIVE: CK_RV = 0x0000_002d;

/* Attributes, the [0, 63] range is reserved to booleans */
pub const CKA_BOOLPROPS_BASE: CK_ATTRIBUTE_TYPE = 0;
pub const CKA_BOOLPROPS_MAX: CK_ATTRIBUTE_TYPE = 63;

pub const CKA_TOKEN: CK_ATTRIBUTE_TYPE = 0x00;
pub const CKA_PRIVATE: CK_ATTRIBUTE_TYPE = 0x01;
pub const CKA_TRUSTED: CK_ATTRIBUTE_TYPE = 0x02;
pub const CKA_SENSITIVE: CK_ATTRIBUTE_TYPE = 0x03;
pub const CKA_ENCRYPT: CK_ATTRIBUTE_TYPE = 0x04;
pub const CKA_DECRYPT: CK_ATTRIBUTE_TYPE = 0x05;
pub const CKA_WRAP: CK_ATTRIBUTE_TYPE = 0x06;
pub const CKA_UNWRAP: CK_ATTRIBUTE_TYPE = 0x07;
pub const CKA_SIGN: CK_ATTRIBUTE_TYPE = 0x08;
pub const CKA_SIGN_RECOVER: CK_ATTRIBUTE_TYPE = 0x09;
pub const CKA_VERIFY: CK_ATTRIBUTE_TYPE = 0x0a;
pub const CKA_VERIFY_RECOVER: CK_ATTRIBUTE_TYPE = 0x0b;
pub const CKA_DERIVE: CK_ATTRIBUTE_TYPE = 0x0c;
pub const CKA_EXTRACTABLE: CK_ATTRIBUTE_TYPE = 0x0d;
pub const CKA_LOCAL: CK_ATTRIBUTE_TYPE = 0x0e;
pub const CKA_NEVER_EXTRACTABLE: CK_ATTRIBUTE_TYPE = 0x0f;
pub const CKA_ALWAYS_SENSITIVE: CK_ATTRIBUTE_TYPE = 0x10;
pub const CKA_MODIFIABLE: CK_ATTRIBUTE_TYPE = 0x11;
pub const CKA_COPYABLE: CK_ATTRIBUTE_TYPE = 0x12;
pub const CKA_DESTROYABLE: CK_ATTRIBUTE_TYPE = 0x13;
pub const CKA_ALWAYS_AUTHENTICATE: CK_ATTRIBUTE_TYPE = 0x14;
pub const CKA_WRAP_WITH_TRUSTED: CK_ATTRIBUTE_TYPE = 0x15;

pub const CKA_LABEL: CK_ATTRIBUTE_TYPE = 0x40;
pub const CKA_VALUE: CK_ATTRIBUTE_TYPE = 0x41;
pub const CKA_VALUE_LEN: CK_ATTRIBUTE_TYPE = 0x42;
pub const CKA_WRAP_TEMPLATE: CK_ATTRIBUTE_TYPE = 0x43;
pub const CKA_UNWRAP_TEMPLATE: CK_ATTRIBUTE_TYPE = 0x44;
pub const CKA_DERIVE_TEMPLATE: CK_ATTRIBUTE_TYPE = 0x45;
pub const CKA_START_DATE: CK_ATTRIBUTE_TYPE = 0x46;
pub const CKA_END_DATE: CK_ATTRIBUTE_TYPE = 0x47;
pub const CKA_OBJECT_ID: CK_ATTRIBUTE_TYPE = 0x48;
pub const CKA_APPLICATION: CK_ATTRIBUTE_TYPE = 0x49;
pub const CKA_MECHANISM_TYPE: CK_ATTRIBUTE_TYPE = 0x4a;
pub const CKA_ID: CK_ATTRIBUTE_TYPE = 0x4b;
pub const CKA_ALLOWED_MECHANISMS: CK_ATTRIBUTE_TYPE = 0x4c;
pub const CKA_CLASS: CK_ATTRIBUTE_TYPE = 0x4d;
pub const CKA_KEY_TYPE: CK_ATTRIBUTE_TYPE = 0x4e;
pub const CKA_EC_POINT: CK_ATTRIBUTE_TYPE = 0x4f;
pub const CKA_EC_PARAMS: CK_ATTRIBUTE_TYPE = 0x50;
pub const CKA_MODULUS: CK_ATTRIBUTE_TYPE = 0x51;
pub const CKA_MODULUS_BITS: CK_ATTRIBUTE_TYPE = 0x52;
pub const CKA_PUBLIC_EXPONENT: CK_ATTRIBUTE_TYPE = 0x53;
pub const CKA_PRIVATE_EXPONENT: CK_ATTRIBUTE_TYPE = 0x54;
pub const CKA_PRIME_1: CK_ATTRIBUTE_TYPE = 0x55;
pub const CKA_PRIME_2: CK_ATTRIBUTE_TYPE = 0x56;
pub const CKA_EXPONENT_1: CK_ATTRIBUTE_TYPE = 0x57;
pub const CKA_EXPONENT_2: CK_ATTRIBUTE_TYPE = 0x58;
pub const CKA_COEFFICIENT: CK_ATTRIBUTE_TYPE = 0x59;
pub const CKA_SUBJECT: CK_ATTRIBUTE_TYPE = 0x5a;
pub const CKA_PUBLIC_KEY_INFO: CK_ATTRIBUTE_TYPE = 0x5b;

pub const CKA_EC_POINT_X: CK_ATTRIBUTE_TYPE = 0x8880_0001;
pub const CKA_EC_POINT_Y: CK_ATTRIBUTE_TYPE = 0x8880_0002;
pub const CKA_UNDEFINED_ID: CK_ATTRIBUTE_TYPE = CK_UNDEFINED_ID;

/* Object classes */
pub const CKO_SECRET_KEY: CK_OBJECT_CLASS = 0x000;
pub const CKO_PUBLIC_KEY: CK_OBJECT_CLASS = 0x001;
pub const CKO_PRIVATE_KEY: CK_OBJECT_CLASS = 0x002;
pub const CKO_OTP_KEY: CK_OBJECT_CLASS = 0x003;
pub const CKO_CERTIFICATE: CK_OBJECT_CLASS = 0x004;
pub const CKO_DATA: CK_OBJECT_CLASS = 0x005;
pub const CKO_DOMAIN_PARAMETERS: CK_OBJECT_CLASS = 0x006;
pub const CKO_HW_FEATURE: CK_OBJECT_CLASS = 0x007;
pub const CKO_MECHANISM: CK_OBJECT_CLASS = 0x008;
pub const CKO_UNDEFINED_ID: CK_OBJECT_CLASS = CK_UNDEFINED_ID;

/* Key types */
pub const CKK_AES: CK_KEY_TYPE = 0x000;
pub const CKK_GENERIC_SECRET: CK_KEY_TYPE = 0x001;
pub const CKK_MD5_HMAC: CK_KEY_TYPE = 0x002;
pub const CKK_SHA_1_HMAC: CK_KEY_TYPE = 0x003;
pub const CKK_SHA224_HMAC: CK_KEY_TYPE = 0x004;
pub const CKK_SHA256_HMAC: CK_KEY_TYPE = 0x005;
pub const CKK_SHA384_HMAC: CK_KEY_TYPE = 0x006;
pub const CKK_SHA512_HMAC: CK_KEY_TYPE = 0x007;
pub const CKK_EC: CK_KEY_TYPE = 0x008;
pub const CKK_RSA: CK_KEY_TYPE = 0x009;
pub const CKK_DSA: CK_KEY_TYPE = 0x00a;
pub const CKK_DH: CK_KEY_TYPE = 0x00b;
pub const CKK_UNDEFINED_ID: CK_KEY_TYPE = CK_UNDEFINED_ID;

/* Mechanisms */
pub const CKM_AES_ECB: CK_MECHANISM_TYPE = 0x000;
pub const CKM_AES_CBC: CK_MECHANISM_TYPE = 0x001;
pub const CKM_AES_CBC_PAD: CK_MECHANISM_TYPE = 0x002;
pub const CKM_AES_CTS: CK_MECHANISM_TYPE = 0x003;
pub const CKM_AES_CTR: CK_MECHANISM_TYPE = 0x004;
pub const CKM_AES_GCM: CK_MECHANISM_TYPE = 0x005;
pub const CKM_AES_CCM: CK_MECHANISM_TYPE = 0x006;
pub const CKM_AES_GMAC: CK_MECHANISM_TYPE = 0x007;
pub const CKM_AES_CMAC: CK_MECHANISM_TYPE = 0x008;
pub const CKM_AES_CMAC_GENERAL: CK_MECHANISM_TYPE = 0x009;
pub const CKM_AES_ECB_ENCRYPT_DATA: CK_MECHANISM_TYPE = 0x00a;
pub const CKM_AES_CBC_ENCRYPT_DATA: CK_MECHANISM_TYPE = 0x00b;
pub const CKM_AES_KEY_GEN: CK_MECHANISM_TYPE = 0x00c;
pub const CKM_GENERIC_SECRET_KEY_GEN: CK_MECHANISM_TYPE = 0x00d;
pub const CKM_MD5_HMAC: CK_MECHANISM_TYPE = 0x00e;
pub const CKM_SHA_1_HMAC: CK_MECHANISM_TYPE = 0x00f;
pub const CKM_SHA224_HMAC: CK_MECHANISM_TYPE = 0x010;
pub const CKM_SHA256_HMAC: CK_MECHANISM_TYPE = 0x011;
pub const CKM_SHA384_HMAC: CK_MECHANISM_TYPE = 0x012;
pub const CKM_SHA512_HMAC: CK_MECHANISM_TYPE = 0x013;
pub const CKM_AES_XCBC_MAC: CK_MECHANISM_TYPE = 0x014;
pub const CKM_EC_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x015;
pub const CKM_ECDSA: CK_MECHANISM_TYPE = 0x016;
pub const CKM_ECDSA_SHA1: CK_MECHANISM_TYPE = 0x017;
pub const CKM_ECDSA_SHA224: CK_MECHANISM_TYPE = 0x018;
pub const CKM_ECDSA_SHA256: CK_MECHANISM_TYPE = 0x019;
pub const CKM_ECDSA_SHA384: CK_MECHANISM_TYPE = 0x01a;
pub const CKM_ECDSA_SHA512: CK_MECHANISM_TYPE = 0x01b;
pub const CKM_ECDH1_DERIVE: CK_MECHANISM_TYPE = 0x01c;
pub const CKM_ECDH1_COFACTOR_DERIVE: CK_MECHANISM_TYPE = 0x01d;
pub const CKM_ECMQV_DERIVE: CK_MECHANISM_TYPE = 0x01e;
pub const CKM_ECDH_AES_KEY_WRAP: CK_MECHANISM_TYPE = 0x01f;
pub const CKM_RSA_PKCS_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x020;
pub const CKM_RSA_PKCS: CK_MECHANISM_TYPE = 0x021;
pub const CKM_RSA_9796: CK_MECHANISM_TYPE = 0x022;
pub const CKM_RSA_X_509: CK_MECHANISM_TYPE = 0x023;
pub const CKM_SHA1_RSA_PKCS: CK_MECHANISM_TYPE = 0x024;
pub const CKM_RSA_PKCS_OAEP: CK_MECHANISM_TYPE = 0x025;
pub const CKM_SHA1_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x026;
pub const CKM_SHA256_RSA_PKCS: CK_MECHANISM_TYPE = 0x027;
pub const CKM_SHA384_RSA_PKCS: CK_MECHANISM_TYPE = 0x028;
pub const CKM_SHA512_RSA_PKCS: CK_MECHANISM_TYPE = 0x029;
pub const CKM_SHA256_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x02a;
pub const CKM_SHA384_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x02b;
pub const CKM_SHA512_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x02c;
pub const CKM_SHA224_RSA_PKCS: CK_MECHANISM_TYPE = 0x02d;
pub const CKM_SHA224_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x02e;
pub const CKM_RSA_AES_KEY_WRAP: CK_MECHANISM_TYPE = 0x02f;
pub const CKM_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x030;
pub const CKM_MD5: CK_MECHANISM_TYPE = 0x031;
pub const CKM_SHA_1: CK_MECHANISM_TYPE = 0x032;
pub const CKM_SHA224: CK_MECHANISM_TYPE = 0x033;
pub const CKM_SHA256: CK_MECHANISM_TYPE = 0x034;
pub const CKM_SHA384: CK_MECHANISM_TYPE = 0x035;
pub const CKM_SHA512: CK_MECHANISM_TYPE = 0x036;
pub const CKM_DH_PKCS_DERIVE: CK_MECHANISM_TYPE = 0x037;
pub const CKM_UNDEFINED_ID: CK_MECHANISM_TYPE = CK_UNDEFINED_ID;

/* Key derivation functions */
pub const CKD_NULL: CK_ULONG = 0x0000;
pub const CKD_SHA1_KDF: CK_ULONG = 0x0001;
pub const CKD_SHA1_KDF_ASN1: CK_ULONG = 0x0002;
pub const CKD_SHA1_KDF_CONCATENATE: CK_ULONG = 0x0003;
pub const CKD_SHA224_KDF: CK_ULONG = 0x0004;
pub const CKD_SHA256_KDF: CK_ULONG = 0x0005;
pub const CKD_SHA384_KDF: CK_ULONG = 0x0006;
pub const CKD_SHA512_KDF: CK_ULONG = 0x0007;
pub const CKD_CPDIVERSIFY_KDF: CK_ULONG = 0x0008;

/* Mask generation functions */
pub const CKG_MGF1_SHA1: CK_ULONG = 0x0001;
pub const CKG_MGF1_SHA256: CK_ULONG = 0x0002;
pub const CKG_MGF1_SHA384: CK_ULONG = 0x0003;
pub const CKG_MGF1_SHA512: CK_ULONG = 0x0004;
pub const CKG_MGF1_SHA224: CK_ULONG = 0x0005;

/* OAEP encoding parameter source */
pub const CKZ_DATA_SPECIFIED: CK_ULONG = 0x0001;
