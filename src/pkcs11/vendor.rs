// Copyright 2025 Simo Sorce
// See LICENSE.txt file for terms

//! Identifiers with no strict equivalent in the Cryptoki API

use crate::pkcs11::*;

/* Return values */
pub const SKS_RV_NOT_FOUND: CK_RV = 0x0000_1000;
pub const SKS_RV_NOT_IMPLEMENTED: CK_RV = 0x0000_1001;
pub const SKS_CKR_DATA_LEN_RANGE: CK_RV = 0x0000_1002;
pub const SKS_CKR_ENCRYPTED_DATA_LEN_RANGE: CK_RV = 0x0000_1003;

/* Internal processing identifiers for object creation without mechanism */
pub const SKS_PROCESSING_IMPORT: CK_MECHANISM_TYPE = 0x1000;
pub const SKS_PROCESSING_COPY: CK_MECHANISM_TYPE = 0x1001;

pub const SKS_UNSPEC: CK_ULONG = CK_UNAVAILABLE_INFORMATION;
