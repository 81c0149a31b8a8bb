// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Object attribute policy.
//!
//! Client templates are never stored as is: they are sanitized, then a
//! new attribute list is assembled from per class lists of boolean,
//! mandated and optional attributes. The checks in this module bind the
//! assembled attributes to the processing that creates the object, to
//! the parent key of a processing and to the session login state.

use crate::attribute::Attributes;
use crate::error::Result;
use crate::get_random_data;
use crate::helpers::*;
use crate::pkcs11::vendor::*;
use crate::pkcs11::*;
use crate::session::LoginState;

use num_bigint::BigUint;

const NAMED_CURVES: &[(asn1::ObjectIdentifier, u32)] = &[
    (asn1::oid!(1, 3, 132, 0, 6), 112),
    (asn1::oid!(1, 3, 132, 0, 8), 160),
    (asn1::oid!(1, 2, 840, 10045, 3, 1, 1), 192),
    (asn1::oid!(1, 3, 132, 0, 33), 224),
    (asn1::oid!(1, 3, 132, 0, 10), 256),
    (asn1::oid!(1, 2, 840, 10045, 3, 1, 7), 256),
    (asn1::oid!(1, 3, 132, 0, 34), 384),
    (asn1::oid!(1, 3, 132, 0, 35), 521),
];

const ID_SIZE: usize = 16;

struct ClassTemplate {
    booleans: &'static [CK_ATTRIBUTE_TYPE],
    mandated: &'static [CK_ATTRIBUTE_TYPE],
    optional: &'static [CK_ATTRIBUTE_TYPE],
}

static ANY_OBJECT: ClassTemplate = ClassTemplate {
    booleans: &[
        CKA_TOKEN,
        CKA_PRIVATE,
        CKA_MODIFIABLE,
        CKA_COPYABLE,
        CKA_DESTROYABLE,
    ],
    mandated: &[],
    optional: &[CKA_LABEL],
};

static RAW_DATA: ClassTemplate = ClassTemplate {
    booleans: &[],
    mandated: &[],
    optional: &[CKA_OBJECT_ID, CKA_APPLICATION, CKA_VALUE],
};

static ANY_KEY: ClassTemplate = ClassTemplate {
    booleans: &[CKA_DERIVE],
    mandated: &[],
    optional: &[
        CKA_ID,
        CKA_START_DATE,
        CKA_END_DATE,
        CKA_ALLOWED_MECHANISMS,
    ],
};

static SYMM_KEY: ClassTemplate = ClassTemplate {
    booleans: &[
        CKA_ENCRYPT,
        CKA_DECRYPT,
        CKA_SIGN,
        CKA_VERIFY,
        CKA_WRAP,
        CKA_UNWRAP,
        CKA_SENSITIVE,
        CKA_EXTRACTABLE,
        CKA_WRAP_WITH_TRUSTED,
        CKA_TRUSTED,
    ],
    mandated: &[],
    optional: &[
        CKA_WRAP_TEMPLATE,
        CKA_UNWRAP_TEMPLATE,
        CKA_DERIVE_TEMPLATE,
        CKA_VALUE,
        CKA_VALUE_LEN,
    ],
};

static PUBLIC_KEY: ClassTemplate = ClassTemplate {
    booleans: &[
        CKA_ENCRYPT,
        CKA_VERIFY,
        CKA_VERIFY_RECOVER,
        CKA_WRAP,
        CKA_TRUSTED,
    ],
    mandated: &[CKA_SUBJECT],
    optional: &[CKA_WRAP_TEMPLATE, CKA_PUBLIC_KEY_INFO],
};

static PRIVATE_KEY: ClassTemplate = ClassTemplate {
    booleans: &[
        CKA_DECRYPT,
        CKA_SIGN,
        CKA_SIGN_RECOVER,
        CKA_UNWRAP,
        CKA_SENSITIVE,
        CKA_EXTRACTABLE,
        CKA_WRAP_WITH_TRUSTED,
        CKA_ALWAYS_AUTHENTICATE,
    ],
    mandated: &[CKA_SUBJECT],
    optional: &[CKA_UNWRAP_TEMPLATE, CKA_PUBLIC_KEY_INFO],
};

static RSA_PUBLIC_KEY: ClassTemplate = ClassTemplate {
    booleans: &[],
    mandated: &[CKA_MODULUS_BITS],
    optional: &[CKA_MODULUS, CKA_PUBLIC_EXPONENT],
};

static RSA_PRIVATE_KEY: ClassTemplate = ClassTemplate {
    booleans: &[],
    mandated: &[],
    optional: &[
        CKA_MODULUS,
        CKA_PUBLIC_EXPONENT,
        CKA_PRIVATE_EXPONENT,
        CKA_PRIME_1,
        CKA_PRIME_2,
        CKA_EXPONENT_1,
        CKA_EXPONENT_2,
        CKA_COEFFICIENT,
    ],
};

static EC_PUBLIC_KEY: ClassTemplate = ClassTemplate {
    booleans: &[],
    mandated: &[CKA_EC_PARAMS],
    optional: &[CKA_EC_POINT, CKA_EC_POINT_X, CKA_EC_POINT_Y],
};

static EC_PRIVATE_KEY: ClassTemplate = ClassTemplate {
    booleans: &[],
    mandated: &[CKA_EC_PARAMS],
    optional: &[CKA_VALUE, CKA_EC_POINT_X, CKA_EC_POINT_Y],
};

/// PKCS#11 default of a boolean attribute absent from a template
fn boolean_default(id: CK_ATTRIBUTE_TYPE) -> bool {
    matches!(id, CKA_MODIFIABLE | CKA_COPYABLE | CKA_DESTROYABLE)
}

/// Checks a client template is well formed.
///
/// Unknown attributes, values of the wrong size and duplicated
/// attributes with different values are rejected. Exact duplicates are
/// collapsed. The class is not required, so that search templates go
/// through the same path.
pub fn sanitize_template(template: &Attributes) -> Result<Attributes> {
    let mut out = Attributes::new();
    for (id, value) in template.iter() {
        if !attribute_is_known(id) {
            error!("Unknown attribute 0x{:x} in template", id);
            return Err(CKR_ATTRIBUTE_TYPE_INVALID)?;
        }
        let size = attribute_fixed_size(id);
        if size != 0 && value.len() != size {
            error!(
                "{}: invalid size {}, expected {}",
                attr_name(id),
                value.len(),
                size
            );
            return Err(CKR_ATTRIBUTE_VALUE_INVALID)?;
        }
        if attribute_is_boolean(id) && value[0] > CK_TRUE {
            error!("{}: invalid boolean value {}", attr_name(id), value[0]);
            return Err(CKR_ATTRIBUTE_VALUE_INVALID)?;
        }
        if attribute_is_template(id) {
            if let Err(e) = Attributes::from_bytes(value) {
                error!("{}: malformed nested template: {}", attr_name(id), e);
                return Err(CKR_ATTRIBUTE_VALUE_INVALID)?;
            }
        }
        if id == CKA_ALLOWED_MECHANISMS && value.len() % 4 != 0 {
            return Err(CKR_ATTRIBUTE_VALUE_INVALID)?;
        }
        match out.get_ptr(id) {
            Ok(prev) if prev == value => continue,
            Ok(_) => {
                error!("Inconsistent duplicates of {}", attr_name(id));
                return Err(CKR_TEMPLATE_INCONSISTENT)?;
            }
            Err(_) => out.add(id, value),
        }
    }

    let class = out.get_class();
    if out.has(CKA_CLASS) && !class_is_valid(class) {
        error!("Invalid class 0x{:x}", class);
        return Err(CKR_ATTRIBUTE_VALUE_INVALID)?;
    }
    if out.has(CKA_KEY_TYPE) && out.has(CKA_CLASS) && !class_is_key(class) {
        error!("Key type set on a {} object", class_name(class));
        return Err(CKR_TEMPLATE_INCONSISTENT)?;
    }
    Ok(out)
}

fn set_booleans(
    out: &mut Attributes,
    template: &Attributes,
    list: &[CK_ATTRIBUTE_TYPE],
) {
    for id in list {
        let value = if template.has(*id) {
            template.get_bool(*id)
        } else {
            boolean_default(*id)
        };
        out.add_bool(*id, value);
    }
}

fn set_mandated(
    out: &mut Attributes,
    template: &Attributes,
    list: &[CK_ATTRIBUTE_TYPE],
) -> Result<()> {
    for id in list {
        match template.get_ptr(*id) {
            Ok(value) => out.add(*id, value),
            /* fixed size attributes can't be faked with an empty value */
            Err(_) if attribute_fixed_size(*id) != 0 => {
                error!("Missing mandated attribute {}", attr_name(*id));
                return Err(CKR_TEMPLATE_INCOMPLETE)?;
            }
            Err(_) => out.add(*id, &[]),
        }
    }
    Ok(())
}

fn set_optional(
    out: &mut Attributes,
    template: &Attributes,
    list: &[CK_ATTRIBUTE_TYPE],
) {
    for id in list {
        if let Ok(value) = template.get_ptr(*id) {
            out.add(*id, value);
        }
    }
}

fn apply_class_template(
    out: &mut Attributes,
    template: &Attributes,
    class_template: &ClassTemplate,
) -> Result<()> {
    set_booleans(out, template, class_template.booleans);
    set_mandated(out, template, class_template.mandated)?;
    set_optional(out, template, class_template.optional);
    Ok(())
}

/// Fills in the attributes an imported template may legitimately leave
/// implicit: the length of a secret value and the size of an RSA
/// modulus.
fn complete_implicit_attributes(template: &mut Attributes) -> Result<()> {
    let class = template.get_class();
    let key_type = template.get_type();
    if class == CKO_SECRET_KEY {
        if let Ok(value) = template.get_ptr(CKA_VALUE) {
            let len = match key_type {
                CKK_GENERIC_SECRET => value.len() * 8,
                _ => value.len(),
            };
            let len = u32::try_from(len)?;
            match template.get_u32(CKA_VALUE_LEN) {
                Ok(l) if l == len => (),
                Ok(l) => {
                    error!("Value length {} does not match {}", l, len);
                    return Err(CKR_TEMPLATE_INCONSISTENT)?;
                }
                Err(_) => template.add_u32(CKA_VALUE_LEN, len),
            }
        }
    }
    if class == CKO_PUBLIC_KEY
        && key_type == CKK_RSA
        && !template.has(CKA_MODULUS_BITS)
    {
        if let Ok(modulus) = template.get_ptr(CKA_MODULUS) {
            let bits = BigUint::from_bytes_be(modulus).bits();
            template.add_u32(CKA_MODULUS_BITS, u32::try_from(bits)?);
        }
    }
    Ok(())
}

/// Assembles the attributes of a new object from a client template.
///
/// `function` is the processing creating the object and `parent` the
/// attributes of the key it is derived or copied from, if any.
pub fn create_attributes_from_template(
    template: &Attributes,
    function: ProcessingFunc,
    parent: Option<&Attributes>,
) -> Result<Attributes> {
    let mut template = sanitize_template(template)?;
    if function == ProcessingFunc::Import {
        complete_implicit_attributes(&mut template)?;
    }

    let class = template.get_class();
    if !template.has(CKA_CLASS) {
        error!("Template has no class");
        return Err(CKR_TEMPLATE_INCONSISTENT)?;
    }

    let mut out = Attributes::new();
    out.add_u32(CKA_CLASS, class);
    apply_class_template(&mut out, &template, &ANY_OBJECT)?;

    match class {
        CKO_DATA => apply_class_template(&mut out, &template, &RAW_DATA)?,
        CKO_SECRET_KEY | CKO_PUBLIC_KEY | CKO_PRIVATE_KEY => {
            if !template.has(CKA_KEY_TYPE) {
                error!("{} template has no key type", class_name(class));
                return Err(CKR_TEMPLATE_INCONSISTENT)?;
            }
            let key_type = template.get_type();
            out.add_u32(CKA_KEY_TYPE, key_type);
            apply_class_template(&mut out, &template, &ANY_KEY)?;
            match class {
                CKO_SECRET_KEY => {
                    if !key_type_is_symmetric(key_type) {
                        error!("{} is not a secret key type",
                               key_type_name(key_type));
                        return Err(CKR_TEMPLATE_INCONSISTENT)?;
                    }
                    apply_class_template(&mut out, &template, &SYMM_KEY)?;
                }
                CKO_PUBLIC_KEY => {
                    apply_class_template(&mut out, &template, &PUBLIC_KEY)?;
                    let specific = match key_type {
                        CKK_RSA => &RSA_PUBLIC_KEY,
                        CKK_EC => &EC_PUBLIC_KEY,
                        _ => return Err(CKR_TEMPLATE_INCONSISTENT)?,
                    };
                    apply_class_template(&mut out, &template, specific)?;
                }
                _ => {
                    apply_class_template(&mut out, &template, &PRIVATE_KEY)?;
                    let specific = match key_type {
                        CKK_RSA => &RSA_PRIVATE_KEY,
                        CKK_EC => &EC_PRIVATE_KEY,
                        _ => return Err(CKR_TEMPLATE_INCONSISTENT)?,
                    };
                    apply_class_template(&mut out, &template, specific)?;
                }
            }
        }
        _ => {
            error!("Cannot create a {} object", class_name(class));
            return Err(CKR_TEMPLATE_INCONSISTENT)?;
        }
    }

    let local = match function {
        ProcessingFunc::Generate | ProcessingFunc::GeneratePair => true,
        ProcessingFunc::Copy => parent.map_or(false, |p| p.get_bool(CKA_LOCAL)),
        _ => false,
    };
    out.add_bool(CKA_LOCAL, local);

    if class_is_key(class) {
        let sensitive = out.get_bool(CKA_SENSITIVE);
        let extractable = out.get_bool(CKA_EXTRACTABLE);
        let (always_sensitive, never_extractable) = match function {
            ProcessingFunc::Derive | ProcessingFunc::Copy => match parent {
                Some(p) => (
                    p.get_bool(CKA_ALWAYS_SENSITIVE) && sensitive,
                    p.get_bool(CKA_NEVER_EXTRACTABLE) && !extractable,
                ),
                None => (false, false),
            },
            ProcessingFunc::Generate | ProcessingFunc::GeneratePair => {
                (sensitive, !extractable)
            }
            _ => (false, false),
        };
        out.add_bool(CKA_ALWAYS_SENSITIVE, always_sensitive);
        out.add_bool(CKA_NEVER_EXTRACTABLE, never_extractable);
    }

    out.trace("[create] ");
    Ok(out)
}

fn check_attrs_misc_integrity(attrs: &Attributes) -> Result<()> {
    if attrs.get_bool(CKA_NEVER_EXTRACTABLE) && attrs.get_bool(CKA_EXTRACTABLE)
    {
        error!("Never extractable object is extractable");
        return Err(CKR_TEMPLATE_INCONSISTENT)?;
    }
    if attrs.get_bool(CKA_ALWAYS_SENSITIVE) && !attrs.get_bool(CKA_SENSITIVE) {
        error!("Always sensitive object is not sensitive");
        return Err(CKR_TEMPLATE_INCONSISTENT)?;
    }
    Ok(())
}

/// An object only readable once a user is logged in
pub fn object_is_private(attrs: &Attributes) -> bool {
    attrs.get_class() == CKO_PRIVATE_KEY || attrs.get_bool(CKA_PRIVATE)
}

/// Checks the session login state grants access to an object
pub fn check_access_attrs_against_token(
    login: LoginState,
    attrs: &Attributes,
) -> Result<()> {
    let private = match attrs.get_class() {
        CKO_SECRET_KEY | CKO_PUBLIC_KEY | CKO_DATA => {
            attrs.get_bool(CKA_PRIVATE)
        }
        CKO_PRIVATE_KEY => true,
        _ => return Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?,
    };
    if private && login == LoginState::Public {
        return Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?;
    }
    Ok(())
}

/// Checks the session may create an object with these attributes
pub fn check_created_attrs_against_token(
    login: LoginState,
    rw: bool,
    attrs: &Attributes,
) -> Result<()> {
    check_attrs_misc_integrity(attrs)?;
    if object_is_private(attrs) && login == LoginState::Public {
        debug!("Private object creation requires a login");
        return Err(CKR_USER_NOT_LOGGED_IN)?;
    }
    if attrs.get_bool(CKA_TRUSTED) && login != LoginState::SO {
        error!("Only the SO can create trusted objects");
        return Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?;
    }
    if attrs.get_bool(CKA_TOKEN) && !rw {
        return Err(CKR_SESSION_READ_ONLY)?;
    }
    Ok(())
}

/// Checks the attributes of an object match the processing creating it
pub fn check_created_attrs_against_processing(
    mechanism: CK_MECHANISM_TYPE,
    attrs: &Attributes,
) -> Result<()> {
    let local = attrs.get_bool(CKA_LOCAL);
    match mechanism {
        SKS_PROCESSING_IMPORT
        | CKM_ECDH1_DERIVE
        | CKM_ECDH1_COFACTOR_DERIVE
        | CKM_AES_ECB_ENCRYPT_DATA
        | CKM_AES_CBC_ENCRYPT_DATA => {
            if local {
                error!("{} cannot create a local key",
                       mechanism_name(mechanism));
                return Err(CKR_TEMPLATE_INCONSISTENT)?;
            }
        }
        CKM_GENERIC_SECRET_KEY_GEN
        | CKM_AES_KEY_GEN
        | CKM_EC_KEY_PAIR_GEN
        | CKM_RSA_PKCS_KEY_PAIR_GEN => {
            if !local {
                return Err(CKR_TEMPLATE_INCONSISTENT)?;
            }
        }
        _ => {
            error!("Processing {} cannot create objects",
                   mechanism_name(mechanism));
            return Err(CKR_MECHANISM_INVALID)?;
        }
    }

    let key_type = attrs.get_type();
    let expected = match mechanism {
        CKM_GENERIC_SECRET_KEY_GEN => Some(CKK_GENERIC_SECRET),
        CKM_AES_KEY_GEN => Some(CKK_AES),
        CKM_EC_KEY_PAIR_GEN => Some(CKK_EC),
        CKM_RSA_PKCS_KEY_PAIR_GEN => Some(CKK_RSA),
        _ => None,
    };
    if let Some(t) = expected {
        if key_type != t {
            error!(
                "{} cannot create a {} key",
                mechanism_name(mechanism),
                key_type_name(key_type)
            );
            return Err(CKR_TEMPLATE_INCONSISTENT)?;
        }
    }
    match mechanism {
        CKM_ECDH1_DERIVE
        | CKM_ECDH1_COFACTOR_DERIVE
        | CKM_AES_ECB_ENCRYPT_DATA
        | CKM_AES_CBC_ENCRYPT_DATA => {
            if attrs.get_class() != CKO_SECRET_KEY {
                return Err(CKR_TEMPLATE_INCONSISTENT)?;
            }
        }
        _ => (),
    }
    Ok(())
}

/// Size in bits of the named curve of an EC key
fn ec_params_bits(attrs: &Attributes) -> Result<u32> {
    let params = match attrs.get_ptr(CKA_EC_PARAMS) {
        Ok(p) => p,
        Err(_) => return Err(CKR_TEMPLATE_INCOMPLETE)?,
    };
    let oid = match asn1::parse_single::<asn1::ObjectIdentifier>(params) {
        Ok(o) => o,
        Err(_) => return Err(CKR_DOMAIN_PARAMS_INVALID)?,
    };
    for (curve, bits) in NAMED_CURVES {
        if oid == *curve {
            return Ok(*bits);
        }
    }
    error!("Unknown curve {:?}", oid);
    Err(CKR_CURVE_NOT_SUPPORTED)?
}

fn rsa_private_modulus_bits(attrs: &Attributes) -> Result<u32> {
    match attrs.get_ptr(CKA_MODULUS) {
        Ok(m) => Ok(u32::try_from(BigUint::from_bytes_be(m).bits())?),
        Err(_) => Err(CKR_TEMPLATE_INCOMPLETE)?,
    }
}

/// Checks the consistency of a created key, or of a created key pair,
/// including the key size range of its type.
pub fn check_created_attrs(
    key1: &Attributes,
    key2: Option<&Attributes>,
) -> Result<()> {
    let mut secret = None;
    let mut public = None;
    let mut private = None;

    for key in [Some(key1), key2].into_iter().flatten() {
        let slot = match key.get_class() {
            CKO_SECRET_KEY => &mut secret,
            CKO_PUBLIC_KEY => &mut public,
            CKO_PRIVATE_KEY => &mut private,
            _ => return Err(CKR_ATTRIBUTE_VALUE_INVALID)?,
        };
        if slot.is_some() {
            return Err(CKR_TEMPLATE_INCONSISTENT)?;
        }
        *slot = Some(key);
    }
    if key2.is_some() && secret.is_some() {
        return Err(CKR_TEMPLATE_INCONSISTENT)?;
    }
    if let (Some(pu), Some(pr)) = (public, private) {
        if pu.get_type() != pr.get_type() {
            error!("Key pair type mismatch");
            return Err(CKR_TEMPLATE_INCONSISTENT)?;
        }
    }

    let (key_type, key_length) = match secret {
        Some(s) => {
            let kt = s.get_type();
            if !key_type_is_symmetric(kt) {
                return Err(CKR_TEMPLATE_INCONSISTENT)?;
            }
            match s.get_u32(CKA_VALUE_LEN) {
                Ok(l) => (kt, l),
                Err(_) => {
                    error!("Secret key without value length");
                    return Err(CKR_TEMPLATE_INCOMPLETE)?;
                }
            }
        }
        None => {
            let kt = match public.or(private) {
                Some(k) => k.get_type(),
                None => return Err(CKR_TEMPLATE_INCONSISTENT)?,
            };
            match kt {
                CKK_EC => match public.or(private) {
                    Some(k) => (kt, ec_params_bits(k)?),
                    None => return Err(CKR_TEMPLATE_INCONSISTENT)?,
                },
                CKK_RSA => match public {
                    Some(pu) => match pu.get_u32(CKA_MODULUS_BITS) {
                        Ok(b) => (kt, b),
                        Err(_) => return Err(CKR_TEMPLATE_INCOMPLETE)?,
                    },
                    None => match private {
                        Some(pr) => (kt, rsa_private_modulus_bits(pr)?),
                        None => return Err(CKR_TEMPLATE_INCONSISTENT)?,
                    },
                },
                _ => return Err(CKR_TEMPLATE_INCONSISTENT)?,
            }
        }
    };

    match key_size_range(key_type) {
        Some((min, max)) if key_length >= min && key_length <= max => Ok(()),
        Some(_) => {
            error!(
                "{} key size {} out of range",
                key_type_name(key_type),
                key_length
            );
            Err(CKR_KEY_SIZE_RANGE)?
        }
        None => Err(CKR_TEMPLATE_INCONSISTENT)?,
    }
}

fn function_attribute(function: ProcessingFunc) -> Option<CK_ATTRIBUTE_TYPE> {
    match function {
        ProcessingFunc::Encrypt => Some(CKA_ENCRYPT),
        ProcessingFunc::Decrypt => Some(CKA_DECRYPT),
        ProcessingFunc::Sign => Some(CKA_SIGN),
        ProcessingFunc::Verify => Some(CKA_VERIFY),
        ProcessingFunc::Wrap => Some(CKA_WRAP),
        ProcessingFunc::Unwrap => Some(CKA_UNWRAP),
        ProcessingFunc::Derive => Some(CKA_DERIVE),
        _ => None,
    }
}

fn hmac_key_type(mechanism: CK_MECHANISM_TYPE) -> Option<CK_KEY_TYPE> {
    match mechanism {
        CKM_MD5_HMAC => Some(CKK_MD5_HMAC),
        CKM_SHA_1_HMAC => Some(CKK_SHA_1_HMAC),
        CKM_SHA224_HMAC => Some(CKK_SHA224_HMAC),
        CKM_SHA256_HMAC => Some(CKK_SHA256_HMAC),
        CKM_SHA384_HMAC => Some(CKK_SHA384_HMAC),
        CKM_SHA512_HMAC => Some(CKK_SHA512_HMAC),
        _ => None,
    }
}

/// Checks a key may be used as parent of a processing
pub fn check_parent_attrs_against_processing(
    mechanism: CK_MECHANISM_TYPE,
    function: ProcessingFunc,
    parent: &Attributes,
) -> Result<()> {
    match function_attribute(function) {
        Some(id) if parent.get_bool(id) => (),
        Some(id) => {
            debug!("{} not permitted", attr_name(id));
            return Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?;
        }
        None => return Err(CKR_GENERAL_ERROR)?,
    }

    let class = parent.get_class();
    let key_type = parent.get_type();
    let allowed = match mechanism {
        CKM_AES_ECB | CKM_AES_CBC | CKM_AES_CBC_PAD | CKM_AES_CTS
        | CKM_AES_CTR | CKM_AES_GCM | CKM_AES_CCM | CKM_AES_GMAC
        | CKM_AES_CMAC | CKM_AES_CMAC_GENERAL | CKM_AES_XCBC_MAC
        | CKM_AES_ECB_ENCRYPT_DATA | CKM_AES_CBC_ENCRYPT_DATA => {
            class == CKO_SECRET_KEY && key_type == CKK_AES
        }
        CKM_MD5_HMAC | CKM_SHA_1_HMAC | CKM_SHA224_HMAC | CKM_SHA256_HMAC
        | CKM_SHA384_HMAC | CKM_SHA512_HMAC => {
            class == CKO_SECRET_KEY
                && (key_type == CKK_GENERIC_SECRET
                    || Some(key_type) == hmac_key_type(mechanism))
        }
        CKM_ECDSA | CKM_ECDSA_SHA1 | CKM_ECDSA_SHA224 | CKM_ECDSA_SHA256
        | CKM_ECDSA_SHA384 | CKM_ECDSA_SHA512 | CKM_ECDH1_DERIVE
        | CKM_ECDH1_COFACTOR_DERIVE | CKM_ECMQV_DERIVE
        | CKM_ECDH_AES_KEY_WRAP => {
            key_type == CKK_EC
                && (class == CKO_PUBLIC_KEY || class == CKO_PRIVATE_KEY)
        }
        CKM_RSA_PKCS | CKM_RSA_9796 | CKM_RSA_X_509 | CKM_SHA1_RSA_PKCS
        | CKM_RSA_PKCS_OAEP | CKM_SHA1_RSA_PKCS_PSS | CKM_SHA256_RSA_PKCS
        | CKM_SHA384_RSA_PKCS | CKM_SHA512_RSA_PKCS
        | CKM_SHA256_RSA_PKCS_PSS | CKM_SHA384_RSA_PKCS_PSS
        | CKM_SHA512_RSA_PKCS_PSS | CKM_SHA224_RSA_PKCS
        | CKM_SHA224_RSA_PKCS_PSS | CKM_RSA_AES_KEY_WRAP
        | CKM_RSA_PKCS_PSS => {
            key_type == CKK_RSA
                && (class == CKO_PUBLIC_KEY || class == CKO_PRIVATE_KEY)
        }
        _ => {
            error!("Invalid processing {}", mechanism_name(mechanism));
            return Err(CKR_MECHANISM_INVALID)?;
        }
    };
    if !allowed {
        error!(
            "{} invalid key {}/{}",
            mechanism_name(mechanism),
            class_name(class),
            key_type_name(key_type)
        );
        return Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?;
    }

    if let Ok(list) = parent.get_ptr(CKA_ALLOWED_MECHANISMS) {
        let found = list
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .any(|m| m == mechanism);
        if !found {
            debug!("{} not in allowed mechanisms", mechanism_name(mechanism));
            return Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?;
        }
    }
    Ok(())
}

/// Gives both objects of a key pair the same `CKA_ID`, generating a
/// random one if neither has it.
pub fn add_missing_attribute_id(
    attrs1: &mut Attributes,
    attrs2: Option<&mut Attributes>,
) -> Result<()> {
    let id1 = attrs1.get_ptr(CKA_ID).ok().map(|v| v.to_vec());
    match attrs2 {
        Some(attrs2) => {
            let id2 = attrs2.get_ptr(CKA_ID).ok().map(|v| v.to_vec());
            match (id1, id2) {
                (Some(_), Some(_)) => (),
                (Some(id), None) => attrs2.add(CKA_ID, &id),
                (None, Some(id)) => attrs1.add(CKA_ID, &id),
                (None, None) => {
                    let mut id = [0u8; ID_SIZE];
                    get_random_data(&mut id)?;
                    attrs1.add(CKA_ID, &id);
                    attrs2.add(CKA_ID, &id);
                }
            }
        }
        None => {
            if id1.is_none() {
                let mut id = [0u8; ID_SIZE];
                get_random_data(&mut id)?;
                attrs1.add(CKA_ID, &id);
            }
        }
    }
    Ok(())
}

/// Whether an attribute value may be revealed to the client
pub fn attribute_is_exportable(
    id: CK_ATTRIBUTE_TYPE,
    attrs: &Attributes,
) -> bool {
    let hidden = match id {
        CKA_PRIVATE_EXPONENT | CKA_PRIME_1 | CKA_PRIME_2 | CKA_EXPONENT_1
        | CKA_EXPONENT_2 | CKA_COEFFICIENT => true,
        CKA_VALUE => matches!(
            attrs.get_class(),
            CKO_SECRET_KEY | CKO_PRIVATE_KEY
        ),
        _ => false,
    };
    if !hidden {
        return true;
    }
    attrs.get_bool(CKA_EXTRACTABLE) && !attrs.get_bool(CKA_SENSITIVE)
}
