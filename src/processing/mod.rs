// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Cryptographic processings.
//!
//! A session runs at most one processing at a time. The processing is
//! set up by an init command and driven by update, final or one-shot
//! commands. Each step runs on a copy of the operation state and the
//! copy only replaces the original once the step succeeded, so a
//! caller probing the output size keeps its processing intact.

use std::fmt::Debug;

use crate::attribute::Attributes;
use crate::entry::Output;
use crate::error::Result;
use crate::helpers::*;
use crate::object::{create_object, release_object, session_object};
use crate::pkcs11::*;
use crate::policy::*;
use crate::serializer::{MechanismParams, SerialArgs};
use crate::session::Session;
use crate::ta::{ClientId, Ta};
use crate::token::Token;

use constant_time_eq::constant_time_eq;

pub mod asymm;
pub mod symm;

use asymm::BackendKey;

/// The state of a running cryptographic operation
pub(crate) trait MechOperation: Debug {
    /// Feeds data, returns the output that became available
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>>;

    /// Completes the operation and returns the remaining output
    fn finalize(&mut self) -> Result<Vec<u8>>;

    /// Completes a verification against the provided signature
    fn verify_final(&mut self, signature: &[u8]) -> Result<()> {
        let computed = self.finalize()?;
        if !constant_time_eq(&computed, signature) {
            return Err(CKR_SIGNATURE_INVALID)?;
        }
        Ok(())
    }
}

/// Incremental message digest used by the hash-then-sign mechanisms
#[derive(Clone)]
pub(crate) enum HashState {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl HashState {
    /// Builds a digest from a hash mechanism identifier
    pub fn new(hash: CK_MECHANISM_TYPE) -> Result<HashState> {
        use digest::Digest;
        Ok(match hash {
            CKM_MD5 => HashState::Md5(md5::Md5::new()),
            CKM_SHA_1 => HashState::Sha1(sha1::Sha1::new()),
            CKM_SHA224 => HashState::Sha224(sha2::Sha224::new()),
            CKM_SHA256 => HashState::Sha256(sha2::Sha256::new()),
            CKM_SHA384 => HashState::Sha384(sha2::Sha384::new()),
            CKM_SHA512 => HashState::Sha512(sha2::Sha512::new()),
            _ => return Err(CKR_MECHANISM_PARAM_INVALID)?,
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        match self {
            HashState::Md5(h) => h.update(data),
            HashState::Sha1(h) => h.update(data),
            HashState::Sha224(h) => h.update(data),
            HashState::Sha256(h) => h.update(data),
            HashState::Sha384(h) => h.update(data),
            HashState::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        use digest::Digest;
        match self {
            HashState::Md5(h) => h.finalize().to_vec(),
            HashState::Sha1(h) => h.finalize().to_vec(),
            HashState::Sha224(h) => h.finalize().to_vec(),
            HashState::Sha256(h) => h.finalize().to_vec(),
            HashState::Sha384(h) => h.finalize().to_vec(),
            HashState::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

impl Debug for HashState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HashState::Md5(_) => "md5",
            HashState::Sha1(_) => "sha1",
            HashState::Sha224(_) => "sha224",
            HashState::Sha256(_) => "sha256",
            HashState::Sha384(_) => "sha384",
            HashState::Sha512(_) => "sha512",
        };
        f.debug_tuple("HashState").field(&name).finish()
    }
}

/// Byte size of the digest of a hash mechanism
pub(crate) fn hash_size(hash: CK_MECHANISM_TYPE) -> Result<usize> {
    Ok(match hash {
        CKM_MD5 => 16,
        CKM_SHA_1 => 20,
        CKM_SHA224 => 28,
        CKM_SHA256 => 32,
        CKM_SHA384 => 48,
        CKM_SHA512 => 64,
        _ => return Err(CKR_MECHANISM_PARAM_INVALID)?,
    })
}

#[derive(Clone, Debug)]
enum Operation {
    Cipher(symm::CipherOperation),
    Aead(symm::AeadOperation),
    Mac(symm::MacOperation),
    Rsa(asymm::RsaOperation),
    Ecdsa(asymm::EcdsaOperation),
}

impl Operation {
    fn new(
        function: ProcessingFunc,
        mechanism: &MechanismParams,
        key: BackendKey,
    ) -> Result<Operation> {
        Ok(match mechanism.id {
            CKM_AES_ECB | CKM_AES_CBC | CKM_AES_CBC_PAD | CKM_AES_CTS
            | CKM_AES_CTR => Operation::Cipher(symm::CipherOperation::new(
                function,
                mechanism,
                &key.secret()?,
            )?),
            CKM_AES_GCM | CKM_AES_CCM => Operation::Aead(
                symm::AeadOperation::new(function, mechanism, &key.secret()?)?,
            ),
            CKM_AES_GMAC | CKM_AES_CMAC | CKM_AES_CMAC_GENERAL
            | CKM_AES_XCBC_MAC | CKM_MD5_HMAC | CKM_SHA_1_HMAC
            | CKM_SHA224_HMAC | CKM_SHA256_HMAC | CKM_SHA384_HMAC
            | CKM_SHA512_HMAC => Operation::Mac(symm::MacOperation::new(
                mechanism,
                &key.secret()?,
            )?),
            CKM_RSA_PKCS | CKM_RSA_X_509 | CKM_RSA_PKCS_OAEP
            | CKM_RSA_PKCS_PSS | CKM_SHA1_RSA_PKCS | CKM_SHA224_RSA_PKCS
            | CKM_SHA256_RSA_PKCS | CKM_SHA384_RSA_PKCS
            | CKM_SHA512_RSA_PKCS | CKM_SHA1_RSA_PKCS_PSS
            | CKM_SHA224_RSA_PKCS_PSS | CKM_SHA256_RSA_PKCS_PSS
            | CKM_SHA384_RSA_PKCS_PSS | CKM_SHA512_RSA_PKCS_PSS => {
                Operation::Rsa(asymm::RsaOperation::new(
                    function, mechanism, key,
                )?)
            }
            CKM_ECDSA | CKM_ECDSA_SHA1 | CKM_ECDSA_SHA224
            | CKM_ECDSA_SHA256 | CKM_ECDSA_SHA384 | CKM_ECDSA_SHA512 => {
                Operation::Ecdsa(asymm::EcdsaOperation::new(
                    function, mechanism, key,
                )?)
            }
            _ => return Err(CKR_MECHANISM_INVALID)?,
        })
    }

    fn inner(&mut self) -> &mut dyn MechOperation {
        match self {
            Operation::Cipher(op) => op,
            Operation::Aead(op) => op,
            Operation::Mac(op) => op,
            Operation::Rsa(op) => op,
            Operation::Ecdsa(op) => op,
        }
    }
}

/// The active processing of a session
#[derive(Debug)]
pub struct Processing {
    function: ProcessingFunc,
    mechanism: CK_MECHANISM_TYPE,
    /// The key requires a context specific login before each step
    pub always_authen: bool,
    pub relogged: bool,
    /// The key is a private object, the processing ends on logout
    pub private: bool,
    updated: bool,
    op: Operation,
}

fn init_function(cmd: u32) -> Result<ProcessingFunc> {
    Ok(match cmd {
        SKS_CMD_ENCRYPT_INIT => ProcessingFunc::Encrypt,
        SKS_CMD_DECRYPT_INIT => ProcessingFunc::Decrypt,
        SKS_CMD_SIGN_INIT => ProcessingFunc::Sign,
        SKS_CMD_VERIFY_INIT => ProcessingFunc::Verify,
        _ => return Err(CKR_GENERAL_ERROR)?,
    })
}

fn step_function(cmd: u32) -> Result<(ProcessingFunc, ProcessingStep)> {
    use ProcessingFunc::*;
    use ProcessingStep::*;
    Ok(match cmd {
        SKS_CMD_ENCRYPT_UPDATE => (Encrypt, Update),
        SKS_CMD_ENCRYPT_FINAL => (Encrypt, Final),
        SKS_CMD_ENCRYPT_ONESHOT => (Encrypt, Oneshot),
        SKS_CMD_DECRYPT_UPDATE => (Decrypt, Update),
        SKS_CMD_DECRYPT_FINAL => (Decrypt, Final),
        SKS_CMD_DECRYPT_ONESHOT => (Decrypt, Oneshot),
        SKS_CMD_SIGN_UPDATE => (Sign, Update),
        SKS_CMD_SIGN_FINAL => (Sign, Final),
        SKS_CMD_SIGN_ONESHOT => (Sign, Oneshot),
        SKS_CMD_VERIFY_UPDATE => (Verify, Update),
        SKS_CMD_VERIFY_FINAL => (Verify, Final),
        SKS_CMD_VERIFY_ONESHOT => (Verify, Oneshot),
        _ => return Err(CKR_GENERAL_ERROR)?,
    })
}

/// Screens a mechanism requested for a function
fn check_mechanism(
    mechanism: CK_MECHANISM_TYPE,
    function: ProcessingFunc,
) -> Result<()> {
    if !mechanism_is_supported(mechanism) {
        debug!("Unsupported mechanism 0x{:x}", mechanism);
        return Err(CKR_MECHANISM_INVALID)?;
    }
    if check_mechanism_flags(mechanism, function_to_flag(function)) != 0 {
        return Err(CKR_MECHANISM_INVALID)?;
    }
    Ok(())
}

/// Resolves the key handle of a processing and checks it may be used
/// for it. Returns the key attributes and its backend key.
fn parent_key(
    token: &mut Token,
    session: &mut Session,
    handle: CK_OBJECT_HANDLE,
    mechanism: CK_MECHANISM_TYPE,
    function: ProcessingFunc,
) -> Result<(Attributes, BackendKey)> {
    let login = token.login;
    let object = match session_object(token, session, handle) {
        Ok((_, o)) => o,
        Err(e) if e.rv() == CKR_OBJECT_HANDLE_INVALID => {
            return Err(CKR_KEY_HANDLE_INVALID)?
        }
        Err(e) => return Err(e),
    };
    let attrs = match object.attributes() {
        Some(a) => a.clone(),
        None => return Err(CKR_GENERAL_ERROR)?,
    };
    check_parent_attrs_against_processing(mechanism, function, &attrs)?;
    check_access_attrs_against_token(login, &attrs)?;
    let key = object.backend_key()?;
    Ok((attrs, key))
}

/// Stores a derived secret in a new key, sizing it after `CKA_VALUE_LEN`
/// when the template sets it.
fn set_derived_value(attrs: &mut Attributes, value: &[u8]) -> Result<()> {
    if attrs.has(CKA_VALUE) {
        error!("Derived key template sets a value");
        return Err(CKR_TEMPLATE_INCONSISTENT)?;
    }
    let key_type = attrs.get_type();
    let bytes = match attrs.get_u32(CKA_VALUE_LEN) {
        Ok(len) => secret_value_bytes(key_type, len),
        Err(_) => {
            let len = match key_type {
                CKK_GENERIC_SECRET => value.len() * 8,
                _ => value.len(),
            };
            attrs.add_u32(CKA_VALUE_LEN, u32::try_from(len)?);
            value.len()
        }
    };
    if bytes > value.len() {
        error!("Derived {} bytes, {} requested", value.len(), bytes);
        return Err(CKR_KEY_SIZE_RANGE)?;
    }
    attrs.add(CKA_VALUE, &value[..bytes]);
    Ok(())
}

fn default_class_and_type(
    template: &mut Attributes,
    class: CK_OBJECT_CLASS,
    key_type: CK_KEY_TYPE,
) {
    if !template.has(CKA_CLASS) {
        template.add_u32(CKA_CLASS, class);
    }
    if !template.has(CKA_KEY_TYPE) {
        template.add_u32(CKA_KEY_TYPE, key_type);
    }
}

impl Ta {
    pub(crate) fn entry_processing_init(
        &mut self,
        client: ClientId,
        cmd: u32,
        ctrl: &[u8],
    ) -> Result<()> {
        let function = init_function(cmd)?;
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let key_handle = args.get_u32()?;
        let mechanism = args.alloc_get_one_attribute()?;
        args.check_consumed()?;

        let (token, session) = self.session_mut(client, handle)?;
        session.check_idle()?;
        check_mechanism(mechanism.id, function)?;

        let (attrs, key) =
            parent_key(token, session, key_handle, mechanism.id, function)?;
        let op = Operation::new(function, &mechanism, key)?;
        session.processing = Some(Processing {
            function: function,
            mechanism: mechanism.id,
            always_authen: attrs.get_bool(CKA_ALWAYS_AUTHENTICATE),
            relogged: false,
            private: object_is_private(&attrs),
            updated: false,
            op: op,
        });
        debug!(
            "Session {}: {:?} {} initialized",
            handle,
            function,
            mechanism_name(mechanism.id)
        );
        Ok(())
    }

    pub(crate) fn entry_processing_step(
        &mut self,
        client: ClientId,
        cmd: u32,
        ctrl: &[u8],
        input: Option<&[u8]>,
        output: &mut Output,
    ) -> Result<()> {
        let (function, step) = step_function(cmd)?;
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        args.check_consumed()?;

        let (_, session) = self.session_mut(client, handle)?;
        let processing = match &mut session.processing {
            Some(p) if p.function == function => p,
            _ => return Err(CKR_OPERATION_NOT_INITIALIZED)?,
        };
        if processing.always_authen && !processing.relogged {
            debug!("Key requires a context specific login");
            return Err(CKR_USER_NOT_LOGGED_IN)?;
        }

        match run_step(processing, step, input.unwrap_or(&[]), output) {
            Ok(Some(op)) => {
                processing.op = op;
                processing.updated = true;
                processing.relogged = false;
                Ok(())
            }
            Ok(None) => {
                session.processing = None;
                Ok(())
            }
            Err(e) => {
                if e.rv() != CKR_BUFFER_TOO_SMALL {
                    session.processing = None;
                }
                Err(e)
            }
        }
    }

    pub(crate) fn entry_generate_key(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let mechanism = args.alloc_get_one_attribute()?;
        let mut template = args.alloc_get_attributes()?;
        args.check_consumed()?;
        if out.capacity() != 4 {
            return Err(CKR_ARGUMENTS_BAD)?;
        }

        let (token, session) = self.session_mut(client, handle)?;
        session.check_idle()?;
        check_mechanism(mechanism.id, ProcessingFunc::Generate)?;
        if !mechanism.params.is_empty() {
            return Err(CKR_MECHANISM_PARAM_INVALID)?;
        }
        let key_type = match mechanism.id {
            CKM_AES_KEY_GEN => CKK_AES,
            CKM_GENERIC_SECRET_KEY_GEN => CKK_GENERIC_SECRET,
            _ => return Err(CKR_MECHANISM_INVALID)?,
        };
        default_class_and_type(&mut template, CKO_SECRET_KEY, key_type);

        let mut attrs = create_attributes_from_template(
            &template,
            ProcessingFunc::Generate,
            None,
        )?;
        check_created_attrs(&attrs, None)?;
        check_created_attrs_against_processing(mechanism.id, &attrs)?;
        check_created_attrs_against_token(
            token.login,
            session.is_rw(),
            &attrs,
        )?;
        symm::generate_key(&mut attrs)?;

        let obj = create_object(token, session, attrs)?;
        out.write_exact(&obj.to_le_bytes())
    }

    pub(crate) fn entry_generate_key_pair(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let mechanism = args.alloc_get_one_attribute()?;
        let mut pub_template = args.alloc_get_attributes()?;
        let mut priv_template = args.alloc_get_attributes()?;
        args.check_consumed()?;
        if out.capacity() != 8 {
            return Err(CKR_ARGUMENTS_BAD)?;
        }

        let (token, session) = self.session_mut(client, handle)?;
        session.check_idle()?;
        check_mechanism(mechanism.id, ProcessingFunc::GeneratePair)?;
        if !mechanism.params.is_empty() {
            return Err(CKR_MECHANISM_PARAM_INVALID)?;
        }
        let key_type = match mechanism.id {
            CKM_EC_KEY_PAIR_GEN => CKK_EC,
            CKM_RSA_PKCS_KEY_PAIR_GEN => CKK_RSA,
            _ => return Err(CKR_MECHANISM_INVALID)?,
        };
        default_class_and_type(&mut pub_template, CKO_PUBLIC_KEY, key_type);
        default_class_and_type(&mut priv_template, CKO_PRIVATE_KEY, key_type);
        if key_type == CKK_EC && !priv_template.has(CKA_EC_PARAMS) {
            if let Ok(params) = pub_template.get_ptr(CKA_EC_PARAMS) {
                let params = params.to_vec();
                priv_template.add(CKA_EC_PARAMS, &params);
            }
        }

        let mut pub_attrs = create_attributes_from_template(
            &pub_template,
            ProcessingFunc::GeneratePair,
            None,
        )?;
        let mut priv_attrs = create_attributes_from_template(
            &priv_template,
            ProcessingFunc::GeneratePair,
            None,
        )?;
        check_created_attrs(&pub_attrs, Some(&priv_attrs))?;
        check_created_attrs_against_processing(mechanism.id, &pub_attrs)?;
        check_created_attrs_against_processing(mechanism.id, &priv_attrs)?;
        let rw = session.is_rw();
        check_created_attrs_against_token(token.login, rw, &pub_attrs)?;
        check_created_attrs_against_token(token.login, rw, &priv_attrs)?;
        add_missing_attribute_id(&mut pub_attrs, Some(&mut priv_attrs))?;

        asymm::generate_key_pair(&mut pub_attrs, &mut priv_attrs)?;

        let pub_handle = create_object(token, session, pub_attrs)?;
        let priv_handle = match create_object(token, session, priv_attrs) {
            Ok(h) => h,
            Err(e) => {
                release_object(token, session, pub_handle);
                return Err(e);
            }
        };
        let mut handles = [0u8; 8];
        handles[..4].copy_from_slice(&pub_handle.to_le_bytes());
        handles[4..].copy_from_slice(&priv_handle.to_le_bytes());
        if let Err(e) = out.write_exact(&handles) {
            release_object(token, session, priv_handle);
            release_object(token, session, pub_handle);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn entry_derive_key(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let mechanism = args.alloc_get_one_attribute()?;
        let parent_handle = args.get_u32()?;
        let mut template = args.alloc_get_attributes()?;
        args.check_consumed()?;
        if out.capacity() != 4 {
            return Err(CKR_ARGUMENTS_BAD)?;
        }

        let (token, session) = self.session_mut(client, handle)?;
        session.check_idle()?;
        check_mechanism(mechanism.id, ProcessingFunc::Derive)?;
        let (parent, key) = parent_key(
            token,
            session,
            parent_handle,
            mechanism.id,
            ProcessingFunc::Derive,
        )?;

        default_class_and_type(
            &mut template,
            CKO_SECRET_KEY,
            CKK_GENERIC_SECRET,
        );
        let mut attrs = create_attributes_from_template(
            &template,
            ProcessingFunc::Derive,
            Some(&parent),
        )?;
        check_created_attrs_against_processing(mechanism.id, &attrs)?;
        check_created_attrs_against_token(
            token.login,
            session.is_rw(),
            &attrs,
        )?;

        let value = match mechanism.id {
            CKM_ECDH1_DERIVE | CKM_ECDH1_COFACTOR_DERIVE => {
                asymm::ecdh_derive(&mechanism.params, &key)?
            }
            CKM_AES_ECB_ENCRYPT_DATA | CKM_AES_CBC_ENCRYPT_DATA => {
                symm::encrypt_data_derive(&mechanism, &key.secret()?)?
            }
            _ => return Err(CKR_MECHANISM_INVALID)?,
        };
        set_derived_value(&mut attrs, &value)?;
        check_created_attrs(&attrs, None)?;

        let obj = create_object(token, session, attrs)?;
        out.write_exact(&obj.to_le_bytes())
    }
}

/// Runs one step on a copy of the processing state.
///
/// Returns the updated state when the processing continues, `None`
/// when the step terminated it.
fn run_step(
    processing: &Processing,
    step: ProcessingStep,
    input: &[u8],
    output: &mut Output,
) -> Result<Option<Operation>> {
    let one_shot = mechanism_is_one_shot(processing.mechanism);
    match step {
        ProcessingStep::Update if one_shot => {
            error!(
                "{} does not support multi part processing",
                mechanism_name(processing.mechanism)
            );
            return Err(CKR_KEY_FUNCTION_NOT_PERMITTED)?;
        }
        ProcessingStep::Oneshot if processing.updated => {
            return Err(CKR_OPERATION_ACTIVE)?;
        }
        _ => (),
    }

    let mut op = processing.op.clone();
    let verify = processing.function == ProcessingFunc::Verify;
    match step {
        ProcessingStep::Update => {
            let data = op.inner().update(input)?;
            if !verify && output.is_present() {
                output.write(&data)?;
            } else if !data.is_empty() {
                return Err(CKR_ARGUMENTS_BAD)?;
            }
            Ok(Some(op))
        }
        ProcessingStep::Oneshot | ProcessingStep::Final => {
            let mut data = match step {
                ProcessingStep::Oneshot => op.inner().update(input)?,
                _ => Vec::new(),
            };
            if verify {
                let signature = match step {
                    ProcessingStep::Oneshot => output.input(),
                    _ => output.input().or(Some(input)),
                };
                let signature = match signature {
                    Some(s) => s.to_vec(),
                    None => return Err(CKR_ARGUMENTS_BAD)?,
                };
                op.inner().verify_final(&signature)?;
            } else {
                data.extend_from_slice(&op.inner().finalize()?);
                output.write(&data)?;
            }
            Ok(None)
        }
        ProcessingStep::Init => Err(CKR_GENERAL_ERROR)?,
    }
}
