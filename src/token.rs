// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use std::collections::BTreeMap;

use crate::entry::Output;
use crate::error::Result;
use crate::helpers::*;
use crate::object::{Object, ObjectId};
use crate::persistent::{PersistentDb, PinState, PinUser};
use crate::pkcs11::*;
use crate::policy::object_is_private;
use crate::serializer::{SerialArgs, Serializer};
use crate::session::{LoginState, ObjRef};
use crate::ta::{ClientId, Ta};

const USER_PIN_FLAGS: CK_FLAGS = CKF_USER_PIN_INITIALIZED
    | CKF_USER_PIN_COUNT_LOW
    | CKF_USER_PIN_FINAL_TRY
    | CKF_USER_PIN_LOCKED
    | CKF_USER_PIN_TO_BE_CHANGED;

/// A token with its persistent database and the objects loaded from it
#[derive(Debug)]
pub struct Token {
    id: CK_SLOT_ID,
    pub(crate) db: PersistentDb,
    pub(crate) login: LoginState,
    session_count: u32,
    rw_session_count: u32,
    objects: BTreeMap<ObjectId, Object>,
    next_object: ObjectId,
}

impl Token {
    /// Builds a token from its database. Persistent objects are
    /// registered as empty shells, their attributes are read on demand.
    pub fn new(id: CK_SLOT_ID, db: PersistentDb) -> Token {
        let mut token = Token {
            id: id,
            db: db,
            login: LoginState::Public,
            session_count: 0,
            rw_session_count: 0,
            objects: BTreeMap::new(),
            next_object: 0,
        };
        let uuids = token.db.objects().to_vec();
        for uuid in uuids {
            token.insert_object(Object::persistent(uuid));
        }
        token
    }

    pub fn id(&self) -> CK_SLOT_ID {
        self.id
    }

    pub fn flags(&self) -> CK_FLAGS {
        self.db.flags()
    }

    pub fn is_initialized(&self) -> bool {
        self.db.flags() & CKF_TOKEN_INITIALIZED != 0
    }

    pub fn session_count(&self) -> u32 {
        self.session_count
    }

    pub fn rw_session_count(&self) -> u32 {
        self.rw_session_count
    }

    pub fn insert_object(&mut self, object: Object) -> ObjectId {
        let id = self.next_object;
        self.next_object += 1;
        self.objects.insert(id, object);
        id
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<Object> {
        self.objects.remove(&id)
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// Attributes of a token object, read from storage if needed
    pub fn load_object(&mut self, id: ObjectId) -> Result<&mut Object> {
        let object = match self.objects.get_mut(&id) {
            Some(o) => o,
            None => return Err(CKR_OBJECT_HANDLE_INVALID)?,
        };
        object.load(&self.db)?;
        Ok(object)
    }

    fn check_pin_len(&self, pin: &[u8], min: usize) -> Result<()> {
        if pin.len() < min || pin.len() > SKS_TOKEN_PIN_SIZE_MAX {
            error!("Token {}: PIN length {} out of range", self.id, pin.len());
            return Err(CKR_PIN_LEN_RANGE)?;
        }
        Ok(())
    }

    /// Stores a new PIN checking the token and session allow it
    fn set_pin(
        &mut self,
        user: PinUser,
        pin: &[u8],
        rw: bool,
        min: usize,
    ) -> Result<()> {
        if self.flags() & CKF_WRITE_PROTECTED != 0 {
            return Err(CKR_TOKEN_WRITE_PROTECTED)?;
        }
        if !rw {
            return Err(CKR_SESSION_READ_ONLY)?;
        }
        self.check_pin_len(pin, min)?;
        self.db.set_pin(user, pin)
    }

    fn serialize_info(&self, ta: &Ta) -> Vec<u8> {
        let conf = &ta.config;
        let mut s = Serializer::new();
        s.put_padded(&self.db.main().label, SKS_TOKEN_LABEL_SIZE)
            .put_padded(
                conf.token_manufacturer(self.id).as_bytes(),
                SKS_TOKEN_MANUFACTURER_SIZE,
            )
            .put_padded(conf.token_model(self.id).as_bytes(), SKS_TOKEN_MODEL_SIZE)
            .put_padded(
                conf.token_serial(self.id).as_bytes(),
                SKS_TOKEN_SERIALNUM_SIZE,
            )
            .put_u32(self.flags())
            .put_u32(CK_UNAVAILABLE_INFORMATION)
            .put_u32(self.session_count)
            .put_u32(CK_UNAVAILABLE_INFORMATION)
            .put_u32(self.rw_session_count)
            .put_u32(SKS_TOKEN_PIN_SIZE_MAX as u32)
            .put_u32(conf.pin_min_len as u32)
            .put_u32(CK_UNAVAILABLE_INFORMATION)
            .put_u32(CK_UNAVAILABLE_INFORMATION)
            .put_u32(CK_UNAVAILABLE_INFORMATION)
            .put_u32(CK_UNAVAILABLE_INFORMATION)
            .put_u8(0)
            .put_u8(0)
            .put_u8(SKS_VERSION_MAJOR as u8)
            .put_u8(SKS_VERSION_MINOR as u8)
            .put_padded(b"", 16);
        s.finish()
    }
}

fn get_pin<'a>(args: &mut SerialArgs<'a>, size: u32) -> Result<&'a [u8]> {
    args.get_ptr(size as usize)
}

impl Ta {
    pub(crate) fn entry_ping(
        &mut self,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        SerialArgs::new(ctrl).check_consumed()?;
        if out.is_present() {
            let mut s = Serializer::new();
            s.put_u32(SKS_VERSION_MAJOR)
                .put_u32(SKS_VERSION_MINOR)
                .put_u32(SKS_VERSION_PATCH);
            out.write(&s.finish())?;
        }
        Ok(())
    }

    pub(crate) fn entry_slot_list(
        &mut self,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        SerialArgs::new(ctrl).check_consumed()?;
        let mut s = Serializer::new();
        for token in &self.tokens {
            s.put_u32(token.id());
        }
        out.write(&s.finish())
    }

    pub(crate) fn entry_slot_info(
        &mut self,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let slot = args.get_u32()?;
        args.check_consumed()?;
        self.token(slot)?;

        let mut s = Serializer::new();
        s.put_padded(
            self.config.slot_description(slot).as_bytes(),
            SKS_SLOT_DESC_SIZE,
        )
        .put_padded(
            self.config.slot_manufacturer(slot).as_bytes(),
            SKS_SLOT_MANUFACTURER_SIZE,
        )
        .put_u32(CKF_TOKEN_PRESENT)
        .put_u8(0)
        .put_u8(0)
        .put_u8(SKS_VERSION_MAJOR as u8)
        .put_u8(SKS_VERSION_MINOR as u8);
        out.write(&s.finish())
    }

    pub(crate) fn entry_token_info(
        &mut self,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let slot = args.get_u32()?;
        args.check_consumed()?;
        let info = self.token(slot)?.serialize_info(self);
        out.write(&info)
    }

    pub(crate) fn entry_mechanism_ids(
        &mut self,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let slot = args.get_u32()?;
        args.check_consumed()?;
        self.token(slot)?;

        let mut s = Serializer::new();
        for mech in supported_mechanisms() {
            s.put_u32(mech);
        }
        out.write(&s.finish())
    }

    pub(crate) fn entry_mechanism_info(
        &mut self,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let slot = args.get_u32()?;
        let mech = args.get_u32()?;
        args.check_consumed()?;
        self.token(slot)?;

        if !mechanism_is_supported(mech) {
            debug!("Mechanism 0x{:x} not supported", mech);
            return Err(CKR_MECHANISM_INVALID)?;
        }
        let (min, max) = mechanism_key_size(mech);
        let mut s = Serializer::new();
        s.put_u32(min)
            .put_u32(max)
            .put_u32(mechanism_supported_flags(mech));
        out.write(&s.finish())
    }

    pub(crate) fn entry_init_token(&mut self, ctrl: &[u8]) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let slot = args.get_u32()?;
        let pin_size = args.get_u32()?;
        let label = args.get_ptr(SKS_TOKEN_LABEL_SIZE)?;
        let pin = get_pin(&mut args, pin_size)?;
        args.check_consumed()?;

        let min = self.config.pin_min_len;
        if self.token(slot)?.flags() & CKF_SO_PIN_LOCKED != 0 {
            error!("Token {}: SO PIN locked", slot);
            return Err(CKR_PIN_LOCKED)?;
        }
        /* sessions of any client on any token block initialization */
        if self.clients.values().any(|c| c.sessions().next().is_some()) {
            error!("Token {}: sessions exist", slot);
            return Err(CKR_SESSION_EXISTS)?;
        }

        let token = self.token_mut(slot)?;
        token.check_pin_len(pin, min)?;
        if token.db.main().so.size == 0 {
            info!("Token {}: first initialization", slot);
            token.db.set_pin(PinUser::SO, pin)?;
        } else if !token.db.verify_pin(PinUser::SO, pin)? {
            if token.flags() & CKF_SO_PIN_LOCKED != 0 {
                return Err(CKR_PIN_LOCKED)?;
            }
            return Err(CKR_PIN_INCORRECT)?;
        }

        token.destroy_all_objects();

        let main = token.db.main_mut();
        main.label.copy_from_slice(label);
        main.flags |= CKF_TOKEN_INITIALIZED;
        main.flags &= !USER_PIN_FLAGS;
        main.user = PinState::default();
        token.db.update()?;
        info!("Token {} initialized", slot);
        Ok(())
    }

    pub(crate) fn entry_init_pin(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let pin_size = args.get_u32()?;
        let pin = get_pin(&mut args, pin_size)?;
        args.check_consumed()?;

        let min = self.config.pin_min_len;
        let (token, session) = self.session_mut(client, handle)?;
        if token.login != LoginState::SO {
            return Err(CKR_USER_NOT_LOGGED_IN)?;
        }
        token.set_pin(PinUser::User, pin, session.is_rw(), min)?;
        info!("Token {}: user PIN initialized", token.id());
        Ok(())
    }

    pub(crate) fn entry_set_pin(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let old_size = args.get_u32()?;
        let new_size = args.get_u32()?;
        let old_pin = get_pin(&mut args, old_size)?;
        let new_pin = get_pin(&mut args, new_size)?;
        args.check_consumed()?;

        let min = self.config.pin_min_len;
        let (token, session) = self.session_mut(client, handle)?;
        if !session.is_rw() {
            return Err(CKR_SESSION_READ_ONLY)?;
        }
        let user = match token.login {
            LoginState::SO => PinUser::SO,
            _ => {
                if token.flags() & CKF_USER_PIN_INITIALIZED == 0 {
                    return Err(CKR_USER_PIN_NOT_INITIALIZED)?;
                }
                PinUser::User
            }
        };
        token.db.check_pin(user, old_pin)?;
        token.set_pin(user, new_pin, session.is_rw(), min)
    }

    pub(crate) fn entry_login(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let user_type = args.get_u32()?;
        let pin_size = args.get_u32()?;
        let pin = get_pin(&mut args, pin_size)?;
        args.check_consumed()?;

        let slot = self.session_mut(client, handle)?.1.slot();
        match user_type {
            CKU_SO => {
                match self.token(slot)?.login {
                    LoginState::SO => return Err(CKR_USER_ALREADY_LOGGED_IN)?,
                    LoginState::User => {
                        return Err(CKR_USER_ANOTHER_ALREADY_LOGGED_IN)?
                    }
                    LoginState::Public => (),
                }
                if self.token_sessions(slot).any(|s| !s.is_rw()) {
                    return Err(CKR_SESSION_READ_ONLY_EXISTS)?;
                }
                let token = self.token_mut(slot)?;
                token.db.check_pin(PinUser::SO, pin)?;
                token.login = LoginState::SO;
                info!("Token {}: SO logged in", slot);
            }
            CKU_USER => {
                let token = self.token_mut(slot)?;
                match token.login {
                    LoginState::SO => {
                        return Err(CKR_USER_ANOTHER_ALREADY_LOGGED_IN)?
                    }
                    LoginState::User => {
                        return Err(CKR_USER_ALREADY_LOGGED_IN)?
                    }
                    LoginState::Public => (),
                }
                token.db.check_pin(PinUser::User, pin)?;
                token.login = LoginState::User;
                info!("Token {}: user logged in", slot);
            }
            CKU_CONTEXT_SPECIFIC => {
                let (token, session) = self.session_mut(client, handle)?;
                let processing = match &mut session.processing {
                    Some(p) if p.always_authen => p,
                    _ => return Err(CKR_OPERATION_NOT_INITIALIZED)?,
                };
                let user = match token.login {
                    LoginState::SO => PinUser::SO,
                    LoginState::User => PinUser::User,
                    LoginState::Public => return Err(CKR_FUNCTION_FAILED)?,
                };
                let ret = token.db.check_pin(user, pin);
                processing.relogged = ret.is_ok();
                if let Err(e) = ret {
                    if e.rv() == CKR_PIN_LOCKED {
                        warn!("Token {}: PIN locked, logging out", slot);
                        self.logout(slot);
                    }
                    return Err(e);
                }
            }
            _ => return Err(CKR_USER_TYPE_INVALID)?,
        }
        Ok(())
    }

    /// Returns every session of the token to the public state.
    ///
    /// Private session objects are destroyed, handles to private token
    /// objects released and processings on private keys terminated.
    pub(crate) fn logout(&mut self, slot: CK_SLOT_ID) {
        let token = match self.tokens.get_mut(slot as usize) {
            Some(t) => t,
            None => return,
        };
        let private: Vec<ObjectId> = token
            .object_ids()
            .into_iter()
            .filter(|id| match token.load_object(*id) {
                Ok(o) => o.attributes().map_or(true, object_is_private),
                Err(_) => true,
            })
            .collect();
        token.login = LoginState::Public;

        for session in self.token_sessions_mut(slot) {
            session.destroy_objects(|o| {
                o.attributes().map_or(true, object_is_private)
            });
            session.handles.retain(|r| match r {
                ObjRef::Token(id) => !private.contains(id),
                ObjRef::Session(_) => true,
            });
            if session.processing.as_ref().map_or(false, |p| p.private) {
                session.processing = None;
            }
        }
        info!("Token {}: logged out", slot);
    }

    pub(crate) fn entry_logout(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        args.check_consumed()?;

        let (token, _) = self.session_mut(client, handle)?;
        if token.login == LoginState::Public {
            return Err(CKR_USER_NOT_LOGGED_IN)?;
        }
        let slot = token.id();
        self.logout(slot);
        Ok(())
    }

    pub(crate) fn entry_open_session(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        rw: bool,
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let slot = args.get_u32()?;
        args.check_consumed()?;
        if out.capacity() != 4 {
            return Err(CKR_ARGUMENTS_BAD)?;
        }

        let token = self.token(slot)?;
        if rw && token.flags() & CKF_WRITE_PROTECTED != 0 {
            return Err(CKR_TOKEN_WRITE_PROTECTED)?;
        }
        if !rw && token.login == LoginState::SO {
            return Err(CKR_SESSION_READ_WRITE_SO_EXISTS)?;
        }

        let handle = self.client_mut(client)?.add_session(slot, rw);
        let token = self.token_mut(slot)?;
        token.session_count += 1;
        if rw {
            token.rw_session_count += 1;
        }
        debug!(
            "Token {}: opened {} session {}",
            slot,
            if rw { "RW" } else { "RO" },
            handle
        );
        out.write_exact(&handle.to_le_bytes())
    }

    /// Terminates a session, its processing, its search and its objects
    pub(crate) fn close_session(
        &mut self,
        client: ClientId,
        handle: CK_SESSION_HANDLE,
    ) -> Result<()> {
        let session = match self.client_mut(client)?.remove_session(handle) {
            Some(s) => s,
            None => return Err(CKR_SESSION_HANDLE_INVALID)?,
        };
        let token = self.token_mut(session.slot())?;
        token.session_count = token.session_count.saturating_sub(1);
        if session.is_rw() {
            token.rw_session_count = token.rw_session_count.saturating_sub(1);
        }
        if token.session_count == 0 && token.login != LoginState::Public {
            debug!("Token {}: last session closed, logging out", token.id());
            token.login = LoginState::Public;
        }
        debug!("Token {}: closed session {}", token.id(), handle);
        Ok(())
    }

    pub(crate) fn entry_close_session(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        args.check_consumed()?;
        self.close_session(client, handle)
    }

    pub(crate) fn entry_close_all_sessions(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let slot = args.get_u32()?;
        args.check_consumed()?;
        self.token(slot)?;

        let handles = self.client_mut(client)?.session_handles(slot);
        for handle in handles {
            self.close_session(client, handle)?;
        }
        Ok(())
    }

    pub(crate) fn entry_session_info(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        args.check_consumed()?;

        let (token, session) = self.session_mut(client, handle)?;
        let mut s = Serializer::new();
        s.put_u32(session.slot())
            .put_u32(session.state(token.login))
            .put_u32(session.flags())
            .put_u32(0);
        out.write(&s.finish())
    }
}
