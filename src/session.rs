// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use std::collections::BTreeMap;

use crate::attribute::Attributes;
use crate::error::Result;
use crate::handle::Handles;
use crate::object::{Object, ObjectId};
use crate::pkcs11::*;
use crate::processing::Processing;

/// The user class logged in on a token
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoginState {
    #[default]
    Public,
    User,
    SO,
}

/// What an object handle designates.
///
/// Session objects are owned by the session holding the handle, token
/// objects by the token the session is opened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjRef {
    Session(ObjectId),
    Token(ObjectId),
}

/// A snapshot of the objects matching a search template
#[derive(Debug)]
pub struct FindContext {
    /// Handles in enumeration order, together with the object of the
    /// handles minted by the search itself
    pub handles: Vec<(CK_OBJECT_HANDLE, Option<ObjRef>)>,
    pub next: usize,
    /// First entry collected from the token objects
    pub temp_start: usize,
    pub template: Attributes,
}

impl FindContext {
    /// Returns the next `max` handles of the snapshot
    pub fn results(&mut self, max: usize) -> Vec<CK_OBJECT_HANDLE> {
        let end = std::cmp::min(self.next + max, self.handles.len());
        let out = self.handles[self.next..end].iter().map(|h| h.0).collect();
        self.next = end;
        out
    }

    /// Handles minted for this search and never returned to the client
    pub fn unreturned(&self) -> impl Iterator<Item = (CK_OBJECT_HANDLE, ObjRef)> + '_ {
        let start = std::cmp::max(self.next, self.temp_start);
        self.handles[start..]
            .iter()
            .filter_map(|(h, r)| r.map(|r| (*h, r)))
    }
}

#[derive(Debug)]
pub struct Session {
    handle: CK_SESSION_HANDLE,
    slot: CK_SLOT_ID,
    rw: bool,
    objects: BTreeMap<ObjectId, Object>,
    next_object: ObjectId,
    pub handles: Handles<ObjRef>,
    pub processing: Option<Processing>,
    pub find: Option<FindContext>,
}

impl Session {
    pub fn new(
        handle: CK_SESSION_HANDLE,
        slot: CK_SLOT_ID,
        rw: bool,
    ) -> Session {
        Session {
            handle: handle,
            slot: slot,
            rw: rw,
            objects: BTreeMap::new(),
            next_object: 0,
            handles: Handles::new(),
            processing: None,
            find: None,
        }
    }

    pub fn handle(&self) -> CK_SESSION_HANDLE {
        self.handle
    }

    pub fn slot(&self) -> CK_SLOT_ID {
        self.slot
    }

    pub fn is_rw(&self) -> bool {
        self.rw
    }

    /// The PKCS#11 session state given the login state of the token
    pub fn state(&self, login: LoginState) -> CK_STATE {
        match (login, self.rw) {
            (LoginState::Public, false) => CKS_RO_PUBLIC_SESSION,
            (LoginState::Public, true) => CKS_RW_PUBLIC_SESSION,
            (LoginState::User, false) => CKS_RO_USER_FUNCTIONS,
            (LoginState::User, true) => CKS_RW_USER_FUNCTIONS,
            (LoginState::SO, _) => CKS_RW_SO_FUNCTIONS,
        }
    }

    pub fn flags(&self) -> CK_FLAGS {
        if self.rw {
            CKF_SERIAL_SESSION | CKF_RW_SESSION
        } else {
            CKF_SERIAL_SESSION
        }
    }

    /// Fails if a processing or a search is active
    pub fn check_idle(&self) -> Result<()> {
        if self.processing.is_some() || self.find.is_some() {
            return Err(CKR_OPERATION_ACTIVE)?;
        }
        Ok(())
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
        self.handles.remove_value(&ObjRef::Session(id));
        self.objects.remove(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = (&ObjectId, &Object)> {
        self.objects.iter()
    }

    /// Destroys the session objects matching `f`
    pub fn destroy_objects<F>(&mut self, mut f: F)
    where
        F: FnMut(&Object) -> bool,
    {
        let ids: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, o)| f(o))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.remove_object(id);
        }
    }
}

/// A caller of the token, owning its sessions
#[derive(Debug, Default)]
pub struct Client {
    sessions: BTreeMap<CK_SESSION_HANDLE, Session>,
    next_handle: CK_SESSION_HANDLE,
}

impl Client {
    pub fn new() -> Client {
        Client::default()
    }

    fn mint_handle(&mut self) -> CK_SESSION_HANDLE {
        loop {
            self.next_handle = match self.next_handle.checked_add(1) {
                Some(h) => h,
                None => 1,
            };
            if !self.sessions.contains_key(&self.next_handle) {
                return self.next_handle;
            }
        }
    }

    pub fn add_session(
        &mut self,
        slot: CK_SLOT_ID,
        rw: bool,
    ) -> CK_SESSION_HANDLE {
        let handle = self.mint_handle();
        self.sessions.insert(handle, Session::new(handle, slot, rw));
        handle
    }

    pub fn session(&self, handle: CK_SESSION_HANDLE) -> Result<&Session> {
        match self.sessions.get(&handle) {
            Some(s) => Ok(s),
            None => Err(CKR_SESSION_HANDLE_INVALID)?,
        }
    }

    pub fn session_mut(
        &mut self,
        handle: CK_SESSION_HANDLE,
    ) -> Result<&mut Session> {
        match self.sessions.get_mut(&handle) {
            Some(s) => Ok(s),
            None => Err(CKR_SESSION_HANDLE_INVALID)?,
        }
    }

    pub fn remove_session(
        &mut self,
        handle: CK_SESSION_HANDLE,
    ) -> Option<Session> {
        self.sessions.remove(&handle)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Handles of the sessions opened on a slot
    pub fn session_handles(&self, slot: CK_SLOT_ID) -> Vec<CK_SESSION_HANDLE> {
        self.sessions
            .values()
            .filter(|s| s.slot == slot)
            .map(|s| s.handle)
            .collect()
    }

    pub fn all_session_handles(&self) -> Vec<CK_SESSION_HANDLE> {
        self.sessions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_states() {
        let ro = Session::new(1, 0, false);
        let rw = Session::new(2, 0, true);
        assert_eq!(ro.state(LoginState::Public), CKS_RO_PUBLIC_SESSION);
        assert_eq!(rw.state(LoginState::User), CKS_RW_USER_FUNCTIONS);
        assert_eq!(rw.state(LoginState::SO), CKS_RW_SO_FUNCTIONS);
        assert_eq!(ro.flags(), CKF_SERIAL_SESSION);
    }

    #[test]
    fn find_snapshot() {
        let mut ctx = FindContext {
            handles: vec![
                (1, None),
                (2, Some(ObjRef::Token(0))),
                (3, Some(ObjRef::Token(1))),
            ],
            next: 0,
            temp_start: 1,
            template: Attributes::new(),
        };
        assert_eq!(ctx.results(2), vec![1, 2]);
        let left: Vec<_> = ctx.unreturned().collect();
        assert_eq!(left, vec![(3, ObjRef::Token(1))]);
        assert_eq!(ctx.results(5), vec![3]);
        assert!(ctx.results(5).is_empty());
    }

    #[test]
    fn client_sessions() {
        let mut client = Client::new();
        let a = client.add_session(0, true);
        let b = client.add_session(1, false);
        assert_ne!(a, CK_INVALID_HANDLE);
        assert_ne!(a, b);
        assert_eq!(client.session_handles(1), vec![b]);
        assert!(client.remove_session(a).is_some());
        assert_eq!(
            client.session(a).unwrap_err().rv(),
            CKR_SESSION_HANDLE_INVALID
        );
    }
}
