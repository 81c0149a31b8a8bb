// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Process wide state: the fixed set of tokens and the registry of
//! clients with their sessions.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::persistent::PersistentDb;
use crate::pkcs11::*;
use crate::session::{Client, Session};
use crate::storage::SecureStorage;
use crate::token::Token;

/// Identifies a registered caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

/// The token application state
#[derive(Debug)]
pub struct Ta {
    pub(crate) config: Config,
    pub(crate) tokens: Vec<Token>,
    pub(crate) clients: BTreeMap<ClientId, Client>,
    next_client: u64,
}

impl Ta {
    /// Opens the persistent database of every configured token
    pub fn new(config: Config, storage: Arc<dyn SecureStorage>) -> Result<Ta> {
        let mut tokens = Vec::with_capacity(config.token_count);
        for id in 0..config.token_count {
            let id = u32::try_from(id)?;
            let db = PersistentDb::open(storage.clone(), id)?;
            tokens.push(Token::new(id, db));
        }
        info!("{} token(s) ready", tokens.len());
        Ok(Ta {
            config: config,
            tokens: tokens,
            clients: BTreeMap::new(),
            next_client: 1,
        })
    }

    pub fn register_client(&mut self) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        self.clients.insert(id, Client::new());
        debug!("Registered client {:?}", id);
        id
    }

    /// Closes every session of the client and forgets it
    pub fn unregister_client(&mut self, client: ClientId) {
        let handles = match self.clients.get(&client) {
            Some(c) => c.all_session_handles(),
            None => return,
        };
        for handle in handles {
            if let Err(e) = self.close_session(client, handle) {
                error!("Failed to close session {}: {}", handle, e);
            }
        }
        self.clients.remove(&client);
        debug!("Unregistered client {:?}", client);
    }

    pub(crate) fn has_client(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    pub(crate) fn client_mut(&mut self, client: ClientId) -> Result<&mut Client> {
        match self.clients.get_mut(&client) {
            Some(c) => Ok(c),
            None => Err(CKR_GENERAL_ERROR)?,
        }
    }

    pub(crate) fn token(&self, slot: CK_SLOT_ID) -> Result<&Token> {
        match self.tokens.get(slot as usize) {
            Some(t) => Ok(t),
            None => Err(CKR_SLOT_ID_INVALID)?,
        }
    }

    pub(crate) fn token_mut(&mut self, slot: CK_SLOT_ID) -> Result<&mut Token> {
        match self.tokens.get_mut(slot as usize) {
            Some(t) => Ok(t),
            None => Err(CKR_SLOT_ID_INVALID)?,
        }
    }

    /// Resolves a session handle of a client, along with the token the
    /// session is opened on
    pub(crate) fn session_mut(
        &mut self,
        client: ClientId,
        handle: CK_SESSION_HANDLE,
    ) -> Result<(&mut Token, &mut Session)> {
        let session = match self.clients.get_mut(&client) {
            Some(c) => c.session_mut(handle)?,
            None => return Err(CKR_SESSION_HANDLE_INVALID)?,
        };
        let token = match self.tokens.get_mut(session.slot() as usize) {
            Some(t) => t,
            None => return Err(CKR_GENERAL_ERROR)?,
        };
        Ok((token, session))
    }

    /// Every session of every client opened on a slot
    pub(crate) fn token_sessions_mut(
        &mut self,
        slot: CK_SLOT_ID,
    ) -> impl Iterator<Item = &mut Session> {
        self.clients
            .values_mut()
            .flat_map(|c| c.sessions_mut())
            .filter(move |s| s.slot() == slot)
    }

    pub(crate) fn token_sessions(
        &self,
        slot: CK_SLOT_ID,
    ) -> impl Iterator<Item = &Session> {
        self.clients
            .values()
            .flat_map(|c| c.sessions())
            .filter(move |s| s.slot() == slot)
    }
}
