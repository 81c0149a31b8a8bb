// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use std::sync::Arc;

use crate::attribute::Attributes;
use crate::config::Config;
use crate::entry::{Param, TeeResult};
use crate::pkcs11::vendor::*;
use crate::pkcs11::*;
use crate::serializer::Serializer;
use crate::storage::memory::MemoryStorage;
use crate::storage::SecureStorage;
use crate::ta::{ClientId, Ta};

#[macro_use]
mod util;
use util::*;

mod entry;
mod objects;
mod persistence;
mod symm;
mod token;

const SO_PIN: &[u8] = b"12345678";
const USER_PIN: &[u8] = b"87654321";
const TOKEN_LABEL: &[u8] = b"INTERNAL TEST TOKEN";

/* offsets in the token information structure */
const TOKEN_FLAGS_OFFSET: usize = 96;
const TOKEN_SESSIONS_OFFSET: usize = 104;
const TOKEN_RW_SESSIONS_OFFSET: usize = 112;

/// What a command left in its parameters
#[derive(Debug)]
struct Reply {
    rv: CK_RV,
    tee: TeeResult,
    out: Vec<u8>,
    /// Size reported in the output reference, the required size when
    /// the buffer was too small
    size: usize,
}

/// A token application on a private volatile storage, with one
/// registered client and its current session
struct TestToken {
    ta: Ta,
    storage: MemoryStorage,
    client: ClientId,
    slot: CK_SLOT_ID,
    session: CK_SESSION_HANDLE,
}

impl TestToken {
    fn new() -> TestToken {
        TestToken::with_storage(MemoryStorage::new())
    }

    /// Brings up the token application on an existing storage, as a
    /// reboot would
    fn with_storage(storage: MemoryStorage) -> TestToken {
        let mut config = Config::default();
        config.token_count = 2;
        let mut ta = ret_or_panic!(Ta::new(config, Arc::new(storage.clone())));
        let client = ta.register_client();
        TestToken {
            ta: ta,
            storage: storage,
            client: client,
            slot: 0,
            session: CK_INVALID_HANDLE,
        }
    }

    /// An initialized token with a user PIN and a RW session where the
    /// user is logged in
    fn initialized() -> TestToken {
        let mut testtokn = TestToken::new();
        assert_eq!(testtokn.init_token(SO_PIN, TOKEN_LABEL), CKR_OK);
        testtokn.session = ret_or_panic!(testtokn.open_session(true));
        assert_eq!(testtokn.login(CKU_SO, SO_PIN), CKR_OK);
        assert_eq!(testtokn.init_pin(USER_PIN), CKR_OK);
        assert_eq!(testtokn.logout(), CKR_OK);
        assert_eq!(testtokn.login(CKU_USER, USER_PIN), CKR_OK);
        testtokn
    }

    /// Reboots the token application on the same storage
    fn reload(&self) -> TestToken {
        TestToken::with_storage(self.storage.clone())
    }

    fn call(&mut self, cmd: u32, ctrl: &[u8], p1: Param, p2: Param) -> Reply {
        let mut params = [Param::inout(ctrl), p1, p2, Param::none()];
        let tee = self.ta.invoke(self.client, cmd, &mut params);
        Reply {
            rv: le_u32(&params[0].memref.buffer, 0),
            tee: tee,
            out: params[2].memref.data().to_vec(),
            size: params[2].memref.size,
        }
    }

    fn call_rv(&mut self, cmd: u32, ctrl: &[u8]) -> CK_RV {
        self.call(cmd, ctrl, Param::none(), Param::none()).rv
    }

    /// Runs a command returning a single u32 handle
    fn call_handle(&mut self, cmd: u32, ctrl: &[u8]) -> Result<u32, CK_RV> {
        let reply = self.call(cmd, ctrl, Param::none(), Param::output(4));
        match reply.rv {
            CKR_OK => Ok(le_u32(&reply.out, 0)),
            rv => Err(rv),
        }
    }

    fn init_token(&mut self, pin: &[u8], label: &[u8]) -> CK_RV {
        let mut s = Serializer::new();
        s.put_u32(self.slot)
            .put_u32(pin.len() as u32)
            .put_padded(label, SKS_TOKEN_LABEL_SIZE)
            .put(pin);
        let ctrl = s.finish();
        self.call_rv(SKS_CMD_INIT_TOKEN, &ctrl)
    }

    fn token_info(&mut self) -> Vec<u8> {
        let reply = self.call(
            SKS_CMD_TOKEN_INFO,
            &ctrl(&[self.slot], &[]),
            Param::none(),
            Param::output(256),
        );
        assert_eq!(reply.rv, CKR_OK);
        reply.out
    }

    fn token_flags(&mut self) -> CK_FLAGS {
        le_u32(&self.token_info(), TOKEN_FLAGS_OFFSET)
    }

    fn open_session(&mut self, rw: bool) -> Result<CK_SESSION_HANDLE, CK_RV> {
        let cmd = if rw {
            SKS_CMD_OPEN_RW_SESSION
        } else {
            SKS_CMD_OPEN_RO_SESSION
        };
        self.call_handle(cmd, &ctrl(&[self.slot], &[]))
    }

    fn close_session(&mut self) -> CK_RV {
        let rv = self.call_rv(SKS_CMD_CLOSE_SESSION, &ctrl(&[self.session], &[]));
        self.session = CK_INVALID_HANDLE;
        rv
    }

    fn session_state(&mut self) -> CK_STATE {
        let reply = self.call(
            SKS_CMD_SESSION_INFO,
            &ctrl(&[self.session], &[]),
            Param::none(),
            Param::output(16),
        );
        assert_eq!(reply.rv, CKR_OK);
        le_u32(&reply.out, 4)
    }

    fn login(&mut self, user: CK_USER_TYPE, pin: &[u8]) -> CK_RV {
        let ctrl = ctrl(&[self.session, user, pin.len() as u32], pin);
        self.call_rv(SKS_CMD_LOGIN, &ctrl)
    }

    fn logout(&mut self) -> CK_RV {
        self.call_rv(SKS_CMD_LOGOUT, &ctrl(&[self.session], &[]))
    }

    fn init_pin(&mut self, pin: &[u8]) -> CK_RV {
        let ctrl = ctrl(&[self.session, pin.len() as u32], pin);
        self.call_rv(SKS_CMD_INIT_PIN, &ctrl)
    }

    fn set_pin(&mut self, old: &[u8], new: &[u8]) -> CK_RV {
        let mut tail = old.to_vec();
        tail.extend_from_slice(new);
        let ctrl =
            ctrl(&[self.session, old.len() as u32, new.len() as u32], &tail);
        self.call_rv(SKS_CMD_SET_PIN, &ctrl)
    }

    fn import(&mut self, template: &Attributes) -> Result<u32, CK_RV> {
        let ctrl = ctrl(&[self.session], &template.to_bytes());
        self.call_handle(SKS_CMD_IMPORT_OBJECT, &ctrl)
    }

    fn destroy(&mut self, object: CK_OBJECT_HANDLE) -> CK_RV {
        self.call_rv(SKS_CMD_DESTROY_OBJECT, &ctrl(&[self.session, object], &[]))
    }

    fn generate_key(
        &mut self,
        mech: CK_MECHANISM_TYPE,
        template: &Attributes,
    ) -> Result<u32, CK_RV> {
        let mut tail = mechanism(mech, &[]);
        tail.extend_from_slice(&template.to_bytes());
        let ctrl = ctrl(&[self.session], &tail);
        self.call_handle(SKS_CMD_GENERATE_KEY, &ctrl)
    }

    fn generate_key_pair(
        &mut self,
        mech: CK_MECHANISM_TYPE,
        public: &Attributes,
        private: &Attributes,
    ) -> Result<(u32, u32), CK_RV> {
        let mut tail = mechanism(mech, &[]);
        tail.extend_from_slice(&public.to_bytes());
        tail.extend_from_slice(&private.to_bytes());
        let ctrl = ctrl(&[self.session], &tail);
        let reply = self.call(
            SKS_CMD_GENERATE_KEY_PAIR,
            &ctrl,
            Param::none(),
            Param::output(8),
        );
        match reply.rv {
            CKR_OK => Ok((le_u32(&reply.out, 0), le_u32(&reply.out, 4))),
            rv => Err(rv),
        }
    }

    fn derive(
        &mut self,
        mech: CK_MECHANISM_TYPE,
        params: &[u8],
        parent: CK_OBJECT_HANDLE,
        template: &Attributes,
    ) -> Result<u32, CK_RV> {
        let mut tail = mechanism(mech, params);
        tail.extend_from_slice(&parent.to_le_bytes());
        tail.extend_from_slice(&template.to_bytes());
        let ctrl = ctrl(&[self.session], &tail);
        self.call_handle(SKS_CMD_DERIVE_KEY, &ctrl)
    }

    fn find_init(&mut self, template: &Attributes) -> CK_RV {
        let ctrl = ctrl(&[self.session], &template.to_bytes());
        self.call_rv(SKS_CMD_FIND_OBJECTS_INIT, &ctrl)
    }

    fn find(&mut self, max: usize) -> Result<Vec<u32>, CK_RV> {
        let reply = self.call(
            SKS_CMD_FIND_OBJECTS,
            &ctrl(&[self.session], &[]),
            Param::none(),
            Param::output(max * 4),
        );
        match reply.rv {
            CKR_OK => Ok(reply
                .out
                .chunks_exact(4)
                .map(|c| le_u32(c, 0))
                .collect()),
            rv => Err(rv),
        }
    }

    fn find_final(&mut self) -> CK_RV {
        self.call_rv(SKS_CMD_FIND_OBJECTS_FINAL, &ctrl(&[self.session], &[]))
    }

    /// Runs a complete search and returns every handle found
    fn find_all(&mut self, template: &Attributes) -> Vec<u32> {
        assert_eq!(self.find_init(template), CKR_OK);
        let handles = ret_or_panic!(self.find(64).map_err(|rv| format!("{rv:x}")));
        assert_eq!(self.find_final(), CKR_OK);
        handles
    }

    fn object_size(&mut self, object: CK_OBJECT_HANDLE) -> Result<u32, CK_RV> {
        let ctrl = ctrl(&[self.session, object], &[]);
        self.call_handle(SKS_CMD_GET_OBJECT_SIZE, &ctrl)
    }

    fn get_attribute_value(
        &mut self,
        object: CK_OBJECT_HANDLE,
        template: &Attributes,
        capacity: usize,
    ) -> Reply {
        let ctrl = ctrl(&[self.session, object], &template.to_bytes());
        self.call(
            SKS_CMD_GET_ATTRIBUTE_VALUE,
            &ctrl,
            Param::none(),
            Param::output(capacity),
        )
    }

    /// Reads one attribute, first querying its size
    fn get_attr(
        &mut self,
        object: CK_OBJECT_HANDLE,
        id: CK_ATTRIBUTE_TYPE,
    ) -> Result<Vec<u8>, CK_RV> {
        let query = make_template!((bytes, id, &[]));
        let reply = self.get_attribute_value(object, &query, query.size());
        if reply.rv != CKR_OK {
            return Err(reply.rv);
        }
        let len = le_u32(&reply.out, 12) as usize;
        let mut template = Attributes::new();
        template.add(id, &vec![0u8; len]);
        let reply = self.get_attribute_value(object, &template, template.size());
        if reply.rv != CKR_OK {
            return Err(reply.rv);
        }
        assert_eq!(le_u32(&reply.out, 12) as usize, len);
        Ok(reply.out[16..16 + len].to_vec())
    }

    fn get_attr_u32(
        &mut self,
        object: CK_OBJECT_HANDLE,
        id: CK_ATTRIBUTE_TYPE,
    ) -> Result<u32, CK_RV> {
        let value = self.get_attr(object, id)?;
        Ok(le_u32(&value, 0))
    }

    fn processing_init(
        &mut self,
        cmd: u32,
        key: CK_OBJECT_HANDLE,
        mech: CK_MECHANISM_TYPE,
        params: &[u8],
    ) -> CK_RV {
        let ctrl = ctrl(&[self.session, key], &mechanism(mech, params));
        self.call_rv(cmd, &ctrl)
    }

    /// Runs an update, final or one-shot step with an output buffer
    fn step(&mut self, cmd: u32, data: &[u8], capacity: usize) -> Reply {
        let input = if data.is_empty() {
            Param::none()
        } else {
            Param::input(data)
        };
        let ctrl = ctrl(&[self.session], &[]);
        self.call(cmd, &ctrl, input, Param::output(capacity))
    }

    /// Runs a step and returns its output
    fn step_ok(&mut self, cmd: u32, data: &[u8]) -> Vec<u8> {
        let reply = self.step(cmd, data, 1024);
        assert_eq!(reply.rv, CKR_OK, "step 0x{:x} failed", cmd);
        reply.out
    }

    /// Runs a verification step, the signature goes in `param2`
    fn verify_step(&mut self, cmd: u32, data: &[u8], signature: &[u8]) -> CK_RV {
        let input = if data.is_empty() {
            Param::none()
        } else {
            Param::input(data)
        };
        let ctrl = ctrl(&[self.session], &[]);
        self.call(cmd, &ctrl, input, Param::input(signature)).rv
    }

    /// Runs a verification update, which takes no signature
    fn verify_update(&mut self, data: &[u8]) -> CK_RV {
        let ctrl = ctrl(&[self.session], &[]);
        self.call(
            SKS_CMD_VERIFY_UPDATE,
            &ctrl,
            Param::input(data),
            Param::none(),
        )
        .rv
    }

    /// Blobs of the persistent objects in storage
    fn object_blobs(&self) -> Vec<(String, Vec<u8>)> {
        let mut names: Vec<String> = self
            .storage
            .names()
            .into_iter()
            .filter(|n| !n.starts_with("token.db."))
            .collect();
        names.sort();
        names
            .into_iter()
            .map(|n| {
                let blob = ret_or_panic!(self.storage.read(&n));
                (n, blob)
            })
            .collect()
    }
}
