// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

#![warn(missing_docs)]

//! This is SKS
//!
//! Secure key services: the core of a PKCS#11 token meant to run inside
//! a trusted execution environment. Clients talk to the token through a
//! small command/parameter interface (see [`invoke`]), token state and
//! keys are persisted through a secure storage backend.

use std::cell::RefCell;
use std::sync::{RwLock, RwLockWriteGuard};

#[cfg(feature = "log")]
#[macro_use]
extern crate log as logger;

#[cfg(not(feature = "log"))]
#[macro_use]
mod nolog {
    macro_rules! error {
        ($($arg:tt)+) => {
            if false {
                let _ = format_args!($($arg)+);
            }
        };
    }
    macro_rules! warn {
        ($($arg:tt)+) => {
            if false {
                let _ = format_args!($($arg)+);
            }
        };
    }
    macro_rules! info {
        ($($arg:tt)+) => {
            if false {
                let _ = format_args!($($arg)+);
            }
        };
    }
    macro_rules! debug {
        ($($arg:tt)+) => {
            if false {
                let _ = format_args!($($arg)+);
            }
        };
    }
    macro_rules! trace {
        ($($arg:tt)+) => {
            if false {
                let _ = format_args!($($arg)+);
            }
        };
    }
}

#[macro_use]
mod error;

#[cfg(feature = "log")]
mod log;

#[allow(missing_docs)]
pub mod pkcs11;

mod attribute;
mod config;
mod entry;
mod handle;
mod helpers;
mod object;
mod persistent;
mod policy;
mod processing;
mod rng;
mod serializer;
mod session;
mod storage;
mod ta;
mod token;

pub use config::Config;
pub use entry::{Memref, Param, ParamType, TeeResult};
pub use error::{Error, Result};
pub use storage::{new_storage, SecureStorage};
pub use ta::{ClientId, Ta};

use pkcs11::*;
use rng::RNG;

thread_local!(static CSPRNG: RefCell<RNG> = RefCell::new(RNG::new()));

/// Fill a buffer with random data
///
/// Uses the per thread CSPRNG seeded from the operating system
fn get_random_data(data: &mut [u8]) -> Result<()> {
    CSPRNG.with(|rng| rng.borrow_mut().generate_random(data))
}

static STATE: RwLock<Option<Ta>> = RwLock::new(None);

fn global_wlock() -> Result<RwLockWriteGuard<'static, Option<Ta>>> {
    STATE.write().map_err(|_| to_rv!(CKR_GENERAL_ERROR))
}

/// Loads the configuration, opens the storage backend and brings up
/// every configured token.
///
/// Calling it on an already initialized library is a no-op.
pub fn init() -> CK_RV {
    let mut state = match global_wlock() {
        Ok(s) => s,
        Err(e) => return e.rv(),
    };
    if state.is_some() {
        return CKR_OK;
    }
    let ret = Config::load().and_then(|conf| {
        let storage = new_storage(&conf.storage_type, &conf.storage_dir)?;
        Ta::new(conf, storage)
    });
    match ret {
        Ok(ta) => {
            *state = Some(ta);
            CKR_OK
        }
        Err(e) => {
            error!("Failed to initialize: {}", e);
            e.rv()
        }
    }
}

/// Initializes the library with an explicit configuration and storage
/// backend, replacing any previous state.
pub fn init_with(
    conf: Config,
    storage: std::sync::Arc<dyn SecureStorage>,
) -> CK_RV {
    let mut state = match global_wlock() {
        Ok(s) => s,
        Err(e) => return e.rv(),
    };
    match Ta::new(conf, storage) {
        Ok(ta) => {
            *state = Some(ta);
            CKR_OK
        }
        Err(e) => e.rv(),
    }
}

/// Tears down all clients, sessions and tokens.
pub fn deinit() {
    if let Ok(mut state) = global_wlock() {
        *state = None;
    }
}

/// Registers a new client and returns its identifier.
pub fn open_client() -> Result<ClientId> {
    match global_wlock()?.as_mut() {
        Some(ta) => Ok(ta.register_client()),
        None => Err(CKR_GENERAL_ERROR)?,
    }
}

/// Unregisters a client, closing all of its sessions.
pub fn close_client(client: ClientId) {
    if let Ok(mut state) = global_wlock() {
        if let Some(ta) = state.as_mut() {
            ta.unregister_client(client);
        }
    }
}

/// Runs a single command on behalf of a client.
///
/// Commands are serialized through the global state lock, so state seen
/// at the start of a command is the state left by the previous one.
pub fn invoke(
    client: ClientId,
    cmd: u32,
    params: &mut [Param; 4],
) -> TeeResult {
    let mut state = match global_wlock() {
        Ok(s) => s,
        Err(_) => return TeeResult::BadState,
    };
    match state.as_mut() {
        Some(ta) => ta.invoke(client, cmd, params),
        None => TeeResult::BadState,
    }
}

#[cfg(test)]
mod tests;
