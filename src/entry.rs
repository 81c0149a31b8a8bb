// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Command entry point.
//!
//! A command carries up to four parameters. `param0` is an in/out
//! memory reference holding the serialized control arguments on entry
//! and the 32 bit return code on exit. `param1` carries input data and
//! `param2` output data (or, for verification, the signature).

use crate::error::Result;
use crate::helpers::{command_name, rv_name};
use crate::pkcs11::vendor::*;
use crate::pkcs11::*;
use crate::ta::{ClientId, Ta};

/// Results of the host runtime, distinct from the PKCS#11 return codes
/// carried in `param0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeeResult {
    Success,
    ShortBuffer,
    BadParameters,
    BadState,
    NotSupported,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParamType {
    #[default]
    None,
    MemrefInput,
    MemrefOutput,
    MemrefInout,
}

/// A memory reference: `buffer` is the memory shared with the caller,
/// `size` the number of meaningful bytes in it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Memref {
    pub buffer: Vec<u8>,
    pub size: usize,
}

impl Memref {
    pub fn new(data: &[u8]) -> Memref {
        Memref {
            buffer: data.to_vec(),
            size: data.len(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Memref {
        Memref {
            buffer: vec![0u8; capacity],
            size: capacity,
        }
    }

    /// The meaningful bytes of the buffer
    pub fn data(&self) -> &[u8] {
        &self.buffer[..std::cmp::min(self.size, self.buffer.len())]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Param {
    pub ptype: ParamType,
    pub memref: Memref,
}

impl Param {
    pub fn none() -> Param {
        Param::default()
    }

    pub fn input(data: &[u8]) -> Param {
        Param {
            ptype: ParamType::MemrefInput,
            memref: Memref::new(data),
        }
    }

    pub fn output(capacity: usize) -> Param {
        Param {
            ptype: ParamType::MemrefOutput,
            memref: Memref::with_capacity(capacity),
        }
    }

    /// An in/out reference, with room for at least a return code
    pub fn inout(data: &[u8]) -> Param {
        let mut memref = Memref::new(data);
        if memref.buffer.len() < 4 {
            memref.buffer.resize(4, 0);
        }
        Param {
            ptype: ParamType::MemrefInout,
            memref: memref,
        }
    }
}

/// The output parameter of a command
#[derive(Debug)]
pub struct Output<'a> {
    memref: Option<&'a mut Memref>,
}

impl<'a> Output<'a> {
    pub fn new(memref: Option<&'a mut Memref>) -> Output<'a> {
        Output { memref: memref }
    }

    pub fn is_present(&self) -> bool {
        self.memref.is_some()
    }

    pub fn capacity(&self) -> usize {
        match &self.memref {
            Some(m) => m.buffer.len(),
            None => 0,
        }
    }

    /// Copies `data` out. If it does not fit, the required size is
    /// reported and `CKR_BUFFER_TOO_SMALL` returned.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let memref = match &mut self.memref {
            Some(m) => m,
            None => return Err(CKR_ARGUMENTS_BAD)?,
        };
        if data.len() > memref.buffer.len() {
            memref.size = data.len();
            return Err(CKR_BUFFER_TOO_SMALL)?;
        }
        memref.buffer[..data.len()].copy_from_slice(data);
        memref.size = data.len();
        Ok(())
    }

    /// Writes fixed size data to an output that must be exactly as
    /// large
    pub fn write_exact(&mut self, data: &[u8]) -> Result<()> {
        if self.capacity() != data.len() {
            return Err(CKR_ARGUMENTS_BAD)?;
        }
        self.write(data)
    }

    /// Reads the parameter as input data, used to pass signatures
    pub fn input(&self) -> Option<&[u8]> {
        self.memref.as_ref().map(|m| m.data())
    }
}

fn not_implemented(cmd: u32) -> Result<()> {
    warn!("Command {} is not implemented", command_name(cmd));
    Err(SKS_RV_NOT_IMPLEMENTED)?
}

impl Ta {
    fn dispatch(
        &mut self,
        client: ClientId,
        cmd: u32,
        ctrl: &[u8],
        input: Option<&[u8]>,
        output: &mut Output,
    ) -> Result<()> {
        match cmd {
            SKS_CMD_PING => self.entry_ping(ctrl, output),
            SKS_CMD_SLOT_LIST => self.entry_slot_list(ctrl, output),
            SKS_CMD_SLOT_INFO => self.entry_slot_info(ctrl, output),
            SKS_CMD_TOKEN_INFO => self.entry_token_info(ctrl, output),
            SKS_CMD_MECHANISM_IDS => self.entry_mechanism_ids(ctrl, output),
            SKS_CMD_MECHANISM_INFO => self.entry_mechanism_info(ctrl, output),
            SKS_CMD_INIT_TOKEN => self.entry_init_token(ctrl),
            SKS_CMD_INIT_PIN => self.entry_init_pin(client, ctrl),
            SKS_CMD_SET_PIN => self.entry_set_pin(client, ctrl),
            SKS_CMD_LOGIN => self.entry_login(client, ctrl),
            SKS_CMD_LOGOUT => self.entry_logout(client, ctrl),
            SKS_CMD_OPEN_RO_SESSION => {
                self.entry_open_session(client, ctrl, false, output)
            }
            SKS_CMD_OPEN_RW_SESSION => {
                self.entry_open_session(client, ctrl, true, output)
            }
            SKS_CMD_CLOSE_SESSION => self.entry_close_session(client, ctrl),
            SKS_CMD_SESSION_INFO => {
                self.entry_session_info(client, ctrl, output)
            }
            SKS_CMD_CLOSE_ALL_SESSIONS => {
                self.entry_close_all_sessions(client, ctrl)
            }
            SKS_CMD_IMPORT_OBJECT => {
                self.entry_import_object(client, ctrl, output)
            }
            SKS_CMD_DESTROY_OBJECT => self.entry_destroy_object(client, ctrl),
            SKS_CMD_FIND_OBJECTS_INIT => self.entry_find_init(client, ctrl),
            SKS_CMD_FIND_OBJECTS => self.entry_find(client, ctrl, output),
            SKS_CMD_FIND_OBJECTS_FINAL => self.entry_find_final(client, ctrl),
            SKS_CMD_GET_OBJECT_SIZE => {
                self.entry_get_object_size(client, ctrl, output)
            }
            SKS_CMD_GET_ATTRIBUTE_VALUE => {
                self.entry_get_attribute_value(client, ctrl, output)
            }
            SKS_CMD_GENERATE_KEY => {
                self.entry_generate_key(client, ctrl, output)
            }
            SKS_CMD_GENERATE_KEY_PAIR => {
                self.entry_generate_key_pair(client, ctrl, output)
            }
            SKS_CMD_DERIVE_KEY => self.entry_derive_key(client, ctrl, output),
            SKS_CMD_ENCRYPT_INIT
            | SKS_CMD_DECRYPT_INIT
            | SKS_CMD_SIGN_INIT
            | SKS_CMD_VERIFY_INIT => self.entry_processing_init(client, cmd, ctrl),
            SKS_CMD_ENCRYPT_UPDATE
            | SKS_CMD_DECRYPT_UPDATE
            | SKS_CMD_SIGN_UPDATE
            | SKS_CMD_VERIFY_UPDATE
            | SKS_CMD_ENCRYPT_FINAL
            | SKS_CMD_DECRYPT_FINAL
            | SKS_CMD_SIGN_FINAL
            | SKS_CMD_VERIFY_FINAL
            | SKS_CMD_ENCRYPT_ONESHOT
            | SKS_CMD_DECRYPT_ONESHOT
            | SKS_CMD_SIGN_ONESHOT
            | SKS_CMD_VERIFY_ONESHOT => {
                self.entry_processing_step(client, cmd, ctrl, input, output)
            }
            SKS_CMD_COPY_OBJECT
            | SKS_CMD_SET_ATTRIBUTE_VALUE
            | SKS_CMD_GET_SESSION_STATE
            | SKS_CMD_SET_SESSION_STATE => not_implemented(cmd),
            _ => Err(CKR_ARGUMENTS_BAD)?,
        }
    }

    /// Runs a command on behalf of a client.
    ///
    /// The PKCS#11 return code is written in `param0`. The host result
    /// is `ShortBuffer` when the code is `CKR_BUFFER_TOO_SMALL`, and
    /// `Success` for every other code.
    pub fn invoke(
        &mut self,
        client: ClientId,
        cmd: u32,
        params: &mut [Param; 4],
    ) -> TeeResult {
        if !self.has_client(client) {
            error!("Unknown client {:?}", client);
            return TeeResult::BadState;
        }
        if command_name(cmd) == "<unknown>" {
            error!("Unknown command 0x{:x}", cmd);
            return TeeResult::NotSupported;
        }

        let [p0, p1, p2, p3] = params;
        if p0.ptype != ParamType::MemrefInout || p0.memref.buffer.len() < 4 {
            error!("{}: bad control parameter", command_name(cmd));
            return TeeResult::BadParameters;
        }
        if p3.ptype != ParamType::None {
            return TeeResult::BadParameters;
        }
        let input = match p1.ptype {
            ParamType::None => None,
            ParamType::MemrefInput | ParamType::MemrefInout => {
                Some(p1.memref.data())
            }
            ParamType::MemrefOutput => return TeeResult::BadParameters,
        };
        let mut output = match p2.ptype {
            ParamType::None => Output::new(None),
            _ => Output::new(Some(&mut p2.memref)),
        };

        let ctrl = p0.memref.data().to_vec();
        let rv = match self.dispatch(client, cmd, &ctrl, input, &mut output) {
            Ok(()) => CKR_OK,
            Err(e) => {
                debug!("{}: {}", command_name(cmd), e);
                e.rv()
            }
        };
        if rv == CKR_OK {
            trace!("{} -> {}", command_name(cmd), rv_name(rv));
        } else {
            debug!("{} -> {}", command_name(cmd), rv_name(rv));
        }

        p0.memref.buffer[..4].copy_from_slice(&rv.to_le_bytes());
        p0.memref.size = 4;
        if rv == CKR_BUFFER_TOO_SMALL {
            TeeResult::ShortBuffer
        } else {
            TeeResult::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_sizes() {
        let mut memref = Memref::with_capacity(4);
        let mut out = Output::new(Some(&mut memref));
        assert_eq!(
            out.write(b"too long").unwrap_err().rv(),
            CKR_BUFFER_TOO_SMALL
        );
        out.write(b"ok").unwrap();
        assert_eq!(memref.data(), b"ok");
        assert_eq!(memref.buffer.len(), 4);

        let mut none = Output::new(None);
        assert_eq!(none.write(b"x").unwrap_err().rv(), CKR_ARGUMENTS_BAD);
    }

    #[test]
    fn inout_room_for_rv() {
        let p = Param::inout(&[]);
        assert_eq!(p.memref.buffer.len(), 4);
        assert_eq!(p.memref.size, 0);
    }
}
