// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use std::env;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::pkcs11::*;

use serde::de;
use serde::{Deserialize, Serialize};
use toml;

#[cfg(not(test))]
const DEFAULT_STORAGE_DIR: &str = {
    match option_env!("SKS_STATEDIR") {
        Some(p) => p,
        None => "/var/lib/sks",
    }
};
#[cfg(test)]
const DEFAULT_STORAGE_DIR: &str = "test/storage";

#[cfg(not(test))]
const DEFAULT_CONF_DIR: &str = {
    match option_env!("CONFDIR") {
        Some(p) => p,
        None => "/usr/local/etc",
    }
};
#[cfg(test)]
const DEFAULT_CONF_DIR: &str = "test";

pub const DEFAULT_CONF_NAME: &str = "sks.conf";
pub const DEFAULT_STORAGE_TYPE: &str = "file";
pub const DEFAULT_TOKEN_COUNT: usize = 3;

pub const SLOT_DESCRIPTION: &str = "SKS TA virtual slot";
pub const SLOT_MANUFACTURER: &str = "Linaro";
pub const TOKEN_MANUFACTURER: &str = "Linaro";
pub const TOKEN_MODEL: &str = "SKS TA";
pub const TOKEN_SERIAL: &str = "0000000000000000";

/// Optional per slot overrides of the strings reported in slot and
/// token information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Slot {
    pub slot: u32,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub token_count: usize,
    pub storage_type: String,
    pub storage_dir: String,
    pub pin_min_len: usize,
    pub slots: Vec<Slot>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            token_count: DEFAULT_TOKEN_COUNT,
            storage_type: DEFAULT_STORAGE_TYPE.to_string(),
            storage_dir: DEFAULT_STORAGE_DIR.to_string(),
            pin_min_len: SKS_TOKEN_PIN_SIZE_MIN,
            slots: Vec::new(),
        }
    }
}

fn config_error<E: de::Error + Send + Sync + 'static>(error: E) -> Error {
    Error::ck_rv_from_error(CKR_TOKEN_NOT_RECOGNIZED, error)
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn find_conf() -> Result<String> {
        /* First check for our own env var,
         * this has the highest precedence */
        if let Ok(var) = env::var("SKS_CONF") {
            return Ok(var);
        }
        let datafile = match env::var("XDG_CONFIG_HOME") {
            Ok(xdg) => format!("{}/sks/{}", xdg, DEFAULT_CONF_NAME),
            Err(_) => match env::var("HOME") {
                Ok(home) => {
                    format!("{}/.config/sks/{}", home, DEFAULT_CONF_NAME)
                }
                Err(_) => {
                    format!("{}/sks/{}", DEFAULT_CONF_DIR, DEFAULT_CONF_NAME)
                }
            },
        };
        if Path::new(&datafile).is_file() {
            Ok(datafile)
        } else {
            Err(CKR_ARGUMENTS_BAD)?
        }
    }

    pub fn from_str(conf: &str) -> Result<Config> {
        let conf: Config = toml::from_str(conf).map_err(config_error)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn from_file(filename: &str) -> Result<Config> {
        let config_str = fs::read_to_string(filename)?;
        Self::from_str(&config_str)
    }

    /// Loads the configuration file if one can be found, falls back to
    /// defaults otherwise. The storage directory can always be
    /// overridden with the SKS_STORAGE environment variable.
    pub fn load() -> Result<Config> {
        let mut conf = match Self::find_conf() {
            Ok(filename) => Self::from_file(&filename)?,
            Err(_) => Config::default(),
        };
        if let Ok(dir) = env::var("SKS_STORAGE") {
            conf.storage_dir = dir;
        }
        Ok(conf)
    }

    fn validate(&self) -> Result<()> {
        if self.token_count == 0 {
            return Err(CKR_TOKEN_NOT_RECOGNIZED)?;
        }
        if self.pin_min_len == 0 || self.pin_min_len > SKS_TOKEN_PIN_SIZE_MAX
        {
            return Err(CKR_TOKEN_NOT_RECOGNIZED)?;
        }
        for s in &self.slots {
            if s.slot as usize >= self.token_count {
                return Err(CKR_TOKEN_NOT_RECOGNIZED)?;
            }
        }
        Ok(())
    }

    pub fn slot(&self, slot: u32) -> Option<&Slot> {
        self.slots.iter().find(|s| s.slot == slot)
    }

    pub fn slot_description(&self, slot: u32) -> &str {
        self.slot(slot)
            .and_then(|s| s.description.as_deref())
            .unwrap_or(SLOT_DESCRIPTION)
    }

    pub fn slot_manufacturer(&self, slot: u32) -> &str {
        self.slot(slot)
            .and_then(|s| s.manufacturer.as_deref())
            .unwrap_or(SLOT_MANUFACTURER)
    }

    pub fn token_manufacturer(&self, slot: u32) -> &str {
        self.slot(slot)
            .and_then(|s| s.manufacturer.as_deref())
            .unwrap_or(TOKEN_MANUFACTURER)
    }

    pub fn token_model(&self, slot: u32) -> &str {
        self.slot(slot)
            .and_then(|s| s.model.as_deref())
            .unwrap_or(TOKEN_MODEL)
    }

    pub fn token_serial(&self, slot: u32) -> &str {
        self.slot(slot)
            .and_then(|s| s.serial.as_deref())
            .unwrap_or(TOKEN_SERIAL)
    }
}
