// Copyright 2023 Simo Sorce
// See LICENSE.txt file for terms

//! This module implements interfaces needed to access a Random Number
//! Generator

use crate::error::{device_error, Result};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

#[derive(Debug)]
pub struct RNG {
    csprng: StdRng,
}

impl RNG {
    pub fn new() -> RNG {
        RNG {
            csprng: StdRng::from_entropy(),
        }
    }

    pub fn generate_random(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.csprng.try_fill_bytes(buffer).map_err(device_error)
    }

    /// Mixes fresh operating system entropy into the generator state
    pub fn reseed(&mut self) -> Result<()> {
        self.csprng = StdRng::from_rng(rand::rngs::OsRng).map_err(device_error)?;
        Ok(())
    }
}
