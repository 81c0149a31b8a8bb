// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(dead_code)]

mod interface;
pub use interface::*;

pub mod vendor;
