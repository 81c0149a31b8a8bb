// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Tracing setup.
//!
//! `SKS_TRACE` selects where the trace goes: `stdout`, or any other
//! value as the name of a file to create. Nothing is traced when it is
//! unset. `SKS_TRACE_LEVEL` picks the level among `off`, `error`,
//! `warn`, `info`, `debug` and `trace`; unset means `error` and an
//! unknown value means `trace`.

use std::fs::File;

use simplelog::{Config, LevelFilter, SimpleLogger, WriteLogger};

#[used]
#[cfg_attr(target_os = "linux", unsafe(link_section = ".init_array"))]
pub static INITIALIZE: extern "C" fn() = sks_log_init;

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level {
        None => LevelFilter::Error,
        Some("off") => LevelFilter::Off,
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some(_) => LevelFilter::Trace,
    }
}

/// Installs the global logger described by the environment. A logger
/// that cannot be set up, e.g. on an unwritable file, is silently
/// skipped: the token works the same without traces.
#[unsafe(no_mangle)]
pub extern "C" fn sks_log_init() {
    let target = match std::env::var("SKS_TRACE") {
        Ok(t) => t,
        Err(_) => return,
    };
    let level = parse_level(std::env::var("SKS_TRACE_LEVEL").ok().as_deref());
    let _ = match target.as_str() {
        "stdout" => SimpleLogger::init(level, Config::default()),
        path => match File::create(path) {
            Ok(file) => WriteLogger::init(level, Config::default(), file),
            Err(_) => return,
        },
    };
}
