//! Logging.
//!
//! All diagnostic output goes through the `log` facade. The binary maps
//! the number of `-v` flags on the command line to a maximum level: errors
//! are always printed, one `-v` adds warnings, a second adds informational
//! messages, anything more adds debug traces.

use std::io;
use log::LevelFilter;
use crate::error::Failed;

/// Initializes logging to stderr for the given verbosity.
pub fn init(verbose: u64) -> Result<(), Failed> {
    let level = match verbose {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let res = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("{}: {}", record.level(), message))
        })
        .level(level)
        .chain(io::stderr())
        .apply();
    if res.is_err() {
        eprintln!("Failed to initialize logger. Aborting.");
        return Err(Failed)
    }
    Ok(())
}
