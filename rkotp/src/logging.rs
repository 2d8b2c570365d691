//! Logging utilities

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initialize the logger with the given [LevelFilter]
///
/// Calling this more than once is harmless, later calls leave the first
/// logger in place.
pub fn initialize_logger(filter: LevelFilter) {
    Builder::from_env(Env::default())
        .filter_module("rkotp", filter)
        .format_target(false)
        .try_init()
        .ok();
}
