//! Subcommand implementations.

pub mod add;
pub mod config;
pub mod idle;
pub mod probe;
pub mod set;
pub mod show;
pub mod toggle;
pub mod watch;
