//! Subcommands of the `partsync` binary

pub mod backup;
pub mod config;
pub mod copy;
pub mod restore;
