//! Mining analytics CLI library.
//!
//! This crate provides the CLI interface for replaying journals through the
//! session tracker and browsing recorded sessions.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
