//! CLI subcommand implementations.

pub mod replay;
pub mod sessions;
pub mod util;
