//! CLI subcommand implementations.

pub mod events;
pub mod export;
pub mod info;
pub mod stats;
pub mod traces;
pub mod util;
