//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the novelist binary.

mod commands;
mod logging;
mod run;
mod status;

pub use commands::{Cli, Commands, LogFormat, RunArgs};
pub use logging::init_tracing;
pub use run::{CommandOutcome, handle_retry_command, handle_run_command, load_config, load_seed_ideas};
pub use status::handle_status_command;
