//! Command-line interface: argument parsing and the init/serve commands.

mod args;
mod commands;

pub use args::{Cli, Command};
pub use commands::{init, run, serve};
