//! CLI argument definitions using clap
//!
//! Commands:
//! - tabula init --data-dir <path>
//! - tabula serve --port <port> --data-dir <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::http::DEFAULT_PORT;

/// Tabula - multi-tenant dynamic schema and query engine
#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory and an empty metadata snapshot
    Init {
        /// Data directory
        #[arg(long, default_value = "./tabula-data")]
        data_dir: PathBuf,
    },

    /// Start the HTTP server
    Serve {
        /// Listen port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Data directory holding the metadata snapshot
        #[arg(long, default_value = "./tabula-data")]
        data_dir: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
