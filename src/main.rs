//! Tabula CLI entry point
//!
//! Thin wrapper: parse arguments, dispatch, print errors to stderr, and
//! exit non-zero on failure. All logic lives in the cli module.

use tabula::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
