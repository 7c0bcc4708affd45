//! Command-line interface for decrypt-pool.
//!
//! Provides the long-running `run` command plus local `decrypt` and
//! `encrypt` helpers for the reference cipher.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
