//! Command-line interface for pairforge.
//!
//! Provides the `generate` command that runs the full pipeline: load the
//! input lists, drain them through the worker pool, and persist the dataset.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, GenerateArgs};
