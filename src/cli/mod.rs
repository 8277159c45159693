//! Command Line Interface (CLI) layer for geefetch.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`): logging setup, config loading and
//! dispatch of each subcommand to `geefetch::api`.
//!
//! If you are embedding geefetch into another application, prefer using
//! the high-level `geefetch::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
