//! Command Line Interface (CLI) layer for rastermeta.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for a crawl: metadata records,
//! optional previews and the error listing. It wires user-provided options
//! to the library functionality exposed via `rastermeta::api`.
//!
//! If you are embedding rastermeta into another application, prefer using
//! the high-level `rastermeta::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
