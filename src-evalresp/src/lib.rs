//! evalresp - evaluate seismic instrument responses from RESP files
//!
//! This crate holds the command-line application around the workspace
//! libraries:
//!
//! - `evalresp_core`: RESP parsing and response evaluation
//! - `evalresp_env`: SEEDRESP and RESP file discovery

// Re-export the workspace crates
pub use evalresp_core as resp;
pub use evalresp_env as env;

/// Command-line argument definitions
pub mod cli;
/// Response files and streams
pub mod output;
/// Pipeline steps used by the binary
pub mod workflow;

pub use cli::{Args, validate_args, validate_args_or_exit};
pub use workflow::{Input, RunSummary, Sink, run};
