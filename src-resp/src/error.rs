//! Error type shared by the parser, the validator and the calculator.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RespError>;

/// Everything that can go wrong while reading or evaluating a channel.
///
/// An error aborts the channel (or the request) it occurs in; readers of a
/// multi-channel stream resume at the next channel header.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RespError {
    /// A line could not be read as the expected record.
    #[error("parse error at line {line} (B{blockette:03}F{field:02}): {message}; offending text: '{text}'")]
    Parse {
        line: usize,
        blockette: u32,
        field: u32,
        text: String,
        message: String,
    },

    /// A stage violates the structural rules of a response chain.
    #[error("invalid response structure at stage {stage}: {message}")]
    Structure { stage: u32, message: String },

    /// The output of one stage does not feed the input of the next.
    #[error(
        "units mismatch between stages: stage {previous_stage} outputs {output} but stage {stage} expects {input}"
    )]
    UnitsMismatch {
        previous_stage: u32,
        output: String,
        stage: u32,
        input: String,
    },

    /// The stage range selected nothing.
    #[error("no stage matched the requested range {range}")]
    NoStageMatched { range: String },

    /// A value lies outside the domain of a transfer function.
    #[error("domain error: {0}")]
    Domain(String),

    /// A response list does not overlap the requested frequencies.
    #[error(
        "no requested frequency in the range of the response list ([{min:.6E}, {max:.6E}] Hz, {requested} requested)"
    )]
    NoFrequenciesInRange {
        requested: usize,
        min: f64,
        max: f64,
    },

    /// A declared count could not be honoured.
    #[error("cannot allocate {count} {what}")]
    Resource { what: String, count: usize },

    /// The text holds no channel header.
    #[error("no channel found in input")]
    NoChannel,

    /// Invalid option or frequency grid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RespError {
    pub(crate) fn structure(stage: u32, message: impl Into<String>) -> Self {
        RespError::Structure {
            stage,
            message: message.into(),
        }
    }
}
