use thiserror::Error;

/// Typed failures surfaced by the analysis pipeline.
///
/// None of these are retried internally: every stage is a deterministic
/// transform of its input. Low signal quality is not an error and is
/// reported through the confidence score instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("filter design failed: {0}")]
    FilterDesign(String),

    #[error("numerical instability in {stage} stage: {detail}")]
    NumericalInstability { stage: &'static str, detail: String },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
