//! Error types for the Cardboard demo
//!
//! Missing calibration is not an error; it is reported through
//! `RefreshOutcome::NotReady`.

use thiserror::Error;

/// Result type alias for Cardboard demo operations
pub type Result<T> = std::result::Result<T, VrError>;

#[derive(Error, Debug)]
pub enum VrError {
    /// A shader stage failed to compile; carries the driver log
    #[error("Shader compile error ({stage}): {log}")]
    ShaderCompile { stage: &'static str, log: String },

    /// The object program failed to link
    #[error("Program link error: {0}")]
    ProgramLink(String),

    /// An SDK object could not be created
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A video frame did not match its declared dimensions
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// An operation ran before the surface was set up
    #[error("Not initialized: {0}")]
    NotInitialized(&'static str),

    /// GL ES entry points could not be resolved
    #[error("GL load error: {0}")]
    GlLoad(String),
}
