//! Error types for decrypt-pool operations.
//!
//! Defines the error taxonomy shared by every subsystem:
//! - Remote service calls (registration, password fetch, validation)
//! - Decryption stage failures
//! - Pipeline coordination (supervisor and main loop)

use thiserror::Error;

use crate::pipeline::config::ConfigError;

/// Errors that can occur while talking to the remote password service.
///
/// None of these are recovered by the pipeline: they end the run.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    Status { code: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// The decryption stage that produced a [`TransformError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Decode,
    Decrypt,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Prepare => write!(f, "prepare"),
            Stage::Decode => write!(f, "decode"),
            Stage::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// A failure inside one of the three decryption stages.
///
/// Recovered locally by the worker, which requeues the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} stage failed: {reason}")]
pub struct TransformError {
    pub stage: Stage,
    pub reason: String,
}

impl TransformError {
    pub fn prepare(reason: impl Into<String>) -> Self {
        Self {
            stage: Stage::Prepare,
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self {
            stage: Stage::Decode,
            reason: reason.into(),
        }
    }

    pub fn decrypt(reason: impl Into<String>) -> Self {
        Self {
            stage: Stage::Decrypt,
            reason: reason.into(),
        }
    }
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Remote service error: {0}")]
    Remote(#[from] ApiError),

    #[error("Merged input stream closed")]
    InputClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_display_names_stage() {
        let err = TransformError::decode("bad padding");
        assert_eq!(err.stage, Stage::Decode);
        assert_eq!(err.to_string(), "decode stage failed: bad padding");
    }

    #[test]
    fn test_pipeline_error_from_api_error() {
        let err: PipelineError = ApiError::Status {
            code: 503,
            message: "unavailable".to_string(),
        }
        .into();

        assert!(matches!(err, PipelineError::Remote(_)));
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("unavailable"));
    }
}
