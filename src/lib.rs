//! decrypt-pool: a generational worker pool for remote password decryption.
//!
//! This library fetches encrypted passwords from a remote service, decrypts
//! them on a bounded pool of cancellable workers, and reports the results
//! back for validation.

pub mod api;
pub mod cli;
pub mod decrypt;
pub mod error;
pub mod pipeline;

// Re-export commonly used error types
pub use error::{ApiError, PipelineError, Stage, TransformError};
