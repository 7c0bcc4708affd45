//! Worker pool coordination.
//!
//! # Architecture
//!
//! - **Source**: polls the remote service for encrypted passwords
//! - **Merge**: fans the source and the retry stream into one input
//! - **Worker**: runs one decryption attempt and reports success or requeues
//! - **Generation**: a cancellable cohort of `pool_size` workers, owned by the
//!   [`Supervisor`] which implements the reset protocol
//! - **Runner**: the main loop that validates results and triggers resets
//!
//! # Flow
//!
//! 1. A reset pulls `pool_size` requests off the merged input and launches a
//!    worker for each under a fresh cancellation scope
//! 2. Every completed result refills its slot with the next request, then is
//!    sent to the remote validator
//! 3. A failing worker requeues its request and closes the generation's result
//!    channel; once the channel is drained the loop resets again
//!
//! # Example
//!
//! ```rust,ignore
//! use decrypt_pool::api::HttpApiClient;
//! use decrypt_pool::decrypt::XorDecrypterFactory;
//! use decrypt_pool::pipeline::{DecryptionPipeline, PipelineConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PipelineConfig::from_env()?;
//! let remote = Arc::new(HttpApiClient::new(&config.api_url, config.request_timeout)?);
//! let factory = Arc::new(XorDecrypterFactory::new(config.cipher_key));
//! let shutdown = CancellationToken::new();
//!
//! let pipeline = DecryptionPipeline::connect(remote, factory, &config, &shutdown).await?;
//! let stats = pipeline.run(shutdown).await?;
//! println!("Validated {} passwords", stats.validated);
//! ```

pub mod config;
pub mod generation;
pub mod merge;
pub mod runner;
pub mod source;
pub mod stats;
pub mod worker;

pub use config::{ConfigError, OrphanPolicy, PipelineConfig};
pub use generation::{Generation, GenerationId, Supervisor, SupervisorState};
pub use merge::{merge, Merge, MergedStream};
pub use runner::DecryptionPipeline;
pub use source::password_source;
pub use stats::{PipelineStats, StatsSnapshot};
pub use worker::{result_channel, DecryptionResult, Outcome, ResultSink, ResultStream, Worker};
