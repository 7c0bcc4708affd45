//! Decryption capability consumed by the worker pool.
//!
//! A [`Decrypter`] turns one encrypted password into plaintext through three
//! sequential stages: `prepare`, `decode` and `decrypt`. Any stage may fail.
//! The pool never runs more than [`MAX_CLIENT_COUNT`] decrypters at once.

pub mod reference;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::error::TransformError;

pub use reference::{XorDecrypter, XorDecrypterFactory};

/// Maximum number of decrypters that may run concurrently.
pub const MAX_CLIENT_COUNT: usize = 7;

/// A three-stage password decrypter.
#[async_trait]
pub trait Decrypter: Send + Sync {
    /// Identity used to attribute results to this decrypter.
    fn id(&self) -> &str;

    async fn prepare(&self, password: &str) -> Result<String, TransformError>;

    async fn decode(&self, prepared: &str) -> Result<String, TransformError>;

    async fn decrypt(&self, decoded: &str) -> Result<String, TransformError>;
}

/// Creates the decrypter bound to a fresh pool slot.
pub trait DecrypterFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Decrypter>;
}

impl<F> DecrypterFactory for F
where
    F: Fn() -> Arc<dyn Decrypter> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Decrypter> {
        self()
    }
}

/// Run one stage, then yield so a pending cancellation is observed before the
/// next stage starts.
pub async fn computation<T, F>(stage: F) -> T
where
    F: Future<Output = T>,
{
    let output = stage.await;
    tokio::task::yield_now().await;
    output
}

/// Run all three stages of `decrypter` over `password`.
pub async fn run_stages(decrypter: &dyn Decrypter, password: &str) -> Result<String, TransformError> {
    let prepared = computation(decrypter.prepare(password)).await?;
    let decoded = computation(decrypter.decode(&prepared)).await?;
    computation(decrypter.decrypt(&decoded)).await
}
