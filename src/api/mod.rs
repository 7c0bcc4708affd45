//! Remote password service integration.
//!
//! ```ignore
//! use decrypt_pool::api::{HttpApiClient, RemoteService, Register, DEFAULT_REQUEST_TIMEOUT};
//!
//! let client = HttpApiClient::new("http://localhost:9000", DEFAULT_REQUEST_TIMEOUT)?;
//! let token = client.register(Register::new("worker-7")).await?.token;
//! ```

pub mod client;
pub mod types;

pub use client::{HttpApiClient, RemoteService, DEFAULT_REQUEST_TIMEOUT};
pub use types::{PasswordRequest, PasswordResponse, Register, RegisterResponse, Validate};
