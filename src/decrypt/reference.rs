//! Reference decrypter: base64 transport encoding over a single-byte XOR.
//!
//! `prepare` normalises the transport string, `decode` strips the base64
//! layer, and `decrypt` removes the XOR layer. [`XorDecrypter::encrypt`] is the
//! inverse and exists so inputs can be produced locally.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Decrypter, DecrypterFactory};
use crate::error::TransformError;

/// Default XOR key.
pub const DEFAULT_CIPHER_KEY: u8 = 0x5a;

/// Base64 + XOR decrypter.
#[derive(Debug, Clone)]
pub struct XorDecrypter {
    id: String,
    key: u8,
}

impl XorDecrypter {
    pub fn new(id: impl Into<String>, key: u8) -> Self {
        Self { id: id.into(), key }
    }

    /// Produce the encrypted form of `plaintext` that this decrypter reverses.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let bytes: Vec<u8> = plaintext.bytes().map(|b| b ^ self.key).collect();
        STANDARD.encode(bytes)
    }
}

#[async_trait]
impl Decrypter for XorDecrypter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prepare(&self, password: &str) -> Result<String, TransformError> {
        let trimmed = password.trim();
        if trimmed.is_empty() {
            return Err(TransformError::prepare("empty password"));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
        {
            return Err(TransformError::prepare(format!(
                "invalid character {bad:?} in encoded password"
            )));
        }
        Ok(trimmed.to_string())
    }

    async fn decode(&self, prepared: &str) -> Result<String, TransformError> {
        let bytes = STANDARD
            .decode(prepared)
            .map_err(|e| TransformError::decode(e.to_string()))?;
        Ok(hex::encode(bytes))
    }

    async fn decrypt(&self, decoded: &str) -> Result<String, TransformError> {
        let bytes = hex::decode(decoded).map_err(|e| TransformError::decrypt(e.to_string()))?;
        let plain: Vec<u8> = bytes.into_iter().map(|b| b ^ self.key).collect();
        String::from_utf8(plain).map_err(|e| TransformError::decrypt(e.to_string()))
    }
}

/// Hands out [`XorDecrypter`]s with sequential identities.
#[derive(Debug)]
pub struct XorDecrypterFactory {
    key: u8,
    next_id: AtomicUsize,
}

impl XorDecrypterFactory {
    pub fn new(key: u8) -> Self {
        Self {
            key,
            next_id: AtomicUsize::new(0),
        }
    }
}

impl Default for XorDecrypterFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CIPHER_KEY)
    }
}

impl DecrypterFactory for XorDecrypterFactory {
    fn create(&self) -> Arc<dyn Decrypter> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(XorDecrypter::new(format!("decrypter-{n}"), self.key))
    }
}
