//! Request and response bodies exchanged with the password service.

use serde::{Deserialize, Serialize};

/// Registration request carrying the caller's display identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Register {
    pub name: String,
}

impl Register {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Session token issued on registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterResponse {
    pub token: String,
}

/// Request for the next encrypted password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PasswordRequest {
    pub token: String,
}

impl PasswordRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResponse {
    pub encrypted_password: String,
}

/// A decrypted password submitted for validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Validate {
    pub token: String,
    /// The encrypted value as it was received from the service.
    pub encrypted_password: String,
    /// The plaintext produced by the decrypter.
    pub decrypted_password: String,
}

impl Validate {
    pub fn new(
        token: impl Into<String>,
        encrypted_password: impl Into<String>,
        decrypted_password: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            encrypted_password: encrypted_password.into(),
            decrypted_password: decrypted_password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_response_uses_camel_case() {
        let response: PasswordResponse =
            serde_json::from_str(r#"{"encryptedPassword":"abc="}"#).expect("valid json");
        assert_eq!(response.encrypted_password, "abc=");
    }

    #[test]
    fn test_validate_serializes_wire_names() {
        let body = serde_json::to_value(Validate::new("tok", "enc", "plain")).expect("serialize");

        assert_eq!(body["token"], "tok");
        assert_eq!(body["encryptedPassword"], "enc");
        assert_eq!(body["decryptedPassword"], "plain");
    }
}
