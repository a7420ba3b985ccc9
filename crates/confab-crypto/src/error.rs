//! Error types for message encryption

use thiserror::Error;

/// Errors that can occur while sealing or opening message tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material is not a valid 256-bit URL-safe base64 key
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Error during encryption
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication or decryption failure (tampering or wrong key)
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Token is not decodable as a sealed message
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Decrypted bytes are not valid UTF-8
    #[error("invalid UTF-8 in decrypted message: {0}")]
    InvalidUtf8(String),
}
