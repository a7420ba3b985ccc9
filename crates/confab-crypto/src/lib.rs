//! Confab message encryption
//!
//! Room messages are encrypted at rest with AES-256-GCM under a single
//! process-wide key loaded from configuration. Ciphertext is carried as a
//! self-describing URL-safe base64 token so the store never sees cleartext.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod error;

pub use cipher::MessageCipher;
pub use error::CryptoError;

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
