//! AES-256-GCM message sealing
//!
//! Tokens are `version byte || 12-byte nonce || ciphertext+tag`, URL-safe
//! base64 without padding. The AAD domain tag binds tokens to room-message
//! use so they cannot be replayed into another context.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::Result;

/// Current token format version
const TOKEN_VERSION: u8 = 1;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

/// Domain separation AAD for room messages
const ROOM_AAD: &[u8] = b"confab-room-v1";

/// Stateless message cipher holding the process-wide 256-bit key
///
/// Safe to share by reference across tasks; the key is wiped from memory
/// on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageCipher {
    key: [u8; 32],
}

impl MessageCipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Load the key from its URL-safe base64 configuration form
    ///
    /// Trailing `=` padding is tolerated. The decoded key must be exactly
    /// 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| CryptoError::InvalidKey(format!("not valid base64: {}", e)))?;
        let key: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKey(format!("need 32 bytes, got {}", v.len())))?;
        Ok(Self { key })
    }

    /// Encrypt cleartext into a self-describing token
    ///
    /// Each call draws a fresh random nonce, so sealing the same cleartext
    /// twice yields distinct tokens.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new((&self.key).into());
        let payload = Payload {
            msg: plaintext.as_bytes(),
            aad: ROOM_AAD,
        };
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut token = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    /// Decrypt a token back to cleartext, verifying authenticity
    pub fn open(&self, token: &str) -> Result<String> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|e| CryptoError::Malformed(format!("not valid base64: {}", e)))?;

        if raw.len() < 1 + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Malformed(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }
        if raw[0] != TOKEN_VERSION {
            return Err(CryptoError::Malformed(format!(
                "unsupported token version {}",
                raw[0]
            )));
        }

        let (nonce, ciphertext) = raw[1..].split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new((&self.key).into());
        let payload = Payload {
            msg: ciphertext,
            aad: ROOM_AAD,
        };
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| CryptoError::Decryption("ciphertext rejected".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CryptoError::InvalidUtf8(e.to_string()))
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}
