//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Record encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Record decryption failed.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Invalid input length.
    #[error("Invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length received in bytes.
        actual: usize,
    },

    /// Invalid key length for the selected algorithm.
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(String),

    /// Algorithm is known to the registry but not usable here.
    #[error("Unsupported algorithm: {0}")]
    Unsupported(String),

    /// The secure random source failed.
    #[error("Random generation failed: {0}")]
    Random(String),

    /// Key exchange failed.
    #[error("Key exchange failed: {0}")]
    KeyExchange(String),

    /// Invalid public key received from the peer.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature generation or verification failed.
    #[error("Signature error: {0}")]
    Signature(String),
}
