//! Cryptographic building blocks for the rtls protocol engine.
//!
//! This crate holds everything the record and handshake layers need that does
//! not depend on session state:
//! - The algorithm registry (protocol versions, ciphers, MACs, compression,
//!   key exchanges, cipher suites)
//! - Record ciphers (RC4, 3DES-CBC, AES-CBC) and record MACs (HMAC, SSL3 MAC)
//! - Handshake hashes and the SSL3/TLS pseudorandom functions
//! - The pluggable [`CryptoProvider`] and its RustCrypto-backed default
//! - RSA and finite-field Diffie-Hellman key exchange primitives
//!
//! Security notes:
//! - Secrets are returned in `Zeroizing` wrappers
//! - Nothing in this crate logs key material

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cipher;
pub mod error;
pub mod kex;
pub mod mac;
pub mod prf;
pub mod provider;
pub mod suite;

pub use error::{Error, Result};
pub use provider::{CryptoProvider, RustCryptoProvider};
pub use suite::{CipherSuite, ProtocolVersion, SuiteId};
