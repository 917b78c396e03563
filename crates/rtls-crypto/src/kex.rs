//! Key exchange primitives.
//!
//! Implements:
//! - RSA premaster encryption and PKCS#1 v1.5 signatures (`rsa` crate)
//! - Finite-field Diffie-Hellman over caller-supplied groups
//!
//! Message framing and which side does what live in the protocol crate; these
//! modules only do the arithmetic.

pub mod dh;
pub mod rsa;

pub use self::dh::{DhKeyPair, DhParams};
pub use self::rsa::SignatureScheme;
