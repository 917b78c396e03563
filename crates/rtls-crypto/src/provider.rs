//! Pluggable source of randomness, ciphers and MACs.

use crate::cipher::{CipherContext, Direction, RecordCipher};
use crate::mac::{MacContext, RecordMac};
use crate::suite::{BulkCipher, MacAlgorithm};
use crate::{Error, Result};
use core::fmt;
use rand::rngs::OsRng;
use rand::RngCore;

/// Cryptographic backend used by a session.
///
/// The engine never touches a cipher, MAC or random source except through
/// this trait, so a session can be pointed at a different backend (or a
/// deterministic one in tests) without changing the protocol code.
pub trait CryptoProvider: Send + Sync + fmt::Debug {
    /// Fill `buf` with cryptographically secure random bytes.
    fn random(&self, buf: &mut [u8]) -> Result<()>;

    /// Create a keyed cipher context for one record direction.
    fn new_cipher(
        &self,
        cipher: BulkCipher,
        key: &[u8],
        iv: &[u8],
        direction: Direction,
    ) -> Result<Box<dyn RecordCipher>>;

    /// Create a keyed record MAC.
    fn new_mac(&self, mac: MacAlgorithm, secret: &[u8], ssl3: bool) -> Result<Box<dyn RecordMac>>;
}

/// Default provider: RustCrypto primitives and the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn random(&self, buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| Error::Random(e.to_string()))
    }

    fn new_cipher(
        &self,
        cipher: BulkCipher,
        key: &[u8],
        iv: &[u8],
        direction: Direction,
    ) -> Result<Box<dyn RecordCipher>> {
        Ok(Box::new(CipherContext::new(cipher, key, iv, direction)?))
    }

    fn new_mac(&self, mac: MacAlgorithm, secret: &[u8], ssl3: bool) -> Result<Box<dyn RecordMac>> {
        Ok(Box::new(MacContext::new(mac, secret, ssl3)?))
    }
}
