//! Record MACs and handshake hashes.
//!
//! Implements:
//! - HMAC-MD5, HMAC-SHA1, HMAC-SHA256 (TLS 1.0+ record MAC)
//! - The SSL 3.0 record MAC (`hash(secret || pad2 || hash(secret || pad1 || data))`)
//! - The SSL 3.0 handshake MAC used for Finished and CertificateVerify
//! - A cloneable running hash over MD5, SHA-1 and SHA-256

use crate::suite::MacAlgorithm;
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::{Digest, Sha1};
use sha2::Sha256;

const SSL3_PAD1: u8 = 0x36;
const SSL3_PAD2: u8 = 0x5c;

/// SSL 3.0 pad length for a hash: 48 bytes for MD5, 40 for SHA-1.
fn ssl3_pad_len(alg: MacAlgorithm) -> usize {
    match alg {
        MacAlgorithm::Sha1 => 40,
        _ => 48,
    }
}

/// Running hash over one of the supported digests.
#[derive(Clone)]
pub enum HashContext {
    /// MD5.
    Md5(Md5),
    /// SHA-1.
    Sha1(Sha1),
    /// SHA-256.
    Sha256(Sha256),
}

impl HashContext {
    /// Start a new hash for `alg`.
    ///
    /// # Errors
    /// Returns `Error::Unsupported` for the null algorithm.
    pub fn new(alg: MacAlgorithm) -> Result<Self> {
        match alg {
            MacAlgorithm::Md5 => Ok(HashContext::Md5(Md5::new())),
            MacAlgorithm::Sha1 => Ok(HashContext::Sha1(Sha1::new())),
            MacAlgorithm::Sha256 => Ok(HashContext::Sha256(Sha256::new())),
            MacAlgorithm::Null => Err(Error::Unsupported("NULL hash".into())),
        }
    }

    /// Absorb `data`.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashContext::Md5(h) => h.update(data),
            HashContext::Sha1(h) => h.update(data),
            HashContext::Sha256(h) => h.update(data),
        }
    }

    /// Finish and return the digest.
    pub fn finish(self) -> Vec<u8> {
        match self {
            HashContext::Md5(h) => h.finalize().to_vec(),
            HashContext::Sha1(h) => h.finalize().to_vec(),
            HashContext::Sha256(h) => h.finalize().to_vec(),
        }
    }

    /// Algorithm this context hashes with.
    pub fn algorithm(&self) -> MacAlgorithm {
        match self {
            HashContext::Md5(_) => MacAlgorithm::Md5,
            HashContext::Sha1(_) => MacAlgorithm::Sha1,
            HashContext::Sha256(_) => MacAlgorithm::Sha256,
        }
    }
}

/// One-shot digest of `data`.
pub fn digest(alg: MacAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    let mut h = HashContext::new(alg)?;
    h.update(data);
    Ok(h.finish())
}

/// A keyed record MAC, fed incrementally and consumed on finish.
pub trait RecordMac: Send {
    /// Absorb `data`.
    fn update(&mut self, data: &[u8]);

    /// Finish and return the tag.
    fn finish(self: Box<Self>) -> Vec<u8>;
}

/// RustCrypto-backed record MAC.
pub enum MacContext {
    /// No MAC; finishes to an empty tag.
    Null,
    /// HMAC-MD5.
    HmacMd5(Hmac<Md5>),
    /// HMAC-SHA1.
    HmacSha1(Hmac<Sha1>),
    /// HMAC-SHA256.
    HmacSha256(Hmac<Sha256>),
    /// SSL 3.0 MAC; the inner hash already holds `secret || pad1`.
    Ssl3 {
        /// Inner hash.
        inner: HashContext,
        /// MAC write secret.
        secret: zeroize::Zeroizing<Vec<u8>>,
    },
}

impl MacContext {
    /// Key a MAC for `alg` with `secret`.
    ///
    /// # Arguments
    /// * `alg` - MAC algorithm of the negotiated suite
    /// * `secret` - MAC write secret from the key block
    /// * `ssl3` - Use the SSL 3.0 MAC construction instead of HMAC
    ///
    /// # Errors
    /// Returns `Error::Unsupported` for SHA-256 with `ssl3`.
    pub fn new(alg: MacAlgorithm, secret: &[u8], ssl3: bool) -> Result<Self> {
        let bad_key = |_| Error::InvalidKeyLength("HMAC key".into());
        if ssl3 {
            if alg == MacAlgorithm::Null {
                return Ok(MacContext::Null);
            }
            if alg == MacAlgorithm::Sha256 {
                return Err(Error::Unsupported("SHA256 with the SSL3 MAC".into()));
            }
            let mut inner = HashContext::new(alg)?;
            inner.update(secret);
            inner.update(&vec![SSL3_PAD1; ssl3_pad_len(alg)]);
            return Ok(MacContext::Ssl3 {
                inner,
                secret: zeroize::Zeroizing::new(secret.to_vec()),
            });
        }
        Ok(match alg {
            MacAlgorithm::Null => MacContext::Null,
            MacAlgorithm::Md5 => MacContext::HmacMd5(Hmac::<Md5>::new_from_slice(secret).map_err(bad_key)?),
            MacAlgorithm::Sha1 => MacContext::HmacSha1(Hmac::<Sha1>::new_from_slice(secret).map_err(bad_key)?),
            MacAlgorithm::Sha256 => {
                MacContext::HmacSha256(Hmac::<Sha256>::new_from_slice(secret).map_err(bad_key)?)
            }
        })
    }
}

impl RecordMac for MacContext {
    fn update(&mut self, data: &[u8]) {
        match self {
            MacContext::Null => {}
            MacContext::HmacMd5(m) => m.update(data),
            MacContext::HmacSha1(m) => m.update(data),
            MacContext::HmacSha256(m) => m.update(data),
            MacContext::Ssl3 { inner, .. } => inner.update(data),
        }
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        match *self {
            MacContext::Null => Vec::new(),
            MacContext::HmacMd5(m) => m.finalize().into_bytes().to_vec(),
            MacContext::HmacSha1(m) => m.finalize().into_bytes().to_vec(),
            MacContext::HmacSha256(m) => m.finalize().into_bytes().to_vec(),
            MacContext::Ssl3 { inner, secret } => {
                let alg = inner.algorithm();
                let inner_digest = inner.finish();
                let mut outer = match alg {
                    MacAlgorithm::Md5 => HashContext::Md5(Md5::new()),
                    _ => HashContext::Sha1(Sha1::new()),
                };
                outer.update(&secret);
                outer.update(&vec![SSL3_PAD2; ssl3_pad_len(alg)]);
                outer.update(&inner_digest);
                outer.finish()
            }
        }
    }
}

/// Finish an SSL 3.0 handshake MAC.
///
/// `hash` must already hold the handshake messages (and the sender label, for
/// Finished). Computes `hash(master || pad2 || hash(messages || master || pad1))`.
///
/// # Errors
/// Returns `Error::Unsupported` if `hash` is not MD5 or SHA-1.
pub fn ssl3_handshake_mac(mut hash: HashContext, master: &[u8]) -> Result<Vec<u8>> {
    let alg = hash.algorithm();
    if alg == MacAlgorithm::Sha256 {
        return Err(Error::Unsupported("SHA256 handshake MAC in SSL3".into()));
    }
    let pad = ssl3_pad_len(alg);
    hash.update(master);
    hash.update(&vec![SSL3_PAD1; pad]);
    let inner = hash.finish();

    let mut outer = HashContext::new(alg)?;
    outer.update(master);
    outer.update(&vec![SSL3_PAD2; pad]);
    outer.update(&inner);
    Ok(outer.finish())
}
