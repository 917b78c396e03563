//! RSA key transport and signatures.
//!
//! - Premaster secrets are encrypted with PKCS#1 v1.5 (RFC 2246 §7.4.7.1)
//! - Before TLS 1.2, signatures cover `MD5(x) || SHA1(x)` with no DigestInfo
//! - TLS 1.2 signatures cover `SHA256(x)` wrapped in a DigestInfo
//!
//! # Security
//!
//! Decryption failures are reported as errors here; masking them against
//! Bleichenbacher-style oracles is the caller's job.

use crate::mac::digest;
use crate::suite::{MacAlgorithm, ProtocolVersion};
use crate::{Error, Result};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Largest modulus a temporary export key may have, in bits.
pub const EXPORT_MAX_MODULUS_BITS: usize = 512;

/// Digest and padding used for handshake signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// `MD5 || SHA1`, raw PKCS#1 v1.5 (SSL 3.0 to TLS 1.1).
    Md5Sha1,
    /// SHA-256 with DigestInfo (TLS 1.2, `rsa_pkcs1_sha256`).
    Sha256,
}

impl SignatureScheme {
    /// Scheme a protocol version signs with.
    pub fn for_version(version: ProtocolVersion) -> Self {
        if version.has_signature_algorithms() {
            SignatureScheme::Sha256
        } else {
            SignatureScheme::Md5Sha1
        }
    }

    /// Hash `data` the way this scheme expects.
    pub fn digest(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            SignatureScheme::Md5Sha1 => {
                let mut out = digest(MacAlgorithm::Md5, data)?;
                out.extend_from_slice(&digest(MacAlgorithm::Sha1, data)?);
                Ok(out)
            }
            SignatureScheme::Sha256 => digest(MacAlgorithm::Sha256, data),
        }
    }

    /// TLS 1.2 `SignatureAndHashAlgorithm` bytes: (sha256, rsa).
    pub fn wire_prefix(self) -> Option<[u8; 2]> {
        match self {
            SignatureScheme::Md5Sha1 => None,
            SignatureScheme::Sha256 => Some([4, 1]),
        }
    }

    fn padding(self) -> Pkcs1v15Sign {
        match self {
            SignatureScheme::Md5Sha1 => Pkcs1v15Sign::new_unprefixed(),
            SignatureScheme::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        }
    }
}

/// Encrypt a premaster secret to the server's key.
///
/// # Errors
/// Returns `Error::KeyExchange` if the key is too small for the message.
pub fn encrypt_premaster(public: &RsaPublicKey, premaster: &[u8]) -> Result<Vec<u8>> {
    public
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, premaster)
        .map_err(|e| Error::KeyExchange(format!("RSA encrypt: {e}")))
}

/// Decrypt a premaster secret with the server's key.
///
/// # Errors
/// Returns `Error::KeyExchange` on any padding or length failure.
pub fn decrypt_premaster(private: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    private
        .decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, ciphertext)
        .map(Zeroizing::new)
        .map_err(|e| Error::KeyExchange(format!("RSA decrypt: {e}")))
}

/// Sign a precomputed digest.
pub fn sign(private: &RsaPrivateKey, scheme: SignatureScheme, digest: &[u8]) -> Result<Vec<u8>> {
    private
        .sign_with_rng(&mut OsRng, scheme.padding(), digest)
        .map_err(|e| Error::Signature(format!("RSA sign: {e}")))
}

/// Verify a signature over a precomputed digest.
///
/// # Errors
/// Returns `Error::Signature` if the signature does not match.
pub fn verify(public: &RsaPublicKey, scheme: SignatureScheme, digest: &[u8], signature: &[u8]) -> Result<()> {
    public
        .verify(scheme.padding(), digest, signature)
        .map_err(|_| Error::Signature("RSA signature mismatch".into()))
}

/// Big-endian modulus and exponent of a public key.
pub fn public_key_parts(public: &RsaPublicKey) -> (Vec<u8>, Vec<u8>) {
    (public.n().to_bytes_be(), public.e().to_bytes_be())
}

/// Rebuild a public key from big-endian modulus and exponent.
///
/// # Errors
/// Returns `Error::InvalidPublicKey` for values the `rsa` crate rejects.
pub fn public_key_from_parts(modulus: &[u8], exponent: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::new(BigUint::from_bytes_be(modulus), BigUint::from_bytes_be(exponent))
        .map_err(|e| Error::InvalidPublicKey(e.to_string()))
}

/// Modulus size in bits.
pub fn modulus_bits(public: &RsaPublicKey) -> usize {
    public.n().bits()
}
