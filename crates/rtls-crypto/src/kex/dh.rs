//! Finite-field Diffie-Hellman for DHE_RSA, DHE_DSS and anonymous DH.
//!
//! Group arithmetic uses the `BigUint` type re-exported by the `rsa` crate.
//! The shared secret is returned big-endian with leading zero bytes stripped,
//! which is the premaster secret form TLS expects (RFC 2246 §8.1.2).
//!
//! # Example
//!
//! ```
//! use rtls_crypto::kex::{DhKeyPair, DhParams};
//!
//! # fn example() -> Result<(), rtls_crypto::Error> {
//! let params = DhParams::rfc2409_group2();
//! let server = DhKeyPair::generate(&params)?;
//! let client = DhKeyPair::generate(&params)?;
//!
//! let s = server.exchange(&client.public_key())?;
//! let c = client.exchange(&server.public_key())?;
//! assert_eq!(*s, *c);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::BigUint;
use zeroize::Zeroizing;

/// Private exponent length in bytes.
const EXPONENT_LEN: usize = 32;

/// Smallest prime accepted from a peer, in bits.
pub const MIN_PRIME_BITS: usize = 512;

/// RFC 2409 §6.2 prime, 2^1024 - 2^960 - 1 + 2^64 * (floor(2^894 pi) + 129093).
const RFC2409_GROUP2_PRIME: [u8; 128] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2,
    0x21, 0x68, 0xc2, 0x34, 0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1,
    0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74, 0x02, 0x0b, 0xbe, 0xa6,
    0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
    0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d,
    0xf2, 0x5f, 0x14, 0x37, 0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45,
    0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6, 0xf4, 0x4c, 0x42, 0xe9,
    0xa6, 0x37, 0xed, 0x6b, 0x0b, 0xff, 0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed,
    0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5, 0xae, 0x9f, 0x24, 0x11,
    0x7c, 0x4b, 0x1f, 0xe6, 0x49, 0x28, 0x66, 0x51, 0xec, 0xe6, 0x53, 0x81,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// DH group parameters `(p, g)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    prime: BigUint,
    generator: BigUint,
}

impl DhParams {
    /// Build parameters from big-endian prime and generator.
    ///
    /// # Errors
    /// Returns `Error::InvalidPublicKey` if the prime is shorter than
    /// [`MIN_PRIME_BITS`] or the generator is not in `(1, p - 1)`.
    pub fn new(prime: &[u8], generator: &[u8]) -> Result<Self> {
        let prime = BigUint::from_bytes_be(prime);
        let generator = BigUint::from_bytes_be(generator);
        if prime.bits() < MIN_PRIME_BITS {
            return Err(Error::InvalidPublicKey(format!(
                "DH prime of {} bits",
                prime.bits()
            )));
        }
        let one = BigUint::from(1u32);
        if generator <= one || generator >= &prime - &one {
            return Err(Error::InvalidPublicKey("DH generator out of range".into()));
        }
        Ok(Self { prime, generator })
    }

    /// The 1024-bit MODP group from RFC 2409 §6.2 with generator 2.
    pub fn rfc2409_group2() -> Self {
        Self {
            prime: BigUint::from_bytes_be(&RFC2409_GROUP2_PRIME),
            generator: BigUint::from(2u32),
        }
    }

    /// Big-endian prime.
    pub fn prime(&self) -> Vec<u8> {
        self.prime.to_bytes_be()
    }

    /// Big-endian generator.
    pub fn generator(&self) -> Vec<u8> {
        self.generator.to_bytes_be()
    }

    /// Prime size in bits.
    pub fn prime_bits(&self) -> usize {
        self.prime.bits()
    }
}

/// Ephemeral DH key pair.
///
/// The private exponent is kept as big-endian bytes in a `Zeroizing` buffer.
pub struct DhKeyPair {
    params: DhParams,
    secret: Zeroizing<Vec<u8>>,
    public: BigUint,
}

impl DhKeyPair {
    /// Generate a fresh key pair in `params`' group.
    pub fn generate(params: &DhParams) -> Result<Self> {
        let mut secret = Zeroizing::new(vec![0u8; EXPONENT_LEN]);
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| Error::Random(e.to_string()))?;
        // keep the exponent nonzero and full length
        secret[0] |= 0x80;

        let x = BigUint::from_bytes_be(&secret);
        let public = params.generator.modpow(&x, &params.prime);
        Ok(Self {
            params: params.clone(),
            secret,
            public,
        })
    }

    /// Big-endian public value `g^x mod p`.
    pub fn public_key(&self) -> Vec<u8> {
        self.public.to_bytes_be()
    }

    /// Compute the shared secret with the peer's public value.
    ///
    /// # Errors
    /// Returns `Error::InvalidPublicKey` if the peer value is not in `(1, p - 1)`.
    pub fn exchange(&self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let y = BigUint::from_bytes_be(peer_public);
        let one = BigUint::from(1u32);
        let p = &self.params.prime;
        if y <= one || y >= p - &one {
            return Err(Error::InvalidPublicKey("DH public value out of range".into()));
        }
        let x = BigUint::from_bytes_be(&self.secret);
        let shared = y.modpow(&x, p);
        // to_bytes_be never emits leading zeros
        Ok(Zeroizing::new(shared.to_bytes_be()))
    }

    /// Group this key pair belongs to.
    pub fn params(&self) -> &DhParams {
        &self.params
    }
}
