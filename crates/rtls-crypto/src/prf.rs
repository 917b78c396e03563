//! Pseudorandom functions and key derivation.
//!
//! Implements:
//! - `P_hash` over HMAC (RFC 2246 §5)
//! - TLS 1.0/1.1 PRF: `P_MD5(S1, label || seed) xor P_SHA1(S2, label || seed)`
//! - TLS 1.2 PRF: `P_SHA256(secret, label || seed)` (RFC 5246 §5)
//! - SSL 3.0 key generation: `MD5(secret || SHA1("A" || secret || seed)) || ...`
//! - Master secret, key block and export key derivation

use crate::suite::{BulkCipher, MacAlgorithm, PrfAlgorithm, ProtocolVersion, EXPORT_FINAL_KEY_SIZE};
use crate::{Error, Result};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Master secret length.
pub const MASTER_SECRET_LEN: usize = 48;

/// Random value length (client and server random).
pub const RANDOM_LEN: usize = 32;

/// TLS Finished verify_data length.
pub const TLS_FINISHED_LEN: usize = 12;

/// SSL 3.0 Finished length (MD5 || SHA-1).
pub const SSL3_FINISHED_LEN: usize = 36;

/// Longest output of SSL 3.0 key generation (26 salts "A".."ZZ..Z").
const SSL3_MAX_OUTPUT: usize = 26 * 16;

/// `P_hash(secret, seed)` XORed into `out`.
fn p_hash_xor<M: Mac + KeyInit + Clone>(secret: &[u8], seed: &[u8], out: &mut [u8]) -> Result<()> {
    let keyed = <M as KeyInit>::new_from_slice(secret)
        .map_err(|_| Error::KeyDerivation("HMAC key".into()))?;

    // A(1) = HMAC(secret, seed)
    let mut mac = keyed.clone();
    mac.update(seed);
    let mut a = mac.finalize().into_bytes();

    let mut pos = 0;
    while pos < out.len() {
        let mut mac = keyed.clone();
        mac.update(&a);
        mac.update(seed);
        let block = mac.finalize().into_bytes();

        let n = block.len().min(out.len() - pos);
        for (o, b) in out[pos..pos + n].iter_mut().zip(block.iter()) {
            *o ^= b;
        }
        pos += n;

        let mut mac = keyed.clone();
        mac.update(&a);
        a = mac.finalize().into_bytes();
    }
    Ok(())
}

/// TLS pseudorandom function.
///
/// # Arguments
/// * `alg` - `Md5Sha1` (TLS 1.0/1.1) or `Sha256` (TLS 1.2)
/// * `secret` - PRF secret
/// * `label` - ASCII label, e.g. `b"master secret"`
/// * `seed` - Seed bytes
/// * `len` - Output length
///
/// # Errors
/// Returns `Error::Unsupported` for the SSL 3.0 family, which has no labeled PRF.
pub fn prf(alg: PrfAlgorithm, secret: &[u8], label: &[u8], seed: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);

    let mut out = Zeroizing::new(vec![0u8; len]);
    match alg {
        PrfAlgorithm::Md5Sha1 => {
            // S1 and S2 overlap by one byte when the secret length is odd.
            let half = secret.len().div_ceil(2);
            let s1 = &secret[..half];
            let s2 = &secret[secret.len() - half..];
            p_hash_xor::<Hmac<Md5>>(s1, &label_seed, &mut out)?;
            p_hash_xor::<Hmac<Sha1>>(s2, &label_seed, &mut out)?;
        }
        PrfAlgorithm::Sha256 => p_hash_xor::<Hmac<Sha256>>(secret, &label_seed, &mut out)?,
        PrfAlgorithm::Ssl3 => return Err(Error::Unsupported("labeled PRF in SSL3".into())),
    }
    Ok(out)
}

/// SSL 3.0 key generation.
///
/// # Errors
/// Returns `Error::KeyDerivation` if more than 416 bytes are requested.
pub fn ssl3_generate(secret: &[u8], seed: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
    if len > SSL3_MAX_OUTPUT {
        return Err(Error::KeyDerivation(format!("SSL3 output of {len} bytes")));
    }
    let mut out = Zeroizing::new(Vec::with_capacity(len.next_multiple_of(16)));
    let mut i = 0u8;
    while out.len() < len {
        let salt = vec![b'A' + i; usize::from(i) + 1];
        let mut sha = Sha1::new();
        sha.update(&salt);
        sha.update(secret);
        sha.update(seed);
        let sha = sha.finalize();

        let mut md5 = Md5::new();
        md5.update(secret);
        md5.update(sha);
        out.extend_from_slice(&md5.finalize());
        i += 1;
    }
    out.truncate(len);
    Ok(out)
}

fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(a.len() + b.len());
    v.extend_from_slice(a);
    v.extend_from_slice(b);
    v
}

/// Derive the 48-byte master secret from the premaster secret.
///
/// Seed is `client_random || server_random`.
pub fn derive_master_secret(
    version: ProtocolVersion,
    premaster: &[u8],
    client_random: &[u8; RANDOM_LEN],
    server_random: &[u8; RANDOM_LEN],
) -> Result<Zeroizing<[u8; MASTER_SECRET_LEN]>> {
    let seed = concat(client_random, server_random);
    let bytes = match version.prf() {
        PrfAlgorithm::Ssl3 => ssl3_generate(premaster, &seed, MASTER_SECRET_LEN)?,
        alg => prf(alg, premaster, b"master secret", &seed, MASTER_SECRET_LEN)?,
    };
    let mut master = Zeroizing::new([0u8; MASTER_SECRET_LEN]);
    master.copy_from_slice(&bytes);
    Ok(master)
}

/// Keys, MAC secrets and IVs for both directions.
pub struct KeyMaterial {
    /// Client write MAC secret.
    pub client_mac: Zeroizing<Vec<u8>>,
    /// Server write MAC secret.
    pub server_mac: Zeroizing<Vec<u8>>,
    /// Client write key (final, after export expansion).
    pub client_key: Zeroizing<Vec<u8>>,
    /// Server write key (final, after export expansion).
    pub server_key: Zeroizing<Vec<u8>>,
    /// Client write IV.
    pub client_iv: Zeroizing<Vec<u8>>,
    /// Server write IV.
    pub server_iv: Zeroizing<Vec<u8>>,
}

/// Expand the master secret into the key block and split it.
///
/// Seed is `server_random || client_random`. Export ciphers get their keys
/// expanded to 16 bytes per the SSL 3.0 / TLS 1.0 export rules.
///
/// # Errors
/// Returns `Error::Unsupported` for export block ciphers, which have no
/// registry entry.
pub fn derive_key_material(
    version: ProtocolVersion,
    cipher: BulkCipher,
    mac: MacAlgorithm,
    master: &[u8],
    client_random: &[u8; RANDOM_LEN],
    server_random: &[u8; RANDOM_LEN],
) -> Result<KeyMaterial> {
    let mac_len = mac.output_len();
    let key_len = cipher.key_size();
    let iv_len = cipher.iv_size();
    if cipher.is_export() && iv_len > 0 {
        return Err(Error::Unsupported(format!("export block cipher {}", cipher.name())));
    }
    let total = 2 * (mac_len + key_len + iv_len);

    let seed = concat(server_random, client_random);
    let block = match version.prf() {
        PrfAlgorithm::Ssl3 => ssl3_generate(master, &seed, total)?,
        alg => prf(alg, master, b"key expansion", &seed, total)?,
    };

    let mut pos = 0;
    let mut take = |n: usize| {
        let part = Zeroizing::new(block[pos..pos + n].to_vec());
        pos += n;
        part
    };
    let client_mac = take(mac_len);
    let server_mac = take(mac_len);
    let mut client_key = take(key_len);
    let mut server_key = take(key_len);
    let client_iv = take(iv_len);
    let server_iv = take(iv_len);

    if cipher.is_export() {
        let cs = concat(client_random, server_random);
        if version.is_ssl3() {
            let sc = concat(server_random, client_random);
            client_key = export_key_ssl3(&client_key, &cs);
            server_key = export_key_ssl3(&server_key, &sc);
        } else {
            client_key = prf(version.prf(), &client_key, b"client write key", &cs, EXPORT_FINAL_KEY_SIZE)?;
            server_key = prf(version.prf(), &server_key, b"server write key", &cs, EXPORT_FINAL_KEY_SIZE)?;
        }
    }

    Ok(KeyMaterial {
        client_mac,
        server_mac,
        client_key,
        server_key,
        client_iv,
        server_iv,
    })
}

fn export_key_ssl3(key: &[u8], randoms: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut md5 = Md5::new();
    md5.update(key);
    md5.update(randoms);
    let mut out = md5.finalize().to_vec();
    out.truncate(EXPORT_FINAL_KEY_SIZE);
    Zeroizing::new(out)
}
