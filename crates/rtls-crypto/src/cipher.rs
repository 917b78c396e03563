//! Record-layer bulk ciphers.
//!
//! Implements:
//! - RC4 (128-bit keys; export keys are expanded to 128 bits before use)
//! - 3DES-EDE, AES-128 and AES-256 in CBC mode
//! - The null cipher
//!
//! CBC contexts keep their chaining state between calls, so consecutive
//! records chain their IVs the way SSL 3.0 and TLS 1.0 require. Callers do the
//! padding; `encrypt`/`decrypt` only accept whole blocks.

use crate::suite::BulkCipher;
use crate::{Error, Result};
use cipher::consts::U16;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type TdesCbcEnc = cbc::Encryptor<des::TdesEde3>;
type TdesCbcDec = cbc::Decryptor<des::TdesEde3>;
type Rc4_128 = rc4::Rc4<U16>;

/// Which way a cipher context runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outgoing records.
    Encrypt,
    /// Incoming records.
    Decrypt,
}

/// A keyed, stateful record cipher for one direction.
pub trait RecordCipher: Send {
    /// Encrypt `data` in place. Block ciphers require whole blocks.
    fn encrypt(&mut self, data: &mut [u8]) -> Result<()>;

    /// Decrypt `data` in place. Block ciphers require whole blocks.
    fn decrypt(&mut self, data: &mut [u8]) -> Result<()>;
}

/// RustCrypto-backed cipher context.
pub enum CipherContext {
    /// Identity transform.
    Null,
    /// RC4 keystream; the same state serves either direction.
    Rc4(Box<Rc4_128>),
    /// AES-128-CBC encryptor.
    Aes128Enc(Box<Aes128CbcEnc>),
    /// AES-128-CBC decryptor.
    Aes128Dec(Box<Aes128CbcDec>),
    /// AES-256-CBC encryptor.
    Aes256Enc(Box<Aes256CbcEnc>),
    /// AES-256-CBC decryptor.
    Aes256Dec(Box<Aes256CbcDec>),
    /// 3DES-CBC encryptor.
    TdesEnc(Box<TdesCbcEnc>),
    /// 3DES-CBC decryptor.
    TdesDec(Box<TdesCbcDec>),
}

impl CipherContext {
    /// Create a context for `cipher` keyed with `key` and `iv`.
    ///
    /// # Arguments
    /// * `cipher` - Bulk cipher from the negotiated suite
    /// * `key` - Final write key (already expanded for export ciphers)
    /// * `iv` - Initial CBC IV, ignored by stream ciphers
    /// * `direction` - Whether the context encrypts or decrypts
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyLength` if `key` or `iv` has the wrong size.
    pub fn new(cipher: BulkCipher, key: &[u8], iv: &[u8], direction: Direction) -> Result<Self> {
        let bad_key = |_| Error::InvalidKeyLength(format!("{} key/iv", cipher.name()));
        let ctx = match (cipher, direction) {
            (BulkCipher::Null, _) => CipherContext::Null,
            (BulkCipher::Arcfour128 | BulkCipher::Arcfour40, _) => {
                CipherContext::Rc4(Box::new(Rc4_128::new_from_slice(key).map_err(bad_key)?))
            }
            (BulkCipher::Aes128Cbc, Direction::Encrypt) => {
                CipherContext::Aes128Enc(Box::new(Aes128CbcEnc::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (BulkCipher::Aes128Cbc, Direction::Decrypt) => {
                CipherContext::Aes128Dec(Box::new(Aes128CbcDec::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (BulkCipher::Aes256Cbc, Direction::Encrypt) => {
                CipherContext::Aes256Enc(Box::new(Aes256CbcEnc::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (BulkCipher::Aes256Cbc, Direction::Decrypt) => {
                CipherContext::Aes256Dec(Box::new(Aes256CbcDec::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (BulkCipher::TripleDesCbc, Direction::Encrypt) => {
                CipherContext::TdesEnc(Box::new(TdesCbcEnc::new_from_slices(key, iv).map_err(bad_key)?))
            }
            (BulkCipher::TripleDesCbc, Direction::Decrypt) => {
                CipherContext::TdesDec(Box::new(TdesCbcDec::new_from_slices(key, iv).map_err(bad_key)?))
            }
        };
        Ok(ctx)
    }
}

fn check_blocks(data: &[u8], block_size: usize) -> Result<()> {
    if data.len() % block_size != 0 {
        return Err(Error::InvalidLength {
            expected: data.len().next_multiple_of(block_size),
            actual: data.len(),
        });
    }
    Ok(())
}

fn cbc_encrypt<C: BlockEncryptMut>(c: &mut C, data: &mut [u8], block_size: usize) -> Result<()> {
    check_blocks(data, block_size)?;
    for block in data.chunks_exact_mut(block_size) {
        c.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

fn cbc_decrypt<C: BlockDecryptMut>(c: &mut C, data: &mut [u8], block_size: usize) -> Result<()> {
    check_blocks(data, block_size)?;
    for block in data.chunks_exact_mut(block_size) {
        c.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

impl RecordCipher for CipherContext {
    fn encrypt(&mut self, data: &mut [u8]) -> Result<()> {
        match self {
            CipherContext::Null => Ok(()),
            CipherContext::Rc4(c) => {
                c.apply_keystream(data);
                Ok(())
            }
            CipherContext::Aes128Enc(c) => cbc_encrypt(c.as_mut(), data, 16),
            CipherContext::Aes256Enc(c) => cbc_encrypt(c.as_mut(), data, 16),
            CipherContext::TdesEnc(c) => cbc_encrypt(c.as_mut(), data, 8),
            _ => Err(Error::Encryption("decrypt-only context".into())),
        }
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<()> {
        match self {
            CipherContext::Null => Ok(()),
            CipherContext::Rc4(c) => {
                c.apply_keystream(data);
                Ok(())
            }
            CipherContext::Aes128Dec(c) => cbc_decrypt(c.as_mut(), data, 16),
            CipherContext::Aes256Dec(c) => cbc_decrypt(c.as_mut(), data, 16),
            CipherContext::TdesDec(c) => cbc_decrypt(c.as_mut(), data, 8),
            _ => Err(Error::Decryption("encrypt-only context".into())),
        }
    }
}
