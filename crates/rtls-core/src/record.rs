//! Record layer: framing, MAC, padding and encryption.
//!
//! Implements:
//! - The 5-byte record header (type, version, length)
//! - Per-direction connection states with 64-bit sequence numbers
//! - Record encode: MAC, CBC padding (optionally randomized), explicit IV for
//!   TLS 1.1+, encryption
//! - Record decode with a single `DecryptionFailed` for every padding or MAC
//!   failure, compared in constant time
//!
//! A direction starts `Idle` (null cipher, null MAC), becomes `Active` when
//! the handshake installs keys at ChangeCipherSpec, and is `Closed` after a
//! fatal failure or shutdown.

use crate::{Error, Result};
use rtls_crypto::cipher::{Direction, RecordCipher};
use rtls_crypto::suite::{BulkCipher, MacAlgorithm};
use rtls_crypto::{CryptoProvider, ProtocolVersion};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Maximum plaintext bytes in one record.
pub const MAX_RECORD_SIZE: usize = 16384;

/// Maximum ciphertext expansion a peer may add to a record.
pub const MAX_CIPHERTEXT_EXPANSION: usize = 2048;

/// Record header length.
pub const RECORD_HEADER_LEN: usize = 5;

/// Record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// change_cipher_spec (20).
    ChangeCipherSpec,
    /// alert (21).
    Alert,
    /// handshake (22).
    Handshake,
    /// application_data (23).
    ApplicationData,
}

impl ContentType {
    /// Convert from wire format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }

    /// Convert to wire format.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ChangeCipherSpec => 20,
            Self::Alert => 21,
            Self::Handshake => 22,
            Self::ApplicationData => 23,
        }
    }
}

/// Parsed record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Content type.
    pub content_type: ContentType,
    /// Record version bytes.
    pub version: [u8; 2],
    /// Fragment length.
    pub length: usize,
}

impl RecordHeader {
    /// Parse the first five bytes of `data`.
    ///
    /// # Errors
    /// - `UnexpectedPacketLength` if fewer than five bytes are given
    /// - `UnexpectedPacket` for an unknown content type or a major version other than 3
    /// - `RecordOverflow` if the length exceeds the maximum ciphertext size
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_HEADER_LEN {
            return Err(Error::UnexpectedPacketLength);
        }
        let content_type = ContentType::from_u8(data[0]).ok_or(Error::UnexpectedPacket)?;
        if data[1] != 3 {
            return Err(Error::UnexpectedPacket);
        }
        let length = usize::from(u16::from_be_bytes([data[3], data[4]]));
        if length > MAX_RECORD_SIZE + MAX_CIPHERTEXT_EXPANSION {
            return Err(Error::RecordOverflow);
        }
        Ok(Self {
            content_type,
            version: [data[1], data[2]],
            length,
        })
    }

    /// Serialize the header.
    pub fn serialize(&self) -> [u8; RECORD_HEADER_LEN] {
        let len = (self.length as u16).to_be_bytes();
        [self.content_type.to_u8(), self.version[0], self.version[1], len[0], len[1]]
    }
}

/// Lifecycle of one record direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionStatus {
    /// Null cipher and null MAC.
    Idle,
    /// Negotiated keys installed.
    Active,
    /// No further records in this direction.
    Closed,
}

/// Keys and counters for one direction.
pub struct ConnectionState {
    status: DirectionStatus,
    seq: u64,
    version: ProtocolVersion,
    cipher: BulkCipher,
    mac: MacAlgorithm,
    mac_secret: Zeroizing<Vec<u8>>,
    context: Option<Box<dyn RecordCipher>>,
}

impl ConnectionState {
    /// The initial null state.
    pub fn idle() -> Self {
        Self {
            status: DirectionStatus::Idle,
            seq: 0,
            version: ProtocolVersion::Ssl3,
            cipher: BulkCipher::Null,
            mac: MacAlgorithm::Null,
            mac_secret: Zeroizing::new(Vec::new()),
            context: None,
        }
    }

    /// Build a pending state from derived key material.
    ///
    /// The state becomes `Active` once installed in the record layer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: &dyn CryptoProvider,
        version: ProtocolVersion,
        cipher: BulkCipher,
        mac: MacAlgorithm,
        key: &[u8],
        iv: &[u8],
        mac_secret: &[u8],
        direction: Direction,
    ) -> Result<Self> {
        let context = provider.new_cipher(cipher, key, iv, direction)?;
        Ok(Self {
            status: DirectionStatus::Idle,
            seq: 0,
            version,
            cipher,
            mac,
            mac_secret: Zeroizing::new(mac_secret.to_vec()),
            context: Some(context),
        })
    }

    /// Current status.
    pub fn status(&self) -> DirectionStatus {
        self.status
    }

    /// Next sequence number.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    fn next_sequence(&self) -> Result<u64> {
        if self.status == DirectionStatus::Closed {
            return Err(Error::InvalidSession);
        }
        if self.seq == u64::MAX {
            return Err(Error::RecordLimitReached);
        }
        Ok(self.seq)
    }

    fn compute_mac(
        &self,
        provider: &dyn CryptoProvider,
        seq: u64,
        content_type: ContentType,
        content: &[u8],
    ) -> Result<Vec<u8>> {
        if self.mac == MacAlgorithm::Null {
            return Ok(Vec::new());
        }
        let ssl3 = self.version.is_ssl3();
        let mut mac = provider.new_mac(self.mac, &self.mac_secret, ssl3)?;
        mac.update(&seq.to_be_bytes());
        mac.update(&[content_type.to_u8()]);
        if !ssl3 {
            mac.update(&self.version.to_wire());
        }
        mac.update(&(content.len() as u16).to_be_bytes());
        mac.update(content);
        Ok(mac.finish())
    }
}

/// Read and write connection states plus the record version in use.
pub struct RecordLayer {
    provider: Arc<dyn CryptoProvider>,
    version: [u8; 2],
    version_locked: bool,
    max_plaintext: usize,
    read: ConnectionState,
    write: ConnectionState,
    random_padding: bool,
}

impl RecordLayer {
    /// Create a record layer with both directions idle.
    pub fn new(provider: Arc<dyn CryptoProvider>, version: ProtocolVersion, random_padding: bool) -> Self {
        Self {
            provider,
            version: version.to_wire(),
            version_locked: false,
            max_plaintext: MAX_RECORD_SIZE,
            read: ConnectionState::idle(),
            write: ConnectionState::idle(),
            random_padding,
        }
    }

    /// Set the negotiated version.
    ///
    /// It is written into outgoing record headers, and from now on incoming
    /// records carrying any other version are refused.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version.to_wire();
        self.version_locked = true;
    }

    /// Limit record plaintext to `limit` bytes in both directions.
    ///
    /// Values above [`MAX_RECORD_SIZE`] are clamped.
    pub fn set_max_plaintext(&mut self, limit: usize) {
        self.max_plaintext = limit.min(MAX_RECORD_SIZE);
    }

    /// Largest plaintext a record may carry.
    pub fn max_plaintext(&self) -> usize {
        self.max_plaintext
    }

    /// Install a new read state (at a received ChangeCipherSpec).
    pub fn install_read(&mut self, mut state: ConnectionState) {
        state.status = DirectionStatus::Active;
        state.seq = 0;
        self.read = state;
        tracing::trace!("REC: read state installed ({})", self.read.cipher.name());
    }

    /// Install a new write state (after sending ChangeCipherSpec).
    pub fn install_write(&mut self, mut state: ConnectionState) {
        state.status = DirectionStatus::Active;
        state.seq = 0;
        self.write = state;
        tracing::trace!("REC: write state installed ({})", self.write.cipher.name());
    }

    /// Current read state.
    pub fn read_state(&self) -> &ConnectionState {
        &self.read
    }

    /// Current write state.
    pub fn write_state(&self) -> &ConnectionState {
        &self.write
    }

    /// Count a record consumed outside the normal path (the SSLv2 hello).
    pub fn skip_read_record(&mut self) -> Result<()> {
        let seq = self.read.next_sequence()?;
        self.read.seq = seq + 1;
        Ok(())
    }

    /// Close the write direction.
    pub fn close_write(&mut self) {
        self.write.status = DirectionStatus::Closed;
        self.write.context = None;
    }

    /// Close the read direction.
    pub fn close_read(&mut self) {
        self.read.status = DirectionStatus::Closed;
        self.read.context = None;
    }

    /// Close both directions.
    pub fn close(&mut self) {
        self.close_read();
        self.close_write();
    }

    /// Encode one record.
    ///
    /// # Arguments
    /// * `content_type` - Record content type
    /// * `plaintext` - At most [`max_plaintext`](Self::max_plaintext) bytes
    ///
    /// # Returns
    /// The complete record, header included.
    ///
    /// # Errors
    /// - `InvalidRequest` if `plaintext` is too long
    /// - `RecordLimitReached` if the write sequence number is exhausted
    /// - `InvalidSession` if the write direction is closed
    pub fn encrypt(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > self.max_plaintext {
            return Err(Error::InvalidRequest("plaintext exceeds the maximum record size"));
        }
        let seq = self.write.next_sequence()?;
        let provider = self.provider.as_ref();
        let state = &mut self.write;
        let tag = state.compute_mac(provider, seq, content_type, plaintext)?;

        let mut fragment = Vec::with_capacity(plaintext.len() + tag.len() + 2 * 16 + 256);
        if state.cipher.is_block() {
            let bs = state.cipher.block_size();
            if state.version.has_explicit_iv() {
                let mut iv = vec![0u8; bs];
                provider.random(&mut iv)?;
                fragment.extend_from_slice(&iv);
            }
            fragment.extend_from_slice(plaintext);
            fragment.extend_from_slice(&tag);

            // pad_len counts the length byte too
            let mut pad_len = bs - (plaintext.len() + tag.len()) % bs;
            if self.random_padding && !state.version.is_ssl3() {
                let max_extra_blocks = (256 - pad_len) / bs;
                let mut r = [0u8; 1];
                provider.random(&mut r)?;
                pad_len += (usize::from(r[0]) % (max_extra_blocks + 1)) * bs;
            }
            fragment.resize(fragment.len() + pad_len, (pad_len - 1) as u8);
        } else {
            fragment.extend_from_slice(plaintext);
            fragment.extend_from_slice(&tag);
        }

        if let Some(ctx) = state.context.as_mut() {
            ctx.encrypt(&mut fragment)?;
        }
        state.seq = seq + 1;

        let header = RecordHeader {
            content_type,
            version: self.version,
            length: fragment.len(),
        };
        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + fragment.len());
        record.extend_from_slice(&header.serialize());
        record.extend_from_slice(&fragment);
        tracing::trace!(
            "REC: sent {:?} seq={} plaintext={} fragment={}",
            content_type,
            seq,
            plaintext.len(),
            fragment.len()
        );
        Ok(record)
    }

    /// Decode one record fragment.
    ///
    /// Any failure closes the read direction.
    ///
    /// # Errors
    /// - `DecryptionFailed` for bad length, padding or MAC
    /// - `RecordOverflow` for oversized ciphertext or plaintext
    /// - `RecordLimitReached` if the read sequence number is exhausted
    /// - `UnsupportedVersion` if the header version differs from the
    ///   negotiated one
    pub fn decrypt(&mut self, header: &RecordHeader, fragment: &[u8]) -> Result<Vec<u8>> {
        let result = self.decrypt_inner(header, fragment);
        if result.is_err() {
            self.close_read();
        }
        result
    }

    fn decrypt_inner(&mut self, header: &RecordHeader, fragment: &[u8]) -> Result<Vec<u8>> {
        if self.version_locked && header.version != self.version {
            tracing::debug!("REC: record version {:?} after negotiating {:?}", header.version, self.version);
            return Err(Error::UnsupportedVersion);
        }
        if fragment.len() > self.max_plaintext + MAX_CIPHERTEXT_EXPANSION {
            return Err(Error::RecordOverflow);
        }
        let seq = self.read.next_sequence()?;
        let provider = self.provider.as_ref();
        let state = &mut self.read;
        let mac_len = state.mac.output_len();

        let mut data = fragment.to_vec();
        let mut pad_len = 0usize;
        let mut pad_ok = true;

        if state.cipher.is_block() {
            let bs = state.cipher.block_size();
            if data.len() < bs || data.len() % bs != 0 {
                return Err(Error::DecryptionFailed);
            }
            if let Some(ctx) = state.context.as_mut() {
                ctx.decrypt(&mut data)?;
            }
            if state.version.has_explicit_iv() {
                data.drain(..bs);
                if data.is_empty() {
                    return Err(Error::DecryptionFailed);
                }
            }
            let last = data[data.len() - 1];
            pad_len = usize::from(last) + 1;
            if pad_len + mac_len > data.len() {
                // Keep going with no padding so the MAC check still runs.
                pad_ok = false;
                pad_len = 0;
            } else if state.version.is_ssl3() {
                if pad_len > bs {
                    pad_ok = false;
                }
            } else {
                let start = data.len() - pad_len;
                let mut diff = 0u8;
                for b in &data[start..] {
                    diff |= b ^ last;
                }
                if diff != 0 {
                    pad_ok = false;
                }
            }
        } else {
            if let Some(ctx) = state.context.as_mut() {
                ctx.decrypt(&mut data)?;
            }
            if data.len() < mac_len {
                return Err(Error::DecryptionFailed);
            }
        }

        if data.len() < pad_len + mac_len {
            return Err(Error::DecryptionFailed);
        }
        let content_len = data.len() - pad_len - mac_len;
        let expected = state.compute_mac(provider, seq, header.content_type, &data[..content_len])?;
        let received = &data[content_len..content_len + mac_len];
        let mac_ok: bool = expected.as_slice().ct_eq(received).into();
        if !(mac_ok & pad_ok) {
            tracing::debug!("REC: record {} failed to decrypt", seq);
            return Err(Error::DecryptionFailed);
        }
        if content_len > self.max_plaintext {
            return Err(Error::RecordOverflow);
        }

        state.seq = seq + 1;
        data.truncate(content_len);
        tracing::trace!(
            "REC: received {:?} seq={} plaintext={}",
            header.content_type,
            seq,
            content_len
        );
        Ok(data)
    }

    #[cfg(test)]
    pub(crate) fn set_write_sequence(&mut self, seq: u64) {
        self.write.seq = seq;
    }

    #[cfg(test)]
    pub(crate) fn set_read_sequence(&mut self, seq: u64) {
        self.read.seq = seq;
    }
}
