//! Handshake message codec.
//!
//! Implements:
//! - The 4-byte handshake header (type, 24-bit length)
//! - ClientHello / ServerHello bodies, extension block included
//! - Certificate lists and CertificateRequest bodies
//! - The SSLv2-compatible ClientHello (RFC 2246 Appendix E.1)
//!
//! Key exchange bodies are built and parsed by the `kx` module.

use crate::extensions::{encode_extensions, parse_extensions, Extension};
use crate::negotiate::parse_suite_list;
use crate::{Error, Result};
use rtls_crypto::prf::RANDOM_LEN;
use rtls_crypto::SuiteId;

/// Handshake header length.
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// Longest session id.
pub const MAX_SESSION_ID_LEN: usize = 32;

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    /// hello_request (0).
    HelloRequest,
    /// client_hello (1).
    ClientHello,
    /// server_hello (2).
    ServerHello,
    /// certificate (11).
    Certificate,
    /// server_key_exchange (12).
    ServerKeyExchange,
    /// certificate_request (13).
    CertificateRequest,
    /// server_hello_done (14).
    ServerHelloDone,
    /// certificate_verify (15).
    CertificateVerify,
    /// client_key_exchange (16).
    ClientKeyExchange,
    /// finished (20).
    Finished,
}

impl HandshakeType {
    /// Convert from wire format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::HelloRequest),
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            11 => Some(Self::Certificate),
            12 => Some(Self::ServerKeyExchange),
            13 => Some(Self::CertificateRequest),
            14 => Some(Self::ServerHelloDone),
            15 => Some(Self::CertificateVerify),
            16 => Some(Self::ClientKeyExchange),
            20 => Some(Self::Finished),
            _ => None,
        }
    }

    /// Convert to wire format.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::HelloRequest => 0,
            Self::ClientHello => 1,
            Self::ServerHello => 2,
            Self::Certificate => 11,
            Self::ServerKeyExchange => 12,
            Self::CertificateRequest => 13,
            Self::ServerHelloDone => 14,
            Self::CertificateVerify => 15,
            Self::ClientKeyExchange => 16,
            Self::Finished => 20,
        }
    }

    /// Name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::HelloRequest => "HelloRequest",
            Self::ClientHello => "ClientHello",
            Self::ServerHello => "ServerHello",
            Self::Certificate => "Certificate",
            Self::ServerKeyExchange => "ServerKeyExchange",
            Self::CertificateRequest => "CertificateRequest",
            Self::ServerHelloDone => "ServerHelloDone",
            Self::CertificateVerify => "CertificateVerify",
            Self::ClientKeyExchange => "ClientKeyExchange",
            Self::Finished => "Finished",
        }
    }
}

/// Parsed handshake header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    /// Raw message type.
    pub msg_type: u8,
    /// Body length.
    pub length: usize,
}

impl HandshakeHeader {
    /// Parse the first four bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HANDSHAKE_HEADER_LEN {
            return Err(Error::UnexpectedPacketLength);
        }
        Ok(Self {
            msg_type: data[0],
            length: read_u24(&data[1..4]),
        })
    }
}

/// Frame a handshake body with its header.
pub fn encode_handshake(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
    out.push(msg_type.to_u8());
    put_u24(&mut out, body.len());
    out.extend_from_slice(body);
    out
}

fn read_u24(data: &[u8]) -> usize {
    (usize::from(data[0]) << 16) | (usize::from(data[1]) << 8) | usize::from(data[2])
}

/// Append a big-endian 24-bit length.
pub fn put_u24(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&[(value >> 16) as u8, (value >> 8) as u8, value as u8]);
}

/// Append `data` with a one-byte length prefix.
pub fn put_vec8(out: &mut Vec<u8>, data: &[u8]) {
    out.push(data.len() as u8);
    out.extend_from_slice(data);
}

/// Append `data` with a two-byte length prefix.
pub fn put_vec16(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

/// Append `data` with a three-byte length prefix.
pub fn put_vec24(out: &mut Vec<u8>, data: &[u8]) {
    put_u24(out, data.len());
    out.extend_from_slice(data);
}

/// Bounds-checked cursor over a message body.
///
/// Every read past the end fails with `UnexpectedPacketLength`.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take `n` bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::UnexpectedPacketLength);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Take one byte.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    /// Take a big-endian u16.
    pub fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Take a big-endian 24-bit value.
    pub fn u24(&mut self) -> Result<usize> {
        Ok(read_u24(self.bytes(3)?))
    }

    /// Take a vector with a one-byte length prefix.
    pub fn vec8(&mut self) -> Result<&'a [u8]> {
        let n = usize::from(self.u8()?);
        self.bytes(n)
    }

    /// Take a vector with a two-byte length prefix.
    pub fn vec16(&mut self) -> Result<&'a [u8]> {
        let n = usize::from(self.u16()?);
        self.bytes(n)
    }

    /// Take a vector with a three-byte length prefix.
    pub fn vec24(&mut self) -> Result<&'a [u8]> {
        let n = self.u24()?;
        self.bytes(n)
    }

    /// Take everything that is left.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    /// Fail unless every byte was consumed.
    pub fn expect_end(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::UnexpectedPacketLength);
        }
        Ok(())
    }
}

/// ClientHello body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Highest version the client supports (raw, may be unknown to us).
    pub version: [u8; 2],
    /// Client random.
    pub random: [u8; RANDOM_LEN],
    /// Session id the client wants to resume (may be empty).
    pub session_id: Vec<u8>,
    /// Offered suites in client preference order.
    pub cipher_suites: Vec<SuiteId>,
    /// Offered compression methods.
    pub compression_methods: Vec<u8>,
    /// Hello extensions, in wire order.
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    /// Parse a ClientHello body, extension block included.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let v = r.bytes(2)?;
        let version = [v[0], v[1]];
        let mut random = [0u8; RANDOM_LEN];
        random.copy_from_slice(r.bytes(RANDOM_LEN)?);
        let session_id = r.vec8()?;
        if session_id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::UnexpectedPacketLength);
        }
        let cipher_suites = parse_suite_list(r.vec16()?)?;
        let compression_methods = r.vec8()?.to_vec();
        let extensions = parse_extensions(r.rest())?;
        Ok(Self {
            version,
            random,
            session_id: session_id.to_vec(),
            cipher_suites,
            compression_methods,
            extensions,
        })
    }

    /// Serialize the body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + RANDOM_LEN + 1 + self.session_id.len() + 2 + 2 * self.cipher_suites.len() + 2);
        out.extend_from_slice(&self.version);
        out.extend_from_slice(&self.random);
        put_vec8(&mut out, &self.session_id);
        let suites: Vec<u8> = self.cipher_suites.iter().flat_map(|s| s.0).collect();
        put_vec16(&mut out, &suites);
        put_vec8(&mut out, &self.compression_methods);
        encode_extensions(&mut out, &self.extensions);
        out
    }

    /// Parse the body of an SSLv2-compatible ClientHello.
    ///
    /// `body` starts at the message type byte, after the two-byte v2 record
    /// header. Only v2 cipher specs whose first byte is zero map to TLS suites;
    /// the challenge is right-aligned into the 32-byte random.
    pub fn parse_v2(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        if r.u8()? != HandshakeType::ClientHello.to_u8() {
            return Err(Error::UnexpectedPacket);
        }
        let v = r.bytes(2)?;
        let version = [v[0], v[1]];
        let specs_len = usize::from(r.u16()?);
        let session_id_len = usize::from(r.u16()?);
        let challenge_len = usize::from(r.u16()?);
        if specs_len % 3 != 0 || session_id_len > MAX_SESSION_ID_LEN || !(16..=32).contains(&challenge_len) {
            return Err(Error::UnexpectedPacketLength);
        }
        let specs = r.bytes(specs_len)?;
        let session_id = r.bytes(session_id_len)?.to_vec();
        let challenge = r.bytes(challenge_len)?;
        r.expect_end()?;

        let cipher_suites = specs
            .chunks_exact(3)
            .filter(|spec| spec[0] == 0)
            .map(|spec| SuiteId([spec[1], spec[2]]))
            .collect();
        let mut random = [0u8; RANDOM_LEN];
        random[RANDOM_LEN - challenge_len..].copy_from_slice(challenge);

        Ok(Self {
            version,
            random,
            session_id,
            cipher_suites,
            compression_methods: vec![0],
            extensions: Vec::new(),
        })
    }
}

/// ServerHello body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Negotiated version.
    pub version: [u8; 2],
    /// Server random.
    pub random: [u8; RANDOM_LEN],
    /// Session id (echo of the client's on resumption).
    pub session_id: Vec<u8>,
    /// Selected suite.
    pub cipher_suite: SuiteId,
    /// Selected compression method.
    pub compression_method: u8,
    /// Hello extensions, in wire order.
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    /// Parse a ServerHello body, extension block included.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let v = r.bytes(2)?;
        let mut random = [0u8; RANDOM_LEN];
        random.copy_from_slice(r.bytes(RANDOM_LEN)?);
        let session_id = r.vec8()?;
        if session_id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::UnexpectedPacketLength);
        }
        let s = r.bytes(2)?;
        let compression_method = r.u8()?;
        let extensions = parse_extensions(r.rest())?;
        Ok(Self {
            version: [v[0], v[1]],
            random,
            session_id: session_id.to_vec(),
            cipher_suite: SuiteId([s[0], s[1]]),
            compression_method,
            extensions,
        })
    }

    /// Serialize the body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + RANDOM_LEN + 1 + self.session_id.len() + 3);
        out.extend_from_slice(&self.version);
        out.extend_from_slice(&self.random);
        put_vec8(&mut out, &self.session_id);
        out.extend_from_slice(&self.cipher_suite.0);
        out.push(self.compression_method);
        encode_extensions(&mut out, &self.extensions);
        out
    }
}

/// Serialize a Certificate body from DER certificates.
pub fn encode_certificate_list(chain: &[Vec<u8>]) -> Vec<u8> {
    let mut list = Vec::new();
    for cert in chain {
        put_vec24(&mut list, cert);
    }
    let mut out = Vec::with_capacity(3 + list.len());
    put_vec24(&mut out, &list);
    out
}

/// Parse a Certificate body into DER certificates.
pub fn parse_certificate_list(body: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut r = Reader::new(body);
    let list = r.vec24()?;
    r.expect_end()?;
    let mut r = Reader::new(list);
    let mut chain = Vec::new();
    while r.remaining() > 0 {
        let cert = r.vec24()?;
        if cert.is_empty() {
            return Err(Error::UnexpectedPacketLength);
        }
        chain.push(cert.to_vec());
    }
    Ok(chain)
}

/// `ClientCertificateType.rsa_sign`.
pub const CERT_TYPE_RSA_SIGN: u8 = 1;

/// Parsed CertificateRequest body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Accepted client certificate types.
    pub certificate_types: Vec<u8>,
    /// Accepted signature algorithms (TLS 1.2 only).
    pub signature_algorithms: Vec<[u8; 2]>,
    /// Raw distinguished-name list.
    pub authorities: Vec<u8>,
}

impl CertificateRequest {
    /// Parse a CertificateRequest body.
    pub fn parse(body: &[u8], with_signature_algorithms: bool) -> Result<Self> {
        let mut r = Reader::new(body);
        let certificate_types = r.vec8()?.to_vec();
        let mut signature_algorithms = Vec::new();
        if with_signature_algorithms {
            let algs = r.vec16()?;
            if algs.len() % 2 != 0 {
                return Err(Error::UnexpectedPacketLength);
            }
            signature_algorithms = algs.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        }
        let authorities = r.vec16()?.to_vec();
        r.expect_end()?;
        Ok(Self {
            certificate_types,
            signature_algorithms,
            authorities,
        })
    }

    /// Serialize the body.
    pub fn serialize(&self, with_signature_algorithms: bool) -> Vec<u8> {
        let mut out = Vec::new();
        put_vec8(&mut out, &self.certificate_types);
        if with_signature_algorithms {
            let algs: Vec<u8> = self.signature_algorithms.iter().flatten().copied().collect();
            put_vec16(&mut out, &algs);
        }
        put_vec16(&mut out, &self.authorities);
        out
    }
}
