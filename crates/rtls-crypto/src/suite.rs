//! Algorithm registry: protocol versions, bulk ciphers, MACs, compression
//! methods, key exchanges and cipher suites.
//!
//! Every table is a `'static` slice of plain structs. Wire-facing lookups scan
//! linearly and return `None` for unknown identifiers; per-variant attribute
//! lookups index the table directly by discriminant.

use core::fmt;

/// SSL/TLS protocol versions, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum ProtocolVersion {
    /// SSL 3.0 (wire 3,0).
    Ssl3 = 0,
    /// TLS 1.0 (wire 3,1).
    Tls1_0 = 1,
    /// TLS 1.1 (wire 3,2).
    Tls1_1 = 2,
    /// TLS 1.2 (wire 3,3).
    Tls1_2 = 3,
}

/// Pseudorandom function family used by a protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfAlgorithm {
    /// SSL 3.0 MD5/SHA1 key generation.
    Ssl3,
    /// `P_MD5 xor P_SHA1` over the split secret (TLS 1.0, 1.1).
    Md5Sha1,
    /// `P_SHA256` (TLS 1.2).
    Sha256,
}

struct VersionEntry {
    version: ProtocolVersion,
    name: &'static str,
    major: u8,
    minor: u8,
}

static VERSIONS: &[VersionEntry] = &[
    VersionEntry {
        version: ProtocolVersion::Ssl3,
        name: "SSL3.0",
        major: 3,
        minor: 0,
    },
    VersionEntry {
        version: ProtocolVersion::Tls1_0,
        name: "TLS1.0",
        major: 3,
        minor: 1,
    },
    VersionEntry {
        version: ProtocolVersion::Tls1_1,
        name: "TLS1.1",
        major: 3,
        minor: 2,
    },
    VersionEntry {
        version: ProtocolVersion::Tls1_2,
        name: "TLS1.2",
        major: 3,
        minor: 3,
    },
];

impl ProtocolVersion {
    /// All versions, oldest first.
    pub const ALL: [ProtocolVersion; 4] = [
        ProtocolVersion::Ssl3,
        ProtocolVersion::Tls1_0,
        ProtocolVersion::Tls1_1,
        ProtocolVersion::Tls1_2,
    ];

    fn entry(self) -> &'static VersionEntry {
        &VERSIONS[self as usize]
    }

    /// Look up a version from its wire bytes.
    pub fn from_wire(major: u8, minor: u8) -> Option<Self> {
        VERSIONS
            .iter()
            .find(|v| v.major == major && v.minor == minor)
            .map(|v| v.version)
    }

    /// Wire encoding `[major, minor]`.
    pub fn to_wire(self) -> [u8; 2] {
        let e = self.entry();
        [e.major, e.minor]
    }

    /// Major version byte.
    pub fn major(self) -> u8 {
        self.entry().major
    }

    /// Minor version byte.
    pub fn minor(self) -> u8 {
        self.entry().minor
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    /// Whether block-cipher records carry an explicit per-record IV.
    pub fn has_explicit_iv(self) -> bool {
        self >= ProtocolVersion::Tls1_1
    }

    /// Whether this version uses the SSL 3.0 MAC, Finished and key derivation.
    pub fn is_ssl3(self) -> bool {
        self == ProtocolVersion::Ssl3
    }

    /// Whether signatures carry the TLS 1.2 algorithm prefix and DigestInfo.
    pub fn has_signature_algorithms(self) -> bool {
        self >= ProtocolVersion::Tls1_2
    }

    /// Pseudorandom function used for this version.
    pub fn prf(self) -> PrfAlgorithm {
        match self {
            ProtocolVersion::Ssl3 => PrfAlgorithm::Ssl3,
            ProtocolVersion::Tls1_0 | ProtocolVersion::Tls1_1 => PrfAlgorithm::Md5Sha1,
            ProtocolVersion::Tls1_2 => PrfAlgorithm::Sha256,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bulk encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BulkCipher {
    /// No encryption.
    Null = 0,
    /// RC4 with a 128-bit key.
    Arcfour128 = 1,
    /// RC4 with a 40-bit export key, expanded to 128 bits.
    Arcfour40 = 2,
    /// Triple DES (EDE) in CBC mode.
    TripleDesCbc = 3,
    /// AES-128 in CBC mode.
    Aes128Cbc = 4,
    /// AES-256 in CBC mode.
    Aes256Cbc = 5,
}

/// Stream or block cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherType {
    /// Stream cipher (including the null cipher).
    Stream,
    /// Block cipher in CBC mode.
    Block,
}

/// Static attributes of a bulk cipher.
#[derive(Debug)]
pub struct CipherInfo {
    /// Cipher this entry describes.
    pub cipher: BulkCipher,
    /// Human readable name.
    pub name: &'static str,
    /// Block size in bytes (1 for stream ciphers).
    pub block_size: usize,
    /// Key material taken from the key block.
    pub key_size: usize,
    /// IV material taken from the key block.
    pub iv_size: usize,
    /// Stream or block.
    pub kind: CipherType,
    /// Export-grade; keys are expanded after derivation.
    pub export: bool,
}

static CIPHERS: &[CipherInfo] = &[
    CipherInfo {
        cipher: BulkCipher::Null,
        name: "NULL",
        block_size: 1,
        key_size: 0,
        iv_size: 0,
        kind: CipherType::Stream,
        export: false,
    },
    CipherInfo {
        cipher: BulkCipher::Arcfour128,
        name: "ARCFOUR-128",
        block_size: 1,
        key_size: 16,
        iv_size: 0,
        kind: CipherType::Stream,
        export: false,
    },
    CipherInfo {
        cipher: BulkCipher::Arcfour40,
        name: "ARCFOUR-40",
        block_size: 1,
        key_size: 5,
        iv_size: 0,
        kind: CipherType::Stream,
        export: true,
    },
    CipherInfo {
        cipher: BulkCipher::TripleDesCbc,
        name: "3DES-CBC",
        block_size: 8,
        key_size: 24,
        iv_size: 8,
        kind: CipherType::Block,
        export: false,
    },
    CipherInfo {
        cipher: BulkCipher::Aes128Cbc,
        name: "AES-128-CBC",
        block_size: 16,
        key_size: 16,
        iv_size: 16,
        kind: CipherType::Block,
        export: false,
    },
    CipherInfo {
        cipher: BulkCipher::Aes256Cbc,
        name: "AES-256-CBC",
        block_size: 16,
        key_size: 32,
        iv_size: 16,
        kind: CipherType::Block,
        export: false,
    },
];

/// Size of an export key after expansion.
pub const EXPORT_FINAL_KEY_SIZE: usize = 16;

impl BulkCipher {
    /// Static attributes of this cipher.
    pub fn info(self) -> &'static CipherInfo {
        &CIPHERS[self as usize]
    }

    /// Block size in bytes (1 for stream ciphers).
    pub fn block_size(self) -> usize {
        self.info().block_size
    }

    /// Key bytes drawn from the key block.
    pub fn key_size(self) -> usize {
        self.info().key_size
    }

    /// IV bytes drawn from the key block.
    pub fn iv_size(self) -> usize {
        self.info().iv_size
    }

    /// Whether this is a CBC block cipher.
    pub fn is_block(self) -> bool {
        self.info().kind == CipherType::Block
    }

    /// Whether this is an export-grade cipher.
    pub fn is_export(self) -> bool {
        self.info().export
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        self.info().name
    }
}

/// Record MAC algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum MacAlgorithm {
    /// No MAC.
    Null = 0,
    /// MD5 (HMAC, or the SSL 3.0 MAC).
    Md5 = 1,
    /// SHA-1 (HMAC, or the SSL 3.0 MAC).
    Sha1 = 2,
    /// SHA-256 (HMAC only).
    Sha256 = 3,
}

struct MacEntry {
    name: &'static str,
    output_len: usize,
}

static MACS: &[MacEntry] = &[
    MacEntry {
        name: "NULL",
        output_len: 0,
    },
    MacEntry {
        name: "MD5",
        output_len: 16,
    },
    MacEntry {
        name: "SHA1",
        output_len: 20,
    },
    MacEntry {
        name: "SHA256",
        output_len: 32,
    },
];

impl MacAlgorithm {
    /// Output length in bytes.
    pub fn output_len(self) -> usize {
        MACS[self as usize].output_len
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        MACS[self as usize].name
    }
}

/// Record compression methods. Only the null method is negotiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// No compression (wire 0).
    Null,
}

static COMPRESSIONS: &[(CompressionMethod, u8, &str)] = &[(CompressionMethod::Null, 0, "NULL")];

impl CompressionMethod {
    /// Look up a compression method from its wire number.
    pub fn from_wire(value: u8) -> Option<Self> {
        COMPRESSIONS
            .iter()
            .find(|(_, wire, _)| *wire == value)
            .map(|(m, _, _)| *m)
    }

    /// Wire number.
    pub fn to_wire(self) -> u8 {
        COMPRESSIONS
            .iter()
            .find(|(m, _, _)| *m == self)
            .map(|(_, wire, _)| *wire)
            .unwrap_or(0)
    }
}

/// Key exchange algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KxAlgorithm {
    /// RSA key transport.
    Rsa = 0,
    /// RSA key transport with a temporary 512-bit server key.
    RsaExport = 1,
    /// Ephemeral DH signed with an RSA key.
    DheRsa = 2,
    /// Ephemeral DH signed with a DSA key.
    DheDss = 3,
    /// Anonymous DH.
    AnonDh = 4,
}

/// Credential kinds a key exchange needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialType {
    /// X.509 certificate chain and private key.
    Certificate,
    /// Anonymous (DH parameters only).
    Anonymous,
}

/// Public-key algorithm of a certificate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkAlgorithm {
    /// RSA.
    Rsa,
    /// DSA.
    Dsa,
}

/// Static attributes of a key exchange.
#[derive(Debug)]
pub struct KxInfo {
    /// Algorithm this entry describes.
    pub kx: KxAlgorithm,
    /// Human readable name.
    pub name: &'static str,
    /// Credential the server must hold.
    pub server_credential: CredentialType,
    /// Credential the client uses.
    pub client_credential: CredentialType,
    /// Certificate key algorithm, if any.
    pub pk_algorithm: Option<PkAlgorithm>,
    /// Server needs DH parameters.
    pub needs_dh_params: bool,
    /// Server needs a temporary export RSA key.
    pub needs_rsa_params: bool,
}

static KX_ALGORITHMS: &[KxInfo] = &[
    KxInfo {
        kx: KxAlgorithm::Rsa,
        name: "RSA",
        server_credential: CredentialType::Certificate,
        client_credential: CredentialType::Certificate,
        pk_algorithm: Some(PkAlgorithm::Rsa),
        needs_dh_params: false,
        needs_rsa_params: false,
    },
    KxInfo {
        kx: KxAlgorithm::RsaExport,
        name: "RSA-EXPORT",
        server_credential: CredentialType::Certificate,
        client_credential: CredentialType::Certificate,
        pk_algorithm: Some(PkAlgorithm::Rsa),
        needs_dh_params: false,
        needs_rsa_params: true,
    },
    KxInfo {
        kx: KxAlgorithm::DheRsa,
        name: "DHE-RSA",
        server_credential: CredentialType::Certificate,
        client_credential: CredentialType::Certificate,
        pk_algorithm: Some(PkAlgorithm::Rsa),
        needs_dh_params: true,
        needs_rsa_params: false,
    },
    KxInfo {
        kx: KxAlgorithm::DheDss,
        name: "DHE-DSS",
        server_credential: CredentialType::Certificate,
        client_credential: CredentialType::Certificate,
        pk_algorithm: Some(PkAlgorithm::Dsa),
        needs_dh_params: true,
        needs_rsa_params: false,
    },
    KxInfo {
        kx: KxAlgorithm::AnonDh,
        name: "ANON-DH",
        server_credential: CredentialType::Anonymous,
        client_credential: CredentialType::Anonymous,
        pk_algorithm: None,
        needs_dh_params: true,
        needs_rsa_params: false,
    },
];

impl KxAlgorithm {
    /// Static attributes of this key exchange.
    pub fn info(self) -> &'static KxInfo {
        &KX_ALGORITHMS[self as usize]
    }

    /// Credential type required for the given side.
    pub fn credential_type(self, server: bool) -> CredentialType {
        let info = self.info();
        if server {
            info.server_credential
        } else {
            info.client_credential
        }
    }

    /// Public-key algorithm of the certificate this kx authenticates with.
    pub fn pk_algorithm(self) -> Option<PkAlgorithm> {
        self.info().pk_algorithm
    }

    /// Whether the server needs DH parameters.
    pub fn needs_dh_params(self) -> bool {
        self.info().needs_dh_params
    }

    /// Whether the server needs a temporary export RSA key.
    pub fn needs_rsa_params(self) -> bool {
        self.info().needs_rsa_params
    }

    /// Human readable name.
    pub fn name(self) -> &'static str {
        self.info().name
    }
}

/// Two-byte cipher suite identifier as it appears on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuiteId(pub [u8; 2]);

impl SuiteId {
    /// Build from a big-endian u16.
    pub const fn from_u16(value: u16) -> Self {
        SuiteId(value.to_be_bytes())
    }

    /// Big-endian u16 value.
    pub fn to_u16(self) -> u16 {
        u16::from_be_bytes(self.0)
    }
}

impl fmt::Debug for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SuiteId(0x{:02X}{:02X})", self.0[0], self.0[1])
    }
}

/// A cipher suite: wire id plus its algorithms.
#[derive(Debug)]
pub struct CipherSuite {
    /// Wire identifier.
    pub id: SuiteId,
    /// IANA name.
    pub name: &'static str,
    /// Bulk cipher.
    pub cipher: BulkCipher,
    /// Key exchange.
    pub kx: KxAlgorithm,
    /// Record MAC.
    pub mac: MacAlgorithm,
    /// Oldest version this suite may be used with.
    pub min_version: ProtocolVersion,
}

#[allow(missing_docs)]
pub mod ids {
    //! IANA cipher suite identifiers known to the registry.
    use super::SuiteId;

    pub const TLS_RSA_WITH_NULL_MD5: SuiteId = SuiteId([0x00, 0x01]);
    pub const TLS_RSA_EXPORT_WITH_RC4_40_MD5: SuiteId = SuiteId([0x00, 0x03]);
    pub const TLS_RSA_WITH_RC4_128_MD5: SuiteId = SuiteId([0x00, 0x04]);
    pub const TLS_RSA_WITH_RC4_128_SHA: SuiteId = SuiteId([0x00, 0x05]);
    pub const TLS_RSA_WITH_3DES_EDE_CBC_SHA: SuiteId = SuiteId([0x00, 0x0A]);
    pub const TLS_DHE_DSS_WITH_3DES_EDE_CBC_SHA: SuiteId = SuiteId([0x00, 0x13]);
    pub const TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA: SuiteId = SuiteId([0x00, 0x16]);
    pub const TLS_DH_ANON_WITH_RC4_128_MD5: SuiteId = SuiteId([0x00, 0x18]);
    pub const TLS_DH_ANON_WITH_3DES_EDE_CBC_SHA: SuiteId = SuiteId([0x00, 0x1B]);
    pub const TLS_RSA_WITH_AES_128_CBC_SHA: SuiteId = SuiteId([0x00, 0x2F]);
    pub const TLS_DHE_DSS_WITH_AES_128_CBC_SHA: SuiteId = SuiteId([0x00, 0x32]);
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: SuiteId = SuiteId([0x00, 0x33]);
    pub const TLS_DH_ANON_WITH_AES_128_CBC_SHA: SuiteId = SuiteId([0x00, 0x34]);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA: SuiteId = SuiteId([0x00, 0x35]);
    pub const TLS_DHE_DSS_WITH_AES_256_CBC_SHA: SuiteId = SuiteId([0x00, 0x38]);
    pub const TLS_DHE_RSA_WITH_AES_256_CBC_SHA: SuiteId = SuiteId([0x00, 0x39]);
    pub const TLS_DH_ANON_WITH_AES_256_CBC_SHA: SuiteId = SuiteId([0x00, 0x3A]);
    pub const TLS_RSA_WITH_AES_128_CBC_SHA256: SuiteId = SuiteId([0x00, 0x3C]);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA256: SuiteId = SuiteId([0x00, 0x3D]);
}

macro_rules! suite {
    ($id:ident, $cipher:ident, $kx:ident, $mac:ident, $min:ident) => {
        CipherSuite {
            id: ids::$id,
            name: stringify!($id),
            cipher: BulkCipher::$cipher,
            kx: KxAlgorithm::$kx,
            mac: MacAlgorithm::$mac,
            min_version: ProtocolVersion::$min,
        }
    };
}

/// Every cipher suite the engine knows, in registry order.
pub static CIPHER_SUITES: &[CipherSuite] = &[
    // anonymous DH
    suite!(TLS_DH_ANON_WITH_RC4_128_MD5, Arcfour128, AnonDh, Md5, Ssl3),
    suite!(TLS_DH_ANON_WITH_3DES_EDE_CBC_SHA, TripleDesCbc, AnonDh, Sha1, Ssl3),
    suite!(TLS_DH_ANON_WITH_AES_128_CBC_SHA, Aes128Cbc, AnonDh, Sha1, Ssl3),
    suite!(TLS_DH_ANON_WITH_AES_256_CBC_SHA, Aes256Cbc, AnonDh, Sha1, Ssl3),
    // DHE_DSS
    suite!(TLS_DHE_DSS_WITH_3DES_EDE_CBC_SHA, TripleDesCbc, DheDss, Sha1, Ssl3),
    suite!(TLS_DHE_DSS_WITH_AES_128_CBC_SHA, Aes128Cbc, DheDss, Sha1, Ssl3),
    suite!(TLS_DHE_DSS_WITH_AES_256_CBC_SHA, Aes256Cbc, DheDss, Sha1, Ssl3),
    // DHE_RSA
    suite!(TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA, TripleDesCbc, DheRsa, Sha1, Ssl3),
    suite!(TLS_DHE_RSA_WITH_AES_128_CBC_SHA, Aes128Cbc, DheRsa, Sha1, Ssl3),
    suite!(TLS_DHE_RSA_WITH_AES_256_CBC_SHA, Aes256Cbc, DheRsa, Sha1, Ssl3),
    // RSA
    suite!(TLS_RSA_WITH_NULL_MD5, Null, Rsa, Md5, Ssl3),
    suite!(TLS_RSA_EXPORT_WITH_RC4_40_MD5, Arcfour40, RsaExport, Md5, Ssl3),
    suite!(TLS_RSA_WITH_RC4_128_MD5, Arcfour128, Rsa, Md5, Ssl3),
    suite!(TLS_RSA_WITH_RC4_128_SHA, Arcfour128, Rsa, Sha1, Ssl3),
    suite!(TLS_RSA_WITH_3DES_EDE_CBC_SHA, TripleDesCbc, Rsa, Sha1, Ssl3),
    suite!(TLS_RSA_WITH_AES_128_CBC_SHA, Aes128Cbc, Rsa, Sha1, Ssl3),
    suite!(TLS_RSA_WITH_AES_256_CBC_SHA, Aes256Cbc, Rsa, Sha1, Ssl3),
    suite!(TLS_RSA_WITH_AES_128_CBC_SHA256, Aes128Cbc, Rsa, Sha256, Tls1_2),
    suite!(TLS_RSA_WITH_AES_256_CBC_SHA256, Aes256Cbc, Rsa, Sha256, Tls1_2),
];

impl CipherSuite {
    /// Look up a suite by wire id.
    pub fn by_id(id: SuiteId) -> Option<&'static CipherSuite> {
        CIPHER_SUITES.iter().find(|s| s.id == id)
    }

    /// Whether the suite may be used with `version`.
    ///
    /// Export suites are withdrawn after TLS 1.0.
    pub fn is_compatible(&self, version: ProtocolVersion) -> bool {
        if version < self.min_version {
            return false;
        }
        if self.cipher.is_export() && version > ProtocolVersion::Tls1_0 {
            return false;
        }
        true
    }
}
