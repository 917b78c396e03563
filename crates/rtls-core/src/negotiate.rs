//! Cipher suite, version and compression negotiation.
//!
//! Local preferences are expressed as ordered [`Priorities`] lists. A suite
//! is offered (client) or accepted (server) when the version allows it, every
//! one of its algorithms is in the matching priority list, and the session
//! holds credentials that can carry its key exchange.

use crate::credentials::Credentials;
use crate::session::Role;
use crate::{Error, Result};
use rtls_crypto::suite::{
    BulkCipher, CompressionMethod, CredentialType, KxAlgorithm, MacAlgorithm, PkAlgorithm, CIPHER_SUITES,
};
use rtls_crypto::{CipherSuite, ProtocolVersion, SuiteId};

/// Ordered algorithm preferences, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Priorities {
    /// Key exchange algorithms.
    pub kx: Vec<KxAlgorithm>,
    /// Bulk ciphers.
    pub ciphers: Vec<BulkCipher>,
    /// Record MACs.
    pub macs: Vec<MacAlgorithm>,
    /// Protocol versions.
    pub versions: Vec<ProtocolVersion>,
    /// Compression methods.
    pub compression: Vec<CompressionMethod>,
}

impl Default for Priorities {
    fn default() -> Self {
        Self {
            kx: vec![
                KxAlgorithm::Rsa,
                KxAlgorithm::DheRsa,
                KxAlgorithm::DheDss,
                KxAlgorithm::RsaExport,
                KxAlgorithm::AnonDh,
            ],
            ciphers: vec![
                BulkCipher::Aes128Cbc,
                BulkCipher::Aes256Cbc,
                BulkCipher::TripleDesCbc,
                BulkCipher::Arcfour128,
            ],
            macs: vec![MacAlgorithm::Sha1, MacAlgorithm::Sha256, MacAlgorithm::Md5],
            versions: vec![
                ProtocolVersion::Tls1_2,
                ProtocolVersion::Tls1_1,
                ProtocolVersion::Tls1_0,
                ProtocolVersion::Ssl3,
            ],
            compression: vec![CompressionMethod::Null],
        }
    }
}

impl Priorities {
    /// Highest enabled version.
    pub fn max_version(&self) -> Option<ProtocolVersion> {
        self.versions.iter().copied().max()
    }

    /// Lowest enabled version.
    pub fn min_version(&self) -> Option<ProtocolVersion> {
        self.versions.iter().copied().min()
    }

    /// Whether `version` is enabled.
    pub fn supports_version(&self, version: ProtocolVersion) -> bool {
        self.versions.contains(&version)
    }

    fn rank(&self, suite: &CipherSuite) -> Option<usize> {
        let kx = self.kx.iter().position(|k| *k == suite.kx)?;
        let cipher = self.ciphers.iter().position(|c| *c == suite.cipher)?;
        let mac = self.macs.iter().position(|m| *m == suite.mac)?;
        Some((kx + 1) * 64 + (cipher + 1) * 8 + mac)
    }
}

/// Split a wire cipher suite vector into ids.
///
/// # Errors
/// `UnexpectedPacketLength` if the vector has an odd length.
pub fn parse_suite_list(bytes: &[u8]) -> Result<Vec<SuiteId>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::UnexpectedPacketLength);
    }
    Ok(bytes.chunks_exact(2).map(|c| SuiteId([c[0], c[1]])).collect())
}

/// Suites usable at `version`, in local preference order.
///
/// Filters the registry by version compatibility, the priority lists and
/// the credentials held for `role`. Suites of equal rank keep registry order.
pub fn compute_offered_suites(
    version: ProtocolVersion,
    priorities: &Priorities,
    credentials: &Credentials,
    role: Role,
) -> Vec<SuiteId> {
    let mut ranked: Vec<(usize, SuiteId)> = CIPHER_SUITES
        .iter()
        .filter(|s| s.is_compatible(version))
        .filter_map(|s| priorities.rank(s).map(|rank| (rank, s.id)))
        .collect();
    // sort_by_key is stable
    ranked.sort_by_key(|(rank, _)| *rank);
    let suites = ranked.into_iter().map(|(_, id)| id).collect();
    remove_suites_without_usable_credentials(suites, credentials, role)
}

/// Drop suites whose key exchange the held credentials cannot carry.
///
/// Every role needs a credential of the kx's type. A server additionally
/// needs DH parameters or a temporary export key where the kx calls for
/// them, and a certificate key of the kx's public-key algorithm.
pub fn remove_suites_without_usable_credentials(
    suites: Vec<SuiteId>,
    credentials: &Credentials,
    role: Role,
) -> Vec<SuiteId> {
    let server = role == Role::Server;
    suites
        .into_iter()
        .filter(|id| match CipherSuite::by_id(*id) {
            Some(suite) => kx_usable(suite.kx, credentials, server),
            None => false,
        })
        .collect()
}

fn kx_usable(kx: KxAlgorithm, credentials: &Credentials, server: bool) -> bool {
    let kind = kx.credential_type(server);
    if !credentials.contains(kind) {
        return false;
    }
    if !server {
        return true;
    }
    match kind {
        CredentialType::Anonymous => {
            !kx.needs_dh_params() || credentials.anonymous().and_then(|a| a.dh_params()).is_some()
        }
        CredentialType::Certificate => {
            let Some(cert) = credentials.certificate() else {
                return false;
            };
            if cert.pk_algorithm().is_none() || cert.pk_algorithm() != kx.pk_algorithm() {
                return false;
            }
            if kx.needs_dh_params() && cert.dh_params().is_none() {
                return false;
            }
            if kx.needs_rsa_params() && cert.rsa_export_key().is_none() {
                return false;
            }
            true
        }
    }
}

/// Pick a suite: the first of the peer's, in the peer's order, that is also
/// in `acceptable`.
///
/// # Errors
/// `NoAcceptableCipherSuite` if the lists do not intersect.
pub fn select_suite(peer: &[SuiteId], acceptable: &[SuiteId]) -> Result<SuiteId> {
    peer.iter()
        .copied()
        .find(|id| acceptable.contains(id))
        .ok_or(Error::NoAcceptableCipherSuite)
}

/// Certificate key algorithms a peer's suite list asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkRequirement {
    /// No certificate-based suite offered.
    None,
    /// Only RSA-authenticated suites.
    Rsa,
    /// Only DSA-authenticated suites.
    Dsa,
    /// Both.
    Any,
}

impl PkRequirement {
    /// Whether a certificate key of `alg` satisfies the requirement.
    pub fn accepts(self, alg: PkAlgorithm) -> bool {
        match self {
            PkRequirement::None => false,
            PkRequirement::Rsa => alg == PkAlgorithm::Rsa,
            PkRequirement::Dsa => alg == PkAlgorithm::Dsa,
            PkRequirement::Any => true,
        }
    }
}

/// Public-key algorithms the peer's known suites would authenticate with.
pub fn find_pk_algorithms(peer: &[SuiteId]) -> PkRequirement {
    let mut req = PkRequirement::None;
    for alg in peer
        .iter()
        .filter_map(|id| CipherSuite::by_id(*id))
        .filter_map(|s| s.kx.pk_algorithm())
    {
        req = match (req, alg) {
            (PkRequirement::None, PkAlgorithm::Rsa) => PkRequirement::Rsa,
            (PkRequirement::None, PkAlgorithm::Dsa) => PkRequirement::Dsa,
            (PkRequirement::Rsa, PkAlgorithm::Rsa) => PkRequirement::Rsa,
            (PkRequirement::Dsa, PkAlgorithm::Dsa) => PkRequirement::Dsa,
            _ => return PkRequirement::Any,
        };
    }
    req
}

/// Server-side version choice for a client advertising `client`.
///
/// The client's version is used when enabled. A client newer than us gets
/// our highest version; otherwise the highest enabled version below the
/// client's.
///
/// # Errors
/// `UnsupportedVersion` if the client is older than every enabled version.
pub fn negotiate_version(client: [u8; 2], enabled: &[ProtocolVersion]) -> Result<ProtocolVersion> {
    let max = enabled.iter().copied().max().ok_or(Error::UnsupportedVersion)?;
    if client >= max.to_wire() {
        return Ok(max);
    }
    enabled
        .iter()
        .copied()
        .filter(|v| v.to_wire() <= client)
        .max()
        .ok_or(Error::UnsupportedVersion)
}

/// Client-side check of the version a ServerHello chose.
///
/// # Errors
/// `UnsupportedVersion` if it is unknown or not enabled.
pub fn check_server_version(server: [u8; 2], enabled: &[ProtocolVersion]) -> Result<ProtocolVersion> {
    ProtocolVersion::from_wire(server[0], server[1])
        .filter(|v| enabled.contains(v))
        .ok_or(Error::UnsupportedVersion)
}

/// First compression method of the client's list that we support.
///
/// # Errors
/// `UnknownCompression` if none match.
pub fn select_compression(client: &[u8], supported: &[CompressionMethod]) -> Result<CompressionMethod> {
    client
        .iter()
        .filter_map(|m| CompressionMethod::from_wire(*m))
        .find(|m| supported.contains(m))
        .ok_or(Error::UnknownCompression)
}
