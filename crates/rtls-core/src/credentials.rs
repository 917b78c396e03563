//! Credentials and per-handshake authentication results.
//!
//! A session holds at most one credential per [`CredentialType`]. Certificate
//! parsing and chain validation are not done here: certificates travel as
//! opaque DER and a [`CertificateVerifier`] turns the peer's chain into a
//! public key.

use crate::{Error, Result};
use rtls_crypto::kex::DhParams;
use rtls_crypto::suite::{CredentialType, PkAlgorithm};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Validates a peer certificate chain and extracts its public key.
pub trait CertificateVerifier: Send + Sync + fmt::Debug {
    /// Check `chain` (leaf first) and return the leaf's public key.
    ///
    /// # Errors
    /// Returns `Error::CertificateError` if the chain is not trusted.
    fn verify(&self, chain: &[Vec<u8>]) -> Result<RsaPublicKey>;
}

/// Trusts exactly the leaf certificates it was given, each pinned to a key.
#[derive(Debug, Default, Clone)]
pub struct PinnedKeyVerifier {
    pins: Vec<(Vec<u8>, RsaPublicKey)>,
}

impl PinnedKeyVerifier {
    /// Empty verifier; trusts nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `certificate` and bind it to `key`.
    pub fn pin(mut self, certificate: Vec<u8>, key: RsaPublicKey) -> Self {
        self.pins.push((certificate, key));
        self
    }
}

impl CertificateVerifier for PinnedKeyVerifier {
    fn verify(&self, chain: &[Vec<u8>]) -> Result<RsaPublicKey> {
        let leaf = chain
            .first()
            .ok_or_else(|| Error::CertificateError("empty chain".into()))?;
        self.pins
            .iter()
            .find(|(cert, _)| cert == leaf)
            .map(|(_, key)| key.clone())
            .ok_or_else(|| Error::CertificateError("certificate not pinned".into()))
    }
}

/// Certificate-based credentials.
///
/// On a server: the certificate chain and its key, plus DH parameters for
/// DHE suites and a temporary 512-bit key for RSA_EXPORT. On a client: an
/// optional client certificate and the verifier for the server's chain.
#[derive(Debug, Default, Clone)]
pub struct CertificateCredentials {
    chain: Vec<Vec<u8>>,
    private_key: Option<RsaPrivateKey>,
    dh_params: Option<DhParams>,
    rsa_export_key: Option<RsaPrivateKey>,
    verifier: Option<Arc<dyn CertificateVerifier>>,
}

impl CertificateCredentials {
    /// Empty certificate credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Own certificate chain (leaf first) and the leaf's private key.
    pub fn with_certificate(mut self, chain: Vec<Vec<u8>>, key: RsaPrivateKey) -> Self {
        self.chain = chain;
        self.private_key = Some(key);
        self
    }

    /// DH group for DHE suites.
    pub fn with_dh_params(mut self, params: DhParams) -> Self {
        self.dh_params = Some(params);
        self
    }

    /// Temporary RSA key for RSA_EXPORT suites.
    pub fn with_rsa_export_key(mut self, key: RsaPrivateKey) -> Self {
        self.rsa_export_key = Some(key);
        self
    }

    /// Verifier for the peer's certificate chain.
    pub fn with_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Own certificate chain.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Private key of the leaf certificate.
    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private_key.as_ref()
    }

    /// DH parameters, if configured.
    pub fn dh_params(&self) -> Option<&DhParams> {
        self.dh_params.as_ref()
    }

    /// Temporary export key, if configured.
    pub fn rsa_export_key(&self) -> Option<&RsaPrivateKey> {
        self.rsa_export_key.as_ref()
    }

    /// Verifier for peer chains.
    pub fn verifier(&self) -> Option<&dyn CertificateVerifier> {
        self.verifier.as_deref()
    }

    /// Whether a certificate with a usable key is configured.
    pub fn has_certificate(&self) -> bool {
        !self.chain.is_empty() && self.private_key.is_some()
    }

    /// Public-key algorithm of the configured certificate key.
    pub fn pk_algorithm(&self) -> Option<PkAlgorithm> {
        if self.has_certificate() {
            Some(PkAlgorithm::Rsa)
        } else {
            None
        }
    }
}

/// Anonymous DH credentials. Servers need DH parameters; clients need nothing.
#[derive(Debug, Default, Clone)]
pub struct AnonymousCredentials {
    dh_params: Option<DhParams>,
}

impl AnonymousCredentials {
    /// Client-side anonymous credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Server-side anonymous credentials with a DH group.
    pub fn with_dh_params(params: DhParams) -> Self {
        Self {
            dh_params: Some(params),
        }
    }

    /// DH parameters, if configured.
    pub fn dh_params(&self) -> Option<&DhParams> {
        self.dh_params.as_ref()
    }
}

/// One credential entry.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Certificate credentials.
    Certificate(CertificateCredentials),
    /// Anonymous credentials.
    Anonymous(AnonymousCredentials),
}

impl Credential {
    /// Type slot this credential occupies.
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Credential::Certificate(_) => CredentialType::Certificate,
            Credential::Anonymous(_) => CredentialType::Anonymous,
        }
    }
}

/// Credentials held by a session, at most one per type.
#[derive(Debug, Default, Clone)]
pub struct Credentials {
    entries: HashMap<CredentialType, Credential>,
}

impl Credentials {
    /// No credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `credential` in its type slot, returning what it replaced.
    pub fn set(&mut self, credential: Credential) -> Option<Credential> {
        self.entries.insert(credential.credential_type(), credential)
    }

    /// Look up a credential by type.
    pub fn get(&self, kind: CredentialType) -> Option<&Credential> {
        self.entries.get(&kind)
    }

    /// Remove the credential of `kind`.
    pub fn remove(&mut self, kind: CredentialType) -> Option<Credential> {
        self.entries.remove(&kind)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether a credential of `kind` is present.
    pub fn contains(&self, kind: CredentialType) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Certificate credentials, if set.
    pub fn certificate(&self) -> Option<&CertificateCredentials> {
        match self.get(CredentialType::Certificate) {
            Some(Credential::Certificate(c)) => Some(c),
            _ => None,
        }
    }

    /// Anonymous credentials, if set.
    pub fn anonymous(&self) -> Option<&AnonymousCredentials> {
        match self.get(CredentialType::Anonymous) {
            Some(Credential::Anonymous(c)) => Some(c),
            _ => None,
        }
    }
}

/// What the last handshake learned about the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// Authentication method of the negotiated key exchange.
    pub kind: CredentialType,
    /// Peer certificate chain, leaf first (empty if none was sent).
    pub peer_certificates: Vec<Vec<u8>>,
    /// Size of the DH prime used, in bits.
    pub dh_prime_bits: Option<usize>,
    /// Peer's DH public value.
    pub dh_peer_public: Option<Vec<u8>>,
    /// Modulus size of the temporary RSA_EXPORT key, in bits.
    pub rsa_export_modulus_bits: Option<usize>,
}

impl AuthInfo {
    /// Empty auth info for `kind`.
    pub fn new(kind: CredentialType) -> Self {
        Self {
            kind,
            peer_certificates: Vec::new(),
            dh_prime_bits: None,
            dh_peer_public: None,
            rsa_export_modulus_bits: None,
        }
    }
}
