//! Key exchange orchestration.
//!
//! [`KeyExchange`] holds the per-handshake state of the negotiated key
//! exchange and builds or consumes the messages that depend on it:
//! Certificate, ServerKeyExchange, CertificateRequest, ClientKeyExchange
//! and CertificateVerify.
//!
//! # Wire formats
//!
//! ```text
//! ServerKeyExchange (DHE, anon DH):  p<1..2^16-1> g<1..2^16-1> Ys<1..2^16-1> [signature]
//! ServerKeyExchange (RSA_EXPORT):    modulus<1..2^16-1> exponent<1..2^16-1> signature
//! signature (TLS 1.2):               hash(1) sig(1) sig<0..2^16-1>
//! signature (earlier):               sig<0..2^16-1>
//! ```
//!
//! Signatures cover `client_random || server_random || params`.

use crate::credentials::{AuthInfo, CertificateCredentials, Credentials};
use crate::handshake::{
    encode_certificate_list, parse_certificate_list, put_vec16, CertificateRequest, Reader, CERT_TYPE_RSA_SIGN,
};
use crate::session::{ClientCertPolicy, Role};
use crate::{Error, Result};
use rsa::{RsaPrivateKey, RsaPublicKey};
use rtls_crypto::kex::rsa::{self as rsa_kex, SignatureScheme, EXPORT_MAX_MODULUS_BITS};
use rtls_crypto::kex::{DhKeyPair, DhParams};
use rtls_crypto::prf::{MASTER_SECRET_LEN, RANDOM_LEN};
use rtls_crypto::suite::KxAlgorithm;
use rtls_crypto::{CryptoProvider, ProtocolVersion};
use zeroize::Zeroizing;

/// Inputs shared by every key exchange step.
pub struct KxContext<'a> {
    /// Negotiated version.
    pub version: ProtocolVersion,
    /// Version the client advertised in its hello.
    pub client_version: [u8; 2],
    /// Client random.
    pub client_random: &'a [u8; RANDOM_LEN],
    /// Server random.
    pub server_random: &'a [u8; RANDOM_LEN],
    /// Session credentials.
    pub credentials: &'a Credentials,
    /// Randomness source.
    pub provider: &'a dyn CryptoProvider,
}

impl KxContext<'_> {
    fn certificate(&self) -> Result<&CertificateCredentials> {
        self.credentials.certificate().ok_or(Error::InsufficientCredentials)
    }

    fn signing_key(&self) -> Result<&RsaPrivateKey> {
        self.certificate()?.private_key().ok_or(Error::InsufficientCredentials)
    }

    fn signed_data(&self, params: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(2 * RANDOM_LEN + params.len());
        data.extend_from_slice(self.client_random);
        data.extend_from_slice(self.server_random);
        data.extend_from_slice(params);
        data
    }
}

/// What one side knows about the other's certificate.
#[derive(Default)]
pub struct PeerCertificate {
    chain: Vec<Vec<u8>>,
    key: Option<RsaPublicKey>,
}

impl PeerCertificate {
    fn key(&self) -> Result<&RsaPublicKey> {
        self.key.as_ref().ok_or(Error::NoCertificateFound)
    }
}

/// Ephemeral DH state.
#[derive(Default)]
pub struct DhState {
    params: Option<DhParams>,
    local: Option<DhKeyPair>,
    peer_public: Option<Vec<u8>>,
}

impl DhState {
    fn params(&self) -> Result<&DhParams> {
        self.params.as_ref().ok_or(Error::InvalidState)
    }

    fn local(&self) -> Result<&DhKeyPair> {
        self.local.as_ref().ok_or(Error::InvalidState)
    }
}

/// Per-handshake key exchange state.
pub enum KeyExchange {
    /// RSA key transport.
    Rsa {
        /// Peer certificate.
        peer: PeerCertificate,
    },
    /// RSA key transport to a temporary 512-bit key.
    RsaExport {
        /// Peer certificate.
        peer: PeerCertificate,
        /// Temporary key the premaster is encrypted to.
        temp_key: Option<RsaPublicKey>,
    },
    /// Signed ephemeral DH, RSA certificate.
    DheRsa {
        /// Peer certificate.
        peer: PeerCertificate,
        /// DH state.
        dh: DhState,
    },
    /// Signed ephemeral DH, DSA certificate.
    DheDss {
        /// Peer certificate.
        peer: PeerCertificate,
        /// DH state.
        dh: DhState,
    },
    /// Unauthenticated DH.
    AnonDh {
        /// DH state.
        dh: DhState,
    },
}

impl KeyExchange {
    /// Fresh state for `kx`.
    pub fn new(kx: KxAlgorithm) -> Self {
        match kx {
            KxAlgorithm::Rsa => KeyExchange::Rsa {
                peer: PeerCertificate::default(),
            },
            KxAlgorithm::RsaExport => KeyExchange::RsaExport {
                peer: PeerCertificate::default(),
                temp_key: None,
            },
            KxAlgorithm::DheRsa => KeyExchange::DheRsa {
                peer: PeerCertificate::default(),
                dh: DhState::default(),
            },
            KxAlgorithm::DheDss => KeyExchange::DheDss {
                peer: PeerCertificate::default(),
                dh: DhState::default(),
            },
            KxAlgorithm::AnonDh => KeyExchange::AnonDh { dh: DhState::default() },
        }
    }

    /// Algorithm this state belongs to.
    pub fn algorithm(&self) -> KxAlgorithm {
        match self {
            KeyExchange::Rsa { .. } => KxAlgorithm::Rsa,
            KeyExchange::RsaExport { .. } => KxAlgorithm::RsaExport,
            KeyExchange::DheRsa { .. } => KxAlgorithm::DheRsa,
            KeyExchange::DheDss { .. } => KxAlgorithm::DheDss,
            KeyExchange::AnonDh { .. } => KxAlgorithm::AnonDh,
        }
    }

    /// Whether the server authenticates with a certificate.
    pub fn uses_certificates(&self) -> bool {
        !matches!(self, KeyExchange::AnonDh { .. })
    }

    /// Whether the server sends a ServerKeyExchange.
    pub fn has_server_key_exchange(&self) -> bool {
        !matches!(self, KeyExchange::Rsa { .. })
    }

    fn peer(&self) -> Option<&PeerCertificate> {
        match self {
            KeyExchange::Rsa { peer }
            | KeyExchange::RsaExport { peer, .. }
            | KeyExchange::DheRsa { peer, .. }
            | KeyExchange::DheDss { peer, .. } => Some(peer),
            KeyExchange::AnonDh { .. } => None,
        }
    }

    fn peer_mut(&mut self) -> Option<&mut PeerCertificate> {
        match self {
            KeyExchange::Rsa { peer }
            | KeyExchange::RsaExport { peer, .. }
            | KeyExchange::DheRsa { peer, .. }
            | KeyExchange::DheDss { peer, .. } => Some(peer),
            KeyExchange::AnonDh { .. } => None,
        }
    }

    fn dh(&self) -> Option<&DhState> {
        match self {
            KeyExchange::DheRsa { dh, .. } | KeyExchange::DheDss { dh, .. } | KeyExchange::AnonDh { dh } => Some(dh),
            _ => None,
        }
    }

    /// Server Certificate body: the own chain, or `None` for anonymous kx.
    pub fn generate_server_certificate(&mut self, ctx: &KxContext<'_>) -> Result<Option<Vec<u8>>> {
        if !self.uses_certificates() {
            return Ok(None);
        }
        let cert = ctx.certificate()?;
        if !cert.has_certificate() {
            return Err(Error::InsufficientCredentials);
        }
        Ok(Some(encode_certificate_list(cert.chain())))
    }

    /// Consume the server's Certificate on the client.
    ///
    /// # Errors
    /// - `NoCertificateFound` for an empty chain
    /// - `InsufficientCredentials` without a verifier
    /// - `CertificateError` if the verifier rejects the chain
    pub fn process_server_certificate(&mut self, ctx: &KxContext<'_>, body: &[u8]) -> Result<()> {
        let chain = parse_certificate_list(body)?;
        if chain.is_empty() {
            return Err(Error::NoCertificateFound);
        }
        let verifier = ctx
            .certificate()?
            .verifier()
            .ok_or(Error::InsufficientCredentials)?;
        let key = verifier.verify(&chain)?;
        let peer = self.peer_mut().ok_or(Error::UnexpectedPacket)?;
        peer.chain = chain;
        peer.key = Some(key);
        Ok(())
    }

    /// ServerKeyExchange body, or `None` for plain RSA.
    pub fn generate_server_key_exchange(&mut self, ctx: &KxContext<'_>) -> Result<Option<Vec<u8>>> {
        let (params, signed) = match self {
            KeyExchange::Rsa { .. } => return Ok(None),
            KeyExchange::RsaExport { temp_key, .. } => {
                let export = ctx
                    .certificate()?
                    .rsa_export_key()
                    .ok_or(Error::InsufficientCredentials)?;
                let public = export.to_public_key();
                let (n, e) = rsa_kex::public_key_parts(&public);
                *temp_key = Some(public);
                let mut params = Vec::with_capacity(n.len() + e.len() + 4);
                put_vec16(&mut params, &n);
                put_vec16(&mut params, &e);
                (params, true)
            }
            KeyExchange::DheRsa { dh, .. } | KeyExchange::DheDss { dh, .. } => {
                let params = ctx.certificate()?.dh_params().ok_or(Error::InsufficientCredentials)?;
                (dh_server_params(dh, params)?, true)
            }
            KeyExchange::AnonDh { dh } => {
                let params = ctx
                    .credentials
                    .anonymous()
                    .and_then(|a| a.dh_params())
                    .ok_or(Error::InsufficientCredentials)?;
                (dh_server_params(dh, params)?, false)
            }
        };
        let mut body = params;
        if signed {
            let sig = sign_params(ctx, &body)?;
            body.extend_from_slice(&sig);
        }
        Ok(Some(body))
    }

    /// Consume the ServerKeyExchange on the client, checking its signature.
    pub fn process_server_key_exchange(&mut self, ctx: &KxContext<'_>, body: &[u8]) -> Result<()> {
        let mut r = Reader::new(body);
        match self {
            KeyExchange::Rsa { .. } => return Err(Error::UnexpectedPacket),
            KeyExchange::RsaExport { peer, temp_key } => {
                let n = r.vec16()?;
                let e = r.vec16()?;
                let params_len = body.len() - r.remaining();
                verify_params(ctx, peer.key()?, &body[..params_len], &mut r)?;
                let key = rsa_kex::public_key_from_parts(n, e)?;
                let bits = rsa_kex::modulus_bits(&key);
                if bits > EXPORT_MAX_MODULUS_BITS {
                    return Err(Error::Crypto(rtls_crypto::Error::InvalidPublicKey(format!(
                        "export key of {bits} bits"
                    ))));
                }
                *temp_key = Some(key);
            }
            KeyExchange::DheRsa { peer, dh } | KeyExchange::DheDss { peer, dh } => {
                let (params, ys) = read_dh_params(&mut r)?;
                let params_len = body.len() - r.remaining();
                verify_params(ctx, peer.key()?, &body[..params_len], &mut r)?;
                dh.params = Some(params);
                dh.peer_public = Some(ys);
            }
            KeyExchange::AnonDh { dh } => {
                let (params, ys) = read_dh_params(&mut r)?;
                dh.params = Some(params);
                dh.peer_public = Some(ys);
            }
        }
        r.expect_end()
    }

    /// Build the ClientKeyExchange body and the premaster secret.
    pub fn generate_client_key_exchange(
        &mut self,
        ctx: &KxContext<'_>,
    ) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>)> {
        match self {
            KeyExchange::Rsa { peer } => rsa_client_key_exchange(ctx, peer.key()?),
            KeyExchange::RsaExport { peer, temp_key } => {
                let key = match temp_key.as_ref() {
                    Some(k) => k,
                    None => peer.key()?,
                };
                rsa_client_key_exchange(ctx, key)
            }
            KeyExchange::DheRsa { dh, .. } | KeyExchange::DheDss { dh, .. } | KeyExchange::AnonDh { dh } => {
                let local = DhKeyPair::generate(dh.params()?)?;
                let ys = dh.peer_public.as_deref().ok_or(Error::InvalidState)?;
                let premaster = local.exchange(ys)?;
                let mut body = Vec::new();
                put_vec16(&mut body, &local.public_key());
                dh.local = Some(local);
                Ok((body, premaster))
            }
        }
    }

    /// Consume the ClientKeyExchange on the server, returning the premaster.
    ///
    /// # Security
    /// An RSA premaster that fails to decrypt, has the wrong length or the
    /// wrong version is replaced by a random one. The handshake then fails at
    /// Finished without telling the client which check failed.
    pub fn process_client_key_exchange(&mut self, ctx: &KxContext<'_>, body: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            KeyExchange::Rsa { .. } => {
                let key = ctx.signing_key()?;
                rsa_decrypt_premaster(ctx, key, body)
            }
            KeyExchange::RsaExport { .. } => {
                let key = ctx
                    .certificate()?
                    .rsa_export_key()
                    .ok_or(Error::InsufficientCredentials)?;
                rsa_decrypt_premaster(ctx, key, body)
            }
            KeyExchange::DheRsa { dh, .. } | KeyExchange::DheDss { dh, .. } | KeyExchange::AnonDh { dh } => {
                let mut r = Reader::new(body);
                let yc = r.vec16()?;
                r.expect_end()?;
                let premaster = dh.local()?.exchange(yc)?;
                dh.peer_public = Some(yc.to_vec());
                Ok(premaster)
            }
        }
    }

    /// CertificateRequest body, or `None` for anonymous kx.
    pub fn generate_certificate_request(&self, ctx: &KxContext<'_>) -> Result<Option<Vec<u8>>> {
        if !self.uses_certificates() {
            return Ok(None);
        }
        let with_algs = ctx.version.has_signature_algorithms();
        let req = CertificateRequest {
            certificate_types: vec![CERT_TYPE_RSA_SIGN],
            signature_algorithms: SignatureScheme::for_version(ctx.version)
                .wire_prefix()
                .into_iter()
                .collect(),
            authorities: Vec::new(),
        };
        Ok(Some(req.serialize(with_algs)))
    }

    /// Consume a CertificateRequest on the client.
    ///
    /// Returns whether an RSA certificate satisfies the request.
    pub fn process_certificate_request(&mut self, ctx: &KxContext<'_>, body: &[u8]) -> Result<bool> {
        if !self.uses_certificates() {
            return Err(Error::UnexpectedPacket);
        }
        let with_algs = ctx.version.has_signature_algorithms();
        let req = CertificateRequest::parse(body, with_algs)?;
        let type_ok = req.certificate_types.contains(&CERT_TYPE_RSA_SIGN);
        let alg_ok = match SignatureScheme::for_version(ctx.version).wire_prefix() {
            Some(ours) => req.signature_algorithms.contains(&ours),
            None => true,
        };
        Ok(type_ok && alg_ok)
    }

    /// Client Certificate body.
    ///
    /// Without a configured certificate a TLS client answers with an empty
    /// list; an SSL 3.0 client gets `None` and sends a `no_certificate`
    /// warning instead.
    pub fn generate_client_certificate(&mut self, ctx: &KxContext<'_>, acceptable: bool) -> Result<Option<Vec<u8>>> {
        match ctx.credentials.certificate() {
            Some(cert) if acceptable && cert.has_certificate() => Ok(Some(encode_certificate_list(cert.chain()))),
            _ if ctx.version.is_ssl3() => Ok(None),
            _ => Ok(Some(encode_certificate_list(&[]))),
        }
    }

    /// Consume the client's Certificate on the server.
    ///
    /// # Errors
    /// `NoCertificateFound` for an empty chain under
    /// [`ClientCertPolicy::Require`]; `CertificateError` if the chain is not
    /// trusted.
    pub fn process_client_certificate(
        &mut self,
        ctx: &KxContext<'_>,
        body: &[u8],
        policy: ClientCertPolicy,
    ) -> Result<()> {
        let chain = parse_certificate_list(body)?;
        if chain.is_empty() {
            return match policy {
                ClientCertPolicy::Require => Err(Error::NoCertificateFound),
                _ => Ok(()),
            };
        }
        let verifier = ctx
            .certificate()?
            .verifier()
            .ok_or_else(|| Error::CertificateError("no verifier for client certificates".into()))?;
        let key = verifier.verify(&chain)?;
        let peer = self.peer_mut().ok_or(Error::UnexpectedPacket)?;
        peer.chain = chain;
        peer.key = Some(key);
        Ok(())
    }

    /// Whether the peer presented a certificate with a usable key.
    pub fn peer_authenticated(&self) -> bool {
        self.peer().map(|p| p.key.is_some()).unwrap_or(false)
    }

    /// CertificateVerify body signing `digest` with the own certificate key.
    pub fn generate_certificate_verify(&self, ctx: &KxContext<'_>, digest: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(cert) = ctx.credentials.certificate() else {
            return Ok(None);
        };
        let Some(key) = cert.private_key() else {
            return Ok(None);
        };
        let scheme = SignatureScheme::for_version(ctx.version);
        let sig = rsa_kex::sign(key, scheme, digest)?;
        Ok(Some(encode_signature(scheme, &sig)))
    }

    /// Check the client's CertificateVerify against `digest`.
    pub fn process_certificate_verify(&self, ctx: &KxContext<'_>, body: &[u8], digest: &[u8]) -> Result<()> {
        let key = self.peer().ok_or(Error::UnexpectedPacket)?.key()?;
        let mut r = Reader::new(body);
        let scheme = read_signature_prefix(ctx.version, &mut r)?;
        let sig = r.vec16()?;
        r.expect_end()?;
        rsa_kex::verify(key, scheme, digest, sig)?;
        Ok(())
    }

    /// Summary of what was learned about the peer.
    pub fn auth_info(&self, role: Role) -> AuthInfo {
        let mut info = AuthInfo::new(self.algorithm().credential_type(role == Role::Server));
        if let Some(peer) = self.peer() {
            info.peer_certificates = peer.chain.clone();
        }
        if let Some(dh) = self.dh() {
            info.dh_prime_bits = dh.params.as_ref().map(DhParams::prime_bits);
            info.dh_peer_public = dh.peer_public.clone();
        }
        if let KeyExchange::RsaExport { temp_key: Some(key), .. } = self {
            info.rsa_export_modulus_bits = Some(rsa_kex::modulus_bits(key));
        }
        info
    }
}

fn dh_server_params(dh: &mut DhState, params: &DhParams) -> Result<Vec<u8>> {
    let local = DhKeyPair::generate(params)?;
    let mut out = Vec::new();
    put_vec16(&mut out, &params.prime());
    put_vec16(&mut out, &params.generator());
    put_vec16(&mut out, &local.public_key());
    dh.params = Some(params.clone());
    dh.local = Some(local);
    Ok(out)
}

fn read_dh_params(r: &mut Reader<'_>) -> Result<(DhParams, Vec<u8>)> {
    let p = r.vec16()?;
    let g = r.vec16()?;
    let ys = r.vec16()?;
    Ok((DhParams::new(p, g)?, ys.to_vec()))
}

fn encode_signature(scheme: SignatureScheme, sig: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(sig.len() + 4);
    if let Some(prefix) = scheme.wire_prefix() {
        out.extend_from_slice(&prefix);
    }
    put_vec16(&mut out, sig);
    out
}

fn read_signature_prefix(version: ProtocolVersion, r: &mut Reader<'_>) -> Result<SignatureScheme> {
    let scheme = SignatureScheme::for_version(version);
    if let Some(want) = scheme.wire_prefix() {
        let got = r.bytes(2)?;
        if got != want {
            return Err(Error::Crypto(rtls_crypto::Error::Signature(format!(
                "unsupported signature algorithm {got:02x?}"
            ))));
        }
    }
    Ok(scheme)
}

fn sign_params(ctx: &KxContext<'_>, params: &[u8]) -> Result<Vec<u8>> {
    let scheme = SignatureScheme::for_version(ctx.version);
    let digest = scheme.digest(&ctx.signed_data(params))?;
    let sig = rsa_kex::sign(ctx.signing_key()?, scheme, &digest)?;
    Ok(encode_signature(scheme, &sig))
}

fn verify_params(ctx: &KxContext<'_>, key: &RsaPublicKey, params: &[u8], r: &mut Reader<'_>) -> Result<()> {
    let scheme = read_signature_prefix(ctx.version, r)?;
    let sig = r.vec16()?;
    let digest = scheme.digest(&ctx.signed_data(params))?;
    rsa_kex::verify(key, scheme, &digest, sig)?;
    Ok(())
}

fn rsa_client_key_exchange(ctx: &KxContext<'_>, key: &RsaPublicKey) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>)> {
    let mut premaster = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
    premaster[..2].copy_from_slice(&ctx.client_version);
    ctx.provider.random(&mut premaster[2..])?;
    let ct = rsa_kex::encrypt_premaster(key, &premaster)?;
    let body = if ctx.version.is_ssl3() {
        ct
    } else {
        let mut body = Vec::with_capacity(ct.len() + 2);
        put_vec16(&mut body, &ct);
        body
    };
    Ok((body, premaster))
}

fn rsa_decrypt_premaster(ctx: &KxContext<'_>, key: &RsaPrivateKey, body: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let ciphertext = if ctx.version.is_ssl3() {
        body
    } else {
        let mut r = Reader::new(body);
        let ct = r.vec16()?;
        r.expect_end()?;
        ct
    };

    let mut fallback = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
    fallback[..2].copy_from_slice(&ctx.client_version);
    ctx.provider.random(&mut fallback[2..])?;

    match rsa_kex::decrypt_premaster(key, ciphertext) {
        Ok(pms) if pms.len() == MASTER_SECRET_LEN && pms[..2] == ctx.client_version => Ok(pms),
        _ => {
            tracing::debug!("HSK: bad RSA premaster, continuing with a random one");
            Ok(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{AnonymousCredentials, Credential, PinnedKeyVerifier};
    use rand::rngs::OsRng;
    use rtls_crypto::RustCryptoProvider;
    use std::sync::Arc;

    const CR: [u8; 32] = [1; 32];
    const SR: [u8; 32] = [2; 32];

    struct Pair {
        server: Credentials,
        client: Credentials,
    }

    fn cert_pair() -> Pair {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let export = RsaPrivateKey::new(&mut OsRng, 512).unwrap();
        let verifier = PinnedKeyVerifier::new().pin(b"server-cert".to_vec(), key.to_public_key());
        let mut server = Credentials::new();
        server.set(Credential::Certificate(
            CertificateCredentials::new()
                .with_certificate(vec![b"server-cert".to_vec()], key)
                .with_dh_params(DhParams::rfc2409_group2())
                .with_rsa_export_key(export),
        ));
        let mut client = Credentials::new();
        client.set(Credential::Certificate(
            CertificateCredentials::new().with_verifier(Arc::new(verifier)),
        ));
        Pair { server, client }
    }

    fn ctx<'a>(version: ProtocolVersion, creds: &'a Credentials) -> KxContext<'a> {
        KxContext {
            version,
            client_version: version.to_wire(),
            client_random: &CR,
            server_random: &SR,
            credentials: creds,
            provider: &RustCryptoProvider,
        }
    }

    fn run(kx: KxAlgorithm, version: ProtocolVersion, pair: &Pair) -> (KeyExchange, KeyExchange) {
        let sctx = ctx(version, &pair.server);
        let cctx = ctx(version, &pair.client);
        let mut server = KeyExchange::new(kx);
        let mut client = KeyExchange::new(kx);

        if let Some(cert) = server.generate_server_certificate(&sctx).unwrap() {
            client.process_server_certificate(&cctx, &cert).unwrap();
        }
        if let Some(ske) = server.generate_server_key_exchange(&sctx).unwrap() {
            client.process_server_key_exchange(&cctx, &ske).unwrap();
        }
        let (cke, client_pms) = client.generate_client_key_exchange(&cctx).unwrap();
        let server_pms = server.process_client_key_exchange(&sctx, &cke).unwrap();
        assert_eq!(*client_pms, *server_pms);
        (server, client)
    }

    #[test]
    fn test_rsa_all_versions() {
        let pair = cert_pair();
        for v in ProtocolVersion::ALL {
            let (_, client) = run(KxAlgorithm::Rsa, v, &pair);
            assert_eq!(client.auth_info(Role::Client).peer_certificates, vec![b"server-cert".to_vec()]);
        }
    }

    #[test]
    fn test_dhe_rsa_tls12_and_tls10() {
        let pair = cert_pair();
        for v in [ProtocolVersion::Tls1_0, ProtocolVersion::Tls1_2] {
            let (server, client) = run(KxAlgorithm::DheRsa, v, &pair);
            let info = client.auth_info(Role::Client);
            assert_eq!(info.dh_prime_bits, Some(1024));
            assert!(info.dh_peer_public.is_some());
            assert!(server.auth_info(Role::Server).dh_peer_public.is_some());
        }
    }

    #[test]
    fn test_rsa_export() {
        let pair = cert_pair();
        let (_, client) = run(KxAlgorithm::RsaExport, ProtocolVersion::Tls1_0, &pair);
        assert_eq!(client.auth_info(Role::Client).rsa_export_modulus_bits, Some(512));
    }

    #[test]
    fn test_anon_dh_has_no_certificate() {
        let mut server = Credentials::new();
        server.set(Credential::Anonymous(AnonymousCredentials::with_dh_params(DhParams::rfc2409_group2())));
        let mut client = Credentials::new();
        client.set(Credential::Anonymous(AnonymousCredentials::new()));
        let pair = Pair { server, client };
        let (server, _) = run(KxAlgorithm::AnonDh, ProtocolVersion::Ssl3, &pair);
        assert!(server.generate_certificate_request(&ctx(ProtocolVersion::Ssl3, &pair.server)).unwrap().is_none());
        assert!(!server.uses_certificates());
    }

    #[test]
    fn test_tampered_server_key_exchange_rejected() {
        let pair = cert_pair();
        let sctx = ctx(ProtocolVersion::Tls1_1, &pair.server);
        let cctx = ctx(ProtocolVersion::Tls1_1, &pair.client);
        let mut server = KeyExchange::new(KxAlgorithm::DheRsa);
        let mut client = KeyExchange::new(KxAlgorithm::DheRsa);
        let cert = server.generate_server_certificate(&sctx).unwrap().unwrap();
        client.process_server_certificate(&cctx, &cert).unwrap();
        let mut ske = server.generate_server_key_exchange(&sctx).unwrap().unwrap();
        // flip a bit inside Ys
        ske[140] ^= 1;
        let err = client.process_server_key_exchange(&cctx, &ske).unwrap_err();
        assert!(matches!(err, Error::Crypto(rtls_crypto::Error::Signature(_))));
    }

    #[test]
    fn test_bad_rsa_premaster_is_masked() {
        let pair = cert_pair();
        let sctx = ctx(ProtocolVersion::Tls1_0, &pair.server);
        let mut server = KeyExchange::new(KxAlgorithm::Rsa);
        let mut body = Vec::new();
        put_vec16(&mut body, &[0x55; 128]);
        let pms = server.process_client_key_exchange(&sctx, &body).unwrap();
        assert_eq!(pms.len(), MASTER_SECRET_LEN);
        assert_eq!(pms[..2], [3, 1]);
    }

    #[test]
    fn test_client_certificate_and_verify() {
        let client_key = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let client_pub = client_key.to_public_key();
        let mut client = Credentials::new();
        client.set(Credential::Certificate(
            CertificateCredentials::new().with_certificate(vec![b"client-cert".to_vec()], client_key),
        ));
        let mut server = Credentials::new();
        server.set(Credential::Certificate(
            CertificateCredentials::new()
                .with_verifier(Arc::new(PinnedKeyVerifier::new().pin(b"client-cert".to_vec(), client_pub))),
        ));

        for v in [ProtocolVersion::Ssl3, ProtocolVersion::Tls1_2] {
            let sctx = ctx(v, &server);
            let cctx = ctx(v, &client);
            let mut skx = KeyExchange::new(KxAlgorithm::Rsa);
            let mut ckx = KeyExchange::new(KxAlgorithm::Rsa);
            let req = skx.generate_certificate_request(&sctx).unwrap().unwrap();
            assert!(ckx.process_certificate_request(&cctx, &req).unwrap());
            let cert = ckx.generate_client_certificate(&cctx, true).unwrap().unwrap();
            skx.process_client_certificate(&sctx, &cert, ClientCertPolicy::Require).unwrap();
            assert!(skx.peer_authenticated());

            let digest = vec![7u8; if v == ProtocolVersion::Tls1_2 { 32 } else { 36 }];
            let cv = ckx.generate_certificate_verify(&cctx, &digest).unwrap().unwrap();
            skx.process_certificate_verify(&sctx, &cv, &digest).unwrap();
            let mut other = digest.clone();
            other[0] ^= 1;
            assert!(skx.process_certificate_verify(&sctx, &cv, &other).is_err());
        }
    }

    #[test]
    fn test_missing_client_certificate() {
        let pair = cert_pair();
        let ssl3 = ctx(ProtocolVersion::Ssl3, &pair.client);
        let tls = ctx(ProtocolVersion::Tls1_0, &pair.client);
        let mut kx = KeyExchange::new(KxAlgorithm::Rsa);
        assert!(kx.generate_client_certificate(&ssl3, true).unwrap().is_none());
        let empty = kx.generate_client_certificate(&tls, true).unwrap().unwrap();
        assert_eq!(empty, vec![0, 0, 0]);

        let sctx = ctx(ProtocolVersion::Tls1_0, &pair.server);
        let mut server = KeyExchange::new(KxAlgorithm::Rsa);
        server
            .process_client_certificate(&sctx, &empty, ClientCertPolicy::Request)
            .unwrap();
        assert!(!server.peer_authenticated());
        assert!(matches!(
            server.process_client_certificate(&sctx, &empty, ClientCertPolicy::Require),
            Err(Error::NoCertificateFound)
        ));
    }
}
