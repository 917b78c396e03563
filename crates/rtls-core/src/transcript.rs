//! Running hash over the handshake messages.
//!
//! MD5, SHA-1 and SHA-256 run side by side because the version (and so the
//! hash that matters) is not known until ServerHello. Finished and
//! CertificateVerify digests are computed from clones, so the transcript keeps
//! running.

use crate::session::Role;
use crate::Result;
use rtls_crypto::mac::{ssl3_handshake_mac, HashContext};
use rtls_crypto::prf::{prf, SSL3_FINISHED_LEN, TLS_FINISHED_LEN};
use rtls_crypto::suite::{MacAlgorithm, PrfAlgorithm};
use rtls_crypto::ProtocolVersion;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;

const SSL3_CLIENT_SENDER: &[u8; 4] = b"CLNT";
const SSL3_SERVER_SENDER: &[u8; 4] = b"SRVR";

/// Handshake transcript hash.
#[derive(Clone)]
pub struct HandshakeTranscript {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    length: usize,
}

impl Default for HandshakeTranscript {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeTranscript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            length: 0,
        }
    }

    /// Absorb a complete handshake message, header included.
    pub fn update(&mut self, message: &[u8]) {
        self.md5.update(message);
        self.sha1.update(message);
        self.sha256.update(message);
        self.length += message.len();
    }

    /// Start over for a new handshake.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Bytes absorbed so far.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether nothing has been absorbed.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn md5_sha1(&self) -> Vec<u8> {
        let mut out = self.md5.clone().finalize().to_vec();
        out.extend_from_slice(&self.sha1.clone().finalize());
        out
    }

    fn ssl3_mac(&self, sender: Option<&[u8]>, master: &[u8]) -> Result<Vec<u8>> {
        let mut md5 = HashContext::Md5(self.md5.clone());
        let mut sha1 = HashContext::Sha1(self.sha1.clone());
        if let Some(sender) = sender {
            md5.update(sender);
            sha1.update(sender);
        }
        let mut out = ssl3_handshake_mac(md5, master)?;
        out.extend_from_slice(&ssl3_handshake_mac(sha1, master)?);
        Ok(out)
    }

    /// Finished verify data for messages sent by `sender`.
    ///
    /// 36 bytes for SSL 3.0 (`CLNT`/`SRVR`), 12 bytes otherwise
    /// (`"client finished"`/`"server finished"`).
    pub fn finished(&self, version: ProtocolVersion, sender: Role, master: &[u8]) -> Result<Vec<u8>> {
        let data = match version.prf() {
            PrfAlgorithm::Ssl3 => {
                let label = match sender {
                    Role::Client => SSL3_CLIENT_SENDER,
                    Role::Server => SSL3_SERVER_SENDER,
                };
                let out = self.ssl3_mac(Some(label), master)?;
                debug_assert_eq!(out.len(), SSL3_FINISHED_LEN);
                out
            }
            alg => {
                let label: &[u8] = match sender {
                    Role::Client => b"client finished",
                    Role::Server => b"server finished",
                };
                let seed = match alg {
                    PrfAlgorithm::Sha256 => self.sha256.clone().finalize().to_vec(),
                    _ => self.md5_sha1(),
                };
                prf(alg, master, label, &seed, TLS_FINISHED_LEN)?.to_vec()
            }
        };
        Ok(data)
    }

    /// Digest signed in CertificateVerify.
    ///
    /// SSL 3.0 uses the handshake MAC over MD5 and SHA-1, TLS 1.0/1.1 use
    /// `MD5 || SHA1` of the transcript, TLS 1.2 uses SHA-256.
    pub fn certificate_verify_digest(&self, version: ProtocolVersion, master: &[u8]) -> Result<Vec<u8>> {
        Ok(match version.prf() {
            PrfAlgorithm::Ssl3 => self.ssl3_mac(None, master)?,
            PrfAlgorithm::Md5Sha1 => self.md5_sha1(),
            PrfAlgorithm::Sha256 => self.sha256.clone().finalize().to_vec(),
        })
    }

    /// Digest of the transcript with a single algorithm.
    pub fn digest(&self, alg: MacAlgorithm) -> Option<Vec<u8>> {
        match alg {
            MacAlgorithm::Md5 => Some(self.md5.clone().finalize().to_vec()),
            MacAlgorithm::Sha1 => Some(self.sha1.clone().finalize().to_vec()),
            MacAlgorithm::Sha256 => Some(self.sha256.clone().finalize().to_vec()),
            MacAlgorithm::Null => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtls_crypto::mac::digest;

    #[test]
    fn test_finished_lengths() {
        let mut t = HandshakeTranscript::new();
        t.update(b"client hello bytes");
        let master = [0x42u8; 48];
        for v in ProtocolVersion::ALL {
            let c = t.finished(v, Role::Client, &master).unwrap();
            let s = t.finished(v, Role::Server, &master).unwrap();
            let want = if v.is_ssl3() { 36 } else { 12 };
            assert_eq!(c.len(), want);
            assert_ne!(c, s);
        }
    }

    #[test]
    fn test_tls10_finished_matches_prf() {
        let mut t = HandshakeTranscript::new();
        t.update(b"abc");
        t.update(b"def");
        let master = [7u8; 48];
        let mut seed = digest(MacAlgorithm::Md5, b"abcdef").unwrap();
        seed.extend_from_slice(&digest(MacAlgorithm::Sha1, b"abcdef").unwrap());
        let want = prf(PrfAlgorithm::Md5Sha1, &master, b"client finished", &seed, 12).unwrap();
        assert_eq!(t.finished(ProtocolVersion::Tls1_1, Role::Client, &master).unwrap(), *want);
    }

    #[test]
    fn test_tls12_finished_uses_sha256() {
        let mut t = HandshakeTranscript::new();
        t.update(b"abcdef");
        let master = [7u8; 48];
        let seed = digest(MacAlgorithm::Sha256, b"abcdef").unwrap();
        let want = prf(PrfAlgorithm::Sha256, &master, b"server finished", &seed, 12).unwrap();
        assert_eq!(t.finished(ProtocolVersion::Tls1_2, Role::Server, &master).unwrap(), *want);
    }

    #[test]
    fn test_transcript_keeps_running() {
        let mut t = HandshakeTranscript::new();
        t.update(b"one");
        let before = t.certificate_verify_digest(ProtocolVersion::Tls1_0, &[0; 48]).unwrap();
        t.update(b"two");
        let after = t.certificate_verify_digest(ProtocolVersion::Tls1_0, &[0; 48]).unwrap();
        assert_ne!(before, after);
        assert_eq!(after.len(), 36);
        assert_eq!(t.len(), 6);
        t.reset();
        assert!(t.is_empty());
    }

    #[test]
    fn test_ssl3_cert_verify_len() {
        let mut t = HandshakeTranscript::new();
        t.update(b"msgs");
        assert_eq!(t.certificate_verify_digest(ProtocolVersion::Ssl3, &[1; 48]).unwrap().len(), 36);
        assert_eq!(t.certificate_verify_digest(ProtocolVersion::Tls1_2, &[1; 48]).unwrap().len(), 32);
    }
}
