//! Session conformance tests.
//!
//! Client and server sessions are wired back to back over in-memory
//! transports and driven by hand, so every handshake flow, resumption,
//! rehandshake, hello extension and failure path runs without sockets.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use rtls_core::extensions::{Extension, EXT_MAX_FRAGMENT_LENGTH};
use rtls_core::handshake::{encode_handshake, ClientHello, HandshakeHeader, HandshakeType, ServerHello};
use rtls_core::record::RecordHeader;
use rtls_core::{
    AlertDescription, AnonymousCredentials, BulkCipher, CertificateCredentials, ClientCertPolicy, Credential,
    Credentials, Error, HandshakeState, HandshakeStatus, IoDirection, KxAlgorithm, MacAlgorithm,
    MaxFragmentLength, MemorySessionCache, PinnedKeyVerifier, ProtocolVersion, Role, Session, SessionConfig, ShutdownMode, SuiteId,
};
use rtls_crypto::kex::DhParams;
use rtls_crypto::suite::{ids, CredentialType};
use rtls_transport::MemoryTransport;
use std::sync::Arc;

const SERVER_CERT: &[u8] = b"server certificate";
const CLIENT_CERT: &[u8] = b"client certificate";

fn load_key(pem: &str) -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs1_pem(pem).unwrap()
}

fn server_key() -> RsaPrivateKey {
    load_key(include_str!("data/server_key.pem"))
}

fn client_key() -> RsaPrivateKey {
    load_key(include_str!("data/client_key.pem"))
}

fn export_key() -> RsaPrivateKey {
    load_key(include_str!("data/export_key.pem"))
}

fn server_credentials() -> Credentials {
    let mut creds = Credentials::new();
    creds.set(Credential::Certificate(
        CertificateCredentials::new()
            .with_certificate(vec![SERVER_CERT.to_vec()], server_key())
            .with_dh_params(DhParams::rfc2409_group2())
            .with_rsa_export_key(export_key())
            .with_verifier(Arc::new(
                PinnedKeyVerifier::new().pin(CLIENT_CERT.to_vec(), client_key().to_public_key()),
            )),
    ));
    creds.set(Credential::Anonymous(AnonymousCredentials::with_dh_params(
        DhParams::rfc2409_group2(),
    )));
    creds
}

fn client_certificate(with_own_cert: bool) -> CertificateCredentials {
    let verifier = PinnedKeyVerifier::new().pin(SERVER_CERT.to_vec(), server_key().to_public_key());
    let cert = CertificateCredentials::new().with_verifier(Arc::new(verifier));
    if with_own_cert {
        cert.with_certificate(vec![CLIENT_CERT.to_vec()], client_key())
    } else {
        cert
    }
}

fn client_credentials() -> Credentials {
    let mut creds = Credentials::new();
    creds.set(Credential::Certificate(client_certificate(false)));
    creds.set(Credential::Anonymous(AnonymousCredentials::new()));
    creds
}

fn config_with(f: impl FnOnce(&mut SessionConfig)) -> SessionConfig {
    let mut config = SessionConfig::default();
    f(&mut config);
    config
}

type TestSession = Session<MemoryTransport>;

fn sessions_over(
    transports: (MemoryTransport, MemoryTransport),
    client_config: SessionConfig,
    server_config: SessionConfig,
) -> (TestSession, TestSession) {
    let (a, b) = transports;
    let mut client = Session::new(Role::Client, client_config, a);
    *client.credentials_mut() = client_credentials();
    let mut server = Session::new(Role::Server, server_config, b);
    *server.credentials_mut() = server_credentials();
    (client, server)
}

fn sessions(client_config: SessionConfig, server_config: SessionConfig) -> (TestSession, TestSession) {
    sessions_over(MemoryTransport::pair(), client_config, server_config)
}

/// Drive both sides until each reports `Done`.
fn handshake(client: &mut TestSession, server: &mut TestSession) -> rtls_core::Result<()> {
    let mut client_done = false;
    let mut server_done = false;
    for _ in 0..10_000 {
        if !client_done {
            client_done = client.continue_handshake()? == HandshakeStatus::Done;
        }
        if !server_done {
            server_done = server.continue_handshake()? == HandshakeStatus::Done;
        }
        if client_done && server_done {
            return Ok(());
        }
    }
    panic!("handshake did not converge");
}

fn transfer(from: &mut TestSession, to: &mut TestSession, data: &[u8]) -> Vec<u8> {
    let mut sent = 0;
    while sent < data.len() {
        sent += from.send(&data[sent..]).unwrap();
    }
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while out.len() < data.len() {
        let n = to.recv(&mut buf).unwrap();
        assert_ne!(n, 0, "unexpected close");
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn assert_agree(client: &TestSession, server: &TestSession) {
    let c = client.security_parameters();
    let s = server.security_parameters();
    assert_eq!(c.version, s.version);
    assert_eq!(c.suite, s.suite);
    assert_eq!(c.session_id, s.session_id);
    assert_eq!(*c.master_secret, *s.master_secret);
    assert_eq!(client.finished(), server.peer_finished());
    assert_eq!(server.finished(), client.peer_finished());
}

#[test]
fn test_full_rsa_handshake() {
    let (mut client, mut server) = sessions(SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    assert_agree(&client, &server);

    let params = client.security_parameters();
    assert_eq!(params.version, ProtocolVersion::Tls1_2);
    assert_eq!(params.suite, ids::TLS_RSA_WITH_AES_128_CBC_SHA);
    assert_eq!(params.session_id.len(), 32);
    assert_eq!(client.finished().len(), 12);
    assert!(!client.is_resumed());
    assert!(client.is_established() && server.is_established());
    assert_eq!(client.handshake_state(), HandshakeState::Initial);

    let auth = client.auth_info().unwrap();
    assert_eq!(auth.kind, CredentialType::Certificate);
    assert_eq!(auth.peer_certificates, vec![SERVER_CERT.to_vec()]);
    assert!(server.auth_info().unwrap().peer_certificates.is_empty());

    assert_eq!(transfer(&mut client, &mut server, b"ping"), b"ping");
    assert_eq!(transfer(&mut server, &mut client, b"pong"), b"pong");
}

#[test]
fn test_every_version_negotiates() {
    for version in ProtocolVersion::ALL {
        let client_config = config_with(|c| c.priorities.versions = vec![version]);
        let (mut client, mut server) = sessions(client_config, SessionConfig::default());
        handshake(&mut client, &mut server).unwrap();
        assert_agree(&client, &server);
        assert_eq!(server.security_parameters().version, version);
        let expected_finished = if version == ProtocolVersion::Ssl3 { 36 } else { 12 };
        assert_eq!(client.finished().len(), expected_finished);

        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(transfer(&mut client, &mut server, &data), data, "{version}");
    }
}

#[test]
fn test_dhe_rsa_handshake() {
    for version in [ProtocolVersion::Tls1_0, ProtocolVersion::Tls1_2] {
        let client_config = config_with(|c| {
            c.priorities.kx = vec![KxAlgorithm::DheRsa];
            c.priorities.versions = vec![version];
        });
        let (mut client, mut server) = sessions(client_config, SessionConfig::default());
        handshake(&mut client, &mut server).unwrap();
        assert_agree(&client, &server);

        let suite = client.security_parameters().cipher_suite().unwrap();
        assert_eq!(suite.kx, KxAlgorithm::DheRsa);
        let auth = client.auth_info().unwrap();
        assert_eq!(auth.dh_prime_bits, Some(1024));
        assert_eq!(auth.peer_certificates, vec![SERVER_CERT.to_vec()]);
        assert!(server.auth_info().unwrap().dh_peer_public.is_some());
        assert_eq!(transfer(&mut server, &mut client, b"dhe"), b"dhe");
    }
}

#[test]
fn test_anonymous_dh_handshake() {
    let client_config = config_with(|c| c.priorities.kx = vec![KxAlgorithm::AnonDh]);
    let (mut client, mut server) = sessions(client_config, SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    assert_agree(&client, &server);

    let auth = client.auth_info().unwrap();
    assert_eq!(auth.kind, CredentialType::Anonymous);
    assert!(auth.peer_certificates.is_empty());
    assert_eq!(auth.dh_prime_bits, Some(1024));
    assert_eq!(transfer(&mut client, &mut server, b"anon"), b"anon");
}

#[test]
fn test_rsa_export_handshake() {
    let export = |c: &mut SessionConfig| {
        c.priorities.kx = vec![KxAlgorithm::RsaExport];
        c.priorities.ciphers = vec![BulkCipher::Arcfour40];
        c.priorities.macs = vec![MacAlgorithm::Md5];
        c.priorities.versions = vec![ProtocolVersion::Tls1_0];
    };
    let (mut client, mut server) = sessions(config_with(export), config_with(export));
    handshake(&mut client, &mut server).unwrap();
    assert_agree(&client, &server);

    assert_eq!(client.security_parameters().suite, ids::TLS_RSA_EXPORT_WITH_RC4_40_MD5);
    assert_eq!(client.auth_info().unwrap().rsa_export_modulus_bits, Some(512));
    assert_eq!(transfer(&mut client, &mut server, b"export"), b"export");
}

#[test]
fn test_server_cipher_restriction() {
    let server_config = config_with(|c| c.priorities.ciphers = vec![BulkCipher::TripleDesCbc]);
    let (mut client, mut server) = sessions(SessionConfig::default(), server_config);
    handshake(&mut client, &mut server).unwrap();

    let suite = client.security_parameters().cipher_suite().unwrap();
    assert_eq!(suite.cipher, BulkCipher::TripleDesCbc);
    assert_eq!(suite.id, ids::TLS_RSA_WITH_3DES_EDE_CBC_SHA);
    assert_eq!(transfer(&mut client, &mut server, b"ping"), b"ping");
}

#[test]
fn test_no_common_suite() {
    let client_config = config_with(|c| c.priorities.ciphers = vec![BulkCipher::Aes128Cbc]);
    let server_config = config_with(|c| c.priorities.ciphers = vec![BulkCipher::Arcfour128]);
    let (mut client, mut server) = sessions(client_config, server_config);
    assert!(matches!(
        handshake(&mut client, &mut server),
        Err(Error::NoAcceptableCipherSuite)
    ));
    assert!(matches!(
        client.continue_handshake(),
        Err(Error::FatalAlert(AlertDescription::HandshakeFailure))
    ));
    assert!(matches!(server.continue_handshake(), Err(Error::InvalidSession)));
}

#[test]
fn test_client_version_below_server_minimum() {
    let client_config = config_with(|c| c.priorities.versions = vec![ProtocolVersion::Tls1_0]);
    let server_config = config_with(|c| c.priorities.versions = vec![ProtocolVersion::Tls1_2]);
    let (mut client, mut server) = sessions(client_config, server_config);
    assert!(matches!(handshake(&mut client, &mut server), Err(Error::UnsupportedVersion)));
    assert!(matches!(
        client.continue_handshake(),
        Err(Error::FatalAlert(AlertDescription::ProtocolVersion))
    ));
}

#[test]
fn test_resumption() {
    let cache = Arc::new(MemorySessionCache::default());
    let server_config = config_with(|c| c.session_cache = Some(cache.clone()));

    let (mut client, mut server) = sessions(SessionConfig::default(), server_config.clone());
    handshake(&mut client, &mut server).unwrap();
    assert_eq!(cache.len(), 1);
    let data = client.resumption_data().unwrap();
    assert_eq!(data.session_id, client.security_parameters().session_id);

    let (mut client2, mut server2) = sessions(SessionConfig::default(), server_config);
    client2.set_resumption_data(data.clone()).unwrap();
    handshake(&mut client2, &mut server2).unwrap();

    assert!(client2.is_resumed());
    assert!(server2.is_resumed());
    assert_agree(&client2, &server2);
    assert_eq!(client2.security_parameters().session_id, data.session_id);
    assert_eq!(*client2.security_parameters().master_secret, *data.master_secret);
    assert_eq!(client2.auth_info().unwrap().kind, CredentialType::Certificate);
    // fresh randoms give fresh Finished values
    assert_ne!(client2.finished(), client.finished());
    assert_eq!(transfer(&mut server2, &mut client2, b"resumed"), b"resumed");
}

#[test]
fn test_resumption_falls_back_to_full_handshake() {
    let (mut client, mut server) = sessions(SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    let data = client.resumption_data().unwrap();

    // no cache on this server
    let (mut client2, mut server2) = sessions(SessionConfig::default(), SessionConfig::default());
    client2.set_resumption_data(data.clone()).unwrap();
    handshake(&mut client2, &mut server2).unwrap();
    assert!(!client2.is_resumed());
    assert!(!server2.is_resumed());
    assert_ne!(client2.security_parameters().session_id, data.session_id);
    assert_agree(&client2, &server2);
}

#[test]
fn test_unexpected_change_cipher_spec() {
    let (mut client, server) = sessions(SessionConfig::default(), SessionConfig::default());
    assert_eq!(client.continue_handshake().unwrap(), HandshakeStatus::WouldBlock);
    assert_eq!(client.direction(), IoDirection::Read);

    client.get_ref().inject(&[20, 3, 3, 0, 1, 1]);
    assert!(matches!(client.continue_handshake(), Err(Error::UnexpectedPacket)));

    // ClientHello followed by a plaintext unexpected_message alert
    let wire = server.get_ref().drain();
    assert_eq!(&wire[wire.len() - 7..], &[21, 3, 3, 0, 2, 2, 10]);
    assert!(matches!(client.send(b"x"), Err(Error::InvalidSession)));
}

#[test]
fn test_oversized_handshake_message() {
    let server_config = config_with(|c| c.max_handshake_packet = 32);
    let (mut client, mut server) = sessions(SessionConfig::default(), server_config);
    assert!(matches!(
        handshake(&mut client, &mut server),
        Err(Error::HandshakePacketTooLarge(_))
    ));
}

#[test]
fn test_rehandshake_accepted() {
    let (mut client, mut server) = sessions(SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    let first_finished = client.finished().to_vec();
    let first_session = client.security_parameters().session_id.clone();

    assert!(matches!(client.request_rehandshake(), Err(Error::InvalidRequest(_))));
    server.request_rehandshake().unwrap();
    let mut buf = [0u8; 16];
    assert!(matches!(client.recv(&mut buf), Err(Error::Rehandshake)));

    handshake(&mut client, &mut server).unwrap();
    assert_agree(&client, &server);
    assert_ne!(client.finished(), first_finished.as_slice());
    assert_ne!(client.security_parameters().session_id, first_session);
    assert_eq!(transfer(&mut client, &mut server, b"after"), b"after");
}

#[test]
fn test_rehandshake_declined() {
    let (mut client, mut server) = sessions(SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    let finished = client.finished().to_vec();

    server.request_rehandshake().unwrap();
    let mut buf = [0u8; 16];
    assert!(matches!(client.recv(&mut buf), Err(Error::Rehandshake)));
    client.decline_rehandshake().unwrap();

    assert!(matches!(
        server.continue_handshake(),
        Err(Error::WarningAlert(AlertDescription::NoRenegotiation))
    ));
    assert_eq!(server.handshake_state(), HandshakeState::Initial);
    assert_eq!(server.finished().len(), 12);
    assert_eq!(client.finished(), finished.as_slice());
    assert_eq!(transfer(&mut client, &mut server, b"still here"), b"still here");
    assert_eq!(transfer(&mut server, &mut client, b"me too"), b"me too");
}

#[test]
fn test_rehandshake_ignored_by_client() {
    let (mut client, mut server) = sessions(SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();

    server.request_rehandshake().unwrap();
    // the client keeps sending data instead of a ClientHello
    client.send(b"busy").unwrap();
    assert!(matches!(server.continue_handshake(), Err(Error::GotApplicationData)));
    let mut buf = [0u8; 16];
    let n = server.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"busy");
    assert!(server.is_established());
}

#[test]
fn test_client_certificate_required() {
    let server_config = config_with(|c| c.client_cert_policy = ClientCertPolicy::Require);
    for version in [ProtocolVersion::Ssl3, ProtocolVersion::Tls1_0, ProtocolVersion::Tls1_2] {
        let client_config = config_with(|c| c.priorities.versions = vec![version]);
        let (mut client, mut server) = sessions(client_config, server_config.clone());
        client.credentials_mut().set(Credential::Certificate(client_certificate(true)));
        handshake(&mut client, &mut server).unwrap();
        assert_agree(&client, &server);

        let auth = server.auth_info().unwrap();
        assert_eq!(auth.peer_certificates, vec![CLIENT_CERT.to_vec()], "{version}");
        assert_eq!(transfer(&mut client, &mut server, b"authed"), b"authed");
    }
}

#[test]
fn test_client_certificate_missing() {
    let required = config_with(|c| c.client_cert_policy = ClientCertPolicy::Require);
    let (mut client, mut server) = sessions(SessionConfig::default(), required);
    assert!(matches!(handshake(&mut client, &mut server), Err(Error::NoCertificateFound)));

    // SSL 3.0 clients answer with a no_certificate warning instead
    let requested = config_with(|c| c.client_cert_policy = ClientCertPolicy::Request);
    let ssl3 = config_with(|c| c.priorities.versions = vec![ProtocolVersion::Ssl3]);
    let (mut client, mut server) = sessions(ssl3, requested);
    handshake(&mut client, &mut server).unwrap();
    assert!(server.auth_info().unwrap().peer_certificates.is_empty());
    assert_eq!(transfer(&mut client, &mut server, b"anyway"), b"anyway");
}

#[test]
fn test_sslv2_client_hello() {
    let (peer, transport) = MemoryTransport::pair();
    let mut server = Session::new(Role::Server, SessionConfig::default(), transport);
    *server.credentials_mut() = server_credentials();

    let mut body = vec![1, 3, 1, 0, 6, 0, 0, 0, 16];
    body.extend_from_slice(&[0x00, 0x00, 0x2f]);
    body.extend_from_slice(&[0x01, 0x00, 0x80]);
    body.extend_from_slice(&[0xcc; 16]);
    let mut wire = vec![0x80, body.len() as u8];
    wire.extend_from_slice(&body);
    server.get_ref().inject(&wire);

    assert_eq!(server.continue_handshake().unwrap(), HandshakeStatus::WouldBlock);
    assert_eq!(server.handshake_state(), HandshakeState::ClientCertificate);

    let out = peer.drain();
    let record = RecordHeader::parse(&out).unwrap();
    assert_eq!(record.version, [3, 1]);
    let header = HandshakeHeader::parse(&out[5..]).unwrap();
    assert_eq!(header.msg_type, 2);
    let hello = ServerHello::parse(&out[9..9 + header.length]).unwrap();
    assert_eq!(hello.version, [3, 1]);
    assert_eq!(hello.cipher_suite, SuiteId([0x00, 0x2f]));
}

#[test]
fn test_sslv2_hello_refused_when_disabled() {
    let (_peer, transport) = MemoryTransport::pair();
    let config = config_with(|c| c.allow_v2_hello = false);
    let mut server = Session::new(Role::Server, config, transport);
    *server.credentials_mut() = server_credentials();
    server.get_ref().inject(&[0x80, 0x1f, 1, 3, 1]);
    assert!(matches!(server.continue_handshake(), Err(Error::UnexpectedPacket)));
}

#[test]
fn test_backpressure_would_block() {
    let transports = MemoryTransport::pair_with_capacity(64);
    let (mut client, mut server) = sessions_over(transports, SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    assert_agree(&client, &server);

    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
    let mut sent = 0;
    let mut received = Vec::new();
    let mut saw_write_block = false;
    let mut buf = [0u8; 4096];
    while received.len() < data.len() {
        if sent < data.len() {
            match client.send(&data[sent..]) {
                Ok(n) => sent += n,
                Err(Error::WouldBlock) => {
                    assert_eq!(client.direction(), IoDirection::Write);
                    saw_write_block = true;
                }
                Err(e) => panic!("send failed: {e}"),
            }
        }
        match server.recv(&mut buf) {
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(Error::WouldBlock) => assert_eq!(server.direction(), IoDirection::Read),
            Err(e) => panic!("recv failed: {e}"),
        }
    }
    assert!(saw_write_block);
    assert_eq!(received, data);
}

#[test]
fn test_tampered_record_kills_session() {
    let (mut client, mut server) = sessions(SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();

    client.send(b"hello").unwrap();
    let mut wire = server.get_ref().drain();
    let last = wire.len() - 1;
    wire[last] ^= 0x80;
    server.get_ref().inject(&wire);

    let mut buf = [0u8; 16];
    assert!(matches!(server.recv(&mut buf), Err(Error::DecryptionFailed)));
    assert!(matches!(server.send(b"x"), Err(Error::InvalidSession)));
    assert!(matches!(
        client.recv(&mut buf),
        Err(Error::FatalAlert(AlertDescription::BadRecordMac))
    ));
}

#[test]
fn test_record_version_fixed_after_hello() {
    let config = config_with(|c| c.priorities.versions = vec![ProtocolVersion::Tls1_1]);
    let (mut client, mut server) = sessions(SessionConfig::default(), config);
    handshake(&mut client, &mut server).unwrap();
    assert_eq!(server.security_parameters().version, ProtocolVersion::Tls1_1);

    client.send(b"hello").unwrap();
    let mut wire = server.get_ref().drain();
    assert_eq!(&wire[1..3], &[3, 2]);
    wire[2] = 3;
    server.get_ref().inject(&wire);

    let mut buf = [0u8; 16];
    assert!(matches!(server.recv(&mut buf), Err(Error::UnsupportedVersion)));
    assert!(matches!(
        client.recv(&mut buf),
        Err(Error::FatalAlert(AlertDescription::ProtocolVersion))
    ));
}

#[test]
fn test_server_name_reaches_server() {
    let client_config = config_with(|c| c.server_name = Some("www.example.com".to_owned()));
    let (mut client, mut server) = sessions(client_config, SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    assert_agree(&client, &server);
    assert_eq!(server.server_name(), Some("www.example.com"));
    assert_eq!(client.server_name(), Some("www.example.com"));
    assert_eq!(client.max_fragment_length(), None);
    assert_eq!(transfer(&mut client, &mut server, b"named"), b"named");
}

#[test]
fn test_max_fragment_length_negotiated() {
    let big_cert = vec![0x5c; 1500];
    let client_config = config_with(|c| c.max_fragment_length = Some(MaxFragmentLength::Bytes512));
    let (mut client, mut server) = sessions(client_config, SessionConfig::default());
    let mut server_creds = Credentials::new();
    server_creds.set(Credential::Certificate(
        CertificateCredentials::new().with_certificate(vec![big_cert.clone()], server_key()),
    ));
    *server.credentials_mut() = server_creds;
    let verifier = PinnedKeyVerifier::new().pin(big_cert, server_key().to_public_key());
    let mut client_creds = Credentials::new();
    client_creds.set(Credential::Certificate(
        CertificateCredentials::new().with_verifier(Arc::new(verifier)),
    ));
    *client.credentials_mut() = client_creds;

    assert_eq!(client.continue_handshake().unwrap(), HandshakeStatus::WouldBlock);
    assert_eq!(server.continue_handshake().unwrap(), HandshakeStatus::WouldBlock);
    // the server's first flight already honors the limit
    let flight = client.get_ref().drain();
    let mut pos = 0;
    let mut records = 0;
    while pos < flight.len() {
        let header = RecordHeader::parse(&flight[pos..]).unwrap();
        assert!(header.length <= 512, "record of {} bytes", header.length);
        pos += 5 + header.length;
        records += 1;
    }
    assert!(records >= 5, "certificate was not fragmented");
    client.get_ref().inject(&flight);

    handshake(&mut client, &mut server).unwrap();
    assert_agree(&client, &server);
    assert_eq!(client.max_fragment_length(), Some(MaxFragmentLength::Bytes512));
    assert_eq!(server.max_fragment_length(), Some(MaxFragmentLength::Bytes512));

    assert_eq!(client.send(&[7u8; 2000]).unwrap(), 512);
    assert_eq!(server.send(&[7u8; 2000]).unwrap(), 512);
    let mut buf = [0u8; 4096];
    assert_eq!(server.recv(&mut buf).unwrap(), 512);
    assert_eq!(client.recv(&mut buf).unwrap(), 512);

    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 249) as u8).collect();
    assert_eq!(transfer(&mut client, &mut server, &data), data);
    assert_eq!(transfer(&mut server, &mut client, &data), data);
}

#[test]
fn test_extensions_ignored_for_ssl3() {
    let client_config = config_with(|c| {
        c.server_name = Some("legacy.example".to_owned());
        c.max_fragment_length = Some(MaxFragmentLength::Bytes1024);
    });
    let server_config = config_with(|c| c.priorities.versions = vec![ProtocolVersion::Ssl3]);
    let (mut client, mut server) = sessions(client_config, server_config);
    handshake(&mut client, &mut server).unwrap();
    assert_eq!(client.security_parameters().version, ProtocolVersion::Ssl3);
    assert_eq!(server.server_name(), None);
    assert_eq!(client.max_fragment_length(), None);
    assert_eq!(client.send(&[1u8; 2000]).unwrap(), 2000);
}

/// Plaintext handshake record carrying one message.
fn handshake_record(msg_type: HandshakeType, body: &[u8], version: [u8; 2]) -> Vec<u8> {
    let msg = encode_handshake(msg_type, body);
    let mut wire = vec![22, version[0], version[1]];
    wire.extend_from_slice(&(msg.len() as u16).to_be_bytes());
    wire.extend_from_slice(&msg);
    wire
}

#[test]
fn test_invalid_fragment_length_code_refused() {
    let (peer, transport) = MemoryTransport::pair();
    let mut server = Session::new(Role::Server, SessionConfig::default(), transport);
    *server.credentials_mut() = server_credentials();

    let hello = ClientHello {
        version: [3, 3],
        random: [0x11; 32],
        session_id: Vec::new(),
        cipher_suites: vec![ids::TLS_RSA_WITH_AES_128_CBC_SHA],
        compression_methods: vec![0],
        extensions: vec![Extension::new(EXT_MAX_FRAGMENT_LENGTH, vec![9])],
    };
    server
        .get_ref()
        .inject(&handshake_record(HandshakeType::ClientHello, &hello.serialize(), [3, 1]));
    assert!(matches!(server.continue_handshake(), Err(Error::IllegalParameter(_))));
    assert_eq!(peer.drain(), [21, 3, 3, 0, 2, 2, 47]);
}

#[test]
fn test_malformed_client_extensions_refused() {
    let (peer, transport) = MemoryTransport::pair();
    let mut server = Session::new(Role::Server, SessionConfig::default(), transport);
    *server.credentials_mut() = server_credentials();

    let hello = ClientHello {
        version: [3, 1],
        random: [0x22; 32],
        session_id: Vec::new(),
        cipher_suites: vec![ids::TLS_RSA_WITH_AES_128_CBC_SHA],
        compression_methods: vec![0],
        extensions: Vec::new(),
    };
    let mut body = hello.serialize();
    body.extend_from_slice(&[0x00, 0x06, 0x00, 0x00, 0x00, 0x05, 0x00]);
    server
        .get_ref()
        .inject(&handshake_record(HandshakeType::ClientHello, &body, [3, 1]));
    assert!(matches!(server.continue_handshake(), Err(Error::UnexpectedPacketLength)));
    // decode_error alert
    let wire = peer.drain();
    assert_eq!(&wire[wire.len() - 2..], &[2, 50]);
}

fn server_hello_with(extensions: Vec<Extension>) -> Vec<u8> {
    let hello = ServerHello {
        version: [3, 3],
        random: [0x33; 32],
        session_id: vec![0x44; 32],
        cipher_suite: ids::TLS_RSA_WITH_AES_128_CBC_SHA,
        compression_method: 0,
        extensions,
    };
    handshake_record(HandshakeType::ServerHello, &hello.serialize(), [3, 3])
}

#[test]
fn test_unsolicited_server_extension_refused() {
    let (client_transport, peer) = MemoryTransport::pair();
    let mut client = Session::new(Role::Client, SessionConfig::default(), client_transport);
    *client.credentials_mut() = client_credentials();
    assert_eq!(client.continue_handshake().unwrap(), HandshakeStatus::WouldBlock);
    peer.drain();

    client
        .get_ref()
        .inject(&server_hello_with(vec![MaxFragmentLength::Bytes512.to_extension()]));
    assert!(matches!(
        client.continue_handshake(),
        Err(Error::UnsupportedExtension(EXT_MAX_FRAGMENT_LENGTH))
    ));
    assert_eq!(peer.drain(), [21, 3, 3, 0, 2, 2, 110]);
}

#[test]
fn test_changed_fragment_length_echo_refused() {
    let (client_transport, _peer) = MemoryTransport::pair();
    let config = config_with(|c| c.max_fragment_length = Some(MaxFragmentLength::Bytes512));
    let mut client = Session::new(Role::Client, config, client_transport);
    *client.credentials_mut() = client_credentials();
    assert_eq!(client.continue_handshake().unwrap(), HandshakeStatus::WouldBlock);

    client
        .get_ref()
        .inject(&server_hello_with(vec![MaxFragmentLength::Bytes1024.to_extension()]));
    assert!(matches!(client.continue_handshake(), Err(Error::IllegalParameter(_))));
}

#[test]
fn test_shutdown() {
    let (mut client, mut server) = sessions(SessionConfig::default(), SessionConfig::default());
    handshake(&mut client, &mut server).unwrap();
    assert_eq!(client.send(&[]).unwrap(), 0);
    assert!(matches!(client.recv(&mut []), Err(Error::ShortBuffer)));

    client.shutdown(ShutdownMode::Write).unwrap();
    assert!(matches!(client.send(b"late"), Err(Error::InvalidRequest(_))));

    let mut buf = [0u8; 16];
    assert_eq!(server.recv(&mut buf).unwrap(), 0);
    server.shutdown(ShutdownMode::Both).unwrap();
    assert!(server.auth_info().is_none());

    client.shutdown(ShutdownMode::Both).unwrap();
    client.shutdown(ShutdownMode::Both).unwrap();
    assert_eq!(client.recv(&mut buf).unwrap(), 0);
}
