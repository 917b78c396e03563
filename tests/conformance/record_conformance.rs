//! Record layer conformance across the whole suite registry.
//!
//! Every registered suite is exercised under every protocol version it is
//! compatible with: lengths around the block size and the maximum record
//! size must round-trip, and a flipped bit anywhere in the fragment must be
//! rejected.

use rtls_core::record::{
    ConnectionState, ContentType, RecordHeader, RecordLayer, MAX_RECORD_SIZE, RECORD_HEADER_LEN,
};
use rtls_core::Error;
use rtls_crypto::cipher::Direction;
use rtls_crypto::prf::derive_key_material;
use rtls_crypto::suite::CIPHER_SUITES;
use rtls_crypto::{CipherSuite, CryptoProvider, ProtocolVersion, RustCryptoProvider};
use std::sync::Arc;

const MASTER: [u8; 48] = [0x5a; 48];
const CLIENT_RANDOM: [u8; 32] = [0x01; 32];
const SERVER_RANDOM: [u8; 32] = [0x02; 32];

/// Client writer and server reader sharing the client write keys.
fn layers(suite: &CipherSuite, version: ProtocolVersion, random_padding: bool) -> (RecordLayer, RecordLayer) {
    let provider: Arc<dyn CryptoProvider> = Arc::new(RustCryptoProvider);
    let km = derive_key_material(version, suite.cipher, suite.mac, &MASTER, &CLIENT_RANDOM, &SERVER_RANDOM)
        .unwrap();
    let state = |dir| {
        ConnectionState::new(
            provider.as_ref(),
            version,
            suite.cipher,
            suite.mac,
            &km.client_key,
            &km.client_iv,
            &km.client_mac,
            dir,
        )
        .unwrap()
    };
    let mut tx = RecordLayer::new(provider.clone(), version, random_padding);
    let mut rx = RecordLayer::new(provider.clone(), version, random_padding);
    tx.install_write(state(Direction::Encrypt));
    rx.install_read(state(Direction::Decrypt));
    (tx, rx)
}

fn lengths(suite: &CipherSuite) -> Vec<usize> {
    let bs = suite.cipher.block_size().max(1);
    let mut lens = vec![0, 1, bs, bs + 1, MAX_RECORD_SIZE];
    if bs > 1 {
        lens.push(bs - 1);
    }
    lens
}

fn compatible_pairs() -> impl Iterator<Item = (&'static CipherSuite, ProtocolVersion)> {
    CIPHER_SUITES.iter().flat_map(|suite| {
        ProtocolVersion::ALL
            .into_iter()
            .filter(move |v| suite.is_compatible(*v))
            .map(move |v| (suite, v))
    })
}

#[test]
fn test_every_suite_roundtrips() {
    let mut checked = 0;
    for (suite, version) in compatible_pairs() {
        let (mut tx, mut rx) = layers(suite, version, false);
        for len in lengths(suite) {
            let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let record = tx.encrypt(ContentType::ApplicationData, &data).unwrap();
            let header = RecordHeader::parse(&record).unwrap();
            assert_eq!(header.version, version.to_wire());
            assert_eq!(header.content_type, ContentType::ApplicationData);
            let plain = rx.decrypt(&header, &record[RECORD_HEADER_LEN..]).unwrap();
            assert_eq!(plain, data, "{} {} len {}", suite.name, version, len);
        }
        checked += 1;
    }
    assert!(checked > CIPHER_SUITES.len());
}

#[test]
fn test_every_suite_detects_tampering() {
    for (suite, version) in compatible_pairs() {
        let (mut tx, mut rx) = layers(suite, version, false);
        let mut record = tx.encrypt(ContentType::ApplicationData, b"attack at dawn").unwrap();
        let last = record.len() - 1;
        record[last] ^= 0x01;
        let header = RecordHeader::parse(&record).unwrap();
        let result = rx.decrypt(&header, &record[RECORD_HEADER_LEN..]);
        assert!(
            matches!(result, Err(Error::DecryptionFailed)),
            "{} {} accepted a modified record",
            suite.name,
            version
        );
    }
}

#[test]
fn test_every_fragment_byte_is_authenticated() {
    for (suite, version) in compatible_pairs() {
        let (mut tx, _) = layers(suite, version, false);
        let record = tx.encrypt(ContentType::ApplicationData, b"attack at dawn").unwrap();
        let header = RecordHeader::parse(&record).unwrap();
        // explicit IV bytes included: a flipped IV byte lands in the first data block
        for pos in RECORD_HEADER_LEN..record.len() {
            let mut modified = record.clone();
            modified[pos] ^= 0x80;
            let (_, mut rx) = layers(suite, version, false);
            let result = rx.decrypt(&header, &modified[RECORD_HEADER_LEN..]);
            assert!(
                matches!(result, Err(Error::DecryptionFailed)),
                "{} {} accepted a record modified at byte {}",
                suite.name,
                version,
                pos
            );
        }
    }
}

#[test]
fn test_random_padding_roundtrips() {
    for (suite, version) in compatible_pairs().filter(|(s, _)| s.cipher.is_block()) {
        let (mut tx, mut rx) = layers(suite, version, true);
        for _ in 0..8 {
            let record = tx.encrypt(ContentType::ApplicationData, b"padded").unwrap();
            let header = RecordHeader::parse(&record).unwrap();
            assert_eq!(header.length % suite.cipher.block_size(), 0);
            assert_eq!(rx.decrypt(&header, &record[RECORD_HEADER_LEN..]).unwrap(), b"padded");
        }
    }
}

#[test]
fn test_records_out_of_order_rejected() {
    let suite = CipherSuite::by_id(rtls_crypto::suite::ids::TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
    let (mut tx, mut rx) = layers(suite, ProtocolVersion::Tls1_2, false);
    let first = tx.encrypt(ContentType::ApplicationData, b"one").unwrap();
    let second = tx.encrypt(ContentType::ApplicationData, b"two").unwrap();
    let header = RecordHeader::parse(&second).unwrap();
    // the MAC binds the sequence number
    assert!(matches!(
        rx.decrypt(&header, &second[RECORD_HEADER_LEN..]),
        Err(Error::DecryptionFailed)
    ));
    drop(first);
}

#[test]
fn test_wrong_direction_keys_rejected() {
    let suite = CipherSuite::by_id(rtls_crypto::suite::ids::TLS_RSA_WITH_RC4_128_SHA).unwrap();
    let version = ProtocolVersion::Tls1_0;
    let provider: Arc<dyn CryptoProvider> = Arc::new(RustCryptoProvider);
    let km = derive_key_material(version, suite.cipher, suite.mac, &MASTER, &CLIENT_RANDOM, &SERVER_RANDOM)
        .unwrap();
    let (mut tx, _) = layers(suite, version, false);
    let mut rx = RecordLayer::new(provider.clone(), version, false);
    rx.install_read(
        ConnectionState::new(
            provider.as_ref(),
            version,
            suite.cipher,
            suite.mac,
            &km.server_key,
            &km.server_iv,
            &km.server_mac,
            Direction::Decrypt,
        )
        .unwrap(),
    );
    let record = tx.encrypt(ContentType::ApplicationData, b"hello").unwrap();
    let header = RecordHeader::parse(&record).unwrap();
    assert!(rx.decrypt(&header, &record[RECORD_HEADER_LEN..]).is_err());
}
