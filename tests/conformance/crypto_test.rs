//! Cryptographic conformance tests.
//!
//! Known-answer vectors for the primitives the record and handshake layers
//! build on: the TLS PRFs, record MACs, digests and bulk ciphers.

#[cfg(test)]
mod prf_tests {
    use rtls_crypto::prf::{derive_master_secret, prf, ssl3_generate, MASTER_SECRET_LEN};
    use rtls_crypto::suite::PrfAlgorithm;
    use rtls_crypto::ProtocolVersion;

    /// TLS 1.2 PRF (P_SHA256) vector circulated on the IETF TLS list.
    #[test]
    fn test_tls12_prf_ietf_vector() {
        let secret = hex::decode("9bbe436ba940f017b17652849a71db35").unwrap();
        let seed = hex::decode("a0ba9f936cda311827a6f796ffd5198c").unwrap();
        let expected = hex::decode(
            "e3f229ba727be17b8d122620557cd453c2aab21d07c3d495329b52d4e61edb5a\
             6b301791e90d35c9c9a46b4e14baf9af0fa022f7077def17abfd3797c0564bab\
             4fbc91666e9def9b97fce34f796789baa48082d122ee42c5a72e5a5110fff701\
             87347b66",
        )
        .unwrap();

        let out = prf(PrfAlgorithm::Sha256, &secret, b"test label", &seed, 100).unwrap();
        assert_eq!(&*out, expected.as_slice());
    }

    #[test]
    fn test_tls10_prf_vector() {
        let out = prf(PrfAlgorithm::Md5Sha1, b"secret", b"test label", b"seed", 20).unwrap();
        assert_eq!(hex::encode(&*out), "a8ef48e934ebf83df2dffe4aa0445a2845481b5d");
    }

    #[test]
    fn test_ssl3_key_generation_vector() {
        let out = ssl3_generate(b"secret", b"seed", 48).unwrap();
        assert_eq!(
            hex::encode(&*out),
            "53aea80594d05b400a6a11727e4e8deb13dafd0e1d892e3bb2f3dd8c6aac8309\
             c212860d7723a48d2d1ea5cb1c412c1b"
        );
    }

    /// TLS 1.0 and 1.1 share the PRF, so they agree on the master secret.
    #[test]
    fn test_master_secret_per_version() {
        let premaster = [0x03u8; 48];
        let cr = [0x11u8; 32];
        let sr = [0x22u8; 32];
        let secrets: Vec<_> = ProtocolVersion::ALL
            .iter()
            .map(|v| derive_master_secret(*v, &premaster, &cr, &sr).unwrap())
            .collect();
        for s in &secrets {
            assert_eq!(s.len(), MASTER_SECRET_LEN);
        }
        let tls10 = derive_master_secret(ProtocolVersion::Tls1_0, &premaster, &cr, &sr).unwrap();
        let tls11 = derive_master_secret(ProtocolVersion::Tls1_1, &premaster, &cr, &sr).unwrap();
        assert_eq!(*tls10, *tls11);
    }
}

#[cfg(test)]
mod mac_tests {
    use rtls_crypto::mac::digest;
    use rtls_crypto::suite::MacAlgorithm;
    use rtls_crypto::{CryptoProvider, RustCryptoProvider};

    fn hmac(alg: MacAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = RustCryptoProvider.new_mac(alg, key, false).unwrap();
        mac.update(data);
        mac.finish()
    }

    /// RFC 2202 §2/§3 and RFC 4231 §4.3, test case 2.
    #[test]
    fn test_hmac_rfc_vectors() {
        let data = b"what do ya want for nothing?";
        assert_eq!(
            hex::encode(hmac(MacAlgorithm::Md5, b"Jefe", data)),
            "750c783e6ab0b503eaa86e310a5db738"
        );
        assert_eq!(
            hex::encode(hmac(MacAlgorithm::Sha1, b"Jefe", data)),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
        assert_eq!(
            hex::encode(hmac(MacAlgorithm::Sha256, b"Jefe", data)),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_null_mac_is_empty() {
        assert!(hmac(MacAlgorithm::Null, b"", b"anything").is_empty());
    }

    #[test]
    fn test_digests() {
        assert_eq!(
            hex::encode(digest(MacAlgorithm::Md5, b"abc").unwrap()),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            hex::encode(digest(MacAlgorithm::Sha1, b"abc").unwrap()),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}

#[cfg(test)]
mod cipher_tests {
    use rtls_crypto::cipher::Direction;
    use rtls_crypto::suite::BulkCipher;
    use rtls_crypto::{CryptoProvider, RustCryptoProvider};

    /// NIST SP 800-38A F.2.1, first two blocks.
    #[test]
    fn test_aes128_cbc_sp800_38a() {
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv: Vec<u8> = (0u8..16).collect();
        let plaintext = hex::decode(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51",
        )
        .unwrap();

        let mut data = plaintext.clone();
        let mut enc = RustCryptoProvider
            .new_cipher(BulkCipher::Aes128Cbc, &key, &iv, Direction::Encrypt)
            .unwrap();
        enc.encrypt(&mut data).unwrap();
        assert_eq!(
            hex::encode(&data),
            "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2"
        );

        let mut dec = RustCryptoProvider
            .new_cipher(BulkCipher::Aes128Cbc, &key, &iv, Direction::Decrypt)
            .unwrap();
        dec.decrypt(&mut data).unwrap();
        assert_eq!(data, plaintext);
    }

    /// RFC 6229, 128-bit key 0x0102..10, keystream offset 0.
    #[test]
    fn test_rc4_rfc6229_keystream() {
        let key: Vec<u8> = (1u8..=16).collect();
        let mut data = [0u8; 16];
        let mut rc4 = RustCryptoProvider
            .new_cipher(BulkCipher::Arcfour128, &key, &[], Direction::Encrypt)
            .unwrap();
        rc4.encrypt(&mut data).unwrap();
        assert_eq!(hex::encode(data), "9ac7cc9a609d1ef7b2932899cde41b97");
    }

    /// CBC state carries across calls, as consecutive records require.
    #[test]
    fn test_cbc_chains_across_records() {
        let key = [7u8; 24];
        let iv = [9u8; 8];
        let mut enc = RustCryptoProvider
            .new_cipher(BulkCipher::TripleDesCbc, &key, &iv, Direction::Encrypt)
            .unwrap();
        let mut first = [1u8; 16];
        let mut second = [1u8; 16];
        enc.encrypt(&mut first).unwrap();
        enc.encrypt(&mut second).unwrap();
        assert_ne!(first, second);

        let mut dec = RustCryptoProvider
            .new_cipher(BulkCipher::TripleDesCbc, &key, &iv, Direction::Decrypt)
            .unwrap();
        dec.decrypt(&mut first).unwrap();
        dec.decrypt(&mut second).unwrap();
        assert_eq!(first, [1u8; 16]);
        assert_eq!(second, [1u8; 16]);
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        let r = RustCryptoProvider.new_cipher(BulkCipher::Aes256Cbc, &[0u8; 16], &[0u8; 16], Direction::Encrypt);
        assert!(r.is_err());
    }
}

#[cfg(test)]
mod dh_tests {
    use rtls_crypto::kex::{DhKeyPair, DhParams};

    #[test]
    fn test_group2_agreement() {
        let params = DhParams::rfc2409_group2();
        assert_eq!(params.prime_bits(), 1024);
        let a = DhKeyPair::generate(&params).unwrap();
        let b = DhKeyPair::generate(&params).unwrap();
        let ab = a.exchange(&b.public_key()).unwrap();
        let ba = b.exchange(&a.public_key()).unwrap();
        assert_eq!(*ab, *ba);
        assert_ne!(ab.first(), Some(&0));
    }

    #[test]
    fn test_degenerate_peer_key_rejected() {
        let params = DhParams::rfc2409_group2();
        let a = DhKeyPair::generate(&params).unwrap();
        assert!(a.exchange(&[1]).is_err());
        assert!(a.exchange(&[0]).is_err());
    }
}
