#![no_main]

use libfuzzer_sys::fuzz_target;
use rtls_core::extensions::{parse_extensions, parse_server_name, MaxFragmentLength};
use rtls_core::handshake::{parse_certificate_list, CertificateRequest, ClientHello, HandshakeHeader, ServerHello};

fuzz_target!(|data: &[u8]| {
    let _ = HandshakeHeader::parse(data);
    let _ = ClientHello::parse_v2(data);
    let _ = parse_certificate_list(data);
    let _ = CertificateRequest::parse(data, true);
    let _ = ServerHello::parse(data);
    let _ = parse_extensions(data);
    let _ = parse_server_name(data);
    let _ = MaxFragmentLength::parse(data);

    // A parsed hello re-encodes to something that parses to the same hello
    if let Ok(hello) = ClientHello::parse(data) {
        let reparsed = ClientHello::parse(&hello.serialize()).expect("re-encoded ClientHello must parse");
        assert_eq!(reparsed.cipher_suites, hello.cipher_suites);
        assert_eq!(reparsed.session_id, hello.session_id);
        assert_eq!(reparsed.extensions, hello.extensions);
    }
});
