#![no_main]

use libfuzzer_sys::fuzz_target;
use rtls_core::{Role, Session, SessionConfig};
use rtls_transport::MemoryTransport;

fuzz_target!(|data: &[u8]| {
    // Arbitrary peer bytes drive a server session; errors are fine, panics are not
    let (peer, transport) = MemoryTransport::pair();
    peer.close();
    let mut server = Session::new(Role::Server, SessionConfig::default(), transport);
    server.get_ref().inject(data);
    for _ in 0..4 {
        if server.continue_handshake().is_err() {
            break;
        }
    }
});
