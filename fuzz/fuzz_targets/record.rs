#![no_main]

use libfuzzer_sys::fuzz_target;
use rtls_core::record::{RecordHeader, RECORD_HEADER_LEN};
use rtls_core::Alert;

fuzz_target!(|data: &[u8]| {
    // Header parsing must never panic, and accepted headers re-encode exactly
    if let Ok(header) = RecordHeader::parse(data) {
        assert_eq!(&header.serialize()[..], &data[..RECORD_HEADER_LEN]);
    }

    // unknown levels are read as fatal, descriptions survive unchanged
    if let Ok(alert) = Alert::parse(data) {
        assert_eq!(alert.serialize()[1], data[1]);
    }
});
