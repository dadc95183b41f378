#![no_main]

use libfuzzer_sys::fuzz_target;
use memcload::payload::{decode, encode};
use memcload::record::parse_record;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    // Malformed lines are fine; any parsed record must survive encoding.
    if let Ok(parsed) = parse_record(&line) {
        let payload = encode(&parsed.record);
        let unpacked = decode(&payload.bytes).expect("encoded payload must decode");
        assert!(unpacked.same_as(&parsed.record));
    }
});
