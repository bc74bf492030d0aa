//! Fuzz target: `ProbeUid::from_str`
//!
//! Any text that parses must print back to the same uid.
//!
//! cargo fuzz run fuzz_probe_uid

#![no_main]

use fluiddash::sensors::uid::ProbeUid;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(uid) = text.parse::<ProbeUid>() {
        assert_eq!(uid.to_hex().as_str(), text.to_ascii_uppercase());
    }
});
