//! Fuzz target: `parse_reply`
//!
//! Feeds arbitrary text to the sensor reply parser under both labels and
//! asserts that it never panics and never yields a non-finite value.
//!
//! cargo fuzz run fuzz_sensor_reply

#![no_main]

use bakhoor::sensors::protocol::{TEMP_LABEL, WEIGHT_LABEL, parse_reply};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    for label in [TEMP_LABEL, WEIGHT_LABEL] {
        if let Ok(value) = parse_reply(&text, label) {
            assert!(value.is_finite(), "parser accepted {value}");
        }
    }
});
