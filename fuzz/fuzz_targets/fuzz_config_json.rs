//! Fuzz target: `CabinetConfig::from_json`
//!
//! Any configuration that parses must also pass validation on its own.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use bakhoor::config::CabinetConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = CabinetConfig::from_json(text) {
        assert!(config.validate().is_ok());
        assert!(config.heater_cutoff_c < config.overheat_emergency_c);
    }
});
