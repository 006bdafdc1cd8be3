//! Fuzz target for config parsing.
//!
//! Feeds the same text to the TOML and the legacy INI loaders.

#![no_main]

use cdemu::Config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<Config>(s) {
            // Whatever bus string was accepted must resolve to a bus.
            let _ = config.bus();
        }
        if let Ok(config) = Config::from_ini(s) {
            let _ = config.bus();
        }
    }
});
