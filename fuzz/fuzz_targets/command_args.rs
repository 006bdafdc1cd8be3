//! Fuzz target for command parameter validation.
//!
//! Splits the input into whitespace separated words and feeds them to every
//! command in the table; parsing must never panic.

#![no_main]

use cdemu::cli::{parse_mask, parse_number, COMMANDS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let _ = parse_number(s);
    let _ = parse_mask(s);

    let args: Vec<String> = s.split_whitespace().map(str::to_string).collect();
    for spec in COMMANDS {
        let _ = spec.parse(&args);
    }
});
