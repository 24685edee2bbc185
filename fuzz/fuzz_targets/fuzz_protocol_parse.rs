//! Fuzz target for the wire protocol parsers.
//!
//! Run with: cargo +nightly fuzz run fuzz_protocol_parse
//!
//! Exercises request, reply, and probe-verdict parsing with arbitrary
//! input. Parsers must reject or degrade, never panic.

#![no_main]

use hermsh_core::protocol::{parse_verdict, Reply, Request};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let _ = Request::parse(s);
    let _ = Reply::parse(s);
    let _ = parse_verdict(s);
});
