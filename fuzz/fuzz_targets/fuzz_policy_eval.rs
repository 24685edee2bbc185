//! Fuzz target for the policy engine.
//!
//! Run with: cargo +nightly fuzz run fuzz_policy_eval
//!
//! Exercises both policy directions with arbitrary input to find panics
//! or pathological regex behavior.

#![no_main]

use hermsh_config::policy::PolicyEngine;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let engine = PolicyEngine::new();

    // Should never panic regardless of input
    let _ = engine.check_command(s);
    let _ = engine.check_response(s);
});
