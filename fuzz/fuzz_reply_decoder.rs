//! Fuzz target for the reply path: pickle decoding, normalization and the
//! status parsers.
//!
//! Run with: cargo +nightly fuzz run fuzz_reply_decoder
//!
//! None of these may panic or loop on hostile input.

#![no_main]

use banbridge_core::wire::{decode, strip_markers};
use banbridge_core::{collect_addresses, flatten, normalize, parse_global_status, parse_unit_status};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let payload = strip_markers(data);
    let Ok(reply) = decode(&payload) else {
        return;
    };
    let _ = normalize(&reply);
    let _ = flatten(&reply);
    let _ = collect_addresses(&reply);
    let _ = parse_global_status(&reply);
    let _ = parse_unit_status(&reply);
});
