#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: the pure tag parser.
//
// Catches bugs in:
// - Truncated headers (every multi-byte form)
// - Reserved opcode handling
// - Ext gating with extensions on and off
// - Big-endian field decoding at width boundaries
fuzz_target!(|data: &[u8]| {
    let _ = btf_wire::parse_tag(data, btf_types::CodecOptions::new());
    let _ = btf_wire::parse_tag(data, btf_types::CodecOptions::new().extensions(true));
});
