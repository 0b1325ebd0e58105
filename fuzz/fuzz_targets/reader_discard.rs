#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: the streaming reader discarding one arbitrary value.
//
// Catches bugs in:
// - Ensure/straddle bookkeeping on truncated compounds
// - Structural tracking of deeply nested garbage
// - Skip-versus-fill paths on str/bin/ext payload lengths
fuzz_target!(|data: &[u8]| {
    let mut reader = btf_decoder::Reader::from_slice(data);
    let _ = reader.discard();
    let _ = reader.finish();
});
