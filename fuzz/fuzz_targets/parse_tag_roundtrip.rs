#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: parse → encode → parse equivalence.
//
// Any tag the parser accepts must re-encode to a form that parses back
// equal. The re-encoded bytes may be shorter (the encoder is minimal)
// but never semantically different.
fuzz_target!(|data: &[u8]| {
    let opts = btf_types::CodecOptions::new().extensions(true);
    let Ok((tag, _)) = btf_wire::parse_tag(data, opts) else {
        return;
    };
    let mut buf = [0u8; btf_types::size::MAX_TAG];
    let n = btf_wire::encode_tag(&tag, opts, &mut buf).expect("parsed tags must encode");
    let (again, consumed) = btf_wire::parse_tag(&buf[..n], opts).expect("re-parse");
    assert_eq!(consumed, n);
    assert!(tag.equal(&again), "{tag:?} re-parsed as {again:?}");
});
