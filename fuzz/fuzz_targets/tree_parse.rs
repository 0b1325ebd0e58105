#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: the bounded tree parser over arbitrary blobs.
//
// Catches bugs in:
// - Pre-reservation accounting (bomb headers, nested over-claims)
// - Arena range allocation and the page heuristic
// - max_size / max_nodes enforcement
// - Query safety on whatever tree results
fuzz_target!(|data: &[u8]| {
    let opts = btf_tree::TreeOptions::new()
        .codec(btf_types::CodecOptions::new().extensions(true))
        .max_nodes(1 << 16);
    let mut tree = btf_tree::Tree::from_blob_with(data, opts);
    if tree.parse().is_ok() {
        let root = tree.root();
        let _ = root.tag();
        let _ = root.as_u64();
        let _ = root.map_count();
        let _ = root.array_length();
        if let Ok(bytes) = root.bytes() {
            assert!(bytes.len() <= data.len());
        }
    }
});
