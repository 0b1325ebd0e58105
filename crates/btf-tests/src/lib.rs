#![warn(clippy::pedantic)]

//! Shared document builders for the integration tests and benchmarks.

use btf_encoder::Writer;

/// A small, representative document:
/// `{"id": 7, "name": "seven", "tags": ["a", "b"], "score": 0.5}`.
#[must_use]
pub fn small_document() -> Vec<u8> {
    let mut w = Writer::growable();
    w.start_map(4).unwrap();
    w.write_str("id").unwrap();
    w.write_uint(7).unwrap();
    w.write_str("name").unwrap();
    w.write_str("seven").unwrap();
    w.write_str("tags").unwrap();
    w.start_array(2).unwrap();
    w.write_str("a").unwrap();
    w.write_str("b").unwrap();
    w.finish_array().unwrap();
    w.write_str("score").unwrap();
    w.write_f64(0.5).unwrap();
    w.finish_map().unwrap();
    w.into_bytes().unwrap()
}

/// An array of `count` heterogeneous records, for throughput-shaped
/// workloads.
#[must_use]
pub fn record_array(count: u32) -> Vec<u8> {
    let mut w = Writer::growable();
    w.start_array(count).unwrap();
    for i in 0..count {
        w.start_map(3).unwrap();
        w.write_str("seq").unwrap();
        w.write_uint(u64::from(i)).unwrap();
        w.write_str("delta").unwrap();
        w.write_int(-(i64::from(i))).unwrap();
        w.write_str("label").unwrap();
        w.write_str(&format!("record-{i}")).unwrap();
        w.finish_map().unwrap();
    }
    w.finish_array().unwrap();
    w.into_bytes().unwrap()
}
