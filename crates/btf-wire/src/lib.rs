#![warn(clippy::pedantic)]

//! Pure wire codec for the binary tagged format.
//!
//! Two operations over byte slices, no I/O and no state: encode one tag
//! into at most [`btf_types::size::MAX_TAG`] bytes, and parse one tag
//! from a byte prefix. Payload bytes of str/bin/ext values never pass
//! through this crate; the streaming surfaces and the tree parser handle
//! them after the header.

pub mod encode;
pub mod error;
pub mod marker;
pub mod parse;

pub use encode::encode_tag;
pub use error::WireError;
pub use parse::{header_size, parse_tag};
