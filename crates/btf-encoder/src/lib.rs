#![warn(clippy::pedantic)]

//! Streaming tag writer for the binary tagged format.
//!
//! The writer emits values through an internal buffer in one of three
//! output modes (bounded, flush-to-sink, or growable) while a
//! structural tracker verifies that every compound is opened and closed
//! in balance. See [`Writer`] for the full contract.

pub mod sink;
pub mod writer;

pub use sink::Sink;
pub use writer::{Writer, WriterOptions, MIN_FLUSH_BUFFER};
