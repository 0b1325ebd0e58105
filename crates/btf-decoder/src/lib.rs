#![warn(clippy::pedantic)]

//! Streaming tag reader for the binary tagged format.
//!
//! The reader exposes a cursor over a lazy sequence of tags, parsing one
//! value at a time from a pre-loaded slice or a pull-fill [`Source`].
//! Structural tracking mirrors the writer's: compounds must be consumed
//! and closed in balance, and the first failure latches permanently.

pub mod reader;
pub mod source;

pub use reader::{Reader, ReaderOptions};
pub use source::Source;
