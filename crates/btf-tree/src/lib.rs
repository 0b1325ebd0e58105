#![warn(clippy::pedantic)]

//! Bounded tree parser for the binary tagged format.
//!
//! A [`Tree`] materializes one complete message into an immutable,
//! random-access node structure backed by a paged arena of fixed-size
//! records. Parsing is iterative and resumable, and every compound
//! header is pre-reserved against the bytes actually available, so a
//! malicious header claiming millions of children fails before any
//! allocation matches it. [`Node`] handles expose typed getters and
//! map/array lookups over the parsed value.

mod arena;
pub mod node;
pub mod parser;

pub use node::Node;
pub use parser::{Tree, TreeOptions};
