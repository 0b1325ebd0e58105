#![warn(clippy::pedantic)]

//! Shared value model for the binary tagged format (BTF): the tag type
//! and its kinds, timestamps, the structural tracker used by both
//! streaming surfaces, the flat error taxonomy, and codec configuration.

pub mod error;
pub mod options;
pub mod tag;
pub mod timestamp;
pub mod track;

pub use error::{Error, Result};
pub use options::{CodecOptions, Spec, DEFAULT_BUFFER_SIZE};
pub use tag::{size, Kind, Tag};
pub use timestamp::{Timestamp, MAX_NANOSECONDS, TIMESTAMP_EXT_TYPE};
pub use track::Tracker;
