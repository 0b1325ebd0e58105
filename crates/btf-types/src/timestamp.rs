use crate::error::{Error, Result};

/// Ext type code reserved for timestamps.
pub const TIMESTAMP_EXT_TYPE: i8 = -1;

/// Largest valid nanosecond field: one full second minus one nanosecond.
pub const MAX_NANOSECONDS: u32 = 999_999_999;

/// A point in time: seconds since the Unix epoch plus a sub-second
/// nanosecond offset in `[0, 999_999_999]`.
///
/// On the wire a timestamp is an ext value of type −1 with a 4, 8, or
/// 12-byte payload, chosen by the encoder as the smallest form that
/// represents the value:
///
/// ```text
///   4 bytes:  u32 seconds                      (0 ≤ s ≤ u32::MAX, ns = 0)
///   8 bytes:  u64 = nanoseconds << 34 | seconds (0 ≤ s < 2³⁴)
///   12 bytes: u32 nanoseconds, then i64 seconds (anything else)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    seconds: i64,
    nanoseconds: u32,
}

impl Timestamp {
    /// Build a timestamp, rejecting out-of-range nanoseconds with
    /// [`Error::Bug`].
    pub fn new(seconds: i64, nanoseconds: u32) -> Result<Self> {
        if nanoseconds > MAX_NANOSECONDS {
            return Err(Error::Bug);
        }
        Ok(Timestamp { seconds, nanoseconds })
    }

    /// Seconds since the Unix epoch. May be negative.
    #[must_use]
    pub fn seconds(self) -> i64 {
        self.seconds
    }

    /// Sub-second offset, always in `[0, 999_999_999]`.
    #[must_use]
    pub fn nanoseconds(self) -> u32 {
        self.nanoseconds
    }

    /// The payload length (4, 8, or 12 bytes) of the smallest wire form
    /// that can represent this timestamp.
    #[must_use]
    pub fn wire_payload_len(self) -> u32 {
        if self.seconds < 0 || self.seconds >= (1_i64 << 34) {
            12
        } else if self.seconds > i64::from(u32::MAX) || self.nanoseconds > 0 {
            8
        } else {
            4
        }
    }

    /// Decode a timestamp ext payload. Only the three wire lengths are
    /// accepted, and the nanosecond field must be in range; anything
    /// else is [`Error::Invalid`].
    pub fn from_wire_payload(payload: &[u8]) -> Result<Self> {
        match payload.len() {
            4 => {
                let seconds = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Ok(Timestamp { seconds: i64::from(seconds), nanoseconds: 0 })
            }
            8 => {
                let packed = u64::from_be_bytes([
                    payload[0], payload[1], payload[2], payload[3], payload[4], payload[5],
                    payload[6], payload[7],
                ]);
                #[allow(clippy::cast_possible_truncation)]
                let nanoseconds = (packed >> 34) as u32;
                #[allow(clippy::cast_possible_wrap)]
                let seconds = (packed & ((1 << 34) - 1)) as i64;
                Timestamp::new(seconds, nanoseconds).map_err(|_| Error::Invalid)
            }
            12 => {
                let nanoseconds =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let seconds = i64::from_be_bytes([
                    payload[4], payload[5], payload[6], payload[7], payload[8], payload[9],
                    payload[10], payload[11],
                ]);
                Timestamp::new(seconds, nanoseconds).map_err(|_| Error::Invalid)
            }
            _ => Err(Error::Invalid),
        }
    }
}
