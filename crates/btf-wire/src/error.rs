use btf_types::Error;

/// Errors from the pure tag codec.
///
/// `Truncated` is a refill signal, not a verdict: a streaming caller
/// ensures `needed` bytes and retries, while a caller holding a complete
/// blob treats it as `invalid`. The conversion to the flat taxonomy via
/// [`WireError::latch`] therefore depends on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The byte prefix ends before the full tag header. `needed` is the
    /// total header length implied by the first byte.
    #[error("tag header needs {needed} bytes, only {have} available")]
    Truncated { needed: usize, have: usize },

    /// The reserved opcode 0xc1.
    #[error("reserved opcode 0xc1")]
    Reserved,

    /// An ext opcode (or an ext encode request) with extensions disabled.
    #[error("ext value with extensions disabled")]
    ExtDisabled,

    /// An ext encode request at spec level v4, which has no ext forms.
    #[error("ext value requested at spec level v4")]
    ExtAtV4,
}

impl WireError {
    /// The flat-taxonomy error this wire error latches on an instance
    /// holding a complete message. Streaming surfaces intercept
    /// `Truncated` for refill before converting.
    #[must_use]
    pub fn latch(self) -> Error {
        match self {
            WireError::Truncated { .. } | WireError::Reserved => Error::Invalid,
            WireError::ExtDisabled => Error::Unsupported,
            WireError::ExtAtV4 => Error::Bug,
        }
    }
}
