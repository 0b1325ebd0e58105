/// The flat error taxonomy shared by every BTF surface.
///
/// Each writer, reader, and tree instance holds a single error latch of
/// this type. The first failure wins: the instance transitions out of the
/// ok state exactly once, the optional error hook fires exactly once, and
/// every subsequent operation returns the latched error without side
/// effects. Errors are never cleared; only dropping the instance releases
/// its resources.
///
/// ```text
///   Error
///   ├── Io           ← source/sink failure or unexpected end mid-message
///   ├── Invalid      ← malformed wire bytes (reserved opcode, truncated blob)
///   ├── Unsupported  ← well-formed input using a disabled feature
///   ├── Type         ← requested type mismatch, failed UTF-8 check
///   ├── TooBig       ← value or message exceeds a configured bound
///   ├── Memory       ← allocation failure reported by a source or sink
///   ├── Bug          ← programmer misuse (unbalanced compounds, bad args)
///   ├── Data         ← semantic violation (duplicate map key, flagged)
///   └── Eof          ← clean end of the source between messages
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// The source or sink failed, or the stream ended mid-message.
    #[error("source or sink failure, or unexpected end of stream")]
    Io,

    /// Malformed bytes on the wire: a reserved opcode, an out-of-range
    /// timestamp, or a pre-loaded blob that ends mid-value.
    #[error("malformed bytes on the wire")]
    Invalid,

    /// The bytes are well-formed but use a feature this instance has
    /// disabled, such as an ext opcode with extensions off.
    #[error("well-formed input uses a disabled feature")]
    Unsupported,

    /// The requested type does not match the stored value, or payload
    /// bytes failed a requested UTF-8 check.
    #[error("requested type does not match the stored value")]
    Type,

    /// A value or message exceeds a configured bound: the buffer, the
    /// tree's `max_size`, or its `max_nodes`.
    #[error("value or message exceeds a configured bound")]
    TooBig,

    /// A source or sink reported an allocation failure.
    #[error("allocation failed")]
    Memory,

    /// Programmer misuse: an unbalanced compound close, a close with the
    /// wrong kind, or an invalid argument.
    #[error("API misuse")]
    Bug,

    /// A semantic violation in otherwise well-formed data, such as a
    /// missing or duplicate map key, or an error flagged by the caller.
    #[error("semantic violation in the data")]
    Data,

    /// The source ended cleanly between messages.
    #[error("clean end of input")]
    Eof,
}

/// Result alias used across the BTF crates.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Short stable name for logs and diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Error::Io => "io",
            Error::Invalid => "invalid",
            Error::Unsupported => "unsupported",
            Error::Type => "type",
            Error::TooBig => "too_big",
            Error::Memory => "memory",
            Error::Bug => "bug",
            Error::Data => "data",
            Error::Eof => "eof",
        }
    }
}
