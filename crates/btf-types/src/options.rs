/// Default internal buffer capacity for the streaming writer and reader,
/// and the initial capacity of the tree's stream buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Wire specification level.
///
/// `V4` is the legacy compatibility mode: str8 is forbidden (a string
/// too long for fixstr goes straight to str16), bin degrades to the str
/// (raw) header forms, and every ext form is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spec {
    V4,
    #[default]
    V5,
}

/// Codec-level knobs shared by the writer, reader, and tree. Values
/// should be consistent across a program for interoperable output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    /// Wire spec level. Defaults to [`Spec::V5`].
    pub spec: Spec,
    /// Whether ext values (including timestamps) are enabled. When
    /// false, ext opcodes on the wire fail with `unsupported` and the
    /// writer refuses to produce them. Defaults to false.
    pub extensions: bool,
}

impl CodecOptions {
    /// The defaults: spec v5, extensions disabled.
    #[must_use]
    pub fn new() -> Self {
        CodecOptions::default()
    }

    /// Select the wire spec level.
    #[must_use]
    pub fn spec(mut self, spec: Spec) -> Self {
        self.spec = spec;
        self
    }

    /// Enable or disable ext values.
    #[must_use]
    pub fn extensions(mut self, enabled: bool) -> Self {
        self.extensions = enabled;
        self
    }
}
