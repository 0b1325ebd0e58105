use btf_types::Result;

/// Input capability for a streaming reader.
///
/// The reader pulls bytes on demand: `fill` is handed the writable tail
/// of the internal buffer (or, for large reads, the caller's destination
/// directly) and returns how many bytes it produced.
///
/// The blocking contract: return at least one byte, or an error.
/// Returning `Ok(0)` is treated as an I/O failure by the reader. A
/// source that reaches a clean end of stream between messages returns
/// [`btf_types::Error::Eof`], which the reader latches as `eof` rather
/// than `io`.
pub trait Source {
    /// Produce at least one byte into `dst`, returning the count.
    ///
    /// # Errors
    ///
    /// [`btf_types::Error::Io`] (or any other kind) on failure;
    /// [`btf_types::Error::Eof`] at a clean end of stream.
    fn fill(&mut self, dst: &mut [u8]) -> Result<usize>;

    /// Skip `count` bytes without producing them, for seekable sources.
    ///
    /// Return `Ok(true)` after skipping all `count` bytes, or
    /// `Ok(false)` if this source cannot seek, in which case the reader
    /// falls back to filling and discarding. The default cannot seek.
    ///
    /// # Errors
    ///
    /// As for [`Source::fill`].
    fn try_skip(&mut self, count: usize) -> Result<bool> {
        let _ = count;
        Ok(false)
    }

    /// Hook invoked when the reader finishes.
    fn teardown(&mut self) {}
}

/// Sources pass through mutable references, so a caller can keep the
/// concrete source and inspect it after the reader finishes.
impl<S: Source + ?Sized> Source for &mut S {
    fn fill(&mut self, dst: &mut [u8]) -> Result<usize> {
        (**self).fill(dst)
    }

    fn try_skip(&mut self, count: usize) -> Result<bool> {
        (**self).try_skip(count)
    }

    fn teardown(&mut self) {
        (**self).teardown();
    }
}
