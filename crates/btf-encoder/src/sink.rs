use btf_types::Result;

/// Output capability for a flushing writer.
///
/// The writer hands over buffered bytes whenever its buffer cannot hold
/// the next emit, and once more during finish. `flush` must consume
/// every byte it is given or fail; a short write has no representation.
/// Bytes arrive in exactly the order they were produced.
///
/// `teardown` runs once, after the final flush, whether or not an error
/// was latched; use it to release whatever the sink holds.
pub trait Sink {
    /// Write all of `data` to the destination.
    ///
    /// # Errors
    ///
    /// Return [`btf_types::Error::Io`] on a destination failure or
    /// [`btf_types::Error::Memory`] if the sink cannot allocate. The
    /// error latches on the writer.
    fn flush(&mut self, data: &[u8]) -> Result<()>;

    /// Hook invoked during finish after the final flush.
    fn teardown(&mut self) {}
}

/// The simplest useful sink: append everything to a vector.
impl Sink for Vec<u8> {
    fn flush(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Sinks pass through mutable references, so a caller can keep the
/// concrete sink and inspect it after the writer finishes.
impl<S: Sink + ?Sized> Sink for &mut S {
    fn flush(&mut self, data: &[u8]) -> Result<()> {
        (**self).flush(data)
    }

    fn teardown(&mut self) {
        (**self).teardown();
    }
}
