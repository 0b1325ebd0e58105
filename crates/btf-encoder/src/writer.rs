use btf_types::{size, CodecOptions, Error, Kind, Result, Spec, Tag, Timestamp, Tracker};
use btf_wire::encode_tag;

use crate::sink::Sink;

/// Configuration for a [`Writer`].
#[derive(Default)]
pub struct WriterOptions {
    /// Codec knobs: spec level and extension gate.
    pub codec: CodecOptions,
    /// Buffer capacity. Defaults to
    /// [`btf_types::DEFAULT_BUFFER_SIZE`]; a flushing writer requires at
    /// least [`MIN_FLUSH_BUFFER`].
    pub buffer_size: Option<usize>,
}

impl WriterOptions {
    #[must_use]
    pub fn new() -> Self {
        WriterOptions::default()
    }

    #[must_use]
    pub fn codec(mut self, codec: CodecOptions) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = Some(bytes);
        self
    }
}

/// Smallest buffer a flushing writer accepts: the largest tag header
/// plus the largest fixstr payload, so any small string is emitted with
/// a single copy.
pub const MIN_FLUSH_BUFFER: usize = 32;

enum Output<'a> {
    /// No sink: the buffer is the destination and overflow is `too_big`.
    Bounded,
    /// Buffered bytes flush to a sink when the buffer cannot hold the
    /// next emit.
    Flushed(Box<dyn Sink + 'a>),
    /// Built-in growable destination: capacity doubles until the
    /// pending write fits, and the accumulated bytes are handed over by
    /// [`Writer::into_bytes`].
    Growable,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Bounded,
    Flushed,
    Growable,
}

/// Streaming tag encoder.
///
/// A writer emits one value at a time through an internal buffer,
/// running every operation through a structural tracker so that any
/// unbalanced compound is caught as [`Error::Bug`] rather than producing
/// corrupt output.
///
/// ```text
///   write_*  ──► tracker ──► wire codec ──► buffer ──► sink (optional)
/// ```
///
/// The first failing operation latches its error, invokes the error hook
/// at most once, and turns every later operation into a no-op returning
/// the same error. There is no recovery.
///
/// # Example
///
/// ```rust
/// use btf_encoder::Writer;
///
/// let mut w = Writer::growable();
/// w.start_map(2).unwrap();
/// w.write_str("a").unwrap();
/// w.write_uint(1).unwrap();
/// w.write_str("b").unwrap();
/// w.write_bool(true).unwrap();
/// w.finish_map().unwrap();
/// let bytes = w.into_bytes().unwrap();
/// assert_eq!(bytes, [0x82, 0xa1, 0x61, 0x01, 0xa1, 0x62, 0xc3]);
/// ```
pub struct Writer<'a> {
    buf: Vec<u8>,
    capacity: usize,
    output: Output<'a>,
    tracker: Tracker,
    error: Option<Error>,
    codec: CodecOptions,
    error_hook: Option<Box<dyn FnMut(Error) + 'a>>,
}

impl<'a> Writer<'a> {
    /// A writer over a growable in-memory buffer. Collect the output
    /// with [`Writer::into_bytes`].
    #[must_use]
    pub fn growable() -> Self {
        Writer::growable_with(WriterOptions::new())
    }

    /// A growable writer with explicit options. `buffer_size` is the
    /// initial capacity.
    #[must_use]
    pub fn growable_with(opts: WriterOptions) -> Self {
        let capacity = opts.buffer_size.unwrap_or(btf_types::DEFAULT_BUFFER_SIZE);
        Writer::build(capacity, Output::Growable, opts.codec)
    }

    /// A writer over a fixed-capacity buffer with no sink. An emit that
    /// cannot fit latches [`Error::TooBig`]. Collect the output with
    /// [`Writer::into_bytes`].
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Writer::bounded_with(WriterOptions::new().buffer_size(capacity))
    }

    /// A bounded writer with explicit options.
    #[must_use]
    pub fn bounded_with(opts: WriterOptions) -> Self {
        let capacity = opts.buffer_size.unwrap_or(btf_types::DEFAULT_BUFFER_SIZE);
        Writer::build(capacity, Output::Bounded, opts.codec)
    }

    /// A writer that flushes to `sink` whenever its buffer cannot hold
    /// the next emit, and once more at finish.
    ///
    /// # Panics
    ///
    /// Panics if the configured buffer is smaller than
    /// [`MIN_FLUSH_BUFFER`]: a flushing writer must be able to hold any
    /// tag header and single-copy the largest fixstr.
    #[must_use]
    pub fn to_sink(sink: impl Sink + 'a) -> Self {
        Writer::to_sink_with(sink, WriterOptions::new())
    }

    /// A flushing writer with explicit options.
    ///
    /// # Panics
    ///
    /// Panics if the configured buffer is smaller than
    /// [`MIN_FLUSH_BUFFER`].
    #[must_use]
    pub fn to_sink_with(sink: impl Sink + 'a, opts: WriterOptions) -> Self {
        let capacity = opts.buffer_size.unwrap_or(btf_types::DEFAULT_BUFFER_SIZE);
        assert!(
            capacity >= MIN_FLUSH_BUFFER,
            "flushing writer buffer must hold at least {MIN_FLUSH_BUFFER} bytes"
        );
        Writer::build(capacity, Output::Flushed(Box::new(sink)), opts.codec)
    }

    fn build(capacity: usize, output: Output<'a>, codec: CodecOptions) -> Self {
        Writer {
            buf: Vec::with_capacity(capacity),
            capacity,
            output,
            tracker: Tracker::new(),
            error: None,
            codec,
            error_hook: None,
        }
    }

    /// Install a hook invoked exactly once, when the first error
    /// latches.
    pub fn set_error_hook(&mut self, hook: impl FnMut(Error) + 'a) {
        self.error_hook = Some(Box::new(hook));
    }

    /// The latched error, if any.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// Latch an error explicitly. The usual use is [`Error::Data`] to
    /// abandon a document mid-write without tripping the structural
    /// check at finish.
    pub fn flag_error(&mut self, error: Error) {
        self.latch(error);
    }

    /// Bytes currently buffered and not yet flushed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    // ── Scalar writes ─────────────────────────────────────────────────

    pub fn write_nil(&mut self) -> Result<()> {
        self.write_scalar(Tag::Nil)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_scalar(Tag::Bool(value))
    }

    /// Write a signed integer in its minimal wire form; non-negative
    /// values take the unsigned forms.
    pub fn write_int(&mut self, value: i64) -> Result<()> {
        self.write_scalar(Tag::Int(value))
    }

    /// Write an unsigned integer in its minimal wire form.
    pub fn write_uint(&mut self, value: u64) -> Result<()> {
        self.write_scalar(Tag::Uint(value))
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_uint(u64::from(value))
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_uint(u64::from(value))
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_uint(u64::from(value))
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_uint(value)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_int(i64::from(value))
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_int(i64::from(value))
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_int(i64::from(value))
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_int(value)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_scalar(Tag::F32(value))
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_scalar(Tag::F64(value))
    }

    /// Write a timestamp as an ext value of type −1 in its smallest wire
    /// form (4, 8, or 12-byte payload).
    ///
    /// Requires extensions enabled and spec v5; at v4 this is
    /// [`Error::Bug`], matching the absence of timestamps from that spec
    /// level.
    pub fn write_timestamp(&mut self, ts: Timestamp) -> Result<()> {
        self.guard()?;
        if self.codec.spec == Spec::V4 {
            return Err(self.latch(Error::Bug));
        }
        if !self.codec.extensions {
            return Err(self.latch(Error::Unsupported));
        }
        self.track(Tracker::element)?;
        let payload_len = ts.wire_payload_len();
        self.emit_tag(&Tag::Ext {
            ext_type: btf_types::TIMESTAMP_EXT_TYPE,
            len: payload_len,
        })?;
        match payload_len {
            4 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let seconds = ts.seconds() as u32;
                self.append(&seconds.to_be_bytes())
            }
            8 => {
                #[allow(clippy::cast_sign_loss)]
                let packed = (u64::from(ts.nanoseconds()) << 34) | ts.seconds() as u64;
                self.append(&packed.to_be_bytes())
            }
            _ => {
                self.append(&ts.nanoseconds().to_be_bytes())?;
                self.append(&ts.seconds().to_be_bytes())
            }
        }
    }

    // ── Payload-carrying writes ───────────────────────────────────────

    /// Write a complete string: header plus payload in one call.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.guard()?;
        let len = self.check_len(value.len())?;
        self.track(Tracker::element)?;
        self.emit_tag(&Tag::Str(len))?;
        self.append(value.as_bytes())
    }

    /// Write a complete binary blob: header plus payload in one call.
    pub fn write_bin(&mut self, value: &[u8]) -> Result<()> {
        self.guard()?;
        let len = self.check_len(value.len())?;
        self.track(Tracker::element)?;
        self.emit_tag(&Tag::Bin(len))?;
        self.append(value)
    }

    /// Write a complete ext value: header plus payload in one call.
    pub fn write_ext(&mut self, ext_type: i8, value: &[u8]) -> Result<()> {
        self.guard()?;
        let len = self.check_len(value.len())?;
        self.track(Tracker::element)?;
        self.emit_tag(&Tag::Ext { ext_type, len })?;
        self.append(value)
    }

    /// Append a pre-encoded complete value as a single element. The
    /// bytes must themselves be one well-formed value; no validation is
    /// performed here.
    pub fn write_encoded(&mut self, data: &[u8]) -> Result<()> {
        self.guard()?;
        self.track(Tracker::element)?;
        self.append(data)
    }

    /// Write any tag. Compound tags open their compound exactly as the
    /// corresponding `start_*` call would.
    pub fn write_tag(&mut self, tag: &Tag) -> Result<()> {
        match *tag {
            Tag::Array(count) => self.start_array(count),
            Tag::Map(count) => self.start_map(count),
            Tag::Str(len) => self.start_str(len),
            Tag::Bin(len) => self.start_bin(len),
            Tag::Ext { ext_type, len } => self.start_ext(ext_type, len),
            scalar => self.write_scalar(scalar),
        }
    }

    // ── Compound lifecycle ────────────────────────────────────────────

    /// Open an array of exactly `count` elements. Close with
    /// [`Writer::finish_array`] after writing each element.
    pub fn start_array(&mut self, count: u32) -> Result<()> {
        self.open(Tag::Array(count), Kind::Array, u64::from(count))
    }

    /// Open a map of exactly `count` key/value pairs. Close with
    /// [`Writer::finish_map`].
    pub fn start_map(&mut self, count: u32) -> Result<()> {
        self.open(Tag::Map(count), Kind::Map, u64::from(count))
    }

    /// Open a string of exactly `len` payload bytes, to be fed with
    /// [`Writer::write_bytes`] and closed with [`Writer::finish_str`].
    pub fn start_str(&mut self, len: u32) -> Result<()> {
        self.open(Tag::Str(len), Kind::Str, u64::from(len))
    }

    /// Open a binary blob of exactly `len` payload bytes.
    pub fn start_bin(&mut self, len: u32) -> Result<()> {
        self.open(Tag::Bin(len), Kind::Bin, u64::from(len))
    }

    /// Open an ext value of exactly `len` payload bytes.
    pub fn start_ext(&mut self, ext_type: i8, len: u32) -> Result<()> {
        self.open(Tag::Ext { ext_type, len }, Kind::Ext, u64::from(len))
    }

    /// Feed payload bytes to the open str, bin, or ext.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.guard()?;
        self.track(|t| t.bytes(data.len() as u64))?;
        self.append(data)
    }

    pub fn finish_array(&mut self) -> Result<()> {
        self.close(Kind::Array)
    }

    pub fn finish_map(&mut self) -> Result<()> {
        self.close(Kind::Map)
    }

    pub fn finish_str(&mut self) -> Result<()> {
        self.close(Kind::Str)
    }

    pub fn finish_bin(&mut self) -> Result<()> {
        self.close(Kind::Bin)
    }

    pub fn finish_ext(&mut self) -> Result<()> {
        self.close(Kind::Ext)
    }

    // ── Finish ────────────────────────────────────────────────────────

    /// Finish the writer: verify structural balance, flush what remains,
    /// run the sink's teardown, and report the first latched error.
    pub fn finish(mut self) -> Result<()> {
        self.finish_inner()
    }

    /// Finish a growable or bounded writer and take its accumulated
    /// output. Calling this on a flushing writer is [`Error::Bug`]; the
    /// bytes went to the sink.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        if matches!(self.output, Output::Flushed(_)) {
            self.latch(Error::Bug);
        }
        self.finish_inner()?;
        Ok(core::mem::take(&mut self.buf))
    }

    fn finish_inner(&mut self) -> Result<()> {
        if self.error.is_none() {
            if let Err(e) = self.tracker.check_empty() {
                self.latch(e);
            }
        }
        if self.error.is_none() {
            let _ = self.flush_buffer();
        }
        // Teardown runs after the final flush even when an error is
        // latched, so the sink can release what it holds.
        if let Output::Flushed(sink) = &mut self.output {
            sink.teardown();
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn write_scalar(&mut self, tag: Tag) -> Result<()> {
        self.guard()?;
        self.track(Tracker::element)?;
        self.emit_tag(&tag)
    }

    fn open(&mut self, tag: Tag, kind: Kind, count: u64) -> Result<()> {
        self.guard()?;
        self.track(Tracker::element)?;
        self.emit_tag(&tag)?;
        self.track(|t| t.push(kind, count))
    }

    fn close(&mut self, kind: Kind) -> Result<()> {
        self.guard()?;
        self.track(|t| t.pop(kind))
    }

    fn guard(&self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn track(&mut self, op: impl FnOnce(&mut Tracker) -> Result<()>) -> Result<()> {
        if let Err(e) = op(&mut self.tracker) {
            return Err(self.latch(e));
        }
        Ok(())
    }

    fn check_len(&mut self, len: usize) -> Result<u32> {
        match u32::try_from(len) {
            Ok(n) => Ok(n),
            Err(_) => Err(self.latch(Error::TooBig)),
        }
    }

    fn emit_tag(&mut self, tag: &Tag) -> Result<()> {
        let mut header = [0u8; size::MAX_TAG];
        let n = match encode_tag(tag, self.codec, &mut header) {
            Ok(n) => n,
            Err(e) => return Err(self.latch(e.latch())),
        };
        self.reserve(n)?;
        self.buf.extend_from_slice(&header[..n]);
        Ok(())
    }

    fn mode(&self) -> OutputMode {
        match self.output {
            Output::Bounded => OutputMode::Bounded,
            Output::Flushed(_) => OutputMode::Flushed,
            Output::Growable => OutputMode::Growable,
        }
    }

    /// Make room for `n` more bytes, flushing or growing as the output
    /// mode allows. `n` never exceeds the tag size here; raw runs go
    /// through [`Writer::append`].
    fn reserve(&mut self, n: usize) -> Result<()> {
        if self.capacity - self.buf.len() >= n {
            return Ok(());
        }
        match self.mode() {
            OutputMode::Bounded => Err(self.latch(Error::TooBig)),
            OutputMode::Growable => {
                self.grow(n);
                Ok(())
            }
            OutputMode::Flushed => {
                self.flush_buffer()?;
                if self.capacity < n {
                    return Err(self.latch(Error::TooBig));
                }
                Ok(())
            }
        }
    }

    fn grow(&mut self, n: usize) {
        let mut new_capacity = self.capacity.max(1);
        while new_capacity - self.buf.len() < n {
            new_capacity *= 2;
        }
        tracing::trace!(from = self.capacity, to = new_capacity, "growing writer buffer");
        self.buf.reserve(new_capacity - self.buf.len());
        self.capacity = new_capacity;
    }

    fn flush_buffer(&mut self) -> Result<()> {
        let Output::Flushed(sink) = &mut self.output else {
            return Ok(());
        };
        if self.buf.is_empty() {
            return Ok(());
        }
        tracing::trace!(bytes = self.buf.len(), "flushing writer buffer");
        if let Err(e) = sink.flush(&self.buf) {
            return Err(self.latch(e));
        }
        self.buf.clear();
        Ok(())
    }

    /// Append a raw byte run, straddling the buffer boundary through the
    /// sink when one is installed. Runs at least as large as the buffer
    /// bypass it and go to the sink directly.
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.guard()?;
        if self.capacity - self.buf.len() >= data.len() {
            self.buf.extend_from_slice(data);
            return Ok(());
        }
        match self.mode() {
            OutputMode::Bounded => Err(self.latch(Error::TooBig)),
            OutputMode::Growable => {
                self.grow(data.len());
                self.buf.extend_from_slice(data);
                Ok(())
            }
            OutputMode::Flushed => {
                self.flush_buffer()?;
                if data.len() >= self.capacity {
                    tracing::trace!(bytes = data.len(), "flushing large run directly");
                    return self.flush_direct(data);
                }
                self.buf.extend_from_slice(data);
                Ok(())
            }
        }
    }

    fn flush_direct(&mut self, data: &[u8]) -> Result<()> {
        let result = match &mut self.output {
            Output::Flushed(sink) => sink.flush(data),
            _ => unreachable!("output mode checked by the caller"),
        };
        if let Err(e) = result {
            return Err(self.latch(e));
        }
        Ok(())
    }

    fn latch(&mut self, error: Error) -> Error {
        if self.error.is_none() {
            self.error = Some(error);
            if error == Error::Bug {
                tracing::error!(error = error.name(), "writer misuse");
            }
            if let Some(hook) = &mut self.error_hook {
                hook(error);
            }
        }
        self.error.unwrap_or(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn growable() -> Writer<'static> {
        Writer::growable()
    }

    // ── Scalar encoding through the writer ────────────────────────────

    #[test]
    fn nil_writes_c0() {
        let mut w = growable();
        w.write_nil().unwrap();
        assert_eq!(w.into_bytes().unwrap(), [0xc0]);
    }

    #[test]
    fn integers_use_minimal_forms() {
        let mut w = growable();
        w.start_array(3).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(200).unwrap();
        w.write_uint(70000).unwrap();
        w.finish_array().unwrap();
        assert_eq!(
            w.into_bytes().unwrap(),
            [0x93, 0x01, 0xcc, 0xc8, 0xce, 0x00, 0x01, 0x11, 0x70]
        );
    }

    #[test]
    fn width_conveniences_funnel_to_minimal() {
        let mut w = growable();
        w.write_u64(1).unwrap();
        assert_eq!(w.into_bytes().unwrap(), [0x01]);
    }

    #[test]
    fn scenario_array_with_float() {
        let mut w = growable();
        w.start_array(3).unwrap();
        w.write_nil().unwrap();
        w.write_int(-1).unwrap();
        w.write_f64(1.5).unwrap();
        w.finish_array().unwrap();
        assert_eq!(
            w.into_bytes().unwrap(),
            [0x93, 0xc0, 0xff, 0xcb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn scenario_small_map() {
        let mut w = growable();
        w.start_map(2).unwrap();
        w.write_str("a").unwrap();
        w.write_uint(1).unwrap();
        w.write_str("b").unwrap();
        w.write_bool(true).unwrap();
        w.finish_map().unwrap();
        assert_eq!(
            w.into_bytes().unwrap(),
            [0x82, 0xa1, 0x61, 0x01, 0xa1, 0x62, 0xc3]
        );
    }

    #[test]
    fn str_hello() {
        let mut w = growable();
        w.write_str("hello").unwrap();
        assert_eq!(
            w.into_bytes().unwrap(),
            [0xa5, 0x68, 0x65, 0x6c, 0x6c, 0x6f]
        );
    }

    #[test]
    fn chunked_str_payload() {
        let mut w = growable();
        w.start_str(5).unwrap();
        w.write_bytes(b"he").unwrap();
        w.write_bytes(b"llo").unwrap();
        w.finish_str().unwrap();
        assert_eq!(
            w.into_bytes().unwrap(),
            [0xa5, 0x68, 0x65, 0x6c, 0x6c, 0x6f]
        );
    }

    #[test]
    fn v4_forty_byte_string_uses_str16() {
        let opts = WriterOptions::new().codec(CodecOptions::new().spec(Spec::V4));
        let mut w = Writer::growable_with(opts);
        let s = "x".repeat(40);
        w.write_str(&s).unwrap();
        let bytes = w.into_bytes().unwrap();
        assert_eq!(&bytes[..3], &[0xda, 0x00, 0x28]);

        let mut w = growable();
        let s = "x".repeat(40);
        w.write_str(&s).unwrap();
        let bytes = w.into_bytes().unwrap();
        assert_eq!(&bytes[..2], &[0xd9, 0x28]);
    }

    #[test]
    fn timestamps_pick_smallest_form() {
        let opts = WriterOptions::new().codec(CodecOptions::new().extensions(true));

        let mut w = Writer::growable_with(opts);
        w.write_timestamp(Timestamp::new(1, 0).unwrap()).unwrap();
        assert_eq!(w.into_bytes().unwrap(), [0xd6, 0xff, 0, 0, 0, 1]);

        let opts = WriterOptions::new().codec(CodecOptions::new().extensions(true));
        let mut w = Writer::growable_with(opts);
        w.write_timestamp(Timestamp::new(1, 1).unwrap()).unwrap();
        // nanos=1 << 34 | seconds=1
        assert_eq!(
            w.into_bytes().unwrap(),
            [0xd7, 0xff, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01]
        );

        let opts = WriterOptions::new().codec(CodecOptions::new().extensions(true));
        let mut w = Writer::growable_with(opts);
        w.write_timestamp(Timestamp::new(-1, 0).unwrap()).unwrap();
        assert_eq!(
            w.into_bytes().unwrap(),
            [0xc7, 12, 0xff, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn timestamp_without_extensions_is_unsupported() {
        let mut w = growable();
        assert_eq!(
            w.write_timestamp(Timestamp::new(0, 0).unwrap()),
            Err(Error::Unsupported)
        );
    }

    #[test]
    fn timestamp_at_v4_is_a_bug() {
        let opts =
            WriterOptions::new().codec(CodecOptions::new().spec(Spec::V4).extensions(true));
        let mut w = Writer::growable_with(opts);
        assert_eq!(
            w.write_timestamp(Timestamp::new(0, 0).unwrap()),
            Err(Error::Bug)
        );
    }

    // ── Structural balance ────────────────────────────────────────────

    #[test]
    fn unbalanced_finish_is_a_bug() {
        let mut w = growable();
        w.start_array(1).unwrap();
        w.write_nil().unwrap();
        assert_eq!(w.finish(), Err(Error::Bug));
    }

    #[test]
    fn wrong_close_kind_is_a_bug() {
        let mut w = growable();
        w.start_array(0).unwrap();
        assert_eq!(w.finish_map(), Err(Error::Bug));
    }

    #[test]
    fn excess_element_is_a_bug() {
        let mut w = growable();
        w.start_array(1).unwrap();
        w.write_nil().unwrap();
        assert_eq!(w.write_nil(), Err(Error::Bug));
    }

    #[test]
    fn short_byte_payload_blocks_close() {
        let mut w = growable();
        w.start_bin(4).unwrap();
        w.write_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(w.finish_bin(), Err(Error::Bug));
    }

    #[test]
    fn balanced_document_finishes_ok() {
        let mut w = growable();
        w.start_map(1).unwrap();
        w.write_str("k").unwrap();
        w.start_array(2).unwrap();
        w.write_int(1).unwrap();
        w.write_int(2).unwrap();
        w.finish_array().unwrap();
        w.finish_map().unwrap();
        w.finish().unwrap();
    }

    // ── Output modes ──────────────────────────────────────────────────

    #[test]
    fn bounded_overflow_latches_too_big() {
        let mut w = Writer::bounded(4);
        w.write_uint(1).unwrap();
        assert_eq!(w.write_str("hello world"), Err(Error::TooBig));
        assert_eq!(w.error(), Some(Error::TooBig));
    }

    #[test]
    fn sink_receives_bytes_in_order() {
        let mut out = Vec::new();
        {
            let mut w = Writer::to_sink_with(
                &mut out,
                WriterOptions::new().buffer_size(MIN_FLUSH_BUFFER),
            );
            for i in 0..100_u64 {
                w.write_uint(i).unwrap();
            }
            w.finish().unwrap();
        }
        // 0..=127 all encode as single-byte fixints.
        assert_eq!(out.len(), 100);
        assert_eq!(out[0], 0);
        assert_eq!(out[99], 99);
    }

    #[test]
    fn large_run_bypasses_small_buffer() {
        let mut out = Vec::new();
        {
            let mut w = Writer::to_sink_with(
                &mut out,
                WriterOptions::new().buffer_size(MIN_FLUSH_BUFFER),
            );
            let payload = vec![0xabu8; 500];
            w.write_bin(&payload).unwrap();
            w.finish().unwrap();
        }
        assert_eq!(out.len(), 3 + 500); // bin16 header + payload
        assert_eq!(&out[..3], &[0xc5, 0x01, 0xf4]);
        assert!(out[3..].iter().all(|&b| b == 0xab));
    }

    #[test]
    fn growable_starts_tiny_and_doubles() {
        let opts = WriterOptions::new().buffer_size(1);
        let mut w = Writer::growable_with(opts);
        w.write_str("a longer string that will not fit in one byte")
            .unwrap();
        let bytes = w.into_bytes().unwrap();
        assert_eq!(bytes[0], 0xd9);
    }

    #[test]
    fn into_bytes_on_sink_writer_is_a_bug() {
        let w = Writer::to_sink(Vec::new());
        assert_eq!(w.into_bytes().unwrap_err(), Error::Bug);
    }

    // ── Error latch ───────────────────────────────────────────────────

    #[test]
    fn error_hook_fires_exactly_once() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let fired_in_hook = fired.clone();
        let mut w = Writer::bounded(2);
        w.set_error_hook(move |e| fired_in_hook.borrow_mut().push(e));
        assert_eq!(w.write_str("too big for two bytes"), Err(Error::TooBig));
        assert_eq!(w.write_nil(), Err(Error::TooBig));
        assert_eq!(w.write_uint(1), Err(Error::TooBig));
        assert_eq!(*fired.borrow(), vec![Error::TooBig]);
    }

    #[test]
    fn latched_error_pins_all_operations() {
        let mut w = growable();
        w.flag_error(Error::Data);
        assert_eq!(w.write_nil(), Err(Error::Data));
        assert_eq!(w.start_array(1), Err(Error::Data));
        assert_eq!(w.error(), Some(Error::Data));
        // The explicit latch suppresses the structural check at finish.
        assert_eq!(w.finish(), Err(Error::Data));
    }

    #[test]
    fn teardown_runs_after_final_flush() {
        struct Recording {
            out: Rc<RefCell<(Vec<u8>, bool)>>,
        }
        impl Sink for Recording {
            fn flush(&mut self, data: &[u8]) -> Result<()> {
                let mut state = self.out.borrow_mut();
                assert!(!state.1, "flush after teardown");
                state.0.extend_from_slice(data);
                Ok(())
            }
            fn teardown(&mut self) {
                self.out.borrow_mut().1 = true;
            }
        }

        let state = Rc::new(RefCell::new((Vec::new(), false)));
        let sink = Recording { out: state.clone() };
        let mut w = Writer::to_sink(sink);
        w.write_str("hello").unwrap();
        w.finish().unwrap();
        let state = state.borrow();
        assert_eq!(state.0, [0xa5, 0x68, 0x65, 0x6c, 0x6c, 0x6f]);
        assert!(state.1);
    }

    #[test]
    fn failing_sink_latches_io() {
        struct Failing;
        impl Sink for Failing {
            fn flush(&mut self, _data: &[u8]) -> Result<()> {
                Err(Error::Io)
            }
        }

        let mut w = Writer::to_sink_with(
            Failing,
            WriterOptions::new().buffer_size(MIN_FLUSH_BUFFER),
        );
        let mut result = Ok(());
        for _ in 0..MIN_FLUSH_BUFFER + 1 {
            result = w.write_uint(1);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(Error::Io));
        assert_eq!(w.finish(), Err(Error::Io));
    }
}
