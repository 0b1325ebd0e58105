use btf_types::{size, CodecOptions, Error, Kind, Result, Tag, Timestamp, Tracker};
use btf_wire::{header_size, parse_tag};

use crate::source::Source;

/// When a straddling read needs no more than `capacity / 32` further
/// bytes, the reader refills its buffer and copies out rather than
/// reading into the destination directly.
const READ_FRACTION: usize = 32;

/// A skip larger than `capacity / 16` beyond the buffered residue is
/// delegated to the source's seek; anything smaller is cheaper to fill
/// and drop.
const SKIP_FRACTION: usize = 16;

/// Configuration for a [`Reader`].
#[derive(Default)]
pub struct ReaderOptions {
    /// Codec knobs: spec level and extension gate.
    pub codec: CodecOptions,
    /// Stream-mode buffer capacity. Defaults to
    /// [`btf_types::DEFAULT_BUFFER_SIZE`]; must be at least
    /// [`btf_types::size::MAX_TAG`].
    pub buffer_size: Option<usize>,
}

impl ReaderOptions {
    #[must_use]
    pub fn new() -> Self {
        ReaderOptions::default()
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

struct StreamInput<'a> {
    source: Box<dyn Source + 'a>,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
}

impl StreamInput<'_> {
    fn available(&self) -> usize {
        self.end - self.pos
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Move the unread residue to the buffer start to maximize fillable
    /// space.
    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.copy_within(self.pos..self.end, 0);
            self.end -= self.pos;
            self.pos = 0;
        }
    }

    /// One fill call into the buffer tail. `Ok(0)` from the source is an
    /// I/O failure under the blocking contract; a count larger than the
    /// space offered means the source is broken.
    fn fill_some(&mut self) -> Result<usize> {
        let space = self.buf.len() - self.end;
        match self.source.fill(&mut self.buf[self.end..]) {
            Ok(0) => Err(Error::Io),
            Ok(n) if n <= space => {
                tracing::trace!(bytes = n, "filled reader buffer");
                self.end += n;
                Ok(n)
            }
            Ok(_) => Err(Error::Io),
            Err(e) => Err(e),
        }
    }

    fn ensure(&mut self, n: usize) -> Result<()> {
        if self.available() >= n {
            return Ok(());
        }
        if n > self.capacity() {
            return Err(Error::TooBig);
        }
        self.compact();
        while self.available() < n {
            self.fill_some()?;
        }
        Ok(())
    }

    /// Fill the caller's destination directly, exactly to its length.
    fn fill_exact_into(&mut self, dst: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < dst.len() {
            let space = dst.len() - done;
            match self.source.fill(&mut dst[done..]) {
                Ok(0) => return Err(Error::Io),
                Ok(n) if n <= space => done += n,
                Ok(_) => return Err(Error::Io),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

enum Input<'a> {
    /// A pre-loaded blob assumed to hold complete messages; running out
    /// of bytes mid-value is `invalid`, not `io`.
    Slice { data: &'a [u8], pos: usize },
    Stream(StreamInput<'a>),
}

impl Input<'_> {
    fn available(&self) -> usize {
        match self {
            Input::Slice { data, pos } => data.len() - pos,
            Input::Stream(s) => s.available(),
        }
    }

    fn window(&self) -> &[u8] {
        match self {
            Input::Slice { data, pos } => &data[*pos..],
            Input::Stream(s) => &s.buf[s.pos..s.end],
        }
    }

    fn consume(&mut self, n: usize) {
        match self {
            Input::Slice { pos, .. } => *pos += n,
            Input::Stream(s) => s.pos += n,
        }
    }

    fn ensure(&mut self, n: usize) -> Result<()> {
        match self {
            Input::Slice { data, pos } => {
                if data.len() - *pos >= n {
                    Ok(())
                } else {
                    Err(Error::Invalid)
                }
            }
            Input::Stream(s) => s.ensure(n),
        }
    }

    /// Take `n` bytes out of the window. Callers must have ensured them.
    fn take(&mut self, n: usize) -> &[u8] {
        match self {
            Input::Slice { data, pos } => {
                let bytes = &data[*pos..*pos + n];
                *pos += n;
                bytes
            }
            Input::Stream(s) => {
                let bytes = &s.buf[s.pos..s.pos + n];
                s.pos += n;
                bytes
            }
        }
    }

    fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        match self {
            Input::Slice { data, pos } => {
                if data.len() - *pos < dst.len() {
                    return Err(Error::Invalid);
                }
                dst.copy_from_slice(&data[*pos..*pos + dst.len()]);
                *pos += dst.len();
                Ok(())
            }
            Input::Stream(s) => {
                let have = s.available().min(dst.len());
                dst[..have].copy_from_slice(&s.buf[s.pos..s.pos + have]);
                s.pos += have;
                let rest = dst.len() - have;
                if rest == 0 {
                    return Ok(());
                }
                tracing::trace!(rest, "read straddles the buffer boundary");
                s.pos = 0;
                s.end = 0;
                if rest <= s.capacity() / READ_FRACTION {
                    // Small remainder: refill the buffer and copy out,
                    // keeping the surplus for subsequent reads.
                    s.ensure(rest)?;
                    dst[have..].copy_from_slice(&s.buf[..rest]);
                    s.pos = rest;
                    Ok(())
                } else {
                    s.fill_exact_into(&mut dst[have..])
                }
            }
        }
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        match self {
            Input::Slice { data, pos } => {
                if data.len() - *pos < n {
                    return Err(Error::Invalid);
                }
                *pos += n;
                Ok(())
            }
            Input::Stream(s) => {
                if s.available() >= n {
                    s.pos += n;
                    return Ok(());
                }
                let mut rest = n - s.available();
                s.pos = 0;
                s.end = 0;
                if rest > s.capacity() / SKIP_FRACTION && s.source.try_skip(rest)? {
                    tracing::trace!(bytes = rest, "source seeked past payload");
                    return Ok(());
                }
                while rest > 0 {
                    let got = s.fill_some()?;
                    if got >= rest {
                        s.pos = rest;
                        return Ok(());
                    }
                    rest -= got;
                    s.end = 0;
                }
                Ok(())
            }
        }
    }
}

/// Streaming tag reader: a cursor over a lazy sequence of tags.
///
/// A reader parses one value at a time from a pre-loaded byte slice or
/// a pull-fill [`Source`], mirroring the writer: every tag read runs
/// through the structural tracker, so payloads must be consumed and
/// compounds closed in balance.
///
/// ```text
///   source ──► buffer ──► wire codec ──► tags
///                 │
///                 └─ in-place payload slices (valid until the next read)
/// ```
///
/// The first failure latches its error, invokes the error hook at most
/// once, and pins the cursor: every later operation returns the same
/// error without consuming input. There is no recovery.
///
/// # Example
///
/// ```rust
/// use btf_decoder::Reader;
/// use btf_types::Tag;
///
/// let mut r = Reader::from_slice(&[0x92, 0x01, 0xc3]);
/// assert_eq!(r.read_tag().unwrap(), Tag::Array(2));
/// assert_eq!(r.read_tag().unwrap(), Tag::Uint(1));
/// assert_eq!(r.read_tag().unwrap(), Tag::Bool(true));
/// r.finish_array().unwrap();
/// r.finish().unwrap();
/// ```
pub struct Reader<'a> {
    input: Input<'a>,
    tracker: Tracker,
    error: Option<Error>,
    codec: CodecOptions,
    error_hook: Option<Box<dyn FnMut(Error) + 'a>>,
}

impl<'a> Reader<'a> {
    /// A reader over a complete in-memory message. Truncation is
    /// `invalid` rather than `io`: the blob was supposed to be whole.
    #[must_use]
    pub fn from_slice(data: &'a [u8]) -> Self {
        Reader::from_slice_with(data, ReaderOptions::new())
    }

    /// A slice reader with explicit options.
    #[must_use]
    pub fn from_slice_with(data: &'a [u8], opts: ReaderOptions) -> Self {
        Reader {
            input: Input::Slice { data, pos: 0 },
            tracker: Tracker::new(),
            error: None,
            codec: opts.codec,
            error_hook: None,
        }
    }

    /// A reader that pulls from `source` through an internal buffer.
    ///
    /// # Panics
    ///
    /// Panics if the configured buffer cannot hold the largest tag
    /// header ([`btf_types::size::MAX_TAG`] bytes).
    #[must_use]
    pub fn from_source(source: impl Source + 'a) -> Self {
        Reader::from_source_with(source, ReaderOptions::new())
    }

    /// A streaming reader with explicit options.
    ///
    /// # Panics
    ///
    /// Panics if the configured buffer cannot hold the largest tag
    /// header.
    #[must_use]
    pub fn from_source_with(source: impl Source + 'a, opts: ReaderOptions) -> Self {
        let capacity = opts.buffer_size.unwrap_or(btf_types::DEFAULT_BUFFER_SIZE);
        assert!(
            capacity >= size::MAX_TAG,
            "reader buffer must hold at least {} bytes",
            size::MAX_TAG
        );
        Reader {
            input: Input::Stream(StreamInput {
                source: Box::new(source),
                buf: vec![0; capacity],
                pos: 0,
                end: 0,
            }),
            tracker: Tracker::new(),
            error: None,
            codec: opts.codec,
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

    /// Latch an error explicitly, e.g. [`Error::Data`] when the
    /// application rejects a value mid-document.
    pub fn flag_error(&mut self, error: Error) {
        self.latch(error);
    }

    /// Unread bytes currently available without consulting the source.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.input.available()
    }

    // ── Tags ──────────────────────────────────────────────────────────

    /// Read the next tag, advancing the cursor past its header and
    /// updating structural tracking: compounds are pushed and must be
    /// closed with the matching `finish_*` once their declared contents
    /// are consumed.
    pub fn read_tag(&mut self) -> Result<Tag> {
        self.guard()?;
        let (tag, consumed) = self.parse_next()?;
        self.input.consume(consumed);
        self.track(Tracker::element)?;
        match tag {
            Tag::Array(n) => self.track(|t| t.push(Kind::Array, u64::from(n)))?,
            Tag::Map(n) => self.track(|t| t.push(Kind::Map, u64::from(n)))?,
            Tag::Str(n) => self.track(|t| t.push(Kind::Str, u64::from(n)))?,
            Tag::Bin(n) => self.track(|t| t.push(Kind::Bin, u64::from(n)))?,
            Tag::Ext { len, .. } => self.track(|t| t.push(Kind::Ext, u64::from(len)))?,
            _ => {}
        }
        Ok(tag)
    }

    /// Parse the next tag without advancing the cursor or consuming an
    /// element position. The lookahead stays buffered.
    pub fn peek_tag(&mut self) -> Result<Tag> {
        self.guard()?;
        let (tag, _) = self.parse_next()?;
        self.track(Tracker::peek_element)?;
        Ok(tag)
    }

    fn parse_next(&mut self) -> Result<(Tag, usize)> {
        if let Err(e) = self.input.ensure(1) {
            return Err(self.latch(e));
        }
        let needed = header_size(self.input.window()[0]);
        if let Err(e) = self.input.ensure(needed) {
            return Err(self.latch(e));
        }
        match parse_tag(self.input.window(), self.codec) {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(self.latch(e.latch())),
        }
    }

    // ── Payload bytes ─────────────────────────────────────────────────

    /// Copy payload bytes of the open str/bin/ext into `dst`.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.guard()?;
        self.track(|t| t.bytes(dst.len() as u64))?;
        if let Err(e) = self.input.read_exact(dst) {
            return Err(self.latch(e));
        }
        Ok(())
    }

    /// Read `len` payload bytes of the open str/bin/ext into a fresh
    /// vector.
    pub fn read_bytes_alloc(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_bytes(&mut out)?;
        Ok(out)
    }

    /// Borrow `len` payload bytes in place. The slice points into the
    /// reader's buffer and is valid until the next operation; in stream
    /// mode `len` must fit the buffer or the reader latches `too_big`.
    pub fn read_bytes_in_place(&mut self, len: usize) -> Result<&[u8]> {
        self.guard()?;
        self.track(|t| t.bytes(len as u64))?;
        if let Err(e) = self.input.ensure(len) {
            return Err(self.latch(e));
        }
        Ok(self.input.take(len))
    }

    /// [`Reader::read_bytes_in_place`] plus UTF-8 validation; a
    /// malformed payload latches `type`.
    pub fn read_utf8_in_place(&mut self, len: usize) -> Result<&str> {
        self.guard()?;
        self.track(|t| t.bytes(len as u64))?;
        if let Err(e) = self.input.ensure(len) {
            return Err(self.latch(e));
        }
        if core::str::from_utf8(&self.input.window()[..len]).is_err() {
            return Err(self.latch(Error::Type));
        }
        core::str::from_utf8(self.input.take(len)).map_err(|_| Error::Type)
    }

    /// [`Reader::read_utf8_in_place`] additionally rejecting embedded
    /// NUL bytes, for payloads destined to be C strings.
    pub fn read_utf8_no_nul_in_place(&mut self, len: usize) -> Result<&str> {
        self.guard()?;
        self.track(|t| t.bytes(len as u64))?;
        if let Err(e) = self.input.ensure(len) {
            return Err(self.latch(e));
        }
        let window = &self.input.window()[..len];
        if window.contains(&0) || core::str::from_utf8(window).is_err() {
            return Err(self.latch(Error::Type));
        }
        core::str::from_utf8(self.input.take(len)).map_err(|_| Error::Type)
    }

    /// Read and validate `len` payload bytes into an owned string.
    pub fn read_utf8_alloc(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes_alloc(len)?;
        match String::from_utf8(bytes) {
            Ok(s) => Ok(s),
            Err(_) => Err(self.latch(Error::Type)),
        }
    }

    /// Skip `len` payload bytes of the open str/bin/ext, seeking on the
    /// source where that is cheaper than filling.
    pub fn skip_bytes(&mut self, len: usize) -> Result<()> {
        self.guard()?;
        self.track(|t| t.bytes(len as u64))?;
        if let Err(e) = self.input.skip(len) {
            return Err(self.latch(e));
        }
        Ok(())
    }

    // ── Compound closes ───────────────────────────────────────────────

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

    // ── Whole-value operations ────────────────────────────────────────

    /// Read a complete timestamp: an ext value of type −1 with a 4, 8,
    /// or 12-byte payload. A wrong ext type is `type`; a wrong payload
    /// length or out-of-range nanoseconds is `invalid`.
    pub fn read_timestamp(&mut self) -> Result<Timestamp> {
        self.guard()?;
        let tag = self.read_tag()?;
        let Tag::Ext { ext_type, len } = tag else {
            return Err(self.latch(Error::Type));
        };
        if ext_type != btf_types::TIMESTAMP_EXT_TYPE {
            return Err(self.latch(Error::Type));
        }
        if !matches!(len, 4 | 8 | 12) {
            return Err(self.latch(Error::Invalid));
        }
        let mut payload = [0u8; 12];
        self.read_bytes(&mut payload[..len as usize])?;
        self.finish_ext()?;

        match Timestamp::from_wire_payload(&payload[..len as usize]) {
            Ok(ts) => Ok(ts),
            Err(e) => Err(self.latch(e)),
        }
    }

    /// Discard the next complete value: scalars are dropped, str/bin/ext
    /// payloads are skipped, and compounds are discarded child by child
    /// and closed.
    pub fn discard(&mut self) -> Result<()> {
        let tag = self.read_tag()?;
        match tag {
            Tag::Str(len) => {
                self.skip_bytes(len as usize)?;
                self.finish_str()
            }
            Tag::Bin(len) => {
                self.skip_bytes(len as usize)?;
                self.finish_bin()
            }
            Tag::Ext { len, .. } => {
                self.skip_bytes(len as usize)?;
                self.finish_ext()
            }
            Tag::Array(count) => {
                for _ in 0..count {
                    self.discard()?;
                }
                self.finish_array()
            }
            Tag::Map(count) => {
                for _ in 0..count {
                    self.discard()?;
                    self.discard()?;
                }
                self.finish_map()
            }
            _ => Ok(()),
        }
    }

    /// Finish the reader: verify nothing is left open, run the source's
    /// teardown, and report the first latched error.
    pub fn finish(mut self) -> Result<()> {
        if self.error.is_none() {
            if let Err(e) = self.tracker.check_empty() {
                self.latch(e);
            }
        }
        if let Input::Stream(s) = &mut self.input {
            s.source.teardown();
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────

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

    fn latch(&mut self, error: Error) -> Error {
        if self.error.is_none() {
            self.error = Some(error);
            if error == Error::Bug {
                tracing::error!(error = error.name(), "reader misuse");
            }
            if let Some(hook) = &mut self.error_hook {
                hook(error);
            }
        }
        self.error.unwrap_or(error)
    }
}
