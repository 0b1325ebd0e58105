use core::cell::{Cell, RefCell};

use btf_decoder::Source;
use btf_types::{CodecOptions, Error, Kind, Result, Tag};
use btf_wire::{header_size, parse_tag};

use crate::arena::{Arena, NodeData, NodeId, NodeValue};
use crate::node::Node;

/// Configuration for a [`Tree`].
#[derive(Default)]
pub struct TreeOptions {
    /// Codec knobs: spec level and extension gate.
    pub codec: CodecOptions,
    /// Upper bound on the bytes a streamed message may occupy. Growth
    /// past this latches `too_big`. Unbounded by default.
    pub max_size: Option<usize>,
    /// Upper bound on the total node count of one message. Unbounded by
    /// default.
    pub max_nodes: Option<usize>,
    /// Standard arena page size in bytes. Defaults to 4096.
    pub page_size: Option<usize>,
    /// Fixed node pool: the parser uses exactly this many node records
    /// and latches `too_big` past them, never allocating pages.
    pub pool_nodes: Option<usize>,
    /// Initial capacity of the parse level stack.
    pub initial_depth: Option<usize>,
}

impl TreeOptions {
    #[must_use]
    pub fn new() -> Self {
        TreeOptions::default()
    }

    #[must_use]
    pub fn codec(mut self, codec: CodecOptions) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn max_size(mut self, bytes: usize) -> Self {
        self.max_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = Some(nodes);
        self
    }

    #[must_use]
    pub fn page_size(mut self, bytes: usize) -> Self {
        self.page_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn pool_nodes(mut self, nodes: usize) -> Self {
        self.pool_nodes = Some(nodes);
        self
    }

    #[must_use]
    pub fn initial_depth(mut self, depth: usize) -> Self {
        self.initial_depth = Some(depth);
        self
    }
}

const DEFAULT_PAGE_SIZE: usize = 4096;
const DEFAULT_INITIAL_DEPTH: usize = 8;

enum TreeInput<'a> {
    /// A pre-loaded blob assumed to hold complete messages. `base` is
    /// the start offset of the current message.
    Blob { data: &'a [u8], base: usize },
    /// A pull-fill source feeding a growable buffer. `len` counts the
    /// valid bytes; the current message always starts at offset zero.
    Stream { source: Box<dyn Source + 'a>, buf: Vec<u8>, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    NotStarted,
    InProgress,
    Parsed,
}

/// One level of the iterative parse: the next child slot to fill and how
/// many children remain at this level.
struct Frame {
    child: NodeId,
    left: usize,
}

/// Resumable parser state. Survives an incomplete parse (a non-blocking
/// fill returning zero bytes) so a later call picks up exactly where it
/// stopped: at the start of the node that could not be completed.
struct Parser {
    state: ParseState,
    /// Bytes available that are not yet spoken for by reservations.
    /// Every pending node costs at least one byte here before it is
    /// parsed, which is what rejects a compound header claiming more
    /// children than the data could possibly hold.
    possible_nodes_left: usize,
    /// Bytes reserved so far for the node currently being parsed.
    current_node_reserved: usize,
    stack: Vec<Frame>,
}

/// Outcome of one reservation or parse step.
enum Step {
    Done,
    /// Stream mode only: the fill produced nothing; try again later.
    Incomplete,
}

/// An immutable, random-access tree of one complete parsed value.
///
/// ```text
///   blob / source ──► resumable parser ──► paged node arena
///                                             │
///                                          root() ──► Node queries
/// ```
///
/// Construction binds the input; [`Tree::parse`] (or
/// [`Tree::try_parse`] for non-blocking sources) runs the state machine
/// to completion, after which [`Tree::root`] exposes the value.
/// Parsing again consumes the next message from the same input and
/// invalidates prior nodes, which the borrow on `parse` enforces.
///
/// Payload bytes of str/bin/ext values are never copied into the arena:
/// node records store offsets into the message data.
///
/// # Example
///
/// ```rust
/// use btf_tree::Tree;
///
/// // {"a": 1, "b": true}
/// let blob = [0x82, 0xa1, 0x61, 0x01, 0xa1, 0x62, 0xc3];
/// let mut tree = Tree::from_blob(&blob);
/// tree.parse().unwrap();
/// let root = tree.root();
/// assert_eq!(root.map_count().unwrap(), 2);
/// assert_eq!(root.map_str("a").as_u64().unwrap(), 1);
/// assert!(root.map_str("b").as_bool().unwrap());
/// ```
pub struct Tree<'a> {
    input: TreeInput<'a>,
    pub(crate) arena: Arena,
    parser: Parser,
    /// Bytes of the current message consumed so far; after a successful
    /// parse, the total encoded size of the message.
    size: usize,
    node_count: usize,
    root: NodeId,
    codec: CodecOptions,
    max_size: usize,
    max_nodes: usize,
    pub(crate) error: Cell<Option<Error>>,
    error_hook: RefCell<Option<Box<dyn FnMut(Error) + 'a>>>,
}

impl<'a> Tree<'a> {
    /// A tree over a complete in-memory message. Truncation is
    /// `invalid`, not `io`.
    #[must_use]
    pub fn from_blob(data: &'a [u8]) -> Self {
        Tree::from_blob_with(data, TreeOptions::new())
    }

    /// A blob tree with explicit options.
    #[must_use]
    pub fn from_blob_with(data: &'a [u8], opts: TreeOptions) -> Self {
        Tree::build(TreeInput::Blob { data, base: 0 }, opts)
    }

    /// A tree that pulls message bytes from `source` into an internal
    /// growable buffer. Use [`Tree::try_parse`] if the source is
    /// non-blocking.
    #[must_use]
    pub fn from_source(source: impl Source + 'a) -> Self {
        Tree::from_source_with(source, TreeOptions::new())
    }

    /// A streaming tree with explicit options.
    #[must_use]
    pub fn from_source_with(source: impl Source + 'a, opts: TreeOptions) -> Self {
        Tree::build(
            TreeInput::Stream { source: Box::new(source), buf: Vec::new(), len: 0 },
            opts,
        )
    }

    fn build(input: TreeInput<'a>, opts: TreeOptions) -> Self {
        let arena = match opts.pool_nodes {
            Some(slots) => Arena::pool(slots),
            None => Arena::paged(opts.page_size.unwrap_or(DEFAULT_PAGE_SIZE)),
        };
        Tree {
            input,
            arena,
            parser: Parser {
                state: ParseState::NotStarted,
                possible_nodes_left: 0,
                current_node_reserved: 0,
                stack: Vec::with_capacity(
                    opts.initial_depth.unwrap_or(DEFAULT_INITIAL_DEPTH),
                ),
            },
            size: 0,
            node_count: 0,
            root: NodeId { page: 0, slot: 0 },
            codec: opts.codec,
            max_size: opts.max_size.unwrap_or(usize::MAX),
            max_nodes: opts.max_nodes.unwrap_or(usize::MAX),
            error: Cell::new(None),
            error_hook: RefCell::new(None),
        }
    }

    /// Install a hook invoked exactly once, when the first error
    /// latches.
    pub fn set_error_hook(&mut self, hook: impl FnMut(Error) + 'a) {
        *self.error_hook.borrow_mut() = Some(Box::new(hook));
    }

    /// The latched error, if any.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.error.get()
    }

    /// Latch an error explicitly, e.g. [`Error::Data`] when the
    /// application rejects the document's contents.
    pub fn flag_error(&self, error: Error) {
        self.latch(error);
    }

    /// Total nodes in the parsed message.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Encoded byte size of the parsed message.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    // ── Parsing ───────────────────────────────────────────────────────

    /// Parse one complete message, blocking on the source as needed.
    ///
    /// After a previous successful parse, this consumes the next message
    /// from the same input.
    ///
    /// # Errors
    ///
    /// An incomplete message is [`Error::Io`] in stream mode and
    /// [`Error::Invalid`] for a blob, alongside every error the wire
    /// data or the configured bounds can produce.
    pub fn parse(&mut self) -> Result<()> {
        match self.drive() {
            Ok(Step::Done) => Ok(()),
            Ok(Step::Incomplete) => {
                let e = if matches!(self.input, TreeInput::Blob { .. }) {
                    Error::Invalid
                } else {
                    Error::Io
                };
                Err(self.latch(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Parse cooperatively over a non-blocking source: returns
    /// `Ok(false)` without latching anything when the fill produced no
    /// bytes, leaving the parse resumable; `Ok(true)` once the message
    /// is complete.
    pub fn try_parse(&mut self) -> Result<bool> {
        match self.drive() {
            Ok(Step::Done) => Ok(true),
            Ok(Step::Incomplete) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The root node of the last successful parse.
    ///
    /// On an errored tree this is the nil node; calling it before a
    /// successful parse is [`Error::Bug`].
    #[must_use]
    pub fn root(&self) -> Node<'_, 'a> {
        if self.error.get().is_some() {
            return Node::nil(self);
        }
        if self.parser.state != ParseState::Parsed {
            self.latch(Error::Bug);
            return Node::nil(self);
        }
        Node::at(self, self.root)
    }

    fn drive(&mut self) -> Result<Step> {
        if let Some(e) = self.error.get() {
            return Err(e);
        }
        if self.parser.state != ParseState::InProgress {
            match self.start()? {
                Step::Incomplete => return Ok(Step::Incomplete),
                Step::Done => {}
            }
        }
        match self.run()? {
            Step::Incomplete => Ok(Step::Incomplete),
            Step::Done => {
                self.parser.state = ParseState::Parsed;
                tracing::debug!(
                    bytes = self.size,
                    nodes = self.node_count,
                    "parsed message"
                );
                Ok(Step::Done)
            }
        }
    }

    /// Begin a fresh message: discard the previous one, account for the
    /// root's type byte, and seed the arena and level stack.
    fn start(&mut self) -> Result<Step> {
        if self.parser.state == ParseState::Parsed {
            match &mut self.input {
                TreeInput::Blob { base, .. } => *base += self.size,
                TreeInput::Stream { buf, len, .. } => {
                    buf.copy_within(self.size..*len, 0);
                    *len -= self.size;
                }
            }
            self.size = 0;
            self.node_count = 0;
            self.arena.reset();
        }

        self.parser.state = ParseState::InProgress;
        self.parser.current_node_reserved = 0;
        self.parser.possible_nodes_left = self.data_len();

        // At least the root's type byte must exist before anything is
        // allocated.
        match self.reserve(1) {
            Ok(Step::Done) => {}
            Ok(Step::Incomplete) => {
                self.parser.state = ParseState::NotStarted;
                return Ok(Step::Incomplete);
            }
            Err(e) => {
                self.parser.state = ParseState::NotStarted;
                return Err(self.latch(e));
            }
        }
        self.parser.possible_nodes_left -= 1;
        self.parser.current_node_reserved = 0;
        self.node_count = 1;

        let root = match self.arena.alloc(1) {
            Ok(id) => id,
            Err(e) => return Err(self.latch(e)),
        };
        self.root = root;
        self.parser.stack.clear();
        self.parser.stack.push(Frame { child: root, left: 1 });
        Ok(Step::Done)
    }

    /// The iterative parse loop. Each pass parses exactly one node into
    /// its pre-allocated slot, then advances the owning level. Pausing
    /// (`Incomplete`) leaves the stack and cursors untouched for the
    /// node that could not be finished, so resumption re-parses only
    /// that node.
    fn run(&mut self) -> Result<Step> {
        while let Some(top) = self.parser.stack.last() {
            let level = self.parser.stack.len() - 1;
            let id = top.child;
            match self.parse_node(id) {
                Ok(Step::Done) => {}
                Ok(Step::Incomplete) => return Ok(Step::Incomplete),
                Err(e) => return Err(self.latch(e)),
            }

            let frame = &mut self.parser.stack[level];
            frame.left -= 1;
            frame.child = frame.child.offset(1);

            while let Some(top) = self.parser.stack.last() {
                if top.left == 0 {
                    self.parser.stack.pop();
                } else {
                    break;
                }
            }
        }
        Ok(Step::Done)
    }

    /// Parse one node at the current message position into `id`.
    fn parse_node(&mut self, id: NodeId) -> Result<Step> {
        // The type byte was reserved by the parent (or by start for the
        // root), so it is guaranteed to be buffered.
        self.parser.current_node_reserved = 0;
        let first = self.data()[self.size];
        let header = header_size(first);
        if header > 1 {
            match self.reserve(header - 1)? {
                Step::Done => {}
                Step::Incomplete => return Ok(Step::Incomplete),
            }
        }

        let (tag, consumed) = match parse_tag(&self.data()[self.size..], self.codec) {
            Ok(parsed) => parsed,
            Err(e) => return Err(e.latch()),
        };
        debug_assert_eq!(consumed, header);

        let data = match tag {
            Tag::Nil => NodeData { kind: Kind::Nil, len: 0, value: NodeValue::None },
            Tag::Bool(b) => NodeData { kind: Kind::Bool, len: 0, value: NodeValue::Bool(b) },
            Tag::Int(i) => NodeData { kind: Kind::Int, len: 0, value: NodeValue::Int(i) },
            Tag::Uint(u) => NodeData { kind: Kind::Uint, len: 0, value: NodeValue::Uint(u) },
            Tag::F32(f) => NodeData { kind: Kind::F32, len: 0, value: NodeValue::F32(f) },
            Tag::F64(f) => NodeData { kind: Kind::F64, len: 0, value: NodeValue::F64(f) },
            Tag::Str(len) | Tag::Bin(len) | Tag::Ext { len, .. } => {
                // Payload stays in the message data; the record keeps
                // its offset. The ext type byte sits at offset - 1.
                let offset = self.size + header;
                match self.reserve(len as usize)? {
                    Step::Done => {}
                    Step::Incomplete => return Ok(Step::Incomplete),
                }
                NodeData {
                    kind: tag.kind(),
                    len,
                    value: NodeValue::Offset(offset),
                }
            }
            Tag::Array(count) | Tag::Map(count) => {
                let kind = tag.kind();
                let total = match kind {
                    Kind::Map => (count as usize)
                        .checked_mul(2)
                        .ok_or(Error::TooBig)?,
                    _ => count as usize,
                };

                let node_count = self
                    .node_count
                    .checked_add(total)
                    .ok_or(Error::TooBig)?;
                if node_count > self.max_nodes {
                    return Err(Error::TooBig);
                }

                // Pre-reservation: one byte per declared child must be
                // available before any arena space is committed. This is
                // what stops a header claiming 65536 pairs backed by a
                // handful of bytes. The count is committed only after the
                // reservation so a paused parse does not double-count on
                // resumption.
                match self.reserve(total)? {
                    Step::Done => {}
                    Step::Incomplete => return Ok(Step::Incomplete),
                }
                self.node_count = node_count;

                let children = self.arena.alloc(total)?;
                if total > 0 {
                    self.parser.stack.push(Frame { child: children, left: total });
                }
                NodeData { kind, len: count, value: NodeValue::Children(children) }
            }
        };

        *self.arena.node_mut(id) = data;

        // Commit the accounting: everything reserved for this node is
        // now spoken for. The node's own footprint advances the message
        // position; bytes reserved for children do not.
        self.parser.possible_nodes_left -= self.parser.current_node_reserved;
        let mut node_size = self.parser.current_node_reserved + 1;
        match self.arena.node(id).kind {
            Kind::Array => node_size -= self.arena.node(id).len as usize,
            Kind::Map => node_size -= self.arena.node(id).len as usize * 2,
            _ => {}
        }
        self.size += node_size;
        Ok(Step::Done)
    }

    /// Reserve `extra` bytes for the current node on top of everything
    /// already reserved, filling from the source when the buffered data
    /// cannot cover it.
    fn reserve(&mut self, extra: usize) -> Result<Step> {
        let reserved = self
            .parser
            .current_node_reserved
            .checked_add(extra)
            .ok_or(Error::TooBig)?;
        self.parser.current_node_reserved = reserved;
        if reserved <= self.parser.possible_nodes_left {
            return Ok(Step::Done);
        }
        self.reserve_fill()
    }

    /// Pull more bytes until the current reservation is covered.
    fn reserve_fill(&mut self) -> Result<Step> {
        let needed = self.parser.current_node_reserved;
        let deficit = needed - self.parser.possible_nodes_left;

        let TreeInput::Stream { source, buf, len } = &mut self.input else {
            // A blob holds the whole message by contract.
            return Err(Error::Invalid);
        };

        match len.checked_add(deficit) {
            Some(total) if total <= self.max_size => {}
            _ => return Err(Error::TooBig),
        }

        loop {
            if *len == buf.len() {
                let mut new_size = buf.len().max(btf_types::DEFAULT_BUFFER_SIZE);
                while new_size < *len + deficit {
                    new_size = new_size.saturating_mul(2);
                }
                let new_size = new_size.min(self.max_size);
                tracing::trace!(from = buf.len(), to = new_size, "growing tree buffer");
                buf.resize(new_size, 0);
            }
            match source.fill(&mut buf[*len..]) {
                Ok(0) => return Ok(Step::Incomplete),
                Ok(n) if n <= buf.len() - *len => {
                    *len += n;
                    self.parser.possible_nodes_left += n;
                    if self.parser.possible_nodes_left >= needed {
                        return Ok(Step::Done);
                    }
                }
                Ok(_) => return Err(Error::Io),
                Err(Error::Eof) => {
                    // A clean end before any byte of this message is a
                    // clean end between messages; mid-message it is a
                    // truncation.
                    return if self.size == 0 && *len == 0 {
                        Err(Error::Eof)
                    } else {
                        Err(Error::Io)
                    };
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The current message's bytes.
    pub(crate) fn data(&self) -> &[u8] {
        match &self.input {
            TreeInput::Blob { data, base } => &data[*base..],
            TreeInput::Stream { buf, len, .. } => &buf[..*len],
        }
    }

    fn data_len(&self) -> usize {
        self.data().len()
    }

    pub(crate) fn latch(&self, error: Error) -> Error {
        if self.error.get().is_none() {
            self.error.set(Some(error));
            if error == Error::Bug {
                tracing::error!(error = error.name(), "tree misuse");
            }
            if let Some(hook) = self.error_hook.borrow_mut().as_mut() {
                hook(error);
            }
        }
        self.error.get().unwrap_or(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A source that serves a byte vector in fixed-size chunks.
    struct Chunked {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Chunked {
        fn new(data: Vec<u8>, chunk: usize) -> Self {
            Chunked { data, pos: 0, chunk }
        }
    }

    impl Source for Chunked {
        fn fill(&mut self, dst: &mut [u8]) -> Result<usize> {
            if self.pos >= self.data.len() {
                return Err(Error::Eof);
            }
            let n = dst.len().min(self.chunk).min(self.data.len() - self.pos);
            dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    /// A source that serves scripted bursts; an empty burst yields 0
    /// bytes once, the way a non-blocking socket reports "not yet".
    struct Bursty {
        bursts: Vec<Vec<u8>>,
        next: usize,
    }

    impl Source for Bursty {
        fn fill(&mut self, dst: &mut [u8]) -> Result<usize> {
            if self.next >= self.bursts.len() {
                return Err(Error::Eof);
            }
            let burst = &self.bursts[self.next];
            assert!(burst.len() <= dst.len(), "burst larger than buffer space");
            dst[..burst.len()].copy_from_slice(burst);
            let n = burst.len();
            self.next += 1;
            Ok(n)
        }
    }

    static SMALL_MAP: [u8; 7] = [0x82, 0xa1, 0x61, 0x01, 0xa1, 0x62, 0xc3];

    // ── Blob parsing ──────────────────────────────────────────────────

    #[test]
    fn parses_small_map_blob() {
        let mut tree = Tree::from_blob(&SMALL_MAP);
        tree.parse().unwrap();
        assert_eq!(tree.size(), 7);
        assert_eq!(tree.node_count(), 5);

        let root = tree.root();
        assert_eq!(root.kind(), Kind::Map);
        assert_eq!(root.map_count().unwrap(), 2);
        assert_eq!(root.map_str("a").as_u64().unwrap(), 1);
        assert!(root.map_str("b").as_bool().unwrap());
    }

    #[test]
    fn parses_scalars_and_payloads() {
        // ["hello", <3 bin bytes>, 1.5]
        let blob = [
            0x93, 0xa5, 0x68, 0x65, 0x6c, 0x6c, 0x6f, 0xc4, 0x03, 0x01, 0x02, 0x03, 0xcb,
            0x3f, 0xf8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut tree = Tree::from_blob(&blob);
        tree.parse().unwrap();
        let root = tree.root();
        assert_eq!(root.array_length().unwrap(), 3);
        assert_eq!(root.array_at(0).as_str().unwrap(), "hello");
        assert_eq!(root.array_at(1).bytes().unwrap(), &[1, 2, 3]);
        assert_eq!(root.array_at(2).as_f64().unwrap(), 1.5);
    }

    #[test]
    fn parses_deep_nesting() {
        // 100 nested single-element arrays around one integer.
        let mut blob = vec![0x91u8; 100];
        blob.push(0x2a);
        let mut tree = Tree::from_blob(&blob);
        tree.parse().unwrap();
        let mut node = tree.root();
        for _ in 0..100 {
            assert_eq!(node.array_length().unwrap(), 1);
            node = node.array_at(0);
        }
        assert_eq!(node.as_u64().unwrap(), 42);
    }

    #[test]
    fn truncated_blob_is_invalid() {
        // Map of 2 pairs with only one key present.
        let mut tree = Tree::from_blob(&SMALL_MAP[..3]);
        assert_eq!(tree.parse(), Err(Error::Invalid));
        assert_eq!(tree.error(), Some(Error::Invalid));
    }

    #[test]
    fn reserved_opcode_is_invalid() {
        let mut tree = Tree::from_blob(&[0xc1]);
        assert_eq!(tree.parse(), Err(Error::Invalid));
    }

    #[test]
    fn ext_gated_by_options() {
        let blob = [0xd4, 0x01, 0x00];
        let mut tree = Tree::from_blob(&blob);
        assert_eq!(tree.parse(), Err(Error::Unsupported));

        let mut tree = Tree::from_blob_with(
            &blob,
            TreeOptions::new().codec(CodecOptions::new().extensions(true)),
        );
        tree.parse().unwrap();
        assert_eq!(tree.root().ext_type().unwrap(), 1);
    }

    #[test]
    fn claimed_children_must_be_backed_by_bytes() {
        // map16 claiming 65535 pairs with three bytes of payload. The
        // pre-reservation accounting rejects it without allocating.
        let blob = [0xde, 0xff, 0xff, 0x01, 0x02, 0x03];
        let mut tree = Tree::from_blob(&blob);
        assert_eq!(tree.parse(), Err(Error::Invalid));
        assert!(tree.node_count() < 1000);
    }

    #[test]
    fn str_length_must_be_backed_by_bytes() {
        // str32 claiming 4 GiB minus one.
        let blob = [0xdb, 0xff, 0xff, 0xff, 0xff, 0x61];
        let mut tree = Tree::from_blob(&blob);
        assert_eq!(tree.parse(), Err(Error::Invalid));
    }

    #[test]
    fn max_nodes_is_enforced() {
        let blob = [0x93, 0x01, 0x02, 0x03];
        let mut tree = Tree::from_blob_with(&blob, TreeOptions::new().max_nodes(3));
        assert_eq!(tree.parse(), Err(Error::TooBig));

        let mut tree = Tree::from_blob_with(&blob, TreeOptions::new().max_nodes(4));
        tree.parse().unwrap();
    }

    #[test]
    fn pool_mode_bounds_node_storage() {
        let mut tree = Tree::from_blob_with(&SMALL_MAP, TreeOptions::new().pool_nodes(3));
        assert_eq!(tree.parse(), Err(Error::TooBig));

        let mut tree = Tree::from_blob_with(&SMALL_MAP, TreeOptions::new().pool_nodes(5));
        tree.parse().unwrap();
        assert_eq!(tree.root().map_count().unwrap(), 2);
    }

    #[test]
    fn root_before_parse_is_a_bug() {
        let tree = Tree::from_blob(&SMALL_MAP);
        let root = tree.root();
        assert!(root.is_nil());
        assert_eq!(tree.error(), Some(Error::Bug));
    }

    #[test]
    fn reparse_consumes_next_message() {
        // Two messages back to back: 1, then [2, 3].
        let blob = [0x01, 0x92, 0x02, 0x03];
        let mut tree = Tree::from_blob(&blob);
        tree.parse().unwrap();
        assert_eq!(tree.root().as_u64().unwrap(), 1);

        tree.parse().unwrap();
        let root = tree.root();
        assert_eq!(root.array_length().unwrap(), 2);
        assert_eq!(root.array_at(1).as_u64().unwrap(), 3);
    }

    // ── Stream parsing ────────────────────────────────────────────────

    #[test]
    fn parses_from_chunked_source() {
        let mut tree = Tree::from_source(Chunked::new(SMALL_MAP.to_vec(), 2));
        tree.parse().unwrap();
        let root = tree.root();
        assert_eq!(root.map_count().unwrap(), 2);
        assert_eq!(root.map_str("a").as_u64().unwrap(), 1);
    }

    #[test]
    fn try_parse_resumes_after_dry_fill() {
        // S7: the first three bytes arrive, then nothing, then the rest.
        let bursts = vec![SMALL_MAP[..3].to_vec(), Vec::new(), SMALL_MAP[3..].to_vec()];
        let mut tree = Tree::from_source(Bursty { bursts, next: 0 });

        assert_eq!(tree.try_parse(), Ok(false));
        assert_eq!(tree.error(), None);

        assert_eq!(tree.try_parse(), Ok(true));
        let root = tree.root();
        assert_eq!(root.map_count().unwrap(), 2);
        assert!(root.map_str("b").as_bool().unwrap());
    }

    #[test]
    fn try_parse_can_pause_before_the_first_byte() {
        let bursts = vec![Vec::new(), vec![0x2a]];
        let mut tree = Tree::from_source(Bursty { bursts, next: 0 });
        assert_eq!(tree.try_parse(), Ok(false));
        assert_eq!(tree.try_parse(), Ok(true));
        assert_eq!(tree.root().as_u64().unwrap(), 42);
    }

    #[test]
    fn blocking_parse_treats_truncation_as_io() {
        let mut tree = Tree::from_source(Chunked::new(SMALL_MAP[..3].to_vec(), 3));
        assert_eq!(tree.parse(), Err(Error::Io));
    }

    #[test]
    fn clean_eof_before_a_message_is_eof() {
        let mut tree = Tree::from_source(Chunked::new(Vec::new(), 16));
        assert_eq!(tree.parse(), Err(Error::Eof));
    }

    #[test]
    fn stream_reparse_reads_second_message() {
        let mut data = vec![0x01];
        data.extend_from_slice(&SMALL_MAP);
        let mut tree = Tree::from_source(Chunked::new(data, 3));
        tree.parse().unwrap();
        assert_eq!(tree.root().as_u64().unwrap(), 1);

        tree.parse().unwrap();
        assert_eq!(tree.root().map_count().unwrap(), 2);
    }

    #[test]
    fn max_size_bounds_stream_growth() {
        // A 100-byte string cannot fit a 16-byte message bound.
        let mut data = vec![0xd9, 100];
        data.extend_from_slice(&[0x61; 100]);
        let mut tree =
            Tree::from_source_with(Chunked::new(data, 8), TreeOptions::new().max_size(16));
        assert_eq!(tree.parse(), Err(Error::TooBig));
    }

    #[test]
    fn error_hook_fires_once() {
        use core::cell::Cell;
        use std::rc::Rc;

        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let mut tree = Tree::from_blob(&[0xc1]);
        tree.set_error_hook(move |_| seen.set(seen.get() + 1));
        assert!(tree.parse().is_err());
        assert!(tree.parse().is_err());
        let _ = tree.root();
        assert_eq!(count.get(), 1);
    }
}
