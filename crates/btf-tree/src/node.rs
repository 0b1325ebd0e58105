use btf_types::{Error, Kind, Result, Tag, Timestamp};

use crate::arena::{NodeData, NodeId, NodeValue};
use crate::parser::Tree;

#[derive(Clone, Copy)]
enum Slot {
    Arena(NodeId),
    /// The sentinel returned on errors and type mismatches.
    Nil,
    /// The sentinel returned by optional map lookups that found nothing,
    /// distinguishing "absent" from "present and nil".
    Missing,
}

/// A handle to one value inside a parsed [`Tree`].
///
/// Nodes are cheap copies (a tree reference plus an arena id) and
/// borrow everything else: str/bin/ext payloads come straight out of the
/// message data.
///
/// Navigation never panics and never returns `Err`: a bad step latches
/// the appropriate error on the tree and yields the nil node, and every
/// value getter on an errored tree reports the latched error. The
/// pattern is to navigate freely and let the first getter surface
/// whatever went wrong:
///
/// ```rust
/// use btf_tree::Tree;
///
/// // [nil, -1, 1.5]
/// let blob = [0x93, 0xc0, 0xff, 0xcb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0];
/// let mut tree = Tree::from_blob(&blob);
/// tree.parse().unwrap();
/// let root = tree.root();
/// assert_eq!(root.array_length().unwrap(), 3);
/// assert_eq!(root.array_at(2).as_f64().unwrap(), 1.5);
/// ```
#[derive(Clone, Copy)]
pub struct Node<'t, 'a> {
    tree: &'t Tree<'a>,
    slot: Slot,
}

impl<'t, 'a> Node<'t, 'a> {
    pub(crate) fn at(tree: &'t Tree<'a>, id: NodeId) -> Self {
        Node { tree, slot: Slot::Arena(id) }
    }

    pub(crate) fn nil(tree: &'t Tree<'a>) -> Self {
        Node { tree, slot: Slot::Nil }
    }

    fn missing(tree: &'t Tree<'a>) -> Self {
        Node { tree, slot: Slot::Missing }
    }

    fn record(&self) -> NodeData {
        match self.slot {
            Slot::Arena(id) => *self.tree.arena.node(id),
            Slot::Nil => NodeData { kind: Kind::Nil, len: 0, value: NodeValue::None },
            Slot::Missing => {
                NodeData { kind: Kind::Missing, len: 0, value: NodeValue::None }
            }
        }
    }

    fn guard(&self) -> Result<()> {
        match self.tree.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn type_error(&self) -> Error {
        self.tree.latch(Error::Type)
    }

    /// The payload slice of a str/bin/ext record, straight from the
    /// message data. `None` for other kinds.
    fn payload(&self) -> Option<&'t [u8]> {
        let d = self.record();
        match (d.kind, d.value) {
            (Kind::Str | Kind::Bin | Kind::Ext, NodeValue::Offset(offset)) => {
                Some(&self.tree.data()[offset..offset + d.len as usize])
            }
            _ => None,
        }
    }

    // ── Identity ──────────────────────────────────────────────────────

    /// The node's kind; [`Kind::Nil`] on an errored tree.
    #[must_use]
    pub fn kind(&self) -> Kind {
        if self.tree.error().is_some() {
            return Kind::Nil;
        }
        self.record().kind
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.kind() == Kind::Nil
    }

    /// True for the sentinel produced by an optional lookup that found
    /// no entry.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.kind() == Kind::Missing
    }

    /// Reconstruct the node's tag.
    ///
    /// # Errors
    ///
    /// The latched error on an errored tree; [`Error::Type`] for the
    /// missing sentinel, which has no tag.
    pub fn tag(&self) -> Result<Tag> {
        self.guard()?;
        let d = self.record();
        Ok(match d.kind {
            Kind::Missing => return Err(self.type_error()),
            Kind::Nil => Tag::Nil,
            Kind::Bool => match d.value {
                NodeValue::Bool(b) => Tag::Bool(b),
                _ => Tag::Bool(false),
            },
            Kind::Int => match d.value {
                NodeValue::Int(i) => Tag::Int(i),
                _ => Tag::Int(0),
            },
            Kind::Uint => match d.value {
                NodeValue::Uint(u) => Tag::Uint(u),
                _ => Tag::Uint(0),
            },
            Kind::F32 => match d.value {
                NodeValue::F32(f) => Tag::F32(f),
                _ => Tag::F32(0.0),
            },
            Kind::F64 => match d.value {
                NodeValue::F64(f) => Tag::F64(f),
                _ => Tag::F64(0.0),
            },
            Kind::Str => Tag::Str(d.len),
            Kind::Bin => Tag::Bin(d.len),
            Kind::Array => Tag::Array(d.len),
            Kind::Map => Tag::Map(d.len),
            Kind::Ext => Tag::Ext { ext_type: self.ext_type()?, len: d.len },
        })
    }

    // ── Scalar getters ────────────────────────────────────────────────

    pub fn as_bool(&self) -> Result<bool> {
        self.guard()?;
        match self.record().value {
            NodeValue::Bool(b) => Ok(b),
            _ => Err(self.type_error()),
        }
    }

    /// The stored integer as unsigned, accepting a non-negative `int`.
    pub fn as_u64(&self) -> Result<u64> {
        self.guard()?;
        match self.record().value {
            NodeValue::Uint(u) => Ok(u),
            #[allow(clippy::cast_sign_loss)]
            NodeValue::Int(i) if i >= 0 => Ok(i as u64),
            _ => Err(self.type_error()),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        self.ranged_uint(u64::from(u32::MAX)).map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let v = v as u32;
            v
        })
    }

    pub fn as_u16(&self) -> Result<u16> {
        self.ranged_uint(u64::from(u16::MAX)).map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let v = v as u16;
            v
        })
    }

    pub fn as_u8(&self) -> Result<u8> {
        self.ranged_uint(u64::from(u8::MAX)).map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let v = v as u8;
            v
        })
    }

    /// The stored integer as signed, accepting a `uint` that fits.
    pub fn as_i64(&self) -> Result<i64> {
        self.guard()?;
        match self.record().value {
            NodeValue::Int(i) => Ok(i),
            NodeValue::Uint(u) => match i64::try_from(u) {
                Ok(i) => Ok(i),
                Err(_) => Err(self.type_error()),
            },
            _ => Err(self.type_error()),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        self.ranged_int(i64::from(i32::MIN), i64::from(i32::MAX)).map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let v = v as i32;
            v
        })
    }

    pub fn as_i16(&self) -> Result<i16> {
        self.ranged_int(i64::from(i16::MIN), i64::from(i16::MAX)).map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let v = v as i16;
            v
        })
    }

    pub fn as_i8(&self) -> Result<i8> {
        self.ranged_int(i64::from(i8::MIN), i64::from(i8::MAX)).map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            let v = v as i8;
            v
        })
    }

    fn ranged_uint(&self, max: u64) -> Result<u64> {
        let v = self.as_u64()?;
        if v <= max {
            Ok(v)
        } else {
            Err(self.type_error())
        }
    }

    fn ranged_int(&self, min: i64, max: i64) -> Result<i64> {
        let v = self.as_i64()?;
        if (min..=max).contains(&v) {
            Ok(v)
        } else {
            Err(self.type_error())
        }
    }

    /// Lenient float: converts among int, uint, float32, and float64.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Result<f64> {
        self.guard()?;
        match self.record().value {
            NodeValue::F64(f) => Ok(f),
            NodeValue::F32(f) => Ok(f64::from(f)),
            NodeValue::Int(i) => Ok(i as f64),
            NodeValue::Uint(u) => Ok(u as f64),
            _ => Err(self.type_error()),
        }
    }

    /// Lenient float: as [`Node::as_f64`] narrowed to `f32`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn as_f32(&self) -> Result<f32> {
        self.guard()?;
        match self.record().value {
            NodeValue::F32(f) => Ok(f),
            NodeValue::F64(f) => Ok(f as f32),
            NodeValue::Int(i) => Ok(i as f32),
            NodeValue::Uint(u) => Ok(u as f32),
            _ => Err(self.type_error()),
        }
    }

    /// Strict float: the node must be exactly a float64.
    pub fn as_f64_strict(&self) -> Result<f64> {
        self.guard()?;
        match self.record().value {
            NodeValue::F64(f) => Ok(f),
            _ => Err(self.type_error()),
        }
    }

    /// Strict float: the node must be exactly a float32.
    pub fn as_f32_strict(&self) -> Result<f32> {
        self.guard()?;
        match self.record().value {
            NodeValue::F32(f) => Ok(f),
            _ => Err(self.type_error()),
        }
    }

    // ── Arrays ────────────────────────────────────────────────────────

    pub fn array_length(&self) -> Result<u32> {
        self.guard()?;
        let d = self.record();
        if d.kind == Kind::Array {
            Ok(d.len)
        } else {
            Err(self.type_error())
        }
    }

    /// The element at `index`. Out of bounds latches `data` and yields
    /// the nil node.
    #[must_use]
    pub fn array_at(&self, index: u32) -> Node<'t, 'a> {
        if self.guard().is_err() {
            return Node::nil(self.tree);
        }
        let d = self.record();
        if d.kind != Kind::Array {
            self.tree.latch(Error::Type);
            return Node::nil(self.tree);
        }
        if index >= d.len {
            self.tree.latch(Error::Data);
            return Node::nil(self.tree);
        }
        match d.value {
            NodeValue::Children(base) => Node::at(self.tree, base.offset(index)),
            _ => Node::nil(self.tree),
        }
    }

    // ── Maps ──────────────────────────────────────────────────────────

    pub fn map_count(&self) -> Result<u32> {
        self.guard()?;
        let d = self.record();
        if d.kind == Kind::Map {
            Ok(d.len)
        } else {
            Err(self.type_error())
        }
    }

    /// The key of pair `index`, in wire order.
    #[must_use]
    pub fn map_key_at(&self, index: u32) -> Node<'t, 'a> {
        self.map_at(index, 0)
    }

    /// The value of pair `index`, in wire order.
    #[must_use]
    pub fn map_value_at(&self, index: u32) -> Node<'t, 'a> {
        self.map_at(index, 1)
    }

    fn map_at(&self, index: u32, offset: u32) -> Node<'t, 'a> {
        if self.guard().is_err() {
            return Node::nil(self.tree);
        }
        let d = self.record();
        if d.kind != Kind::Map {
            self.tree.latch(Error::Type);
            return Node::nil(self.tree);
        }
        if index >= d.len {
            self.tree.latch(Error::Data);
            return Node::nil(self.tree);
        }
        match d.value {
            NodeValue::Children(base) => Node::at(self.tree, base.offset(index * 2 + offset)),
            _ => Node::nil(self.tree),
        }
    }

    /// Look up a signed integer key. Keys match across sign per tag
    /// equality, so `map_int(1)` finds a `uint` key of 1. A missing key
    /// latches `data`; a duplicate latches `data`.
    #[must_use]
    pub fn map_int(&self, key: i64) -> Node<'t, 'a> {
        self.lookup(|k| k.int_key_matches(key), false)
    }

    /// Optional variant: a missing key yields the missing sentinel and
    /// no error.
    #[must_use]
    pub fn map_int_optional(&self, key: i64) -> Node<'t, 'a> {
        self.lookup(|k| k.int_key_matches(key), true)
    }

    /// Look up an unsigned integer key.
    #[must_use]
    pub fn map_uint(&self, key: u64) -> Node<'t, 'a> {
        self.lookup(|k| k.uint_key_matches(key), false)
    }

    #[must_use]
    pub fn map_uint_optional(&self, key: u64) -> Node<'t, 'a> {
        self.lookup(|k| k.uint_key_matches(key), true)
    }

    /// Look up a string key by exact bytes.
    #[must_use]
    pub fn map_str(&self, key: &str) -> Node<'t, 'a> {
        self.lookup(|k| k.str_key_matches(key), false)
    }

    #[must_use]
    pub fn map_str_optional(&self, key: &str) -> Node<'t, 'a> {
        self.lookup(|k| k.str_key_matches(key), true)
    }

    pub fn map_contains_int(&self, key: i64) -> Result<bool> {
        let found = self.map_int_optional(key);
        self.guard()?;
        Ok(!found.is_missing())
    }

    pub fn map_contains_uint(&self, key: u64) -> Result<bool> {
        let found = self.map_uint_optional(key);
        self.guard()?;
        Ok(!found.is_missing())
    }

    pub fn map_contains_str(&self, key: &str) -> Result<bool> {
        let found = self.map_str_optional(key);
        self.guard()?;
        Ok(!found.is_missing())
    }

    fn int_key_matches(&self, key: i64) -> bool {
        match self.record().value {
            NodeValue::Int(i) => i == key,
            #[allow(clippy::cast_sign_loss)]
            NodeValue::Uint(u) => key >= 0 && u == key as u64,
            _ => false,
        }
    }

    fn uint_key_matches(&self, key: u64) -> bool {
        match self.record().value {
            NodeValue::Uint(u) => u == key,
            #[allow(clippy::cast_sign_loss)]
            NodeValue::Int(i) => i >= 0 && i as u64 == key,
            _ => false,
        }
    }

    fn str_key_matches(&self, key: &str) -> bool {
        self.record().kind == Kind::Str
            && self.payload().is_some_and(|bytes| bytes == key.as_bytes())
    }

    /// Linear scan over the map's keys. Exactly one match yields the
    /// paired value; two or more latch `data`; none latches `data`
    /// unless `optional`, which yields the missing sentinel instead.
    fn lookup(
        &self,
        matches: impl Fn(&Node<'t, 'a>) -> bool,
        optional: bool,
    ) -> Node<'t, 'a> {
        if self.guard().is_err() {
            return Node::nil(self.tree);
        }
        let d = self.record();
        if d.kind != Kind::Map {
            self.tree.latch(Error::Type);
            return Node::nil(self.tree);
        }
        let NodeValue::Children(base) = d.value else {
            return Node::nil(self.tree);
        };

        let mut found: Option<NodeId> = None;
        for i in 0..d.len {
            let key = Node::at(self.tree, base.offset(i * 2));
            if matches(&key) {
                if found.is_some() {
                    self.tree.latch(Error::Data);
                    return Node::nil(self.tree);
                }
                found = Some(base.offset(i * 2 + 1));
            }
        }

        match found {
            Some(id) => Node::at(self.tree, id),
            None if optional => Node::missing(self.tree),
            None => {
                self.tree.latch(Error::Data);
                Node::nil(self.tree)
            }
        }
    }

    // ── Payload access ────────────────────────────────────────────────

    /// Byte length of a str payload.
    pub fn str_len(&self) -> Result<u32> {
        self.guard()?;
        let d = self.record();
        if d.kind == Kind::Str {
            Ok(d.len)
        } else {
            Err(self.type_error())
        }
    }

    /// Byte length of a str, bin, or ext payload.
    pub fn data_len(&self) -> Result<u32> {
        self.guard()?;
        let d = self.record();
        match d.kind {
            Kind::Str | Kind::Bin | Kind::Ext => Ok(d.len),
            _ => Err(self.type_error()),
        }
    }

    /// The payload bytes of a str, bin, or ext value, zero-copy from
    /// the message data.
    pub fn bytes(&self) -> Result<&'t [u8]> {
        self.guard()?;
        match self.payload() {
            Some(bytes) => Ok(bytes),
            None => Err(self.type_error()),
        }
    }

    /// A str payload as UTF-8 text. Malformed UTF-8 latches `type`.
    pub fn as_str(&self) -> Result<&'t str> {
        self.guard()?;
        if self.record().kind != Kind::Str {
            return Err(self.type_error());
        }
        match self.payload() {
            Some(bytes) => match core::str::from_utf8(bytes) {
                Ok(s) => Ok(s),
                Err(_) => Err(self.type_error()),
            },
            None => Err(self.type_error()),
        }
    }

    /// [`Node::as_str`] additionally rejecting embedded NUL bytes.
    pub fn as_str_no_nul(&self) -> Result<&'t str> {
        let s = self.as_str()?;
        if s.as_bytes().contains(&0) {
            return Err(self.type_error());
        }
        Ok(s)
    }

    /// Copy the payload into `dst`, returning the byte count. A
    /// destination too small latches `too_big`.
    pub fn copy_data(&self, dst: &mut [u8]) -> Result<usize> {
        let bytes = self.bytes()?;
        if bytes.len() > dst.len() {
            return Err(self.tree.latch(Error::TooBig));
        }
        dst[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// True when the node is a str with valid UTF-8 payload. Never
    /// latches.
    #[must_use]
    pub fn check_utf8(&self) -> bool {
        self.tree.error().is_none()
            && self.record().kind == Kind::Str
            && self.payload().is_some_and(|b| core::str::from_utf8(b).is_ok())
    }

    /// [`Node::check_utf8`] additionally requiring no embedded NUL.
    #[must_use]
    pub fn check_utf8_no_nul(&self) -> bool {
        self.check_utf8() && self.payload().is_some_and(|b| !b.contains(&0))
    }

    /// Match a str payload against `options`, returning the index of
    /// the first match. A miss or a non-str node latches `type` and
    /// returns `options.len()`.
    #[must_use]
    pub fn enum_index(&self, options: &[&str]) -> usize {
        match self.enum_index_optional(options) {
            Some(i) => i,
            None => {
                self.tree.latch(Error::Type);
                options.len()
            }
        }
    }

    /// As [`Node::enum_index`], but a miss returns `None` without
    /// latching.
    #[must_use]
    pub fn enum_index_optional(&self, options: &[&str]) -> Option<usize> {
        if self.guard().is_err() || self.record().kind != Kind::Str {
            return None;
        }
        let bytes = self.payload()?;
        options.iter().position(|option| option.as_bytes() == bytes)
    }

    // ── Ext ───────────────────────────────────────────────────────────

    /// The signed 8-bit type code of an ext value.
    pub fn ext_type(&self) -> Result<i8> {
        self.guard()?;
        let d = self.record();
        match (d.kind, d.value) {
            (Kind::Ext, NodeValue::Offset(offset)) => {
                // The type byte always immediately precedes the payload.
                #[allow(clippy::cast_possible_wrap)]
                Ok(self.tree.data()[offset - 1] as i8)
            }
            _ => Err(self.type_error()),
        }
    }

    /// Decode an ext value of type −1 as a timestamp. A wrong payload
    /// length or out-of-range nanoseconds latches `invalid`.
    pub fn timestamp(&self) -> Result<Timestamp> {
        if self.ext_type()? != btf_types::TIMESTAMP_EXT_TYPE {
            return Err(self.type_error());
        }
        let payload = self.bytes()?;
        match Timestamp::from_wire_payload(payload) {
            Ok(ts) => Ok(ts),
            Err(e) => Err(self.tree.latch(e)),
        }
    }
}
