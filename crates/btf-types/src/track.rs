use crate::error::{Error, Result};
use crate::tag::Kind;

/// One open compound on the tracking stack.
#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: Kind,
    /// Remaining units: elements for arrays, key/value pairs for maps,
    /// payload bytes for str/bin/ext.
    left: u64,
    /// For maps: a key has been observed and its value has not.
    key_needs_value: bool,
}

/// Structural tracker enforcing compound balance on the streaming
/// surfaces.
///
/// Both the writer and the reader run every operation through a tracker:
/// opening a compound pushes a frame, each element or payload byte run
/// decrements the top frame, and closing pops it. Any mismatch (closing
/// the wrong kind, closing early, overrunning a declared count, writing
/// an element into a byte compound) is programmer misuse and latches
/// [`Error::Bug`] on the owning instance.
///
/// Map frames alternate between key and value positions: the pair
/// counter only decrements once the value has been observed, so a map
/// closed between a key and its value is caught.
#[derive(Debug, Default)]
pub struct Tracker {
    stack: Vec<Frame>,
}

impl Tracker {
    /// An empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Tracker { stack: Vec::new() }
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a compound. `count` is the element count for arrays, the
    /// pair count for maps, and the payload byte length for str, bin,
    /// and ext.
    pub fn push(&mut self, kind: Kind, count: u64) -> Result<()> {
        match kind {
            Kind::Array | Kind::Map | Kind::Str | Kind::Bin | Kind::Ext => {}
            _ => return Err(bug("push of a non-compound kind")),
        }
        self.stack.push(Frame {
            kind,
            left: count,
            key_needs_value: false,
        });
        Ok(())
    }

    /// Account for one element at the current position. A no-op at the
    /// top level; inside an array decrements the counter; inside a map
    /// alternates key → value, decrementing after the value.
    pub fn element(&mut self) -> Result<()> {
        self.element_impl(true)
    }

    /// The checks of [`Tracker::element`] without consuming the
    /// position, for peeked tags.
    pub fn peek_element(&mut self) -> Result<()> {
        self.element_impl(false)
    }

    fn element_impl(&mut self, consume: bool) -> Result<()> {
        let Some(top) = self.stack.last_mut() else {
            return Ok(());
        };
        match top.kind {
            Kind::Array => {
                if top.left == 0 {
                    return Err(bug("too many elements for the open array"));
                }
                if consume {
                    top.left -= 1;
                }
            }
            Kind::Map => {
                if top.key_needs_value {
                    if consume {
                        top.key_needs_value = false;
                        top.left -= 1;
                    }
                } else {
                    if top.left == 0 {
                        return Err(bug("too many pairs for the open map"));
                    }
                    if consume {
                        top.key_needs_value = true;
                    }
                }
            }
            _ => {
                return Err(bug("element written inside a byte compound"));
            }
        }
        Ok(())
    }

    /// Account for `n` payload bytes of the open str, bin, or ext.
    pub fn bytes(&mut self, n: u64) -> Result<()> {
        let Some(top) = self.stack.last_mut() else {
            return Err(bug("bytes written with no open compound"));
        };
        match top.kind {
            Kind::Str | Kind::Bin | Kind::Ext => {
                if top.left < n {
                    return Err(bug("more bytes than the compound declared"));
                }
                top.left -= n;
                Ok(())
            }
            _ => Err(bug("bytes written inside an element compound")),
        }
    }

    /// Close the open compound. The top of the stack must match `kind`
    /// with a fully consumed count, and a map must not be between a key
    /// and its value.
    pub fn pop(&mut self, kind: Kind) -> Result<()> {
        let Some(top) = self.stack.last() else {
            return Err(bug("close with no open compound"));
        };
        if top.kind != kind {
            return Err(bug("close kind does not match the open compound"));
        }
        if top.key_needs_value {
            return Err(bug("map closed between a key and its value"));
        }
        if top.left != 0 {
            return Err(bug("compound closed before its declared count"));
        }
        self.stack.pop();
        Ok(())
    }

    /// Verify nothing is left open. Checked when an instance finishes.
    pub fn check_empty(&self) -> Result<()> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(bug("compound still open at finish"))
        }
    }

}

fn bug(what: &'static str) -> Error {
    tracing::error!(what, "structural tracking violation");
    Error::Bug
}
