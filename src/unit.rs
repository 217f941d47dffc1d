//! Per-slot records of the double array.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Sentinel index ("no unit", "no block", the root's parent).
pub(crate) const NIL: u32 = u32::MAX;

/// Index of the root unit. It is claimed at construction and never moves.
pub(crate) const ROOT: u32 = 0;

/// Reserved character closing every key; only leaves hang off it.
pub(crate) const TERMINATOR: u8 = 0;

/// What a unit's `target` field means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    /// Free slot, linked into its block's empty ring.
    Empty { prev: u32, next: u32 },
    /// Plain node; children live at `base ^ c`.
    Edge { base: u32 },
    /// Node carrying an arena label. A suffix label is followed by the value
    /// slot. An internal label starts with a 4-byte relay base.
    Label { offset: u32, suffix: bool },
}

// Packed `kind` values (flags bits 1..=2).
const KIND_EMPTY: u8 = 0;
const KIND_EDGE: u8 = 1;
const KIND_SUFFIX: u8 = 2;
const KIND_INTERNAL: u8 = 3;

const FLAG_HAS_CHILD: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Unit {
    /// Parent index or own edge character, depending on addressing.
    pub check: u32,
    /// Next sibling character; equal to the unit's own character at the end
    /// of the chain.
    pub sibling: u8,
    /// First child character.
    pub child: Option<u8>,
    pub target: Target,
}

impl Unit {
    /// Bytes per unit in the serialized image.
    pub const PACKED_SIZE: usize = 4 + 4 + 1 + 1 + 1;

    #[inline]
    pub fn empty(prev: u32, next: u32) -> Self {
        Self {
            check: NIL,
            sibling: 0,
            child: None,
            target: Target::Empty { prev, next },
        }
    }

    /// A freshly claimed, childless node.
    #[inline]
    pub fn node(check: u32, c: u8) -> Self {
        Self {
            check,
            sibling: c,
            child: None,
            target: Target::Edge { base: NIL },
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.target, Target::Label { suffix: true, .. })
    }

    /// Empty-ring links; `None` for occupied units.
    #[inline]
    pub fn links(&self) -> Option<(u32, u32)> {
        match self.target {
            Target::Empty { prev, next } => Some((prev, next)),
            _ => None,
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let (check, target, kind) = match self.target {
            Target::Empty { prev, next } => (prev, next, KIND_EMPTY),
            Target::Edge { base } => (self.check, base, KIND_EDGE),
            Target::Label {
                offset,
                suffix: true,
            } => (self.check, offset, KIND_SUFFIX),
            Target::Label {
                offset,
                suffix: false,
            } => (self.check, offset, KIND_INTERNAL),
        };
        let mut flags = kind << 1;
        if self.child.is_some() {
            flags |= FLAG_HAS_CHILD;
        }
        w.write_u32::<LittleEndian>(check)?;
        w.write_u32::<LittleEndian>(target)?;
        w.write_u8(self.sibling)?;
        w.write_u8(self.child.unwrap_or(0))?;
        w.write_u8(flags)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let check = r.read_u32::<LittleEndian>()?;
        let target = r.read_u32::<LittleEndian>()?;
        let sibling = r.read_u8()?;
        let child = r.read_u8()?;
        let flags = r.read_u8()?;
        let child = (flags & FLAG_HAS_CHILD != 0).then_some(child);
        let unit = match (flags >> 1) & 0b11 {
            KIND_EMPTY => Unit::empty(check, target),
            kind => Unit {
                check,
                sibling,
                child,
                target: match kind {
                    KIND_EDGE => Target::Edge { base: target },
                    KIND_SUFFIX => Target::Label {
                        offset: target,
                        suffix: true,
                    },
                    _ => Target::Label {
                        offset: target,
                        suffix: false,
                    },
                },
            },
        };
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(u: Unit) -> Unit {
        let mut buf = Vec::new();
        u.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), Unit::PACKED_SIZE);
        Unit::read_from(&mut buf.as_slice()).unwrap()
    }

    #[test]
    fn test_packed_kinds() {
        let empty = Unit::empty(3, 9);
        assert_eq!(round_trip(empty), empty);

        let mut edge = Unit::node(17, b'a');
        edge.child = Some(0);
        edge.target = Target::Edge { base: 512 };
        assert_eq!(round_trip(edge), edge);

        let internal = Unit {
            check: 4,
            sibling: b'z',
            child: Some(b'q'),
            target: Target::Label {
                offset: 40,
                suffix: false,
            },
        };
        assert_eq!(round_trip(internal), internal);
    }

    #[test]
    fn test_leaf_without_child() {
        let leaf = Unit {
            check: 1,
            sibling: b'c',
            child: None,
            target: Target::Label {
                offset: 8,
                suffix: true,
            },
        };
        let back = round_trip(leaf);
        assert!(back.is_leaf());
        assert_eq!(back.child, None);
        assert_eq!(back.links(), None);
    }

    #[test]
    fn test_truncated_stream() {
        let mut buf = Vec::new();
        Unit::empty(1, 2).write_to(&mut buf).unwrap();
        buf.pop();
        assert!(Unit::read_from(&mut buf.as_slice()).is_err());
    }
}
