//! Insertion: growing, collision resolution and label forks.

use smallvec::SmallVec;

use super::{check_key, sym, DaTrie};
use crate::arena::RELAY_SIZE;
use crate::error::Result;
use crate::unit::{Target, NIL, ROOT, TERMINATOR};
use crate::value::Value;

impl<V: Value> DaTrie<V> {
    /// Inserts `key`, returning the previous value if the key was present.
    ///
    /// Fails on keys containing the reserved byte `0x00` and when the array or
    /// arena outgrows 32-bit indices.
    pub fn insert(&mut self, key: &[u8], value: V) -> Result<Option<V>> {
        check_key(key)?;
        let mut node = ROOT;
        let mut pos = 0usize;
        loop {
            let c = sym(key, pos);
            let next = match self.unit(node).child {
                Some(_) => self.transition(node, self.base_of(node), c),
                None => None,
            };
            let Some(next) = next else {
                let (slot, _) = self.insert_trans(node, c)?;
                self.make_leaf(slot, key, pos + 1, value)?;
                self.len += 1;
                return Ok(None);
            };
            pos += 1;
            match self.unit(next).target {
                Target::Edge { .. } => node = next,
                Target::Label {
                    offset,
                    suffix: true,
                } => {
                    let matched = if c == TERMINATOR {
                        Ok(offset)
                    } else {
                        self.match_suffix(offset, key, pos)
                    };
                    match matched {
                        Ok(value_at) => {
                            let old = self.arena.read_value(value_at);
                            self.arena.write_value(value_at, value);
                            return Ok(Some(old));
                        }
                        Err(m) => {
                            self.split_leaf(next, offset, key, pos, m, value)?;
                            self.len += 1;
                            return Ok(None);
                        }
                    }
                }
                Target::Label {
                    offset,
                    suffix: false,
                } => match self.match_inner(offset, key, pos) {
                    Ok(n) => {
                        pos += n;
                        node = next;
                    }
                    Err(m) => {
                        self.fork_inner(next, offset, key, pos, m, value)?;
                        self.len += 1;
                        return Ok(None);
                    }
                },
                Target::Empty { .. } => unreachable!("transition into empty unit {next}"),
            }
        }
    }

    /// Claims a child of `node` on `c`, resolving a collision if the slot is
    /// taken. Returns the new slot and `node`'s index after any relocation.
    fn insert_trans(&mut self, node: u32, c: u8) -> Result<(u32, u32)> {
        if self.unit(node).child.is_none() {
            let base = self.grow(node, &[c])?;
            return Ok((base ^ c as u32, node));
        }
        let mut node = node;
        let mut base = self.base_of(node);
        if !self.container.is_vacant(base ^ c as u32) {
            (node, base) = self.resolve(node, base, c)?;
        }
        self.claim(node, base, c);
        Ok((base ^ c as u32, node))
    }

    /// Frees `base ^ c` by moving whichever group has fewer children.
    /// Returns `node`'s (possibly new) index and its base.
    fn resolve(&mut self, node: u32, base: u32, c: u8) -> Result<(u32, u32)> {
        let next = base ^ c as u32;
        let owner = (self.config.addressing.owner_known() && next != ROOT)
            .then(|| self.unit(next).check);

        match owner {
            Some(q) if self.child_count(q) <= self.child_count(node) => {
                debug_assert_ne!(q, node);
                let chars = self.children(q);
                let new_base = self.finder.find(&mut self.container, &chars)?;
                let mut tracked = [node];
                self.relocate(q, new_base, &mut tracked);
                let node = tracked[0];
                Ok((node, self.base_of(node)))
            }
            _ => {
                let mut chars = self.children(node);
                chars.push(c);
                let new_base = self.finder.find(&mut self.container, &chars)?;
                self.relocate(node, new_base, &mut []);
                Ok((node, new_base))
            }
        }
    }

    /// Turns the claimed unit `slot` into a leaf for `key`, storing the key
    /// from `from` on as its suffix label.
    fn make_leaf(&mut self, slot: u32, key: &[u8], from: usize, value: V) -> Result<()> {
        let (offset, value_at) = if from > key.len() {
            let at = self.arena.append_fixed_value(V::WIDTH)?;
            (at, at)
        } else {
            let offset = self.arena.append_label(&key[from..])?;
            (offset, self.arena.append_fixed_value(V::WIDTH)?)
        };
        self.arena.write_value(value_at, value);
        let unit = self.unit_mut(slot);
        unit.child = None;
        unit.target = Target::Label {
            offset,
            suffix: true,
        };
        Ok(())
    }

    /// Splits the leaf `leaf`, whose suffix at `offset` first differs from the
    /// key at index `m` (key position `pos + m`).
    ///
    /// The matched part becomes single-child nodes (MP-trie) or one internal
    /// label (Patricia). The old leaf keeps its arena bytes and value slot; only
    /// its label start moves past the fork.
    fn split_leaf(
        &mut self,
        leaf: u32,
        offset: u32,
        key: &[u8],
        pos: usize,
        m: usize,
        value: V,
    ) -> Result<()> {
        let a = self.arena.read_byte(offset + m as u32);
        let b = sym(key, pos + m);
        debug_assert_ne!(a, b);

        let mut node = leaf;
        if self.config.variant.relay_labels() && m > 0 {
            let prefix: SmallVec<[u8; 32]> =
                SmallVec::from_slice(&self.arena.label(offset)[..m]);
            let entry = self.arena.append_relay_label(NIL, &prefix)?;
            self.unit_mut(leaf).target = Target::Label {
                offset: entry,
                suffix: false,
            };
        } else {
            self.unit_mut(leaf).target = Target::Edge { base: NIL };
            if !self.config.variant.relay_labels() {
                for j in 0..m as u32 {
                    let ch = self.arena.read_byte(offset + j);
                    let base = self.grow(node, &[ch])?;
                    node = base ^ ch as u32;
                }
            }
        }

        let base = self.grow(node, &[a, b])?;
        self.unit_mut(base ^ a as u32).target = Target::Label {
            offset: offset + m as u32 + 1,
            suffix: true,
        };
        self.make_leaf(base ^ b as u32, key, pos + m + 1, value)
    }

    /// Forks the internal label of `node` at index `m`.
    ///
    /// `node` keeps the matched prefix and gets a new relay base; the node on
    /// the old next character takes the rest of the label and the old relay.
    /// Whichever side is longer keeps the original arena bytes: a long prefix
    /// is truncated in place, a long rest is re-pointed in place by writing the
    /// old relay right before it.
    fn fork_inner(
        &mut self,
        node: u32,
        offset: u32,
        key: &[u8],
        pos: usize,
        m: usize,
        value: V,
    ) -> Result<()> {
        let relay = self.arena.read_u32(offset);
        let label: SmallVec<[u8; 32]> =
            SmallVec::from_slice(self.arena.label(offset + RELAY_SIZE));
        debug_assert!(m < label.len());
        let a = label[m];
        let b = sym(key, pos + m);
        let rest = &label[m + 1..];
        let keep_prefix = m >= rest.len();

        let upper = if m == 0 {
            Target::Edge { base: NIL }
        } else if keep_prefix {
            self.arena
                .write_byte(offset + RELAY_SIZE + m as u32, TERMINATOR);
            Target::Label {
                offset,
                suffix: false,
            }
        } else {
            Target::Label {
                offset: self.arena.append_relay_label(NIL, &label[..m])?,
                suffix: false,
            }
        };

        let lower = if rest.is_empty() {
            Target::Edge { base: relay }
        } else if keep_prefix {
            Target::Label {
                offset: self.arena.append_relay_label(relay, rest)?,
                suffix: false,
            }
        } else {
            let at = offset + m as u32 + 1;
            self.arena.write_u32(at, relay);
            Target::Label {
                offset: at,
                suffix: false,
            }
        };

        let grandchildren = self.unit(node).child;
        {
            let unit = self.unit_mut(node);
            unit.child = None;
            unit.target = upper;
        }
        let base = self.grow(node, &[a, b])?;

        let lower_node = base ^ a as u32;
        {
            let unit = self.unit_mut(lower_node);
            unit.target = lower;
            unit.child = grandchildren;
        }
        if self.config.addressing.owner_known() {
            for gc in self.children(lower_node) {
                self.unit_mut(relay ^ gc as u32).check = lower_node;
            }
        }
        self.make_leaf(base ^ b as u32, key, pos + m + 1, value)
    }
}
