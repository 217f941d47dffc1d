//! The double-array trie engine.
//!
//! Every node is a unit of the [`Container`]. A node's outgoing transition on
//! `c` lands at `base ^ c` and is valid when the unit there is occupied and its
//! `check` matches (the parent index, or `c` itself with letter-check
//! addressing). Keys are implicitly closed by [`TERMINATOR`]; the unit reached
//! through it, or any unit whose remaining key is stored as a suffix label, is
//! a leaf owning a value slot in the [`Arena`].

mod erase;
mod insert;
mod io;
mod iter;
mod validate;

use std::fmt;
use std::marker::PhantomData;

use smallvec::SmallVec;

use crate::arena::{Arena, RELAY_SIZE};
use crate::block::Ring;
use crate::config::{Config, SiblingOrder};
use crate::container::Container;
use crate::error::{Error, Result};
use crate::finder::BaseFinder;
use crate::unit::{Target, Unit, NIL, ROOT, TERMINATOR};
use crate::value::Value;

pub use iter::Iter;

/// Child characters of one node, in chain order.
pub(crate) type Siblings = SmallVec<[u8; 16]>;

/// Size and occupancy figures of a trie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrieStats {
    pub num_keys: usize,
    pub num_units: usize,
    pub num_occupied: usize,
    pub num_blocks: usize,
    pub arena_bytes: usize,
    pub general_blocks: usize,
    pub personal_blocks: usize,
}

/// Character `pos` of the terminated key `key ‖ 0`.
#[inline]
pub(crate) fn sym(key: &[u8], pos: usize) -> u8 {
    key.get(pos).copied().unwrap_or(TERMINATOR)
}

/// A mutable dictionary from byte strings to fixed-width values.
///
/// ```rust
/// use dat_rs::DaTrie;
///
/// let mut t: DaTrie<u32> = DaTrie::new();
/// t.insert(b"hello", 1).unwrap();
/// t.insert(b"help", 2).unwrap();
///
/// assert_eq!(t.get(b"hello"), Some(1));
/// assert_eq!(t.get(b"hel"), None);
/// ```
#[derive(Clone)]
pub struct DaTrie<V: Value = ()> {
    container: Container,
    arena: Arena,
    config: Config,
    finder: BaseFinder,
    len: usize,
    _marker: PhantomData<V>,
}

impl<V: Value> DaTrie<V> {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::from_parts(
            Container::with_root(config.max_trials),
            Arena::new(),
            config,
            0,
        )
    }

    fn from_parts(mut container: Container, arena: Arena, config: Config, len: usize) -> Self {
        container.set_max_trials(config.max_trials);
        Self {
            container,
            arena,
            finder: BaseFinder::new(&config),
            config,
            len,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get(&self, key: &[u8]) -> Option<V> {
        self.locate(key, |_, _| {})
            .map(|(_, value_at)| self.arena.read_value(value_at))
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.locate(key, |_, _| {}).is_some()
    }

    /// Removes every key, keeping the configuration.
    pub fn clear(&mut self) {
        *self = Self::with_config(self.config.clone());
    }

    pub fn stats(&self) -> TrieStats {
        let c = &self.container;
        TrieStats {
            num_keys: self.len,
            num_units: c.units.len(),
            num_occupied: c.num_occupied(),
            num_blocks: c.blocks.len(),
            arena_bytes: self.arena.len(),
            general_blocks: c.rings.count(&c.blocks, Ring::General),
            personal_blocks: c.rings.count(&c.blocks, Ring::Personal),
        }
    }

    /// Bytes written by [`write_to`](Self::write_to).
    pub fn size_in_bytes(&self) -> usize {
        self.container.serialized_size() + 8 + self.arena.len()
    }

    /// Heap bytes currently reserved.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.container.memory_usage() + self.arena.capacity()
    }

    /// Rebuilds the trie by re-inserting every key in key order.
    ///
    /// The rebuilt instance replaces this one only when it is no larger.
    /// Returns whether the swap happened.
    pub fn rebuild(&mut self) -> Result<bool> {
        let fresh = self.rebuilt(self.config.clone())?;
        let (before, after) = (self.size_in_bytes(), fresh.size_in_bytes());
        let swap = after <= before;
        if swap {
            *self = fresh;
        }
        tracing::debug!(before, after, swapped = swap, "rebuilt trie");
        Ok(swap)
    }

    /// Rebuilds the trie under a new configuration. Always swaps.
    pub fn rebuild_with(&mut self, config: Config) -> Result<()> {
        let fresh = self.rebuilt(config)?;
        tracing::debug!(
            before = self.size_in_bytes(),
            after = fresh.size_in_bytes(),
            "rebuilt trie with new configuration"
        );
        *self = fresh;
        Ok(())
    }

    /// Drops arena blank space and unused blocks through a rebuild, then
    /// releases spare buffer capacity.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.rebuild()?;
        self.container.shrink_buffers();
        self.arena.shrink_to_fit();
        Ok(())
    }

    /// Rebuilds with a higher error threshold so that fewer blocks are demoted
    /// while placing sibling groups.
    pub fn defragment(&mut self, max_trials: u16) -> Result<()> {
        let config = self.config.clone().with_max_trials(max_trials);
        self.rebuild_with(config)
    }

    fn rebuilt(&self, config: Config) -> Result<Self> {
        let mut entries: Vec<(Vec<u8>, V)> = self.iter().collect();
        if self.config.sibling_order != SiblingOrder::Sorted {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
        }
        let mut fresh = Self::with_config(config);
        for (key, value) in entries {
            fresh.insert(&key, value)?;
        }
        Ok(fresh)
    }

    // =========================================================================
    // Unit access
    // =========================================================================

    #[inline]
    fn unit(&self, i: u32) -> &Unit {
        &self.container.units[i as usize]
    }

    #[inline]
    fn unit_mut(&mut self, i: u32) -> &mut Unit {
        &mut self.container.units[i as usize]
    }

    /// Base of `node`'s children; `NIL` for leaves and fresh nodes.
    #[inline]
    fn base_of(&self, node: u32) -> u32 {
        match self.unit(node).target {
            Target::Edge { base } => base,
            Target::Label {
                offset,
                suffix: false,
            } => self.arena.read_u32(offset),
            _ => NIL,
        }
    }

    fn set_base(&mut self, node: u32, base: u32) {
        match self.unit(node).target {
            Target::Label {
                offset,
                suffix: false,
            } => self.arena.write_u32(offset, base),
            Target::Edge { .. } => self.unit_mut(node).target = Target::Edge { base },
            target => debug_assert!(false, "unit {node} cannot hold a base: {target:?}"),
        }
        if self.config.addressing.exclusive_bases() {
            self.container.mark_base(base, true);
        }
    }

    /// Child of `node` on `c`, given `node`'s base.
    #[inline]
    fn transition(&self, node: u32, base: u32, c: u8) -> Option<u32> {
        let next = base ^ c as u32;
        if self.container.is_vacant(next) {
            return None;
        }
        (self.unit(next).check == self.config.addressing.check_value(node, c)).then_some(next)
    }

    fn children(&self, node: u32) -> Siblings {
        let mut out = Siblings::new();
        let Some(mut c) = self.unit(node).child else {
            return out;
        };
        let base = self.base_of(node);
        loop {
            out.push(c);
            let s = self.unit(base ^ c as u32).sibling;
            if s == c || out.len() >= 256 {
                break;
            }
            c = s;
        }
        out
    }

    fn child_count(&self, node: u32) -> usize {
        self.count_children(node, 256)
    }

    /// Children of `node`, counting no further than `cap`.
    fn count_children(&self, node: u32, cap: usize) -> usize {
        let Some(mut c) = self.unit(node).child else {
            return 0;
        };
        let base = self.base_of(node);
        let mut n = 1;
        loop {
            let s = self.unit(base ^ c as u32).sibling;
            if s == c || n >= cap {
                return n;
            }
            n += 1;
            c = s;
        }
    }

    // =========================================================================
    // Label matching
    // =========================================================================

    /// Value slot of a leaf reached on `c` whose label starts at `offset`.
    #[inline]
    fn leaf_value_at(&self, offset: u32, c: u8) -> u32 {
        if c == TERMINATOR {
            offset
        } else {
            offset + self.arena.label(offset).len() as u32 + 1
        }
    }

    /// Compares the suffix label at `offset` with the terminated key from
    /// `pos`. `Ok` carries the value slot, `Err` the mismatch index.
    fn match_suffix(&self, offset: u32, key: &[u8], pos: usize) -> std::result::Result<u32, usize> {
        let mut j = 0usize;
        loop {
            let b = self.arena.read_byte(offset + j as u32);
            if b != sym(key, pos + j) {
                return Err(j);
            }
            if b == TERMINATOR {
                return Ok(offset + j as u32 + 1);
            }
            j += 1;
        }
    }

    /// Compares the internal label at `offset` with the key from `pos`. `Ok`
    /// carries the label length, `Err` the mismatch index.
    fn match_inner(&self, offset: u32, key: &[u8], pos: usize) -> std::result::Result<usize, usize> {
        let label = self.arena.label(offset + RELAY_SIZE);
        for (j, &b) in label.iter().enumerate() {
            if sym(key, pos + j) != b {
                return Err(j);
            }
        }
        Ok(label.len())
    }

    /// Walks `key` to its leaf, reporting every `(node, char)` step taken.
    /// Returns the leaf and its value slot.
    fn locate(&self, key: &[u8], mut step: impl FnMut(u32, u8)) -> Option<(u32, u32)> {
        if key.contains(&TERMINATOR) {
            return None;
        }
        let mut node = ROOT;
        let mut pos = 0usize;
        loop {
            self.unit(node).child?;
            let c = sym(key, pos);
            let next = self.transition(node, self.base_of(node), c)?;
            step(node, c);
            pos += 1;
            match self.unit(next).target {
                Target::Edge { .. } => node = next,
                Target::Label {
                    offset,
                    suffix: true,
                } => {
                    if c == TERMINATOR {
                        return Some((next, offset));
                    }
                    return self.match_suffix(offset, key, pos).ok().map(|v| (next, v));
                }
                Target::Label {
                    offset,
                    suffix: false,
                } => {
                    pos += self.match_inner(offset, key, pos).ok()?;
                    node = next;
                }
                Target::Empty { .. } => return None,
            }
        }
    }

    // =========================================================================
    // Sibling chains
    // =========================================================================

    /// Links the freshly claimed child `c` (at `base ^ c`) into `node`'s chain.
    fn link_child(&mut self, node: u32, base: u32, c: u8) {
        let slot = base ^ c as u32;
        let Some(head) = self.unit(node).child else {
            self.unit_mut(node).child = Some(c);
            return;
        };
        match self.config.sibling_order {
            SiblingOrder::Sorted if c < head => {
                self.unit_mut(slot).sibling = head;
                self.unit_mut(node).child = Some(c);
            }
            SiblingOrder::Sorted => {
                let mut cur = head;
                loop {
                    let s = self.unit(base ^ cur as u32).sibling;
                    if s == cur {
                        self.unit_mut(base ^ cur as u32).sibling = c;
                        break;
                    }
                    if s > c {
                        self.unit_mut(slot).sibling = s;
                        self.unit_mut(base ^ cur as u32).sibling = c;
                        break;
                    }
                    cur = s;
                }
            }
            SiblingOrder::Insertion => {
                let mut cur = head;
                loop {
                    let s = self.unit(base ^ cur as u32).sibling;
                    if s == cur {
                        self.unit_mut(base ^ cur as u32).sibling = c;
                        break;
                    }
                    cur = s;
                }
            }
        }
    }

    /// Removes `c` from `node`'s chain. Returns whether `node` is now childless.
    fn unlink_child(&mut self, node: u32, c: u8) -> bool {
        let base = self.base_of(node);
        let next = self.unit(base ^ c as u32).sibling;
        let Some(head) = self.unit(node).child else {
            return true;
        };
        if head == c {
            self.unit_mut(node).child = (next != c).then_some(next);
        } else {
            let mut cur = head;
            loop {
                let s = self.unit(base ^ cur as u32).sibling;
                if s == c {
                    self.unit_mut(base ^ cur as u32).sibling = if next == c { cur } else { next };
                    break;
                }
                if s == cur {
                    debug_assert!(false, "char {c} not in chain of unit {node}");
                    break;
                }
                cur = s;
            }
        }
        let childless = self.unit(node).child.is_none();
        if childless && self.config.addressing.exclusive_bases() {
            self.container.mark_base(base, false);
        }
        childless
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Claims `base ^ c` as a new child of `node`.
    fn claim(&mut self, node: u32, base: u32, c: u8) {
        let slot = base ^ c as u32;
        self.container.acquire(slot);
        let check = self.config.addressing.check_value(node, c);
        *self.unit_mut(slot) = Unit::node(check, c);
        self.link_child(node, base, c);
    }

    /// Gives the childless `node` a fresh base hosting `chars` and claims them.
    fn grow(&mut self, node: u32, chars: &[u8]) -> Result<u32> {
        debug_assert!(self.unit(node).child.is_none());
        let base = self.finder.find(&mut self.container, chars)?;
        self.set_base(node, base);
        for &c in chars {
            self.claim(node, base, c);
        }
        Ok(base)
    }

    /// Moves all children of `p` to `new_base`, whose slots must be empty.
    /// Entries of `tracked` naming a moved unit are rewritten to its new index.
    fn relocate(&mut self, p: u32, new_base: u32, tracked: &mut [u32]) {
        let old_base = self.base_of(p);
        let chars = self.children(p);
        let owner_known = self.config.addressing.owner_known();
        for &ch in &chars {
            let from = old_base ^ ch as u32;
            let to = new_base ^ ch as u32;
            self.container.acquire(to);
            let unit = *self.unit(from);
            *self.unit_mut(to) = unit;
            if owner_known && unit.child.is_some() {
                let grand_base = self.base_of(to);
                for gc in self.children(to) {
                    self.unit_mut(grand_base ^ gc as u32).check = to;
                }
            }
            for t in tracked.iter_mut() {
                if *t == from {
                    *t = to;
                }
            }
            self.container.release(from);
        }
        if self.config.addressing.exclusive_bases() {
            self.container.mark_base(old_base, false);
        }
        self.set_base(p, new_base);
        tracing::trace!(
            parent = p,
            from = old_base,
            to = new_base,
            children = chars.len(),
            "relocated sibling group"
        );
    }
}

impl<V: Value> Default for DaTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Value> fmt::Debug for DaTrie<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaTrie")
            .field("len", &self.len)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<V: Value> DaTrie<V> {
    /// Inserts every pair, stopping at the first one that cannot be stored.
    /// Pairs before it stay inserted.
    pub fn try_extend<K, I>(&mut self, iter: I) -> Result<()>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in iter {
            self.insert(key.as_ref(), value)?;
        }
        Ok(())
    }

    /// Fallible counterpart of [`FromIterator`].
    pub fn try_from_iter<K, I>(iter: I) -> Result<Self>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut t = Self::new();
        t.try_extend(iter)?;
        Ok(t)
    }
}

impl<K: AsRef<[u8]>, V: Value> Extend<(K, V)> for DaTrie<V> {
    /// Panics if a key contains the reserved byte or the trie outgrows its
    /// index type; [`DaTrie::try_extend`] returns those errors instead.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        if let Err(e) = self.try_extend(iter) {
            panic!("DaTrie::extend: {e}");
        }
    }
}

impl<K: AsRef<[u8]>, V: Value> FromIterator<(K, V)> for DaTrie<V> {
    /// Panics like [`Extend`]; see [`DaTrie::try_from_iter`].
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut t = Self::new();
        t.extend(iter);
        t
    }
}

/// Rejects keys containing the terminator.
pub(crate) fn check_key(key: &[u8]) -> Result<()> {
    match key.iter().position(|&b| b == TERMINATOR) {
        Some(position) => Err(Error::ReservedByte { position }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Addressing, BaseSearch, Variant};

    fn all_configs() -> Vec<Config> {
        let mut out = Vec::new();
        for variant in [Variant::MpTrie, Variant::Patricia] {
            for addressing in [Addressing::ParentCheck, Addressing::LetterCheck] {
                for order in [SiblingOrder::Sorted, SiblingOrder::Insertion] {
                    out.push(
                        Config::default()
                            .with_variant(variant)
                            .with_addressing(addressing)
                            .with_sibling_order(order),
                    );
                }
            }
        }
        out.push(Config::default().with_base_search(BaseSearch::EmptyScan));
        out.push(Config::patricia().with_base_search(BaseSearch::EmptyScan));
        out
    }

    #[test]
    fn test_basic() {
        for config in all_configs() {
            let mut t: DaTrie<u64> = DaTrie::with_config(config.clone());
            t.insert(b"hello", 1).unwrap();
            t.insert(b"world", 2).unwrap();
            assert_eq!(t.get(b"hello"), Some(1), "{config:?}");
            assert_eq!(t.get(b"world"), Some(2));
            assert_eq!(t.get(b"missing"), None);
            assert_eq!(t.get(b"hell"), None);
            assert_eq!(t.get(b"helloo"), None);
            assert_eq!(t.len(), 2);
            t.validate().unwrap();
        }
    }

    #[test]
    fn test_update() {
        for config in all_configs() {
            let mut t: DaTrie<u64> = DaTrie::with_config(config);
            assert_eq!(t.insert(b"key", 1).unwrap(), None);
            assert_eq!(t.insert(b"key", 2).unwrap(), Some(1));
            assert_eq!(t.get(b"key"), Some(2));
            assert_eq!(t.len(), 1);
        }
    }

    #[test]
    fn test_empty_key() {
        for config in all_configs() {
            let mut t: DaTrie<u32> = DaTrie::with_config(config);
            assert_eq!(t.get(b""), None);
            t.insert(b"a", 1).unwrap();
            assert_eq!(t.get(b""), None);
            t.insert(b"", 7).unwrap();
            assert_eq!(t.get(b""), Some(7));
            assert_eq!(t.get(b"a"), Some(1));
            assert_eq!(t.remove(b""), Some(7));
            assert_eq!(t.get(b""), None);
            assert_eq!(t.get(b"a"), Some(1));
            t.validate().unwrap();
        }
    }

    #[test]
    fn test_reserved_byte() {
        let mut t: DaTrie<u32> = DaTrie::new();
        let err = t.insert(b"ab\0c", 1).unwrap_err();
        assert!(matches!(err, Error::ReservedByte { position: 2 }));
        assert!(t.is_empty());
        assert_eq!(t.get(b"ab\0c"), None);
        assert_eq!(t.remove(b"\0"), None);
    }

    #[test]
    fn test_prefix_keys() {
        for config in all_configs() {
            let mut t: DaTrie<u32> = DaTrie::with_config(config.clone());
            let keys: [&[u8]; 6] = [b"a", b"ab", b"abc", b"abcd", b"abd", b"b"];
            for (i, k) in keys.iter().enumerate() {
                t.insert(k, i as u32).unwrap();
                t.validate().unwrap();
            }
            for (i, k) in keys.iter().enumerate() {
                assert_eq!(t.get(k), Some(i as u32), "{config:?} {k:?}");
            }
            assert_eq!(t.get(b"abcde"), None);
            assert_eq!(t.get(b"ac"), None);
        }
    }

    #[test]
    fn test_stats_and_sizes() {
        let mut t: DaTrie<u32> = DaTrie::new();
        assert_eq!(t.stats().num_occupied, 1);
        for i in 0..100u32 {
            t.insert(format!("key{i}").as_bytes(), i).unwrap();
        }
        let s = t.stats();
        assert_eq!(s.num_keys, 100);
        assert_eq!(s.num_units, s.num_blocks * 256);
        assert!(s.num_occupied > 100);
        assert!(s.arena_bytes > 0);
        assert!(t.size_in_bytes() > s.arena_bytes);
        assert!(t.memory_usage() > 0);
    }

    #[test]
    fn test_rebuild_keeps_contents() {
        for config in all_configs() {
            let mut t: DaTrie<u32> = DaTrie::with_config(config);
            for i in 0..300u32 {
                t.insert(format!("k{}", i * 7919 % 1000).as_bytes(), i).unwrap();
            }
            for i in (0..300u32).step_by(3) {
                t.remove(format!("k{}", i * 7919 % 1000).as_bytes());
            }
            let before: Vec<_> = {
                let mut v: Vec<_> = t.iter().collect();
                v.sort();
                v
            };
            let size = t.size_in_bytes();
            t.rebuild().unwrap();
            assert!(t.size_in_bytes() <= size);
            let mut after: Vec<_> = t.iter().collect();
            after.sort();
            assert_eq!(before, after);
            t.validate().unwrap();
        }
    }

    #[test]
    fn test_rebuild_with_switches_variant() {
        let mut t: DaTrie<u32> = [("alpha", 1u32), ("alphabet", 2), ("beta", 3)]
            .into_iter()
            .collect();
        t.rebuild_with(Config::patricia()).unwrap();
        assert_eq!(t.config().variant, Variant::Patricia);
        assert_eq!(t.get(b"alphabet"), Some(2));
        t.defragment(4).unwrap();
        assert_eq!(t.config().max_trials, 4);
        assert_eq!(t.len(), 3);
        t.shrink_to_fit().unwrap();
        assert_eq!(t.get(b"beta"), Some(3));
        t.validate().unwrap();
    }

    #[test]
    fn test_clear_and_clone() {
        let mut t: DaTrie<u8> = DaTrie::new();
        t.insert(b"x", 1).unwrap();
        let copy = t.clone();
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.get(b"x"), None);
        assert_eq!(copy.get(b"x"), Some(1));
        assert!(format!("{copy:?}").contains("DaTrie"));
    }

    #[test]
    fn test_try_extend_reports_reserved_byte() {
        let mut t: DaTrie<u8> = DaTrie::new();
        let err = t
            .try_extend([(&b"ok"[..], 1), (&b"bad\0key"[..], 2), (&b"never"[..], 3)])
            .unwrap_err();
        assert!(matches!(err, Error::ReservedByte { position: 3 }));
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(b"ok"), Some(1));
        assert_eq!(t.get(b"never"), None);

        let err = DaTrie::<()>::try_from_iter([(b"\0".to_vec(), ())]).unwrap_err();
        assert!(matches!(err, Error::ReservedByte { position: 0 }));
        let t = DaTrie::<u8>::try_from_iter([("x", 1), ("y", 2)]).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(b"y"), Some(2));
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn test_extend_panics_on_reserved_byte() {
        let mut t: DaTrie<()> = DaTrie::new();
        t.extend([(b"a\0".to_vec(), ())]);
    }
}
