//! Unit and block storage plus the two free rings threading the blocks.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::block::{self, Block, Ring, BLOCK_SHIFT, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::unit::{Target, Unit, NIL, ROOT};

/// Heads of the general and personal block rings.
///
/// Both rings are circular and doubly linked through `Block::prev`/`next`.
/// A pushed block becomes the new head.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FreeRings {
    pub general: Option<u32>,
    pub personal: Option<u32>,
}

impl FreeRings {
    #[inline]
    pub fn head(&self, ring: Ring) -> Option<u32> {
        match ring {
            Ring::General => self.general,
            Ring::Personal => self.personal,
        }
    }

    fn head_mut(&mut self, ring: Ring) -> &mut Option<u32> {
        match ring {
            Ring::General => &mut self.general,
            Ring::Personal => &mut self.personal,
        }
    }

    pub fn push(&mut self, blocks: &mut [Block], ring: Ring, b: u32) {
        debug_assert!(blocks[b as usize].ring.is_none());
        match self.head(ring) {
            None => {
                blocks[b as usize].prev = b;
                blocks[b as usize].next = b;
            }
            Some(head) => {
                let tail = blocks[head as usize].prev;
                blocks[b as usize].prev = tail;
                blocks[b as usize].next = head;
                blocks[tail as usize].next = b;
                blocks[head as usize].prev = b;
            }
        }
        blocks[b as usize].ring = Some(ring);
        *self.head_mut(ring) = Some(b);
    }

    /// Removes `b` from whichever ring holds it; no-op for full blocks.
    pub fn unlink(&mut self, blocks: &mut [Block], b: u32) {
        let Some(ring) = blocks[b as usize].ring else {
            return;
        };
        let (prev, next) = (blocks[b as usize].prev, blocks[b as usize].next);
        let head = self.head_mut(ring);
        if next == b {
            *head = None;
        } else {
            blocks[prev as usize].next = next;
            blocks[next as usize].prev = prev;
            if *head == Some(b) {
                *head = Some(next);
            }
        }
        let blk = &mut blocks[b as usize];
        blk.ring = None;
        blk.prev = NIL;
        blk.next = NIL;
    }

    /// Number of blocks in `ring`.
    pub fn count(&self, blocks: &[Block], ring: Ring) -> usize {
        let Some(head) = self.head(ring) else {
            return 0;
        };
        let mut n = 1;
        let mut cur = blocks[head as usize].next;
        while cur != head && n <= blocks.len() {
            n += 1;
            cur = blocks[cur as usize].next;
        }
        n
    }
}

#[inline]
pub(crate) fn block_of(i: u32) -> u32 {
    i >> BLOCK_SHIFT
}

#[inline]
pub(crate) fn slot_of(i: u32) -> u8 {
    (i & (BLOCK_SIZE as u32 - 1)) as u8
}

#[derive(Clone, Debug)]
pub(crate) struct Container {
    pub units: Vec<Unit>,
    pub blocks: Vec<Block>,
    pub rings: FreeRings,
    /// Empty slots over all blocks.
    free: usize,
    max_trials: u16,
}

impl Container {
    /// A container without any block; callers expand before use.
    pub fn new(max_trials: u16) -> Self {
        Self {
            units: Vec::new(),
            blocks: Vec::new(),
            rings: FreeRings::default(),
            free: 0,
            max_trials: max_trials.max(1),
        }
    }

    /// One block with the root unit claimed.
    pub fn with_root(max_trials: u16) -> Self {
        let mut c = Self::new(max_trials);
        c.push_block();
        c.acquire(ROOT);
        c
    }

    #[inline]
    pub fn num_units(&self) -> u32 {
        self.units.len() as u32
    }

    #[inline]
    pub fn num_blocks(&self) -> u32 {
        self.blocks.len() as u32
    }

    #[inline]
    pub fn max_trials(&self) -> u16 {
        self.max_trials
    }

    pub fn set_max_trials(&mut self, max_trials: u16) {
        self.max_trials = max_trials.max(1);
    }

    /// True for empty slots and for indices past the end.
    #[inline]
    pub fn is_vacant(&self, i: u32) -> bool {
        match self.blocks.get(block_of(i) as usize) {
            Some(blk) => block::test(&blk.empties, slot_of(i)),
            None => true,
        }
    }

    #[inline]
    pub fn num_free(&self) -> usize {
        self.free
    }

    pub fn num_occupied(&self) -> usize {
        self.units.len() - self.free
    }

    /// Blocks of `ring`, starting at its head.
    pub fn ring_iter(&self, ring: Ring) -> impl Iterator<Item = u32> + '_ {
        let head = self.rings.head(ring);
        let mut cur = head;
        std::iter::from_fn(move || {
            let b = cur?;
            let next = self.blocks[b as usize].next;
            cur = (Some(next) != head).then_some(next);
            Some(b)
        })
    }

    /// Appends a wholly empty block and returns its index.
    pub fn expand(&mut self) -> Result<u32> {
        let b = self.blocks.len() as u64;
        let end = (b + 1) * BLOCK_SIZE as u64;
        if end > NIL as u64 {
            return Err(Error::CapacityExceeded {
                what: "unit index",
                requested: end,
            });
        }
        Ok(self.push_block())
    }

    /// Appends a block; the caller has checked the index range.
    fn push_block(&mut self) -> u32 {
        let b = self.blocks.len() as u32;
        let first = b << BLOCK_SHIFT;
        let last = BLOCK_SIZE as u32 - 1;
        self.units.extend((0..BLOCK_SIZE as u32).map(|k| {
            let prev = first + (k + last) % BLOCK_SIZE as u32;
            let next = first + (k + 1) % BLOCK_SIZE as u32;
            Unit::empty(prev, next)
        }));
        self.blocks.push(Block::new(first));
        self.free += BLOCK_SIZE;
        self.rings.push(&mut self.blocks, Ring::General, b);
        tracing::trace!(block = b, units = self.units.len(), "expanded container");
        b
    }

    /// Drops the trailing block if it is wholly empty. Block 0 is never dropped.
    pub fn shrink(&mut self) -> bool {
        let Some(last) = self.blocks.len().checked_sub(1) else {
            return false;
        };
        if last == 0 || !self.blocks[last].is_vacant() {
            return false;
        }
        self.rings.unlink(&mut self.blocks, last as u32);
        self.blocks.pop();
        self.units.truncate(last * BLOCK_SIZE);
        self.free -= BLOCK_SIZE;
        tracing::trace!(block = last, units = self.units.len(), "shrank container");
        true
    }

    fn set_links(&mut self, i: u32, prev: Option<u32>, next: Option<u32>) {
        if let Target::Empty {
            prev: ref mut p,
            next: ref mut n,
        } = self.units[i as usize].target
        {
            if let Some(prev) = prev {
                *p = prev;
            }
            if let Some(next) = next {
                *n = next;
            }
        }
    }

    /// Claims the empty slot `i`, leaving a childless placeholder node there.
    pub fn acquire(&mut self, i: u32) {
        debug_assert!(self.is_vacant(i), "acquire of occupied unit {i}");
        let Some((prev, next)) = self.units[i as usize].links() else {
            return;
        };
        let b = block_of(i);
        if next == i {
            self.blocks[b as usize].empty_head = NIL;
        } else {
            self.set_links(prev, None, Some(next));
            self.set_links(next, Some(prev), None);
            if self.blocks[b as usize].empty_head == i {
                self.blocks[b as usize].empty_head = next;
            }
        }
        block::clear(&mut self.blocks[b as usize].empties, slot_of(i));
        self.units[i as usize] = Unit::node(NIL, 0);
        self.consume(b, 1);
    }

    /// Returns slot `i` to its block, next to the current empty head.
    pub fn release(&mut self, i: u32) {
        debug_assert!(!self.is_vacant(i), "release of empty unit {i}");
        let b = block_of(i);
        let blk = &self.blocks[b as usize];
        if blk.num_empties == 0 {
            self.units[i as usize] = Unit::empty(i, i);
        } else {
            let head = blk.empty_head;
            let before = self.units[head as usize].links().map_or(head, |(p, _)| p);
            self.units[i as usize] = Unit::empty(before, head);
            self.set_links(before, None, Some(i));
            self.set_links(head, Some(i), None);
        }
        let blk = &mut self.blocks[b as usize];
        blk.empty_head = i;
        block::set(&mut blk.empties, slot_of(i));
        self.refill(b, 1);
    }

    pub fn consume(&mut self, b: u32, n: u16) {
        let blk = &mut self.blocks[b as usize];
        debug_assert!(blk.num_empties >= n);
        blk.num_empties -= n;
        self.free -= n as usize;
        if blk.num_empties == 0 {
            self.rings.unlink(&mut self.blocks, b);
        }
    }

    pub fn refill(&mut self, b: u32, n: u16) {
        let blk = &mut self.blocks[b as usize];
        blk.num_empties += n;
        self.free += n as usize;
        // Freed slots may admit groups that failed here before.
        blk.errors = 0;
        if blk.ring != Some(Ring::General) {
            self.rings.unlink(&mut self.blocks, b);
            self.rings.push(&mut self.blocks, Ring::General, b);
        }
    }

    /// Records a failed search; demotes the block once the threshold is hit.
    pub fn error(&mut self, b: u32) {
        let blk = &mut self.blocks[b as usize];
        blk.errors = blk.errors.saturating_add(1);
        if blk.errors >= self.max_trials && blk.ring == Some(Ring::General) {
            self.rings.unlink(&mut self.blocks, b);
            self.rings.push(&mut self.blocks, Ring::Personal, b);
        }
    }

    pub fn error_reset(&mut self, b: u32) {
        self.blocks[b as usize].errors = 0;
    }

    /// Marks or clears slot `base` as a base in use (letter-check addressing).
    pub fn mark_base(&mut self, base: u32, used: bool) {
        if let Some(blk) = self.blocks.get_mut(block_of(base) as usize) {
            if used {
                block::set(&mut blk.bases, slot_of(base));
            } else {
                block::clear(&mut blk.bases, slot_of(base));
            }
        }
    }

    #[inline]
    pub fn base_in_use(&self, base: u32) -> bool {
        self.blocks
            .get(block_of(base) as usize)
            .is_some_and(|blk| block::test(&blk.bases, slot_of(base)))
    }

    pub fn shrink_buffers(&mut self) {
        self.units.shrink_to_fit();
        self.blocks.shrink_to_fit();
    }

    pub fn memory_usage(&self) -> usize {
        self.units.capacity() * std::mem::size_of::<Unit>()
            + self.blocks.capacity() * std::mem::size_of::<Block>()
    }

    pub fn serialized_size(&self) -> usize {
        4 + 4 + 8 + self.blocks.len() * Block::PACKED_SIZE + 8 + self.units.len() * Unit::PACKED_SIZE
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.rings.general.unwrap_or(NIL))?;
        w.write_u32::<LittleEndian>(self.rings.personal.unwrap_or(NIL))?;
        w.write_u64::<LittleEndian>(self.blocks.len() as u64)?;
        for blk in &self.blocks {
            blk.write_to(w)?;
        }
        w.write_u64::<LittleEndian>(self.units.len() as u64)?;
        for unit in &self.units {
            unit.write_to(w)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R, max_trials: u16) -> Result<Self> {
        let head = |v: u32| (v != NIL).then_some(v);
        let general = head(r.read_u32::<LittleEndian>()?);
        let personal = head(r.read_u32::<LittleEndian>()?);
        let num_blocks = r.read_u64::<LittleEndian>()?;
        if num_blocks * BLOCK_SIZE as u64 > NIL as u64 {
            return Err(Error::CapacityExceeded {
                what: "unit index",
                requested: num_blocks * BLOCK_SIZE as u64,
            });
        }
        let blocks = (0..num_blocks)
            .map(|_| Block::read_from(r))
            .collect::<std::io::Result<Vec<_>>>()?;
        let num_units = r.read_u64::<LittleEndian>()?;
        if num_units != num_blocks * BLOCK_SIZE as u64 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "unit count does not match block count",
            )));
        }
        let units = (0..num_units)
            .map(|_| Unit::read_from(r))
            .collect::<std::io::Result<Vec<_>>>()?;
        let free = blocks.iter().map(|b| b.num_empties as usize).sum();
        Ok(Self {
            units,
            blocks,
            rings: FreeRings { general, personal },
            free,
            max_trials: max_trials.max(1),
        })
    }
}
