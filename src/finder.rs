//! Locating bases for sibling groups.

use crate::block::{self, Bitmap, Ring, BLOCK_SHIFT};
use crate::config::{BaseSearch, Config};
use crate::container::{slot_of, Container};
use crate::error::Result;
use crate::unit::NIL;

/// Slots of one block that must be treated as occupied even though they are
/// currently empty.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Reservation {
    pub block: u32,
    pub mask: Bitmap,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct BaseFinder {
    search: BaseSearch,
    /// A base may serve only one node (letter-check addressing).
    exclusive: bool,
}

impl BaseFinder {
    pub fn new(config: &Config) -> Self {
        Self {
            search: config.base_search,
            exclusive: config.addressing.exclusive_bases(),
        }
    }

    /// Returns a base at which every `base ^ c` is empty, expanding the
    /// container when no ring block can host the group.
    pub fn find(&self, c: &mut Container, chars: &[u8]) -> Result<u32> {
        debug_assert!(!chars.is_empty());

        // Single characters never compete with a multi-character group, so the
        // demoted blocks serve them first.
        if chars.len() == 1 {
            if let Some(head) = c.rings.personal {
                if let Some(base) = self.fit(c, head, chars, &[]) {
                    return Ok(base);
                }
            }
        }

        if let Some(head) = c.rings.general {
            let last = c.blocks[head as usize].prev;
            let mut cur = head;
            loop {
                let next = c.blocks[cur as usize].next;
                if let Some(base) = self.fit(c, cur, chars, &[]) {
                    c.error_reset(cur);
                    return Ok(base);
                }
                c.error(cur);
                if cur == last {
                    break;
                }
                cur = next;
            }
        }

        let b = c.expand()?;
        let first = b << BLOCK_SHIFT;
        Ok(if self.exclusive {
            first
        } else {
            first ^ chars[0] as u32
        })
    }

    /// First base inside block `b` that hosts `chars`, if any.
    pub fn fit(
        &self,
        c: &Container,
        b: u32,
        chars: &[u8],
        reserved: &[Reservation],
    ) -> Option<u32> {
        let blk = &c.blocks[b as usize];
        if (blk.num_empties as usize) < chars.len() {
            return None;
        }
        let mut empties = blk.empties;
        for r in reserved.iter().filter(|r| r.block == b) {
            empties = block::and_not(&empties, &r.mask);
        }
        let first = b << BLOCK_SHIFT;

        match self.search {
            BaseSearch::BitParallel => {
                let mut mask = block::candidates(&empties, chars);
                if self.exclusive {
                    mask = block::and_not(&mask, &blk.bases);
                }
                block::first_set(&mask).map(|x| first | x as u32)
            }
            BaseSearch::EmptyScan => {
                let head = blk.empty_head;
                if head == NIL {
                    return None;
                }
                let mut e = head;
                for _ in 0..blk.num_empties {
                    let x = slot_of(e) ^ chars[0];
                    let free_base = !self.exclusive || !block::test(&blk.bases, x);
                    if free_base && chars.iter().all(|&ch| block::test(&empties, x ^ ch)) {
                        return Some(first | x as u32);
                    }
                    e = match c.units[e as usize].links() {
                        Some((_, next)) => next,
                        None => break,
                    };
                    if e == head {
                        break;
                    }
                }
                None
            }
        }
    }

    /// First base in a block of `ring` below `limit` that hosts `chars`.
    /// Visits at most `budget` blocks and leaves their error counters alone.
    pub fn fit_in_ring(
        &self,
        c: &Container,
        ring: Ring,
        limit: u32,
        chars: &[u8],
        reserved: &[Reservation],
        budget: &mut usize,
    ) -> Option<u32> {
        for b in c.ring_iter(ring).filter(|&b| b < limit) {
            if *budget == 0 {
                return None;
            }
            *budget -= 1;
            if let Some(base) = self.fit(c, b, chars, reserved) {
                return Some(base);
            }
        }
        None
    }
}
