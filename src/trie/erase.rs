//! Deletion and post-deletion compaction.

use smallvec::{smallvec, SmallVec};

use super::DaTrie;
use crate::block::{self, Bitmap, Ring, BLOCK_SHIFT, BLOCK_SIZE};
use crate::container::{block_of, slot_of};
use crate::finder::Reservation;
use crate::unit::ROOT;
use crate::value::Value;

/// Blocks and alignments examined while planning one compression.
const PLAN_BUDGET: usize = 256;

/// Displaced groups may in turn displace others, down to this depth.
const MAX_DISPLACEMENT_DEPTH: usize = 3;

/// Group moves for one compression. Nothing moves until every displaced
/// group has a home.
struct Plan {
    /// Owners whose groups may not be displaced.
    pinned: SmallVec<[u32; 8]>,
    reserved: Vec<Reservation>,
    /// `(owner, new base)` in execution order.
    moves: SmallVec<[(u32, u32); 8]>,
    budget: usize,
}

impl Plan {
    fn new(owner: u32) -> Self {
        Self {
            pinned: smallvec![owner],
            reserved: Vec::new(),
            moves: SmallVec::new(),
            budget: PLAN_BUDGET,
        }
    }

    fn spend(&mut self) -> bool {
        if self.budget == 0 {
            return false;
        }
        self.budget -= 1;
        true
    }

    fn reserve(&mut self, base: u32, chars: &[u8]) {
        self.reserved.push(Reservation {
            block: block_of(base),
            mask: group_mask(slot_of(base), chars),
        });
    }

    fn mark(&self) -> (usize, usize, usize) {
        (self.pinned.len(), self.reserved.len(), self.moves.len())
    }

    fn rollback(&mut self, (pinned, reserved, moves): (usize, usize, usize)) {
        self.pinned.truncate(pinned);
        self.reserved.truncate(reserved);
        self.moves.truncate(moves);
    }
}

impl<V: Value> DaTrie<V> {
    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let mut path: SmallVec<[(u32, u8); 32]> = SmallVec::new();
        let (leaf, value_at) = self.locate(key, |node, c| path.push((node, c)))?;
        let old = self.arena.read_value(value_at);
        self.delete_leaf(leaf, &path);
        self.len -= 1;
        Some(old)
    }

    /// Unlinks `leaf` and every ancestor left without children, then compacts.
    /// `path` holds the `(node, char)` steps from the root down to `leaf`.
    fn delete_leaf(&mut self, leaf: u32, path: &[(u32, u8)]) {
        let mut child = leaf;
        for &(parent, c) in path.iter().rev() {
            let childless = self.unlink_child(parent, c);
            self.container.release(child);
            if !childless || parent == ROOT {
                break;
            }
            child = parent;
        }
        if self.config.compacts() {
            self.reduce();
        }
    }

    /// Moves sibling groups out of the last block into lower ones and drops
    /// trailing blocks once they are wholly empty.
    pub(crate) fn reduce(&mut self) {
        let before = self.container.num_blocks();
        let mut moved = 0usize;
        loop {
            let last = self.container.num_blocks() - 1;
            if last == 0 {
                break;
            }
            if self.container.shrink() {
                continue;
            }

            let free_last = self.container.blocks[last as usize].num_empties as usize;
            if self.container.num_free() - free_last < BLOCK_SIZE - free_last {
                break;
            }
            let Some(unit) = self.first_occupied(last) else {
                break;
            };
            let owner = self.unit(unit).check;
            if !self.compress(owner, last) {
                break;
            }
            moved += 1;
        }
        let after = self.container.num_blocks();
        if moved > 0 || after != before {
            tracing::debug!(before, after, groups = moved, "compacted container");
        }
    }

    fn first_occupied(&self, b: u32) -> Option<u32> {
        let blk = &self.container.blocks[b as usize];
        let occupied = block::and_not(&block::FULL, &blk.empties);
        block::first_set(&occupied).map(|x| (b << BLOCK_SHIFT) | x as u32)
    }

    /// Moves the children of `p` into blocks below `limit`.
    ///
    /// Walks the rings the way the base finder does: a block that can host
    /// the group neither directly nor by displacing groups with no more
    /// children than `p` is charged an error, so demoted blocks are not
    /// searched again until a release promotes them.
    fn compress(&mut self, p: u32, limit: u32) -> bool {
        let chars = self.children(p);
        let mut plan = Plan::new(p);

        if chars.len() == 1 {
            let hit = self.finder.fit_in_ring(
                &self.container,
                Ring::Personal,
                limit,
                &chars,
                &[],
                &mut plan.budget,
            );
            if let Some(base) = hit {
                self.relocate(p, base, &mut []);
                return true;
            }
        }

        let Some(head) = self.container.rings.general else {
            return false;
        };
        let last = self.container.blocks[head as usize].prev;
        let mut cur = head;
        loop {
            let next = self.container.blocks[cur as usize].next;
            if cur < limit {
                if let Some(base) = self.finder.fit(&self.container, cur, &chars, &[]) {
                    self.container.error_reset(cur);
                    self.relocate(p, base, &mut []);
                    return true;
                }
                if self.displace_into(cur, p, &chars, limit, &mut plan, 0) {
                    tracing::trace!(
                        owner = p,
                        groups = plan.moves.len(),
                        "compressed by displacement"
                    );
                    self.apply(&plan.moves);
                    return true;
                }
                self.container.error(cur);
            }
            if cur == last {
                break;
            }
            cur = next;
        }
        false
    }

    /// Plans `owner`'s group into block `b`, displacing groups there that have
    /// no more children than it.
    fn displace_into(
        &self,
        b: u32,
        owner: u32,
        chars: &[u8],
        limit: u32,
        plan: &mut Plan,
        depth: usize,
    ) -> bool {
        if depth >= MAX_DISPLACEMENT_DEPTH || !plan.spend() {
            return false;
        }
        let blk = &self.container.blocks[b as usize];
        let movable = self.movable_slots(b, chars.len(), &plan.pinned);
        let mut open = block::or(&blk.empties, &movable);
        for r in plan.reserved.iter().filter(|r| r.block == b) {
            open = block::and_not(&open, &r.mask);
        }

        let mut candidates = block::candidates(&open, chars);
        while let Some(x) = block::first_set(&candidates) {
            block::clear(&mut candidates, x);
            if !plan.spend() {
                return false;
            }
            let base = (b << BLOCK_SHIFT) | x as u32;
            if self.plan_at(owner, base, chars, limit, plan, depth) {
                return true;
            }
        }
        false
    }

    /// Occupied slots of block `b` whose groups a group of `n` children may
    /// displace.
    fn movable_slots(&self, b: u32, n: usize, pinned: &[u32]) -> Bitmap {
        let blk = &self.container.blocks[b as usize];
        let mut occupied = block::and_not(&block::FULL, &blk.empties);
        let mut out = [0u64; 4];
        while let Some(x) = block::first_set(&occupied) {
            block::clear(&mut occupied, x);
            let slot = (b << BLOCK_SHIFT) | x as u32;
            if slot == ROOT {
                continue;
            }
            let q = self.unit(slot).check;
            if !pinned.contains(&q) && self.count_children(q, n + 1) <= n {
                block::set(&mut out, x);
            }
        }
        out
    }

    /// Plans `owner`'s group at `base`, finding new homes for the groups
    /// currently there.
    fn plan_at(
        &self,
        owner: u32,
        base: u32,
        chars: &[u8],
        limit: u32,
        plan: &mut Plan,
        depth: usize,
    ) -> bool {
        let mark = plan.mark();
        let mut displaced: SmallVec<[u32; 4]> = SmallVec::new();
        for &c in chars {
            let slot = base ^ c as u32;
            if self.container.is_vacant(slot) {
                continue;
            }
            let q = self.unit(slot).check;
            if !displaced.contains(&q) {
                displaced.push(q);
            }
        }
        plan.pinned.extend(displaced.iter().copied());
        plan.reserve(base, chars);
        for &q in &displaced {
            if !self.rehome(q, limit, plan, depth + 1) {
                plan.rollback(mark);
                return false;
            }
        }
        plan.moves.push((owner, base));
        true
    }

    /// Plans a new home below `limit` for the displaced group of `q`.
    fn rehome(&self, q: u32, limit: u32, plan: &mut Plan, depth: usize) -> bool {
        let chars = self.children(q);
        let rings: &[Ring] = if chars.len() == 1 {
            &[Ring::Personal, Ring::General]
        } else {
            &[Ring::General]
        };
        for &ring in rings {
            let hit = self.finder.fit_in_ring(
                &self.container,
                ring,
                limit,
                &chars,
                &plan.reserved,
                &mut plan.budget,
            );
            if let Some(base) = hit {
                plan.reserve(base, &chars);
                plan.moves.push((q, base));
                return true;
            }
        }

        for b in self.container.ring_iter(Ring::General).filter(|&b| b < limit) {
            if plan.budget == 0 {
                break;
            }
            if self.displace_into(b, q, &chars, limit, plan, depth) {
                return true;
            }
        }
        false
    }

    /// Carries out planned moves. Owners may sit inside groups that move
    /// before them, so their indices are tracked.
    fn apply(&mut self, moves: &[(u32, u32)]) {
        let mut tracked: SmallVec<[u32; 8]> = moves.iter().map(|&(q, _)| q).collect();
        for (i, &(_, base)) in moves.iter().enumerate() {
            let q = tracked[i];
            self.relocate(q, base, &mut tracked);
        }
    }
}

/// Slots `x ^ c` of one block.
fn group_mask(x: u8, chars: &[u8]) -> Bitmap {
    let mut mask = [0u64; 4];
    for &c in chars {
        block::set(&mut mask, x ^ c);
    }
    mask
}
