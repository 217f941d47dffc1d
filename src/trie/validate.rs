//! Full structural check, used by tests and after loading untrusted images.

use super::DaTrie;
use crate::block::{self, Ring, BLOCK_SIZE};
use crate::config::SiblingOrder;
use crate::container::{block_of, Container};
use crate::unit::{Target, NIL, ROOT};
use crate::value::Value;

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(format!($($arg)+));
        }
    };
}

impl<V: Value> DaTrie<V> {
    /// Checks block bookkeeping, both free rings, every empty-slot ring,
    /// sibling chains and reachability. Returns a description of the first
    /// violation found.
    pub fn validate(&self) -> Result<(), String> {
        let c = &self.container;
        ensure!(
            c.units.len() == c.blocks.len() * BLOCK_SIZE,
            "{} units for {} blocks",
            c.units.len(),
            c.blocks.len()
        );
        ensure!(!c.blocks.is_empty(), "no blocks");
        ensure!(!c.is_vacant(ROOT), "root unit is empty");
        ensure!(c.units[ROOT as usize].check == NIL, "root has a parent");

        let free: usize = c.blocks.iter().map(|b| b.num_empties as usize).sum();
        ensure!(
            free == c.num_free(),
            "free counter {} but blocks hold {free}",
            c.num_free()
        );

        for (b, blk) in c.blocks.iter().enumerate() {
            let popcount = block::count(&blk.empties) as usize;
            ensure!(
                popcount == blk.num_empties as usize,
                "block {b}: bitmap has {popcount} empties, counter {}",
                blk.num_empties
            );
            match blk.ring {
                None => ensure!(blk.is_full(), "block {b} has empties but no ring"),
                Some(Ring::General) => ensure!(
                    !blk.is_full() && blk.errors < c.max_trials(),
                    "block {b} misfiled in the general ring (errors {})",
                    blk.errors
                ),
                Some(Ring::Personal) => ensure!(
                    !blk.is_full() && blk.errors >= c.max_trials(),
                    "block {b} misfiled in the personal ring (errors {})",
                    blk.errors
                ),
            }
            check_empty_ring(c, b as u32)?;
        }
        check_ring(c, Ring::General)?;
        check_ring(c, Ring::Personal)?;

        // Walk everything reachable from the root.
        let exclusive = self.config.addressing.exclusive_bases();
        let mut seen = vec![false; c.units.len()];
        let mut used_bases = vec![[0u64; 4]; c.blocks.len()];
        let mut reachable = 0usize;
        let mut leaves = 0usize;
        let mut stack = vec![ROOT];
        seen[ROOT as usize] = true;
        while let Some(node) = stack.pop() {
            reachable += 1;
            let unit = self.unit(node);
            if let Target::Label { suffix: true, .. } = unit.target {
                ensure!(unit.child.is_none(), "leaf {node} has children");
                leaves += 1;
                continue;
            }
            ensure!(
                !matches!(unit.target, Target::Empty { .. }),
                "reachable unit {node} is tagged empty"
            );
            if unit.child.is_none() {
                ensure!(node == ROOT, "inner node {node} has no children");
                continue;
            }

            let base = self.base_of(node);
            ensure!(base != NIL, "node {node} has children but no base");
            if exclusive {
                let b = block_of(base) as usize;
                ensure!(b < used_bases.len(), "base {base} of {node} out of range");
                ensure!(
                    !block::test(&used_bases[b], base as u8),
                    "base {base} shared by several nodes"
                );
                block::set(&mut used_bases[b], base as u8);
            }

            let chars = self.children(node);
            ensure!(
                chars.len() <= BLOCK_SIZE,
                "sibling chain of {node} does not terminate"
            );
            if self.config.sibling_order == SiblingOrder::Sorted {
                ensure!(
                    chars.windows(2).all(|w| w[0] < w[1]),
                    "children of {node} out of order: {chars:?}"
                );
            }
            for &ch in &chars {
                let slot = base ^ ch as u32;
                ensure!(!c.is_vacant(slot), "child {ch} of {node} at {slot} is empty");
                let expected = self.config.addressing.check_value(node, ch);
                ensure!(
                    self.unit(slot).check == expected,
                    "unit {slot} checks {} instead of {expected}",
                    self.unit(slot).check
                );
                ensure!(!seen[slot as usize], "unit {slot} reached twice");
                seen[slot as usize] = true;
                stack.push(slot);
            }
        }

        let occupied = c.num_occupied();
        ensure!(
            occupied == reachable,
            "{occupied} occupied units but {reachable} reachable"
        );
        ensure!(leaves == self.len, "{leaves} leaves but len {}", self.len);
        if exclusive {
            for (b, blk) in c.blocks.iter().enumerate() {
                ensure!(
                    blk.bases == used_bases[b],
                    "block {b}: base bitmap disagrees with the nodes using it"
                );
            }
        }
        Ok(())
    }
}

fn check_ring(c: &Container, ring: Ring) -> Result<(), String> {
    let expected = c.blocks.iter().filter(|b| b.ring == Some(ring)).count();
    let Some(head) = c.rings.head(ring) else {
        ensure!(expected == 0, "{ring:?} ring has no head but {expected} members");
        return Ok(());
    };
    let mut n = 0usize;
    let mut cur = head;
    loop {
        let blk = c
            .blocks
            .get(cur as usize)
            .ok_or_else(|| format!("{ring:?} ring links to missing block {cur}"))?;
        ensure!(blk.ring == Some(ring), "block {cur} linked into the {ring:?} ring");
        let next = blk.next;
        ensure!(
            c.blocks.get(next as usize).is_some_and(|b| b.prev == cur),
            "{ring:?} ring: block {next} does not link back to {cur}"
        );
        n += 1;
        ensure!(n <= expected, "{ring:?} ring does not close");
        cur = next;
        if cur == head {
            break;
        }
    }
    ensure!(n == expected, "{ring:?} ring holds {n} of {expected} blocks");
    Ok(())
}

fn check_empty_ring(c: &Container, b: u32) -> Result<(), String> {
    let blk = &c.blocks[b as usize];
    if blk.num_empties == 0 {
        ensure!(blk.empty_head == NIL, "full block {b} has an empty head");
        return Ok(());
    }
    let head = blk.empty_head;
    let mut n = 0usize;
    let mut cur = head;
    loop {
        ensure!(block_of(cur) == b, "empty ring of block {b} leaves it at {cur}");
        ensure!(c.is_vacant(cur), "occupied unit {cur} in the empty ring of {b}");
        let Some((_, next)) = c.units[cur as usize].links() else {
            return Err(format!("empty unit {cur} carries no links"));
        };
        let back = c.units.get(next as usize).and_then(|u| u.links());
        ensure!(
            back.is_some_and(|(prev, _)| prev == cur),
            "empty unit {next} does not link back to {cur}"
        );
        n += 1;
        ensure!(n <= BLOCK_SIZE, "empty ring of block {b} does not close");
        cur = next;
        if cur == head {
            break;
        }
    }
    ensure!(
        n == blk.num_empties as usize,
        "block {b}: empty ring holds {n} of {} units",
        blk.num_empties
    );
    Ok(())
}
