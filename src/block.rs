//! 256-slot blocks and the 256-bit bitmaps that describe them.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::unit::NIL;

/// Slots per block.
pub(crate) const BLOCK_SIZE: usize = 256;

/// log2(BLOCK_SIZE)
pub(crate) const BLOCK_SHIFT: u32 = 8;

/// One bit per slot of a block, word `i` covering slots `64*i..64*i+64`.
pub(crate) type Bitmap = [u64; 4];

pub(crate) const FULL: Bitmap = [u64::MAX; 4];

// Masks selecting bit positions whose bit `j` is zero, for j in 0..6.
const SWAP_MASKS: [u64; 6] = [
    0x5555_5555_5555_5555,
    0x3333_3333_3333_3333,
    0x0F0F_0F0F_0F0F_0F0F,
    0x00FF_00FF_00FF_00FF,
    0x0000_FFFF_0000_FFFF,
    0x0000_0000_FFFF_FFFF,
];

#[inline]
pub(crate) fn test(bits: &Bitmap, i: u8) -> bool {
    bits[(i >> 6) as usize] & (1u64 << (i & 63)) != 0
}

#[inline]
pub(crate) fn set(bits: &mut Bitmap, i: u8) {
    bits[(i >> 6) as usize] |= 1u64 << (i & 63);
}

#[inline]
pub(crate) fn clear(bits: &mut Bitmap, i: u8) {
    bits[(i >> 6) as usize] &= !(1u64 << (i & 63));
}

#[inline]
pub(crate) fn count(bits: &Bitmap) -> u32 {
    bits.iter().map(|w| w.count_ones()).sum()
}

#[inline]
pub(crate) fn first_set(bits: &Bitmap) -> Option<u8> {
    for (w, &word) in bits.iter().enumerate() {
        if word != 0 {
            return Some((w * 64 + word.trailing_zeros() as usize) as u8);
        }
    }
    None
}

#[inline]
pub(crate) fn and(a: &Bitmap, b: &Bitmap) -> Bitmap {
    [a[0] & b[0], a[1] & b[1], a[2] & b[2], a[3] & b[3]]
}

#[inline]
pub(crate) fn or(a: &Bitmap, b: &Bitmap) -> Bitmap {
    [a[0] | b[0], a[1] | b[1], a[2] | b[2], a[3] | b[3]]
}

#[inline]
pub(crate) fn and_not(a: &Bitmap, b: &Bitmap) -> Bitmap {
    [a[0] & !b[0], a[1] & !b[1], a[2] & !b[2], a[3] & !b[3]]
}

#[inline]
pub(crate) fn is_zero(bits: &Bitmap) -> bool {
    bits.iter().all(|&w| w == 0)
}

/// Permutes slot bits so that bit `x` of the result is bit `x ^ c` of `bits`.
///
/// Bits 6..8 of `c` exchange whole words; bits 0..6 are butterfly swaps of
/// 1, 2, 4, 8, 16 and 32-bit groups inside each word.
pub(crate) fn xor_permute(bits: &Bitmap, c: u8) -> Bitmap {
    let hi = (c >> 6) as usize;
    let lo = c & 63;
    let mut out = [0u64; 4];
    for (w, slot) in out.iter_mut().enumerate() {
        let mut word = bits[w ^ hi];
        for (j, &mask) in SWAP_MASKS.iter().enumerate() {
            if lo & (1 << j) != 0 {
                let s = 1u32 << j;
                word = ((word & mask) << s) | ((word >> s) & mask);
            }
        }
        *slot = word;
    }
    out
}

/// Alignments `x` for which `x ^ c` is set in `empties` for every `c`.
pub(crate) fn candidates(empties: &Bitmap, chars: &[u8]) -> Bitmap {
    let mut acc = FULL;
    for &c in chars {
        acc = and(&acc, &xor_permute(empties, c));
        if is_zero(&acc) {
            break;
        }
    }
    acc
}

/// Which free ring a block currently belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Ring {
    General,
    Personal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Block {
    /// Set bit = empty slot.
    pub empties: Bitmap,
    /// Set bit = some node uses this slot as its base (letter-check only).
    pub bases: Bitmap,
    pub num_empties: u16,
    /// Failed multi-character searches since the last success or refill.
    pub errors: u16,
    /// Entry point into the block's empty-slot ring.
    pub empty_head: u32,
    pub prev: u32,
    pub next: u32,
    pub ring: Option<Ring>,
}

impl Block {
    pub const PACKED_SIZE: usize = 32 + 32 + 2 + 2 + 4 + 4 + 4 + 1;

    /// A wholly empty block whose first slot is `first`.
    pub fn new(first: u32) -> Self {
        Self {
            empties: FULL,
            bases: [0; 4],
            num_empties: BLOCK_SIZE as u16,
            errors: 0,
            empty_head: first,
            prev: NIL,
            next: NIL,
            ring: None,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.num_empties == 0
    }

    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.num_empties as usize == BLOCK_SIZE
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for word in self.empties.iter().chain(self.bases.iter()) {
            w.write_u64::<LittleEndian>(*word)?;
        }
        w.write_u16::<LittleEndian>(self.num_empties)?;
        w.write_u16::<LittleEndian>(self.errors)?;
        w.write_u32::<LittleEndian>(self.empty_head)?;
        w.write_u32::<LittleEndian>(self.prev)?;
        w.write_u32::<LittleEndian>(self.next)?;
        w.write_u8(match self.ring {
            None => 0,
            Some(Ring::General) => 1,
            Some(Ring::Personal) => 2,
        })
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut empties = [0u64; 4];
        let mut bases = [0u64; 4];
        for word in empties.iter_mut().chain(bases.iter_mut()) {
            *word = r.read_u64::<LittleEndian>()?;
        }
        Ok(Self {
            empties,
            bases,
            num_empties: r.read_u16::<LittleEndian>()?,
            errors: r.read_u16::<LittleEndian>()?,
            empty_head: r.read_u32::<LittleEndian>()?,
            prev: r.read_u32::<LittleEndian>()?,
            next: r.read_u32::<LittleEndian>()?,
            ring: match r.read_u8()? {
                1 => Some(Ring::General),
                2 => Some(Ring::Personal),
                _ => None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn naive_candidates(empties: &Bitmap, chars: &[u8]) -> Bitmap {
        let mut out = [0u64; 4];
        for x in 0..=255u8 {
            if chars.iter().all(|&c| test(empties, x ^ c)) {
                set(&mut out, x);
            }
        }
        out
    }

    #[test]
    fn test_bit_ops() {
        let mut b = [0u64; 4];
        set(&mut b, 0);
        set(&mut b, 200);
        assert!(test(&b, 200));
        assert_eq!(count(&b), 2);
        assert_eq!(first_set(&b), Some(0));
        clear(&mut b, 0);
        assert_eq!(first_set(&b), Some(200));
        clear(&mut b, 200);
        assert!(is_zero(&b));
        assert_eq!(first_set(&b), None);
    }

    #[test]
    fn test_xor_permute_matches_naive() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let bits: Bitmap = [rng.gen(), rng.gen(), rng.gen(), rng.gen()];
            let c: u8 = rng.gen();
            let p = xor_permute(&bits, c);
            for x in 0..=255u8 {
                assert_eq!(test(&p, x), test(&bits, x ^ c), "x={x} c={c}");
            }
        }
    }

    #[test]
    fn test_candidates_matches_naive() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..64 {
            // Sparse-ish bitmaps so that multi-char sets still have answers.
            let bits: Bitmap = [
                rng.gen::<u64>() | rng.gen::<u64>(),
                rng.gen::<u64>() | rng.gen::<u64>(),
                rng.gen::<u64>() | rng.gen::<u64>(),
                rng.gen::<u64>() | rng.gen::<u64>(),
            ];
            let n = rng.gen_range(1..5);
            let chars: Vec<u8> = (0..n).map(|_| rng.gen()).collect();
            assert_eq!(candidates(&bits, &chars), naive_candidates(&bits, &chars));
        }
    }

    #[test]
    fn test_block_round_trip() {
        let mut b = Block::new(512);
        clear(&mut b.empties, 3);
        b.num_empties -= 1;
        set(&mut b.bases, 9);
        b.errors = 2;
        b.prev = 4;
        b.next = 1;
        b.ring = Some(Ring::Personal);

        let mut buf = Vec::new();
        b.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), Block::PACKED_SIZE);
        assert_eq!(Block::read_from(&mut buf.as_slice()).unwrap(), b);
    }
}
