//! Hierarchical free bitmap
//!
//! One bit per chunk at the leaf level, 1 meaning free. Every level
//! above summarizes the one below it: bit `i` is set if any bit in the
//! `i`-th cacheline-sized group of the child level is set. Levels are
//! added until one fits in a single cache line.
//!
//! ```text
//! level 0 (top)   [1 0 1 ...]                 one bit per child cacheline
//! level 1         [ff ff .. 00 00 .. 08 ...]  cachelines of 512 bits
//! level 2 (leaf)  one bit per chunk
//! ```
//!
//! Allocation descends from the top along first set bits, so it costs
//! one cacheline scan per level. Each level also remembers the first
//! byte that may still hold a set bit, so long exhausted prefixes are
//! not rescanned.

use crate::error::{Error, Result};
use std::mem;

/// Bytes summarized by one bit of the parent level.
pub const CACHELINE: usize = 64;

#[derive(Debug, Clone)]
pub struct FreeBitmap {
    cacheline: usize,
    nblocks: usize,
    /// Top level first, leaf level last.
    levels: Vec<Vec<u8>>,
    /// Per level, no byte before this offset has a set bit. `None` once
    /// the whole level is zero.
    free_offs: Vec<Option<usize>>,
}

fn init_level(bits: usize) -> Vec<u8> {
    let mut bitmap = vec![0xffu8; bits >> 3];
    let tail = bits & 0x7;
    if tail > 0 {
        // Bits past `bits` stay clear, as permanently allocated padding.
        bitmap.push((1u8 << tail) - 1);
    }
    bitmap
}

impl FreeBitmap {
    /// Bitmap for `nblocks` chunks, all free.
    pub fn new(nblocks: usize) -> Result<Self> {
        Self::with_cacheline(CACHELINE, nblocks)
    }

    /// Same as [`FreeBitmap::new`] with a custom summary width.
    ///
    /// `cacheline` must be a power of two and `nblocks` a multiple of 8.
    pub fn with_cacheline(cacheline: usize, nblocks: usize) -> Result<Self> {
        if !cacheline.is_power_of_two() {
            return Err(Error::Config(format!(
                "cacheline {} is not a power of two",
                cacheline
            )));
        } else if nblocks & 0x7 != 0 {
            return Err(Error::Config(format!(
                "free bitmap needs a multiple of 8 blocks, got {}",
                nblocks
            )));
        }

        let mut levels = Vec::new();
        let mut bits = nblocks;
        loop {
            let level = init_level(bits);
            let len = level.len();
            levels.push(level);
            if bits <= (cacheline << 3) {
                break;
            }
            bits = len.div_ceil(cacheline);
        }
        levels.reverse();

        let free_offs = levels
            .iter()
            .map(|level| level.iter().any(|&b| b != 0).then_some(0))
            .collect();

        Ok(Self {
            cacheline,
            nblocks,
            levels,
            free_offs,
        })
    }

    pub fn nblocks(&self) -> usize {
        self.nblocks
    }

    /// Number of bitmap levels, leaf included
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Count of free blocks, by popcount of the leaf level.
    pub fn free_blocks(&self) -> usize {
        self.levels
            .last()
            .map_or(0, |leaf| leaf.iter().map(|b| b.count_ones() as usize).sum())
    }

    /// Bytes of bookkeeping held by this bitmap
    pub fn size_of(&self) -> usize {
        mem::size_of::<Self>()
            + self.levels.iter().map(|level| level.len()).sum::<usize>()
            + self.levels.len() * mem::size_of::<Vec<u8>>()
            + self.free_offs.len() * mem::size_of::<Option<usize>>()
    }

    pub fn is_free(&self, nthblock: usize) -> bool {
        match self.levels.last() {
            Some(leaf) if nthblock < self.nblocks => leaf[nthblock >> 3] & (1 << (nthblock & 0x7)) != 0,
            _ => false,
        }
    }

    /// Claim the lowest free block.
    ///
    /// Returns `None` when every block is allocated.
    pub fn allocate(&mut self) -> Option<usize> {
        let depth = self.levels.len();
        if depth == 0 {
            return None;
        }

        let (mut start, mut end) = (0, self.levels[0].len());
        let mut bit = 0;
        for l in 0..depth {
            let from = match self.free_offs[l] {
                Some(off) => off.max(start),
                None if l == 0 => return None,
                None => panic!("free bitmap level {} exhausted under a set summary bit", l),
            };
            let level = &self.levels[l];
            let found = level
                .get(from..end)
                .and_then(|group| group.iter().position(|&b| b != 0))
                .map(|i| from + i);
            let byte = match found {
                Some(byte) => byte,
                None if l == 0 => {
                    self.free_offs[0] = None;
                    return None;
                }
                None => panic!("free bitmap level {} has no free bit under its summary", l),
            };
            // Everything before `byte` at this level is known zero.
            self.free_offs[l] = Some(byte);
            bit = (byte << 3) + level[byte].trailing_zeros() as usize;

            if l + 1 < depth {
                start = bit * self.cacheline;
                end = (start + self.cacheline).min(self.levels[l + 1].len());
            }
        }

        self.clear_upward(bit);
        Some(bit)
    }

    /// Clear leaf `nthblock`, then every summary bit whose child group
    /// became empty as a result.
    fn clear_upward(&mut self, nthblock: usize) {
        let mut bit = nthblock;
        for l in (0..self.levels.len()).rev() {
            let byte = bit >> 3;
            let level = &mut self.levels[l];
            level[byte] &= !(1u8 << (bit & 0x7));
            if level[byte] != 0 {
                return;
            }

            if self.free_offs[l] == Some(byte) {
                self.free_offs[l] = (byte + 1 < level.len()).then_some(byte + 1);
            }

            let group = byte / self.cacheline;
            let from = group * self.cacheline;
            let till = (from + self.cacheline).min(level.len());
            if level[from..till].iter().any(|&b| b != 0) {
                return;
            }
            bit = group;
        }
    }

    /// Return `nthblock` to the free set.
    ///
    /// Fails with [`Error::InvalidFree`] if the block is out of range or
    /// already free; the bitmap is left untouched in that case.
    pub fn free(&mut self, nthblock: usize) -> Result<()> {
        if nthblock >= self.nblocks {
            return Err(Error::InvalidFree(format!(
                "block {} out of range for {} blocks",
                nthblock, self.nblocks
            )));
        } else if self.is_free(nthblock) {
            return Err(Error::InvalidFree(format!("block {} is already free", nthblock)));
        }

        let mut bit = nthblock;
        for l in (0..self.levels.len()).rev() {
            let byte = bit >> 3;
            let level = &mut self.levels[l];
            let was = level[byte];
            level[byte] = was | (1u8 << (bit & 0x7));

            self.free_offs[l] = Some(self.free_offs[l].map_or(byte, |off| off.min(byte)));

            // A byte that already had a free bit is covered by a set
            // summary bit, and so are all of its ancestors.
            if was != 0 {
                break;
            }
            bit = byte / self.cacheline;
        }

        Ok(())
    }

    /// Check that every summary bit matches its child group.
    #[cfg(test)]
    pub(crate) fn check_summaries(&self) {
        for l in 0..self.levels.len().saturating_sub(1) {
            let (parent, child) = (&self.levels[l], &self.levels[l + 1]);
            for (group, line) in child.chunks(self.cacheline).enumerate() {
                let set = parent[group >> 3] & (1 << (group & 0x7)) != 0;
                let any = line.iter().any(|&b| b != 0);
                assert_eq!(set, any, "level {} bit {} disagrees with its group", l, group);
            }
        }
    }
}
