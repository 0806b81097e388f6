// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Compiled-block bookkeeping
//!
//! Blocks live in a fixed arena ([`BlockPool`]) and are found through a
//! two-level table: an L1 array per compilable region (RAM and BIOS)
//! holding lazily-allocated L2 pages, one slot per 4-byte instruction
//! address within a 4 KiB page. Everything is indexed by *physical*
//! address, so the three guest segments share tables; blocks whose
//! distinct virtual PCs collapse onto the same physical slot (kseg
//! mirrors of the same code) hang off a per-slot collision chain and
//! are told apart by their exact `psx_pc`.
//!
//! Entries reference the code buffer and each other by plain integer
//! offsets. The pool index is the only handle that crosses module
//! boundaries; a cache flush resets the arena wholesale and every
//! outstanding index dies with it.

use crate::core::memory::{BIOS_SIZE, RAM_SIZE};

/// Capacity of the block arena; exhaustion triggers a full cache flush
pub const BLOCK_POOL_CAPACITY: usize = 32768;

/// Hard cap on guest instructions per block
pub const MAX_BLOCK_INSTRS: usize = 256;

/// Instruction slots per 4 KiB guest page
const SLOTS_PER_PAGE: usize = 1024;

/// Marks an empty L2 slot / end of a collision chain
pub const NO_BLOCK: i32 = -1;

/// Page index value for blocks outside RAM (BIOS code never goes stale)
pub const NO_PAGE: u16 = u16::MAX;

/// Where a guest PC can be compiled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRegion {
    Ram,
    Bios,
}

/// Classify a guest PC; `None` means the address is not compilable
/// (I/O, scratchpad, unmapped) and the caller falls back to stepping
pub fn classify_pc(pc: u32) -> Option<(CodeRegion, u32)> {
    let phys = pc & 0x1FFF_FFFF;
    if (phys as usize) < RAM_SIZE {
        Some((CodeRegion::Ram, phys))
    } else if (0x1FC0_0000..0x1FC0_0000 + BIOS_SIZE as u32).contains(&phys) {
        Some((CodeRegion::Bios, phys - 0x1FC0_0000))
    } else {
        None
    }
}

/// One compiled guest basic block
#[derive(Debug, Clone, Copy)]
pub struct BlockEntry {
    /// Guest virtual PC this block was compiled for
    pub psx_pc: u32,
    /// Offset of the native code in the code buffer
    pub code_offset: u32,
    /// Guest instructions consumed
    pub guest_len: u16,
    /// Native words emitted
    pub native_words: u16,
    /// Weighted guest cycle cost charged at the block's tails
    pub cycle_cost: u16,
    /// Tight self-loop with no side effects; the loop may burn the
    /// remaining budget instead of spinning through it
    pub idle_loop: bool,
    /// SMC page of the first instruction, `NO_PAGE` for BIOS blocks
    pub page: u16,
    /// Generation snapshot of `page` at compile time
    pub page_gen: u8,
    /// SMC page of the last instruction (== `page` unless the window
    /// crosses a 4 KiB boundary)
    pub page2: u16,
    /// Generation snapshot of `page2`
    pub page2_gen: u8,
    /// Next pool index in this physical slot's collision chain
    pub next: i32,
}

/// Fixed arena of block entries
pub struct BlockPool {
    entries: Vec<BlockEntry>,
}

impl BlockPool {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(BLOCK_POOL_CAPACITY),
        }
    }

    /// Allocate an entry; `None` when the arena is exhausted
    fn alloc(&mut self, entry: BlockEntry) -> Option<i32> {
        if self.entries.len() == BLOCK_POOL_CAPACITY {
            return None;
        }
        self.entries.push(entry);
        Some((self.entries.len() - 1) as i32)
    }

    pub fn get(&self, index: i32) -> &BlockEntry {
        &self.entries[index as usize]
    }

    fn get_mut(&mut self, index: i32) -> &mut BlockEntry {
        &mut self.entries[index as usize]
    }

    fn reset(&mut self) {
        self.entries.clear();
    }

    /// Entries currently allocated
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

type L2Page = Box<[i32; SLOTS_PER_PAGE]>;

fn new_l2() -> L2Page {
    Box::new([NO_BLOCK; SLOTS_PER_PAGE])
}

/// Two-level physical-indexed block lookup plus the entry arena
pub struct BlockCache {
    ram_l1: Vec<Option<L2Page>>,
    bios_l1: Vec<Option<L2Page>>,
    pool: BlockPool,
}

impl BlockCache {
    pub fn new() -> Self {
        Self {
            ram_l1: (0..RAM_SIZE >> 12).map(|_| None).collect(),
            bios_l1: (0..BIOS_SIZE >> 12).map(|_| None).collect(),
            pool: BlockPool::new(),
        }
    }

    /// Drop every block and free both L2 table sets
    pub fn reset(&mut self) {
        self.ram_l1.iter_mut().for_each(|p| *p = None);
        self.bios_l1.iter_mut().for_each(|p| *p = None);
        self.pool.reset();
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// Whether another block can be allocated without a flush
    pub fn has_capacity(&self) -> bool {
        self.pool.len() < BLOCK_POOL_CAPACITY
    }

    fn slot_of(pc: u32) -> Option<(CodeRegion, usize, usize)> {
        let (region, offset) = classify_pc(pc)?;
        Some((region, (offset >> 12) as usize, ((offset & 0xFFF) >> 2) as usize))
    }

    fn l1(&self, region: CodeRegion) -> &Vec<Option<L2Page>> {
        match region {
            CodeRegion::Ram => &self.ram_l1,
            CodeRegion::Bios => &self.bios_l1,
        }
    }

    fn l1_mut(&mut self, region: CodeRegion) -> &mut Vec<Option<L2Page>> {
        match region {
            CodeRegion::Ram => &mut self.ram_l1,
            CodeRegion::Bios => &mut self.bios_l1,
        }
    }

    /// Find the block compiled for an exact guest PC
    pub fn lookup(&self, pc: u32) -> Option<i32> {
        let (region, page, slot) = Self::slot_of(pc)?;
        let l2 = self.l1(region)[page].as_ref()?;
        let mut index = l2[slot];
        while index != NO_BLOCK {
            let entry = self.pool.get(index);
            if entry.psx_pc == pc {
                return Some(index);
            }
            index = entry.next;
        }
        None
    }

    /// Insert a freshly-compiled block; `None` when the arena is full.
    ///
    /// A same-PC entry already in the chain is replaced in place (the
    /// recompile-after-staleness path); mirrors chain in front.
    ///
    /// # Panics
    ///
    /// Panics if `pc` is not a compilable address; the compiler
    /// classified it before emitting.
    pub fn insert(&mut self, pc: u32, mut entry: BlockEntry) -> Option<i32> {
        let (region, page, slot) = Self::slot_of(pc).expect("insert for non-compilable pc");
        let l2 = self.l1_mut(region)[page].get_or_insert_with(new_l2);
        let head = l2[slot];

        // Replace a stale same-PC entry in place
        let mut index = head;
        while index != NO_BLOCK {
            let existing = self.pool.get(index);
            if existing.psx_pc == pc {
                entry.next = existing.next;
                *self.pool.get_mut(index) = entry;
                return Some(index);
            }
            index = existing.next;
        }

        entry.next = head;
        let new_index = self.pool.alloc(entry)?;
        // Re-borrow: alloc may not touch L1 but the borrow checker
        // cannot see that through &mut self
        let l2 = self.l1_mut(region)[page]
            .as_mut()
            .expect("L2 allocated above");
        l2[slot] = new_index;
        Some(new_index)
    }

    /// Unlink the block for an exact guest PC
    pub fn remove(&mut self, pc: u32) {
        let Some((region, page, slot)) = Self::slot_of(pc) else {
            return;
        };
        let l1 = match region {
            CodeRegion::Ram => &mut self.ram_l1,
            CodeRegion::Bios => &mut self.bios_l1,
        };
        let Some(l2) = l1[page].as_mut() else {
            return;
        };
        let mut index = l2[slot];
        if index == NO_BLOCK {
            return;
        }
        if self.pool.get(index).psx_pc == pc {
            l2[slot] = self.pool.get(index).next;
            return;
        }
        loop {
            let next = self.pool.get(index).next;
            if next == NO_BLOCK {
                return;
            }
            if self.pool.get(next).psx_pc == pc {
                self.pool.get_mut(index).next = self.pool.get(next).next;
                return;
            }
            index = next;
        }
    }

    /// Drop the whole L2 table of a RAM page (generation wrap, bulk
    /// SMC), reporting each evicted guest PC so the caller can unhook
    /// other structures (the indirect-jump hash) first
    pub fn evict_ram_page(&mut self, page: u32, mut on_evict: impl FnMut(u32)) {
        let Some(slot) = self.ram_l1.get_mut(page as usize) else {
            return;
        };
        let Some(l2) = slot.take() else {
            return;
        };
        for &head in l2.iter() {
            let mut index = head;
            while index != NO_BLOCK {
                let entry = self.pool.get(index);
                on_evict(entry.psx_pc);
                index = entry.next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pc: u32) -> BlockEntry {
        BlockEntry {
            psx_pc: pc,
            code_offset: 0x100,
            guest_len: 4,
            native_words: 16,
            cycle_cost: 5,
            idle_loop: false,
            page: ((pc & 0x1FFF_FFFF) >> 12) as u16,
            page_gen: 0,
            page2: ((pc & 0x1FFF_FFFF) >> 12) as u16,
            page2_gen: 0,
            next: NO_BLOCK,
        }
    }

    #[test]
    fn test_classify_pc() {
        assert_eq!(classify_pc(0x0000_1000), Some((CodeRegion::Ram, 0x1000)));
        assert_eq!(classify_pc(0x8000_1000), Some((CodeRegion::Ram, 0x1000)));
        assert_eq!(classify_pc(0xBFC0_0100), Some((CodeRegion::Bios, 0x100)));
        assert_eq!(classify_pc(0x1F80_0000), None); // scratchpad
        assert_eq!(classify_pc(0x1F80_1070), None); // I/O
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = BlockCache::new();
        let idx = cache.insert(0x8000_1000, entry(0x8000_1000)).unwrap();
        assert_eq!(cache.lookup(0x8000_1000), Some(idx));
        assert_eq!(cache.lookup(0x8000_1004), None);
    }

    #[test]
    fn test_kseg_mirrors_chain_on_one_slot() {
        // Same physical word, three virtual PCs: all coexist and
        // resolve to their own entries
        let mut cache = BlockCache::new();
        let a = cache.insert(0x0000_1000, entry(0x0000_1000)).unwrap();
        let b = cache.insert(0x8000_1000, entry(0x8000_1000)).unwrap();
        let c = cache.insert(0xA000_1000, entry(0xA000_1000)).unwrap();

        assert_eq!(cache.lookup(0x0000_1000), Some(a));
        assert_eq!(cache.lookup(0x8000_1000), Some(b));
        assert_eq!(cache.lookup(0xA000_1000), Some(c));
        // The chain is reachable from the newest head
        assert_eq!(cache.pool().get(c).next, b);
    }

    #[test]
    fn test_same_pc_insert_replaces() {
        let mut cache = BlockCache::new();
        let first = cache.insert(0x8000_2000, entry(0x8000_2000)).unwrap();
        let mut updated = entry(0x8000_2000);
        updated.code_offset = 0x999;
        let second = cache.insert(0x8000_2000, updated).unwrap();
        assert_eq!(first, second, "recompile reuses the pool slot");
        assert_eq!(cache.pool().get(second).code_offset, 0x999);
        assert_eq!(cache.pool().len(), 1);
    }

    #[test]
    fn test_remove_from_chain() {
        let mut cache = BlockCache::new();
        cache.insert(0x0000_1000, entry(0x0000_1000)).unwrap();
        cache.insert(0x8000_1000, entry(0x8000_1000)).unwrap();
        cache.remove(0x0000_1000);
        assert_eq!(cache.lookup(0x0000_1000), None);
        assert!(cache.lookup(0x8000_1000).is_some());

        // Removing a missing pc is a no-op
        cache.remove(0x0000_1000);
    }

    #[test]
    fn test_evict_ram_page() {
        let mut cache = BlockCache::new();
        cache.insert(0x8000_1000, entry(0x8000_1000)).unwrap();
        cache.insert(0x8000_1F00, entry(0x8000_1F00)).unwrap();
        cache.insert(0x8000_2000, entry(0x8000_2000)).unwrap();

        let mut evicted = Vec::new();
        cache.evict_ram_page(1, |pc| evicted.push(pc));
        evicted.sort();
        assert_eq!(evicted, vec![0x8000_1000, 0x8000_1F00]);
        assert_eq!(cache.lookup(0x8000_1000), None);
        assert_eq!(cache.lookup(0x8000_1F00), None);
        assert!(cache.lookup(0x8000_2000).is_some());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut cache = BlockCache::new();
        cache.insert(0x8000_1000, entry(0x8000_1000)).unwrap();
        cache.insert(0xBFC0_0000, entry(0xBFC0_0000)).unwrap();
        cache.reset();
        assert_eq!(cache.lookup(0x8000_1000), None);
        assert_eq!(cache.lookup(0xBFC0_0000), None);
        assert_eq!(cache.pool().len(), 0);
    }

    #[test]
    fn test_bios_blocks_live_in_their_own_table() {
        let mut cache = BlockCache::new();
        let b = cache.insert(0xBFC0_0180, entry(0xBFC0_0180)).unwrap();
        assert_eq!(cache.lookup(0xBFC0_0180), Some(b));
        // A RAM page eviction does not touch BIOS blocks
        cache.evict_ram_page(0, |_| {});
        assert!(cache.lookup(0xBFC0_0180).is_some());
    }
}
