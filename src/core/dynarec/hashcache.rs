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

//! Indirect-jump hash cache
//!
//! JR/JALR cannot be direct-linked, so generated code probes this table
//! inline: guest PC in, native entry address out. It is a cache, not an
//! authoritative map — a stale or missing entry just detours through
//! the dispatch trampoline, which re-validates against the block cache.
//!
//! Layout is fixed because generated code indexes it directly: 4096
//! two-way sets of `(pc, native)` word pairs, 16 bytes per set, way 0
//! most recently used. The probe hash is `((pc >> 12) ^ pc) & 0xFFF`.

/// Number of sets; must stay a power of two for the inline mask
pub const HASH_SETS: usize = 4096;

/// PC value marking an empty way (never a valid instruction address)
const EMPTY: u32 = 0xFFFF_FFFF;

/// One cached translation
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct HashEntry {
    /// Guest PC, or `EMPTY`
    pub pc: u32,
    /// Host address of the block body (32-bit, as generated code sees it)
    pub native: u32,
}

/// 2-way set-associative PC-to-native cache
#[repr(C)]
pub struct JumpHashCache {
    sets: Box<[[HashEntry; 2]; HASH_SETS]>,
}

/// Set index for a guest PC
#[inline(always)]
pub fn hash_pc(pc: u32) -> usize {
    (((pc >> 12) ^ pc) & (HASH_SETS as u32 - 1)) as usize
}

impl JumpHashCache {
    pub fn new() -> Self {
        Self {
            sets: vec![[HashEntry { pc: EMPTY, native: 0 }; 2]; HASH_SETS]
                .into_boxed_slice()
                .try_into()
                .ok()
                .expect("HASH_SETS-sized allocation"),
        }
    }

    /// Forget every translation
    pub fn clear(&mut self) {
        for set in self.sets.iter_mut() {
            *set = [HashEntry { pc: EMPTY, native: 0 }; 2];
        }
    }

    /// Record a translation, keeping the newest entry in way 0
    pub fn insert(&mut self, pc: u32, native: u32) {
        let set = &mut self.sets[hash_pc(pc)];
        if set[0].pc == pc {
            set[0].native = native;
            return;
        }
        // Demote way 0; a way-1 hit is overwritten rather than shuffled
        set[1] = set[0];
        set[0] = HashEntry { pc, native };
    }

    /// Probe for a translation
    pub fn lookup(&self, pc: u32) -> Option<u32> {
        let set = &self.sets[hash_pc(pc)];
        if set[0].pc == pc {
            return Some(set[0].native);
        }
        if set[1].pc == pc {
            return Some(set[1].native);
        }
        None
    }

    /// Drop a translation (stale block discard); idempotent
    pub fn remove(&mut self, pc: u32) {
        let set = &mut self.sets[hash_pc(pc)];
        for way in set.iter_mut() {
            if way.pc == pc {
                way.pc = EMPTY;
                way.native = 0;
            }
        }
    }

    /// Table base address, embedded in generated probe sequences
    pub fn base_ptr(&self) -> *const u8 {
        self.sets.as_ptr() as *const u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup_remove() {
        let mut cache = JumpHashCache::new();
        assert_eq!(cache.lookup(0x8000_1000), None);

        cache.insert(0x8000_1000, 0x1234);
        assert_eq!(cache.lookup(0x8000_1000), Some(0x1234));

        cache.remove(0x8000_1000);
        assert_eq!(cache.lookup(0x8000_1000), None);
        cache.remove(0x8000_1000); // idempotent
    }

    #[test]
    fn test_two_ways_coexist() {
        let mut cache = JumpHashCache::new();
        // Same set: hash is over bits the 4 KiB stride cancels
        let a = 0x8000_1000;
        let b = a ^ 0x0100_0000;
        assert_eq!(hash_pc(a), hash_pc(b));

        cache.insert(a, 0xAAAA);
        cache.insert(b, 0xBBBB);
        assert_eq!(cache.lookup(a), Some(0xAAAA));
        assert_eq!(cache.lookup(b), Some(0xBBBB));
    }

    #[test]
    fn test_third_conflict_evicts_oldest() {
        let mut cache = JumpHashCache::new();
        let a = 0x8000_1000;
        let b = a ^ 0x0100_0000;
        let c = a ^ 0x0200_0000;
        assert_eq!(hash_pc(a), hash_pc(c));

        cache.insert(a, 1);
        cache.insert(b, 2);
        cache.insert(c, 3);
        assert_eq!(cache.lookup(a), None, "oldest way evicted");
        assert_eq!(cache.lookup(b), Some(2));
        assert_eq!(cache.lookup(c), Some(3));
    }

    #[test]
    fn test_reinsert_updates_in_place() {
        let mut cache = JumpHashCache::new();
        cache.insert(0x8000_1000, 0x1111);
        cache.insert(0x8000_1000, 0x2222);
        assert_eq!(cache.lookup(0x8000_1000), Some(0x2222));
    }

    #[test]
    fn test_entry_layout_matches_inline_probe() {
        // Generated code assumes 8-byte entries, 16-byte sets, pc at
        // offset 0 and native at offset 4
        assert_eq!(std::mem::size_of::<HashEntry>(), 8);
        assert_eq!(std::mem::size_of::<[HashEntry; 2]>(), 16);
    }
}
