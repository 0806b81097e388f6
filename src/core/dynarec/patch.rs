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

//! Direct-link patch sites
//!
//! A block jumping to a not-yet-compiled target emits its J through the
//! dispatch trampoline and records the site here. When the target
//! compiles, every site naming it is rewritten into a direct jump and
//! dropped from the list. Sites pointing at blocks that later go stale
//! are left alone: the dispatch trampoline they can no longer shortcut
//! through re-validates via the block cache, so a dangling link is slow,
//! never wrong.

/// Bounded capacity; overflow forces a full cache flush upstream
pub const PATCH_LIST_CAPACITY: usize = 16384;

/// One unresolved direct link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSite {
    /// Code-buffer offset of the J instruction to rewrite
    pub code_offset: u32,
    /// Guest PC the link wants to reach
    pub target_pc: u32,
}

/// Bounded list of unresolved direct links
pub struct PatchList {
    sites: Vec<PatchSite>,
}

impl PatchList {
    pub fn new() -> Self {
        Self {
            sites: Vec::with_capacity(PATCH_LIST_CAPACITY),
        }
    }

    /// Record a site; `false` when the list is full
    #[must_use]
    pub fn add(&mut self, site: PatchSite) -> bool {
        if self.sites.len() == PATCH_LIST_CAPACITY {
            return false;
        }
        self.sites.push(site);
        true
    }

    /// Remove and return every site waiting on `target_pc`
    pub fn take_for(&mut self, target_pc: u32) -> Vec<PatchSite> {
        let mut taken = Vec::new();
        self.sites.retain(|site| {
            if site.target_pc == target_pc {
                taken.push(*site);
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn clear(&mut self) {
        self.sites.clear();
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Whether another block's worth of sites can still be recorded
    pub fn has_capacity(&self) -> bool {
        // Worst case: every instruction pair in a max-length block links
        self.sites.len() + 512 <= PATCH_LIST_CAPACITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_take() {
        let mut list = PatchList::new();
        assert!(list.add(PatchSite {
            code_offset: 0x100,
            target_pc: 0x8000_1000
        }));
        assert!(list.add(PatchSite {
            code_offset: 0x200,
            target_pc: 0x8000_2000
        }));
        assert!(list.add(PatchSite {
            code_offset: 0x300,
            target_pc: 0x8000_1000
        }));

        let taken = list.take_for(0x8000_1000);
        assert_eq!(taken.len(), 2);
        assert!(taken.iter().all(|s| s.target_pc == 0x8000_1000));
        assert_eq!(list.len(), 1);

        // Nothing left for that target
        assert!(list.take_for(0x8000_1000).is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let mut list = PatchList::new();
        for i in 0..PATCH_LIST_CAPACITY {
            assert!(list.add(PatchSite {
                code_offset: i as u32 * 4,
                target_pc: 0x8000_0000 + i as u32,
            }));
        }
        assert!(!list.add(PatchSite {
            code_offset: 0,
            target_pc: 0
        }));
        assert!(!list.has_capacity());
    }
}
