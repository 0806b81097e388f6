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

//! Dynamic recompiler
//!
//! Translates guest R3000A basic blocks into native MIPS (R5900) code
//! and caches them for re-entry. The pieces:
//!
//! - [`codebuf`]: the 4 MiB mapped code arena with W^X phase toggling
//! - [`emit`]: the host instruction encoder
//! - [`regcache`]: pinned registers and constant tracking
//! - [`compile`]: the per-block walker and per-opcode emitters
//! - [`block`]: the block arena and two-level physical-indexed cache
//! - [`hashcache`]: the JR/JALR guest-PC-to-native cache
//! - [`patch`]: direct-link sites awaiting their target
//! - [`tramp`]: shared trampolines and the Rust helper ABI
//!
//! Compilation, caching, self-modifying-code detection, and link
//! patching are portable and fully exercised on any host; only the
//! *entry* into emitted code requires a 32-bit MIPS host (the execution
//! loop falls back to the interpreter elsewhere).
//!
//! Every form of exhaustion (code buffer, block pool, patch list)
//! recovers the same way: throw the whole translation state away and
//! let the next loop iteration recompile. Resets happen strictly
//! between block executions, never inside one.

pub mod block;
pub mod codebuf;
mod compile;
pub mod emit;
pub mod hashcache;
pub mod patch;
pub mod regcache;
pub mod tramp;


use crate::core::cpu::CycleTable;
use crate::core::dynarec::block::{classify_pc, BlockCache, BlockEntry, NO_BLOCK, NO_PAGE};
use crate::core::dynarec::codebuf::{CodeBuffer, BLOCK_HEADROOM};
use crate::core::dynarec::compile::{page_snapshot, BlockCompiler};
use crate::core::dynarec::emit::Asm;
use crate::core::dynarec::hashcache::JumpHashCache;
use crate::core::dynarec::patch::PatchList;
use crate::core::dynarec::tramp::{emit_trampolines, JitPointers, Trampolines, PROLOGUE_WORDS};
use crate::core::error::Result;
use crate::core::memory::{Bus, PageGenerations};

pub use block::MAX_BLOCK_INSTRS;
pub use tramp::JitContext;

/// The recompiler: code buffer, block cache, link patcher, and the
/// indirect-jump hash, behind a lookup/compile/flush surface
pub struct Dynarec {
    codebuf: CodeBuffer,
    cache: BlockCache,
    hash: JumpHashCache,
    patches: PatchList,
    tramp: Trampolines,
    /// Blocks compiled since the last flush, for diagnostics
    compiled: u64,
}

impl Dynarec {
    /// Map the code buffer and pre-emit the dispatch trampolines
    pub fn new() -> Result<Self> {
        let mut codebuf = CodeBuffer::new()?;
        let buf_base = codebuf.addr_of(0) as usize;
        let tramp = {
            let mut asm = Asm::new(&mut codebuf);
            emit_trampolines(&mut asm, buf_base)
        };
        codebuf.set_reset_mark();
        codebuf.end_emit()?;
        log::info!(
            "dynarec ready: {} bytes of trampolines at {:#x}",
            codebuf.len(),
            buf_base
        );
        Ok(Self {
            codebuf,
            cache: BlockCache::new(),
            hash: JumpHashCache::new(),
            patches: PatchList::new(),
            tramp,
            compiled: 0,
        })
    }

    fn pointers(&self, bus: &Bus) -> JitPointers {
        JitPointers {
            read_lut: bus.fastmem().read_lut_base() as *const u8,
            write_lut: bus.fastmem().write_lut_base() as *const u8,
            gen_base: bus.page_gens().base_ptr(),
            hash_base: self.hash.base_ptr(),
            buf_base: self.codebuf.addr_of(0) as usize,
        }
    }

    /// Find a fresh compiled block for a guest PC
    ///
    /// A hit whose page-generation snapshot no longer matches is stale:
    /// the entry is discarded, its hash translation dropped, and `None`
    /// comes back so the caller recompiles.
    pub fn lookup(&mut self, pc: u32, gens: &PageGenerations) -> Option<i32> {
        let index = self.cache.lookup(pc)?;
        let entry = *self.cache.pool().get(index);
        if entry.page != NO_PAGE
            && (gens.get(entry.page as usize) != entry.page_gen
                || gens.get(entry.page2 as usize) != entry.page2_gen)
        {
            log::debug!("stale block at 0x{:08X}, dropping for recompile", pc);
            self.hash.remove(pc);
            self.cache.remove(pc);
            return None;
        }
        Some(index)
    }

    /// Compile the block starting at `pc`
    ///
    /// Returns `Ok(None)` for addresses outside RAM/BIOS (the caller
    /// interprets those). Exhaustion of any translation resource flushes
    /// everything first; the compile itself then proceeds into a clean
    /// arena.
    pub fn compile(&mut self, pc: u32, bus: &Bus, cycles: &CycleTable) -> Result<Option<i32>> {
        if classify_pc(pc).is_none() {
            log::warn!("refusing to compile non-memory pc 0x{:08X}", pc);
            return Ok(None);
        }

        if !self.cache.has_capacity()
            || self.codebuf.remaining() < BLOCK_HEADROOM
            || !self.patches.has_capacity()
        {
            self.flush_all();
        }

        self.codebuf.begin_emit()?;
        let ptrs = self.pointers(bus);
        let summary = {
            let asm = Asm::new(&mut self.codebuf);
            let compiler = BlockCompiler::new(
                asm,
                cycles,
                &self.cache,
                bus.page_gens(),
                ptrs,
                self.tramp,
                pc,
            );
            compiler.run(bus)
        };

        let (page, page_gen, page2, page2_gen) =
            page_snapshot(pc, summary.guest_len, bus.page_gens());
        let entry = BlockEntry {
            psx_pc: pc,
            code_offset: summary.entry_offset,
            guest_len: summary.guest_len,
            native_words: summary.native_words,
            cycle_cost: summary.cycle_cost,
            idle_loop: summary.idle_loop,
            page,
            page_gen,
            page2,
            page2_gen,
            next: NO_BLOCK,
        };
        let index = self
            .cache
            .insert(pc, entry)
            .expect("block pool capacity ensured before compile");

        for site in summary.links {
            assert!(
                self.patches.add(site),
                "patch list overflow despite capacity check"
            );
        }

        // Anyone already waiting on this PC (including the block's own
        // self-loop) gets linked now, while the buffer is writable
        let body = ptrs.addr(summary.entry_offset + PROLOGUE_WORDS * 4);
        for site in self.patches.take_for(pc) {
            self.codebuf.patch32(site.code_offset, Asm::j_word(body));
        }

        self.codebuf.end_emit()?;
        self.compiled += 1;
        log::trace!(
            "compiled 0x{:08X}: {} guest instrs, {} native words, {} cycles",
            pc,
            summary.guest_len,
            summary.native_words,
            summary.cycle_cost
        );
        Ok(Some(index))
    }

    /// Reset the whole translation state: code buffer back to the
    /// trampolines, both L2 table sets freed, hash zeroed, pool reset
    pub fn flush_all(&mut self) {
        log::info!(
            "dynarec flush after {} blocks ({} bytes of code)",
            self.compiled,
            self.codebuf.len()
        );
        self.cache.reset();
        self.hash.clear();
        self.patches.clear();
        self.codebuf.reset();
        self.compiled = 0;
    }

    /// Drop every block on a RAM page (generation wrap, bulk writes)
    pub fn evict_page(&mut self, page: u32) {
        let Self { cache, hash, .. } = self;
        cache.evict_ram_page(page, |pc| hash.remove(pc));
    }

    /// Block entry by pool index
    pub fn block(&self, index: i32) -> &BlockEntry {
        self.cache.pool().get(index)
    }

    /// Host address of a block's entry point (with prologue)
    pub fn entry_ptr(&self, index: i32) -> *const u8 {
        self.codebuf.addr_of(self.block(index).code_offset)
    }

    /// 32-bit host address of a block's body (past the prologue), the
    /// form direct links and the hash cache store
    pub fn body_addr(&self, index: i32) -> u32 {
        let offset = self.block(index).code_offset + PROLOGUE_WORDS * 4;
        self.codebuf.addr_of(offset) as usize as u32
    }

    /// Indirect-jump hash, populated on every successful lookup
    pub fn hash_mut(&mut self) -> &mut JumpHashCache {
        &mut self.hash
    }

    /// Unresolved direct-link sites
    pub fn pending_links(&self) -> usize {
        self.patches.len()
    }

    /// Read an emitted word back, for link verification
    pub fn code_word(&self, offset: u32) -> u32 {
        self.codebuf.read32(offset)
    }
}
