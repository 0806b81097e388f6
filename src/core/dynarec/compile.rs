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

//! Basic-block compiler
//!
//! Walks straight-line guest code and emits host instructions for each
//! opcode through the register cache, then closes the block with a
//! branch tail: cycle charge, budget check, and either a direct link, a
//! conditional two-way link, or the inline indirect-jump hash probe.
//!
//! Delay slots reorder at compile time: the condition (or indirect
//! target) is computed into a frame spill slot while the operands are
//! still live, the delay-slot instruction is emitted, and the spilled
//! value decides the tail. Blocks end at any branch, jump, SYSCALL,
//! BREAK, or the 256-instruction cap.

use crate::core::cpu::{offsets, CycleTable, Instruction};
use crate::core::dynarec::block::{classify_pc, BlockCache, MAX_BLOCK_INSTRS, NO_PAGE};
use crate::core::dynarec::emit::{Asm, Fixup, HostReg};
use crate::core::dynarec::patch::PatchSite;
use crate::core::dynarec::regcache::{RegCache, REG_CPU, REG_CYCLES, REG_LUT, REG_PHYS_MASK};
use crate::core::dynarec::tramp::{
    self, emit_prologue, JitPointers, Trampolines, COND_SLOT, PROLOGUE_WORDS,
};
use crate::core::memory::{Bus, PageGenerations, RAM_SIZE};

use HostReg::{A0, A1, A2, A3, Sp, T4, T5, T6, T7, T9, V0, Zero};

/// Exception codes as generated code passes them to the helper
const EXC_SYSCALL: u32 = 8;
const EXC_BREAK: u32 = 9;
const EXC_RESERVED: u32 = 10;
const EXC_COP_UNUSABLE: u32 = 11;
const EXC_OVERFLOW: u32 = 12;

/// What a compiled block looks like before it enters the cache
pub(super) struct BlockSummary {
    pub entry_offset: u32,
    pub guest_len: u16,
    pub native_words: u16,
    pub cycle_cost: u16,
    pub idle_loop: bool,
    /// Unresolved direct links emitted through the dispatch stub
    pub links: Vec<PatchSite>,
}

/// How a conditional tail tests its spilled condition word
#[derive(Clone, Copy)]
enum CondKind {
    /// Taken when the word is zero (BEQ)
    EqZero,
    /// Taken when the word is non-zero (BNE)
    NeZero,
    Lez,
    Gtz,
    Ltz,
    Gez,
}

enum BlockEnd {
    /// Unconditional or compile-time-decided branch
    Jump(u32),
    /// Two-way conditional: (kind, target, fallthrough)
    Cond(CondKind, u32, u32),
    /// Indirect through the hash cache; target spilled to COND_SLOT
    Indirect,
}

pub(super) struct BlockCompiler<'a, 'b> {
    asm: Asm<'a>,
    regs: RegCache,
    cycles: &'b CycleTable,
    cache: &'b BlockCache,
    gens: &'b PageGenerations,
    ptrs: JitPointers,
    tramp: Trampolines,
    start_pc: u32,
    cycle_total: u32,
    guest_len: u16,
    /// No stores and no trap/COP call-outs so far; a self-loop of pure
    /// instructions is an idle loop
    pure: bool,
    links: Vec<PatchSite>,
}

impl<'a, 'b> BlockCompiler<'a, 'b> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asm: Asm<'a>,
        cycles: &'b CycleTable,
        cache: &'b BlockCache,
        gens: &'b PageGenerations,
        ptrs: JitPointers,
        tramp: Trampolines,
        start_pc: u32,
    ) -> Self {
        Self {
            asm,
            regs: RegCache::new(),
            cycles,
            cache,
            gens,
            ptrs,
            tramp,
            start_pc,
            cycle_total: 0,
            guest_len: 0,
            pure: true,
            links: Vec::new(),
        }
    }

    /// Compile the block starting at `start_pc`
    pub fn run(mut self, bus: &Bus) -> BlockSummary {
        let entry_offset = self.asm.here();
        emit_prologue(&mut self.asm, &self.ptrs);

        let mut pc = self.start_pc;
        let mut idle = false;
        loop {
            let instr = Instruction(bus.read32(pc));

            if Self::is_branch(instr) {
                idle = self.end_at_branch(instr, pc, bus);
                break;
            }
            if instr.op() == 0 && (instr.funct() == 0x0C || instr.funct() == 0x0D) {
                let code = if instr.funct() == 0x0C {
                    EXC_SYSCALL
                } else {
                    EXC_BREAK
                };
                self.cycle_total += self.cycles.cost(instr) as u32;
                self.guest_len += 1;
                self.regs.flush_dirty(&mut self.asm);
                self.charge_cycles();
                self.emit_trap(code, pc, false);
                break;
            }

            self.emit_instr(instr, pc, false);
            self.guest_len += 1;
            pc = pc.wrapping_add(4);

            if self.guest_len as usize >= MAX_BLOCK_INSTRS {
                self.regs.flush_dirty(&mut self.asm);
                self.charge_cycles();
                self.emit_exit_to(pc);
                break;
            }
        }

        let native_words = (self.asm.here() - entry_offset) / 4;
        BlockSummary {
            entry_offset,
            guest_len: self.guest_len,
            native_words: native_words as u16,
            cycle_cost: self.cycle_total.min(u16::MAX as u32) as u16,
            idle_loop: idle,
            links: self.links,
        }
    }

    fn is_branch(instr: Instruction) -> bool {
        matches!(instr.op(), 0x01..=0x07)
            || (instr.op() == 0 && matches!(instr.funct(), 0x08 | 0x09))
    }

    // --- block tails ---

    /// Returns whether the block is an idle loop
    fn end_at_branch(&mut self, instr: Instruction, pc: u32, bus: &Bus) -> bool {
        self.regs.begin_instr();
        let delay_pc = pc.wrapping_add(4);
        let link_value = pc.wrapping_add(8);
        let delay = Instruction(bus.read32(delay_pc));

        // Evaluate the branch while its operands are still untouched by
        // the delay slot; the result parks in a frame slot
        let end = match instr.op() {
            0x02 => BlockEnd::Jump(instr.jump_dest(delay_pc)),
            0x03 => {
                self.regs.set_const(&mut self.asm, 31, link_value);
                BlockEnd::Jump(instr.jump_dest(delay_pc))
            }
            0x00 => {
                // JR / JALR
                let dest = self.regs.constant_of(instr.rs());
                let end = match dest {
                    Some(target) => BlockEnd::Jump(target),
                    None => {
                        let rs = self.regs.read(&mut self.asm, instr.rs());
                        self.asm.sw(rs, Sp, COND_SLOT);
                        BlockEnd::Indirect
                    }
                };
                if instr.funct() == 0x09 {
                    self.regs.set_const(&mut self.asm, instr.rd(), link_value);
                }
                end
            }
            0x01 => {
                // BCONDZ family; the link happens whether or not taken
                let is_bgez = instr.rt() & 0x01 != 0;
                let target = instr.branch_dest(delay_pc);
                let end = match self.regs.constant_of(instr.rs()) {
                    Some(v) => {
                        let test = (v as i32) >= 0;
                        let taken = if is_bgez { test } else { !test };
                        BlockEnd::Jump(if taken { target } else { link_value })
                    }
                    None => {
                        let rs = self.regs.read(&mut self.asm, instr.rs());
                        self.asm.sw(rs, Sp, COND_SLOT);
                        let kind = if is_bgez { CondKind::Gez } else { CondKind::Ltz };
                        BlockEnd::Cond(kind, target, link_value)
                    }
                };
                if instr.rt() & 0x10 != 0 {
                    self.regs.set_const(&mut self.asm, 31, link_value);
                }
                end
            }
            0x04 | 0x05 => {
                // BEQ / BNE on the xor of the operands
                let eq = instr.op() == 0x04;
                let target = instr.branch_dest(delay_pc);
                match (
                    self.regs.constant_of(instr.rs()),
                    self.regs.constant_of(instr.rt()),
                ) {
                    (Some(a), Some(b)) => {
                        let taken = (a == b) == eq;
                        BlockEnd::Jump(if taken { target } else { link_value })
                    }
                    _ => {
                        let ra = self.regs.read(&mut self.asm, instr.rs());
                        let rb = self.regs.read(&mut self.asm, instr.rt());
                        self.asm.xor_(T4, ra, rb);
                        self.asm.sw(T4, Sp, COND_SLOT);
                        let kind = if eq { CondKind::EqZero } else { CondKind::NeZero };
                        BlockEnd::Cond(kind, target, link_value)
                    }
                }
            }
            0x06 | 0x07 => {
                // BLEZ / BGTZ on the register value itself
                let lez = instr.op() == 0x06;
                let target = instr.branch_dest(delay_pc);
                match self.regs.constant_of(instr.rs()) {
                    Some(v) => {
                        let test = (v as i32) <= 0;
                        let taken = if lez { test } else { !test };
                        BlockEnd::Jump(if taken { target } else { link_value })
                    }
                    None => {
                        let rs = self.regs.read(&mut self.asm, instr.rs());
                        self.asm.sw(rs, Sp, COND_SLOT);
                        let kind = if lez { CondKind::Lez } else { CondKind::Gtz };
                        BlockEnd::Cond(kind, target, link_value)
                    }
                }
            }
            _ => unreachable!("not a branch"),
        };
        self.cycle_total += self.cycles.cost(instr) as u32;
        self.guest_len += 1;

        if delay.0 != 0 && !Self::is_branch(delay) {
            self.emit_instr(delay, delay_pc, true);
        } else {
            if delay.0 != 0 {
                // Branch in a delay slot is undefined on the R3000A
                log::warn!("branch in delay slot at 0x{:08X}, treated as NOP", delay_pc);
            }
            self.cycle_total += self.cycles.cost(delay) as u32;
        }
        self.guest_len += 1;

        self.regs.flush_dirty(&mut self.asm);
        self.charge_cycles();

        match end {
            BlockEnd::Jump(target) => {
                let idle = target == self.start_pc && self.guest_len <= 2 && self.pure;
                self.emit_exit_to(target);
                idle
            }
            BlockEnd::Cond(kind, target, fallthrough) => {
                self.asm.lw(T4, Sp, COND_SLOT);
                let taken = match kind {
                    CondKind::EqZero => self.asm.beq_fwd(T4, Zero),
                    CondKind::NeZero => self.asm.bne_fwd(T4, Zero),
                    CondKind::Lez => self.asm.blez_fwd(T4),
                    CondKind::Gtz => self.asm.bgtz_fwd(T4),
                    CondKind::Ltz => self.asm.bltz_fwd(T4),
                    CondKind::Gez => self.asm.bgez_fwd(T4),
                };
                self.asm.nop();
                self.emit_exit_to(fallthrough);
                self.asm.bind(taken);
                self.emit_exit_to(target);
                false
            }
            BlockEnd::Indirect => {
                self.emit_indirect_tail();
                false
            }
        }
    }

    /// Subtract the block's weighted cost from the budget register
    fn charge_cycles(&mut self) {
        let total = self.cycle_total.min(i16::MAX as u32) as i16;
        if total != 0 {
            self.asm.addiu(REG_CYCLES, REG_CYCLES, -total);
        }
    }

    /// Close a path: publish the next PC, exit on an exhausted budget,
    /// otherwise jump to the target block (directly when compiled and
    /// fresh, through the dispatch stub with a patch site otherwise)
    fn emit_exit_to(&mut self, target: u32) {
        self.asm.li(T5, target);
        self.asm.sw(T5, REG_CPU, offsets::PC as i16);

        let go = self.asm.bgtz_fwd(REG_CYCLES);
        self.asm.nop();
        self.asm.j(self.ptrs.addr(self.tramp.exit));
        self.asm.nop();
        self.asm.bind(go);

        match self.resolved_target(target) {
            Some(native) => {
                self.asm.j(native);
            }
            None => {
                let code_offset = self.asm.j(self.ptrs.addr(self.tramp.dispatch));
                self.links.push(PatchSite {
                    code_offset,
                    target_pc: target,
                });
            }
        }
        self.asm.nop();
    }

    /// Body address of an already-compiled, still-fresh block
    fn resolved_target(&self, target: u32) -> Option<u32> {
        let index = self.cache.lookup(target)?;
        let entry = self.cache.pool().get(index);
        if entry.page != NO_PAGE
            && (self.gens.get(entry.page as usize) != entry.page_gen
                || self.gens.get(entry.page2 as usize) != entry.page2_gen)
        {
            return None;
        }
        Some(self.ptrs.addr(entry.code_offset + PROLOGUE_WORDS * 4))
    }

    /// JR/JALR tail: budget check, then the inline 2-way hash probe
    fn emit_indirect_tail(&mut self) {
        self.asm.lw(T4, Sp, COND_SLOT);
        self.asm.sw(T4, REG_CPU, offsets::PC as i16);

        let go = self.asm.bgtz_fwd(REG_CYCLES);
        self.asm.nop();
        self.asm.j(self.ptrs.addr(self.tramp.exit));
        self.asm.nop();
        self.asm.bind(go);

        // set = ((pc >> 12) ^ pc) & 0xFFF, 16 bytes per set
        self.asm.srl(T5, T4, 12);
        self.asm.xor_(T5, T5, T4);
        self.asm.andi(T5, T5, 0xFFF);
        self.asm.sll(T5, T5, 4);
        self.asm.la(T6, self.ptrs.hash_base);
        self.asm.addu(T5, T6, T5);

        self.asm.lw(T6, T5, 0);
        let hit0 = self.asm.beq_fwd(T6, T4);
        self.asm.nop();
        self.asm.lw(T6, T5, 8);
        let hit1 = self.asm.beq_fwd(T6, T4);
        self.asm.nop();
        self.asm.j(self.ptrs.addr(self.tramp.dispatch));
        self.asm.nop();

        self.asm.bind(hit0);
        self.asm.lw(T7, T5, 4);
        self.asm.jr(T7);
        self.asm.nop();

        self.asm.bind(hit1);
        self.asm.lw(T7, T5, 12);
        self.asm.jr(T7);
        self.asm.nop();
    }

    /// Raise a guest exception through the helper and leave the block
    fn emit_trap(&mut self, code: u32, pc: u32, in_delay: bool) {
        self.pure = false;
        self.asm.move_(A0, REG_CPU);
        self.asm.li(A1, code | ((in_delay as u32) << 8));
        self.asm.li(A2, pc);
        self.asm.la(T9, tramp::helper_exception as usize as *const u8);
        self.asm.jal(self.ptrs.addr(self.tramp.call_c));
        self.asm.nop();
        self.asm.j(self.ptrs.addr(self.tramp.exit));
        self.asm.nop();
    }

    /// Poll the block-abort flag after a helper that may have raised
    fn emit_abort_poll(&mut self) {
        self.asm.lw(T5, REG_CPU, offsets::BLOCK_ABORTED as i16);
        let cont = self.asm.beq_fwd(T5, Zero);
        self.asm.nop();
        self.asm.j(self.ptrs.addr(self.tramp.exit));
        self.asm.nop();
        self.asm.bind(cont);
    }

    // --- straight-line instructions ---

    fn emit_instr(&mut self, instr: Instruction, pc: u32, in_delay: bool) {
        self.regs.begin_instr();
        self.cycle_total += self.cycles.cost(instr) as u32;

        match instr.op() {
            0x00 => self.emit_special(instr, pc, in_delay),
            0x08 => self.emit_add_imm(instr, pc, in_delay, true),
            0x09 => self.emit_add_imm(instr, pc, in_delay, false),
            0x0A => self.alu_imm(instr.rt(), instr.rs(), |a| ((a as i32) < instr.simm()) as u32, |asm, d, s| {
                asm.slti(d, s, instr.simm() as i16)
            }),
            0x0B => self.alu_imm(instr.rt(), instr.rs(), |a| (a < instr.simm() as u32) as u32, |asm, d, s| {
                asm.sltiu(d, s, instr.simm() as i16)
            }),
            0x0C => self.alu_imm(instr.rt(), instr.rs(), |a| a & instr.imm(), |asm, d, s| {
                asm.andi(d, s, instr.imm() as u16)
            }),
            0x0D => self.alu_imm(instr.rt(), instr.rs(), |a| a | instr.imm(), |asm, d, s| {
                asm.ori(d, s, instr.imm() as u16)
            }),
            0x0E => self.alu_imm(instr.rt(), instr.rs(), |a| a ^ instr.imm(), |asm, d, s| {
                asm.xori(d, s, instr.imm() as u16)
            }),
            0x0F => {
                let value = instr.imm() << 16;
                self.regs.set_const(&mut self.asm, instr.rt(), value);
            }
            0x10 => self.emit_cop0(instr, pc, in_delay),
            0x11 => self.emit_trap_inline(EXC_COP_UNUSABLE | (1 << 16), pc, in_delay),
            0x12 => self.emit_cop2(instr, pc, in_delay),
            0x13 => self.emit_trap_inline(EXC_COP_UNUSABLE | (3 << 16), pc, in_delay),
            0x20 => self.emit_load(instr, pc, in_delay, LoadKind::SignedByte),
            0x21 => self.emit_load(instr, pc, in_delay, LoadKind::SignedHalf),
            0x22 => self.emit_unaligned_load(instr, tramp::helper_lwl as usize as *const u8),
            0x23 => self.emit_load(instr, pc, in_delay, LoadKind::Word),
            0x24 => self.emit_load(instr, pc, in_delay, LoadKind::Byte),
            0x25 => self.emit_load(instr, pc, in_delay, LoadKind::Half),
            0x26 => self.emit_unaligned_load(instr, tramp::helper_lwr as usize as *const u8),
            0x28 => self.emit_store(instr, pc, in_delay, StoreKind::Byte),
            0x29 => self.emit_store(instr, pc, in_delay, StoreKind::Half),
            0x2A => self.emit_unaligned_store(instr, tramp::helper_swl as usize as *const u8),
            0x2B => self.emit_store(instr, pc, in_delay, StoreKind::Word),
            0x2E => self.emit_unaligned_store(instr, tramp::helper_swr as usize as *const u8),
            0x32 => self.emit_lwc2(instr, pc, in_delay),
            0x3A => self.emit_swc2(instr, pc, in_delay),
            _ => {
                log::warn!(
                    "compiling reserved opcode 0x{:02X} at 0x{:08X}",
                    instr.op(),
                    pc
                );
                self.emit_trap_inline(EXC_RESERVED, pc, in_delay);
            }
        }
    }

    fn emit_special(&mut self, instr: Instruction, pc: u32, in_delay: bool) {
        let (rs, rt, rd) = (instr.rs(), instr.rt(), instr.rd());
        match instr.funct() {
            0x00 => self.shift_imm(rd, rt, instr.shamt(), |a, s| a << s, |asm, d, r, s| asm.sll(d, r, s)),
            0x02 => self.shift_imm(rd, rt, instr.shamt(), |a, s| a >> s, |asm, d, r, s| asm.srl(d, r, s)),
            0x03 => self.shift_imm(rd, rt, instr.shamt(), |a, s| ((a as i32) >> s) as u32, |asm, d, r, s| {
                asm.sra(d, r, s)
            }),
            0x04 => self.alu3(rd, rt, rs, |a, b| a << (b & 31), |asm, d, x, y| asm.sllv(d, x, y)),
            0x06 => self.alu3(rd, rt, rs, |a, b| a >> (b & 31), |asm, d, x, y| asm.srlv(d, x, y)),
            0x07 => self.alu3(rd, rt, rs, |a, b| ((a as i32) >> (b & 31)) as u32, |asm, d, x, y| {
                asm.srav(d, x, y)
            }),
            0x10 => self.read_special(rd, offsets::HI),
            0x11 => self.write_special(rs, offsets::HI),
            0x12 => self.read_special(rd, offsets::LO),
            0x13 => self.write_special(rs, offsets::LO),
            0x18 => self.emit_mult(instr, true),
            0x19 => self.emit_mult(instr, false),
            0x1A => self.emit_div(instr),
            0x1B => self.emit_divu(instr),
            0x20 => self.emit_add_reg(instr, pc, in_delay, false),
            0x21 => self.alu3(rd, rs, rt, |a, b| a.wrapping_add(b), |asm, d, x, y| asm.addu(d, x, y)),
            0x22 => self.emit_add_reg(instr, pc, in_delay, true),
            0x23 => self.alu3(rd, rs, rt, |a, b| a.wrapping_sub(b), |asm, d, x, y| asm.subu(d, x, y)),
            0x24 => self.alu3(rd, rs, rt, |a, b| a & b, |asm, d, x, y| asm.and_(d, x, y)),
            0x25 => self.alu3(rd, rs, rt, |a, b| a | b, |asm, d, x, y| asm.or_(d, x, y)),
            0x26 => self.alu3(rd, rs, rt, |a, b| a ^ b, |asm, d, x, y| asm.xor_(d, x, y)),
            0x27 => self.alu3(rd, rs, rt, |a, b| !(a | b), |asm, d, x, y| asm.nor(d, x, y)),
            0x2A => self.alu3(rd, rs, rt, |a, b| ((a as i32) < (b as i32)) as u32, |asm, d, x, y| {
                asm.slt(d, x, y)
            }),
            0x2B => self.alu3(rd, rs, rt, |a, b| (a < b) as u32, |asm, d, x, y| asm.sltu(d, x, y)),
            _ => {
                log::warn!(
                    "compiling reserved SPECIAL 0x{:02X} at 0x{:08X}",
                    instr.funct(),
                    pc
                );
                self.emit_trap_inline(EXC_RESERVED, pc, in_delay);
            }
        }
    }

    /// Three-operand ALU with constant folding
    fn alu3(
        &mut self,
        rd: u8,
        a: u8,
        b: u8,
        fold: impl Fn(u32, u32) -> u32,
        emit: impl Fn(&mut Asm, HostReg, HostReg, HostReg),
    ) {
        if let (Some(x), Some(y)) = (self.regs.constant_of(a), self.regs.constant_of(b)) {
            self.regs.set_const(&mut self.asm, rd, fold(x, y));
            return;
        }
        let ra = self.regs.read(&mut self.asm, a);
        let rb = self.regs.read(&mut self.asm, b);
        let dest = self.regs.write_dest(rd);
        emit(&mut self.asm, dest, ra, rb);
        self.regs.commit(&mut self.asm, rd, dest);
    }

    /// Immediate ALU with constant folding
    fn alu_imm(
        &mut self,
        rt: u8,
        rs: u8,
        fold: impl Fn(u32) -> u32,
        emit: impl Fn(&mut Asm, HostReg, HostReg),
    ) {
        if let Some(a) = self.regs.constant_of(rs) {
            self.regs.set_const(&mut self.asm, rt, fold(a));
            return;
        }
        let ra = self.regs.read(&mut self.asm, rs);
        let dest = self.regs.write_dest(rt);
        emit(&mut self.asm, dest, ra);
        self.regs.commit(&mut self.asm, rt, dest);
    }

    fn shift_imm(
        &mut self,
        rd: u8,
        rt: u8,
        shamt: u8,
        fold: impl Fn(u32, u8) -> u32,
        emit: impl Fn(&mut Asm, HostReg, HostReg, u8),
    ) {
        if let Some(a) = self.regs.constant_of(rt) {
            self.regs.set_const(&mut self.asm, rd, fold(a, shamt));
            return;
        }
        let ra = self.regs.read(&mut self.asm, rt);
        let dest = self.regs.write_dest(rd);
        emit(&mut self.asm, dest, ra, shamt);
        self.regs.commit(&mut self.asm, rd, dest);
    }

    /// ADD/SUB with the signed-overflow trap. Folds when both operands
    /// are constants and the result cannot overflow; otherwise emits
    /// the sign-rule check and a conditional helper call.
    fn emit_add_reg(&mut self, instr: Instruction, pc: u32, in_delay: bool, sub: bool) {
        let (rs, rt, rd) = (instr.rs(), instr.rt(), instr.rd());
        if let (Some(a), Some(b)) = (self.regs.constant_of(rs), self.regs.constant_of(rt)) {
            let result = if sub {
                (a as i32).checked_sub(b as i32)
            } else {
                (a as i32).checked_add(b as i32)
            };
            if let Some(v) = result {
                self.regs.set_const(&mut self.asm, rd, v as u32);
                return;
            }
            // A compile-time overflow still traps at run time
        }
        let ra = self.regs.read(&mut self.asm, rs);
        let rb = self.regs.read(&mut self.asm, rt);
        if sub {
            self.asm.subu(T4, ra, rb);
            // Overflow iff the operands' signs differ and the result's
            // sign differs from the minuend's
            self.asm.xor_(T5, ra, rb);
        } else {
            self.asm.addu(T4, ra, rb);
            self.asm.xor_(T5, ra, rb);
            self.asm.nor(T5, T5, Zero);
        }
        self.asm.xor_(T6, ra, T4);
        self.asm.and_(T5, T5, T6);
        let ok = self.asm.bgez_fwd(T5);
        self.asm.nop();
        self.regs.emit_spills(&mut self.asm);
        self.emit_raise(EXC_OVERFLOW, pc, in_delay);
        self.asm.bind(ok);
        let dest = self.regs.write_dest(rd);
        self.asm.move_(dest, T4);
        self.regs.commit(&mut self.asm, rd, dest);
    }

    fn emit_add_imm(&mut self, instr: Instruction, pc: u32, in_delay: bool, trapping: bool) {
        let (rs, rt) = (instr.rs(), instr.rt());
        let imm = instr.simm();
        if let Some(a) = self.regs.constant_of(rs) {
            match (a as i32).checked_add(imm) {
                Some(v) => {
                    self.regs.set_const(&mut self.asm, rt, v as u32);
                    return;
                }
                None if !trapping => {
                    self.regs
                        .set_const(&mut self.asm, rt, a.wrapping_add(imm as u32));
                    return;
                }
                None => {}
            }
        }
        let ra = self.regs.read(&mut self.asm, rs);
        if !trapping {
            let dest = self.regs.write_dest(rt);
            self.asm.addiu(dest, ra, imm as i16);
            self.regs.commit(&mut self.asm, rt, dest);
            return;
        }
        self.asm.addiu(T4, ra, imm as i16);
        // Same sign rule as ADD with the immediate as the second operand
        self.asm.li(T5, imm as u32);
        self.asm.xor_(T5, ra, T5);
        self.asm.nor(T5, T5, Zero);
        self.asm.xor_(T6, ra, T4);
        self.asm.and_(T5, T5, T6);
        let ok = self.asm.bgez_fwd(T5);
        self.asm.nop();
        self.regs.emit_spills(&mut self.asm);
        self.emit_raise(EXC_OVERFLOW, pc, in_delay);
        self.asm.bind(ok);
        let dest = self.regs.write_dest(rt);
        self.asm.move_(dest, T4);
        self.regs.commit(&mut self.asm, rt, dest);
    }

    /// Helper call that raises an exception, then the abort exit
    fn emit_raise(&mut self, code: u32, pc: u32, in_delay: bool) {
        self.pure = false;
        self.asm.move_(A0, REG_CPU);
        self.asm.li(A1, code | ((in_delay as u32) << 8));
        self.asm.li(A2, pc);
        self.asm.la(T9, tramp::helper_exception as usize as *const u8);
        self.asm.jal(self.ptrs.addr(self.tramp.call_c));
        self.asm.nop();
        self.asm.j(self.ptrs.addr(self.tramp.exit));
        self.asm.nop();
    }

    /// Unconditional trap in the middle of straight-line code
    fn emit_trap_inline(&mut self, code: u32, pc: u32, in_delay: bool) {
        self.regs.flush_dirty(&mut self.asm);
        self.emit_raise(code, pc, in_delay);
    }

    fn read_special(&mut self, rd: u8, offset: usize) {
        let dest = self.regs.write_dest(rd);
        self.asm.lw(dest, REG_CPU, offset as i16);
        self.regs.commit(&mut self.asm, rd, dest);
    }

    fn write_special(&mut self, rs: u8, offset: usize) {
        let ra = self.regs.read(&mut self.asm, rs);
        self.asm.sw(ra, REG_CPU, offset as i16);
    }

    fn emit_mult(&mut self, instr: Instruction, signed: bool) {
        let ra = self.regs.read(&mut self.asm, instr.rs());
        let rb = self.regs.read(&mut self.asm, instr.rt());
        if signed {
            self.asm.mult(ra, rb);
        } else {
            self.asm.multu(ra, rb);
        }
        self.asm.mflo(T4);
        self.asm.sw(T4, REG_CPU, offsets::LO as i16);
        self.asm.mfhi(T4);
        self.asm.sw(T4, REG_CPU, offsets::HI as i16);
    }

    /// Signed divide with the R3000A's fixed results for a zero divisor
    /// and the 0x80000000/-1 overflow; the host divider never sees
    /// either case
    fn emit_div(&mut self, instr: Instruction) {
        let n = self.regs.read(&mut self.asm, instr.rs());
        let d = self.regs.read(&mut self.asm, instr.rt());

        let nonzero = self.asm.bne_fwd(d, Zero);
        self.asm.nop();
        self.asm.sw(n, REG_CPU, offsets::HI as i16);
        self.asm.slt(T4, n, Zero);
        self.asm.sll(T4, T4, 1);
        self.asm.addiu(T4, T4, -1);
        self.asm.sw(T4, REG_CPU, offsets::LO as i16);
        let done_zero = self.asm.beq_fwd(Zero, Zero);
        self.asm.nop();

        self.asm.bind(nonzero);
        self.asm.li(T4, 0x8000_0000);
        let normal_n = self.asm.bne_fwd(n, T4);
        self.asm.nop();
        self.asm.addiu(T5, Zero, -1);
        let normal_d = self.asm.bne_fwd(d, T5);
        self.asm.nop();
        self.asm.sw(T4, REG_CPU, offsets::LO as i16);
        self.asm.sw(Zero, REG_CPU, offsets::HI as i16);
        let done_ovf = self.asm.beq_fwd(Zero, Zero);
        self.asm.nop();

        self.asm.bind(normal_n);
        self.asm.bind(normal_d);
        self.asm.div(n, d);
        self.asm.mflo(T4);
        self.asm.sw(T4, REG_CPU, offsets::LO as i16);
        self.asm.mfhi(T4);
        self.asm.sw(T4, REG_CPU, offsets::HI as i16);

        self.asm.bind(done_zero);
        self.asm.bind(done_ovf);
    }

    fn emit_divu(&mut self, instr: Instruction) {
        let n = self.regs.read(&mut self.asm, instr.rs());
        let d = self.regs.read(&mut self.asm, instr.rt());

        let nonzero = self.asm.bne_fwd(d, Zero);
        self.asm.nop();
        self.asm.sw(n, REG_CPU, offsets::HI as i16);
        self.asm.addiu(T4, Zero, -1);
        self.asm.sw(T4, REG_CPU, offsets::LO as i16);
        let done = self.asm.beq_fwd(Zero, Zero);
        self.asm.nop();

        self.asm.bind(nonzero);
        self.asm.divu(n, d);
        self.asm.mflo(T4);
        self.asm.sw(T4, REG_CPU, offsets::LO as i16);
        self.asm.mfhi(T4);
        self.asm.sw(T4, REG_CPU, offsets::HI as i16);
        self.asm.bind(done);
    }

    // --- coprocessors ---

    fn emit_cop0(&mut self, instr: Instruction, pc: u32, in_delay: bool) {
        match instr.rs() {
            0x00 => {
                // MFC0
                let dest = self.regs.write_dest(instr.rt());
                self.asm
                    .lw(dest, REG_CPU, offsets::cop0(instr.rd() as usize) as i16);
                self.regs.commit(&mut self.asm, instr.rt(), dest);
            }
            0x04 => {
                // MTC0 through the helper for the SR/CAUSE side effects
                self.pure = false;
                self.regs.flush_dirty(&mut self.asm);
                let value = self.regs.read(&mut self.asm, instr.rt());
                self.asm.move_(A2, value);
                self.asm.move_(A0, REG_CPU);
                self.asm.li(A1, instr.rd() as u32);
                self.asm.la(T9, tramp::helper_mtc0 as usize as *const u8);
                self.asm.jal(self.ptrs.addr(self.tramp.call_c_lite));
                self.asm.nop();
            }
            0x10 if instr.funct() == 0x10 => {
                // RFE: pop the SR mode stack in place
                self.asm.lw(T4, REG_CPU, offsets::cop0(12) as i16);
                self.asm.srl(T5, T4, 2);
                self.asm.andi(T5, T5, 0xF);
                self.asm.srl(T4, T4, 4);
                self.asm.sll(T4, T4, 4);
                self.asm.or_(T4, T4, T5);
                self.asm.sw(T4, REG_CPU, offsets::cop0(12) as i16);
            }
            _ => self.emit_trap_inline(EXC_RESERVED, pc, in_delay),
        }
    }

    fn emit_cop2(&mut self, instr: Instruction, pc: u32, in_delay: bool) {
        self.emit_cop2_usable_check(pc, in_delay);

        if instr.0 & (1 << 25) != 0 {
            self.pure = false;
            self.regs.flush_dirty(&mut self.asm);
            self.asm.move_(A0, REG_CPU);
            self.asm.li(A1, instr.0);
            self.asm.la(T9, tramp::helper_gte_command as usize as *const u8);
            self.asm.jal(self.ptrs.addr(self.tramp.call_c_lite));
            self.asm.nop();
            return;
        }

        let data = offsets::COP2_DATA + instr.rd() as usize * 4;
        let ctrl = offsets::COP2_CTRL + instr.rd() as usize * 4;
        match instr.rs() {
            0x00 => {
                let dest = self.regs.write_dest(instr.rt());
                self.asm.lw(dest, REG_CPU, data as i16);
                self.regs.commit(&mut self.asm, instr.rt(), dest);
            }
            0x02 => {
                let dest = self.regs.write_dest(instr.rt());
                self.asm.lw(dest, REG_CPU, ctrl as i16);
                self.regs.commit(&mut self.asm, instr.rt(), dest);
            }
            0x04 => {
                let value = self.regs.read(&mut self.asm, instr.rt());
                self.asm.sw(value, REG_CPU, data as i16);
            }
            0x06 => {
                let value = self.regs.read(&mut self.asm, instr.rt());
                self.asm.sw(value, REG_CPU, ctrl as i16);
            }
            _ => self.emit_trap_inline(EXC_RESERVED, pc, in_delay),
        }
    }

    /// SR.CU2 gate shared by every COP2 form
    fn emit_cop2_usable_check(&mut self, pc: u32, in_delay: bool) {
        self.asm.lw(T4, REG_CPU, offsets::cop0(12) as i16);
        self.asm.srl(T4, T4, 30);
        self.asm.andi(T4, T4, 1);
        let usable = self.asm.bne_fwd(T4, Zero);
        self.asm.nop();
        self.regs.emit_spills(&mut self.asm);
        self.emit_raise(EXC_COP_UNUSABLE | (2 << 16), pc, in_delay);
        self.asm.bind(usable);
    }

    // --- memory ---

    fn emit_load(&mut self, instr: Instruction, pc: u32, in_delay: bool, kind: LoadKind) {
        let base = self.regs.read(&mut self.asm, instr.rs());
        self.asm.addiu(T4, base, instr.simm() as i16);

        let mut slow_fixups: Vec<Fixup> = Vec::new();
        if let Some(align) = kind.align_mask() {
            self.asm.andi(T5, T4, align);
            slow_fixups.push(self.asm.bne_fwd(T5, Zero));
            self.asm.nop();
        }

        // Read-LUT probe; a null page pointer detours to the helper
        self.asm.srl(T5, T4, 16);
        self.asm.sll(T5, T5, 2);
        self.asm.addu(T5, REG_LUT, T5);
        self.asm.lw(T5, T5, 0);
        slow_fixups.push(self.asm.beq_fwd(T5, Zero));
        self.asm.andi(T6, T4, 0xFFFF);
        self.asm.addu(T6, T5, T6);
        match kind {
            LoadKind::SignedByte => self.asm.lb(T7, T6, 0),
            LoadKind::Byte => self.asm.lbu(T7, T6, 0),
            LoadKind::SignedHalf => self.asm.lh(T7, T6, 0),
            LoadKind::Half => self.asm.lhu(T7, T6, 0),
            LoadKind::Word => self.asm.lw(T7, T6, 0),
        }
        let done = self.asm.beq_fwd(Zero, Zero);
        self.asm.nop();

        for fixup in slow_fixups {
            self.asm.bind(fixup);
        }
        self.regs.emit_spills(&mut self.asm);
        self.asm.move_(A1, T4);
        self.asm.move_(A0, REG_CPU);
        self.asm.li(A2, pc | in_delay as u32);
        self.asm.la(T9, kind.helper());
        self.asm.jal(self.ptrs.addr(self.tramp.call_c));
        self.asm.nop();
        self.emit_abort_poll();
        self.asm.move_(T7, V0);
        match kind {
            LoadKind::SignedByte => {
                self.asm.sll(T7, T7, 24);
                self.asm.sra(T7, T7, 24);
            }
            LoadKind::SignedHalf => {
                self.asm.sll(T7, T7, 16);
                self.asm.sra(T7, T7, 16);
            }
            _ => {}
        }

        self.asm.bind(done);
        let dest = self.regs.write_dest(instr.rt());
        self.asm.move_(dest, T7);
        self.regs.commit(&mut self.asm, instr.rt(), dest);
    }

    fn emit_store(&mut self, instr: Instruction, pc: u32, in_delay: bool, kind: StoreKind) {
        self.pure = false;
        let value = self.regs.read(&mut self.asm, instr.rt());
        let base = self.regs.read(&mut self.asm, instr.rs());
        self.asm.addiu(T4, base, instr.simm() as i16);

        let mut slow_fixups: Vec<Fixup> = Vec::new();
        if let Some(align) = kind.align_mask() {
            self.asm.andi(T5, T4, align);
            slow_fixups.push(self.asm.bne_fwd(T5, Zero));
            self.asm.nop();
        }

        // Write-LUT probe (BIOS pages are absent, stores to ROM detour
        // and get dropped by the bus)
        self.asm.la(T5, self.ptrs.write_lut);
        self.asm.srl(T6, T4, 16);
        self.asm.sll(T6, T6, 2);
        self.asm.addu(T5, T5, T6);
        self.asm.lw(T5, T5, 0);
        slow_fixups.push(self.asm.beq_fwd(T5, Zero));
        self.asm.andi(T6, T4, 0xFFFF);
        self.asm.addu(T6, T5, T6);
        match kind {
            StoreKind::Byte => self.asm.sb(value, T6, 0),
            StoreKind::Half => self.asm.sh(value, T6, 0),
            StoreKind::Word => self.asm.sw(value, T6, 0),
        }

        // Bump the page generation; a wrap evicts the page's blocks
        self.asm.and_(T5, T4, REG_PHYS_MASK);
        self.asm.li(T6, (RAM_SIZE - 1) as u32);
        self.asm.and_(T5, T5, T6);
        self.asm.srl(T5, T5, 12);
        self.asm.la(T6, self.ptrs.gen_base);
        self.asm.addu(T6, T6, T5);
        self.asm.lbu(T7, T6, 0);
        self.asm.addiu(T7, T7, 1);
        self.asm.andi(T7, T7, 0xFF);
        self.asm.sb(T7, T6, 0);
        let done_fast = self.asm.bne_fwd(T7, Zero);
        self.asm.nop();
        self.asm.move_(A0, REG_CPU);
        self.asm.move_(A1, T5);
        self.asm.la(T9, tramp::helper_smc_wrap as usize as *const u8);
        self.asm.jal(self.ptrs.addr(self.tramp.call_c_lite));
        self.asm.nop();
        let done_wrap = self.asm.beq_fwd(Zero, Zero);
        self.asm.nop();

        for fixup in slow_fixups {
            self.asm.bind(fixup);
        }
        self.regs.emit_spills(&mut self.asm);
        self.asm.move_(A1, T4);
        self.asm.move_(A2, value);
        self.asm.move_(A0, REG_CPU);
        self.asm.li(A3, pc | in_delay as u32);
        self.asm.la(T9, kind.helper());
        self.asm.jal(self.ptrs.addr(self.tramp.call_c));
        self.asm.nop();
        self.emit_abort_poll();

        self.asm.bind(done_fast);
        self.asm.bind(done_wrap);
    }

    /// LWL/LWR delegate wholesale: merge semantics live in the helper
    fn emit_unaligned_load(&mut self, instr: Instruction, helper: *const u8) {
        let cur = self.regs.read(&mut self.asm, instr.rt());
        let base = self.regs.read(&mut self.asm, instr.rs());
        self.regs.emit_spills(&mut self.asm);
        self.asm.addiu(T4, base, instr.simm() as i16);
        self.asm.move_(A2, cur);
        self.asm.move_(A1, T4);
        self.asm.move_(A0, REG_CPU);
        self.asm.la(T9, helper);
        self.asm.jal(self.ptrs.addr(self.tramp.call_c_lite));
        self.asm.nop();
        let dest = self.regs.write_dest(instr.rt());
        self.asm.move_(dest, V0);
        self.regs.commit(&mut self.asm, instr.rt(), dest);
    }

    fn emit_unaligned_store(&mut self, instr: Instruction, helper: *const u8) {
        self.pure = false;
        let value = self.regs.read(&mut self.asm, instr.rt());
        let base = self.regs.read(&mut self.asm, instr.rs());
        self.regs.emit_spills(&mut self.asm);
        self.asm.addiu(T4, base, instr.simm() as i16);
        self.asm.move_(A2, value);
        self.asm.move_(A1, T4);
        self.asm.move_(A0, REG_CPU);
        self.asm.la(T9, helper);
        self.asm.jal(self.ptrs.addr(self.tramp.call_c_lite));
        self.asm.nop();
    }

    fn emit_lwc2(&mut self, instr: Instruction, pc: u32, in_delay: bool) {
        self.emit_cop2_usable_check(pc, in_delay);
        let base = self.regs.read(&mut self.asm, instr.rs());
        self.regs.emit_spills(&mut self.asm);
        self.asm.addiu(T4, base, instr.simm() as i16);
        self.asm.move_(A1, T4);
        self.asm.move_(A0, REG_CPU);
        self.asm.li(A2, pc | in_delay as u32);
        self.asm.la(T9, tramp::helper_read32 as usize as *const u8);
        self.asm.jal(self.ptrs.addr(self.tramp.call_c));
        self.asm.nop();
        self.emit_abort_poll();
        self.asm
            .sw(V0, REG_CPU, (offsets::COP2_DATA + instr.rt() as usize * 4) as i16);
    }

    fn emit_swc2(&mut self, instr: Instruction, pc: u32, in_delay: bool) {
        self.pure = false;
        self.emit_cop2_usable_check(pc, in_delay);
        let base = self.regs.read(&mut self.asm, instr.rs());
        self.regs.emit_spills(&mut self.asm);
        self.asm.addiu(T4, base, instr.simm() as i16);
        self.asm
            .lw(A2, REG_CPU, (offsets::COP2_DATA + instr.rt() as usize * 4) as i16);
        self.asm.move_(A1, T4);
        self.asm.move_(A0, REG_CPU);
        self.asm.li(A3, pc | in_delay as u32);
        self.asm.la(T9, tramp::helper_write32 as usize as *const u8);
        self.asm.jal(self.ptrs.addr(self.tramp.call_c));
        self.asm.nop();
        self.emit_abort_poll();
    }
}

/// Helper selection per load flavor
#[derive(Clone, Copy)]
enum LoadKind {
    SignedByte,
    Byte,
    SignedHalf,
    Half,
    Word,
}

impl LoadKind {
    fn align_mask(self) -> Option<u16> {
        match self {
            LoadKind::SignedByte | LoadKind::Byte => None,
            LoadKind::SignedHalf | LoadKind::Half => Some(1),
            LoadKind::Word => Some(3),
        }
    }

    fn helper(self) -> *const u8 {
        match self {
            LoadKind::SignedByte | LoadKind::Byte => tramp::helper_read8 as usize as *const u8,
            LoadKind::SignedHalf | LoadKind::Half => tramp::helper_read16 as usize as *const u8,
            LoadKind::Word => tramp::helper_read32 as usize as *const u8,
        }
    }
}

#[derive(Clone, Copy)]
enum StoreKind {
    Byte,
    Half,
    Word,
}

impl StoreKind {
    fn align_mask(self) -> Option<u16> {
        match self {
            StoreKind::Byte => None,
            StoreKind::Half => Some(1),
            StoreKind::Word => Some(3),
        }
    }

    fn helper(self) -> *const u8 {
        match self {
            StoreKind::Byte => tramp::helper_write8 as usize as *const u8,
            StoreKind::Half => tramp::helper_write16 as usize as *const u8,
            StoreKind::Word => tramp::helper_write32 as usize as *const u8,
        }
    }
}

/// Page-generation snapshots for a freshly compiled block window
pub(super) fn page_snapshot(
    start_pc: u32,
    guest_len: u16,
    gens: &PageGenerations,
) -> (u16, u8, u16, u8) {
    use crate::core::dynarec::block::CodeRegion;
    match classify_pc(start_pc) {
        Some((CodeRegion::Ram, offset)) => {
            let first = ((offset as usize & (RAM_SIZE - 1)) >> 12) as u16;
            let last_offset = offset as usize + (guest_len.max(1) as usize - 1) * 4;
            let last = ((last_offset & (RAM_SIZE - 1)) >> 12) as u16;
            (first, gens.get(first as usize), last, gens.get(last as usize))
        }
        _ => (NO_PAGE, 0, NO_PAGE, 0),
    }
}
