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

//! Dispatch trampolines and the helper call ABI
//!
//! Three stubs are pre-emitted at the bottom of the code buffer and
//! survive every cache flush:
//!
//! - **exit**: writes the pinned guest registers and the cycle counter
//!   back to the CPU struct, restores the host callee-saves, and
//!   returns the remaining budget to the execution loop.
//! - **call-C** (and a lite variant): bridges from generated code to a
//!   Rust helper whose address sits in `t9`. The full variant spills
//!   the pinned guest registers around the call so the helper sees a
//!   current CPU struct; the lite variant skips that for helpers that
//!   never look at guest registers.
//! - **indirect-jump**: taken on a JR/JALR hash miss or an unresolved
//!   direct link. Asks [`helper_lookup_block`] for a translation of
//!   `cpu.pc`; jumps to it on a hit, otherwise exits so the loop can
//!   compile the target inside a proper emission session.
//!
//! Every block shares one stack frame shape, built by the block
//! prologue and torn down by the exit stub, so control may hop from
//! block to block without touching the frame.
//!
//! The Rust helpers at the bottom are the slow paths generated code
//! calls through the bridges: typed memory access, exception raising,
//! MTC0 side effects, GTE commands, and block lookup. They find the bus
//! and the recompiler through the [`JitContext`] the execution loop
//! plants in the CPU state before entering a block.

use crate::core::cpu::{offsets, Cpu, ExceptionCause};
use crate::core::dynarec::emit::{Asm, HostReg};
use crate::core::dynarec::regcache::{
    REG_CPU, REG_CYCLES, REG_GUEST_RA, REG_GUEST_S8, REG_GUEST_SP, REG_GUEST_V0, REG_LUT,
    REG_PHYS_MASK,
};
use crate::core::dynarec::Dynarec;
use crate::core::memory::Bus;

/// Shared stack frame size (o32, 16-byte aligned)
pub const FRAME_SIZE: i16 = 64;

/// Spill slot for branch conditions and indirect-jump targets across
/// delay-slot emission
pub const COND_SLOT: i16 = 16;

/// Spill slot for the intra-block return address during helper calls
pub const RA_SLOT: i16 = 20;

/// Callee-save area: s0..s7 then ra
const S_SAVE: i16 = 24;
const RA_SAVE: i16 = 56;

/// Words in every block prologue; direct links jump past it
pub const PROLOGUE_WORDS: u32 = 20;

/// Code-buffer offsets of the pre-emitted stubs
#[derive(Debug, Clone, Copy)]
pub struct Trampolines {
    pub exit: u32,
    pub call_c: u32,
    pub call_c_lite: u32,
    pub dispatch: u32,
}

/// Pointers generated code needs baked in as immediates
#[derive(Clone, Copy)]
pub struct JitPointers {
    pub read_lut: *const u8,
    pub write_lut: *const u8,
    pub gen_base: *const u8,
    pub hash_base: *const u8,
    /// Host address of the buffer start; offsets + this = jump targets
    pub buf_base: usize,
}

impl JitPointers {
    /// Absolute host address of a code-buffer offset
    pub fn addr(&self, offset: u32) -> u32 {
        (self.buf_base + offset as usize) as u32
    }
}

const S_REGS: [HostReg; 8] = [
    HostReg::S0,
    HostReg::S1,
    HostReg::S2,
    HostReg::S3,
    HostReg::S4,
    HostReg::S5,
    HostReg::S6,
    HostReg::S7,
];

/// Emit the block prologue: build the frame, save callee-saves, load
/// the pinned registers. Exactly [`PROLOGUE_WORDS`] words.
pub fn emit_prologue(asm: &mut Asm, ptrs: &JitPointers) {
    let start = asm.here();

    asm.addiu(HostReg::Sp, HostReg::Sp, -FRAME_SIZE);
    asm.sw(HostReg::Ra, HostReg::Sp, RA_SAVE);
    for (i, reg) in S_REGS.iter().enumerate() {
        asm.sw(*reg, HostReg::Sp, S_SAVE + (i as i16) * 4);
    }
    asm.move_(REG_CPU, HostReg::A0);
    asm.move_(REG_CYCLES, HostReg::A3);
    asm.lw(REG_GUEST_SP, REG_CPU, offsets::gpr(29) as i16);
    asm.lw(REG_GUEST_RA, REG_CPU, offsets::gpr(31) as i16);
    asm.lw(REG_GUEST_V0, REG_CPU, offsets::gpr(2) as i16);
    asm.lw(REG_GUEST_S8, REG_CPU, offsets::gpr(30) as i16);
    asm.li32(REG_PHYS_MASK, 0x1FFF_FFFF);
    asm.la32(REG_LUT, ptrs.read_lut);

    debug_assert_eq!(asm.here() - start, PROLOGUE_WORDS * 4);
}

/// Emit the three shared stubs at the bottom of a fresh buffer
pub fn emit_trampolines(asm: &mut Asm, buf_base: usize) -> Trampolines {
    // --- exit ---
    let exit = asm.here();
    asm.sw(REG_GUEST_SP, REG_CPU, offsets::gpr(29) as i16);
    asm.sw(REG_GUEST_RA, REG_CPU, offsets::gpr(31) as i16);
    asm.sw(REG_GUEST_V0, REG_CPU, offsets::gpr(2) as i16);
    asm.sw(REG_GUEST_S8, REG_CPU, offsets::gpr(30) as i16);
    asm.sw(REG_CYCLES, REG_CPU, offsets::CYCLES_LEFT as i16);
    asm.move_(HostReg::V0, REG_CYCLES);
    asm.lw(HostReg::Ra, HostReg::Sp, RA_SAVE);
    for (i, reg) in S_REGS.iter().enumerate() {
        asm.lw(*reg, HostReg::Sp, S_SAVE + (i as i16) * 4);
    }
    asm.addiu(HostReg::Sp, HostReg::Sp, FRAME_SIZE);
    asm.jr(HostReg::Ra);
    asm.nop();

    // --- call-C: helper in t9, args in a0..a3 ---
    let call_c = asm.here();
    asm.sw(HostReg::Ra, HostReg::Sp, RA_SLOT);
    asm.sw(REG_GUEST_SP, REG_CPU, offsets::gpr(29) as i16);
    asm.sw(REG_GUEST_RA, REG_CPU, offsets::gpr(31) as i16);
    asm.sw(REG_GUEST_V0, REG_CPU, offsets::gpr(2) as i16);
    asm.sw(REG_GUEST_S8, REG_CPU, offsets::gpr(30) as i16);
    asm.jalr(HostReg::T9);
    asm.nop();
    asm.lw(REG_GUEST_SP, REG_CPU, offsets::gpr(29) as i16);
    asm.lw(REG_GUEST_RA, REG_CPU, offsets::gpr(31) as i16);
    asm.lw(REG_GUEST_V0, REG_CPU, offsets::gpr(2) as i16);
    asm.lw(REG_GUEST_S8, REG_CPU, offsets::gpr(30) as i16);
    asm.lw(HostReg::Ra, HostReg::Sp, RA_SLOT);
    asm.jr(HostReg::Ra);
    asm.nop();

    // --- call-C lite: helper never touches guest registers ---
    let call_c_lite = asm.here();
    asm.sw(HostReg::Ra, HostReg::Sp, RA_SLOT);
    asm.jalr(HostReg::T9);
    asm.nop();
    asm.lw(HostReg::Ra, HostReg::Sp, RA_SLOT);
    asm.jr(HostReg::Ra);
    asm.nop();

    // --- indirect-jump dispatch: cpu.pc holds the guest target ---
    let dispatch = asm.here();
    asm.move_(HostReg::A0, REG_CPU);
    asm.la32(HostReg::T9, helper_lookup_block as usize as *const u8);
    asm.jalr(HostReg::T9);
    asm.nop();
    let hit = asm.bne_fwd(HostReg::V0, HostReg::Zero);
    asm.nop();
    asm.j((buf_base + exit as usize) as u32);
    asm.nop();
    asm.bind(hit);
    asm.jr(HostReg::V0);
    asm.nop();

    Trampolines {
        exit,
        call_c,
        call_c_lite,
        dispatch,
    }
}

/// Context block the execution loop points `cpu.jit_bus` at while a
/// compiled block is running
#[repr(C)]
pub struct JitContext {
    pub bus: *mut Bus,
    pub dynarec: *mut Dynarec,
}

/// # Safety
///
/// `cpu` must carry a live `JitContext`; only the execution loop's
/// block entry establishes that.
unsafe fn parts<'a>(cpu: *mut Cpu) -> (&'a mut Cpu, &'a mut Bus, &'a mut Dynarec) {
    let cpu = &mut *cpu;
    let ctx = &mut *(cpu.jit_bus as *mut JitContext);
    (cpu, &mut *ctx.bus, &mut *ctx.dynarec)
}

/// Split a `pc | bd` word: bit 0 marks a delay-slot instruction
unsafe fn fault_site(cpu: &mut Cpu, pc_bd: u32) {
    cpu.current_pc = pc_bd & !1;
    cpu.in_branch_delay = pc_bd & 1 != 0;
}

pub unsafe extern "C" fn helper_read8(cpu: *mut Cpu, addr: u32, _pc_bd: u32) -> u32 {
    let (_, bus, _) = parts(cpu);
    bus.read8(addr) as u32
}

pub unsafe extern "C" fn helper_read16(cpu: *mut Cpu, addr: u32, pc_bd: u32) -> u32 {
    let (cpu, bus, _) = parts(cpu);
    if addr & 1 != 0 {
        fault_site(cpu, pc_bd);
        cpu.address_exception(ExceptionCause::AddressErrorLoad, addr);
        return 0;
    }
    bus.read16(addr) as u32
}

pub unsafe extern "C" fn helper_read32(cpu: *mut Cpu, addr: u32, pc_bd: u32) -> u32 {
    let (cpu, bus, _) = parts(cpu);
    if addr & 3 != 0 {
        fault_site(cpu, pc_bd);
        cpu.address_exception(ExceptionCause::AddressErrorLoad, addr);
        return 0;
    }
    bus.read32(addr)
}

pub unsafe extern "C" fn helper_write8(cpu: *mut Cpu, addr: u32, value: u32, _pc_bd: u32) {
    let (_, bus, _) = parts(cpu);
    bus.write8(addr, value as u8);
}

pub unsafe extern "C" fn helper_write16(cpu: *mut Cpu, addr: u32, value: u32, pc_bd: u32) {
    let (cpu, bus, _) = parts(cpu);
    if addr & 1 != 0 {
        fault_site(cpu, pc_bd);
        cpu.address_exception(ExceptionCause::AddressErrorStore, addr);
        return;
    }
    bus.write16(addr, value as u16);
}

pub unsafe extern "C" fn helper_write32(cpu: *mut Cpu, addr: u32, value: u32, pc_bd: u32) {
    let (cpu, bus, _) = parts(cpu);
    if addr & 3 != 0 {
        fault_site(cpu, pc_bd);
        cpu.address_exception(ExceptionCause::AddressErrorStore, addr);
        return;
    }
    bus.write32(addr, value);
}

pub unsafe extern "C" fn helper_lwl(cpu: *mut Cpu, addr: u32, cur: u32) -> u32 {
    let (_, bus, _) = parts(cpu);
    let word = bus.read32(addr & !3);
    match addr & 3 {
        0 => (cur & 0x00FF_FFFF) | (word << 24),
        1 => (cur & 0x0000_FFFF) | (word << 16),
        2 => (cur & 0x0000_00FF) | (word << 8),
        _ => word,
    }
}

pub unsafe extern "C" fn helper_lwr(cpu: *mut Cpu, addr: u32, cur: u32) -> u32 {
    let (_, bus, _) = parts(cpu);
    let word = bus.read32(addr & !3);
    match addr & 3 {
        0 => word,
        1 => (cur & 0xFF00_0000) | (word >> 8),
        2 => (cur & 0xFFFF_0000) | (word >> 16),
        _ => (cur & 0xFFFF_FF00) | (word >> 24),
    }
}

pub unsafe extern "C" fn helper_swl(cpu: *mut Cpu, addr: u32, rt: u32) {
    let (_, bus, _) = parts(cpu);
    let aligned = addr & !3;
    let cur = bus.read32(aligned);
    let value = match addr & 3 {
        0 => (cur & 0xFFFF_FF00) | (rt >> 24),
        1 => (cur & 0xFFFF_0000) | (rt >> 16),
        2 => (cur & 0xFF00_0000) | (rt >> 8),
        _ => rt,
    };
    bus.write32(aligned, value);
}

pub unsafe extern "C" fn helper_swr(cpu: *mut Cpu, addr: u32, rt: u32) {
    let (_, bus, _) = parts(cpu);
    let aligned = addr & !3;
    let cur = bus.read32(aligned);
    let value = match addr & 3 {
        0 => rt,
        1 => (cur & 0x0000_00FF) | (rt << 8),
        2 => (cur & 0x0000_FFFF) | (rt << 16),
        _ => (cur & 0x00FF_FFFF) | (rt << 24),
    };
    bus.write32(aligned, value);
}

/// `code_bd` carries the exception code in bits [7:0], the delay-slot
/// flag in bit 8, and the offending coprocessor number in bits [17:16]
pub unsafe extern "C" fn helper_exception(cpu: *mut Cpu, code_bd: u32, pc: u32) {
    let (cpu, _, _) = parts(cpu);
    cpu.current_pc = pc;
    cpu.in_branch_delay = code_bd & 0x100 != 0;
    match code_bd & 0xFF {
        8 => cpu.exception(ExceptionCause::Syscall),
        9 => cpu.exception(ExceptionCause::Breakpoint),
        11 => cpu.coprocessor_unusable((code_bd >> 16) & 3),
        12 => cpu.exception(ExceptionCause::Overflow),
        _ => cpu.exception(ExceptionCause::ReservedInstruction),
    }
}

pub unsafe extern "C" fn helper_mtc0(cpu: *mut Cpu, reg: u32, value: u32) {
    use crate::core::cpu::{Status, CAUSE, SR};
    let (cpu, bus, _) = parts(cpu);
    match reg as usize {
        SR => {
            cpu.cop0[SR] = value;
            bus.set_cache_isolated(Status::from_bits_retain(value).contains(Status::ISC));
        }
        CAUSE => {
            cpu.cop0[CAUSE] = (cpu.cop0[CAUSE] & !0x300) | (value & 0x300);
        }
        r => cpu.cop0[r & 31] = value,
    }
}

pub unsafe extern "C" fn helper_gte_command(cpu: *mut Cpu, word: u32) {
    let (cpu, _, _) = parts(cpu);
    cpu.gte.execute(word);
}

/// Generation counter wrapped on a store fast path: every block on the
/// page may now alias the wrapped snapshot, drop them all
pub unsafe extern "C" fn helper_smc_wrap(cpu: *mut Cpu, page: u32) {
    let (_, _, dynarec) = parts(cpu);
    dynarec.evict_page(page);
}

/// Translate `cpu.pc`; returns the native body address or 0.
/// Installs hits into the indirect-jump hash on the way out.
pub unsafe extern "C" fn helper_lookup_block(cpu: *mut Cpu) -> u32 {
    let (cpu, bus, dynarec) = parts(cpu);
    let pc = cpu.pc;
    match dynarec.lookup(pc, bus.page_gens()) {
        Some(index) => {
            let native = dynarec.body_addr(index);
            dynarec.hash_mut().insert(pc, native);
            native
        }
        None => 0,
    }
}
