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

//! Portable interpreter backend
//!
//! Executes the R3000A instruction set one step at a time against the
//! shared CPU state and memory bus. This is the execution engine on
//! hosts that cannot run the recompiler's generated MIPS code, and the
//! reference semantics its translations are tested against.
//!
//! The pending load-delay writeback is flushed at each instruction
//! boundary, matching what the recompiler emits. Branch delay slots use
//! the `pc`/`next_pc` pair: a branch rewrites `next_pc`, so the
//! following fetch naturally executes the delay slot first.

use crate::core::cpu::{Cpu, CycleTable, ExceptionCause, Instruction};
use crate::core::memory::Bus;

mod alu;
mod branch;
mod cop;
mod mem;
mod mult;

impl Cpu {
    /// Fetch, decode, and execute one instruction
    ///
    /// Returns the weighted cycle cost of the executed instruction.
    /// Guest exceptions are handled internally (COP0 update + vector
    /// redirect) and still consume a cycle.
    pub fn step(&mut self, bus: &mut Bus, cycles: &CycleTable) -> u32 {
        self.in_branch_delay = self.branch_pending;
        self.branch_pending = false;
        self.flush_load_delay();

        self.current_pc = self.pc;
        if self.current_pc & 3 != 0 {
            self.address_exception(ExceptionCause::AddressErrorLoad, self.current_pc);
            return 1;
        }

        let instr = Instruction(bus.read32(self.current_pc));

        // Advance through the delay-slot pipeline
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);

        let cost = cycles.cost(instr) as u32;
        self.execute(instr, bus);
        cost
    }

    fn execute(&mut self, instr: Instruction, bus: &mut Bus) {
        match instr.op() {
            0x00 => self.execute_special(instr),
            0x01 => self.op_bcondz(instr),
            0x02 => self.op_j(instr),
            0x03 => self.op_jal(instr),
            0x04 => self.op_beq(instr),
            0x05 => self.op_bne(instr),
            0x06 => self.op_blez(instr),
            0x07 => self.op_bgtz(instr),
            0x08 => self.op_addi(instr),
            0x09 => self.op_addiu(instr),
            0x0A => self.op_slti(instr),
            0x0B => self.op_sltiu(instr),
            0x0C => self.op_andi(instr),
            0x0D => self.op_ori(instr),
            0x0E => self.op_xori(instr),
            0x0F => self.op_lui(instr),
            0x10 => self.op_cop0(instr, bus),
            0x11 => self.coprocessor_unusable(1),
            0x12 => self.op_cop2(instr),
            0x13 => self.coprocessor_unusable(3),
            0x20 => self.op_lb(instr, bus),
            0x21 => self.op_lh(instr, bus),
            0x22 => self.op_lwl(instr, bus),
            0x23 => self.op_lw(instr, bus),
            0x24 => self.op_lbu(instr, bus),
            0x25 => self.op_lhu(instr, bus),
            0x26 => self.op_lwr(instr, bus),
            0x28 => self.op_sb(instr, bus),
            0x29 => self.op_sh(instr, bus),
            0x2A => self.op_swl(instr, bus),
            0x2B => self.op_sw(instr, bus),
            0x2E => self.op_swr(instr, bus),
            0x32 => self.op_lwc2(instr, bus),
            0x3A => self.op_swc2(instr, bus),
            _ => {
                log::warn!(
                    "reserved instruction 0x{:08X} at 0x{:08X}",
                    instr.0,
                    self.current_pc
                );
                self.exception(ExceptionCause::ReservedInstruction);
            }
        }
    }

    fn execute_special(&mut self, instr: Instruction) {
        match instr.funct() {
            0x00 => self.op_sll(instr),
            0x02 => self.op_srl(instr),
            0x03 => self.op_sra(instr),
            0x04 => self.op_sllv(instr),
            0x06 => self.op_srlv(instr),
            0x07 => self.op_srav(instr),
            0x08 => self.op_jr(instr),
            0x09 => self.op_jalr(instr),
            0x0C => self.op_syscall(),
            0x0D => self.op_break(),
            0x10 => self.op_mfhi(instr),
            0x11 => self.op_mthi(instr),
            0x12 => self.op_mflo(instr),
            0x13 => self.op_mtlo(instr),
            0x18 => self.op_mult(instr),
            0x19 => self.op_multu(instr),
            0x1A => self.op_div(instr),
            0x1B => self.op_divu(instr),
            0x20 => self.op_add(instr),
            0x21 => self.op_addu(instr),
            0x22 => self.op_sub(instr),
            0x23 => self.op_subu(instr),
            0x24 => self.op_and(instr),
            0x25 => self.op_or(instr),
            0x26 => self.op_xor(instr),
            0x27 => self.op_nor(instr),
            0x2A => self.op_slt(instr),
            0x2B => self.op_sltu(instr),
            _ => {
                log::warn!(
                    "reserved SPECIAL function 0x{:02X} at 0x{:08X}",
                    instr.funct(),
                    self.current_pc
                );
                self.exception(ExceptionCause::ReservedInstruction);
            }
        }
    }

    /// Take a relative branch; the offset is from the delay slot
    pub(super) fn branch(&mut self, offset: i32) {
        self.next_pc = self.pc.wrapping_add(offset as u32);
        self.branch_pending = true;
    }

    /// Jump to an absolute destination
    pub(super) fn jump(&mut self, dest: u32) {
        self.next_pc = dest;
        self.branch_pending = true;
    }
}
