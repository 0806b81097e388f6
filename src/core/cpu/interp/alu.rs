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

//! Arithmetic, logical, shift, and comparison instructions

use crate::core::cpu::{Cpu, ExceptionCause, Instruction};

impl Cpu {
    /// ADD: add with signed overflow exception
    pub(super) fn op_add(&mut self, i: Instruction) {
        let a = self.reg(i.rs()) as i32;
        let b = self.reg(i.rt()) as i32;
        match a.checked_add(b) {
            Some(result) => self.set_reg(i.rd(), result as u32),
            None => self.exception(ExceptionCause::Overflow),
        }
    }

    /// ADDU: add, wrapping
    pub(super) fn op_addu(&mut self, i: Instruction) {
        let result = self.reg(i.rs()).wrapping_add(self.reg(i.rt()));
        self.set_reg(i.rd(), result);
    }

    /// SUB: subtract with signed overflow exception
    pub(super) fn op_sub(&mut self, i: Instruction) {
        let a = self.reg(i.rs()) as i32;
        let b = self.reg(i.rt()) as i32;
        match a.checked_sub(b) {
            Some(result) => self.set_reg(i.rd(), result as u32),
            None => self.exception(ExceptionCause::Overflow),
        }
    }

    /// SUBU: subtract, wrapping
    pub(super) fn op_subu(&mut self, i: Instruction) {
        let result = self.reg(i.rs()).wrapping_sub(self.reg(i.rt()));
        self.set_reg(i.rd(), result);
    }

    /// ADDI: add immediate with signed overflow exception
    pub(super) fn op_addi(&mut self, i: Instruction) {
        let a = self.reg(i.rs()) as i32;
        match a.checked_add(i.simm()) {
            Some(result) => self.set_reg(i.rt(), result as u32),
            None => self.exception(ExceptionCause::Overflow),
        }
    }

    /// ADDIU: add immediate, wrapping
    pub(super) fn op_addiu(&mut self, i: Instruction) {
        let result = self.reg(i.rs()).wrapping_add(i.simm() as u32);
        self.set_reg(i.rt(), result);
    }

    /// SLT: set on less than, signed
    pub(super) fn op_slt(&mut self, i: Instruction) {
        let result = (self.reg(i.rs()) as i32) < (self.reg(i.rt()) as i32);
        self.set_reg(i.rd(), result as u32);
    }

    /// SLTU: set on less than, unsigned
    pub(super) fn op_sltu(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) < self.reg(i.rt());
        self.set_reg(i.rd(), result as u32);
    }

    /// SLTI: set on less than immediate, signed
    pub(super) fn op_slti(&mut self, i: Instruction) {
        let result = (self.reg(i.rs()) as i32) < i.simm();
        self.set_reg(i.rt(), result as u32);
    }

    /// SLTIU: set on less than immediate; the immediate is sign-extended
    /// but the compare is unsigned
    pub(super) fn op_sltiu(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) < (i.simm() as u32);
        self.set_reg(i.rt(), result as u32);
    }

    /// AND
    pub(super) fn op_and(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) & self.reg(i.rt());
        self.set_reg(i.rd(), result);
    }

    /// OR
    pub(super) fn op_or(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) | self.reg(i.rt());
        self.set_reg(i.rd(), result);
    }

    /// XOR
    pub(super) fn op_xor(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) ^ self.reg(i.rt());
        self.set_reg(i.rd(), result);
    }

    /// NOR
    pub(super) fn op_nor(&mut self, i: Instruction) {
        let result = !(self.reg(i.rs()) | self.reg(i.rt()));
        self.set_reg(i.rd(), result);
    }

    /// ANDI: and with zero-extended immediate
    pub(super) fn op_andi(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) & i.imm();
        self.set_reg(i.rt(), result);
    }

    /// ORI: or with zero-extended immediate
    pub(super) fn op_ori(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) | i.imm();
        self.set_reg(i.rt(), result);
    }

    /// XORI: xor with zero-extended immediate
    pub(super) fn op_xori(&mut self, i: Instruction) {
        let result = self.reg(i.rs()) ^ i.imm();
        self.set_reg(i.rt(), result);
    }

    /// LUI: load upper immediate
    pub(super) fn op_lui(&mut self, i: Instruction) {
        self.set_reg(i.rt(), i.imm() << 16);
    }

    /// SLL: shift left logical (SLL r0,r0,0 is the canonical NOP)
    pub(super) fn op_sll(&mut self, i: Instruction) {
        let result = self.reg(i.rt()) << i.shamt();
        self.set_reg(i.rd(), result);
    }

    /// SRL: shift right logical
    pub(super) fn op_srl(&mut self, i: Instruction) {
        let result = self.reg(i.rt()) >> i.shamt();
        self.set_reg(i.rd(), result);
    }

    /// SRA: shift right arithmetic
    pub(super) fn op_sra(&mut self, i: Instruction) {
        let result = (self.reg(i.rt()) as i32) >> i.shamt();
        self.set_reg(i.rd(), result as u32);
    }

    /// SLLV: shift left logical by register (low 5 bits)
    pub(super) fn op_sllv(&mut self, i: Instruction) {
        let result = self.reg(i.rt()) << (self.reg(i.rs()) & 0x1F);
        self.set_reg(i.rd(), result);
    }

    /// SRLV: shift right logical by register
    pub(super) fn op_srlv(&mut self, i: Instruction) {
        let result = self.reg(i.rt()) >> (self.reg(i.rs()) & 0x1F);
        self.set_reg(i.rd(), result);
    }

    /// SRAV: shift right arithmetic by register
    pub(super) fn op_srav(&mut self, i: Instruction) {
        let result = (self.reg(i.rt()) as i32) >> (self.reg(i.rs()) & 0x1F);
        self.set_reg(i.rd(), result as u32);
    }
}
