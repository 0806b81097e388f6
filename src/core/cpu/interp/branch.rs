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

//! Branches and jumps
//!
//! All of these execute with `self.pc` already pointing at the delay
//! slot, so branch targets and link values fall out of the pipeline
//! registers directly.

use crate::core::cpu::{Cpu, Instruction};

impl Cpu {
    /// BCONDZ group: BLTZ, BGEZ, BLTZAL, BGEZAL selected by the rt field
    ///
    /// Bit 0 of rt picks the test (BGEZ when set, BLTZ when clear);
    /// bit 4 requests a link. The link is unconditional on hardware and
    /// happens even when the branch is not taken.
    pub(super) fn op_bcondz(&mut self, i: Instruction) {
        let is_bgez = (i.rt() & 0x01) != 0;
        let is_link = (i.rt() & 0x10) != 0;

        let test = (self.reg(i.rs()) as i32) >= 0;
        let taken = if is_bgez { test } else { !test };

        if is_link {
            self.set_reg(31, self.next_pc);
        }
        if taken {
            self.branch(i.simm() << 2);
        }
    }

    /// BEQ: branch on equal
    pub(super) fn op_beq(&mut self, i: Instruction) {
        if self.reg(i.rs()) == self.reg(i.rt()) {
            self.branch(i.simm() << 2);
        }
    }

    /// BNE: branch on not equal
    pub(super) fn op_bne(&mut self, i: Instruction) {
        if self.reg(i.rs()) != self.reg(i.rt()) {
            self.branch(i.simm() << 2);
        }
    }

    /// BLEZ: branch on less than or equal to zero, signed
    pub(super) fn op_blez(&mut self, i: Instruction) {
        if (self.reg(i.rs()) as i32) <= 0 {
            self.branch(i.simm() << 2);
        }
    }

    /// BGTZ: branch on greater than zero, signed
    pub(super) fn op_bgtz(&mut self, i: Instruction) {
        if (self.reg(i.rs()) as i32) > 0 {
            self.branch(i.simm() << 2);
        }
    }

    /// J: jump within the current 256 MiB region
    pub(super) fn op_j(&mut self, i: Instruction) {
        self.jump(i.jump_dest(self.pc));
    }

    /// JAL: jump and link through r31
    pub(super) fn op_jal(&mut self, i: Instruction) {
        self.set_reg(31, self.next_pc);
        self.jump(i.jump_dest(self.pc));
    }

    /// JR: jump register
    ///
    /// A misaligned target faults at the fetch, not here, so the bad
    /// address lands in BADVADDR with the faulting PC in EPC.
    pub(super) fn op_jr(&mut self, i: Instruction) {
        self.jump(self.reg(i.rs()));
    }

    /// JALR: jump register and link through rd
    pub(super) fn op_jalr(&mut self, i: Instruction) {
        let dest = self.reg(i.rs());
        self.set_reg(i.rd(), self.next_pc);
        self.jump(dest);
    }
}
