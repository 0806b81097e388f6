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

//! Multiply/divide unit and HI/LO transfers
//!
//! Division never traps on the R3000A; divide-by-zero and the
//! 0x80000000/-1 overflow case produce the documented fixed results.

use crate::core::cpu::{Cpu, Instruction};

impl Cpu {
    /// MULT: signed 32x32 -> 64 multiply into HI/LO
    pub(super) fn op_mult(&mut self, i: Instruction) {
        let a = self.reg(i.rs()) as i32 as i64;
        let b = self.reg(i.rt()) as i32 as i64;
        let product = (a * b) as u64;
        self.lo = product as u32;
        self.hi = (product >> 32) as u32;
    }

    /// MULTU: unsigned 32x32 -> 64 multiply into HI/LO
    pub(super) fn op_multu(&mut self, i: Instruction) {
        let product = self.reg(i.rs()) as u64 * self.reg(i.rt()) as u64;
        self.lo = product as u32;
        self.hi = (product >> 32) as u32;
    }

    /// DIV: signed divide, LO = quotient, HI = remainder
    pub(super) fn op_div(&mut self, i: Instruction) {
        let n = self.reg(i.rs()) as i32;
        let d = self.reg(i.rt()) as i32;

        if d == 0 {
            // Divide by zero: HI holds the numerator, LO is -1 for a
            // non-negative numerator and +1 otherwise
            self.hi = n as u32;
            self.lo = if n >= 0 { 0xFFFF_FFFF } else { 1 };
        } else if n as u32 == 0x8000_0000 && d == -1 {
            // The one overflowing quotient
            self.hi = 0;
            self.lo = 0x8000_0000;
        } else {
            self.lo = (n / d) as u32;
            self.hi = (n % d) as u32;
        }
    }

    /// DIVU: unsigned divide, LO = quotient, HI = remainder
    pub(super) fn op_divu(&mut self, i: Instruction) {
        let n = self.reg(i.rs());
        let d = self.reg(i.rt());

        if d == 0 {
            self.hi = n;
            self.lo = 0xFFFF_FFFF;
        } else {
            self.lo = n / d;
            self.hi = n % d;
        }
    }

    /// MFHI: move from HI
    pub(super) fn op_mfhi(&mut self, i: Instruction) {
        self.set_reg(i.rd(), self.hi);
    }

    /// MTHI: move to HI
    pub(super) fn op_mthi(&mut self, i: Instruction) {
        self.hi = self.reg(i.rs());
    }

    /// MFLO: move from LO
    pub(super) fn op_mflo(&mut self, i: Instruction) {
        self.set_reg(i.rd(), self.lo);
    }

    /// MTLO: move to LO
    pub(super) fn op_mtlo(&mut self, i: Instruction) {
        self.lo = self.reg(i.rs());
    }
}
