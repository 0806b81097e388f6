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

//! Coprocessor transfers, RFE, and the trap instructions

use crate::core::cpu::{cop0, Cpu, ExceptionCause, Instruction, Status};
use crate::core::memory::Bus;

impl Cpu {
    pub(super) fn cop2_usable(&self) -> bool {
        self.status().contains(Status::CU2)
    }

    /// SYSCALL
    pub(super) fn op_syscall(&mut self) {
        self.exception(ExceptionCause::Syscall);
    }

    /// BREAK
    pub(super) fn op_break(&mut self) {
        self.exception(ExceptionCause::Breakpoint);
    }

    /// COP0 transfers: MFC0, MTC0, RFE
    pub(super) fn op_cop0(&mut self, i: Instruction, bus: &mut Bus) {
        match i.rs() {
            // MFC0: COP0 register to GPR, through the load-delay slot
            0x00 => {
                let value = self.cop0[i.rd() as usize];
                self.set_reg_delayed(i.rt(), value);
            }
            // MTC0: GPR to COP0 register
            0x04 => {
                let value = self.reg(i.rt());
                self.write_cop0(i.rd() as usize, value, bus);
            }
            // RFE (the only CO-encoded COP0 op on this part)
            0x10 => {
                if i.funct() == 0x10 {
                    self.rfe();
                } else {
                    log::warn!("unknown COP0 CO function 0x{:02X}", i.funct());
                    self.exception(ExceptionCause::ReservedInstruction);
                }
            }
            _ => {
                log::warn!("unknown COP0 rs field 0x{:02X}", i.rs());
                self.exception(ExceptionCause::ReservedInstruction);
            }
        }
    }

    /// MTC0 with the per-register write masks
    fn write_cop0(&mut self, reg: usize, value: u32, bus: &mut Bus) {
        match reg {
            cop0::SR => {
                self.cop0[cop0::SR] = value;
                // The bus drops stores while the cache is isolated
                bus.set_cache_isolated(Status::from_bits_retain(value).contains(Status::ISC));
            }
            cop0::CAUSE => {
                // Only the two software-interrupt bits are writable
                self.cop0[cop0::CAUSE] =
                    (self.cop0[cop0::CAUSE] & !0x300) | (value & 0x300);
            }
            cop0::EPC | cop0::BADVADDR | cop0::PRID => {
                log::trace!("MTC0 to read-only COP0 r{} ignored", reg);
            }
            _ => self.cop0[reg] = value,
        }
    }

    /// COP2 transfers and GTE command dispatch
    pub(super) fn op_cop2(&mut self, i: Instruction) {
        if !self.cop2_usable() {
            self.coprocessor_unusable(2);
            return;
        }

        // Bit 25 set means a GTE command word rather than a transfer
        if i.0 & (1 << 25) != 0 {
            self.gte.execute(i.0);
            return;
        }

        match i.rs() {
            // MFC2: GTE data register to GPR
            0x00 => {
                let value = self.gte.data(i.rd());
                self.set_reg_delayed(i.rt(), value);
            }
            // CFC2: GTE control register to GPR
            0x02 => {
                let value = self.gte.ctrl(i.rd());
                self.set_reg_delayed(i.rt(), value);
            }
            // MTC2: GPR to GTE data register
            0x04 => {
                let value = self.reg(i.rt());
                self.gte.set_data(i.rd(), value);
            }
            // CTC2: GPR to GTE control register
            0x06 => {
                let value = self.reg(i.rt());
                self.gte.set_ctrl(i.rd(), value);
            }
            _ => {
                log::warn!("unknown COP2 rs field 0x{:02X}", i.rs());
                self.exception(ExceptionCause::ReservedInstruction);
            }
        }
    }
}
