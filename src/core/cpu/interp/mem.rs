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

//! Load and store instructions
//!
//! Alignment is checked before the bus sees the address: a misaligned
//! 16/32-bit access raises AdEL (loads) or AdES (stores) with the
//! offending address in BADVADDR. Loads deliver their value through the
//! load-delay slot; the unaligned-word pair LWL/LWR additionally merges
//! with a pending delay value targeting the same register, which is how
//! the canonical back-to-back LWL/LWR sequence works at all.

use crate::core::cpu::{Cpu, ExceptionCause, Instruction};
use crate::core::memory::Bus;

impl Cpu {
    #[inline(always)]
    fn effective_address(&self, i: Instruction) -> u32 {
        self.reg(i.rs()).wrapping_add(i.simm() as u32)
    }

    /// LB: load byte, sign-extended
    pub(super) fn op_lb(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        let value = bus.read8(addr) as i8 as i32 as u32;
        self.set_reg_delayed(i.rt(), value);
    }

    /// LBU: load byte, zero-extended
    pub(super) fn op_lbu(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        let value = bus.read8(addr) as u32;
        self.set_reg_delayed(i.rt(), value);
    }

    /// LH: load half-word, sign-extended
    pub(super) fn op_lh(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        if addr & 1 != 0 {
            self.address_exception(ExceptionCause::AddressErrorLoad, addr);
            return;
        }
        let value = bus.read16(addr) as i16 as i32 as u32;
        self.set_reg_delayed(i.rt(), value);
    }

    /// LHU: load half-word, zero-extended
    pub(super) fn op_lhu(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        if addr & 1 != 0 {
            self.address_exception(ExceptionCause::AddressErrorLoad, addr);
            return;
        }
        let value = bus.read16(addr) as u32;
        self.set_reg_delayed(i.rt(), value);
    }

    /// LW: load word
    pub(super) fn op_lw(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        if addr & 3 != 0 {
            self.address_exception(ExceptionCause::AddressErrorLoad, addr);
            return;
        }
        let value = bus.read32(addr);
        self.set_reg_delayed(i.rt(), value);
    }

    /// SB: store byte
    pub(super) fn op_sb(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        bus.write8(addr, self.reg(i.rt()) as u8);
    }

    /// SH: store half-word
    pub(super) fn op_sh(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        if addr & 1 != 0 {
            self.address_exception(ExceptionCause::AddressErrorStore, addr);
            return;
        }
        bus.write16(addr, self.reg(i.rt()) as u16);
    }

    /// SW: store word
    pub(super) fn op_sw(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        if addr & 3 != 0 {
            self.address_exception(ExceptionCause::AddressErrorStore, addr);
            return;
        }
        bus.write32(addr, self.reg(i.rt()));
    }

    /// Current value of rt as LWL/LWR see it: a pending load-delay value
    /// for the same register merges instead of the committed one
    fn unaligned_base(&self, rt: u8) -> u32 {
        if self.load_delay_reg == rt as u32 {
            self.load_delay_val
        } else {
            self.reg(rt)
        }
    }

    /// LWL: load word left (most-significant bytes)
    pub(super) fn op_lwl(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        let cur = self.unaligned_base(i.rt());
        let word = bus.read32(addr & !3);

        let value = match addr & 3 {
            0 => (cur & 0x00FF_FFFF) | (word << 24),
            1 => (cur & 0x0000_FFFF) | (word << 16),
            2 => (cur & 0x0000_00FF) | (word << 8),
            _ => word,
        };
        self.set_reg_delayed(i.rt(), value);
    }

    /// LWR: load word right (least-significant bytes)
    pub(super) fn op_lwr(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        let cur = self.unaligned_base(i.rt());
        let word = bus.read32(addr & !3);

        let value = match addr & 3 {
            0 => word,
            1 => (cur & 0xFF00_0000) | (word >> 8),
            2 => (cur & 0xFFFF_0000) | (word >> 16),
            _ => (cur & 0xFFFF_FF00) | (word >> 24),
        };
        self.set_reg_delayed(i.rt(), value);
    }

    /// SWL: store word left
    pub(super) fn op_swl(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        let aligned = addr & !3;
        let cur = bus.read32(aligned);
        let rt = self.reg(i.rt());

        let value = match addr & 3 {
            0 => (cur & 0xFFFF_FF00) | (rt >> 24),
            1 => (cur & 0xFFFF_0000) | (rt >> 16),
            2 => (cur & 0xFF00_0000) | (rt >> 8),
            _ => rt,
        };
        bus.write32(aligned, value);
    }

    /// SWR: store word right
    pub(super) fn op_swr(&mut self, i: Instruction, bus: &mut Bus) {
        let addr = self.effective_address(i);
        let aligned = addr & !3;
        let cur = bus.read32(aligned);
        let rt = self.reg(i.rt());

        let value = match addr & 3 {
            0 => rt,
            1 => (cur & 0x0000_00FF) | (rt << 8),
            2 => (cur & 0x0000_FFFF) | (rt << 16),
            _ => (cur & 0x00FF_FFFF) | (rt << 24),
        };
        bus.write32(aligned, value);
    }

    /// LWC2: load word into a GTE data register
    pub(super) fn op_lwc2(&mut self, i: Instruction, bus: &mut Bus) {
        if !self.cop2_usable() {
            self.coprocessor_unusable(2);
            return;
        }
        let addr = self.effective_address(i);
        if addr & 3 != 0 {
            self.address_exception(ExceptionCause::AddressErrorLoad, addr);
            return;
        }
        let value = bus.read32(addr);
        self.gte.set_data(i.rt(), value);
    }

    /// SWC2: store a GTE data register
    pub(super) fn op_swc2(&mut self, i: Instruction, bus: &mut Bus) {
        if !self.cop2_usable() {
            self.coprocessor_unusable(2);
            return;
        }
        let addr = self.effective_address(i);
        if addr & 3 != 0 {
            self.address_exception(ExceptionCause::AddressErrorStore, addr);
            return;
        }
        bus.write32(addr, self.gte.data(i.rt()));
    }
}
