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

//! CPU (MIPS R3000A) architectural state
//!
//! A single [`Cpu`] value holds everything the guest program can observe:
//! general registers, HI/LO, the program counter pair, COP0 system
//! control registers, and the GTE (COP2) register files. The struct is
//! `#[repr(C)]` and its field offsets are compile-time constants (see
//! [`offsets`]) because generated code addresses the state directly off
//! a pinned host register.
//!
//! Guest exceptions are cooperative: [`Cpu::exception`] rewrites COP0
//! state and the PC, then sets `block_aborted` so generated code unwinds
//! to its epilogue at the next poll point. Nothing ever unwinds the host
//! stack.

use crate::core::gte::Gte;

mod cop0;
mod cycles;
mod decode;
pub mod interp;

pub use cop0::{ExceptionCause, Status, BADVADDR, CAUSE, EPC, PRID, SR};
pub use cycles::CycleTable;
pub use decode::Instruction;

/// BIOS entry point, the reset vector
pub const RESET_VECTOR: u32 = 0xBFC0_0000;

/// MIPS R3000A CPU state
///
/// # Example
/// ```
/// use psxjit::core::cpu::Cpu;
///
/// let mut cpu = Cpu::new();
/// cpu.set_reg(8, 0x1234);
/// assert_eq!(cpu.reg(8), 0x1234);
/// assert_eq!(cpu.reg(0), 0); // r0 is hard-wired to zero
/// ```
#[repr(C)]
pub struct Cpu {
    /// General purpose registers; index 0 is hard-wired to 0
    pub(crate) gpr: [u32; 32],

    /// Multiply/divide result halves
    pub(crate) lo: u32,
    pub(crate) hi: u32,

    /// Address of the next instruction to execute
    pub(crate) pc: u32,

    /// Address of the instruction currently executing (exception EPC)
    pub(crate) current_pc: u32,

    /// Fetch address after `pc`; diverges from `pc + 4` in a delay slot
    pub(crate) next_pc: u32,

    /// COP0 system control registers; see [`cop0`] for the indices
    pub(crate) cop0: [u32; 32],

    /// Geometry Transformation Engine (COP2) register files
    pub(crate) gte: Gte,

    /// Pending load-delay writeback target, 0 when empty
    pub(crate) load_delay_reg: u32,

    /// Pending load-delay writeback value
    pub(crate) load_delay_val: u32,

    /// Set by the exception path to force a mid-block exit; generated
    /// code polls this after every helper call-out
    pub(crate) block_aborted: u32,

    /// Cycle budget remaining in the current block entry
    pub(crate) cycles_left: i32,

    /// Budget the current block was entered with
    pub(crate) initial_cycles_left: i32,

    /// The instruction now executing sits in a branch delay slot
    pub(crate) in_branch_delay: bool,

    /// The next instruction will sit in a branch delay slot
    pub(crate) branch_pending: bool,

    /// Type-erased bus pointer for JIT helper call-outs; valid only
    /// while a compiled block is running
    pub(crate) jit_bus: *mut std::ffi::c_void,
}

/// Field offsets consumed by the code emitter
pub mod offsets {
    use super::Cpu;
    use crate::core::gte::Gte;
    use std::mem::offset_of;

    pub const GPR: usize = offset_of!(Cpu, gpr);
    pub const LO: usize = offset_of!(Cpu, lo);
    pub const HI: usize = offset_of!(Cpu, hi);
    pub const PC: usize = offset_of!(Cpu, pc);
    pub const CURRENT_PC: usize = offset_of!(Cpu, current_pc);
    pub const COP0: usize = offset_of!(Cpu, cop0);
    pub const COP2_DATA: usize = offset_of!(Cpu, gte) + offset_of!(Gte, data);
    pub const COP2_CTRL: usize = offset_of!(Cpu, gte) + offset_of!(Gte, ctrl);
    pub const LOAD_DELAY_REG: usize = offset_of!(Cpu, load_delay_reg);
    pub const LOAD_DELAY_VAL: usize = offset_of!(Cpu, load_delay_val);
    pub const BLOCK_ABORTED: usize = offset_of!(Cpu, block_aborted);
    pub const CYCLES_LEFT: usize = offset_of!(Cpu, cycles_left);

    /// Byte offset of a general register slot
    pub const fn gpr(index: u8) -> usize {
        GPR + index as usize * 4
    }

    /// Byte offset of a COP0 register slot
    pub const fn cop0(index: usize) -> usize {
        COP0 + index * 4
    }
}

impl Cpu {
    /// Create a CPU in the power-on state: PC at the BIOS entry point,
    /// SR with BEV set, PRID identifying an R3000A
    pub fn new() -> Self {
        let mut cop0 = [0u32; 32];
        cop0[SR] = 0x10D0_0000;
        cop0[PRID] = 0x0000_0002;

        Self {
            gpr: [0; 32],
            lo: 0,
            hi: 0,
            pc: RESET_VECTOR,
            current_pc: RESET_VECTOR,
            next_pc: RESET_VECTOR.wrapping_add(4),
            cop0,
            gte: Gte::new(),
            load_delay_reg: 0,
            load_delay_val: 0,
            block_aborted: 0,
            cycles_left: 0,
            initial_cycles_left: 0,
            in_branch_delay: false,
            branch_pending: false,
            jit_bus: std::ptr::null_mut(),
        }
    }

    /// Reset to the power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a general register; r0 always reads 0
    #[inline(always)]
    pub fn reg(&self, index: u8) -> u32 {
        if index == 0 {
            0
        } else {
            self.gpr[index as usize]
        }
    }

    /// Write a general register; writes to r0 are dropped
    #[inline(always)]
    pub fn set_reg(&mut self, index: u8, value: u32) {
        if index != 0 {
            self.gpr[index as usize] = value;
        }
    }

    /// Write a register through the load-delay slot
    ///
    /// Any pending writeback is flushed first, then the new one parks
    /// until the next instruction boundary.
    pub fn set_reg_delayed(&mut self, index: u8, value: u32) {
        self.flush_load_delay();
        if index != 0 {
            self.load_delay_reg = index as u32;
            self.load_delay_val = value;
        }
    }

    /// Apply a pending load-delay writeback, if any
    #[inline(always)]
    pub fn flush_load_delay(&mut self) {
        if self.load_delay_reg != 0 {
            self.gpr[self.load_delay_reg as usize] = self.load_delay_val;
            self.load_delay_reg = 0;
        }
    }

    /// Program counter of the next instruction
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Redirect execution; used by loaders and the exception path
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc.wrapping_add(4);
        self.branch_pending = false;
    }

    /// HI register (remainder / product high half)
    pub fn hi(&self) -> u32 {
        self.hi
    }

    /// LO register (quotient / product low half)
    pub fn lo(&self) -> u32 {
        self.lo
    }

    /// A COP0 register by index
    pub fn cop0(&self, index: usize) -> u32 {
        self.cop0[index]
    }

    /// COP0 status register view
    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.cop0[SR])
    }

    /// Whether the exception path requested a mid-block exit
    pub fn block_aborted(&self) -> bool {
        self.block_aborted != 0
    }

    /// Acknowledge a block abort
    pub fn clear_block_abort(&mut self) {
        self.block_aborted = 0;
    }

    /// Raise a guest exception
    ///
    /// Implements the R3000A exception sequence: EPC records the faulting
    /// instruction (the branch when faulting in a delay slot, with
    /// CAUSE.BD set), the SR KU/IE stack is pushed two bits left, the
    /// exception code lands in CAUSE[6:2], and the PC is redirected to
    /// the vector selected by SR.BEV. The block-abort flag is set so
    /// generated code exits at its next poll point.
    pub fn exception(&mut self, cause: ExceptionCause) {
        let sr = self.cop0[SR];

        // Push the KU/IE mode stack: current→previous, previous→old,
        // entering kernel mode with interrupts disabled
        self.cop0[SR] = (sr & !0x3F) | ((sr << 2) & 0x3F);

        let mut cause_reg = self.cop0[CAUSE] & !0x8000_007C;
        cause_reg |= (cause as u32) << 2;
        if self.in_branch_delay {
            cause_reg |= 1 << 31;
        }
        self.cop0[CAUSE] = cause_reg;

        let epc = if self.in_branch_delay {
            self.current_pc.wrapping_sub(4)
        } else {
            self.current_pc
        };
        self.cop0[EPC] = epc;

        let vector = if Status::from_bits_retain(sr).contains(Status::BEV) {
            0xBFC0_0180
        } else {
            0x8000_0080
        };

        log::debug!(
            "exception {:?}: EPC=0x{:08X} vector=0x{:08X} delay={}",
            cause,
            epc,
            vector,
            self.in_branch_delay
        );

        self.pc = vector;
        self.next_pc = vector.wrapping_add(4);
        self.branch_pending = false;
        self.load_delay_reg = 0;
        self.block_aborted = 1;
    }

    /// Raise an address-error exception, recording the bad address
    pub fn address_exception(&mut self, cause: ExceptionCause, bad_vaddr: u32) {
        self.cop0[BADVADDR] = bad_vaddr;
        self.exception(cause);
    }

    /// Raise a coprocessor-unusable exception for coprocessor `cop`
    pub fn coprocessor_unusable(&mut self, cop: u32) {
        self.exception(ExceptionCause::CoprocessorUnusable);
        // CAUSE.CE names the offending coprocessor
        self.cop0[CAUSE] = (self.cop0[CAUSE] & !(3 << 28)) | ((cop & 3) << 28);
    }

    /// Return from exception: pop the SR KU/IE mode stack
    pub fn rfe(&mut self) {
        let sr = self.cop0[SR];
        self.cop0[SR] = (sr & !0x0F) | ((sr >> 2) & 0x0F);
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
