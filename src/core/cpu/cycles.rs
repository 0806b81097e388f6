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

//! Weighted instruction cycle costs
//!
//! Both execution backends account guest time from the same table: the
//! interpreter charges per step, the recompiler folds the per-opcode
//! weights into each block's cycle total at compile time. The defaults
//! follow the published R3000A timings — single-cycle register ops,
//! slower memory traffic, and long multiply/divide latencies (which on
//! hardware only stall when HI/LO are read early; charging them at issue
//! overestimates tight mul/div loops and is the usual trade).

use crate::core::cpu::Instruction;

/// Per-class instruction weights in CPU cycles
#[derive(Debug, Clone)]
pub struct CycleTable {
    /// Register-to-register ALU ops, shifts, branches, jumps
    pub alu: u16,
    /// Loads (cache hit)
    pub load: u16,
    /// Stores (write buffer hit)
    pub store: u16,
    /// 32-bit multiply
    pub mult: u16,
    /// 32-bit divide
    pub div: u16,
    /// COP0/COP2 transfer ops
    pub cop: u16,
}

impl Default for CycleTable {
    fn default() -> Self {
        Self {
            alu: 1,
            load: 2,
            store: 2,
            mult: 9,
            div: 36,
            cop: 2,
        }
    }
}

impl CycleTable {
    /// Weight of one instruction
    pub fn cost(&self, instr: Instruction) -> u16 {
        match instr.op() {
            0x00 => match instr.funct() {
                0x18 | 0x19 => self.mult, // MULT/MULTU
                0x1A | 0x1B => self.div,  // DIV/DIVU
                _ => self.alu,
            },
            // Loads, including LWL/LWR and LWC2
            0x20..=0x26 | 0x32 => self.load,
            // Stores, including SWL/SWR and SWC2
            0x28..=0x2E | 0x3A => self.store,
            // COP0/COP2 transfers and GTE commands
            0x10 | 0x12 => self.cop,
            _ => self.alu,
        }
    }
}
