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

//! Coprocessor 0 (system control) register indices and views
//!
//! Only a handful of the 32 registers mean anything on the R3000A as
//! fitted to the console: SR, CAUSE, EPC, PRID, and BADVADDR carry the
//! exception machinery; the breakpoint registers exist but nothing in
//! the core interprets them.

use bitflags::bitflags;

/// Bad Virtual Address
pub const BADVADDR: usize = 8;
/// Status Register
pub const SR: usize = 12;
/// Cause Register
pub const CAUSE: usize = 13;
/// Exception PC
pub const EPC: usize = 14;
/// Processor ID
pub const PRID: usize = 15;

bitflags! {
    /// Status register (COP0 r12) bits the core acts on
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Current interrupt enable
        const IEC = 1 << 0;
        /// Current kernel/user mode
        const KUC = 1 << 1;
        /// IP2 interrupt mask bit (hardware interrupt line)
        const IM2 = 1 << 10;
        /// Isolate cache: stores outside KSEG1 are swallowed
        const ISC = 1 << 16;
        /// Boot exception vectors in BIOS ROM
        const BEV = 1 << 22;
        /// COP2 (GTE) usable
        const CU2 = 1 << 30;
    }
}

/// Exception cause codes, as stored in CAUSE[6:2]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExceptionCause {
    /// External interrupt
    Interrupt = 0,
    /// Address error on load or instruction fetch
    AddressErrorLoad = 4,
    /// Address error on store
    AddressErrorStore = 5,
    /// Syscall instruction
    Syscall = 8,
    /// Breakpoint instruction
    Breakpoint = 9,
    /// Reserved or illegal instruction
    ReservedInstruction = 10,
    /// Coprocessor unusable
    CoprocessorUnusable = 11,
    /// Signed arithmetic overflow
    Overflow = 12,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_cause_codes() {
        assert_eq!(ExceptionCause::Interrupt as u32, 0);
        assert_eq!(ExceptionCause::AddressErrorLoad as u32, 4);
        assert_eq!(ExceptionCause::AddressErrorStore as u32, 5);
        assert_eq!(ExceptionCause::Syscall as u32, 8);
        assert_eq!(ExceptionCause::Breakpoint as u32, 9);
        assert_eq!(ExceptionCause::ReservedInstruction as u32, 10);
        assert_eq!(ExceptionCause::CoprocessorUnusable as u32, 11);
        assert_eq!(ExceptionCause::Overflow as u32, 12);
    }

    #[test]
    fn test_status_bits() {
        // The power-on SR value: BEV set, interrupts off, cache in place
        let sr = Status::from_bits_retain(0x10D0_0000);
        assert!(sr.contains(Status::BEV));
        assert!(!sr.contains(Status::IEC));
        assert!(!sr.contains(Status::ISC));
    }
}
