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

//! I/O window dispatch (0x1F801000-0x1F802FFF)
//!
//! The interrupt controller registers are handled here directly; every
//! other register is forwarded to the peripheral contract object
//! registered with the bus. Access width travels with each operation so
//! handlers can honor register granularity — notably 32-bit stores into
//! the SPU register file, which the console bus splits into two 16-bit
//! writes.

use crate::core::memory::Bus;

/// Access width of an I/O operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Byte,
    Half,
    Word,
}

impl AccessWidth {
    /// Value mask for this width
    pub fn mask(self) -> u32 {
        match self {
            AccessWidth::Byte => 0xFF,
            AccessWidth::Half => 0xFFFF,
            AccessWidth::Word => 0xFFFF_FFFF,
        }
    }
}

/// Peripheral contract: memory-mapped hardware outside the core
///
/// Implementors model the GPU, SPU, CD-ROM, DMA, timer, and controller
/// register files. They may hold references back into the system to call
/// `schedule` and `signal` — the core never calls them re-entrantly.
pub trait HwBus {
    /// Read a hardware register at a physical address
    fn read_hw(&mut self, phys: u32, width: AccessWidth) -> u32;

    /// Write a hardware register at a physical address
    fn write_hw(&mut self, phys: u32, value: u32, width: AccessWidth);
}

/// Interrupt status register
pub const I_STAT: u32 = 0x1F80_1070;
/// Interrupt mask register
pub const I_MASK: u32 = 0x1F80_1074;

/// SPU register file range (16-bit registers)
const SPU_START: u32 = 0x1F80_1C00;
const SPU_END: u32 = 0x1F80_1FFF;

impl Bus {
    /// Read from the I/O window
    pub(super) fn io_read(&self, phys: u32, width: AccessWidth) -> u32 {
        let reg = phys & !3;
        let shift = (phys & 3) * 8;

        let word = match reg {
            I_STAT => self.interrupts().map_or(0, |ic| ic.borrow().read_status()),
            I_MASK => self.interrupts().map_or(0, |ic| ic.borrow().read_mask()),
            _ => {
                if let Some(hw) = self.hw() {
                    return hw.borrow_mut().read_hw(phys, width) & width.mask();
                }
                log::trace!("unhandled I/O read{:?} at 0x{:08X}", width, phys);
                return 0;
            }
        };
        (word >> shift) & width.mask()
    }

    /// Write into the I/O window
    pub(super) fn io_write(&mut self, phys: u32, value: u32, width: AccessWidth) {
        let reg = phys & !3;
        match reg {
            I_STAT => {
                // Write-to-clear: bytes the access does not cover must
                // not acknowledge anything, so they are forced to ones.
                let shift = (phys & 3) * 8;
                let ack = (value << shift) | !(width.mask() << shift);
                if let Some(ic) = self.interrupts() {
                    ic.borrow_mut().write_status(ack);
                }
            }
            I_MASK => {
                if let Some(ic) = self.interrupts() {
                    ic.borrow_mut().write_mask(value & width.mask());
                }
            }
            _ => {
                let Some(hw) = self.hw() else {
                    log::trace!(
                        "unhandled I/O write{:?} at 0x{:08X} = 0x{:08X}",
                        width,
                        phys,
                        value
                    );
                    return;
                };
                // The console bus splits word stores to the 16-bit SPU
                // register file into two half-word writes.
                if width == AccessWidth::Word && (SPU_START..=SPU_END).contains(&phys) {
                    let mut hw = hw.borrow_mut();
                    hw.write_hw(phys, value & 0xFFFF, AccessWidth::Half);
                    hw.write_hw(phys + 2, value >> 16, AccessWidth::Half);
                } else {
                    hw.borrow_mut().write_hw(phys, value & width.mask(), width);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interrupt::{irq, InterruptController};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records hardware accesses for assertions
    struct RecordingHw {
        reads: Vec<(u32, AccessWidth)>,
        writes: Vec<(u32, u32, AccessWidth)>,
    }

    impl RecordingHw {
        fn new() -> Self {
            Self {
                reads: Vec::new(),
                writes: Vec::new(),
            }
        }
    }

    impl HwBus for RecordingHw {
        fn read_hw(&mut self, phys: u32, width: AccessWidth) -> u32 {
            self.reads.push((phys, width));
            0x1234_5678
        }

        fn write_hw(&mut self, phys: u32, value: u32, width: AccessWidth) {
            self.writes.push((phys, value, width));
        }
    }

    fn bus_with_ic() -> (Bus, Rc<RefCell<InterruptController>>) {
        let mut bus = Bus::new();
        let ic = Rc::new(RefCell::new(InterruptController::new()));
        bus.set_interrupt_controller(ic.clone());
        (bus, ic)
    }

    #[test]
    fn test_i_stat_read_write_through_bus() {
        let (mut bus, ic) = bus_with_ic();
        ic.borrow_mut().signal(irq::VBLANK);
        ic.borrow_mut().signal(irq::CDROM);

        assert_eq!(
            bus.read32(0x1F80_1070),
            (1 << irq::VBLANK) | (1 << irq::CDROM)
        );

        // Acknowledge VBLANK with a 32-bit write
        bus.write32(0x1F80_1070, !(1u32 << irq::VBLANK));
        assert_eq!(bus.read32(0x1F80_1070), 1 << irq::CDROM);
    }

    #[test]
    fn test_i_stat_half_width_ack_preserves_high_lines() {
        let (mut bus, ic) = bus_with_ic();
        ic.borrow_mut().signal(irq::VBLANK);
        ic.borrow_mut().signal(irq::PIO);

        // 16-bit ack of VBLANK only; PIO (line 9) must survive
        bus.write16(0x1F80_1070, (!(1u16 << irq::VBLANK)) as u16);
        assert_eq!(bus.read32(0x1F80_1070), 1 << irq::PIO);
    }

    #[test]
    fn test_i_mask_roundtrip() {
        let (mut bus, _ic) = bus_with_ic();
        bus.write16(0x1F80_1074, 0x07FF);
        assert_eq!(bus.read16(0x1F80_1074), 0x07FF);
        assert_eq!(bus.read32(0x1F80_1074), 0x07FF);
    }

    #[test]
    fn test_spu_word_store_decomposes() {
        let mut bus = Bus::new();
        let hw = Rc::new(RefCell::new(RecordingHw::new()));
        bus.set_hw(hw.clone());

        bus.write32(0x1F80_1C00, 0xAAAA_5555);
        let writes = &hw.borrow().writes;
        assert_eq!(
            *writes,
            vec![
                (0x1F80_1C00, 0x5555, AccessWidth::Half),
                (0x1F80_1C02, 0xAAAA, AccessWidth::Half),
            ]
        );
    }

    #[test]
    fn test_hw_forwarding_carries_width() {
        let mut bus = Bus::new();
        let hw = Rc::new(RefCell::new(RecordingHw::new()));
        bus.set_hw(hw.clone());

        bus.write8(0x1F80_1800, 0x01);
        let _ = bus.read8(0x1F80_1801);
        assert_eq!(hw.borrow().writes, vec![(0x1F80_1800, 1, AccessWidth::Byte)]);
        assert_eq!(hw.borrow().reads, vec![(0x1F80_1801, AccessWidth::Byte)]);
    }

    #[test]
    fn test_unhandled_io_reads_zero() {
        let bus = Bus::new();
        assert_eq!(bus.read32(0x1F80_1810), 0);
    }
}
