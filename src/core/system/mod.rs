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

//! System integration and the main execution loop
//!
//! Ties the CPU, memory bus, scheduler, interrupt controller, and the
//! recompiler into one machine. Components come up leaves first:
//! memory, interrupts, scheduler, CPU, dynarec.
//!
//! The loop runs the guest in slices sized by the earliest scheduler
//! deadline: enter the backend with that budget, account the elapsed
//! cycles, fire due events, then deliver any unmasked interrupt. On
//! hosts that can execute the recompiler's MIPS output the backend is
//! compiled blocks; everywhere else the interpreter runs the same
//! guest state against the same scheduler.

mod loader;

use crate::core::config::Config;
use crate::core::cpu::{Cpu, CycleTable, ExceptionCause, Status, CAUSE};
use crate::core::dynarec::Dynarec;
#[cfg(target_arch = "mips")]
use crate::core::dynarec::JitContext;
use crate::core::error::Result;
use crate::core::interrupt::{irq, InterruptController};
use crate::core::memory::Bus;
use crate::core::scheduler::{EventId, Scheduler};
use crate::core::timing::Region;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Upper bound on a single slice when nothing is scheduled
const MAX_SLICE: u32 = 1 << 16;

/// Whether this build target can enter generated code
const DYNAREC_HOST: bool = cfg!(target_arch = "mips");

/// Signature of a compiled block entry point
#[allow(dead_code)]
type BlockFn = unsafe extern "C" fn(*mut Cpu, *mut u8, *const u8, i32) -> i32;

/// The whole machine
pub struct System {
    cpu: Cpu,
    bus: Bus,
    scheduler: Scheduler,
    interrupts: Rc<RefCell<InterruptController>>,
    /// Recompiler; absent when the code buffer could not be mapped
    dynarec: Option<Dynarec>,
    cycle_table: CycleTable,
    region: Region,
    /// Monotonic guest cycle counter; the scheduler never owns time
    cycles: u64,
    /// Backend selection: compiled blocks where the host allows it
    use_dynarec: bool,
    /// Set by the VBLANK callback, consumed by [`run_frame`](Self::run_frame)
    frame_done: bool,
    scanline: u64,
    /// Disc image path, held for the CD-ROM peripheral
    disc_path: Option<PathBuf>,
}

impl System {
    /// Create a machine in the power-on state
    pub fn new() -> Self {
        let interrupts = Rc::new(RefCell::new(InterruptController::new()));
        let mut bus = Bus::new();
        bus.set_interrupt_controller(interrupts.clone());

        let dynarec = match Dynarec::new() {
            Ok(dynarec) => Some(dynarec),
            Err(e) => {
                log::warn!("recompiler unavailable ({}), interpreter only", e);
                None
            }
        };

        let mut system = Self {
            cpu: Cpu::new(),
            bus,
            scheduler: Scheduler::new(),
            interrupts,
            dynarec,
            cycle_table: CycleTable::default(),
            region: Region::default(),
            cycles: 0,
            use_dynarec: DYNAREC_HOST,
            frame_done: false,
            scanline: 0,
            disc_path: None,
        };
        system.schedule_video_events();
        log::info!("system initialized ({:?})", system.region);
        system
    }

    /// Reset everything as if power-cycled; the loaded BIOS survives
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.scheduler.reset();
        self.interrupts.borrow_mut().reset();
        if let Some(dynarec) = &mut self.dynarec {
            dynarec.flush_all();
        }
        self.cycles = 0;
        self.frame_done = false;
        self.scanline = 0;
        self.schedule_video_events();
    }

    /// Apply a resolved configuration: region, backend, images
    pub fn apply_config(&mut self, config: &Config) -> Result<()> {
        self.set_region(config.region);
        self.set_dynarec_enabled(config.dynarec);
        if let Some(bios) = &config.bios {
            self.load_bios(bios.to_str().unwrap_or_default())?;
        }
        if let Some(disc) = &config.disc {
            self.set_disc(disc.clone());
        }
        if let Some(exe) = &config.exe {
            self.load_exe(exe)?;
        }
        Ok(())
    }

    /// Select the video region and restart the video cadence
    pub fn set_region(&mut self, region: Region) {
        self.region = region;
        self.schedule_video_events();
    }

    /// Request the recompiler backend; quietly downgraded where the
    /// host cannot execute its output
    pub fn set_dynarec_enabled(&mut self, enabled: bool) {
        self.use_dynarec = enabled && DYNAREC_HOST && self.dynarec.is_some();
        if enabled && !self.use_dynarec {
            log::info!("dynarec requested but not usable on this host, interpreting");
        }
    }

    fn schedule_video_events(&mut self) {
        let line = self.region.cycles_per_scanline();
        let frame = self.region.cycles_per_frame();
        self.scheduler
            .schedule(EventId::HBlank, self.cycles + line, hblank_event);
        self.scheduler
            .schedule(EventId::VBlank, self.cycles + frame, vblank_event);
    }

    /// Load the 512 KiB BIOS image
    pub fn load_bios(&mut self, path: &str) -> Result<()> {
        self.bus.load_bios(path)
    }

    /// Side-load a PS-X EXE: copy the text into RAM, point the CPU at
    /// its entry, and write the argv words into the scratchpad
    pub fn load_exe(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let exe = loader::parse_exe(&bytes)?;

        self.bus
            .ram_store(exe.dest & 0x1FFF_FFFF, &exe.text);
        self.cpu.set_reg(28, exe.gp);
        if exe.sp != 0 {
            self.cpu.set_reg(29, exe.sp);
            self.cpu.set_reg(30, exe.sp);
        }
        self.cpu.set_pc(exe.pc);

        // argc = 0, argv = NULL at the scratchpad base
        self.bus.scratchpad_mut()[0..8].fill(0);

        log::info!(
            "loaded {}: pc=0x{:08X} dest=0x{:08X} ({} bytes)",
            path.display(),
            exe.pc,
            exe.dest,
            exe.text.len()
        );
        Ok(())
    }

    /// Record the disc image path for the CD-ROM peripheral. The core
    /// itself only resolves the path; without a drive model attached
    /// the shell boots as if the lid were empty.
    pub fn set_disc(&mut self, path: PathBuf) {
        log::info!("disc image: {}", path.display());
        self.disc_path = Some(path);
    }

    /// Run until the VBLANK callback marks the frame complete
    pub fn run_frame(&mut self) -> Result<()> {
        self.frame_done = false;
        while !self.frame_done {
            self.run_slice()?;
        }
        Ok(())
    }

    /// Execute interpreter steps; test and tooling granularity
    pub fn step_n(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            let spent = self.cpu.step(&mut self.bus, &self.cycle_table);
            self.cpu.clear_block_abort();
            self.cycles += spent as u64;
            self.dispatch_events();
            self.deliver_interrupts();
        }
        Ok(())
    }

    /// One scheduling slice: enter the backend with a budget bounded by
    /// the next deadline, then dispatch and deliver
    fn run_slice(&mut self) -> Result<()> {
        let deadline = self
            .scheduler
            .earliest_deadline()
            .min(self.interrupts.borrow().next_delayed_deadline());
        let budget = if deadline == u64::MAX {
            MAX_SLICE
        } else {
            deadline.saturating_sub(self.cycles).clamp(1, MAX_SLICE as u64) as u32
        };

        let elapsed = if self.use_dynarec {
            self.run_compiled(budget)?
        } else {
            self.run_interpreted(budget)
        };
        self.cycles += elapsed as u64;

        // Pages whose generation counter wrapped lose all their blocks
        let wrapped = self.bus.page_gens_mut().take_wrapped();
        if let Some(dynarec) = &mut self.dynarec {
            for page in wrapped {
                dynarec.evict_page(page);
            }
        }

        self.dispatch_events();
        self.deliver_interrupts();
        Ok(())
    }

    fn run_interpreted(&mut self, budget: u32) -> u32 {
        let mut spent = 0;
        while spent < budget {
            spent += self.cpu.step(&mut self.bus, &self.cycle_table);
            self.cpu.clear_block_abort();
        }
        spent
    }

    /// Look up (or compile) the block at the current PC and enter it
    fn run_compiled(&mut self, budget: u32) -> Result<u32> {
        let pc = self.cpu.pc;

        // Generated code flushes the load-delay slot at instruction
        // boundaries; entering a block with one pending would lose it
        self.cpu.flush_load_delay();

        let looked_up = {
            let dynarec = self.dynarec.as_mut().expect("dynarec backend selected");
            match dynarec.lookup(pc, self.bus.page_gens()) {
                Some(index) => Some(index),
                None => dynarec.compile(pc, &self.bus, &self.cycle_table)?,
            }
        };
        let Some(index) = looked_up else {
            // Not compilable (scratchpad or I/O execution)
            return Ok(self.run_interpreted(budget));
        };

        let entry = {
            let dynarec = self.dynarec.as_mut().expect("dynarec backend selected");
            let body = dynarec.body_addr(index);
            dynarec.hash_mut().insert(pc, body);
            *dynarec.block(index)
        };
        // An idle loop cannot make progress: run it once and report the
        // whole slice consumed so time jumps to the next event
        let enter_budget = if entry.idle_loop {
            (entry.cycle_cost as u32).max(1).min(budget)
        } else {
            budget
        };

        self.cpu.cycles_left = enter_budget as i32;
        self.cpu.initial_cycles_left = enter_budget as i32;

        self.enter_block(index)?;

        let consumed = (self.cpu.initial_cycles_left - self.cpu.cycles_left).max(0) as u32;
        if self.cpu.block_aborted() {
            // The exception path already redirected the PC
            self.cpu.clear_block_abort();
        }
        Ok(if entry.idle_loop { budget } else { consumed })
    }

    #[cfg(target_arch = "mips")]
    fn enter_block(&mut self, index: i32) -> Result<()> {
        let dynarec = self.dynarec.as_mut().expect("dynarec backend selected");
        let entry_ptr = dynarec.entry_ptr(index);
        let mut ctx = JitContext {
            bus: &mut self.bus,
            dynarec,
        };
        self.cpu.jit_bus = &mut ctx as *mut JitContext as *mut std::ffi::c_void;
        let remaining = unsafe {
            let f: BlockFn = std::mem::transmute(entry_ptr);
            f(
                &mut self.cpu,
                self.bus.ram_ptr(),
                self.bus.bios_ptr(),
                self.cpu.cycles_left,
            )
        };
        self.cpu.jit_bus = std::ptr::null_mut();
        self.cpu.cycles_left = remaining;
        Ok(())
    }

    #[cfg(not(target_arch = "mips"))]
    fn enter_block(&mut self, _index: i32) -> Result<()> {
        // Backend selection keeps `use_dynarec` off here: entering
        // emitted MIPS code on a foreign host would be undefined
        unreachable!("compiled-block entry on a non-MIPS host");
    }

    /// Fire every due event in deterministic (deadline, id) order
    pub fn dispatch_events(&mut self) {
        while let Some((id, callback)) = self.scheduler.pop_due(self.cycles) {
            log::trace!("event {:?} at cycle {}", id, self.cycles);
            callback(self);
        }
    }

    /// Deliver an unmasked pending interrupt as ExcCode 0
    fn deliver_interrupts(&mut self) {
        let pending = {
            let mut ic = self.interrupts.borrow_mut();
            ic.poll_delayed(self.cycles);
            ic.pending()
        };

        // CAUSE.IP2 mirrors the controller's output line
        if pending != 0 {
            self.cpu.cop0[CAUSE] |= 1 << 10;
        } else {
            self.cpu.cop0[CAUSE] &= !(1 << 10);
        }

        let sr = self.cpu.status();
        if pending != 0 && sr.contains(Status::IEC) && sr.contains(Status::IM2) {
            log::trace!("interrupt delivery, I_STAT&I_MASK=0x{:03X}", pending);
            // EPC must name the instruction that would have run next;
            // a pending branch means that instruction is a delay slot
            self.cpu.current_pc = self.cpu.pc;
            self.cpu.in_branch_delay = self.cpu.branch_pending;
            self.cpu.exception(ExceptionCause::Interrupt);
            self.cpu.clear_block_abort();
        }
    }

    // --- component access ---

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn interrupts(&self) -> Rc<RefCell<InterruptController>> {
        self.interrupts.clone()
    }

    pub fn dynarec(&self) -> Option<&Dynarec> {
        self.dynarec.as_ref()
    }

    pub fn dynarec_mut(&mut self) -> Option<&mut Dynarec> {
        self.dynarec.as_mut()
    }

    /// Disc image resolved at boot, if any; consumed by the CD-ROM
    /// peripheral when one is attached
    pub fn disc_path(&self) -> Option<&Path> {
        self.disc_path.as_deref()
    }

    /// Guest cycles executed since power-on
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn pc(&self) -> u32 {
        self.cpu.pc()
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Current scanline counter (wraps per frame)
    pub fn scanline(&self) -> u64 {
        self.scanline
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

/// VBLANK: raise IRQ 0, mark the frame, rearm for the next one
fn vblank_event(system: &mut System) {
    system.interrupts.borrow_mut().signal(irq::VBLANK);
    system.frame_done = true;
    let next = system.cycles + system.region.cycles_per_frame();
    system
        .scheduler
        .schedule(EventId::VBlank, next, vblank_event);
}

/// HBLANK: advance the scanline counter and rearm
fn hblank_event(system: &mut System) {
    system.scanline = (system.scanline + 1) % system.region.scanlines_per_frame();
    let next = system.cycles + system.region.cycles_per_scanline();
    system
        .scheduler
        .schedule(EventId::HBlank, next, hblank_event);
}

#[cfg(test)]
mod tests;
