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

//! Cycle-accurate hardware event scheduler
//!
//! The scheduler replaces per-block hardware polling with a small fixed
//! table of pending events, one slot per event kind. Peripherals and the
//! system post absolute-cycle deadlines; the execution loop sizes each
//! block's cycle budget against the earliest deadline and fires due
//! callbacks after every block.
//!
//! The scheduler does not own time. [`crate::core::system::System`]
//! advances the global cycle counter and drains due events with
//! [`Scheduler::pop_due`]; each callback runs to completion before the
//! next due slot is considered, and may re-schedule itself (the normal
//! case for periodic events).
//!
//! A cached earliest deadline is maintained on every mutation so the hot
//! loop reads it without scanning. The slot count is small enough that
//! the occasional re-scan is a handful of compares.

use crate::core::system::System;

/// Number of event slots; one per [`EventId`]
pub const NUM_EVENTS: usize = 10;

/// Hardware event kinds, one scheduler slot each
///
/// Dispatch order for events due at the same cycle is ascending ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum EventId {
    /// Timer 0 target/overflow
    Timer0 = 0,
    /// Timer 1 target/overflow
    Timer1 = 1,
    /// Timer 2 target/overflow
    Timer2 = 2,
    /// Vertical blanking start
    VBlank = 3,
    /// CD-ROM sector delivery
    CdRom = 4,
    /// CD-ROM deferred second response
    CdRomDeferred = 5,
    /// CD-ROM I_STAT assertion delay
    CdRomIrq = 6,
    /// Horizontal blanking tick
    HBlank = 7,
    /// Deferred DMA completion
    Dma = 8,
    /// SIO controller IRQ delay
    SioIrq = 9,
}

impl EventId {
    /// All event kinds in slot order
    pub const ALL: [EventId; NUM_EVENTS] = [
        EventId::Timer0,
        EventId::Timer1,
        EventId::Timer2,
        EventId::VBlank,
        EventId::CdRom,
        EventId::CdRomDeferred,
        EventId::CdRomIrq,
        EventId::HBlank,
        EventId::Dma,
        EventId::SioIrq,
    ];
}

/// Event callback
///
/// Callbacks run on the emulation thread with full system access. They
/// must not suspend and must not raise guest exceptions; rescheduling
/// their own slot is the expected way to make an event periodic.
pub type EventCallback = fn(&mut System);

fn noop_event(_: &mut System) {}

#[derive(Clone, Copy)]
struct EventSlot {
    active: bool,
    /// Absolute deadline in CPU cycles
    deadline: u64,
    callback: EventCallback,
}

impl EventSlot {
    const fn idle() -> Self {
        Self {
            active: false,
            deadline: u64::MAX,
            callback: noop_event,
        }
    }
}

/// Fixed-capacity event table with a cached earliest deadline
pub struct Scheduler {
    slots: [EventSlot; NUM_EVENTS],
    /// `min(deadline)` over active slots, `u64::MAX` when none
    earliest_deadline: u64,
    /// Slot index of the cached earliest, -1 when none
    earliest_id: i32,
}

impl Scheduler {
    /// Create an empty scheduler (no active events)
    pub fn new() -> Self {
        Self {
            slots: [EventSlot::idle(); NUM_EVENTS],
            earliest_deadline: u64::MAX,
            earliest_id: -1,
        }
    }

    /// Clear all slots
    pub fn reset(&mut self) {
        self.slots = [EventSlot::idle(); NUM_EVENTS];
        self.earliest_deadline = u64::MAX;
        self.earliest_id = -1;
    }

    /// Arm an event slot with an absolute-cycle deadline
    ///
    /// Scheduling an already-active slot moves its deadline; scheduling
    /// with identical arguments is idempotent. The earliest-deadline
    /// cache is updated in O(1) unless the cached slot itself moved
    /// later, which triggers a linear re-scan.
    pub fn schedule(&mut self, id: EventId, deadline: u64, callback: EventCallback) {
        let idx = id as usize;
        self.slots[idx] = EventSlot {
            active: true,
            deadline,
            callback,
        };

        if self.earliest_id == idx as i32 {
            // The cached slot moved. Earlier-or-equal keeps the cache
            // valid; later requires a re-scan (another slot may now win).
            if deadline <= self.earliest_deadline {
                self.earliest_deadline = deadline;
            } else {
                self.rescan();
            }
        } else if deadline < self.earliest_deadline
            || (deadline == self.earliest_deadline && (idx as i32) < self.earliest_id)
        {
            self.earliest_deadline = deadline;
            self.earliest_id = idx as i32;
        }

        log::trace!(
            "schedule {:?} @ {} (earliest {:?} @ {})",
            id,
            deadline,
            self.earliest_id,
            self.earliest_deadline
        );
    }

    /// Cancel an event; idempotent
    pub fn remove(&mut self, id: EventId) {
        let idx = id as usize;
        if !self.slots[idx].active {
            return;
        }
        self.slots[idx].active = false;
        self.slots[idx].deadline = u64::MAX;
        if self.earliest_id == idx as i32 {
            self.rescan();
        }
    }

    /// Earliest pending deadline, `u64::MAX` when nothing is scheduled
    #[inline(always)]
    pub fn earliest_deadline(&self) -> u64 {
        self.earliest_deadline
    }

    /// Deadline of a specific slot, if armed
    pub fn deadline_of(&self, id: EventId) -> Option<u64> {
        let slot = &self.slots[id as usize];
        slot.active.then_some(slot.deadline)
    }

    /// Whether a slot is armed
    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.slots[id as usize].active
    }

    /// Take the next due event, if any
    ///
    /// Pops the active slot with the smallest `(deadline, id)` whose
    /// deadline is at or before `now`, deactivates it, and returns its
    /// callback for the caller to invoke. Draining in a loop therefore
    /// fires same-deadline events in ascending ID order and everything
    /// else in deadline order, deterministically.
    pub fn pop_due(&mut self, now: u64) -> Option<(EventId, EventCallback)> {
        if self.earliest_deadline > now {
            return None;
        }
        let idx = self.earliest_id as usize;
        debug_assert!(self.slots[idx].active, "earliest cache names idle slot");

        let callback = self.slots[idx].callback;
        self.slots[idx].active = false;
        self.slots[idx].deadline = u64::MAX;
        self.rescan();

        Some((EventId::ALL[idx], callback))
    }

    /// Recompute the earliest cache by scanning all slots
    fn rescan(&mut self) {
        self.earliest_deadline = u64::MAX;
        self.earliest_id = -1;
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.active && slot.deadline < self.earliest_deadline {
                self.earliest_deadline = slot.deadline;
                self.earliest_id = idx as i32;
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
