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

use super::*;
use proptest::prelude::*;

// Callback side effects are recorded in guest RAM so tests observe the
// dispatch order without any test-only plumbing on System. Word at
// TAG_COUNT holds the number of tags, tags follow at TAG_BASE.
const TAG_COUNT: u32 = 0x8000_0100;
const TAG_BASE: u32 = 0x8000_0104;

fn push_tag(sys: &mut System, tag: u32) {
    let count = sys.bus().read32(TAG_COUNT);
    sys.bus_mut().write32(TAG_BASE + count * 4, tag);
    sys.bus_mut().write32(TAG_COUNT, count + 1);
}

fn tags(sys: &System) -> Vec<u32> {
    let count = sys.bus().read32(TAG_COUNT);
    (0..count)
        .map(|i| sys.bus().read32(TAG_BASE + i * 4))
        .collect()
}

fn drain(sys: &mut System, now: u64) -> usize {
    let mut fired = 0;
    while let Some((_, cb)) = sys.scheduler_mut().pop_due(now) {
        cb(sys);
        fired += 1;
    }
    fired
}

fn tag_a(sys: &mut System) {
    push_tag(sys, 0xA);
}

fn tag_b_reschedules(sys: &mut System) {
    push_tag(sys, 0xB);
    sys.scheduler_mut().schedule(EventId::Timer1, 150, tag_b2);
}

fn tag_b2(sys: &mut System) {
    push_tag(sys, 0xB2);
}

fn tag_c(sys: &mut System) {
    push_tag(sys, 0xC);
}

#[test]
fn test_empty_scheduler_has_no_deadline() {
    let sched = Scheduler::new();
    assert_eq!(sched.earliest_deadline(), u64::MAX);
    assert!(!sched.is_scheduled(EventId::VBlank));
}

#[test]
fn test_schedule_updates_earliest() {
    let mut sched = Scheduler::new();
    sched.schedule(EventId::VBlank, 300, noop_event);
    assert_eq!(sched.earliest_deadline(), 300);

    sched.schedule(EventId::Timer0, 100, noop_event);
    assert_eq!(sched.earliest_deadline(), 100);

    // A later event does not disturb the cache
    sched.schedule(EventId::Dma, 500, noop_event);
    assert_eq!(sched.earliest_deadline(), 100);
}

#[test]
fn test_moving_earliest_later_rescans() {
    let mut sched = Scheduler::new();
    sched.schedule(EventId::Timer0, 100, noop_event);
    sched.schedule(EventId::VBlank, 300, noop_event);

    // Push the cached earliest past the other slot
    sched.schedule(EventId::Timer0, 400, noop_event);
    assert_eq!(sched.earliest_deadline(), 300);
}

#[test]
fn test_remove_is_idempotent() {
    let mut sched = Scheduler::new();
    sched.schedule(EventId::CdRom, 200, noop_event);
    sched.remove(EventId::CdRom);
    assert_eq!(sched.earliest_deadline(), u64::MAX);

    // Removing again is a no-op
    sched.remove(EventId::CdRom);
    assert_eq!(sched.earliest_deadline(), u64::MAX);
}

#[test]
fn test_remove_earliest_restores_next() {
    let mut sched = Scheduler::new();
    sched.schedule(EventId::Timer0, 100, noop_event);
    sched.schedule(EventId::HBlank, 250, noop_event);
    sched.remove(EventId::Timer0);
    assert_eq!(sched.earliest_deadline(), 250);
}

#[test]
fn test_schedule_is_idempotent() {
    let mut sched = Scheduler::new();
    sched.schedule(EventId::SioIrq, 777, noop_event);
    let earliest = sched.earliest_deadline();
    for _ in 0..4 {
        sched.schedule(EventId::SioIrq, 777, noop_event);
    }
    assert_eq!(sched.earliest_deadline(), earliest);
    assert_eq!(sched.deadline_of(EventId::SioIrq), Some(777));
}

#[test]
fn test_dispatch_order_and_reschedule() {
    // A@100, B@50, C@200; dispatch(49) fires nothing, dispatch(120)
    // fires B then A (deadline order), and B reschedules itself at 150.
    let mut sys = System::new();
    sys.scheduler_mut().schedule(EventId::Timer0, 100, tag_a);
    sys.scheduler_mut()
        .schedule(EventId::Timer1, 50, tag_b_reschedules);
    sys.scheduler_mut().schedule(EventId::Timer2, 200, tag_c);

    assert_eq!(drain(&mut sys, 49), 0);
    assert!(tags(&sys).is_empty());

    assert_eq!(drain(&mut sys, 120), 2);
    assert_eq!(tags(&sys), vec![0xB, 0xA]);
    assert_eq!(sys.scheduler().earliest_deadline(), 150);

    // The rescheduled B and the untouched C still fire later
    assert_eq!(drain(&mut sys, 200), 2);
    assert_eq!(tags(&sys), vec![0xB, 0xA, 0xB2, 0xC]);
    assert_eq!(sys.scheduler().earliest_deadline(), u64::MAX);
}

#[test]
fn test_same_deadline_fires_in_id_order() {
    let mut sys = System::new();
    sys.scheduler_mut().schedule(EventId::Dma, 60, tag_c);
    sys.scheduler_mut().schedule(EventId::Timer2, 60, tag_a);
    sys.scheduler_mut().schedule(EventId::VBlank, 60, tag_b2);

    drain(&mut sys, 60);
    // Timer2 (2) before VBlank (3) before Dma (8)
    assert_eq!(tags(&sys), vec![0xA, 0xB2, 0xC]);
}

#[test]
fn test_dispatch_determinism() {
    let run = || {
        let mut sys = System::new();
        sys.scheduler_mut().schedule(EventId::Timer0, 30, tag_a);
        sys.scheduler_mut().schedule(EventId::HBlank, 10, tag_c);
        sys.scheduler_mut()
            .schedule(EventId::CdRomIrq, 30, tag_b2);
        drain(&mut sys, 100);
        tags(&sys)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_pop_due_exact_deadline_fires() {
    let mut sched = Scheduler::new();
    sched.schedule(EventId::VBlank, 100, noop_event);
    assert!(sched.pop_due(99).is_none());
    let (id, _) = sched.pop_due(100).unwrap();
    assert_eq!(id, EventId::VBlank);
    assert!(sched.pop_due(u64::MAX).is_none());
}

#[derive(Debug, Clone)]
enum Op {
    Schedule(usize, u64),
    Remove(usize),
    PopDue(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NUM_EVENTS, 0u64..1000).prop_map(|(i, d)| Op::Schedule(i, d)),
        (0..NUM_EVENTS).prop_map(Op::Remove),
        (0u64..1000).prop_map(Op::PopDue),
    ]
}

proptest! {
    /// The cached earliest deadline always equals the minimum over
    /// active slots (or u64::MAX when none), and pop_due always yields
    /// the (deadline, id)-minimal due slot.
    #[test]
    fn prop_earliest_cache_matches_model(ops in proptest::collection::vec(op_strategy(), 1..64)) {
        let mut sched = Scheduler::new();
        let mut model: [Option<u64>; NUM_EVENTS] = [None; NUM_EVENTS];

        for op in ops {
            match op {
                Op::Schedule(idx, deadline) => {
                    sched.schedule(EventId::ALL[idx], deadline, noop_event);
                    model[idx] = Some(deadline);
                }
                Op::Remove(idx) => {
                    sched.remove(EventId::ALL[idx]);
                    model[idx] = None;
                }
                Op::PopDue(now) => {
                    let expect = model
                        .iter()
                        .enumerate()
                        .filter_map(|(i, d)| d.map(|d| (d, i)))
                        .filter(|&(d, _)| d <= now)
                        .min();
                    match sched.pop_due(now) {
                        Some((id, _)) => {
                            let (_, idx) = expect.expect("popped with empty model");
                            prop_assert_eq!(id as usize, idx);
                            model[idx] = None;
                        }
                        None => prop_assert!(expect.is_none()),
                    }
                }
            }

            let min = model
                .iter()
                .filter_map(|d| *d)
                .min()
                .unwrap_or(u64::MAX);
            prop_assert_eq!(sched.earliest_deadline(), min);
        }
    }
}
