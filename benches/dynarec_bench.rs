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

//! Recompiler and scheduler throughput benches

use criterion::{criterion_group, criterion_main, Criterion};
use psxjit::core::cpu::CycleTable;
use psxjit::core::dynarec::Dynarec;
use psxjit::core::memory::Bus;
use psxjit::core::scheduler::EventId;
use psxjit::core::system::System;

const ORG: u32 = 0x8000_1000;

fn addiu(rt: u8, rs: u8, imm: u16) -> u32 {
    (0x09 << 26) | ((rs as u32) << 21) | ((rt as u32) << 16) | imm as u32
}
fn sw(rt: u8, rs: u8, imm: u16) -> u32 {
    (0x2B << 26) | ((rs as u32) << 21) | ((rt as u32) << 16) | imm as u32
}
fn jr(rs: u8) -> u32 {
    ((rs as u32) << 21) | 0x08
}

fn bench_block_compile(c: &mut Criterion) {
    // A representative mixed block: ALU traffic plus a store fast path
    let mut bus = Bus::new();
    let program = [
        addiu(8, 0, 0x100),
        addiu(9, 8, 0x23),
        sw(9, 29, 0x10),
        addiu(10, 9, 1),
        addiu(11, 10, 1),
        jr(31),
        0,
    ];
    for (i, word) in program.iter().enumerate() {
        bus.write32(ORG + (i as u32) * 4, *word);
    }
    let mut dynarec = Dynarec::new().unwrap();
    let table = CycleTable::default();

    c.bench_function("compile_mixed_block", |b| {
        b.iter(|| {
            dynarec.flush_all();
            dynarec.compile(ORG, &bus, &table).unwrap().unwrap()
        })
    });
}

fn bench_scheduler_churn(c: &mut Criterion) {
    let mut system = System::new();
    c.bench_function("schedule_and_dispatch", |b| {
        let mut now = 0u64;
        b.iter(|| {
            now += 10;
            let sched = system.scheduler_mut();
            sched.schedule(EventId::Timer0, now + 5, |_| {});
            sched.schedule(EventId::Timer1, now + 3, |_| {});
            sched.schedule(EventId::Dma, now + 9, |_| {});
            sched.remove(EventId::Timer1);
            while let Some((_, cb)) = system.scheduler_mut().pop_due(now + 6) {
                cb(&mut system);
            }
            system.scheduler().earliest_deadline()
        })
    });
}

criterion_group!(benches, bench_block_compile, bench_scheduler_churn);
criterion_main!(benches);
