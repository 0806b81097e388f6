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
use std::io::Write;

#[test]
fn test_ram_roundtrip_all_widths() {
    let mut bus = Bus::new();
    bus.write8(0x8000_0000, 0x42);
    assert_eq!(bus.read8(0x8000_0000), 0x42);

    bus.write16(0x8000_0010, 0xBEEF);
    assert_eq!(bus.read16(0x8000_0010), 0xBEEF);

    bus.write32(0x8000_0020, 0x1234_5678);
    assert_eq!(bus.read32(0x8000_0020), 0x1234_5678);
}

#[test]
fn test_segment_aliasing() {
    let mut bus = Bus::new();
    bus.write32(0x8000_0100, 0xCAFE_BABE);
    assert_eq!(bus.read32(0x0000_0100), 0xCAFE_BABE);
    assert_eq!(bus.read32(0xA000_0100), 0xCAFE_BABE);
}

#[test]
fn test_ram_mirror_window() {
    let mut bus = Bus::new();
    bus.write32(0x0000_0040, 0x11223344);
    assert_eq!(bus.read32(0x0020_0040), 0x11223344);
    assert_eq!(bus.read32(0x8040_0040), 0x11223344);
}

#[test]
fn test_little_endian_byte_order() {
    let mut bus = Bus::new();
    bus.write32(0x8000_0000, 0xAABB_CCDD);
    assert_eq!(bus.read8(0x8000_0000), 0xDD);
    assert_eq!(bus.read8(0x8000_0003), 0xAA);
    assert_eq!(bus.read16(0x8000_0002), 0xAABB);
}

#[test]
fn test_scratchpad_roundtrip_and_mirror() {
    let mut bus = Bus::new();
    bus.write32(0x1F80_0000, 0xDEAD_BEEF);
    assert_eq!(bus.read32(0x1F80_0000), 0xDEAD_BEEF);
    assert_eq!(bus.read32(0x9F80_0000), 0xDEAD_BEEF);

    // The 4 KiB window mirrors the 1 KiB array
    assert_eq!(bus.read32(0x1F80_0400), 0xDEAD_BEEF);
}

#[test]
fn test_bios_write_ignored() {
    let mut bus = Bus::new();
    let before = bus.read32(0xBFC0_0000);
    bus.write32(0xBFC0_0000, 0xFFFF_FFFF);
    assert_eq!(bus.read32(0xBFC0_0000), before);
}

#[test]
fn test_cache_isolation_drops_writes() {
    // With SR.IsC set, a KSEG0 store must not reach RAM
    let mut bus = Bus::new();
    bus.set_cache_isolated(true);
    bus.write8(0x8000_0000, 0x55);
    bus.set_cache_isolated(false);
    assert_eq!(bus.read8(0x0000_0000), 0x00);
}

#[test]
fn test_cache_isolation_spares_kseg1() {
    let mut bus = Bus::new();
    bus.set_cache_isolated(true);
    bus.write8(0xA000_0000, 0x77);
    bus.set_cache_isolated(false);
    assert_eq!(bus.read8(0x0000_0000), 0x77);
}

#[test]
fn test_unmapped_read_returns_zero() {
    let bus = Bus::new();
    assert_eq!(bus.read32(0x1FA0_0000), 0);
    assert_eq!(bus.read8(0x5000_0000), 0);
}

#[test]
fn test_unmapped_write_is_dropped() {
    let mut bus = Bus::new();
    bus.write32(0x1FA0_0000, 0x1234);
    assert_eq!(bus.read32(0x1FA0_0000), 0);
}

#[test]
fn test_expansion_probe_reads_open_bus() {
    let bus = Bus::new();
    // EXP1 header region reads 0 (no licensed expansion ROM)
    assert_eq!(bus.read32(0x1F00_0000), 0);
    // The rest of the region floats high
    assert_eq!(bus.read8(0x1F00_4000), 0xFF);
}

#[test]
fn test_cache_control_roundtrip() {
    let mut bus = Bus::new();
    bus.write32(0xFFFE_0130, 0x0001_E988);
    assert_eq!(bus.read32(0xFFFE_0130), 0x0001_E988);
}

#[test]
fn test_writes_bump_page_generation() {
    let mut bus = Bus::new();
    let before = bus.page_gens().get(1);
    bus.write32(0x8000_1000, 1);
    bus.write8(0x0000_1FFF, 2);
    assert_eq!(bus.page_gens().get(1), before.wrapping_add(2));
}

#[test]
fn test_kuseg_middle_falls_back_to_slow_path() {
    // Segment bits outside the mapped windows still reach physical RAM
    let mut bus = Bus::new();
    bus.write32(0x2000_0040, 0x55AA_55AA);
    assert_eq!(bus.read32(0x0000_0040), 0x55AA_55AA);
}

#[test]
fn test_load_bios_validates_size() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 1024]).unwrap();

    let mut bus = Bus::new();
    let err = bus
        .load_bios(file.path().to_str().unwrap())
        .unwrap_err();
    assert!(matches!(err, EmulatorError::InvalidBiosSize { .. }));
}

#[test]
fn test_load_bios_and_read() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut image = vec![0u8; BIOS_SIZE];
    image[0..4].copy_from_slice(&0x3C08_0013u32.to_le_bytes());
    file.write_all(&image).unwrap();

    let mut bus = Bus::new();
    bus.load_bios(file.path().to_str().unwrap()).unwrap();
    assert_eq!(bus.read32(0xBFC0_0000), 0x3C08_0013);
    assert_eq!(bus.read32(0x9FC0_0000), 0x3C08_0013);
}

#[test]
fn test_load_bios_missing_file() {
    let mut bus = Bus::new();
    let err = bus.load_bios("/nonexistent/bios.bin").unwrap_err();
    assert!(matches!(err, EmulatorError::BiosNotFound(_)));
}

#[test]
fn test_ram_store_bumps_generations() {
    let mut bus = Bus::new();
    let g0 = bus.page_gens().get(0);
    let g1 = bus.page_gens().get(1);
    bus.ram_store(0x0000_0FF0, &[0xAB; 32]);
    assert_eq!(bus.read8(0x8000_0FF0), 0xAB);
    assert_ne!(bus.page_gens().get(0), g0);
    assert_ne!(bus.page_gens().get(1), g1);
}

proptest! {
    /// Round-trip through any segment prefix reads back the same byte
    /// through every other prefix.
    #[test]
    fn prop_byte_roundtrip_segment_independent(
        offset in 0u32..(RAM_SIZE as u32),
        value: u8,
        write_seg in 0usize..3,
        read_seg in 0usize..3,
    ) {
        const SEGMENTS: [u32; 3] = [0x0000_0000, 0x8000_0000, 0xA000_0000];
        let mut bus = Bus::new();
        bus.write8(SEGMENTS[write_seg] | offset, value);
        prop_assert_eq!(bus.read8(SEGMENTS[read_seg] | offset), value);
    }
}
