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

//! Native code buffer
//!
//! A single 4 MiB mapped region owned by the recompiler. The buffer is
//! append-only between resets and flips between two states:
//!
//! - **emitting** (`begin_emit`): mapped read/write, words may be
//!   appended and previously-emitted words patched (direct-link fixups).
//! - **executing** (`end_emit`): mapped read/execute, instruction cache
//!   flushed for everything written since the last transition.
//!
//! The W^X dance and the icache flush go through `mmap-rs`, which knows
//! the right incantation per host platform.

use crate::core::error::Result;
use mmap_rs::{MmapMut, MmapOptions};

/// Capacity of the code buffer in bytes
pub const CODE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Headroom required to start compiling another block: a worst-case
/// 256-instruction block with store fast paths stays well under this
pub const BLOCK_HEADROOM: usize = 256 * 1024;

enum Mapping {
    /// RW, emission allowed
    Writable(MmapMut),
    /// RX, executable
    Executable(mmap_rs::Mmap),
    /// Transient state while re-protecting
    Empty,
}

/// Append-only native code arena with W^X phase toggling
pub struct CodeBuffer {
    map: Mapping,
    /// Bytes in use
    len: usize,
    /// Low-water mark a reset returns to (end of the trampolines)
    reset_mark: usize,
}

impl CodeBuffer {
    /// Map a fresh buffer, initially writable
    pub fn new() -> Result<Self> {
        let map = MmapOptions::new(CODE_BUFFER_SIZE)?.map_mut()?;
        Ok(Self {
            map: Mapping::Writable(map),
            len: 0,
            reset_mark: 0,
        })
    }

    /// Switch to the emitting state (read/write)
    pub fn begin_emit(&mut self) -> Result<()> {
        self.map = match std::mem::replace(&mut self.map, Mapping::Empty) {
            Mapping::Executable(m) => match m.make_mut() {
                Ok(m) => Mapping::Writable(m),
                Err((m, e)) => {
                    self.map = Mapping::Executable(m);
                    return Err(e.into());
                }
            },
            writable => writable,
        };
        Ok(())
    }

    /// Switch to the executing state (read/execute), flushing the host
    /// instruction cache for the whole buffer
    pub fn end_emit(&mut self) -> Result<()> {
        self.map = match std::mem::replace(&mut self.map, Mapping::Empty) {
            Mapping::Writable(m) => match m.make_exec() {
                Ok(m) => {
                    m.flush_icache()?;
                    Mapping::Executable(m)
                }
                Err((m, e)) => {
                    self.map = Mapping::Writable(m);
                    return Err(e.into());
                }
            },
            exec => exec,
        };
        Ok(())
    }

    fn base(&self) -> *const u8 {
        match &self.map {
            Mapping::Writable(m) => m.as_ptr(),
            Mapping::Executable(m) => m.as_ptr(),
            Mapping::Empty => unreachable!("code buffer left in transient state"),
        }
    }

    /// Host address of a buffer offset
    pub fn addr_of(&self, offset: u32) -> *const u8 {
        debug_assert!((offset as usize) < CODE_BUFFER_SIZE);
        unsafe { self.base().add(offset as usize) }
    }

    /// Current append offset in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Bytes left before the buffer is exhausted
    pub fn remaining(&self) -> usize {
        CODE_BUFFER_SIZE - self.len
    }

    /// Append one instruction word; panics outside the emitting state
    /// or past the end of the buffer (callers reserve headroom first)
    pub fn emit32(&mut self, word: u32) -> u32 {
        let Mapping::Writable(m) = &mut self.map else {
            panic!("emit32 outside an emission session");
        };
        assert!(self.len + 4 <= CODE_BUFFER_SIZE, "code buffer overflow");
        let offset = self.len as u32;
        m[self.len..self.len + 4].copy_from_slice(&word.to_le_bytes());
        self.len += 4;
        offset
    }

    /// Rewrite a previously-emitted word (branch fixups, link patching)
    pub fn patch32(&mut self, offset: u32, word: u32) {
        let Mapping::Writable(m) = &mut self.map else {
            panic!("patch32 outside an emission session");
        };
        let offset = offset as usize;
        debug_assert!(offset + 4 <= self.len);
        m[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
    }

    /// Read back an emitted word (tests, link verification)
    pub fn read32(&self, offset: u32) -> u32 {
        let offset = offset as usize;
        debug_assert!(offset + 4 <= self.len);
        let base = self.base();
        let mut bytes = [0u8; 4];
        unsafe { std::ptr::copy_nonoverlapping(base.add(offset), bytes.as_mut_ptr(), 4) };
        u32::from_le_bytes(bytes)
    }

    /// Record the end of the pre-emitted trampolines; resets keep them
    pub fn set_reset_mark(&mut self) {
        self.reset_mark = self.len;
    }

    /// Drop everything emitted after the trampolines
    pub fn reset(&mut self) {
        self.len = self.reset_mark;
        log::info!("code buffer reset to {} bytes", self.len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_read_back() {
        let mut buf = CodeBuffer::new().unwrap();
        let a = buf.emit32(0x3C08_DEAD);
        let b = buf.emit32(0x3508_BEEF);
        assert_eq!(a, 0);
        assert_eq!(b, 4);
        assert_eq!(buf.read32(0), 0x3C08_DEAD);
        assert_eq!(buf.read32(4), 0x3508_BEEF);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_patch32() {
        let mut buf = CodeBuffer::new().unwrap();
        let site = buf.emit32(0);
        buf.emit32(0x1111_1111);
        buf.patch32(site, 0x0800_0042);
        assert_eq!(buf.read32(site), 0x0800_0042);
        assert_eq!(buf.read32(4), 0x1111_1111);
    }

    #[test]
    fn test_emit_phases_roundtrip() {
        let mut buf = CodeBuffer::new().unwrap();
        buf.emit32(0xABCD_0123);
        buf.end_emit().unwrap();
        // Readable while executable
        assert_eq!(buf.read32(0), 0xABCD_0123);
        buf.begin_emit().unwrap();
        buf.emit32(0x4567_89AB);
        assert_eq!(buf.read32(4), 0x4567_89AB);
    }

    #[test]
    fn test_reset_keeps_trampolines() {
        let mut buf = CodeBuffer::new().unwrap();
        buf.emit32(1);
        buf.emit32(2);
        buf.set_reset_mark();
        buf.emit32(3);
        buf.emit32(4);
        buf.reset();
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.read32(4), 2);
    }
}
