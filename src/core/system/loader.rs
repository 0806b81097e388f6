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

//! PS-X EXE loader
//!
//! The executable format is a 2 KiB header followed by the text image:
//!
//! ```text
//! 0x000  "PS-X EXE" magic
//! 0x010  initial PC
//! 0x014  initial GP
//! 0x018  text destination (guest address)
//! 0x01C  text size in bytes
//! 0x030  stack base
//! 0x034  stack offset
//! 0x800  text image
//! ```

use crate::core::error::{EmulatorError, Result};

const HEADER_SIZE: usize = 0x800;
const MAGIC: &[u8; 8] = b"PS-X EXE";

/// Parsed executable, ready to install into guest memory
pub(super) struct ExeImage {
    pub pc: u32,
    pub gp: u32,
    /// Initial stack pointer; 0 means "leave the BIOS default"
    pub sp: u32,
    pub dest: u32,
    pub text: Vec<u8>,
}

fn word(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Parse a PS-X EXE file image
pub(super) fn parse_exe(bytes: &[u8]) -> Result<ExeImage> {
    if bytes.len() < HEADER_SIZE {
        return Err(EmulatorError::LoaderError(format!(
            "file too small for a PS-X EXE header: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[0..8] != MAGIC {
        return Err(EmulatorError::LoaderError("missing PS-X EXE magic".into()));
    }

    let pc = word(bytes, 0x10);
    let gp = word(bytes, 0x14);
    let dest = word(bytes, 0x18);
    let size = word(bytes, 0x1C) as usize;
    let sp = word(bytes, 0x30).wrapping_add(word(bytes, 0x34));

    if bytes.len() < HEADER_SIZE + size {
        return Err(EmulatorError::LoaderError(format!(
            "text image truncated: header claims {} bytes, file holds {}",
            size,
            bytes.len() - HEADER_SIZE
        )));
    }
    if (dest & 0x1FFF_FFFF) as usize + size > crate::core::memory::RAM_SIZE {
        return Err(EmulatorError::LoaderError(format!(
            "text image does not fit in RAM: dest=0x{:08X} size=0x{:X}",
            dest, size
        )));
    }

    Ok(ExeImage {
        pc,
        gp,
        sp,
        dest,
        text: bytes[HEADER_SIZE..HEADER_SIZE + size].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_exe(pc: u32, dest: u32, text: &[u8], sp_base: u32, sp_off: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE + text.len()];
        bytes[0..8].copy_from_slice(MAGIC);
        bytes[0x10..0x14].copy_from_slice(&pc.to_le_bytes());
        bytes[0x14..0x18].copy_from_slice(&0x8001_0000u32.to_le_bytes());
        bytes[0x18..0x1C].copy_from_slice(&dest.to_le_bytes());
        bytes[0x1C..0x20].copy_from_slice(&(text.len() as u32).to_le_bytes());
        bytes[0x30..0x34].copy_from_slice(&sp_base.to_le_bytes());
        bytes[0x34..0x38].copy_from_slice(&sp_off.to_le_bytes());
        bytes[HEADER_SIZE..].copy_from_slice(text);
        bytes
    }

    #[test]
    fn test_parse_valid_exe() {
        let text = [0xAAu8; 0x100];
        let bytes = build_exe(0x8001_0000, 0x8001_0000, &text, 0x801F_FF00, 0x100);
        let exe = parse_exe(&bytes).unwrap();
        assert_eq!(exe.pc, 0x8001_0000);
        assert_eq!(exe.dest, 0x8001_0000);
        assert_eq!(exe.sp, 0x8020_0000);
        assert_eq!(exe.text.len(), 0x100);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = build_exe(0x8001_0000, 0x8001_0000, &[0; 16], 0, 0);
        bytes[0] = b'X';
        assert!(matches!(
            parse_exe(&bytes),
            Err(EmulatorError::LoaderError(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_text() {
        let mut bytes = build_exe(0x8001_0000, 0x8001_0000, &[0; 16], 0, 0);
        bytes[0x1C..0x20].copy_from_slice(&0x1000u32.to_le_bytes());
        assert!(parse_exe(&bytes).is_err());
    }

    #[test]
    fn test_rejects_image_outside_ram() {
        let bytes = build_exe(0x8001_0000, 0x801F_FFF0, &[0; 64], 0, 0);
        assert!(parse_exe(&bytes).is_err());
    }

    #[test]
    fn test_rejects_short_file() {
        assert!(parse_exe(&[0u8; 64]).is_err());
    }
}
