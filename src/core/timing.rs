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

//! Clock and video timing constants
//!
//! All deadlines in the emulator are expressed in CPU cycles at the master
//! clock. Video cadence (HBLANK/VBLANK events) is derived from the scanline
//! cycle counts below.

use serde::Deserialize;

/// CPU master clock frequency in Hz (33.8688 MHz)
pub const CPU_CLOCK_HZ: u64 = 33_868_800;

/// Console video region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
}

impl Region {
    /// CPU cycles per scanline
    pub fn cycles_per_scanline(self) -> u64 {
        match self {
            Region::Ntsc => 2173,
            Region::Pal => 2168,
        }
    }

    /// Total scanlines per frame, including the vertical blanking interval
    pub fn scanlines_per_frame(self) -> u64 {
        match self {
            Region::Ntsc => 263,
            Region::Pal => 314,
        }
    }

    /// CPU cycles per full video frame
    pub fn cycles_per_frame(self) -> u64 {
        self.cycles_per_scanline() * self.scanlines_per_frame()
    }
}

/// Dotclock divider numerators for the horizontal display modes
/// (256/320/368/512/640 pixels wide); the shared denominator is 11.
pub const DOTCLOCK_NUMERATORS: [u32; 5] = [70, 56, 49, 35, 28];

/// Dotclock divider denominator
pub const DOTCLOCK_DENOMINATOR: u32 = 11;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntsc_frame_cycles() {
        // 263 scanlines of 2173 cycles each
        assert_eq!(Region::Ntsc.cycles_per_frame(), 2173 * 263);
    }

    #[test]
    fn test_pal_frame_cycles() {
        assert_eq!(Region::Pal.cycles_per_frame(), 2168 * 314);
    }

    #[test]
    fn test_frame_rate_near_spec() {
        // NTSC should land close to 59.94 Hz, PAL close to 50 Hz
        let ntsc_hz = CPU_CLOCK_HZ as f64 / Region::Ntsc.cycles_per_frame() as f64;
        assert!((ntsc_hz - 59.3).abs() < 1.0, "NTSC rate was {}", ntsc_hz);

        let pal_hz = CPU_CLOCK_HZ as f64 / Region::Pal.cycles_per_frame() as f64;
        assert!((pal_hz - 49.8).abs() < 1.0, "PAL rate was {}", pal_hz);
    }
}
