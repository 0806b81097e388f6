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

//! Emulator configuration
//!
//! The config file is a small TOML `key = value` document naming the BIOS
//! image and the guest executable or disc image:
//!
//! ```toml
//! bios = "scph1001.bin"
//! exe = "game.exe"
//! region = "ntsc"
//! dynarec = true
//! ```
//!
//! The core only consumes the resolved paths; disc images are handed to
//! the CD-ROM peripheral, which is outside this crate.

use crate::core::error::{EmulatorError, Result};
use crate::core::timing::Region;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Resolved emulator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path to the 512 KiB BIOS image
    pub bios: Option<PathBuf>,

    /// Path to a PS-X EXE guest executable to side-load after BIOS boot
    pub exe: Option<PathBuf>,

    /// Path to a disc image, forwarded to the CD-ROM peripheral
    pub disc: Option<PathBuf>,

    /// Video region, selects the scanline cadence
    #[serde(default)]
    pub region: Region,

    /// Use the dynamic recompiler backend where the host supports it
    #[serde(default = "default_dynarec")]
    pub dynarec: bool,
}

fn default_dynarec() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bios: None,
            exe: None,
            disc: None,
            region: Region::default(),
            dynarec: default_dynarec(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::ConfigError`] if the file cannot be read
    /// or does not parse as a config document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EmulatorError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&text).map_err(|e| {
            EmulatorError::ConfigError(format!("cannot parse {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_parse_full() {
        let cfg: Config = toml::from_str(
            r#"
            bios = "scph1001.bin"
            exe = "psxtest.exe"
            region = "pal"
            dynarec = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bios.as_deref(), Some(Path::new("scph1001.bin")));
        assert_eq!(cfg.exe.as_deref(), Some(Path::new("psxtest.exe")));
        assert_eq!(cfg.region, Region::Pal);
        assert!(!cfg.dynarec);
    }

    #[test]
    fn test_config_defaults() {
        let cfg: Config = toml::from_str(r#"bios = "b.bin""#).unwrap();
        assert_eq!(cfg.region, Region::Ntsc);
        assert!(cfg.dynarec);
        assert!(cfg.exe.is_none());
        assert!(cfg.disc.is_none());
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        let parsed: std::result::Result<Config, _> = toml::from_str(r#"bios_path = "b.bin""#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bios = \"scph1001.bin\"").unwrap();
        writeln!(file, "disc = \"game.iso\"").unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.bios.as_deref(), Some(Path::new("scph1001.bin")));
        assert_eq!(cfg.disc.as_deref(), Some(Path::new("game.iso")));
    }

    #[test]
    fn test_config_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/psxjit.toml")).unwrap_err();
        assert!(matches!(err, EmulatorError::ConfigError(_)));
    }
}
