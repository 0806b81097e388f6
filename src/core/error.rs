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

//! Error types for the emulator core
//!
//! [`EmulatorError`] covers host-level failures only: files that cannot be
//! loaded, malformed images, config problems, and code-buffer mapping
//! failures. Guest CPU exceptions (address errors, overflow, syscall,
//! interrupts) never surface here — they write COP0 state, set the
//! block-abort flag, and emulation continues at the exception vector.
//! Violated internal invariants (scheduler slot misuse, arena overflow
//! outside a recoverable flush) are bugs and panic with a diagnostic.

use thiserror::Error;

/// Result type alias used by all fallible operations in the crate
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Top-level emulator error
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// BIOS file could not be found or opened
    #[error("BIOS file not found: {0}")]
    BiosNotFound(String),

    /// BIOS image has the wrong size
    #[error("invalid BIOS size: expected {expected} bytes, got {got}")]
    InvalidBiosSize { expected: usize, got: usize },

    /// Guest executable could not be loaded
    #[error("loader error: {0}")]
    LoaderError(String),

    /// Configuration file could not be read or parsed
    #[error("config error: {0}")]
    ConfigError(String),

    /// The JIT code buffer could not be mapped or re-protected
    #[error("code buffer mapping failed: {0}")]
    CodeBuffer(#[from] mmap_rs::Error),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmulatorError::InvalidBiosSize {
            expected: 512 * 1024,
            got: 1024,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("524288"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EmulatorError = io.into();
        assert!(matches!(err, EmulatorError::Io(_)));
    }
}
