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

//! psxjit: a dynamic-recompiler PlayStation (PSX) emulator core
//!
//! This crate implements the execution core of a PSX emulator: the MIPS
//! R3000A dynamic recompiler, the cycle-accurate event scheduler that
//! drives it, the guest memory model the JIT reads through, and the
//! exception/interrupt plumbing that connects them.
//!
//! # Architecture
//!
//! - [`core::cpu`]: MIPS R3000A architectural state and the portable
//!   interpreter backend
//! - [`core::dynarec`]: block compiler, block cache, and native code buffer
//!   (generated code targets the MIPS R5900 host)
//! - [`core::memory`]: memory bus, fast-path lookup tables, and
//!   self-modifying-code page generations
//! - [`core::scheduler`]: fixed-slot hardware event queue
//! - [`core::interrupt`]: I_STAT/I_MASK pair and delayed IRQ assertion
//! - [`core::system`]: system integration and the main execution loop
//!
//! # Example
//!
//! ```no_run
//! use psxjit::core::system::System;
//!
//! let mut system = System::new();
//! system.load_bios("path/to/bios.bin")?;
//! system.run_frame()?;
//! # Ok::<(), psxjit::core::error::EmulatorError>(())
//! ```
//!
//! # Error Handling
//!
//! All fallible host-level operations return [`core::error::Result<T>`],
//! an alias for `Result<T, EmulatorError>`. Guest CPU exceptions are not
//! Rust errors: they update COP0 state and execution continues.

pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};
