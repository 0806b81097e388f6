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

//! psxjit headless entry point
//!
//! Resolves the configuration (file plus CLI overrides), boots the
//! system, and runs frames until the requested count or forever.

use clap::Parser;
use psxjit::core::config::Config;
use psxjit::core::system::System;
use psxjit::core::timing::Region;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "psxjit", about = "A dynamic-recompiler PSX emulator core")]
struct Args {
    /// Configuration file (TOML key = value)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// BIOS image (512 KiB), overrides the config file
    #[arg(long)]
    bios: Option<PathBuf>,

    /// PS-X EXE to side-load, overrides the config file
    #[arg(long)]
    exe: Option<PathBuf>,

    /// Disc image handed to the CD-ROM peripheral
    #[arg(long)]
    disc: Option<PathBuf>,

    /// Video region: ntsc or pal
    #[arg(long)]
    region: Option<String>,

    /// Force the interpreter backend
    #[arg(long)]
    no_dynarec: bool,

    /// Stop after this many frames (run forever when absent)
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env may carry RUST_LOG and path overrides
    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bios) = args.bios {
        config.bios = Some(bios);
    }
    if let Some(exe) = args.exe {
        config.exe = Some(exe);
    }
    if let Some(disc) = args.disc {
        config.disc = Some(disc);
    }
    if let Some(region) = &args.region {
        config.region = match region.to_ascii_lowercase().as_str() {
            "ntsc" => Region::Ntsc,
            "pal" => Region::Pal,
            other => return Err(format!("unknown region '{}'", other).into()),
        };
    }
    if args.no_dynarec {
        config.dynarec = false;
    }

    if config.bios.is_none() {
        return Err("no BIOS image given (--bios or a config file)".into());
    }

    log::info!("starting psxjit");
    let mut system = System::new();
    system.apply_config(&config)?;

    let mut frame: u64 = 0;
    loop {
        system.run_frame()?;
        frame += 1;
        if frame % 60 == 0 {
            log::debug!("frame {} at cycle {}", frame, system.cycles());
        }
        if args.frames.is_some_and(|limit| frame >= limit) {
            break;
        }
    }

    log::info!("stopped after {} frames ({} cycles)", frame, system.cycles());
    Ok(())
}
