//! Emulator host binary (spec.md §6): loads a game list, loads the
//! named ROM's sections into a fresh machine, then drives the
//! scanline scheduler frame by frame with a headless renderer.
//!
//! Grounded on `original_source/src/vk/main.c`'s `main`/`main_loop`
//! shape (parse args, load list, load game, build machine, reset hard,
//! loop), restructured around `clap`'s derive API in place of raw
//! `getopt`.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use hikaru_core::games::{self, GameList};
use hikaru_core::memctl::BankConfig;
use hikaru_core::renderer::NullRenderer;
use hikaru_core::savestate::{SaveReader, SaveWriter};
use hikaru_core::sh::cpu::CpuState;
use hikaru_core::Machine;

/// Headless host for the Hikaru arcade board core.
#[derive(Parser, Debug)]
#[command(name = "hikaru-core", about = "Hikaru arcade board emulator host")]
struct Args {
    /// Path to the ROM directory.
    #[arg(short = 'R', value_name = "rom_dir")]
    rom_dir: PathBuf,

    /// Name of the game to run, as listed in the game list.
    #[arg(short = 'r', value_name = "game_name")]
    game_name: String,

    /// Strict mode: stop on the first component warning instead of
    /// continuing past it.
    #[arg(short = 's')]
    strict: bool,
}

fn main() {
    env_logger::init();
    match run() {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let list = GameList::discover().context("failed to load the game list")?;
    let rom = list
        .find(&args.game_name)
        .with_context(|| format!("failed to load '{}'", args.game_name))?;
    if rom.mach != "hikaru" {
        bail!("unrecognized machine '{}'", rom.mach);
    }

    let mut machine = Machine::new(BankConfig::default());
    games::load_rom(&machine, &args.rom_dir, rom).context("failed to load game sections")?;
    machine.reset();

    let state_path = format!("{}.vkstate", rom.name);
    if let Ok(bytes) = std::fs::read(&state_path) {
        match SaveReader::new(&bytes).and_then(|mut r| r.read_machine(&machine)) {
            Ok(()) => log::info!("loaded state '{state_path}'"),
            Err(e) => log::warn!("failed to load state '{state_path}': {e}"),
        }
    }

    log::info!("running '{}'", rom.name);
    let mut renderer = NullRenderer;
    loop {
        machine.run_frame(&mut renderer);
        let master_halted = machine.master.state == CpuState::Stop;
        let slave_halted = machine.slave.state == CpuState::Stop;
        if master_halted && slave_halted {
            log::info!("both cpus halted, quitting");
            break;
        }
        if args.strict && (master_halted || slave_halted) {
            bail!("cpu halted in strict mode");
        }
    }

    let mut writer = SaveWriter::new();
    writer.write_machine(&machine);
    if let Err(e) = std::fs::write(&state_path, writer.into_bytes()) {
        log::warn!("failed to save state '{state_path}': {e}");
    }

    Ok(())
}
