//! Game-list discovery and ROM-section loading (spec.md §6).
//!
//! Grounded on `original_source/src/vk/games.c`: a game list is a JSON
//! document naming, per machine, a set of named sections assembled
//! from one or more files on disk by one of three combination modes.
//! `vk_game_list_new`'s search path is fixed by spec.md §6 to three
//! candidate locations tried in order.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CoreError;
use crate::machine::Machine;

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
pub struct GameList {
    pub version: u32,
    pub roms: Vec<RomEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RomEntry {
    pub name: String,
    pub mach: String,
    pub sections: Vec<SectionSpec>,
}

#[derive(Debug, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    #[serde(default)]
    pub endn: Option<String>,
    #[serde(default)]
    pub amnt: Option<u8>,
    pub data: Vec<Datum>,
}

#[derive(Debug, Deserialize)]
pub struct Datum {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Alternative,
    Interleave,
    Concatenate,
}

impl GameList {
    /// Parses a game list document, rejecting anything but the one
    /// version this loader understands (spec.md §6; mirrors
    /// `vk_game_list_new`'s hard version check).
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let list: GameList =
            serde_json::from_str(text).map_err(|e| CoreError::UnsupportedGame(e.to_string()))?;
        if list.version != CURRENT_VERSION {
            return Err(CoreError::UnsupportedGame(format!(
                "game list version {} unsupported, expected {}",
                list.version, CURRENT_VERSION
            )));
        }
        Ok(list)
    }

    /// Walks the fixed three-location search path (spec.md §6:
    /// `./vk-games.json`, `$HOME/vk-games.json`,
    /// `$HOME/.local/share/valkyrie/vk-games.json`) and parses the
    /// first file found.
    pub fn discover() -> Result<Self, CoreError> {
        for candidate in search_paths() {
            if let Ok(text) = fs::read_to_string(&candidate) {
                log::info!("loading game list from {}", candidate.display());
                return Self::parse(&text);
            }
        }
        Err(CoreError::UnsupportedGame("no game list found on search path".into()))
    }

    pub fn find(&self, name: &str) -> Option<&RomEntry> {
        self.roms.iter().find(|rom| rom.name == name)
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("./vk-games.json")];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(Path::new(&home).join("vk-games.json"));
        paths.push(Path::new(&home).join(".local/share/valkyrie/vk-games.json"));
    }
    paths
}

/// Loads every section of `rom` from `rom_dir/<rom.name>/` and installs
/// it into `machine` (spec.md §6). Each section is assembled from its
/// `data` entries per its combination mode before being handed to
/// `Machine::load_game_section`.
pub fn load_rom(machine: &Machine, rom_dir: &Path, rom: &RomEntry) -> Result<(), CoreError> {
    let base = rom_dir.join(&rom.name);
    for section in &rom.sections {
        let bytes = assemble_section(&base, section)?;
        machine.load_game_section(&section.name, &bytes)?;
    }
    Ok(())
}

fn assemble_section(base: &Path, section: &SectionSpec) -> Result<Vec<u8>, CoreError> {
    match section.kind {
        SectionKind::Alternative => assemble_alternative(base, section),
        SectionKind::Interleave => assemble_interleave(base, section),
        SectionKind::Concatenate => assemble_concatenate(base, section),
    }
}

fn read_datum(base: &Path, datum: &Datum) -> Result<Vec<u8>, CoreError> {
    let path = base.join(&datum.name);
    let mut bytes = fs::read(&path)
        .map_err(|e| CoreError::MissingSection(format!("{}: {e}", path.display())))?;
    bytes.truncate(datum.size);
    bytes.resize(datum.size, 0);
    Ok(bytes)
}

/// Tries each datum in order and keeps the first that exists on disk
/// (spec.md §6 "alternative"; mirrors `load_section`'s `MODE_ALTERNATIVE`
/// fallback, used for ROM dumps known under more than one filename).
fn assemble_alternative(base: &Path, section: &SectionSpec) -> Result<Vec<u8>, CoreError> {
    for datum in &section.data {
        if let Ok(bytes) = read_datum(base, datum) {
            return Ok(bytes);
        }
    }
    Err(CoreError::MissingSection(section.name.clone()))
}

fn assemble_concatenate(base: &Path, section: &SectionSpec) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    for datum in &section.data {
        out.extend(read_datum(base, datum)?);
    }
    Ok(out)
}

/// Interleaves pairs of data files `amnt` bytes at a time (spec.md §6
/// "interleave"; mirrors `load_section`'s `MODE_INTERLEAVE`, used for
/// Hikaru EPROMs split across two physical chips).
fn assemble_interleave(base: &Path, section: &SectionSpec) -> Result<Vec<u8>, CoreError> {
    let amnt = section.amnt.ok_or_else(|| {
        CoreError::MissingSection(format!("{}: interleave section missing amnt", section.name))
    })? as usize;
    if ![1usize, 2, 4, 8].contains(&amnt) {
        return Err(CoreError::MissingSection(format!(
            "{}: invalid interleave amnt {amnt}",
            section.name
        )));
    }
    let total: usize = section.data.iter().map(|d| d.size).sum();
    let mut out = vec![0u8; total];
    let mut base_off = 0usize;
    for (i, datum) in section.data.iter().enumerate() {
        let chunk = read_datum(base, datum)?;
        for (j, group) in chunk.chunks(amnt).enumerate() {
            let k = base_off + ((i & 1) + j) * amnt;
            if k + amnt <= out.len() {
                out[k..k + amnt].copy_from_slice(group);
            }
        }
        if i & 1 == 1 {
            base_off += chunk.len() * 2;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_list() {
        let text = r#"{
            "version": 1,
            "roms": [{
                "name": "podrace",
                "mach": "hikaru",
                "sections": [{
                    "name": "eprom",
                    "type": "concatenate",
                    "endn": "little",
                    "data": [{"name": "ic11.bin", "size": 16}]
                }]
            }]
        }"#;
        let list = GameList::parse(text).unwrap();
        assert_eq!(list.roms.len(), 1);
        assert_eq!(list.find("podrace").unwrap().mach, "hikaru");
    }

    #[test]
    fn rejects_unsupported_version() {
        let text = r#"{"version": 2, "roms": []}"#;
        assert!(GameList::parse(text).is_err());
    }

    #[test]
    fn concatenate_joins_data_in_order() {
        let dir = std::env::temp_dir().join(format!("vk-games-test-concat-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.bin"), [1u8, 2]).unwrap();
        fs::write(dir.join("b.bin"), [3u8, 4]).unwrap();
        let section = SectionSpec {
            name: "eprom".into(),
            kind: SectionKind::Concatenate,
            endn: None,
            amnt: None,
            data: vec![
                Datum { name: "a.bin".into(), size: 2 },
                Datum { name: "b.bin".into(), size: 2 },
            ],
        };
        let bytes = assemble_section(&dir, &section).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn alternative_falls_back_to_the_next_candidate() {
        let dir = std::env::temp_dir().join(format!("vk-games-test-alt-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("present.bin"), [9u8; 4]).unwrap();
        let section = SectionSpec {
            name: "eprom".into(),
            kind: SectionKind::Alternative,
            endn: None,
            amnt: None,
            data: vec![
                Datum { name: "missing.bin".into(), size: 4 },
                Datum { name: "present.bin".into(), size: 4 },
            ],
        };
        let bytes = assemble_section(&dir, &section).unwrap();
        assert_eq!(bytes, vec![9, 9, 9, 9]);
        fs::remove_dir_all(&dir).ok();
    }
}
