//! Dispatch-table construction (spec.md §4.3 Decode, §9 "Dynamic
//! dispatch"): a 65,536-entry array keyed by the full 16-bit
//! instruction word, built once per CPU variant by walking an
//! opcode-descriptor list and expanding each descriptor's wildcard
//! bits into every matching slot. Two descriptor tables exist (SH-2,
//! SH-4) and are applied in sequence, as spec.md requires, with the
//! SH-4 table's extra opcodes simply overlaying empty slots left by
//! the SH-2 pass (the SH-2 table is built first and is a strict
//! subset, so no legitimate collisions occur between the two passes).

use crate::bus::Mmap;
use crate::device::IrqIntent;
use crate::error::CpuError;
use crate::sh::cpu::Cpu;

pub type OpHandler = fn(&mut Cpu, u16, &mut Mmap) -> Result<Vec<IrqIntent>, CpuError>;

#[derive(Clone, Copy)]
pub struct OpDescriptor {
    pub name: &'static str,
    /// 16 characters, MSB first. `'0'`/`'1'` are fixed bits; any other
    /// character is a wildcard (operand field) expanded over both
    /// values during table construction.
    pub pattern: &'static str,
    pub handler: OpHandler,
    /// Set for instructions that manage PC themselves (branches,
    /// jumps, RTS/RTE) — used both to skip the "advance PC by 2"
    /// default and to reject delay-slot nesting.
    pub is_branch: bool,
    pub sh4_only: bool,
    pub privileged: bool,
}

#[derive(Clone, Copy)]
pub struct TableEntry {
    pub handler: OpHandler,
    pub name: &'static str,
    pub is_branch: bool,
    pub sh4_only: bool,
    pub privileged: bool,
}

pub struct DecodeTable {
    entries: Vec<Option<TableEntry>>,
}

fn pattern_to_mask_match(pattern: &str) -> (u16, u16, Vec<usize>) {
    assert_eq!(pattern.len(), 16, "opcode pattern must be 16 bits: {pattern}");
    let mut mask = 0u16;
    let mut matched = 0u16;
    let mut wildcard_bits = Vec::new();
    for (i, c) in pattern.chars().enumerate() {
        let bit_index = 15 - i;
        match c {
            '0' => {
                mask |= 1 << bit_index;
            }
            '1' => {
                mask |= 1 << bit_index;
                matched |= 1 << bit_index;
            }
            _ => wildcard_bits.push(bit_index),
        }
    }
    (mask, matched, wildcard_bits)
}

impl DecodeTable {
    fn empty() -> Self {
        DecodeTable { entries: vec![None; 1 << 16] }
    }

    /// Builds a table from one or more descriptor lists applied in
    /// sequence; a slot populated by an earlier list is never
    /// overwritten, but two descriptors *within the same pass* that
    /// claim the same slot is a fatal build error (spec.md §4.3
    /// "collisions are fatal").
    pub fn build(passes: &[&[OpDescriptor]]) -> Self {
        let mut table = Self::empty();
        for pass in passes {
            let mut claimed_this_pass = vec![false; 1 << 16];
            for desc in *pass {
                let (mask, matched, wildcards) = pattern_to_mask_match(desc.pattern);
                let combos = 1usize << wildcards.len();
                for combo in 0..combos {
                    let mut word = matched;
                    for (bit_pos, &bit_index) in wildcards.iter().enumerate() {
                        if combo & (1 << bit_pos) != 0 {
                            word |= 1 << bit_index;
                        }
                    }
                    debug_assert_eq!(word & mask, matched);
                    let idx = word as usize;
                    if claimed_this_pass[idx] {
                        panic!(
                            "decode table collision: '{}' overlaps another opcode in the same pass at slot {:#06x}",
                            desc.name, idx
                        );
                    }
                    claimed_this_pass[idx] = true;
                    if table.entries[idx].is_none() {
                        table.entries[idx] = Some(TableEntry {
                            handler: desc.handler,
                            name: desc.name,
                            is_branch: desc.is_branch,
                            sh4_only: desc.sh4_only,
                            privileged: desc.privileged,
                        });
                    }
                }
            }
        }
        table
    }

    pub fn lookup(&self, opcode: u16) -> Option<TableEntry> {
        self.entries[opcode as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sh::{fpu, ops};

    #[test]
    fn the_full_sh4_table_builds_without_collisions() {
        let _ = DecodeTable::build(&[ops::SH2_OPS, ops::SH4_ONLY_OPS, fpu::SH4_FPU_OPS]);
    }

    #[test]
    #[should_panic(expected = "decode table collision")]
    fn two_descriptors_claiming_the_same_slot_in_one_pass_panics() {
        fn handler(_: &mut Cpu, _: u16, _: &mut Mmap) -> Result<Vec<IrqIntent>, CpuError> {
            Ok(Vec::new())
        }
        const OVERLAPPING: &[OpDescriptor] = &[
            OpDescriptor {
                name: "A",
                pattern: "0000000000000000",
                handler,
                is_branch: false,
                sh4_only: false,
                privileged: false,
            },
            OpDescriptor {
                name: "B",
                pattern: "000000000000000n",
                handler,
                is_branch: false,
                sh4_only: false,
                privileged: false,
            },
        ];
        DecodeTable::build(&[OVERLAPPING]);
    }

    #[test]
    fn wildcard_bits_expand_to_every_matching_slot() {
        const ONE_REG: &[OpDescriptor] = &[OpDescriptor {
            name: "NOPN",
            pattern: "0000nnnn00001001",
            handler: |_, _, _| Ok(Vec::new()),
            is_branch: false,
            sh4_only: false,
            privileged: false,
        }];
        let table = DecodeTable::build(&[ONE_REG]);
        assert!(table.lookup(0x0009).is_some());
        assert!(table.lookup(0x0F09).is_some());
        assert!(table.lookup(0x0109).is_some());
    }
}

/// Operand extraction helpers shared by every handler in `ops`/`fpu`
/// (spec.md §4.3 "Operand encoding").
pub mod operand {
    pub fn rn(inst: u16) -> usize {
        ((inst >> 8) & 0xF) as usize
    }
    pub fn rm(inst: u16) -> usize {
        ((inst >> 4) & 0xF) as usize
    }
    pub fn uimm8(inst: u16) -> u32 {
        (inst & 0xFF) as u32
    }
    pub fn simm8(inst: u16) -> i32 {
        (inst & 0xFF) as i8 as i32
    }
    pub fn simm12(inst: u16) -> i32 {
        let raw = inst & 0x0FFF;
        if raw & 0x800 != 0 {
            (raw as i32) - 0x1000
        } else {
            raw as i32
        }
    }
}
