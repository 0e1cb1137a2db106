//! Interrupt fabric register propagation (spec.md §4.7): the status
//! register a device raises a source bit in, the aggregation register
//! that ORs several source registers together, and the hook that turns
//! a nonzero aggregate into a master IRL2 line plus a Port A toggle.
//!
//! Grounded on `memctl.rs`'s `Device` implementation for the
//! register-file shape, generalized to the fixed set of status/
//! aggregation registers spec.md §4.7 names instead of a DMA block.

use crate::device::{le_bytes, take_u32, CpuId, Device, IrqIntent, ResetKind};
use crate::error::{BusError, StateError};

/// Offsets within the fabric's register file (spec.md §4.7): reg15.88
/// is the IRQ-status register GPU-side sources raise bits in (bit 7
/// mirrors any bit set in reg1A.18); reg1A.18 is the aggregation of
/// reg1A.{08,0C,10,14}, the four maskable source groups board-side
/// devices raise bits in; reg15.84 is the mask ANDed against reg15.88
/// to decide whether the master IRL2 line actually gets raised.
const REG_IRQ_STATUS: usize = 0; // 15.88, local byte offset 0x00
const REG_AGG_08: usize = 1; // 1A.08, local byte offset 0x04
const REG_AGG_0C: usize = 2; // 1A.0C, local byte offset 0x08
const REG_AGG_10: usize = 3; // 1A.10, local byte offset 0x0C
const REG_AGG_14: usize = 4; // 1A.14, local byte offset 0x10
const REG_AGG_18: usize = 5; // 1A.18, local byte offset 0x14, recomputed on every write above
const REG_MASK: usize = 6; // 15.84, local byte offset 0x18

const STATUS_AGG_BIT: u32 = 1 << 7;

pub struct InterruptFabric {
    regs: [u32; 7],
}

impl InterruptFabric {
    pub fn new() -> Self {
        let mut regs = [0; 7];
        regs[REG_MASK] = 0xFFFF_FFFF;
        InterruptFabric { regs }
    }

    /// Sets a single source bit in reg15.88 (spec.md §4.7 "Source
    /// raise"). Devices call this indirectly via an `IrqIntent`; the
    /// machine routes the intent here before recomputing.
    pub fn raise_source(&mut self, bit: u8) {
        self.regs[REG_IRQ_STATUS] |= 1 << bit;
    }

    pub fn clear_source(&mut self, bit: u8) {
        self.regs[REG_IRQ_STATUS] &= !(1 << bit);
    }

    /// Recomputes reg1A.18 from its four sources and mirrors it into
    /// reg15.88 bit 7 (spec.md §4.7).
    fn recompute_aggregate(&mut self) -> u32 {
        let agg = self.regs[REG_AGG_08] | self.regs[REG_AGG_0C] | self.regs[REG_AGG_10] | self.regs[REG_AGG_14];
        self.regs[REG_AGG_18] = agg;
        if agg != 0 {
            self.regs[REG_IRQ_STATUS] |= STATUS_AGG_BIT;
        } else {
            self.regs[REG_IRQ_STATUS] &= !STATUS_AGG_BIT;
        }
        agg
    }

    /// Recomputes reg1A.18/reg15.88 bit 7, then, if `reg15.88 &
    /// reg15.84 (mask) != 0`, raises the master CPU's IRL2 line and
    /// clears Port A bit 5 (spec.md §4.7 "Recompute-then-raise").
    /// Returns the intents for the machine to apply.
    pub fn recompute_and_raise(&mut self) -> Vec<IrqIntent> {
        self.recompute_aggregate();
        let mut intents = Vec::new();
        if self.regs[REG_IRQ_STATUS] & self.regs[REG_MASK] != 0 {
            intents.push(IrqIntent::SetIrqLine { cpu: CpuId::Master, level: 2, raised: true, vector: 0x620 });
            intents.push(IrqIntent::SetPortA { cpu: CpuId::Master, bit: 5, value: false });
        }
        intents
    }
}

impl Default for InterruptFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for InterruptFabric {
    fn name(&self) -> &'static str {
        "interrupts"
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.regs = [0; 7];
        self.regs[REG_MASK] = 0xFFFF_FFFF;
    }

    fn exec(&mut self, _cycles: u32) -> (u32, Vec<IrqIntent>) {
        (0, Vec::new())
    }

    fn get(&mut self, size: u8, addr: u32) -> Result<(u64, Vec<IrqIntent>), BusError> {
        let idx = ((addr & 0x1F) / 4) as usize;
        if idx >= self.regs.len() || size != 4 {
            return Err(BusError::UnsupportedSize { cpu: "interrupts", addr, size });
        }
        Ok((self.regs[idx] as u64, Vec::new()))
    }

    fn put(&mut self, size: u8, addr: u32, value: u64) -> Result<Vec<IrqIntent>, BusError> {
        let idx = ((addr & 0x1F) / 4) as usize;
        if idx >= self.regs.len() || size != 4 {
            return Err(BusError::UnsupportedSize { cpu: "interrupts", addr, size });
        }
        self.regs[idx] = value as u32;
        let intents = match idx {
            REG_AGG_08 | REG_AGG_0C | REG_AGG_10 | REG_AGG_14 | REG_MASK | REG_IRQ_STATUS => {
                self.recompute_and_raise()
            }
            _ => Vec::new(),
        };
        Ok(intents)
    }

    fn save_state(&self, out: &mut Vec<u8>) {
        for r in self.regs {
            out.extend_from_slice(&le_bytes(r as u64, 4));
        }
    }

    fn load_state(&mut self, cursor: &mut &[u8]) -> Result<(), StateError> {
        for r in self.regs.iter_mut() {
            *r = take_u32(cursor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_ors_the_four_source_registers() {
        let mut fab = InterruptFabric::new();
        Device::put(&mut fab, 4, 0x04, 0x01).unwrap();
        Device::put(&mut fab, 4, 0x0C, 0x10).unwrap();
        assert_eq!(fab.regs[REG_AGG_18], 0x11);
    }

    #[test]
    fn nonzero_aggregate_raises_master_irl2_and_clears_port_a() {
        let mut fab = InterruptFabric::new();
        let intents = Device::put(&mut fab, 4, 0x04, 0x01).unwrap();
        assert!(intents.iter().any(|i| matches!(
            i,
            IrqIntent::SetIrqLine { cpu: CpuId::Master, raised: true, .. }
        )));
        assert!(intents.iter().any(|i| matches!(
            i,
            IrqIntent::SetPortA { cpu: CpuId::Master, bit: 5, value: false }
        )));
    }

    #[test]
    fn zero_aggregate_raises_nothing() {
        let mut fab = InterruptFabric::new();
        let intents = Device::put(&mut fab, 4, 0x04, 0).unwrap();
        assert!(intents.is_empty());
    }

    #[test]
    fn source_raise_and_clear_toggle_the_status_bit() {
        let mut fab = InterruptFabric::new();
        fab.raise_source(3);
        assert_eq!(fab.regs[REG_IRQ_STATUS] & (1 << 3), 1 << 3);
        fab.clear_source(3);
        assert_eq!(fab.regs[REG_IRQ_STATUS] & (1 << 3), 0);
    }

    #[test]
    fn nonzero_aggregate_sets_status_bit_seven() {
        let mut fab = InterruptFabric::new();
        Device::put(&mut fab, 4, 0x04, 0x01).unwrap();
        assert_eq!(fab.regs[REG_IRQ_STATUS] & (1 << 7), 1 << 7);
        Device::put(&mut fab, 4, 0x04, 0x00).unwrap();
        assert_eq!(fab.regs[REG_IRQ_STATUS] & (1 << 7), 0);
    }

    #[test]
    fn a_fully_masked_status_raises_nothing() {
        let mut fab = InterruptFabric::new();
        Device::put(&mut fab, 4, 0x18, 0x00).unwrap();
        let intents = Device::put(&mut fab, 4, 0x04, 0x01).unwrap();
        assert!(intents.is_empty());
        assert_ne!(fab.regs[REG_AGG_18], 0);
    }

    #[test]
    fn unmasking_after_a_raised_source_delivers_the_intent_on_the_next_mutation() {
        let mut fab = InterruptFabric::new();
        Device::put(&mut fab, 4, 0x18, 0x00).unwrap();
        Device::put(&mut fab, 4, 0x04, 0x01).unwrap();
        let intents = Device::put(&mut fab, 4, 0x18, 0xFFFF_FFFF).unwrap();
        assert!(intents.iter().any(|i| matches!(i, IrqIntent::SetIrqLine { raised: true, .. })));
    }
}
