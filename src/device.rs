//! The `Device` trait and the scheduler-applied IRQ-intent pattern
//! that replaces the cyclic device->CPU back-pointer spec.md §9 calls
//! out (devices cannot hold a reference back to the machine that owns
//! them, because the machine also owns the CPUs the device wants to
//! interrupt).

use crate::error::BusError;

/// Which CPU an intent or access is scoped to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CpuId {
    Master,
    Slave,
}

impl CpuId {
    pub fn label(self) -> &'static str {
        match self {
            CpuId::Master => "master",
            CpuId::Slave => "slave",
        }
    }
}

/// A reset can be a full power-on reset or a softer re-arm; devices
/// that keep calibration state (e.g. the GPU's scratch objects) care
/// about the distinction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResetKind {
    Hard,
    Soft,
}

/// An effect a device wants applied to the machine's shared state
/// after a `get`/`put`/`exec` call returns. The scheduler drains these
/// after every device interaction and applies them centrally, so no
/// device needs a handle back to the CPUs or to other devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrqIntent {
    /// Raise (or lower) CPU `cpu`'s interrupt line `level` with the
    /// given exception vector.
    SetIrqLine { cpu: CpuId, level: u8, raised: bool, vector: u32 },
    /// Toggle a bit of the CPU's external Port A register.
    SetPortA { cpu: CpuId, bit: u8, value: bool },
}

/// A polymorphic bus-attached entity with its own internal state
/// (registers, counters, FIFOs). Mirrors the teacher's `Device` trait
/// (`update`/`read`/`write`) generalized to spec.md §3's fuller
/// capability set (reset/exec/get/put/save/load) and to fallible
/// access (teacher devices can't fail; Hikaru ones can, e.g. an IDMA
/// entry with an out-of-range slot).
pub trait Device {
    /// Human-readable device name, used in bus-error and log context.
    fn name(&self) -> &'static str;

    fn reset(&mut self, kind: ResetKind);

    /// Advance the device by up to `cycles` units of work, returning
    /// the number actually consumed (devices with nothing to do may
    /// consume 0) and any IRQ intents raised along the way.
    fn exec(&mut self, cycles: u32) -> (u32, Vec<IrqIntent>);

    fn get(&mut self, size: u8, addr: u32) -> Result<(u64, Vec<IrqIntent>), BusError>;

    fn put(&mut self, size: u8, addr: u32, value: u64) -> Result<Vec<IrqIntent>, BusError>;

    /// Appends this device's state to a savestate payload in
    /// registration order (spec.md §3 Savestate container).
    fn save_state(&self, out: &mut Vec<u8>);

    /// Reads this device's state back from a savestate payload cursor.
    fn load_state(&mut self, cursor: &mut &[u8]) -> Result<(), crate::error::StateError>;
}

pub(crate) fn le_bytes(value: u64, size: u8) -> Vec<u8> {
    value.to_le_bytes()[..size as usize].to_vec()
}

pub(crate) fn take_le(cursor: &mut &[u8], n: usize) -> Result<Vec<u8>, crate::error::StateError> {
    if cursor.len() < n {
        return Err(crate::error::StateError::Truncated { expected: n, got: cursor.len() });
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head.to_vec())
}

pub(crate) fn take_u32(cursor: &mut &[u8]) -> Result<u32, crate::error::StateError> {
    let bytes = take_le(cursor, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}
