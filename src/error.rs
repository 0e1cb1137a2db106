//! Typed error kinds for every fallible path named in the core (bus,
//! CPU, GPU, DMA engines, savestate). Fatal errors propagate up and
//! halt the owning component; non-fatal errors are logged by the
//! caller and the operation that raised them continues or is skipped.

use thiserror::Error;

/// A bus access failed while a CPU (or a device acting on its behalf)
/// tried to read or write an address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no region maps {cpu} address {addr:#010x} (size {size})")]
    NoRegion { cpu: &'static str, addr: u32, size: u8 },
    #[error("{cpu} permission denied at {addr:#010x} (size {size})")]
    PermissionDenied { cpu: &'static str, addr: u32, size: u8 },
    #[error("{cpu} unsupported access size {size} at {addr:#010x}")]
    UnsupportedSize { cpu: &'static str, addr: u32, size: u8 },
    #[error("{cpu} device at {addr:#010x} failed: {reason}")]
    DeviceFailed { cpu: &'static str, addr: u32, reason: String },
}

/// A CPU-level fault: bad decode, privilege violation, or a broken
/// control-flow invariant (delay slot misuse, misalignment).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CpuError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("invalid instruction {opcode:#06x} at pc={pc:#010x}")]
    InvalidInstruction { opcode: u16, pc: u32 },
    #[error("sh-4-only opcode {opcode:#06x} executed on sh-2 core at pc={pc:#010x}")]
    Sh4OnlyOnSh2 { opcode: u16, pc: u32 },
    #[error("privileged opcode {opcode:#06x} executed in user mode at pc={pc:#010x}")]
    PrivilegeViolation { opcode: u16, pc: u32 },
    #[error("fpu access with SR.FD=1 at pc={pc:#010x}")]
    FpuDisabled { pc: u32 },
    #[error("control-flow instruction issued from within a delay slot at pc={pc:#010x}")]
    BranchInDelaySlot { pc: u32 },
    #[error("unaligned jump target {target:#010x}")]
    UnalignedTarget { target: u32 },
    #[error("unaligned fpu register pair r{reg}")]
    UnalignedFpuPair { reg: u8 },
}

/// A fault inside the GPU command processor. Per spec.md §7 these stop
/// the CP (clearing `is_running`) and raise the DONE IRQ; they never
/// propagate to the CPUs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("bus error while fetching CP instruction: {0}")]
    Bus(#[from] BusError),
    #[error("CP program counter {pc:#010x} is not backed by CMDRAM or slave RAM")]
    UnknownMemory { pc: u32 },
    #[error("unknown CP opcode {opcode:#05x} at pc={pc:#010x}")]
    UnknownOpcode { opcode: u16, pc: u32 },
    #[error("self-jump detected: branch at {pc:#010x} targets itself")]
    SelfJump { pc: u32 },
    #[error("recalled {object} index {index} was never set")]
    RecallUnset { object: &'static str, index: u32 },
}

/// IDMA/FB-DMA faults. Per spec.md §7 these are logged and the engine
/// either skips the offending entry (IDMA) or advances its registers
/// without writing anything (DMA).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DmaError {
    #[error("idma entry out of bounds: slot=({slotx},{sloty}) dims=({w}x{h})")]
    IdmaOutOfBounds { slotx: u32, sloty: u32, w: u32, h: u32 },
    #[error("idma entry has malformed texhead word {word:#010x}")]
    IdmaMalformedTexhead { word: u32 },
    #[error("dma source area {addr:#010x} is not recognized")]
    UnknownSource { addr: u32 },
    #[error("dma destination area {addr:#010x} is not recognized")]
    UnknownDestination { addr: u32 },
}

/// Savestate I/O failure. The caller (machine) must perform a hard
/// reset when this is returned from a load.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("savestate header mismatch: expected {expected:?}, found {found:?}")]
    HeaderMismatch { expected: String, found: String },
    #[error("savestate payload truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("savestate io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        StateError::Io(e.to_string())
    }
}

/// Umbrella error returned by machine-level orchestration (loader,
/// CLI). Component-local errors (bus/GPU/DMA) are logged and contained
/// at their own boundary and do not normally escape to this type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Dma(#[from] DmaError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("unsupported game: {0}")]
    UnsupportedGame(String),
    #[error("missing rom section: {0}")]
    MissingSection(String),
}
