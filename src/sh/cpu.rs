//! SH register file and control state (spec.md §3 CPU state).
//!
//! Grounded on the teacher's `processor::CPU` (register file behind
//! `RegPtr`, `nxt`/`prev`/`jmp` bookkeeping for the debugger, an `irq`
//! queue) but widened to the SH register set, bank-swap semantics, and
//! the delay-slot `in_slot` flag spec.md §3(d)/§4.3 require. The
//! teacher keeps registers behind `Rc<RefCell<u32>>` because 68k
//! addressing modes need a register *handle* shareable with
//! `MemoryHandle`; SH addressing is simpler (register-direct or
//! register-indirect only), so registers are plain fields here.

use crate::bus::Mmap;
use crate::device::IrqIntent;
use crate::error::CpuError;
use crate::sh::decode::DecodeTable;
use crate::sh::irq::IrqTable;

/// SH-2 (one board revision) vs. SH-4 (Hikaru's main CPUs) — SH-2
/// leaves the FPU, register banks, and store queues unused and aborts
/// on SH-4-only opcodes (spec.md §3 invariant (a)).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CpuVariant {
    Sh2,
    Sh4,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CpuState {
    Run,
    Sleep,
    Standby,
    Stop,
}

/// The SH status register. Individual bits are exposed as typed
/// accessors (SPEC_FULL.md §B.1) rather than raw mask arithmetic
/// scattered through `ops`/`fpu`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StatusRegister(pub u32);

impl StatusRegister {
    const T: u32 = 1 << 0;
    const S: u32 = 1 << 1;
    const Q: u32 = 1 << 8;
    const M: u32 = 1 << 9;
    const I_SHIFT: u32 = 4;
    const I_MASK: u32 = 0xF << Self::I_SHIFT;
    const FD: u32 = 1 << 15;
    const BL: u32 = 1 << 28;
    const RB: u32 = 1 << 29;
    const MD: u32 = 1 << 30;

    const SH2_MASK: u32 = 0x3F3;
    const SH4_MASK: u32 = 0x700083F3;

    pub fn t(self) -> bool {
        self.0 & Self::T != 0
    }
    pub fn set_t(&mut self, v: bool) {
        self.set_bit(Self::T, v)
    }
    pub fn s(self) -> bool {
        self.0 & Self::S != 0
    }
    pub fn set_s(&mut self, v: bool) {
        self.set_bit(Self::S, v)
    }
    pub fn q(self) -> bool {
        self.0 & Self::Q != 0
    }
    pub fn set_q(&mut self, v: bool) {
        self.set_bit(Self::Q, v)
    }
    pub fn m(self) -> bool {
        self.0 & Self::M != 0
    }
    pub fn set_m(&mut self, v: bool) {
        self.set_bit(Self::M, v)
    }
    pub fn i(self) -> u32 {
        (self.0 & Self::I_MASK) >> Self::I_SHIFT
    }
    pub fn set_i(&mut self, level: u32) {
        self.0 = (self.0 & !Self::I_MASK) | ((level << Self::I_SHIFT) & Self::I_MASK);
    }
    pub fn fd(self) -> bool {
        self.0 & Self::FD != 0
    }
    pub fn bl(self) -> bool {
        self.0 & Self::BL != 0
    }
    pub fn set_bl(&mut self, v: bool) {
        self.set_bit(Self::BL, v)
    }
    pub fn rb(self) -> bool {
        self.0 & Self::RB != 0
    }
    pub fn set_rb(&mut self, v: bool) {
        self.set_bit(Self::RB, v)
    }
    pub fn md(self) -> bool {
        self.0 & Self::MD != 0
    }
    pub fn set_md(&mut self, v: bool) {
        self.set_bit(Self::MD, v)
    }

    fn set_bit(&mut self, bit: u32, v: bool) {
        if v {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    /// Applies the write mask for the given variant (spec.md §4.3 "SR
    /// write semantics"). Returns the previous value so the caller can
    /// detect RB/I/BL transitions that require a register-bank swap or
    /// a pending-IRQ recompute.
    pub fn write_masked(&mut self, raw: u32, variant: CpuVariant) -> StatusRegister {
        let prev = *self;
        let mask = match variant {
            CpuVariant::Sh2 => Self::SH2_MASK,
            CpuVariant::Sh4 => Self::SH4_MASK,
        };
        self.0 = raw & mask;
        prev
    }
}

/// The SH-4 FPU control/status register (spec.md §3 FPSCR).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Fpscr(pub u32);

impl Fpscr {
    const RM: u32 = 0x3;
    const DN: u32 = 1 << 18;
    const PR: u32 = 1 << 19;
    const SZ: u32 = 1 << 20;
    const FR: u32 = 1 << 21;
    const WRITE_MASK: u32 = 0x003F_FFFF;

    pub fn rm(self) -> u32 {
        self.0 & Self::RM
    }
    pub fn dn(self) -> bool {
        self.0 & Self::DN != 0
    }
    pub fn pr(self) -> bool {
        self.0 & Self::PR != 0
    }
    pub fn sz(self) -> bool {
        self.0 & Self::SZ != 0
    }
    pub fn fr(self) -> bool {
        self.0 & Self::FR != 0
    }

    /// Masks the raw write and returns the previous value; callers
    /// swap FR/XF banks when `fr()` differs and must treat SZ&PR both
    /// set as an invariant violation (spec.md §4.3).
    pub fn write_masked(&mut self, raw: u32) -> Fpscr {
        let prev = *self;
        self.0 = raw & Self::WRITE_MASK;
        prev
    }
}

pub struct Cpu {
    pub variant: CpuVariant,
    pub is_master: bool,
    pub name: &'static str,

    pub r: [u32; 16],
    pub rbank: [u32; 8],
    pub pc: u32,
    pub pr: u32,
    pub gbr: u32,
    pub vbr: u32,
    pub spc: u32,
    pub ssr: u32,
    pub sgr: u32,
    pub dbr: u32,
    pub mac: u64,
    pub sr: StatusRegister,
    pub fpscr: Fpscr,
    pub fr: [u32; 16],
    pub xf: [u32; 16],
    pub fpul: u32,

    pub in_slot: bool,
    pub branch_taken: bool,
    pub irq: IrqTable,
    pub cycles_remaining: i64,
    pub state: CpuState,

    pub decode: std::rc::Rc<DecodeTable>,
}

impl Cpu {
    pub fn new(name: &'static str, variant: CpuVariant, is_master: bool, decode: std::rc::Rc<DecodeTable>) -> Self {
        Cpu {
            variant,
            is_master,
            name,
            r: [0; 16],
            rbank: [0; 8],
            pc: 0,
            pr: 0,
            gbr: 0,
            vbr: 0,
            spc: 0,
            ssr: 0,
            sgr: 0,
            dbr: 0,
            mac: 0,
            sr: StatusRegister(0x7000_00F0),
            fpscr: Fpscr(0x0004_0001),
            fr: [0; 16],
            xf: [0; 16],
            fpul: 0,
            in_slot: false,
            branch_taken: false,
            irq: IrqTable::new(),
            cycles_remaining: 0,
            state: CpuState::Run,
            decode,
        }
    }

    pub fn mach(&self) -> u32 {
        (self.mac >> 32) as u32
    }
    pub fn macl(&self) -> u32 {
        self.mac as u32
    }
    pub fn set_mach(&mut self, v: u32) {
        self.mac = ((v as u64) << 32) | self.macl() as u64;
    }
    pub fn set_macl(&mut self, v: u32) {
        self.mac = ((self.mach() as u64) << 32) | v as u64;
    }

    /// Applies a masked SR write, swapping register banks / recomputing
    /// the pending-IRQ cache on the transitions spec.md §4.3 names.
    pub fn write_sr(&mut self, raw: u32) {
        let prev = self.sr.write_masked(raw, self.variant);
        if self.variant == CpuVariant::Sh4 && prev.rb() != self.sr.rb() {
            for i in 0..8 {
                std::mem::swap(&mut self.r[i], &mut self.rbank[i]);
            }
        }
        if prev.i() != self.sr.i() || prev.bl() != self.sr.bl() {
            self.irq.recompute_pending(self.sr.i(), self.sr.bl());
        }
    }

    pub fn write_fpscr(&mut self, raw: u32) {
        let prev = self.fpscr.write_masked(raw);
        if prev.fr() != self.fpscr.fr() {
            for i in 0..16 {
                std::mem::swap(&mut self.fr[i], &mut self.xf[i]);
            }
        }
        debug_assert!(
            !(self.fpscr.sz() && self.fpscr.pr()),
            "FPSCR.SZ and FPSCR.PR must not both be set"
        );
    }

    /// Runs `process_irqs` (spec.md §4.3), then fetches, dispatches,
    /// and executes exactly one instruction, advancing PC unless a
    /// control-flow handler already did. Returns IRQ intents collected
    /// from any MMIO touched while executing.
    pub fn step(&mut self, bus: &mut Mmap) -> Result<Vec<IrqIntent>, CpuError> {
        let mut intents = self.process_irqs(bus)?;
        if self.state != CpuState::Run {
            return Ok(intents);
        }
        let opcode = self.fetch(bus)?;
        self.pc = self.pc.wrapping_add(2);
        self.branch_taken = false;
        let handler = self.decode.lookup(opcode);
        match handler {
            Some(entry) => {
                let mut step_intents = (entry.handler)(self, opcode, bus)?;
                intents.append(&mut step_intents);
            }
            None => {
                return Err(CpuError::InvalidInstruction { opcode, pc: self.pc.wrapping_sub(2) });
            }
        }
        self.cycles_remaining -= 1;
        Ok(intents)
    }

    pub fn fetch(&self, bus: &mut Mmap) -> Result<u16, CpuError> {
        let (value, _) = bus.get(2, self.pc)?;
        Ok(value as u16)
    }

    /// Executes exactly one instruction immediately after a branch,
    /// with `in_slot` set, per spec.md §4.3 delay-slot semantics.
    /// Asserts (as the source does) that the slot instruction is not
    /// itself a control-transfer.
    pub fn execute_delay_slot(&mut self, bus: &mut Mmap) -> Result<Vec<IrqIntent>, CpuError> {
        let slot_pc = self.pc;
        let opcode = self.fetch(bus)?;
        self.pc = self.pc.wrapping_add(2);
        let entry = self
            .decode
            .lookup(opcode)
            .ok_or(CpuError::InvalidInstruction { opcode, pc: slot_pc })?;
        if entry.is_branch {
            return Err(CpuError::BranchInDelaySlot { pc: slot_pc });
        }
        self.in_slot = true;
        let saved_branch_taken = self.branch_taken;
        self.branch_taken = false;
        let result = (entry.handler)(self, opcode, bus);
        self.branch_taken = saved_branch_taken;
        self.in_slot = false;
        result
    }

    fn process_irqs(&mut self, _bus: &mut Mmap) -> Result<Vec<IrqIntent>, CpuError> {
        if !self.irq.pending {
            return Ok(Vec::new());
        }
        if let Some((level, vector)) = self.irq.take_highest(self.sr.i(), self.sr.bl()) {
            self.spc = self.pc;
            self.ssr = self.sr.0;
            self.sgr = self.r[15];
            self.pc = self.vbr.wrapping_add(vector);
            self.sr.set_bl(true);
            self.sr.set_md(true);
            if self.variant == CpuVariant::Sh4 {
                self.sr.set_rb(true);
            }
            self.state = CpuState::Run;
            log::debug!("{} IRQ level {} taken, vector {:#x}, new pc {:#010x}", self.name, level, vector, self.pc);
        }
        Ok(Vec::new())
    }
}
