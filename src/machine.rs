//! Scanline-interleaved scheduler and frame loop (spec.md §4.8, §5).
//!
//! Grounded on the teacher's `Emulator::run` cooperative loop
//! (`clock_cycle` + `serve_interrupt_requests` called in a fixed
//! order every iteration), generalized from single-CPU clock-cycle
//! stepping to the fixed per-line round-robin order spec.md §5
//! requires (master CPU, slave CPU, memory controller DMA, GPU) and
//! to the cyclic-ownership design spec.md §9 calls out: devices never
//! hold a reference back to the machine; they return `IrqIntent`s that
//! `Machine::apply_intents` drains and applies centrally.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::bus::{Mmap, Perm, Region};
use crate::device::{CpuId, Device, IrqIntent};
use crate::error::{CoreError, StateError};
use crate::fbdma::FbDma;
use crate::gpu::cp::{CommandProcessor, GpuMemory};
use crate::idma::Idma;
use crate::interrupts::InterruptFabric;
use crate::memctl::{ApertureWindow, BankConfig, MemoryController};
use crate::renderer::{LayerDescriptor, Renderer};
use crate::sh::cpu::{Cpu, CpuState, CpuVariant};
use crate::sh::decode::DecodeTable;
use crate::sh::{fpu, ops};

const SCANLINES_VISIBLE: u32 = 480;
const SCANLINES_VBLANK: u32 = 64;
const FRAME_CLOCK_HZ: u64 = 200_000_000;
const FRAME_RATE_HZ: u64 = 60;

/// Minimal control-register block for the GPU's start/status registers
/// (spec.md §4.4 "Start condition"): reg 0x58 arms execution, 0x70/74/78
/// hold the PC/SP0/SP1 the CP starts from, 0x88 mirrors CP done state.
struct GpuRegs {
    words: [u32; 64],
}

impl GpuRegs {
    fn new() -> Self {
        GpuRegs { words: [0; 64] }
    }
    fn idx(addr: u32) -> usize {
        ((addr & 0xFF) / 4) as usize
    }
}

impl Device for GpuRegs {
    fn name(&self) -> &'static str {
        "gpu-regs"
    }
    fn reset(&mut self, _kind: crate::device::ResetKind) {
        self.words = [0; 64];
    }
    fn exec(&mut self, _cycles: u32) -> (u32, Vec<IrqIntent>) {
        (0, Vec::new())
    }
    fn get(&mut self, size: u8, addr: u32) -> Result<(u64, Vec<IrqIntent>), crate::error::BusError> {
        if size != 4 {
            return Err(crate::error::BusError::UnsupportedSize { cpu: "gpu-regs", addr, size });
        }
        Ok((self.words[Self::idx(addr)] as u64, Vec::new()))
    }
    fn put(&mut self, size: u8, addr: u32, value: u64) -> Result<Vec<IrqIntent>, crate::error::BusError> {
        if size != 4 {
            return Err(crate::error::BusError::UnsupportedSize { cpu: "gpu-regs", addr, size });
        }
        self.words[Self::idx(addr)] = value as u32;
        Ok(Vec::new())
    }
    fn save_state(&self, out: &mut Vec<u8>) {
        for w in self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }
    fn load_state(&mut self, cursor: &mut &[u8]) -> Result<(), StateError> {
        for w in self.words.iter_mut() {
            *w = crate::device::take_u32(cursor)?;
        }
        Ok(())
    }
}

const GPU_REG_START: u32 = 0x58;
const GPU_REG_PC: u32 = 0x70;
const GPU_REG_SP0: u32 = 0x74;
const GPU_REG_SP1: u32 = 0x78;
const GPU_REG_MASK: u32 = 0x84;
const GPU_REG_STATUS: u32 = 0x88;
const GPU_STATUS_DONE_BIT: u32 = 1;

/// Every buffer and device the savestate container walks, in the
/// fixed registration order spec.md §6 requires (buffers first, then
/// devices, each in construction order).
pub struct Machine {
    pub master_ram: Rc<RefCell<Buffer>>,
    pub slave_ram: Rc<RefCell<Buffer>>,
    pub cmdram: Rc<RefCell<Buffer>>,
    pub texram: Rc<RefCell<Buffer>>,
    pub fb: Rc<RefCell<Buffer>>,
    pub eprom: Rc<RefCell<Buffer>>,
    pub maskrom: Rc<RefCell<Buffer>>,
    pub eeprom: Rc<RefCell<Buffer>>,

    memctl_master: Rc<RefCell<MemoryController>>,
    memctl_slave: Rc<RefCell<MemoryController>>,
    gpu_regs: Rc<RefCell<GpuRegs>>,
    idma: Rc<RefCell<Idma>>,
    fbdma: Rc<RefCell<FbDma>>,
    interrupts: Rc<RefCell<InterruptFabric>>,
    aperture_master: Rc<RefCell<ApertureWindow>>,
    aperture_slave: Rc<RefCell<ApertureWindow>>,

    pub master: Cpu,
    pub slave: Cpu,
    pub master_mmap: Mmap,
    pub slave_mmap: Mmap,

    pub gpu: CommandProcessor,
    gpu_mem: GpuMemory,

    pub layers: [LayerDescriptor; 8],
    line: u32,
    cycles_per_line: u32,
    pending_intents: Vec<IrqIntent>,
}

fn sh4_decode_table() -> Rc<DecodeTable> {
    Rc::new(DecodeTable::build(&[
        ops::SH2_OPS,
        ops::SH4_ONLY_OPS,
        fpu::SH4_FPU_OPS,
    ]))
}

impl Machine {
    pub fn new(banks: BankConfig) -> Self {
        let master_ram = Rc::new(RefCell::new(Buffer::new(0x0200_0000)));
        let slave_ram = Rc::new(RefCell::new(Buffer::new(0x0040_0000)));
        let cmdram = Rc::new(RefCell::new(Buffer::new(0x0040_0000)));
        let texram = Rc::new(RefCell::new(Buffer::new(2048 * 2048 * 2)));
        let fb = Rc::new(RefCell::new(Buffer::new(2048 * 2048 * 2)));
        let eprom = Rc::new(RefCell::new(Buffer::new(0x0020_0000)));
        let maskrom = Rc::new(RefCell::new(Buffer::new(0x0020_0000)));
        let eeprom = Rc::new(RefCell::new(Buffer::new(0x0000_0100)));

        let memctl_master = Rc::new(RefCell::new(MemoryController::new(CpuId::Master, banks)));
        let memctl_slave = Rc::new(RefCell::new(MemoryController::new(CpuId::Slave, banks)));
        let gpu_regs = Rc::new(RefCell::new(GpuRegs::new()));
        let idma = Rc::new(RefCell::new(Idma::new(cmdram.clone(), slave_ram.clone(), texram.clone())));
        let fbdma = Rc::new(RefCell::new(FbDma::new(fb.clone())));
        let interrupts = Rc::new(RefCell::new(InterruptFabric::new()));
        let aperture_master = Rc::new(RefCell::new(ApertureWindow::new(
            memctl_master.clone(),
            slave_ram.clone(),
            cmdram.clone(),
            eprom.clone(),
            maskrom.clone(),
            eeprom.clone(),
        )));
        let aperture_slave = Rc::new(RefCell::new(ApertureWindow::new(
            memctl_slave.clone(),
            slave_ram.clone(),
            cmdram.clone(),
            eprom.clone(),
            maskrom.clone(),
            eeprom.clone(),
        )));

        let decode = sh4_decode_table();
        let master = Cpu::new("master", CpuVariant::Sh4, true, decode.clone());
        let slave = Cpu::new("slave", CpuVariant::Sh4, false, decode);

        let master_mmap = Self::build_mmap(
            CpuId::Master,
            master_ram.clone(),
            eprom.clone(),
            aperture_master.clone(),
            memctl_master.clone(),
            gpu_regs.clone(),
            idma.clone(),
            fbdma.clone(),
            interrupts.clone(),
        );
        let slave_mmap = Self::build_mmap(
            CpuId::Slave,
            master_ram.clone(),
            eprom.clone(),
            aperture_slave.clone(),
            memctl_slave.clone(),
            gpu_regs.clone(),
            idma.clone(),
            fbdma.clone(),
            interrupts.clone(),
        );

        let gpu_mem = GpuMemory { cmdram: cmdram.clone(), slave_ram: slave_ram.clone() };
        let gpu = CommandProcessor::new(CommandProcessor::default_dispatch());

        let cycles_per_line = (FRAME_CLOCK_HZ / FRAME_RATE_HZ / (SCANLINES_VISIBLE + SCANLINES_VBLANK) as u64) as u32;

        Machine {
            master_ram,
            slave_ram,
            cmdram,
            texram,
            fb,
            eprom,
            maskrom,
            eeprom,
            memctl_master,
            memctl_slave,
            gpu_regs,
            idma,
            fbdma,
            interrupts,
            aperture_master,
            aperture_slave,
            master,
            slave,
            master_mmap,
            slave_mmap,
            gpu,
            gpu_mem,
            layers: [LayerDescriptor::default(); 8],
            line: 0,
            cycles_per_line,
            pending_intents: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_mmap(
        cpu: CpuId,
        master_ram: Rc<RefCell<Buffer>>,
        eprom: Rc<RefCell<Buffer>>,
        aperture: Rc<RefCell<ApertureWindow>>,
        memctl: Rc<RefCell<MemoryController>>,
        gpu_regs: Rc<RefCell<GpuRegs>>,
        idma: Rc<RefCell<Idma>>,
        fbdma: Rc<RefCell<FbDma>>,
        interrupts: Rc<RefCell<InterruptFabric>>,
    ) -> Mmap {
        let mut mmap = Mmap::new(cpu);
        let rw = Perm::READ | Perm::WRITE;
        mmap.attach(Region::direct("eprom", 0x0000_0000, 0x001F_FFFF, 0x001F_FFFF, eprom, Perm::READ));
        mmap.attach(Region::direct("master-ram", 0x0C00_0000, 0x0DFF_FFFF, 0x01FF_FFFF, master_ram, rw));
        mmap.attach(Region::mmio("aperture", 0x0200_0000, 0x03FF_FFFF, aperture, rw));
        mmap.attach(Region::mmio("memctl-regs", 0x1400_0000, 0x1400_002F, memctl, rw));
        mmap.attach(Region::mmio("gpu-regs", 0x1500_0000, 0x1500_00FF, gpu_regs, rw));
        mmap.attach(Region::mmio("idma-regs", 0x1500_0100, 0x1500_017F, idma, rw));
        mmap.attach(Region::mmio("fbdma-regs", 0x1A00_0020, 0x1A00_002F, fbdma, rw));
        mmap.attach(Region::mmio("interrupts", 0x1A00_0000, 0x1A00_001B, interrupts, rw));
        mmap
    }

    /// Central scheduler hook (spec.md §9 cyclic-ownership design):
    /// drains intents a device/CPU step produced and applies them to
    /// whichever CPU or Port A bit they name.
    fn apply_intents(&mut self, intents: Vec<IrqIntent>) {
        for intent in intents {
            match intent {
                IrqIntent::SetIrqLine { cpu, level, raised, vector } => {
                    let target = match cpu {
                        CpuId::Master => &mut self.master,
                        CpuId::Slave => &mut self.slave,
                    };
                    if raised {
                        target.irq.raise(level as u32, vector);
                    } else {
                        target.irq.clear(level as u32);
                    }
                    target.irq.recompute_pending(target.sr.i(), target.sr.bl());
                }
                IrqIntent::SetPortA { cpu, bit, value } => {
                    log::debug!("{} port a bit {bit} set to {value}", cpu.label());
                }
            }
        }
    }

    fn step_cpu_line(&mut self, which: CpuId) {
        let (cpu, mmap) = match which {
            CpuId::Master => (&mut self.master, &mut self.master_mmap),
            CpuId::Slave => (&mut self.slave, &mut self.slave_mmap),
        };
        let mut remaining = self.cycles_per_line;
        while remaining > 0 && cpu.state == CpuState::Run {
            match cpu.step(mmap) {
                Ok(intents) => {
                    if !intents.is_empty() {
                        // Defer application until after the borrow on
                        // `cpu`/`mmap` ends (see below).
                        self.pending_intents.extend(intents);
                    }
                }
                Err(e) => {
                    log::warn!("{} halted: {e}", cpu.name);
                    cpu.state = CpuState::Stop;
                }
            }
            remaining -= 1;
        }
    }

    fn step_memctl_line(&mut self) {
        let (_, a) = Device::exec(&mut *self.memctl_master.borrow_mut(), self.cycles_per_line);
        let (_, b) = Device::exec(&mut *self.memctl_slave.borrow_mut(), self.cycles_per_line);
        let (_, c) = Device::exec(&mut *self.idma.borrow_mut(), self.cycles_per_line);
        let (_, d) = Device::exec(&mut *self.fbdma.borrow_mut(), self.cycles_per_line);
        self.pending_intents.extend(a);
        self.pending_intents.extend(b);
        self.pending_intents.extend(c);
        self.pending_intents.extend(d);
    }

    fn step_gpu_line(&mut self, renderer: &mut dyn Renderer) {
        if !self.gpu.is_running {
            return;
        }
        for _ in 0..self.cycles_per_line {
            if !self.gpu.is_running {
                break;
            }
            if let Err(e) = self.gpu.step(&self.gpu_mem, renderer) {
                log::warn!("GPU CP stopped: {e}");
                self.interrupts.borrow_mut().raise_source(1);
                let intents = self.interrupts.borrow_mut().recompute_and_raise();
                self.pending_intents.extend(intents);
                break;
            }
        }
        if self.gpu.done_pending {
            self.gpu.done_pending = false;
            let mut regs = self.gpu_regs.borrow_mut();
            regs.words[(GPU_REG_STATUS / 4) as usize] |= GPU_STATUS_DONE_BIT;
            let masked = regs.words[(GPU_REG_MASK / 4) as usize] & GPU_STATUS_DONE_BIT != 0;
            drop(regs);
            if !masked {
                self.interrupts.borrow_mut().raise_source(0);
                let intents = self.interrupts.borrow_mut().recompute_and_raise();
                self.pending_intents.extend(intents);
            }
        }
    }

    fn hblank_in(&mut self, line: u32) {
        log::trace!("hblank_in line={line}");
    }

    /// Clears CP scratch objects and checks GPU arming (spec.md §4.8,
    /// §4.4 "Start condition"): a write of 3 to GPU register 0x58 means
    /// the CP should (re)start from the PC/SP registers at the next
    /// vblank-in boundary.
    fn vblank_in(&mut self) {
        log::debug!("vblank_in");
        let regs = self.gpu_regs.borrow();
        let armed = regs.words[(GPU_REG_START / 4) as usize] & 0x3 == 0x3;
        if armed {
            let pc = regs.words[(GPU_REG_PC / 4) as usize];
            let sp0 = regs.words[(GPU_REG_SP0 / 4) as usize];
            let sp1 = regs.words[(GPU_REG_SP1 / 4) as usize];
            drop(regs);
            self.gpu.viewport = crate::gpu::objects::ObjectBank::new("viewport");
            self.gpu.material = crate::gpu::objects::ObjectBank::new("material");
            self.gpu.texhead = crate::gpu::objects::ObjectBank::new("texhead");
            self.gpu.light = crate::gpu::objects::ObjectBank::new("light");
            self.gpu.lightset = crate::gpu::objects::ObjectBank::new("lightset");
            self.gpu.start(pc, sp0, sp1);
        }
    }

    /// Raises the frame-done IRQ and fills layer descriptors for the
    /// renderer (spec.md §4.8).
    fn vblank_out(&mut self, renderer: &mut dyn Renderer) {
        log::debug!("vblank_out");
        self.interrupts.borrow_mut().raise_source(2);
        let intents = self.interrupts.borrow_mut().recompute_and_raise();
        self.pending_intents.extend(intents);
        for layer in self.layers.iter() {
            if layer.enabled {
                renderer.draw_layer(layer);
            }
        }
    }

    /// Runs exactly one frame: 480 visible scanlines, vblank-in, 64
    /// blanking scanlines, vblank-out (spec.md §4.8).
    pub fn run_frame(&mut self, renderer: &mut dyn Renderer) {
        renderer.begin_frame();
        for line in 0..SCANLINES_VISIBLE {
            self.run_one_line(line, renderer);
        }
        self.vblank_in();
        for line in SCANLINES_VISIBLE..(SCANLINES_VISIBLE + SCANLINES_VBLANK) {
            self.run_one_line(line, renderer);
        }
        self.vblank_out(renderer);
        renderer.end_frame();
    }

    fn run_one_line(&mut self, line: u32, renderer: &mut dyn Renderer) {
        self.line = line;
        self.hblank_in(line);
        self.pending_intents.clear();
        self.step_cpu_line(CpuId::Master);
        self.step_cpu_line(CpuId::Slave);
        self.step_memctl_line();
        self.step_gpu_line(renderer);
        let intents = std::mem::take(&mut self.pending_intents);
        self.apply_intents(intents);
    }

    pub fn reset(&mut self) {
        use crate::device::ResetKind;
        self.master.state = CpuState::Run;
        self.slave.state = CpuState::Run;
        self.master.pc = 0;
        self.slave.pc = 0;
        Device::reset(&mut *self.memctl_master.borrow_mut(), ResetKind::Hard);
        Device::reset(&mut *self.memctl_slave.borrow_mut(), ResetKind::Hard);
        Device::reset(&mut *self.idma.borrow_mut(), ResetKind::Hard);
        Device::reset(&mut *self.fbdma.borrow_mut(), ResetKind::Hard);
        Device::reset(&mut *self.interrupts.borrow_mut(), ResetKind::Hard);
        Device::reset(&mut *self.gpu_regs.borrow_mut(), ResetKind::Hard);
        self.gpu.is_running = false;
    }

    /// The ordered list of devices whose state a savestate walks
    /// (spec.md §6 "registered ... in the order they were registered
    /// at machine construction"), matching `Machine::new`'s
    /// construction order.
    pub fn devices(&self) -> Vec<Rc<RefCell<dyn Device>>> {
        vec![
            self.memctl_master.clone() as Rc<RefCell<dyn Device>>,
            self.memctl_slave.clone() as Rc<RefCell<dyn Device>>,
            self.gpu_regs.clone() as Rc<RefCell<dyn Device>>,
            self.idma.clone() as Rc<RefCell<dyn Device>>,
            self.fbdma.clone() as Rc<RefCell<dyn Device>>,
            self.interrupts.clone() as Rc<RefCell<dyn Device>>,
        ]
    }

    pub fn buffers(&self) -> Vec<Rc<RefCell<Buffer>>> {
        vec![
            self.master_ram.clone(),
            self.slave_ram.clone(),
            self.cmdram.clone(),
            self.texram.clone(),
            self.fb.clone(),
            self.eprom.clone(),
            self.maskrom.clone(),
            self.eeprom.clone(),
        ]
    }

    pub fn load_game_section(&self, name: &str, bytes: &[u8]) -> Result<(), CoreError> {
        let target = match name {
            "eprom" => &self.eprom,
            "maskrom" => &self.maskrom,
            "eeprom" => &self.eeprom,
            other => return Err(CoreError::MissingSection(other.to_string())),
        };
        let mut buf = target.borrow_mut();
        let slice = buf.as_mut_slice();
        let n = bytes.len().min(slice.len());
        slice[..n].copy_from_slice(&bytes[..n]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::NullRenderer;

    #[test]
    fn reset_puts_both_cpus_in_run_state_at_pc_zero() {
        let mut m = Machine::new(BankConfig::default());
        m.master.pc = 0x1000;
        m.master.state = CpuState::Stop;
        m.reset();
        assert_eq!(m.master.state, CpuState::Run);
        assert_eq!(m.master.pc, 0);
        assert_eq!(m.slave.state, CpuState::Run);
    }

    #[test]
    fn a_full_frame_runs_without_panicking_on_blank_rom() {
        let mut m = Machine::new(BankConfig::default());
        let mut r = NullRenderer;
        m.run_frame(&mut r);
        // blank EPROM decodes to an invalid opcode immediately, so both
        // CPUs are expected to halt after their first fetch.
        assert_eq!(m.master.state, CpuState::Stop);
        assert_eq!(m.slave.state, CpuState::Stop);
    }

    #[test]
    fn apply_intents_raises_the_targeted_cpu_irq_line() {
        let mut m = Machine::new(BankConfig::default());
        m.apply_intents(vec![IrqIntent::SetIrqLine {
            cpu: CpuId::Master,
            level: 2,
            raised: true,
            vector: 0x620,
        }]);
        assert!(m.master.irq.pending);
        assert!(!m.slave.irq.pending);
    }

    #[test]
    fn idma_completion_intent_reaches_master_irq_through_a_scanline() {
        let mut m = Machine::new(BankConfig::default());
        {
            let mut idma = m.idma.borrow_mut();
            let packed = (2u32 << 19) | (2 << 16) | (0x80 << 8) | 0xC0;
            m.cmdram.borrow_mut().put(4, 0, 0x4810_0000);
            m.cmdram.borrow_mut().put(4, 8, packed as u64);
            Device::put(&mut *idma, 4, 0x0C, 0).unwrap();
            Device::put(&mut *idma, 4, 0x10, 1).unwrap();
            Device::put(&mut *idma, 4, 0x14, 1).unwrap();
        }
        let mut r = NullRenderer;
        m.run_one_line(0, &mut r);
        assert!(m.master.irq.pending);
    }

    #[test]
    fn masking_the_interrupt_fabric_suppresses_the_idma_completion_irq() {
        let mut m = Machine::new(BankConfig::default());
        Device::put(&mut *m.interrupts.borrow_mut(), 4, 0x18, 0).unwrap();
        {
            let mut idma = m.idma.borrow_mut();
            let packed = (2u32 << 19) | (2 << 16) | (0x80 << 8) | 0xC0;
            m.cmdram.borrow_mut().put(4, 0, 0x4810_0000);
            m.cmdram.borrow_mut().put(4, 8, packed as u64);
            Device::put(&mut *idma, 4, 0x0C, 0).unwrap();
            Device::put(&mut *idma, 4, 0x10, 1).unwrap();
            Device::put(&mut *idma, 4, 0x14, 1).unwrap();
        }
        let mut r = NullRenderer;
        m.run_one_line(0, &mut r);
        assert!(!m.master.irq.pending);
    }

    #[test]
    fn devices_and_buffers_are_listed_in_construction_order() {
        let m = Machine::new(BankConfig::default());
        assert_eq!(m.devices().len(), 6);
        assert_eq!(m.buffers().len(), 8);
    }

    #[test]
    fn load_game_section_rejects_unknown_section_names() {
        let m = Machine::new(BankConfig::default());
        assert!(m.load_game_section("eprom", &[1, 2, 3]).is_ok());
        assert!(matches!(
            m.load_game_section("vram", &[1]),
            Err(CoreError::MissingSection(_))
        ));
    }
}
