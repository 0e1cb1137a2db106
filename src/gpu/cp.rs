//! GPU command processor fetch/dispatch loop (spec.md §4.4). Drives
//! the 512-entry opcode table built in `opcodes`, the mesh-region
//! boundary bookkeeping, and the subroutine call stack backed by
//! CMDRAM.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::error::GpuError;
use crate::gpu::objects::{LightSet, Material, ModelviewStack, ObjectBank, TexHead, Viewport};
use crate::gpu::objects::{Light, LodState};
use crate::gpu::opcodes::{self, CpDispatchTable};
use crate::gpu::vertex::{Vertex, VertexMask, VertexWindow};
use crate::renderer::Renderer;

/// The two buffers a CP program counter can address (spec.md §4.4
/// "Fetch"): upper byte 0x40/0x41 selects slave RAM, 0x48/0x4C selects
/// CMDRAM.
pub struct GpuMemory {
    pub cmdram: Rc<RefCell<Buffer>>,
    pub slave_ram: Rc<RefCell<Buffer>>,
}

impl GpuMemory {
    fn read_word(&self, addr: u32) -> Result<u32, GpuError> {
        let upper = (addr >> 24) as u8;
        let offset = (addr & 0x00FF_FFFF) as usize;
        match upper {
            0x40 | 0x41 => Ok(self.slave_ram.borrow().get(4, offset) as u32),
            0x48 | 0x4C => Ok(self.cmdram.borrow().get(4, offset) as u32),
            _ => Err(GpuError::UnknownMemory { pc: addr }),
        }
    }

    fn cmdram_read_word(&self, addr: u32) -> u32 {
        self.cmdram.borrow().get(4, (addr & 0x03FF_FFFF) as usize) as u32
    }

    fn cmdram_write_word(&self, addr: u32, value: u32) {
        self.cmdram.borrow_mut().put(4, (addr & 0x03FF_FFFF) as usize, value as u64);
    }
}

pub struct CommandProcessor {
    pub pc: u32,
    pub sp: [u32; 2],
    pub is_running: bool,
    pub done_pending: bool,

    pub viewport: ObjectBank<Viewport, 8>,
    pub material: ObjectBank<Material, 16384>,
    pub texhead: ObjectBank<TexHead, 16384>,
    pub light: ObjectBank<Light, 1024>,
    pub lightset: ObjectBank<LightSet, 256>,
    pub modelview: ModelviewStack,
    pub lod: LodState,
    pub lod_cond: bool,
    pub lod_probe: [f32; 3],

    pub ambient_color: [u8; 3],
    pub clear_color: [u8; 3],
    /// Alpha thresholds[64]: lo/hi 8-bit pair per entry (spec.md §3).
    pub alpha_thresholds: [(u8, u8); 64],
    /// Light ramp table[4][32]: 16-bit value pairs (spec.md §3).
    pub light_ramp: [[(u16, u16); 32]; 4],
    pub fb_blend_raw: [u32; 2],
    pub static_mesh_precision: f32,

    in_mesh: bool,
    pub vertex_window: VertexWindow,

    dispatch: Rc<CpDispatchTable>,
}

impl CommandProcessor {
    pub fn new(dispatch: Rc<CpDispatchTable>) -> Self {
        CommandProcessor {
            pc: 0,
            sp: [0, 0],
            is_running: false,
            done_pending: false,
            viewport: ObjectBank::new("viewport"),
            material: ObjectBank::new("material"),
            texhead: ObjectBank::new("texhead"),
            light: ObjectBank::new("light"),
            lightset: ObjectBank::new("lightset"),
            modelview: ModelviewStack::new(),
            lod: LodState::default(),
            lod_cond: false,
            lod_probe: [0.0; 3],
            ambient_color: [0; 3],
            clear_color: [0; 3],
            alpha_thresholds: [(0, 0); 64],
            light_ramp: [[(0, 0); 32]; 4],
            fb_blend_raw: [0; 2],
            static_mesh_precision: 4096.0,
            in_mesh: false,
            vertex_window: VertexWindow::new(),
            dispatch,
        }
    }

    pub fn default_dispatch() -> Rc<CpDispatchTable> {
        Rc::new(opcodes::build_table())
    }

    /// Write of value 3 to GPU register 0x58 arms execution; the
    /// actual start happens at the next vblank-in boundary (spec.md
    /// §4.4 "Start condition") — the machine calls `arm` then `start`.
    pub fn start(&mut self, pc: u32, sp0: u32, sp1: u32) {
        self.pc = pc;
        self.sp = [sp0, sp1];
        self.is_running = true;
        self.done_pending = false;
        self.in_mesh = false;
        self.vertex_window.reset();
    }

    pub fn jump_to(&mut self, target: u32) -> Result<(), GpuError> {
        if target == self.pc {
            self.is_running = false;
            return Err(GpuError::SelfJump { pc: self.pc });
        }
        self.pc = target;
        Ok(())
    }

    pub fn call(&mut self, target: u32, mem: &GpuMemory) -> Result<(), GpuError> {
        let sp_addr = (self.sp[0] & 0x03FF_FFFF) | 0x4800_0000;
        mem.cmdram_write_word(sp_addr, self.pc);
        self.sp[0] = self.sp[0].wrapping_sub(4);
        self.jump_to(target)
    }

    pub fn ret(&mut self, mem: &GpuMemory) -> Result<(), GpuError> {
        self.sp[0] = self.sp[0].wrapping_add(4);
        let sp_addr = (self.sp[0] & 0x03FF_FFFF) | 0x4800_0000;
        let stored = mem.cmdram_read_word(sp_addr);
        self.pc = stored.wrapping_add(8);
        Ok(())
    }

    pub fn advance_past(&mut self, instruction_bytes: u32) {
        self.pc = self.pc.wrapping_add(instruction_bytes);
    }

    /// Pushes a vertex into the assembly window; when its tricap field
    /// is 7 the three most-recent window vertices finalize a triangle
    /// that is forwarded to the renderer instead of the lone vertex
    /// (spec.md §4.4/§9).
    pub fn push_vertex(&mut self, v: Vertex, mask: VertexMask, renderer: &mut dyn Renderer) {
        self.vertex_window.push_with_pivot(v, v.ppivot);
        if v.tricap == 7 {
            if let Some(tri) = self.vertex_window.finalize_triangle(v.winding) {
                renderer.push_vertex(&tri, mask);
                return;
            }
        }
        renderer.push_vertex(&[v], mask);
    }

    /// Executes a single CP instruction: fetch, decode the opcode and
    /// size, apply mesh-region boundary transitions, dispatch, and
    /// advance PC unless the handler owns PC (spec.md §4.4).
    pub fn step(&mut self, mem: &GpuMemory, renderer: &mut dyn Renderer) -> Result<(), GpuError> {
        if !self.is_running {
            return Ok(());
        }
        let first_word = mem.read_word(self.pc)?;
        let opcode = (first_word & 0x1FF) as u16;
        let size_log = 2 + ((first_word >> 4) & 0x3);
        let size_bytes = 1u32 << size_log;
        let dword_count = (size_bytes / 4) as usize;

        let entry = match self.dispatch.lookup(opcode) {
            Some(e) => e,
            None => {
                self.is_running = false;
                self.done_pending = true;
                return Err(GpuError::UnknownOpcode { opcode, pc: self.pc });
            }
        };

        let mut words = Vec::with_capacity(dword_count);
        for i in 0..dword_count {
            words.push(mem.read_word(self.pc.wrapping_add((i * 4) as u32))?);
        }

        let has_begin = entry.flags.contains(opcodes::CpFlags::BEGIN);
        let has_continue = entry.flags.contains(opcodes::CpFlags::CONTINUE);
        if has_begin && !self.in_mesh {
            renderer.begin_mesh(self.pc, entry.flags.contains(opcodes::CpFlags::STATIC));
            self.in_mesh = true;
        } else if !has_continue && self.in_mesh {
            renderer.end_mesh(self.pc);
            self.in_mesh = false;
        }

        let is_jump = entry.flags.contains(opcodes::CpFlags::JUMP);
        let result = (entry.handler)(self, &words, mem, renderer);
        if !is_jump {
            self.advance_past(size_bytes);
        }
        if let Err(e) = &result {
            log::warn!("GPU CP error at pc={:#010x}: {e}", self.pc);
            self.is_running = false;
            self.done_pending = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{NullRenderer, RecordedEvent, RecordingRenderer};

    fn memory() -> GpuMemory {
        GpuMemory {
            cmdram: Rc::new(RefCell::new(Buffer::new(0x10000))),
            slave_ram: Rc::new(RefCell::new(Buffer::new(0x10000))),
        }
    }

    #[test]
    fn self_jump_halts_the_cp() {
        let mem = memory();
        // opcode 000 with target == pc; bits 4-5 = 1 -> size_log=3 (8
        // bytes, 2 dwords) so the jump target word is present.
        mem.cmdram.borrow_mut().put(4, 0x000, 0x010);
        mem.cmdram.borrow_mut().put(4, 0x004, 0x4800_0000);
        let mut cp = CommandProcessor::new(CommandProcessor::default_dispatch());
        cp.start(0x4800_0000, 0, 0);
        let mut r = NullRenderer;
        let result = cp.step(&mem, &mut r);
        assert!(result.is_err());
        assert!(!cp.is_running);
    }

    #[test]
    fn recall_without_set_logs_and_leaves_scratch_unchanged() {
        let mem = memory();
        // opcode 003, sub=0 (recall), index 3 in bits 16+
        let word = 0x003 | (3 << 16);
        mem.cmdram.borrow_mut().put(4, 0, word as u64);
        let mut cp = CommandProcessor::new(CommandProcessor::default_dispatch());
        cp.start(0x4800_0000, 0, 0);
        let before = cp.viewport.scratch();
        let mut r = NullRenderer;
        cp.step(&mem, &mut r).unwrap();
        assert_eq!(cp.viewport.scratch(), before);
    }

    #[test]
    fn mesh_boundary_emits_begin_and_end_exactly_once() {
        let mem = memory();
        // 1AC dynamic position (BEGIN|CONTINUE); op_1ac reads words[1..4]
        // (position xyz), so this instruction needs size_log=4 (16 bytes,
        // 4 dwords): bits = size_log - 2 = 2.
        let opcode = 0x1AC;
        let bits = 2u32;
        let word0 = opcode as u32 | (bits << 4);
        mem.cmdram.borrow_mut().put(4, 0, word0 as u64);
        mem.cmdram.borrow_mut().put(4, 4, f32::to_bits(1.0) as u64);
        mem.cmdram.borrow_mut().put(4, 8, f32::to_bits(2.0) as u64);
        mem.cmdram.borrow_mut().put(4, 12, f32::to_bits(3.0) as u64);
        // next instruction: 1C2 kill, not BEGIN/CONTINUE -> should emit end_mesh
        let kill_pc = 16u32;
        mem.cmdram.borrow_mut().put(4, kill_pc as usize, 0x1C2);

        let mut cp = CommandProcessor::new(CommandProcessor::default_dispatch());
        cp.start(0x4800_0000, 0, 0);
        let mut r = RecordingRenderer::default();
        let _ = cp.step(&mem, &mut r);
        cp.is_running = true;
        let _ = cp.step(&mem, &mut r);
        assert!(r.events.iter().any(|e| matches!(e, RecordedEvent::BeginMesh { .. })));
        assert!(r.events.iter().any(|e| matches!(e, RecordedEvent::EndMesh { .. })));
    }
}
