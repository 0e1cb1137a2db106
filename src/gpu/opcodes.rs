//! GPU command processor dispatch table (spec.md §4.4 "Dispatch").
//!
//! A 512-entry table keyed on the low 9 bits of the first instruction
//! word. Built once, the same way `sh::decode::DecodeTable` is built:
//! a flat descriptor list expanded into every matching slot, with
//! collisions fatal at build time (spec.md §9 "Global state... lift
//! into a per-CPU/per-component table built at construction").

use crate::gpu::cp::{CommandProcessor, GpuMemory};
use crate::error::GpuError;
use crate::renderer::Renderer;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CpFlags: u8 {
        /// PC is handler-managed; the CP does not auto-advance.
        const JUMP = 0b0001;
        /// Opens a mesh region if not already in one.
        const BEGIN = 0b0010;
        /// Continues the current mesh region (suppresses end_mesh).
        const CONTINUE = 0b0100;
        /// Uses the static (fixed-point) vertex format.
        const STATIC = 0b1000;
    }
}

pub type CpHandler =
    fn(&mut CommandProcessor, &[u32], &GpuMemory, &mut dyn Renderer) -> Result<(), GpuError>;

#[derive(Clone, Copy)]
pub struct CpOpDescriptor {
    pub name: &'static str,
    pub opcodes: (u16, u16),
    pub handler: CpHandler,
    pub flags: CpFlags,
}

#[derive(Clone, Copy)]
pub struct CpEntry {
    pub name: &'static str,
    pub handler: CpHandler,
    pub flags: CpFlags,
}

pub struct CpDispatchTable {
    entries: Vec<Option<CpEntry>>,
}

impl CpDispatchTable {
    pub fn build(descriptors: &[CpOpDescriptor]) -> Self {
        let mut entries: Vec<Option<CpEntry>> = vec![None; 512];
        for desc in descriptors {
            for opcode in desc.opcodes.0..=desc.opcodes.1 {
                let idx = opcode as usize;
                assert!(idx < 512, "CP opcode {opcode:#05x} out of range for '{}'", desc.name);
                if entries[idx].is_some() {
                    panic!("CP decode table collision: '{}' overlaps another opcode at slot {idx:#05x}", desc.name);
                }
                entries[idx] = Some(CpEntry {
                    name: desc.name,
                    handler: desc.handler,
                    flags: desc.flags,
                });
            }
        }
        CpDispatchTable { entries }
    }

    pub fn lookup(&self, opcode: u16) -> Option<CpEntry> {
        self.entries[opcode as usize]
    }
}

// ------------------------------------------------------------ handlers

use crate::gpu::objects::TexHead;
use crate::gpu::vertex::{Vertex, VertexMask};

fn ok() -> Result<(), GpuError> {
    Ok(())
}

fn unpack_rgb8(w: u32) -> [u8; 3] {
    [(w >> 16) as u8, (w >> 8) as u8, w as u8]
}
fn unpack_rgb10(w: u32) -> [u16; 3] {
    [((w >> 20) & 0x3FF) as u16, ((w >> 10) & 0x3FF) as u16, (w & 0x3FF) as u16]
}

/// 021: viewport depth clip(0)/xy clip+offset(2)/depth range+func(4)/
/// depth queue(6), selected by bits 2-3 of word[0].
fn op_021_viewport(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let sub = (words[0] >> 2) & 0x7;
    let vp = cp.viewport.scratch_mut();
    match sub {
        0 => {
            vp.depth_clip_near = f32::from_bits(words[1]);
            vp.depth_clip_far = f32::from_bits(words[2]);
        }
        2 => {
            vp.clip_x = (words[1] & 0xFFFF) as i16;
            vp.clip_y = (words[1] >> 16) as i16;
            vp.offset_x = (words[2] & 0xFFFF) as i16;
            vp.offset_y = (words[2] >> 16) as i16;
        }
        4 => {
            vp.depth_range_near = f32::from_bits(words[1]);
            vp.depth_range_far = f32::from_bits(words[2]);
            vp.depth_func = (words[0] >> 8) as u8;
        }
        6 => {
            vp.depth_queue_type = (words[0] >> 8) as u8;
            vp.depth_queue_enabled = (words[0] >> 16) & 1 != 0;
            vp.depth_queue_density = f32::from_bits(words[1]);
            vp.depth_queue_bias = f32::from_bits(words[2]);
        }
        _ => log::warn!("021 viewport sub-opcode {sub} unrecognized"),
    }
    ok()
}

fn op_011_ambient(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.ambient_color = unpack_rgb8(words[0]);
    ok()
}

fn op_191_clear_color(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.clear_color = unpack_rgb8(words[0]);
    ok()
}

/// Object-table indices live at bits 16+ of word0, masked to each
/// table's size (`hikaru-gpu-cp.c`'s `get_*_index` helpers), not bits
/// 8-15 masked to a flat 0xFF.
fn op_004_commit_viewport(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.viewport.commit((words[0] >> 16) as usize & 0x7);
    ok()
}

fn op_003_recall_viewport(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let sub = (words[0] >> 2) & 0x7;
    let index = (words[0] >> 16) as usize & 0x7;
    match sub {
        0 => {
            if let Err(e) = cp.viewport.recall(index) {
                log::warn!("{e}");
            }
        }
        2 => {
            if let Err(e) = cp.viewport.recall_push(index) {
                log::warn!("{e}");
            }
        }
        4 => cp.viewport.pop(),
        _ => log::warn!("003 recall sub-opcode {sub} unrecognized"),
    }
    ok()
}

/// 161: modelview row(1), LOD probe vector(5), light direction/
/// position(9; 961/B61 select direction vs. position per bits outside
/// the low 9).
fn op_161_modelview_light(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let sub = (words[0] >> 8) & 0xF;
    match sub {
        1 => {
            let row = (words[0] >> 16) & 0x3;
            cp.modelview.set_row(
                row as usize,
                [f32::from_bits(words[1]), f32::from_bits(words[2]), f32::from_bits(words[3]), f32::from_bits(words[4])],
            );
        }
        5 => {
            let v = [f32::from_bits(words[1]), f32::from_bits(words[2]), f32::from_bits(words[3])];
            cp.lod_probe = v;
        }
        9 => {
            let use_position = (words[0] >> 24) & 1 != 0;
            let v = [f32::from_bits(words[1]), f32::from_bits(words[2]), f32::from_bits(words[3])];
            let light = cp.light.scratch_mut();
            light.use_position = use_position;
            if use_position {
                light.position = v;
            } else {
                light.direction = v;
            }
        }
        // "561" in the reference decoder shares opcode 161's low 9
        // bits; this sub-field value is how it is told apart.
        0xD => return op_561_set_lod_value(cp, words, _mem, _r),
        _ => log::warn!("161 sub-opcode {sub} unrecognized"),
    }
    ok()
}

fn op_091_material_color(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let sub = (words[0] >> 2) & 0x7;
    let mat = cp.material.scratch_mut();
    match sub {
        0 => mat.color0 = unpack_rgb8(words[1]),
        2 => mat.color1 = unpack_rgb8(words[1]),
        4 => {
            mat.shininess = f32::from_bits(words[1]);
            mat.specularity = f32::from_bits(words[2]);
        }
        6 => mat.color0 = unpack_rgb8(words[1]),
        _ => log::warn!("091 sub-opcode {sub} unrecognized"),
    }
    ok()
}

fn op_081_material_flags(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let sub = (words[0] >> 8) & 0xF;
    let mat = cp.material.scratch_mut();
    match sub {
        0x0 => mat.shading_mode = (words[0] >> 16) as u8,
        0x8 => mat.depth_blend = (words[0] >> 16) & 1 != 0,
        0xA => {
            mat.textured = (words[0] >> 16) & 1 != 0;
            mat.alpha = (words[0] >> 17) & 1 != 0;
        }
        0xC => {
            mat.highlight = (words[0] >> 16) & 1 != 0;
            mat.blend_mode = (words[0] >> 20) as u8 & 0xF;
        }
        _ => log::warn!("081 sub-opcode {sub:#x} unrecognized"),
    }
    ok()
}

fn op_084_commit_material(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.material.commit((words[0] >> 16) as usize & 0x3FFF);
    ok()
}

fn op_083_recall_material(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let is_recall = (words[0] >> 12) & 1 != 0;
    let index = (words[0] >> 16) as usize & 0x3FFF;
    if is_recall {
        if let Err(e) = cp.material.recall(index) {
            log::warn!("{e}");
        }
    } else {
        cp.material.commit(index);
    }
    ok()
}

fn op_0c1_texhead(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let sub = (words[0] >> 2) & 0x7;
    match sub {
        0 => cp.texhead.scratch_mut().bias = (words[1] >> 24) as u8,
        2 => {
            let mut th = TexHead::from_packed_word(words[1]);
            let prior = cp.texhead.scratch();
            th.bias = prior.bias;
            th.slot_x = prior.slot_x;
            th.slot_y = prior.slot_y;
            th.bank = prior.bank;
            cp.texhead.set_scratch(th);
        }
        4 => {
            let th = cp.texhead.scratch_mut();
            th.slot_x = (words[1] >> 16) & 0xFF;
            th.slot_y = words[1] & 0xFF;
            th.bank = (words[1] >> 24) as u8 & 1;
        }
        _ => log::warn!("0C1 sub-opcode {sub} unrecognized"),
    }
    ok()
}

fn op_0c4_commit_texhead(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.texhead.commit((words[0] >> 16) as usize & 0x3FFF);
    ok()
}

fn op_0c3_recall_texhead(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let index = (words[0] >> 16) as usize & 0x3FFF;
    if let Err(e) = cp.texhead.recall(index) {
        log::warn!("{e}");
    }
    ok()
}

fn op_061_light_attenuation(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let light = cp.light.scratch_mut();
    light.attenuation_type = (words[0] >> 8) as u8;
    light.param0 = f32::from_bits(words[1]);
    light.param1 = f32::from_bits(words[2]);
    ok()
}

fn op_051_light_color(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let sub = (words[0] >> 8) & 0xF;
    let light = cp.light.scratch_mut();
    match sub {
        0 => light.diffuse = unpack_rgb10(words[1]),
        4 => light.specular = unpack_rgb10(words[1]),
        _ => log::warn!("051 sub-opcode {sub} unrecognized"),
    }
    ok()
}

fn op_104_commit_light(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.light.commit((words[0] >> 16) as usize & 0x3FF);
    ok()
}

fn op_064_commit_lightset(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let set = crate::gpu::objects::LightSet {
        lights: [words[1] as u8, (words[1] >> 8) as u8, (words[1] >> 16) as u8, (words[1] >> 24) as u8],
        disable_mask: 0,
    };
    cp.lightset.set_scratch(set);
    cp.lightset.commit((words[0] >> 16) as usize & 0xFF);
    ok()
}

fn op_043_recall_lightset(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let index = (words[0] >> 16) as usize & 0xFF;
    let disable_mask = ((words[0] >> 24) & 0xF) as u8;
    if let Err(e) = cp.lightset.recall(index) {
        log::warn!("{e}");
    }
    cp.lightset.scratch_mut().disable_mask = disable_mask;
    ok()
}

/// 154: alpha thresholds[n] = (lo, hi) with n in bits 16-21 of word0 and
/// the lo/hi pair packed into word1 (`hikaru-gpu-insns.c`'s `I(0x154)`).
fn op_154_alpha_threshold(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let n = ((words[0] >> 16) & 0x3F) as usize;
    let lo = (words[1] & 0xFF) as u8;
    let hi = ((words[1] >> 8) & 0xFF) as u8;
    cp.alpha_thresholds[n] = (lo, hi);
    ok()
}

/// 194: light ramp[group][n] = (a, b), group in bits 24-31 of word0
/// (8 groups), n in bits 19-23 (32 entries/group), a/b split across the
/// two halfwords of word1 (`hikaru-gpu-insns.c`'s `I(0x194)`).
fn op_194_light_ramp(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let group = ((words[0] >> 24) & 0xFF) as usize;
    let n = ((words[0] >> 19) & 0x1F) as usize;
    let a = (words[1] & 0xFFFF) as u16;
    let b = (words[1] >> 16) as u16;
    cp.light_ramp[group % cp.light_ramp.len()][n] = (a, b);
    ok()
}

fn op_181_fb_blend(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let slot = if (words[0] >> 9) & 1 != 0 { 1 } else { 0 };
    cp.fb_blend_raw[slot] = words[0];
    ok()
}

/// 005: LOD lower-threshold compare (LOD.value < thresh*8) sets the
/// LOD cond flag used by conditional branches.
fn op_005_lod_lower(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let thresh = f32::from_bits(words[1]);
    cp.lod_cond = cp.lod.below_lower_threshold(thresh);
    ok()
}

fn op_055_lod_threshold(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let thresh = f32::from_bits(words[1]);
    cp.lod_cond = cp.lod.below_threshold(thresh);
    ok()
}

fn op_095_set_branch_id(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.lod.branch_id = (words[0] >> 8) as u8;
    ok()
}

/// 561: LOD.value = ||modelview * vector||.
fn op_561_set_lod_value(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let v = [f32::from_bits(words[1]), f32::from_bits(words[2]), f32::from_bits(words[3])];
    let transformed = cp.modelview.transform_point(v);
    cp.lod.set_value_from_vector(transformed);
    ok()
}

fn fixed16_to_f32(raw: u16, scale: f32) -> f32 {
    (raw as i16) as f32 / scale
}

/// Decodes the common vertex-push info word (`hikaru-gpu-insns.c`'s
/// `decode_vertex_header` comment block: `AAAAAAAA U------- uuuSTTTo
/// oooootpW`): vertex alpha in the top byte, the 3-bit tricap/triangle
/// field at bits 9-11 (only 0 or 7 are ever observed), and the tpivot/
/// ppivot/winding flags in the low 3 bits.
fn vertex_info(word0: u32) -> (u8, u8, bool, bool, bool) {
    let alpha = (word0 >> 24) as u8;
    let tricap = ((word0 >> 9) & 0x7) as u8;
    let tpivot = (word0 >> 2) & 1 != 0;
    let ppivot = (word0 >> 1) & 1 != 0;
    let winding = word0 & 1 != 0;
    (alpha, tricap, tpivot, ppivot, winding)
}

/// 12X: static single-vertex mesh instruction. Position is the int16
/// top halves scaled by static_mesh_precision; normal is the lower 10
/// bits of each word as a 16384-scaled signed fraction (spec.md §4.4).
fn op_12x_static_vertex(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, renderer: &mut dyn Renderer) -> Result<(), GpuError> {
    let precision = cp.static_mesh_precision;
    let pos = [
        fixed16_to_f32((words[1] >> 16) as u16, precision),
        fixed16_to_f32(words[1] as u16, precision),
        fixed16_to_f32((words[2] >> 16) as u16, precision),
    ];
    let nrm_component = |w: u32| -> f32 {
        let raw = (w & 0x3FF) as i16;
        let raw = if raw & 0x200 != 0 { raw | !0x3FF } else { raw };
        raw as f32 / 16384.0
    };
    let nrm = [nrm_component(words[2]), nrm_component(words[3]), nrm_component(words[0])];
    let (alpha, tricap, tpivot, ppivot, winding) = vertex_info(words[0]);
    let v = Vertex { pos, nrm, rgba: [0, 0, 0, alpha], tricap, tpivot, ppivot, winding, ..Default::default() };
    cp.push_vertex(v, VertexMask::POS | VertexMask::NRM, renderer);
    ok()
}

fn f32_position_words(words: &[u32], base: usize) -> [f32; 3] {
    [f32::from_bits(words[base]), f32::from_bits(words[base + 1]), f32::from_bits(words[base + 2])]
}

/// 1AC: dynamic position only.
fn op_1ac_dynamic_position(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, renderer: &mut dyn Renderer) -> Result<(), GpuError> {
    let pos = f32_position_words(words, 1);
    let (alpha, tricap, tpivot, ppivot, winding) = vertex_info(words[0]);
    let v = Vertex {
        pos,
        nrm: [0.0, 0.0, 1.0],
        rgba: [0, 0, 0, alpha],
        tricap,
        tpivot,
        ppivot,
        winding,
        ..Default::default()
    };
    cp.push_vertex(v, VertexMask::POS, renderer);
    ok()
}

/// 1BX: dynamic position + texcoord pair (16-bit fixed /16) + normal.
fn op_1bx_dynamic_full(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, renderer: &mut dyn Renderer) -> Result<(), GpuError> {
    let pos = f32_position_words(words, 1);
    let tex_word = words[4];
    let txc = [fixed16_to_f32(tex_word as u16, 16.0), fixed16_to_f32((tex_word >> 16) as u16, 16.0)];
    let nrm = f32_position_words(words, 5);
    let (alpha, tricap, tpivot, ppivot, winding) = vertex_info(words[0]);
    let v = Vertex { pos, nrm, txc, rgba: [0, 0, 0, alpha], tricap, tpivot, ppivot, winding };
    cp.push_vertex(v, VertexMask::POS | VertexMask::NRM | VertexMask::TXC, renderer);
    ok()
}

/// 0E8: three texcoord pairs overwriting the last three pushed
/// vertices' texcoords.
fn op_0e8_texcoord3(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, renderer: &mut dyn Renderer) -> Result<(), GpuError> {
    let mut txcs = Vec::with_capacity(3);
    for i in 0..3 {
        let w = words[1 + i];
        txcs.push([fixed16_to_f32(w as u16, 16.0), fixed16_to_f32((w >> 16) as u16, 16.0)]);
    }
    cp.vertex_window.overwrite_texcoords(&txcs);
    renderer.push_vertex(&cp.vertex_window.slots(), VertexMask::TXC);
    ok()
}

/// 158: one texcoord pair overwriting the last pushed vertex.
fn op_158_texcoord1(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, renderer: &mut dyn Renderer) -> Result<(), GpuError> {
    let w = words[1];
    let txc = [fixed16_to_f32(w as u16, 16.0), fixed16_to_f32((w >> 16) as u16, 16.0)];
    cp.vertex_window.overwrite_texcoords(&[txc]);
    renderer.push_vertex(&[cp.vertex_window.recent()], VertexMask::TXC);
    ok()
}

// --------------------------------------------------------- control flow

fn op_jump_unconditional(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let target = words[1] & 0x00FF_FFFF;
    cp.jump_to(target)
}

fn op_jump_call(cp: &mut CommandProcessor, words: &[u32], mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let target = words[1] & 0x00FF_FFFF;
    cp.call(target, mem)
}

fn op_jump_return(cp: &mut CommandProcessor, _words: &[u32], mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.ret(mem)
}

/// Conditional jump keyed off a 4-bit condition field and the LOD
/// state (spec.md §4.4): branch-id equality/inequality (1/D), LOD
/// true/false (5/6/7/9/4/8), always (0).
fn op_jump_conditional(cp: &mut CommandProcessor, words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    let cond = (words[0] >> 8) & 0xF;
    let branch_id_arg = ((words[0] >> 16) & 0xFF) as u8;
    let take = match cond {
        0x0 => true,
        0x1 => cp.lod.branch_id == branch_id_arg,
        0xD => cp.lod.branch_id != branch_id_arg,
        0x5 | 0x7 | 0x9 => cp.lod_cond,
        0x6 | 0x4 | 0x8 => !cp.lod_cond,
        _ => {
            log::warn!("1C2 conditional field {cond:#x} unrecognized, treating as false");
            false
        }
    };
    if take {
        let target = words[1] & 0x00FF_FFFF;
        cp.jump_to(target)
    } else {
        cp.advance_past(words.len() as u32 * 4);
        ok()
    }
}

/// 1C2: kill. Clears is_running, reg bits, and raises the DONE IRQ
/// (spec.md §5 "Ordering guarantees").
fn op_kill(cp: &mut CommandProcessor, _words: &[u32], _mem: &GpuMemory, _r: &mut dyn Renderer) -> Result<(), GpuError> {
    cp.is_running = false;
    cp.done_pending = true;
    ok()
}

#[rustfmt::skip]
pub fn build_table() -> CpDispatchTable {
    CpDispatchTable::build(&[
        CpOpDescriptor { name: "021-viewport",   opcodes: (0x021, 0x021), handler: op_021_viewport,          flags: CpFlags::empty() },
        CpOpDescriptor { name: "011-ambient",    opcodes: (0x011, 0x011), handler: op_011_ambient,           flags: CpFlags::empty() },
        CpOpDescriptor { name: "191-clear",      opcodes: (0x191, 0x191), handler: op_191_clear_color,      flags: CpFlags::empty() },
        CpOpDescriptor { name: "004-commit-vp",  opcodes: (0x004, 0x004), handler: op_004_commit_viewport,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "003-recall-vp",  opcodes: (0x003, 0x003), handler: op_003_recall_viewport,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "161-mv-light",   opcodes: (0x161, 0x161), handler: op_161_modelview_light,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "091-mat-color",  opcodes: (0x091, 0x091), handler: op_091_material_color,   flags: CpFlags::empty() },
        CpOpDescriptor { name: "081-mat-flags",  opcodes: (0x081, 0x081), handler: op_081_material_flags,   flags: CpFlags::empty() },
        CpOpDescriptor { name: "084-commit-mat", opcodes: (0x084, 0x084), handler: op_084_commit_material,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "083-recall-mat", opcodes: (0x083, 0x083), handler: op_083_recall_material,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "0c1-texhead",    opcodes: (0x0C1, 0x0C1), handler: op_0c1_texhead,          flags: CpFlags::empty() },
        CpOpDescriptor { name: "0c4-commit-th",  opcodes: (0x0C4, 0x0C4), handler: op_0c4_commit_texhead,   flags: CpFlags::empty() },
        CpOpDescriptor { name: "0c3-recall-th",  opcodes: (0x0C3, 0x0C3), handler: op_0c3_recall_texhead,   flags: CpFlags::empty() },
        CpOpDescriptor { name: "061-attenuation",opcodes: (0x061, 0x061), handler: op_061_light_attenuation,flags: CpFlags::empty() },
        CpOpDescriptor { name: "051-light-color",opcodes: (0x051, 0x051), handler: op_051_light_color,      flags: CpFlags::empty() },
        CpOpDescriptor { name: "104-commit-lt",  opcodes: (0x104, 0x104), handler: op_104_commit_light,     flags: CpFlags::empty() },
        CpOpDescriptor { name: "064-commit-ls",  opcodes: (0x064, 0x064), handler: op_064_commit_lightset,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "043-recall-ls",  opcodes: (0x043, 0x043), handler: op_043_recall_lightset,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "154-alpha",      opcodes: (0x154, 0x154), handler: op_154_alpha_threshold,  flags: CpFlags::empty() },
        CpOpDescriptor { name: "194-ramp",       opcodes: (0x194, 0x194), handler: op_194_light_ramp,       flags: CpFlags::empty() },
        CpOpDescriptor { name: "181-blend",      opcodes: (0x181, 0x181), handler: op_181_fb_blend,        flags: CpFlags::empty() },
        CpOpDescriptor { name: "005-lod-lower",  opcodes: (0x005, 0x005), handler: op_005_lod_lower,        flags: CpFlags::empty() },
        CpOpDescriptor { name: "055-lod-thresh", opcodes: (0x055, 0x055), handler: op_055_lod_threshold,    flags: CpFlags::empty() },
        CpOpDescriptor { name: "095-branch-id",  opcodes: (0x095, 0x095), handler: op_095_set_branch_id,    flags: CpFlags::empty() },
        CpOpDescriptor { name: "12x-static-vtx", opcodes: (0x120, 0x12F), handler: op_12x_static_vertex,    flags: CpFlags::BEGIN.union(CpFlags::CONTINUE).union(CpFlags::STATIC) },
        CpOpDescriptor { name: "1ac-dyn-pos",    opcodes: (0x1AC, 0x1AC), handler: op_1ac_dynamic_position, flags: CpFlags::BEGIN.union(CpFlags::CONTINUE) },
        CpOpDescriptor { name: "1bx-dyn-full",   opcodes: (0x1B0, 0x1BF), handler: op_1bx_dynamic_full,     flags: CpFlags::BEGIN.union(CpFlags::CONTINUE) },
        CpOpDescriptor { name: "0e8-texcoord3",  opcodes: (0x0E8, 0x0E8), handler: op_0e8_texcoord3,        flags: CpFlags::CONTINUE },
        CpOpDescriptor { name: "158-texcoord1",  opcodes: (0x158, 0x158), handler: op_158_texcoord1,        flags: CpFlags::CONTINUE },
        CpOpDescriptor { name: "000-jump",       opcodes: (0x000, 0x000), handler: op_jump_unconditional,   flags: CpFlags::JUMP },
        CpOpDescriptor { name: "012-call",       opcodes: (0x012, 0x012), handler: op_jump_call,            flags: CpFlags::JUMP },
        CpOpDescriptor { name: "052-return",     opcodes: (0x052, 0x052), handler: op_jump_return,          flags: CpFlags::JUMP },
        CpOpDescriptor { name: "082-cond-jump",  opcodes: (0x082, 0x082), handler: op_jump_conditional,     flags: CpFlags::JUMP },
        CpOpDescriptor { name: "1c2-kill",       opcodes: (0x1C2, 0x1C2), handler: op_kill,                 flags: CpFlags::JUMP },
    ])
}
