//! Renderer trait (spec.md §6 "External interfaces"): the GPU command
//! processor and scheduler are consumers of a renderer, never owners
//! of pixels. Grounded on the teacher's `Device` trait shape (a small
//! set of named callbacks with no return value save where one is
//! needed) generalized to the mesh/texture/layer vocabulary Hikaru's
//! GPU uses.

use crate::gpu::objects::TexHead;
use crate::gpu::vertex::{Vertex, VertexMask};

/// One enabled framebuffer layer, filled in at `vblank_out` (spec.md
/// §4.8) and handed to the renderer for 2D compositing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerDescriptor {
    pub enabled: bool,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub format: u8,
    pub src_offset: u32,
}

/// Opaque handle returned by `decode_texture`; the GPU never
/// interprets this value, only threads it back through draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

pub trait Renderer {
    fn begin_frame(&mut self);
    fn end_frame(&mut self);
    fn reset(&mut self);

    fn begin_mesh(&mut self, pc: u32, is_static: bool);
    fn end_mesh(&mut self, pc: u32);
    fn push_vertex(&mut self, vertices: &[Vertex], mask: VertexMask);

    fn draw_layer(&mut self, layer: &LayerDescriptor);

    fn invalidate_texture_cache(&mut self, bank: u8, slot_x: u32, slot_y: u32, w: u32, h: u32);
    fn decode_texture(&mut self, texhead: &TexHead) -> TextureHandle;
}

/// Discards every event. Used when the core runs headless (tests,
/// scheduler-only benchmarking).
#[derive(Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn begin_frame(&mut self) {}
    fn end_frame(&mut self) {}
    fn reset(&mut self) {}
    fn begin_mesh(&mut self, _pc: u32, _is_static: bool) {}
    fn end_mesh(&mut self, _pc: u32) {}
    fn push_vertex(&mut self, _vertices: &[Vertex], _mask: VertexMask) {}
    fn draw_layer(&mut self, _layer: &LayerDescriptor) {}
    fn invalidate_texture_cache(&mut self, _bank: u8, _slot_x: u32, _slot_y: u32, _w: u32, _h: u32) {}
    fn decode_texture(&mut self, _texhead: &TexHead) -> TextureHandle {
        TextureHandle(0)
    }
}

/// Records every call verbatim; used by tests that assert on the
/// exact sequence of renderer events a command stream produces
/// (spec.md §8 "Opcodes with FLAG_PUSH...").
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    BeginFrame,
    EndFrame,
    Reset,
    BeginMesh { pc: u32, is_static: bool },
    EndMesh { pc: u32 },
    PushVertex { count: usize, mask: VertexMask },
    DrawLayer(LayerDescriptor),
    InvalidateTextureCache { bank: u8, slot_x: u32, slot_y: u32, w: u32, h: u32 },
    DecodeTexture,
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub events: Vec<RecordedEvent>,
    next_handle: u64,
}

impl Renderer for RecordingRenderer {
    fn begin_frame(&mut self) {
        self.events.push(RecordedEvent::BeginFrame);
    }
    fn end_frame(&mut self) {
        self.events.push(RecordedEvent::EndFrame);
    }
    fn reset(&mut self) {
        self.events.push(RecordedEvent::Reset);
    }
    fn begin_mesh(&mut self, pc: u32, is_static: bool) {
        self.events.push(RecordedEvent::BeginMesh { pc, is_static });
    }
    fn end_mesh(&mut self, pc: u32) {
        self.events.push(RecordedEvent::EndMesh { pc });
    }
    fn push_vertex(&mut self, vertices: &[Vertex], mask: VertexMask) {
        self.events.push(RecordedEvent::PushVertex { count: vertices.len(), mask });
    }
    fn draw_layer(&mut self, layer: &LayerDescriptor) {
        self.events.push(RecordedEvent::DrawLayer(*layer));
    }
    fn invalidate_texture_cache(&mut self, bank: u8, slot_x: u32, slot_y: u32, w: u32, h: u32) {
        self.events.push(RecordedEvent::InvalidateTextureCache { bank, slot_x, slot_y, w, h });
    }
    fn decode_texture(&mut self, _texhead: &TexHead) -> TextureHandle {
        self.events.push(RecordedEvent::DecodeTexture);
        self.next_handle += 1;
        TextureHandle(self.next_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_renderer_captures_mesh_boundary_events() {
        let mut r = RecordingRenderer::default();
        r.begin_mesh(0x1000, true);
        r.end_mesh(0x1040);
        assert_eq!(
            r.events,
            vec![
                RecordedEvent::BeginMesh { pc: 0x1000, is_static: true },
                RecordedEvent::EndMesh { pc: 0x1040 },
            ]
        );
    }
}
