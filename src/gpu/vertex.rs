//! Mesh vertex assembly (spec.md §4.4 "Mesh assembly", §9 "Vertex
//! assembly window"). A three-element ring buffer holds the most
//! recently pushed vertices; when a pushed vertex's tricap field hits
//! 7 the three most recent vertices finalize a triangle.

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VertexMask: u8 {
        const POS = 0b001;
        const NRM = 0b010;
        const TXC = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub nrm: [f32; 3],
    pub txc: [f32; 2],
    pub rgba: [u8; 4],
    /// Low 3 bits of the push instruction's info word (spec.md §9); 0
    /// for a plain vertex push, 7 when this push also caps a triangle
    /// from the three most-recent window vertices.
    pub tricap: u8,
    pub winding: bool,
    pub ppivot: bool,
    pub tpivot: bool,
}

/// Holds index 2 = most recent, index 0 = oldest (spec.md §9). Callers
/// must not read index 0/1 before three POS-pushes have occurred;
/// `pushed` tracks how many pushes have happened so triangle
/// finalization can assert this.
pub struct VertexWindow {
    slots: [Vertex; 3],
    pushed: u32,
}

impl VertexWindow {
    pub fn new() -> Self {
        VertexWindow { slots: [Vertex::default(); 3], pushed: 0 }
    }

    pub fn reset(&mut self) {
        self.slots = [Vertex::default(); 3];
        self.pushed = 0;
    }

    /// Pushes a new vertex into slot 2, shifting the previous contents
    /// of slots 1/2 down to 0/1.
    pub fn push(&mut self, v: Vertex) {
        self.push_with_pivot(v, false);
    }

    /// Pushes a new vertex, honoring the ppivot bit (spec.md §4.4/§9):
    /// when `ppivot` is set, slot 0 — the fan pivot at offset -2 — is
    /// left unchanged instead of being shifted out.
    pub fn push_with_pivot(&mut self, v: Vertex, ppivot: bool) {
        if !ppivot {
            self.slots[0] = self.slots[1];
        }
        self.slots[1] = self.slots[2];
        self.slots[2] = v;
        self.pushed += 1;
    }

    /// Returns the window contents oldest-to-newest, used by opcode
    /// 0E8 to push up to three vertices in one `Renderer::push_vertex`
    /// call (spec.md §4.4/§6).
    pub fn slots(&self) -> [Vertex; 3] {
        self.slots
    }

    /// Overwrites the texture coordinates of the last `n` pushed
    /// vertices (n in 1..=3), most-recent first, per opcodes 0E8/158
    /// (spec.md §4.4).
    pub fn overwrite_texcoords(&mut self, txcs: &[[f32; 2]]) {
        debug_assert!(txcs.len() <= 3);
        for (i, txc) in txcs.iter().enumerate() {
            let slot = 2 - i;
            self.slots[slot].txc = *txc;
        }
    }

    pub fn recent(&self) -> Vertex {
        self.slots[2]
    }

    /// Finalizes a triangle from the three most-recent vertices when
    /// `tricap == 7` (spec.md §4.4, §9). `winding` reverses the vertex
    /// order; `ppivot` keeps slot 0 (the "pivot") fixed across fans by
    /// only rotating slots 1/2 back into the window afterward (the
    /// caller decides whether to rotate; this just reads the slots).
    pub fn finalize_triangle(&self, winding: bool) -> Option<[Vertex; 3]> {
        if self.pushed < 3 {
            return None;
        }
        Some(if winding {
            [self.slots[2], self.slots[1], self.slots[0]]
        } else {
            [self.slots[0], self.slots[1], self.slots[2]]
        })
    }

    pub fn pushed_count(&self) -> u32 {
        self.pushed
    }
}

impl Default for VertexWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32) -> Vertex {
        Vertex { pos: [x, 0.0, 0.0], nrm: [0.0, 0.0, 1.0], ..Default::default() }
    }

    fn capping_v(x: f32, winding: bool) -> Vertex {
        Vertex { tricap: 7, winding, ..v(x) }
    }

    #[test]
    fn tricap_seven_marks_a_cap_vertex_others_do_not() {
        assert_eq!(Vertex::default().tricap, 0);
        let cap = capping_v(1.0, true);
        assert_eq!(cap.tricap, 7);
        assert!(cap.winding);
    }

    #[test]
    fn ppivot_keeps_slot_zero_fixed_across_a_fan() {
        let mut w = VertexWindow::new();
        w.push(v(1.0));
        w.push(v(2.0));
        w.push(v(3.0));
        w.push_with_pivot(v(4.0), true);
        assert_eq!(w.slots[0].pos[0], 1.0);
        assert_eq!(w.slots[1].pos[0], 3.0);
        assert_eq!(w.slots[2].pos[0], 4.0);
    }

    #[test]
    fn three_pushes_enable_finalize() {
        let mut w = VertexWindow::new();
        assert!(w.finalize_triangle(false).is_none());
        w.push(v(1.0));
        w.push(v(2.0));
        w.push(v(3.0));
        let tri = w.finalize_triangle(false).unwrap();
        assert_eq!(tri[0].pos[0], 1.0);
        assert_eq!(tri[1].pos[0], 2.0);
        assert_eq!(tri[2].pos[0], 3.0);
    }

    #[test]
    fn winding_reverses_order() {
        let mut w = VertexWindow::new();
        w.push(v(1.0));
        w.push(v(2.0));
        w.push(v(3.0));
        let tri = w.finalize_triangle(true).unwrap();
        assert_eq!(tri[0].pos[0], 3.0);
        assert_eq!(tri[2].pos[0], 1.0);
    }

    #[test]
    fn texcoord_overwrite_targets_most_recent_first() {
        let mut w = VertexWindow::new();
        w.push(v(1.0));
        w.push(v(2.0));
        w.push(v(3.0));
        w.overwrite_texcoords(&[[9.0, 9.0], [8.0, 8.0], [7.0, 7.0]]);
        assert_eq!(w.slots[2].txc, [9.0, 9.0]);
        assert_eq!(w.slots[1].txc, [8.0, 8.0]);
        assert_eq!(w.slots[0].txc, [7.0, 7.0]);
    }
}
