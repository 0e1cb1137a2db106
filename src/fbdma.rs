//! Framebuffer block-copy DMA (spec.md §4.6): a four-register engine
//! that copies a rectangle of 16-bit pixels between two offsets of the
//! same framebuffer-backed RAM.
//!
//! Grounded on the same `Device` shape as `memctl`/`idma`, with the
//! busy-bit convention spec.md §4.6 assigns to register 0x24 bit 0.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::device::{le_bytes, take_u32, CpuId, Device, IrqIntent, ResetKind};
use crate::error::{BusError, DmaError, StateError};

const REG_SRC: usize = 0x00;
const REG_DST: usize = 0x04;
const REG_SIZE: usize = 0x08;
const REG_CTL: usize = 0x0C;

const FB_WIDTH: usize = 2048;

pub struct FbDma {
    fb: Rc<RefCell<Buffer>>,
    regs: [u32; 4],
}

impl FbDma {
    pub fn new(fb: Rc<RefCell<Buffer>>) -> Self {
        FbDma { fb, regs: [0; 4] }
    }

    fn unpack_xy(packed: u32) -> (usize, usize) {
        ((packed & 0xFFFF) as usize, ((packed >> 16) & 0xFFFF) as usize)
    }

    /// Copies a `width x height` rectangle of 16-bit pixels from
    /// `src` to `dst` within the same framebuffer buffer (spec.md
    /// §4.6). Row-major, row stride fixed at `FB_WIDTH` texels.
    fn copy_rect(&self) -> Result<(), DmaError> {
        let (src_x, src_y) = Self::unpack_xy(self.regs[REG_SRC / 4]);
        let (dst_x, dst_y) = Self::unpack_xy(self.regs[REG_DST / 4]);
        let (width, height) = Self::unpack_xy(self.regs[REG_SIZE / 4]);

        let mut fb = self.fb.borrow_mut();
        let stride_bytes = FB_WIDTH * 2;
        let fb_len = fb.len();
        if (src_y + height) * stride_bytes > fb_len || (dst_y + height) * stride_bytes > fb_len {
            return Err(DmaError::UnknownDestination { addr: self.regs[REG_DST / 4] });
        }
        for row in 0..height {
            for col in 0..width {
                let pixel = fb.get(2, (src_y + row) * stride_bytes + (src_x + col) * 2);
                fb.put(2, (dst_y + row) * stride_bytes + (dst_x + col) * 2, pixel);
            }
        }
        Ok(())
    }
}

impl Device for FbDma {
    fn name(&self) -> &'static str {
        "fbdma"
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.regs = [0; 4];
    }

    /// Runs the whole rectangle copy to completion in a single tick
    /// once ctl bit 0 is set (spec.md §4.6 describes no sub-stepping),
    /// then clears the go bit.
    fn exec(&mut self, cycles: u32) -> (u32, Vec<IrqIntent>) {
        if self.regs[REG_CTL / 4] & 1 == 0 || cycles == 0 {
            return (0, Vec::new());
        }
        if let Err(e) = self.copy_rect() {
            log::warn!("fbdma copy skipped: {e}");
        }
        self.regs[REG_CTL / 4] &= !1;
        (1, Vec::new())
    }

    fn get(&mut self, size: u8, addr: u32) -> Result<(u64, Vec<IrqIntent>), BusError> {
        let idx = ((addr & 0xF) / 4) as usize;
        if idx >= self.regs.len() || size != 4 {
            return Err(BusError::UnsupportedSize { cpu: "fbdma", addr, size });
        }
        Ok((self.regs[idx] as u64, Vec::new()))
    }

    fn put(&mut self, size: u8, addr: u32, value: u64) -> Result<Vec<IrqIntent>, BusError> {
        let idx = ((addr & 0xF) / 4) as usize;
        if idx >= self.regs.len() || size != 4 {
            return Err(BusError::UnsupportedSize { cpu: "fbdma", addr, size });
        }
        self.regs[idx] = value as u32;
        let mut intents = Vec::new();
        if idx == REG_CTL && value & 1 != 0 {
            // Busy bit at reg15.88004024 bit 0, addressed externally by
            // the interrupt fabric; here we just report via Port A so the
            // scheduler's status poll sees it without a direct IRQ.
            intents.push(IrqIntent::SetPortA { cpu: CpuId::Master, bit: 5, value: true });
        }
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
    fn rectangle_copies_source_pixels_to_destination() {
        let fb = Rc::new(RefCell::new(Buffer::new(FB_WIDTH * 1024 * 2)));
        for i in 0..16u64 {
            fb.borrow_mut().put(2, i as usize * 2, 0x100 + i);
        }
        let mut dma = FbDma::new(fb.clone());
        dma.regs[REG_SRC / 4] = 0;
        dma.regs[REG_DST / 4] = (100 << 16) | 100;
        dma.regs[REG_SIZE / 4] = (16 << 16) | 16;
        dma.regs[REG_CTL / 4] = 1;

        let (_, _) = Device::exec(&mut dma, 1);
        assert_eq!(dma.regs[REG_CTL / 4] & 1, 0);

        let stride = FB_WIDTH * 2;
        let fb = fb.borrow();
        for col in 0..16usize {
            let src = fb.get(2, col * 2);
            let dst = fb.get(2, 100 * stride + (100 + col) * 2);
            assert_eq!(src, dst);
        }
    }

    #[test]
    fn ctl_without_go_bit_does_nothing() {
        let fb = Rc::new(RefCell::new(Buffer::new(FB_WIDTH * 16 * 2)));
        let mut dma = FbDma::new(fb);
        let (consumed, intents) = Device::exec(&mut dma, 1);
        assert_eq!(consumed, 0);
        assert!(intents.is_empty());
    }
}
