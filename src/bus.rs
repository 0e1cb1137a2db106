//! Region/Mmap bus layer (spec.md §3 Region/Mmap, §4.1 Bus Map).
//!
//! Grounded on the teacher's `Bus::read`/`write`, which does a linear
//! scan of `(from, to, device)` tuples and forwards the access to the
//! first match. This generalizes that scan to add permission bits,
//! an allowed-size set, and the direct-buffer-vs-mmio-device split
//! spec.md §3 requires.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::device::{CpuId, Device, IrqIntent};
use crate::error::BusError;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u8 {
        const READ  = 0b0000_0001;
        const WRITE = 0b0000_0010;
        /// Accesses are logged (debug tooling hook); never gates success.
        const LOG   = 0b0000_0100;
        /// Reads/writes are accepted and silently discarded (nop region).
        const NOP   = 0b0000_1000;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sizes: u8 {
        const S8  = 0b0001;
        const S16 = 0b0010;
        const S32 = 0b0100;
        const S64 = 0b1000;
    }
}

impl Sizes {
    pub const ALL: Sizes = Sizes::S8.union(Sizes::S16).union(Sizes::S32).union(Sizes::S64);

    pub fn allows(self, size: u8) -> bool {
        match size {
            1 => self.contains(Sizes::S8),
            2 => self.contains(Sizes::S16),
            4 => self.contains(Sizes::S32),
            8 => self.contains(Sizes::S64),
            _ => false,
        }
    }
}

/// Backing store for a region: either a direct RAM buffer or an MMIO
/// device. Invariant (spec.md §3): exactly one of these is active for
/// a non-nop region.
pub enum Backing {
    Direct { buffer: Rc<RefCell<Buffer>>, mask: u32 },
    Mmio { device: Rc<RefCell<dyn Device>> },
    Nop,
}

/// A half-open CPU-address window with a permission/size bitset and a
/// backing store.
pub struct Region {
    pub name: &'static str,
    pub lo: u32,
    pub hi: u32,
    pub perm: Perm,
    pub sizes: Sizes,
    pub backing: Backing,
}

impl Region {
    pub fn direct(
        name: &'static str,
        lo: u32,
        hi: u32,
        mask: u32,
        buffer: Rc<RefCell<Buffer>>,
        perm: Perm,
    ) -> Self {
        Region { name, lo, hi, perm, sizes: Sizes::ALL, backing: Backing::Direct { buffer, mask } }
    }

    pub fn mmio(name: &'static str, lo: u32, hi: u32, device: Rc<RefCell<dyn Device>>, perm: Perm) -> Self {
        Region { name, lo, hi, perm, sizes: Sizes::ALL, backing: Backing::Mmio { device } }
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.lo && addr <= self.hi
    }
}

/// An ordered collection of regions belonging to one CPU. Lookup is
/// linear, first match wins (spec.md §3 Mmap).
pub struct Mmap {
    pub cpu: CpuId,
    regions: Vec<Region>,
}

impl Mmap {
    pub fn new(cpu: CpuId) -> Self {
        Mmap { cpu, regions: Vec::new() }
    }

    pub fn attach(&mut self, region: Region) {
        self.regions.push(region);
    }

    fn find(&self, addr: u32, need: Perm) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr) && r.perm.contains(need))
    }

    fn find_mut(&mut self, addr: u32, need: Perm) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.contains(addr) && r.perm.contains(need))
    }

    fn check_size(size: u8) -> Result<(), BusError> {
        if matches!(size, 1 | 2 | 4 | 8) {
            Ok(())
        } else {
            Err(BusError::UnsupportedSize { cpu: "?", addr: 0, size })
        }
    }

    pub fn get(&self, size: u8, addr: u32) -> Result<(u64, Vec<IrqIntent>), BusError> {
        Self::check_size(size).map_err(|_| BusError::UnsupportedSize {
            cpu: self.cpu.label(),
            addr,
            size,
        })?;
        let region = self.find(addr, Perm::READ).ok_or(BusError::NoRegion {
            cpu: self.cpu.label(),
            addr,
            size,
        })?;
        if !region.sizes.allows(size) {
            return Err(BusError::UnsupportedSize { cpu: self.cpu.label(), addr, size });
        }
        if region.perm.contains(Perm::LOG) {
            log::debug!("{} bus read{} {:#010x} [{}]", self.cpu.label(), size * 8, addr, region.name);
        }
        match &region.backing {
            Backing::Direct { buffer, mask } => {
                let offset = (addr & *mask) as usize;
                Ok((buffer.borrow().get(size, offset), Vec::new()))
            }
            Backing::Mmio { device } => device
                .borrow_mut()
                .get(size, addr)
                .map_err(|_| BusError::DeviceFailed {
                    cpu: self.cpu.label(),
                    addr,
                    reason: region.name.to_string(),
                }),
            Backing::Nop => Ok((0, Vec::new())),
        }
    }

    pub fn put(&mut self, size: u8, addr: u32, value: u64) -> Result<Vec<IrqIntent>, BusError> {
        Self::check_size(size).map_err(|_| BusError::UnsupportedSize {
            cpu: self.cpu.label(),
            addr,
            size,
        })?;
        let cpu = self.cpu;
        let region = self.find_mut(addr, Perm::WRITE).ok_or(BusError::NoRegion {
            cpu: cpu.label(),
            addr,
            size,
        })?;
        if !region.sizes.allows(size) {
            return Err(BusError::UnsupportedSize { cpu: cpu.label(), addr, size });
        }
        if region.perm.contains(Perm::LOG) {
            log::debug!("{} bus write{} {:#010x} = {:#x} [{}]", cpu.label(), size * 8, addr, value, region.name);
        }
        match &mut region.backing {
            Backing::Direct { buffer, mask } => {
                let offset = (addr & *mask) as usize;
                buffer.borrow_mut().put(size, offset, value);
                Ok(Vec::new())
            }
            Backing::Mmio { device } => {
                let name = region.name;
                device.borrow_mut().put(size, addr, value).map_err(|_| BusError::DeviceFailed {
                    cpu: cpu.label(),
                    addr,
                    reason: name.to_string(),
                })
            }
            Backing::Nop => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    fn ram_mmap() -> Mmap {
        let mut mmap = Mmap::new(CpuId::Master);
        let buf = Rc::new(RefCell::new(Buffer::new(0x1000)));
        mmap.attach(Region::direct("ram", 0x0000_0000, 0x0000_0FFF, 0x0FFF, buf, Perm::READ | Perm::WRITE));
        mmap
    }

    #[test]
    fn read_after_write_round_trips() {
        let mut mmap = ram_mmap();
        mmap.put(4, 0x10, 0xDEAD_BEEF).unwrap();
        assert_eq!(mmap.get(4, 0x10).unwrap().0, 0xDEAD_BEEF);
    }

    #[test]
    fn unmapped_address_is_no_region() {
        let mmap = ram_mmap();
        assert_eq!(
            mmap.get(4, 0x1_0000).unwrap_err(),
            BusError::NoRegion { cpu: "master", addr: 0x1_0000, size: 4 }
        );
    }

    #[test]
    fn write_only_region_rejects_reads() {
        let mut mmap = Mmap::new(CpuId::Master);
        let buf = Rc::new(RefCell::new(Buffer::new(0x10)));
        mmap.attach(Region::direct("wo", 0, 0xF, 0xF, buf, Perm::WRITE));
        assert!(matches!(mmap.get(1, 0), Err(BusError::NoRegion { .. })));
    }

    #[test]
    fn unsupported_size_is_rejected() {
        let mmap = ram_mmap();
        assert!(matches!(mmap.get(3, 0), Err(BusError::UnsupportedSize { .. })));
    }
}
