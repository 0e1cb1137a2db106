//! Core emulation library for the Hikaru arcade board (spec.md §1
//! overview): bus/aperture memory controller, SH CPU interpreter, GPU
//! command processor, the texture and framebuffer DMA engines, the
//! interrupt fabric, and the scanline scheduler that ties them
//! together. `savestate` and `games` implement the on-disk formats the
//! binary in `main.rs` drives this library with.

pub mod buffer;
pub mod bus;
pub mod device;
pub mod error;
pub mod fbdma;
pub mod games;
pub mod gpu;
pub mod idma;
pub mod interrupts;
pub mod machine;
pub mod memctl;
pub mod renderer;
pub mod savestate;
pub mod sh;

pub use error::CoreError;
pub use machine::Machine;
