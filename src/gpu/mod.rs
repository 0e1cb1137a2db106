//! GPU command processor (spec.md §4.4).
//!
//! `objects` models the scratch/table/commit/recall/stack discipline
//! spec.md §9 describes for viewport/material/texhead/light/lightset.
//! `vertex` implements the three-slot mesh assembly ring buffer.
//! `opcodes` builds the 512-entry dispatch table; `cp` drives fetch,
//! dispatch, and the call stack/LOD/conditional-branch state machine.

pub mod cp;
pub mod objects;
pub mod opcodes;
pub mod vertex;

pub use cp::CommandProcessor;
