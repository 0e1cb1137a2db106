//! Versioned savestate container (spec.md §3, §6): a fixed 32-byte
//! ASCII header followed by the concatenated little-endian payloads of
//! every registered buffer then every registered device, in the order
//! they were registered at machine construction.
//!
//! Grounded on `original_source/src/vk/state.c`'s `vk_state_new`/
//! `_put`/`_get`, which gates every call on a runtime mode flag
//! (`STATE_SAVE`/`STATE_LOAD`) and returns `-1` on mismatch. That check
//! is tightened here into two distinct Rust types so writing to a
//! reader (or vice versa) is a compile error instead of a logged
//! failure.

use std::io::{Read, Write};

use crate::error::StateError;
use crate::machine::Machine;

const VERSION: u64 = 1;
const HEADER_LEN: usize = 32;

fn header_bytes() -> [u8; HEADER_LEN] {
    let text = format!("valkyrie state {VERSION:016x}\n");
    let mut out = [0u8; HEADER_LEN];
    out.copy_from_slice(text.as_bytes());
    out
}

/// Serializes a machine's buffers and devices, in registration order,
/// into a single byte vector prefixed with the header.
pub struct SaveWriter {
    buf: Vec<u8>,
}

impl SaveWriter {
    pub fn new() -> Self {
        SaveWriter { buf: header_bytes().to_vec() }
    }

    /// Appends every buffer then every device's state (spec.md §3
    /// "registered in the order they were registered at machine
    /// construction").
    pub fn write_machine(&mut self, machine: &Machine) {
        for buffer in machine.buffers() {
            self.buf.extend_from_slice(buffer.borrow().as_slice());
        }
        for device in machine.devices() {
            device.borrow().save_state(&mut self.buf);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_to<W: Write>(self, mut out: W) -> Result<(), StateError> {
        out.write_all(&self.buf)?;
        Ok(())
    }
}

impl Default for SaveWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a savestate payload back into a machine's buffers and devices,
/// verifying the header before touching any state.
pub struct SaveReader<'a> {
    cursor: &'a [u8],
}

impl<'a> SaveReader<'a> {
    /// Validates the 32-byte header exactly (spec.md §3 "Readers must
    /// verify the header exactly") before exposing the payload cursor.
    pub fn new(bytes: &'a [u8]) -> Result<Self, StateError> {
        if bytes.len() < HEADER_LEN {
            return Err(StateError::Truncated { expected: HEADER_LEN, got: bytes.len() });
        }
        let (header, rest) = bytes.split_at(HEADER_LEN);
        let expected = header_bytes();
        if header != expected {
            return Err(StateError::HeaderMismatch {
                expected: String::from_utf8_lossy(&expected).into_owned(),
                found: String::from_utf8_lossy(header).into_owned(),
            });
        }
        Ok(SaveReader { cursor: rest })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Vec<u8>, StateError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Restores every buffer then every device's state, in the same
    /// registration order `SaveWriter::write_machine` walked.
    pub fn read_machine(&mut self, machine: &Machine) -> Result<(), StateError> {
        for buffer in machine.buffers() {
            let len = buffer.borrow().len();
            if self.cursor.len() < len {
                return Err(StateError::Truncated { expected: len, got: self.cursor.len() });
            }
            let (chunk, rest) = self.cursor.split_at(len);
            buffer.borrow_mut().as_mut_slice().copy_from_slice(chunk);
            self.cursor = rest;
        }
        for device in machine.devices() {
            device.borrow_mut().load_state(&mut self.cursor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memctl::BankConfig;

    #[test]
    fn header_is_exactly_32_bytes_and_round_trips() {
        let header = header_bytes();
        assert_eq!(header.len(), HEADER_LEN);
        assert!(SaveReader::new(&header).is_ok());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let machine = Machine::new(BankConfig::default());
        let mut writer = SaveWriter::new();
        writer.write_machine(&machine);
        let bytes = writer.into_bytes();
        let truncated = &bytes[..bytes.len() - 4];
        let mut reader = SaveReader::new(truncated).unwrap();
        assert!(reader.read_machine(&machine).is_err());
    }

    #[test]
    fn mismatched_header_is_rejected() {
        let mut bad = header_bytes();
        bad[0] = b'X';
        assert!(matches!(SaveReader::new(&bad), Err(StateError::HeaderMismatch { .. })));
    }

    #[test]
    fn save_then_load_restores_buffer_contents() {
        let machine = Machine::new(BankConfig::default());
        machine.master_ram.borrow_mut().put(4, 0x10, 0xDEAD_BEEF);
        let mut writer = SaveWriter::new();
        writer.write_machine(&machine);
        let bytes = writer.into_bytes();

        let other = Machine::new(BankConfig::default());
        assert_eq!(other.master_ram.borrow().get(4, 0x10), 0);
        let mut reader = SaveReader::new(&bytes).unwrap();
        reader.read_machine(&other).unwrap();
        assert_eq!(other.master_ram.borrow().get(4, 0x10), 0xDEAD_BEEF);
    }
}
