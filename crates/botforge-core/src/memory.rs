//! Per-entity memory image: heap, stack and the mapped I/O window.
//!
//! ```text
//! 0x0000 ┌──────────────┐
//!        │ heap (8 KiB) │
//! 0x2000 ├──────────────┤
//!        │ stack (7 KiB)│  grows down from STACK_TOP
//! 0x3C00 ├──────────────┤
//!        │ mapped I/O   │  system area, then peripheral registers
//! 0x4000 └──────────────┘
//! ```
//!
//! All accessors are bounds-checked and return [`MemoryFault`] instead of
//! panicking, so a bad pointer from a program is always recoverable.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

use crate::peripheral::PERIPHERAL_BASE;

/// Total size of a memory image in bytes.
pub const MEMORY_SIZE: usize = 16 * 1024;

pub const HEAP_BASE: u32 = 0;
pub const HEAP_SIZE: u32 = 8 * 1024;

/// Lowest valid stack address. Pushing below it overflows.
pub const STACK_BASE: u32 = HEAP_BASE + HEAP_SIZE;
/// Initial stack pointer (exclusive upper bound of the stack).
pub const STACK_TOP: u32 = 15 * 1024;

/// First byte of the mapped I/O window.
pub const IO_BASE: u32 = STACK_TOP;
pub const IO_SIZE: u32 = 1024;

/// An access outside the memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory access out of bounds: address {address:#06x}, length {len}")]
pub struct MemoryFault {
    pub address: u32,
    pub len: u32,
}

/// Fixed-size byte buffer owned by one processor entity.
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryImage {
    bytes: Box<[u8]>,
}

impl MemoryImage {
    /// A zeroed image.
    pub fn new() -> Self {
        MemoryImage {
            bytes: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    fn range(&self, address: u32, len: u32) -> Result<Range<usize>, MemoryFault> {
        let start = address as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(MemoryFault { address, len })?;
        Ok(start..end)
    }

    pub fn read(&self, address: u32, len: u32) -> Result<&[u8], MemoryFault> {
        let range = self.range(address, len)?;
        Ok(&self.bytes[range])
    }

    pub fn slice_mut(&mut self, address: u32, len: u32) -> Result<&mut [u8], MemoryFault> {
        let range = self.range(address, len)?;
        Ok(&mut self.bytes[range])
    }

    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryFault> {
        let len = u32::try_from(data.len()).map_err(|_| MemoryFault {
            address,
            len: u32::MAX,
        })?;
        self.slice_mut(address, len)?.copy_from_slice(data);
        Ok(())
    }

    pub fn read_u8(&self, address: u32) -> Result<u8, MemoryFault> {
        Ok(self.read(address, 1)?[0])
    }

    pub fn write_u8(&mut self, address: u32, value: u8) -> Result<(), MemoryFault> {
        self.write(address, &[value])
    }

    pub fn read_u32(&self, address: u32) -> Result<u32, MemoryFault> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.read(address, 4)?);
        Ok(u32::from_le_bytes(word))
    }

    pub fn write_u32(&mut self, address: u32, value: u32) -> Result<(), MemoryFault> {
        self.write(address, &value.to_le_bytes())
    }

    pub fn read_f32(&self, address: u32) -> Result<f32, MemoryFault> {
        self.read_u32(address).map(f32::from_bits)
    }

    pub fn write_f32(&mut self, address: u32, value: f32) -> Result<(), MemoryFault> {
        self.write_u32(address, value.to_bits())
    }

    /// Reads a NUL-terminated string of at most `max` bytes, lossily.
    pub fn read_c_string(&self, address: u32, max: u32) -> Result<String, MemoryFault> {
        let available = (self.bytes.len() as u32).saturating_sub(address).min(max);
        let raw = self.read(address, available)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Zeroes heap, stack and the system I/O area. Peripheral registers are
    /// left alone: they belong to the bridges, not to the program.
    pub fn reset_program_area(&mut self) {
        self.bytes[..PERIPHERAL_BASE as usize].fill(0);
    }

    /// Zeroes the entire image.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The mapped I/O window, offset 0 being `IO_BASE`.
    pub(crate) fn io_window_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[IO_BASE as usize..]
    }

    pub(crate) fn io_window(&self) -> &[u8] {
        &self.bytes[IO_BASE as usize..]
    }
}

impl Default for MemoryImage {
    fn default() -> Self {
        MemoryImage::new()
    }
}

impl fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.bytes.iter().filter(|&&b| b != 0).count();
        f.debug_struct("MemoryImage")
            .field("size", &self.bytes.len())
            .field("nonzero_bytes", &used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_contiguous() {
        assert_eq!(STACK_BASE, 8192);
        assert_eq!(IO_BASE + IO_SIZE, MEMORY_SIZE as u32);
        assert!(PERIPHERAL_BASE > IO_BASE && PERIPHERAL_BASE < IO_BASE + IO_SIZE);
    }

    #[test]
    fn word_access_is_little_endian() {
        let mut mem = MemoryImage::new();
        mem.write_u32(100, 0x1122_3344).unwrap();
        assert_eq!(mem.read_u8(100).unwrap(), 0x44);
        assert_eq!(mem.read_u32(100).unwrap(), 0x1122_3344);
    }

    #[test]
    fn out_of_bounds_is_a_fault() {
        let mut mem = MemoryImage::new();
        let last = MEMORY_SIZE as u32 - 4;
        assert!(mem.write_u32(last, 1).is_ok());
        assert_eq!(
            mem.write_u32(last + 1, 1),
            Err(MemoryFault {
                address: last + 1,
                len: 4
            })
        );
        assert!(mem.read(u32::MAX, 2).is_err());
    }

    #[test]
    fn reset_keeps_peripheral_registers() {
        let mut mem = MemoryImage::new();
        mem.write_u32(16, 5).unwrap();
        mem.write_u32(IO_BASE, 6).unwrap();
        mem.write_u32(PERIPHERAL_BASE, 7).unwrap();
        mem.reset_program_area();
        assert_eq!(mem.read_u32(16).unwrap(), 0);
        assert_eq!(mem.read_u32(IO_BASE).unwrap(), 0);
        assert_eq!(mem.read_u32(PERIPHERAL_BASE).unwrap(), 7);
    }

    #[test]
    fn c_string_stops_at_nul_and_end() {
        let mut mem = MemoryImage::new();
        mem.write(10, b"boom\0tail").unwrap();
        assert_eq!(mem.read_c_string(10, 64).unwrap(), "boom");
        let end = MEMORY_SIZE as u32 - 2;
        mem.write(end, b"ok").unwrap();
        assert_eq!(mem.read_c_string(end, 64).unwrap(), "ok");
    }
}
