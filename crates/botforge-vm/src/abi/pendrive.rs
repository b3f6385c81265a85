//! Removable block storage.

use serde::{Deserialize, Serialize};

use super::{
    arg_u32, check_len, ids, put_u32, signature, AbiError, ExternalBody, ExternalTable, Invocation,
};

pub const BLOCK_SIZE: u32 = 1024;

/// Fixed number of zero-initialized blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pendrive {
    blocks: Vec<Vec<u8>>,
}

impl Pendrive {
    pub fn new(block_count: usize) -> Self {
        Pendrive {
            blocks: vec![vec![0u8; BLOCK_SIZE as usize]; block_count],
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: u32) -> Result<&[u8], AbiError> {
        self.blocks
            .get(index as usize)
            .map(Vec::as_slice)
            .ok_or(AbiError::InvalidArgument("block out of range"))
    }

    /// Overwrites the start of a block.
    pub fn write_block(&mut self, index: u32, data: &[u8]) -> Result<(), AbiError> {
        check_len(data.len() as u32, BLOCK_SIZE)?;
        let block = self
            .blocks
            .get_mut(index as usize)
            .ok_or(AbiError::InvalidArgument("block out of range"))?;
        block[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

pub(crate) fn install(table: &mut ExternalTable) {
    table.insert(
        signature(ids::PENDRIVE_READ, "pendrive_read", 12, 4),
        ExternalBody::Scoped(Box::new(pendrive_read)),
    );
    table.insert(
        signature(ids::PENDRIVE_WRITE, "pendrive_write", 12, 0),
        ExternalBody::Scoped(Box::new(pendrive_write)),
    );
}

/// `pendrive_read(block, ptr, len) -> len`.
fn pendrive_read(call: &mut Invocation<'_, '_>, args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let (index, ptr, len) = (arg_u32(args, 0), arg_u32(args, 1), arg_u32(args, 2));
    check_len(len, BLOCK_SIZE)?;
    let (memory, scope) = call.split()?;
    let drive = scope
        .pendrive
        .as_deref()
        .ok_or(AbiError::MissingDevice("pendrive"))?;
    let block = drive.block(index)?;
    memory.write(ptr, &block[..len as usize])?;
    put_u32(ret, 0, len);
    Ok(())
}

/// `pendrive_write(block, ptr, len)`.
fn pendrive_write(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    let (index, ptr, len) = (arg_u32(args, 0), arg_u32(args, 1), arg_u32(args, 2));
    check_len(len, BLOCK_SIZE)?;
    let (memory, scope) = call.split()?;
    let drive = scope
        .pendrive
        .as_deref_mut()
        .ok_or(AbiError::MissingDevice("pendrive"))?;
    drive.write_block(index, memory.read(ptr, len)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_start_zeroed() {
        let drive = Pendrive::new(2);
        assert_eq!(drive.block_count(), 2);
        assert!(drive.block(1).unwrap().iter().all(|&b| b == 0));
        assert!(drive.block(2).is_err());
    }

    #[test]
    fn write_is_bounds_checked() {
        let mut drive = Pendrive::new(1);
        drive.write_block(0, b"saved").unwrap();
        assert_eq!(&drive.block(0).unwrap()[..5], b"saved");
        assert_eq!(
            drive.write_block(0, &[0u8; 2000]),
            Err(AbiError::Oversized {
                len: 2000,
                limit: BLOCK_SIZE
            })
        );
        assert!(drive.write_block(1, b"x").is_err());
    }
}
