//! External-function signatures shared by the frontend and the VM.
//!
//! The frontend only needs names, ids and byte sizes to emit `ext`
//! instructions; the VM owns the actual function table. Arguments travel in
//! registers `r1..` as little-endian words and results come back in `r0`
//! (and `r1` for 8-byte results).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status word returned in `r0` when an external call was rejected.
pub const ABI_FAILURE: u32 = u32::MAX;

/// Status word for a successful call that has nothing else to report.
pub const ABI_OK: u32 = 0;

/// Largest argument block in bytes (six words, `r1..=r6`).
pub const MAX_ARG_BYTES: u8 = 24;

/// Largest result block in bytes (two words, `r0` and `r1`).
pub const MAX_RET_BYTES: u8 = 8;

/// Byte-size contract of one external function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSignature {
    /// Stable numeric id encoded in `ext` instructions.
    pub id: u16,
    /// Name the frontend resolves calls by.
    pub name: String,
    /// Size of the argument block in bytes.
    pub arg_size: u8,
    /// Size of the result block in bytes.
    pub ret_size: u8,
}

impl ExternalSignature {
    /// Builds a signature, checking the byte-size contract.
    pub fn new(
        id: u16,
        name: impl Into<String>,
        arg_size: u8,
        ret_size: u8,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if arg_size % 4 != 0 || ret_size % 4 != 0 {
            return Err(CoreError::InvalidSignature {
                name,
                reason: "sizes must be whole words".into(),
            });
        }
        if arg_size > MAX_ARG_BYTES {
            return Err(CoreError::InvalidSignature {
                name,
                reason: format!("argument block of {} bytes exceeds {}", arg_size, MAX_ARG_BYTES),
            });
        }
        if ret_size > MAX_RET_BYTES {
            return Err(CoreError::InvalidSignature {
                name,
                reason: format!("result block of {} bytes exceeds {}", ret_size, MAX_RET_BYTES),
            });
        }
        Ok(ExternalSignature {
            id,
            name,
            arg_size,
            ret_size,
        })
    }

    /// Number of argument registers consumed (`r1..=rN`).
    pub fn arg_words(&self) -> usize {
        self.arg_size as usize / 4
    }

    /// Number of result registers written (`r0`, then `r1`).
    pub fn ret_words(&self) -> usize {
        self.ret_size as usize / 4
    }
}
