//! External function ABI.
//!
//! Programs call into the host with `ext <id>`. The VM looks the id up in an
//! [`ExternalTable`], copies `arg_size` bytes out of `r1..`, runs the
//! function and copies `ret_size` bytes back into `r0` (and `r1`).
//!
//! Two flavors exist:
//!
//! - **Stateless** functions see only their argument and result blocks.
//! - **Scoped** functions additionally receive an [`Invocation`]: the
//!   calling entity's memory image plus an explicit [`ExecutionContext`].
//!   Functions that need the entity (transmit, GUI, pendrive) fail with
//!   [`AbiError::NoContext`] when called detached.
//!
//! Misuse never traps. The VM turns an [`AbiError`] into [`ABI_FAILURE`] in
//! `r0`, logs a warning and continues with the next instruction.
//!
//! [`ABI_FAILURE`]: botforge_core::ABI_FAILURE

pub mod comms;
pub mod console;
pub mod context;
pub mod debug;
pub mod gui;
pub mod pendrive;
pub mod stateless;

use std::fmt;

use thiserror::Error;

use botforge_core::{CoreError, ExternalSignature, MemoryFault, MemoryImage};

use self::context::{EntityScope, ExecutionContext};

/// Stable ids of the standard external functions.
pub mod ids {
    pub const SQRT: u16 = 0;
    pub const SIN: u16 = 1;
    pub const COS: u16 = 2;
    pub const ATAN2: u16 = 3;
    pub const RANDOM: u16 = 4;

    pub const PRINT: u16 = 16;
    pub const READ_STDIN: u16 = 17;
    pub const TRANSMIT: u16 = 18;
    pub const TRANSMIT_BEAM: u16 = 19;
    pub const RECEIVE: u16 = 20;
    pub const NEXT_COMMAND: u16 = 21;
    pub const DEBUG_LINE: u16 = 22;
    pub const DEBUG_LABEL: u16 = 23;
    pub const TO_LOCAL: u16 = 24;
    pub const TO_WORLD: u16 = 25;
    pub const TIME: u16 = 26;
    pub const GUI_CREATE: u16 = 27;
    pub const GUI_UPDATE: u16 = 28;
    pub const GUI_DESTROY: u16 = 29;
    pub const PENDRIVE_READ: u16 = 30;
    pub const PENDRIVE_WRITE: u16 = 31;
    pub const GUI_POLL: u16 = 32;
}

/// Reasons an external call is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("bad pointer: {0}")]
    BadPointer(#[from] MemoryFault),

    #[error("length {len} exceeds limit {limit}")]
    Oversized { len: u32, limit: u32 },

    #[error("entity has no {0}")]
    MissingDevice(&'static str),

    #[error("called without an entity context")]
    NoContext,

    #[error("queue is full")]
    QueueFull,

    #[error("gui element {id} belongs to another team")]
    NotOwner { id: u32 },

    #[error("unknown gui element {id}")]
    UnknownElement { id: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Errors building an [`ExternalTable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("external id {id} registered twice")]
    DuplicateId { id: u16 },

    #[error("external name '{name}' registered twice")]
    DuplicateName { name: String },

    #[error(transparent)]
    InvalidSignature(#[from] CoreError),
}

pub type StatelessFn = dyn Fn(&[u8], &mut [u8]) -> Result<(), AbiError> + Send + Sync;

pub type ScopedFn =
    dyn Fn(&mut Invocation<'_, '_>, &[u8], &mut [u8]) -> Result<(), AbiError> + Send + Sync;

pub enum ExternalBody {
    Stateless(Box<StatelessFn>),
    Scoped(Box<ScopedFn>),
}

impl fmt::Debug for ExternalBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalBody::Stateless(_) => f.write_str("Stateless"),
            ExternalBody::Scoped(_) => f.write_str("Scoped"),
        }
    }
}

#[derive(Debug)]
pub struct ExternalFunction {
    pub signature: ExternalSignature,
    pub body: ExternalBody,
}

impl ExternalFunction {
    /// Runs the function. `args` and `ret` must already be sized to the
    /// signature.
    pub fn call(
        &self,
        invocation: &mut Invocation<'_, '_>,
        args: &[u8],
        ret: &mut [u8],
    ) -> Result<(), AbiError> {
        match &self.body {
            ExternalBody::Stateless(body) => body(args, ret),
            ExternalBody::Scoped(body) => body(invocation, args, ret),
        }
    }
}

/// What a scoped function gets to touch during one call.
pub struct Invocation<'a, 'ctx> {
    pub memory: &'a mut MemoryImage,
    pub context: &'a mut ExecutionContext<'ctx>,
}

impl<'ctx> Invocation<'_, 'ctx> {
    pub fn scope(&mut self) -> Result<&mut EntityScope<'ctx>, AbiError> {
        match self.context {
            ExecutionContext::Entity(scope) => Ok(scope),
            ExecutionContext::Detached => Err(AbiError::NoContext),
        }
    }

    /// Memory and entity scope borrowed side by side.
    pub fn split(&mut self) -> Result<(&mut MemoryImage, &mut EntityScope<'ctx>), AbiError> {
        match self.context {
            ExecutionContext::Entity(scope) => Ok((&mut *self.memory, scope)),
            ExecutionContext::Detached => Err(AbiError::NoContext),
        }
    }
}

/// Functions indexed by their stable id.
#[derive(Debug, Default)]
pub struct ExternalTable {
    functions: Vec<Option<ExternalFunction>>,
}

impl ExternalTable {
    pub fn new() -> Self {
        ExternalTable::default()
    }

    /// Every standard function.
    pub fn standard() -> Self {
        let mut table = ExternalTable::new();
        stateless::install(&mut table);
        console::install(&mut table);
        comms::install(&mut table);
        debug::install(&mut table);
        gui::install(&mut table);
        pendrive::install(&mut table);
        table
    }

    pub fn register_stateless<F>(
        &mut self,
        signature: ExternalSignature,
        body: F,
    ) -> Result<(), TableError>
    where
        F: Fn(&[u8], &mut [u8]) -> Result<(), AbiError> + Send + Sync + 'static,
    {
        self.register(signature, ExternalBody::Stateless(Box::new(body)))
    }

    pub fn register_scoped<F>(&mut self, signature: ExternalSignature, body: F) -> Result<(), TableError>
    where
        F: Fn(&mut Invocation<'_, '_>, &[u8], &mut [u8]) -> Result<(), AbiError>
            + Send
            + Sync
            + 'static,
    {
        self.register(signature, ExternalBody::Scoped(Box::new(body)))
    }

    fn register(&mut self, signature: ExternalSignature, body: ExternalBody) -> Result<(), TableError> {
        // Re-run the constructor checks: the fields are public.
        let signature = ExternalSignature::new(
            signature.id,
            signature.name,
            signature.arg_size,
            signature.ret_size,
        )?;
        if self.get(i32::from(signature.id)).is_some() {
            return Err(TableError::DuplicateId { id: signature.id });
        }
        if self.signatures().any(|s| s.name == signature.name) {
            return Err(TableError::DuplicateName {
                name: signature.name,
            });
        }
        self.insert(signature, body);
        Ok(())
    }

    /// Stores a function whose signature is known to be well formed.
    pub(crate) fn insert(&mut self, signature: ExternalSignature, body: ExternalBody) {
        let index = usize::from(signature.id);
        if self.functions.len() <= index {
            self.functions.resize_with(index + 1, || None);
        }
        self.functions[index] = Some(ExternalFunction { signature, body });
    }

    /// Function registered under `id`. Negative ids are never registered.
    pub fn get(&self, id: i32) -> Option<&ExternalFunction> {
        let index = usize::try_from(id).ok()?;
        self.functions.get(index)?.as_ref()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &ExternalSignature> {
        self.functions
            .iter()
            .flatten()
            .map(|function| &function.signature)
    }

    /// Owned signature list, as handed to the compiler frontend.
    pub fn signature_list(&self) -> Vec<ExternalSignature> {
        self.signatures().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.functions.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Argument and result block helpers
// ---------------------------------------------------------------------------

/// Little-endian word `index` of an argument block. Missing words read as 0.
pub(crate) fn arg_u32(args: &[u8], index: usize) -> u32 {
    let start = index * 4;
    match args.get(start..start + 4) {
        Some(bytes) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        None => 0,
    }
}

pub(crate) fn arg_f32(args: &[u8], index: usize) -> f32 {
    f32::from_bits(arg_u32(args, index))
}

pub(crate) fn put_u32(ret: &mut [u8], index: usize, value: u32) {
    let start = index * 4;
    if let Some(slot) = ret.get_mut(start..start + 4) {
        slot.copy_from_slice(&value.to_le_bytes());
    }
}

pub(crate) fn put_f32(ret: &mut [u8], index: usize, value: f32) {
    put_u32(ret, index, value.to_bits());
}

/// Checks a caller-supplied length against a hard limit.
pub(crate) fn check_len(len: u32, limit: u32) -> Result<(), AbiError> {
    if len > limit {
        return Err(AbiError::Oversized { len, limit });
    }
    Ok(())
}

/// Builds a standard signature. Sizes are whole words within the limits,
/// which `standard_signatures_are_valid` checks.
pub(crate) fn signature(id: u16, name: &str, arg_size: u8, ret_size: u8) -> ExternalSignature {
    ExternalSignature {
        id,
        name: name.to_string(),
        arg_size,
        ret_size,
    }
}
