//! Debug drawing, coordinate transforms and the wall clock.

use botforge_core::Vec2;

use super::context::{DebugLabel, DebugLine};
use super::{
    arg_f32, arg_u32, check_len, ids, put_f32, put_u32, signature, AbiError, ExternalBody,
    ExternalTable, Invocation,
};

/// Longest debug label text.
pub const MAX_LABEL_LEN: u32 = 64;

pub(crate) fn install(table: &mut ExternalTable) {
    table.insert(
        signature(ids::DEBUG_LINE, "debug_line", 20, 0),
        ExternalBody::Scoped(Box::new(debug_line)),
    );
    table.insert(
        signature(ids::DEBUG_LABEL, "debug_label", 16, 0),
        ExternalBody::Scoped(Box::new(debug_label)),
    );
    table.insert(
        signature(ids::TO_LOCAL, "to_local", 8, 8),
        ExternalBody::Scoped(Box::new(to_local)),
    );
    table.insert(
        signature(ids::TO_WORLD, "to_world", 8, 8),
        ExternalBody::Scoped(Box::new(to_world)),
    );
    table.insert(signature(ids::TIME, "time", 0, 8), ExternalBody::Scoped(Box::new(time)));
}

/// `debug_line(x1, y1, x2, y2, color)` in world coordinates.
fn debug_line(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    let scope = call.scope()?;
    if scope.outbox.is_full() {
        return Err(AbiError::QueueFull);
    }
    let line = DebugLine {
        entity: scope.entity,
        from: Vec2::new(arg_f32(args, 0), arg_f32(args, 1)),
        to: Vec2::new(arg_f32(args, 2), arg_f32(args, 3)),
        color: arg_u32(args, 4),
    };
    scope.outbox.debug_lines.push(line);
    Ok(())
}

/// `debug_label(x, y, ptr, len)`.
fn debug_label(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    let (ptr, len) = (arg_u32(args, 2), arg_u32(args, 3));
    check_len(len, MAX_LABEL_LEN)?;
    let (memory, scope) = call.split()?;
    if scope.outbox.is_full() {
        return Err(AbiError::QueueFull);
    }
    let text = String::from_utf8_lossy(memory.read(ptr, len)?).into_owned();
    scope.outbox.debug_labels.push(DebugLabel {
        entity: scope.entity,
        position: Vec2::new(arg_f32(args, 0), arg_f32(args, 1)),
        text,
    });
    Ok(())
}

/// `to_local(x, y) -> (x, y)`: world point into the entity's frame.
fn to_local(call: &mut Invocation<'_, '_>, args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let transform = call.scope()?.transform;
    let local = transform.to_local(Vec2::new(arg_f32(args, 0), arg_f32(args, 1)));
    put_f32(ret, 0, local.x);
    put_f32(ret, 1, local.y);
    Ok(())
}

/// `to_world(x, y) -> (x, y)`.
fn to_world(call: &mut Invocation<'_, '_>, args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let transform = call.scope()?.transform;
    let world = transform.to_world(Vec2::new(arg_f32(args, 0), arg_f32(args, 1)));
    put_f32(ret, 0, world.x);
    put_f32(ret, 1, world.y);
    Ok(())
}

/// `time() -> u64` milliseconds, low word in `r0`.
fn time(call: &mut Invocation<'_, '_>, _args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let ms = call.scope()?.wall_clock_ms;
    put_u32(ret, 0, ms as u32);
    put_u32(ret, 1, (ms >> 32) as u32);
    Ok(())
}
