//! Text I/O: stdout, stdin and the command queue.

use super::{
    arg_u32, check_len, ids, put_u32, signature, AbiError, ExternalBody, ExternalTable, Invocation,
};

/// Longest single `print`.
pub const MAX_PRINT_LEN: u32 = 1024;

pub(crate) fn install(table: &mut ExternalTable) {
    table.insert(signature(ids::PRINT, "print", 8, 0), ExternalBody::Scoped(Box::new(print)));
    table.insert(
        signature(ids::READ_STDIN, "read_stdin", 8, 4),
        ExternalBody::Scoped(Box::new(read_stdin)),
    );
    table.insert(
        signature(ids::NEXT_COMMAND, "next_command", 8, 4),
        ExternalBody::Scoped(Box::new(next_command)),
    );
}

/// `print(ptr, len)`: appends bytes to stdout, shifting out the oldest.
fn print(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    let (ptr, len) = (arg_u32(args, 0), arg_u32(args, 1));
    check_len(len, MAX_PRINT_LEN)?;
    let text = call.memory.read(ptr, len)?.to_vec();
    call.memory.system_regs().append_stdout(&text);
    Ok(())
}

/// `read_stdin(ptr, cap) -> len`: copies a delivered line (truncated to
/// `cap`) or raises the request flag and returns 0.
fn read_stdin(call: &mut Invocation<'_, '_>, args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let (ptr, cap) = (arg_u32(args, 0), arg_u32(args, 1));
    // Validate the destination before consuming the line.
    call.memory.read(ptr, cap)?;
    let mut regs = call.memory.system_regs();
    match regs.take_stdin() {
        Some(line) => {
            let len = line.len().min(cap as usize);
            call.memory.write(ptr, &line[..len])?;
            put_u32(ret, 0, len as u32);
        }
        None => {
            regs.request_stdin();
            put_u32(ret, 0, 0);
        }
    }
    Ok(())
}

/// `next_command(ptr, cap) -> len`: pops the oldest pending command. Returns
/// 0 when none is queued. A command longer than `cap` stays queued.
fn next_command(call: &mut Invocation<'_, '_>, args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let (ptr, cap) = (arg_u32(args, 0), arg_u32(args, 1));
    let (memory, scope) = call.split()?;
    let Some(command) = scope.queues.commands.front() else {
        put_u32(ret, 0, 0);
        return Ok(());
    };
    let len = command.len() as u32;
    check_len(len, cap)?;
    memory.write(ptr, command)?;
    scope.queues.commands.pop();
    put_u32(ret, 0, len);
    Ok(())
}
