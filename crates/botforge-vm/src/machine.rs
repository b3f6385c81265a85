//! The instruction interpreter.
//!
//! A [`Machine`] borrows one processor's registers and memory for the
//! duration of a single slice and executes until the budget runs out, the
//! program yields, or a [`Trap`] stops it. Registers are raw words: integer
//! ops wrap, float ops reinterpret the bits as `f32`, and nothing converts
//! implicitly.

use serde::{Deserialize, Serialize};
use tracing::warn;

use botforge_core::abi::{MAX_ARG_BYTES, MAX_RET_BYTES};
use botforge_core::isa::REGISTER_COUNT;
use botforge_core::memory::{STACK_BASE, STACK_TOP};
use botforge_core::{Bytecode, Instruction, MemoryFault, MemoryImage, Opcode, ABI_FAILURE, ABI_OK};

use crate::abi::context::ExecutionContext;
use crate::abi::{ExternalTable, Invocation};
use crate::signal::Trap;
use crate::trace::{Trace, TraceEntry};

/// Register file. `pc` is an instruction index, `sp` a byte address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub gpr: [u32; REGISTER_COUNT],
    pub pc: u32,
    pub sp: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            gpr: [0; REGISTER_COUNT],
            pc: 0,
            sp: STACK_TOP,
        }
    }
}

/// Why a slice ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    BudgetExhausted,
    Yielded,
    Stopped(Trap),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Instructions executed, including the one that trapped or yielded.
    pub executed: u32,
    pub outcome: RunOutcome,
}

enum Flow {
    Continue,
    Yield,
}

pub struct Machine<'a, 'ctx> {
    pub registers: &'a mut Registers,
    pub memory: &'a mut MemoryImage,
    pub bytecode: &'a Bytecode,
    pub externals: &'a ExternalTable,
    pub context: &'a mut ExecutionContext<'ctx>,
    pub trace: Option<&'a mut Trace>,
}

impl Machine<'_, '_> {
    /// Executes at most `budget` instructions.
    pub fn run(&mut self, budget: u32) -> RunReport {
        let mut executed = 0;
        while executed < budget {
            let pc = self.registers.pc;
            let instruction = match self.bytecode.fetch(pc) {
                // Running off the end halts.
                None => return report(executed, RunOutcome::Stopped(Trap::Halt)),
                Some(Err(err)) => {
                    let trap = Trap::IllegalInstruction {
                        pc,
                        reason: err.to_string(),
                    };
                    return report(executed + 1, RunOutcome::Stopped(trap));
                }
                Some(Ok(instruction)) => instruction,
            };
            executed += 1;

            let flow = self.step(pc, instruction);
            if let Some(trace) = self.trace.as_deref_mut() {
                trace.record(TraceEntry {
                    pc,
                    instruction,
                    registers: self.registers.gpr,
                });
            }
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Yield) => return report(executed, RunOutcome::Yielded),
                Err(trap) => return report(executed, RunOutcome::Stopped(trap)),
            }
        }
        report(executed, RunOutcome::BudgetExhausted)
    }

    fn reg(&self, index: u8) -> u32 {
        self.registers.gpr[usize::from(index)]
    }

    fn set(&mut self, index: u8, value: u32) {
        self.registers.gpr[usize::from(index)] = value;
    }

    fn int_op(&mut self, i: Instruction, op: impl Fn(u32, u32) -> u32) {
        let value = op(self.reg(i.b), self.reg(i.c));
        self.set(i.a, value);
    }

    fn float_op(&mut self, i: Instruction, op: impl Fn(f32, f32) -> f32) {
        let value = op(f32::from_bits(self.reg(i.b)), f32::from_bits(self.reg(i.c)));
        self.set(i.a, value.to_bits());
    }

    fn compare(&mut self, i: Instruction, op: impl Fn(u32, u32) -> bool) {
        let value = op(self.reg(i.b), self.reg(i.c));
        self.set(i.a, u32::from(value));
    }

    fn address(&self, i: Instruction) -> u32 {
        self.reg(i.b).wrapping_add(i.imm as u32)
    }

    fn step(&mut self, pc: u32, i: Instruction) -> Result<Flow, Trap> {
        let fault = |fault: MemoryFault| Trap::MemoryFault { pc, fault };
        let mut next = pc.wrapping_add(1);

        match i.op {
            Opcode::Nop => {}
            Opcode::Halt => return Err(Trap::Halt),
            Opcode::Crash => {
                return Err(Trap::UserCrash {
                    pc,
                    message: self.reg(i.a),
                })
            }
            Opcode::Li => self.set(i.a, i.imm as u32),
            Opcode::Mov => self.set(i.a, self.reg(i.b)),
            Opcode::Addi => self.set(i.a, self.reg(i.b).wrapping_add(i.imm as u32)),
            Opcode::Add => self.int_op(i, u32::wrapping_add),
            Opcode::Sub => self.int_op(i, u32::wrapping_sub),
            Opcode::Mul => self.int_op(i, u32::wrapping_mul),
            Opcode::Div | Opcode::Rem => {
                let (lhs, rhs) = (self.reg(i.b) as i32, self.reg(i.c) as i32);
                if rhs == 0 {
                    return Err(Trap::DivideByZero { pc });
                }
                let value = if i.op == Opcode::Div {
                    lhs.wrapping_div(rhs)
                } else {
                    lhs.wrapping_rem(rhs)
                };
                self.set(i.a, value as u32);
            }
            Opcode::And => self.int_op(i, |a, b| a & b),
            Opcode::Or => self.int_op(i, |a, b| a | b),
            Opcode::Xor => self.int_op(i, |a, b| a ^ b),
            Opcode::Shl => self.int_op(i, u32::wrapping_shl),
            // Logical shift; the amount is taken mod 32.
            Opcode::Shr => self.int_op(i, u32::wrapping_shr),
            Opcode::FAdd => self.float_op(i, |a, b| a + b),
            Opcode::FSub => self.float_op(i, |a, b| a - b),
            Opcode::FMul => self.float_op(i, |a, b| a * b),
            Opcode::FDiv => self.float_op(i, |a, b| a / b),
            Opcode::ItoF => self.set(i.a, (self.reg(i.b) as i32 as f32).to_bits()),
            // Saturating; NaN becomes 0.
            Opcode::FtoI => self.set(i.a, f32::from_bits(self.reg(i.b)) as i32 as u32),
            Opcode::Eq => self.compare(i, |a, b| a == b),
            Opcode::Lt => self.compare(i, |a, b| (a as i32) < (b as i32)),
            Opcode::Le => self.compare(i, |a, b| (a as i32) <= (b as i32)),
            Opcode::FLt => self.compare(i, |a, b| f32::from_bits(a) < f32::from_bits(b)),
            Opcode::Jmp => next = i.imm as u32,
            Opcode::Jz => {
                if self.reg(i.a) == 0 {
                    next = i.imm as u32;
                }
            }
            Opcode::Jnz => {
                if self.reg(i.a) != 0 {
                    next = i.imm as u32;
                }
            }
            Opcode::Ld => {
                let value = self.memory.read_u32(self.address(i)).map_err(fault)?;
                self.set(i.a, value);
            }
            Opcode::St => {
                let address = self.address(i);
                self.memory.write_u32(address, self.reg(i.a)).map_err(fault)?;
            }
            Opcode::Ldb => {
                let value = self.memory.read_u8(self.address(i)).map_err(fault)?;
                self.set(i.a, u32::from(value));
            }
            Opcode::Stb => {
                let address = self.address(i);
                self.memory
                    .write_u8(address, self.reg(i.a) as u8)
                    .map_err(fault)?;
            }
            Opcode::Push => self.push(pc, self.reg(i.a))?,
            Opcode::Pop => {
                let value = self.pop(pc)?;
                self.set(i.a, value);
            }
            Opcode::Call => {
                self.push(pc, next)?;
                next = i.imm as u32;
            }
            Opcode::Ret => {
                // Returning from the outermost frame ends the program.
                if self.registers.sp >= STACK_TOP {
                    return Err(Trap::Halt);
                }
                next = self.pop(pc)?;
            }
            Opcode::Ext => self.call_external(pc, i.imm)?,
            Opcode::Yield => {
                self.registers.pc = next;
                return Ok(Flow::Yield);
            }
        }

        self.registers.pc = next;
        Ok(Flow::Continue)
    }

    fn push(&mut self, pc: u32, value: u32) -> Result<(), Trap> {
        let sp = self.registers.sp;
        if sp > STACK_TOP || sp < STACK_BASE + 4 {
            return Err(Trap::StackOverflow { pc });
        }
        let sp = sp - 4;
        self.memory
            .write_u32(sp, value)
            .map_err(|fault| Trap::MemoryFault { pc, fault })?;
        self.registers.sp = sp;
        Ok(())
    }

    fn pop(&mut self, pc: u32) -> Result<u32, Trap> {
        let sp = self.registers.sp;
        if sp < STACK_BASE || sp > STACK_TOP - 4 {
            return Err(Trap::StackOverflow { pc });
        }
        let value = self
            .memory
            .read_u32(sp)
            .map_err(|fault| Trap::MemoryFault { pc, fault })?;
        self.registers.sp = sp + 4;
        Ok(value)
    }

    fn call_external(&mut self, pc: u32, id: i32) -> Result<(), Trap> {
        let function = self
            .externals
            .get(id)
            .ok_or(Trap::UndefinedExternalFunction { pc, id })?;
        let signature = &function.signature;

        let mut args = [0u8; MAX_ARG_BYTES as usize];
        for (word, chunk) in args.chunks_exact_mut(4).take(signature.arg_words()).enumerate() {
            chunk.copy_from_slice(&self.registers.gpr[1 + word].to_le_bytes());
        }
        let mut ret = [0u8; MAX_RET_BYTES as usize];
        let arg_len = usize::from(signature.arg_size).min(args.len());
        let ret_len = usize::from(signature.ret_size).min(ret.len());

        let mut invocation = Invocation {
            memory: &mut *self.memory,
            context: &mut *self.context,
        };
        match function.call(&mut invocation, &args[..arg_len], &mut ret[..ret_len]) {
            Ok(()) if ret_len == 0 => self.registers.gpr[0] = ABI_OK,
            Ok(()) => {
                for (word, chunk) in ret[..ret_len].chunks_exact(4).enumerate() {
                    self.registers.gpr[word] =
                        u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            Err(err) => {
                warn!(external = %signature.name, pc, error = %err, "external call rejected");
                self.registers.gpr[0] = ABI_FAILURE;
            }
        }
        Ok(())
    }
}

fn report(executed: u32, outcome: RunOutcome) -> RunReport {
    RunReport { executed, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use botforge_core::Opcode::*;

    // -----------------------------------------------------------------------
    // Test helpers
    // -----------------------------------------------------------------------

    fn ins(op: Opcode, a: u8, b: u8, c: u8, imm: i32) -> Instruction {
        Instruction::new(op, a, b, c, imm)
    }

    struct Harness {
        registers: Registers,
        memory: MemoryImage,
        bytecode: Bytecode,
        externals: ExternalTable,
    }

    impl Harness {
        fn new(program: &[Instruction]) -> Self {
            Harness {
                registers: Registers::default(),
                memory: MemoryImage::new(),
                bytecode: Bytecode::from_instructions(program),
                externals: ExternalTable::standard(),
            }
        }

        fn run(&mut self, budget: u32) -> RunReport {
            let mut context = ExecutionContext::Detached;
            let mut machine = Machine {
                registers: &mut self.registers,
                memory: &mut self.memory,
                bytecode: &self.bytecode,
                externals: &self.externals,
                context: &mut context,
                trace: None,
            };
            machine.run(budget)
        }

        fn signal(&mut self, budget: u32) -> Option<Signal> {
            match self.run(budget).outcome {
                RunOutcome::Stopped(trap) => Some(trap.signal()),
                _ => None,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Arithmetic
    // -----------------------------------------------------------------------

    #[test]
    fn integer_arithmetic_wraps() {
        let mut h = Harness::new(&[
            ins(Li, 1, 0, 0, i32::MAX),
            ins(Addi, 2, 1, 0, 1),
            ins(Li, 3, 0, 0, -7),
            ins(Li, 4, 0, 0, 2),
            ins(Div, 5, 3, 4, 0),
            ins(Rem, 6, 3, 4, 0),
            ins(Shr, 7, 3, 4, 0),
            ins(Halt, 0, 0, 0, 0),
        ]);
        h.run(100);
        let r = h.registers.gpr;
        assert_eq!(r[2], i32::MIN as u32);
        assert_eq!(r[5] as i32, -3);
        assert_eq!(r[6] as i32, -1);
        assert_eq!(r[7], (-7i32 as u32) >> 2);
    }

    #[test]
    fn floats_need_explicit_conversion() {
        let mut h = Harness::new(&[
            ins(Li, 1, 0, 0, 3),
            ins(ItoF, 2, 1, 0, 0),
            ins(Li, 3, 0, 0, 1.5f32.to_bits() as i32),
            ins(FMul, 4, 2, 3, 0),
            ins(FtoI, 5, 4, 0, 0),
            ins(FLt, 6, 3, 2, 0),
            ins(Halt, 0, 0, 0, 0),
        ]);
        h.run(100);
        assert_eq!(f32::from_bits(h.registers.gpr[4]), 4.5);
        assert_eq!(h.registers.gpr[5], 4);
        assert_eq!(h.registers.gpr[6], 1);
    }

    #[test]
    fn divide_by_zero_traps() {
        let mut h = Harness::new(&[ins(Li, 1, 0, 0, 5), ins(Div, 2, 1, 0, 0)]);
        assert_eq!(h.signal(10), Some(Signal::DivideByZero));
    }

    // -----------------------------------------------------------------------
    // Control flow and stack
    // -----------------------------------------------------------------------

    #[test]
    fn loop_counts_down() {
        let mut h = Harness::new(&[
            ins(Li, 1, 0, 0, 5),
            ins(Addi, 2, 2, 0, 3),
            ins(Addi, 1, 1, 0, -1),
            ins(Jnz, 1, 0, 0, 1),
            ins(Halt, 0, 0, 0, 0),
        ]);
        assert_eq!(h.signal(1000), Some(Signal::Halt));
        assert_eq!(h.registers.gpr[2], 15);
    }

    #[test]
    fn call_and_ret() {
        let mut h = Harness::new(&[
            ins(Call, 0, 0, 0, 3),
            ins(Li, 2, 0, 0, 9),
            ins(Halt, 0, 0, 0, 0),
            ins(Li, 1, 0, 0, 4),
            ins(Ret, 0, 0, 0, 0),
        ]);
        assert_eq!(h.signal(100), Some(Signal::Halt));
        assert_eq!(h.registers.gpr[1], 4);
        assert_eq!(h.registers.gpr[2], 9);
        assert_eq!(h.registers.sp, STACK_TOP);
    }

    #[test]
    fn ret_on_empty_stack_halts() {
        let mut h = Harness::new(&[ins(Ret, 0, 0, 0, 0)]);
        assert_eq!(h.signal(10), Some(Signal::Halt));
    }

    #[test]
    fn running_off_the_end_halts() {
        let mut h = Harness::new(&[ins(Nop, 0, 0, 0, 0)]);
        let report = h.run(10);
        assert_eq!(report.executed, 1);
        assert_eq!(report.outcome, RunOutcome::Stopped(Trap::Halt));
    }

    #[test]
    fn unbounded_recursion_overflows_the_stack() {
        let mut h = Harness::new(&[ins(Call, 0, 0, 0, 0)]);
        assert_eq!(h.signal(10_000), Some(Signal::StackOverflow));
        assert_eq!(h.registers.sp, STACK_BASE);
    }

    #[test]
    fn pop_on_empty_stack_overflows() {
        let mut h = Harness::new(&[ins(Pop, 1, 0, 0, 0)]);
        assert_eq!(h.signal(10), Some(Signal::StackOverflow));
    }

    #[test]
    fn yield_ends_the_slice_and_resumes() {
        let mut h = Harness::new(&[
            ins(Li, 1, 0, 0, 1),
            ins(Yield, 0, 0, 0, 0),
            ins(Li, 1, 0, 0, 2),
            ins(Halt, 0, 0, 0, 0),
        ]);
        let report = h.run(100);
        assert_eq!(report.outcome, RunOutcome::Yielded);
        assert_eq!(report.executed, 2);
        assert_eq!(h.registers.pc, 2);
        assert_eq!(h.signal(100), Some(Signal::Halt));
        assert_eq!(h.registers.gpr[1], 2);
    }

    #[test]
    fn budget_stops_an_infinite_loop() {
        let mut h = Harness::new(&[ins(Jmp, 0, 0, 0, 0)]);
        let report = h.run(256);
        assert_eq!(report.executed, 256);
        assert_eq!(report.outcome, RunOutcome::BudgetExhausted);
    }

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    #[test]
    fn loads_and_stores() {
        let mut h = Harness::new(&[
            ins(Li, 1, 0, 0, 0x1234_5678),
            ins(Li, 2, 0, 0, 64),
            ins(St, 1, 2, 0, 4),
            ins(Ld, 3, 2, 0, 4),
            ins(Ldb, 4, 2, 0, 4),
            ins(Stb, 1, 2, 0, 100),
            ins(Halt, 0, 0, 0, 0),
        ]);
        h.run(100);
        assert_eq!(h.registers.gpr[3], 0x1234_5678);
        assert_eq!(h.registers.gpr[4], 0x78);
        assert_eq!(h.memory.read_u8(164).unwrap(), 0x78);
    }

    #[test]
    fn out_of_range_access_faults() {
        let mut h = Harness::new(&[ins(Li, 1, 0, 0, 16_383), ins(Ld, 2, 1, 0, 0)]);
        assert_eq!(h.signal(10), Some(Signal::MemoryFault));
    }

    #[test]
    fn unknown_opcode_is_illegal() {
        let mut raw = Bytecode::from_instructions(&[ins(Nop, 0, 0, 0, 0)]).as_bytes().to_vec();
        raw.extend_from_slice(&[0xEE, 0, 0, 0, 0, 0, 0, 0]);
        let mut h = Harness::new(&[]);
        h.bytecode = Bytecode::new(raw).unwrap();
        assert_eq!(h.signal(10), Some(Signal::IllegalInstruction));
    }

    // -----------------------------------------------------------------------
    // External calls
    // -----------------------------------------------------------------------

    #[test]
    fn external_results_land_in_r0() {
        let mut h = Harness::new(&[
            ins(Li, 1, 0, 0, 9.0f32.to_bits() as i32),
            ins(Ext, 0, 0, 0, 0),
            ins(Halt, 0, 0, 0, 0),
        ]);
        h.run(10);
        assert_eq!(f32::from_bits(h.registers.gpr[0]), 3.0);
    }

    #[test]
    fn unregistered_external_traps() {
        let mut h = Harness::new(&[ins(Ext, 0, 0, 0, 999)]);
        let report = h.run(10);
        assert_eq!(
            report.outcome,
            RunOutcome::Stopped(Trap::UndefinedExternalFunction { pc: 0, id: 999 })
        );
    }

    #[test]
    fn rejected_external_writes_failure_and_continues() {
        // transmit needs an entity context.
        let mut h = Harness::new(&[
            ins(Li, 1, 0, 0, 0),
            ins(Li, 2, 0, 0, 4),
            ins(Ext, 0, 0, 0, crate::abi::ids::TRANSMIT as i32),
            ins(Li, 5, 0, 0, 1),
            ins(Halt, 0, 0, 0, 0),
        ]);
        assert_eq!(h.signal(10), Some(Signal::Halt));
        assert_eq!(h.registers.gpr[0], ABI_FAILURE);
        assert_eq!(h.registers.gpr[5], 1);
    }

    #[test]
    fn external_without_result_reports_ok() {
        let mut h = Harness::new(&[
            ins(Li, 0, 0, 0, 77),
            ins(Li, 1, 0, 0, 0),
            ins(Li, 2, 0, 0, 0),
            ins(Ext, 0, 0, 0, crate::abi::ids::PRINT as i32),
            ins(Halt, 0, 0, 0, 0),
        ]);
        h.run(10);
        assert_eq!(h.registers.gpr[0], ABI_OK);
    }

    #[test]
    fn trace_records_registers_after_each_instruction() {
        let mut h = Harness::new(&[ins(Li, 1, 0, 0, 5), ins(Addi, 1, 1, 0, 1), ins(Halt, 0, 0, 0, 0)]);
        let mut trace = Trace::new(2);
        let mut context = ExecutionContext::Detached;
        Machine {
            registers: &mut h.registers,
            memory: &mut h.memory,
            bytecode: &h.bytecode,
            externals: &h.externals,
            context: &mut context,
            trace: Some(&mut trace),
        }
        .run(10);
        let entries = trace.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].registers[1], 5);
        assert_eq!(entries[1].pc, 1);
        assert_eq!(entries[1].registers[1], 6);
    }
}
