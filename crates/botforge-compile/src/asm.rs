//! Reference assembler frontend.
//!
//! A line-oriented assembler for the reference instruction set. It exists so
//! the scheduler, the engine and the simulation can be exercised end to end;
//! production hosts plug in their own [`CompilerFrontend`].
//!
//! # Syntax
//!
//! ```text
//! ; comment
//! .include "lib.asm"        ; textual include, resolved next to the includer
//! .equ SPEED 3              ; named constant
//! .string GREETING "hi\n"   ; NUL-terminated bytes placed at the start of heap
//! loop:                     ; label (instruction index)
//!     li r1, 0x10
//!     li r2, 1.5f           ; float immediates are stored as their bits
//!     ld r3, r0, NAV_X      ; peripheral registers are predefined symbols
//!     ext print             ; external functions by name or id
//!     jmp loop
//! ```
//!
//! Missing includes are all requested before the frontend gives up, so one
//! compile attempt starts every fetch it needs. String data is written by a
//! short prologue that runs before the first user instruction; it uses
//! `r14` and `r15` and leaves every register zero.

use std::collections::{HashMap, HashSet};

use botforge_core::isa::REGISTER_COUNT;
use botforge_core::memory::{HEAP_BASE, HEAP_SIZE, STACK_TOP};
use botforge_core::peripheral::addr;
use botforge_core::{
    Bytecode, DebugInfo, Diagnostic, ExternalSignature, Instruction, Opcode, SourceId, TextRange,
};

use crate::frontend::{CompilerFrontend, DependencyLookup, FrontendOutcome};
use crate::record::CompiledProgram;

/// Symbols every program can use without defining them.
const PREDEFINED: &[(&str, u32)] = &[
    ("HEAP_BASE", HEAP_BASE),
    ("STACK_TOP", STACK_TOP),
    ("STDOUT", addr::STDOUT),
    ("STDOUT_LEN", addr::STDOUT_LEN),
    ("STDIN_REQUEST", addr::STDIN_REQUEST),
    ("STDIN_LEN", addr::STDIN_LEN),
    ("STDIN_DATA", addr::STDIN_DATA),
    ("CRASH_MESSAGE", addr::CRASH_MESSAGE),
    ("NAV_X", addr::NAV_X),
    ("NAV_Y", addr::NAV_Y),
    ("NAV_HEADING", addr::NAV_HEADING),
    ("DRIVE_THROTTLE", addr::DRIVE_THROTTLE),
    ("DRIVE_TARGET_HEADING", addr::DRIVE_TARGET_HEADING),
    ("RADAR_REQUEST", addr::RADAR_REQUEST),
    ("RADAR_RANGE", addr::RADAR_RANGE),
    ("RADAR_COUNT", addr::RADAR_COUNT),
    ("RADAR_RESULTS", addr::RADAR_RESULTS),
    ("TURRET_TARGET_ANGLE", addr::TURRET_TARGET_ANGLE),
    ("TURRET_SHOOT", addr::TURRET_SHOOT),
    ("TURRET_ANGLE", addr::TURRET_ANGLE),
    ("TURRET_COOLDOWN", addr::TURRET_COOLDOWN),
    ("EXTRACTOR_REQUEST", addr::EXTRACTOR_REQUEST),
    ("EXTRACTOR_STATUS", addr::EXTRACTOR_STATUS),
    ("EXTRACTOR_STORED", addr::EXTRACTOR_STORED),
    ("EXTRACTOR_CAPACITY", addr::EXTRACTOR_CAPACITY),
    ("TRANSPORTER_COMMAND", addr::TRANSPORTER_COMMAND),
    ("TRANSPORTER_STATUS", addr::TRANSPORTER_STATUS),
    ("TRANSPORTER_AMOUNT", addr::TRANSPORTER_AMOUNT),
    ("TRANSPORTER_PARTNER", addr::TRANSPORTER_PARTNER),
    ("FACILITY_OP", addr::FACILITY_OP),
    ("FACILITY_STATUS", addr::FACILITY_STATUS),
    ("FACILITY_QUEUE_LEN", addr::FACILITY_QUEUE_LEN),
    ("FACILITY_HASH", addr::FACILITY_HASH),
];

/// Scratch registers used by the string prologue.
const PROLOGUE_BASE: u8 = 14;
const PROLOGUE_VALUE: u8 = 15;

#[derive(Debug, Clone, Copy, Default)]
pub struct AsmFrontend;

impl AsmFrontend {
    pub fn new() -> Self {
        AsmFrontend
    }
}

impl CompilerFrontend for AsmFrontend {
    fn compile(
        &self,
        root: &SourceId,
        text: &[u8],
        externals: &[ExternalSignature],
        resolve: &mut dyn FnMut(&SourceId) -> DependencyLookup,
    ) -> FrontendOutcome {
        let mut expander = Expander::new(root, resolve);
        expander.expand(root, text, 0);
        if expander.missing {
            return FrontendOutcome::NeedsDependency;
        }

        let Expander {
            files,
            lines,
            diagnostics,
            ..
        } = expander;
        let mut assembler = Assembler::new(externals, &files, diagnostics);
        let program = assembler.assemble(&lines);

        if assembler.diagnostics.iter().any(Diagnostic::is_error) {
            return FrontendOutcome::Failed {
                diagnostics: assembler.diagnostics,
            };
        }
        let (bytecode, debug_info) = program;
        FrontendOutcome::Compiled(CompiledProgram {
            bytecode,
            debug_info,
            diagnostics: assembler.diagnostics,
        })
    }
}

// ---------------------------------------------------------------------------
// Include expansion
// ---------------------------------------------------------------------------

/// One line of code after comment stripping, with its origin.
#[derive(Debug, Clone)]
struct SourceLine {
    file: u16,
    line: u32,
    column: u32,
    text: String,
}

impl SourceLine {
    fn range(&self) -> TextRange {
        TextRange::on_line(self.line, self.column, self.text.len() as u32)
    }
}

struct Expander<'r> {
    resolve: &'r mut dyn FnMut(&SourceId) -> DependencyLookup,
    files: Vec<String>,
    included: HashSet<SourceId>,
    active: Vec<SourceId>,
    lines: Vec<SourceLine>,
    diagnostics: Vec<Diagnostic>,
    missing: bool,
}

impl<'r> Expander<'r> {
    fn new(root: &SourceId, resolve: &'r mut dyn FnMut(&SourceId) -> DependencyLookup) -> Self {
        Expander {
            resolve,
            files: vec![root.path.clone()],
            included: HashSet::from([root.clone()]),
            active: vec![root.clone()],
            lines: Vec::new(),
            diagnostics: Vec::new(),
            missing: false,
        }
    }

    fn expand(&mut self, source: &SourceId, text: &[u8], file: u16) {
        let text = String::from_utf8_lossy(text);
        for (number, raw) in text.lines().enumerate() {
            let code = strip_comment(raw);
            let trimmed = code.trim();
            if trimmed.is_empty() {
                continue;
            }
            let line = SourceLine {
                file,
                line: number as u32,
                column: (code.len() - code.trim_start().len()) as u32,
                text: trimmed.to_string(),
            };

            if let Some(rest) = trimmed.strip_prefix(".include") {
                match parse_quoted(rest.trim()) {
                    Some((path, tail)) if tail.trim().is_empty() => {
                        self.include(source, &String::from_utf8_lossy(&path), &line)
                    }
                    _ => self.error(&line, "expected a quoted path after .include".into()),
                }
                continue;
            }
            self.lines.push(line);
        }
    }

    fn include(&mut self, includer: &SourceId, path: &str, at: &SourceLine) {
        let dependency = includer.sibling(path);
        if self.active.contains(&dependency) {
            self.error(at, format!("include cycle through \"{}\"", path));
            return;
        }
        if !self.included.insert(dependency.clone()) {
            return;
        }
        match (self.resolve)(&dependency) {
            DependencyLookup::Ready(text) => {
                let index = self.files.len() as u16;
                self.files.push(path.to_string());
                self.active.push(dependency.clone());
                self.expand(&dependency, &text, index);
                self.active.pop();
            }
            DependencyLookup::Pending => self.missing = true,
        }
    }

    fn error(&mut self, line: &SourceLine, message: String) {
        self.diagnostics
            .push(Diagnostic::error(line.range(), locate(&self.files, line, message)));
    }
}

/// Prefixes messages from included files with the file's path.
fn locate(files: &[String], line: &SourceLine, message: String) -> String {
    if line.file == 0 {
        message
    } else {
        format!("{}: {}", files[line.file as usize], message)
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Symbol {
    /// Instruction index before the prologue is prepended.
    Label(u32),
    Value(i32),
}

struct StringData {
    address: u32,
    bytes: Vec<u8>,
    origin: (u16, u32),
}

struct Assembler<'a> {
    externals: &'a [ExternalSignature],
    files: &'a [String],
    symbols: HashMap<String, Symbol>,
    diagnostics: Vec<Diagnostic>,
    prologue_len: u32,
}

impl<'a> Assembler<'a> {
    fn new(externals: &'a [ExternalSignature], files: &'a [String], diagnostics: Vec<Diagnostic>) -> Self {
        let symbols = PREDEFINED
            .iter()
            .map(|&(name, value)| (name.to_string(), Symbol::Value(value as i32)))
            .collect();
        Assembler {
            externals,
            files,
            symbols,
            diagnostics,
            prologue_len: 0,
        }
    }

    fn error(&mut self, line: &SourceLine, message: String) {
        self.diagnostics
            .push(Diagnostic::error(line.range(), locate(self.files, line, message)));
    }

    fn define(&mut self, line: &SourceLine, name: &str, symbol: Symbol) {
        if !is_identifier(name) {
            self.error(line, format!("`{}` is not a valid name", name));
        } else if self.symbols.contains_key(name) {
            self.error(line, format!("`{}` is already defined", name));
        } else {
            self.symbols.insert(name.to_string(), symbol);
        }
    }

    fn assemble(&mut self, lines: &[SourceLine]) -> (Bytecode, DebugInfo) {
        // Pass 1: symbols, data and instruction slots
        let mut pending: Vec<(&SourceLine, &str)> = Vec::new();
        let mut strings: Vec<StringData> = Vec::new();
        let mut data_cursor = HEAP_BASE;

        for line in lines {
            let mut code = line.text.as_str();
            if let Some((label, rest)) = split_label(code) {
                self.define(line, label, Symbol::Label(pending.len() as u32));
                code = rest.trim();
            }
            if code.is_empty() {
                continue;
            }

            if let Some(rest) = code.strip_prefix(".equ") {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(name), Some(value), None) => match self.immediate(value) {
                        Ok(value) => self.define(line, name, Symbol::Value(value)),
                        Err(message) => self.error(line, message),
                    },
                    _ => self.error(line, "expected `.equ NAME value`".into()),
                }
            } else if let Some(rest) = code.strip_prefix(".string") {
                let rest = rest.trim_start();
                let name_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                let (name, literal) = rest.split_at(name_end);
                match parse_quoted(literal.trim()) {
                    Some((mut bytes, tail)) if tail.trim().is_empty() && !name.is_empty() => {
                        bytes.push(0);
                        let size = (bytes.len() as u32).div_ceil(4) * 4;
                        if data_cursor + size > HEAP_BASE + HEAP_SIZE {
                            self.error(line, "string data does not fit in the heap".into());
                            continue;
                        }
                        self.define(line, name, Symbol::Value(data_cursor as i32));
                        strings.push(StringData {
                            address: data_cursor,
                            bytes,
                            origin: (line.file, line.line),
                        });
                        data_cursor += size;
                    }
                    _ => self.error(line, "expected `.string NAME \"text\"`".into()),
                }
            } else if code.starts_with('.') {
                let directive = code.split_whitespace().next().unwrap_or(code);
                self.error(line, format!("unknown directive `{}`", directive));
            } else {
                pending.push((line, code));
            }
        }

        // Prologue: store string data, then zero the scratch registers
        let mut instructions = Vec::new();
        let mut debug = DebugInfo {
            files: self.files.to_vec(),
            lines: Vec::new(),
        };
        for data in &strings {
            for (index, chunk) in data.bytes.chunks(4).enumerate() {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                let address = data.address + index as u32 * 4;
                instructions.push(Instruction::new(
                    Opcode::Li,
                    PROLOGUE_VALUE,
                    0,
                    0,
                    i32::from_le_bytes(word),
                ));
                instructions.push(Instruction::new(
                    Opcode::St,
                    PROLOGUE_VALUE,
                    PROLOGUE_BASE,
                    0,
                    address as i32,
                ));
                debug.lines.push(data.origin);
                debug.lines.push(data.origin);
            }
        }
        if !strings.is_empty() {
            instructions.push(Instruction::new(Opcode::Li, PROLOGUE_VALUE, 0, 0, 0));
            debug.lines.push(strings[0].origin);
        }
        self.prologue_len = instructions.len() as u32;

        // Pass 2: encode
        for (line, code) in &pending {
            match self.instruction(code) {
                Ok(instruction) => {
                    instructions.push(instruction);
                    debug.lines.push((line.file, line.line));
                }
                Err(message) => self.error(line, message),
            }
        }

        if pending.is_empty() {
            self.diagnostics.push(Diagnostic::warning(
                TextRange::on_line(0, 0, 0),
                "program has no instructions",
            ));
        }

        (Bytecode::from_instructions(&instructions), debug)
    }

    fn instruction(&self, code: &str) -> Result<Instruction, String> {
        let (mnemonic, rest) = match code.find(char::is_whitespace) {
            Some(split) => code.split_at(split),
            None => (code, ""),
        };
        let op = Opcode::from_mnemonic(&mnemonic.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown instruction `{}`", mnemonic))?;
        let operands: Vec<&str> = if rest.trim().is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        let expect = |count: usize| -> Result<(), String> {
            if operands.len() == count {
                Ok(())
            } else {
                Err(format!(
                    "`{}` expects {} operand(s), found {}",
                    op,
                    count,
                    operands.len()
                ))
            }
        };

        match op {
            Opcode::Nop | Opcode::Halt | Opcode::Ret | Opcode::Yield => {
                expect(0)?;
                Ok(Instruction::bare(op))
            }
            Opcode::Crash | Opcode::Push | Opcode::Pop => {
                expect(1)?;
                Ok(Instruction::new(op, register(operands[0])?, 0, 0, 0))
            }
            Opcode::Li | Opcode::Jz | Opcode::Jnz => {
                expect(2)?;
                let a = register(operands[0])?;
                Ok(Instruction::new(op, a, 0, 0, self.immediate(operands[1])?))
            }
            Opcode::Jmp | Opcode::Call => {
                expect(1)?;
                Ok(Instruction::new(op, 0, 0, 0, self.immediate(operands[0])?))
            }
            Opcode::Mov | Opcode::ItoF | Opcode::FtoI => {
                expect(2)?;
                Ok(Instruction::new(
                    op,
                    register(operands[0])?,
                    register(operands[1])?,
                    0,
                    0,
                ))
            }
            Opcode::Addi | Opcode::Ld | Opcode::St | Opcode::Ldb | Opcode::Stb => {
                expect(3)?;
                Ok(Instruction::new(
                    op,
                    register(operands[0])?,
                    register(operands[1])?,
                    0,
                    self.immediate(operands[2])?,
                ))
            }
            Opcode::Ext => {
                expect(1)?;
                Ok(Instruction::new(op, 0, 0, 0, self.external(operands[0])?))
            }
            _ => {
                expect(3)?;
                Ok(Instruction::new(
                    op,
                    register(operands[0])?,
                    register(operands[1])?,
                    register(operands[2])?,
                    0,
                ))
            }
        }
    }

    fn external(&self, token: &str) -> Result<i32, String> {
        if let Some(value) = parse_integer(token) {
            return u16::try_from(value)
                .map(i32::from)
                .map_err(|_| format!("external id {} is out of range", value));
        }
        self.externals
            .iter()
            .find(|signature| signature.name == token)
            .map(|signature| i32::from(signature.id))
            .ok_or_else(|| format!("unknown external function `{}`", token))
    }

    fn immediate(&self, token: &str) -> Result<i32, String> {
        if let Some(value) = parse_integer(token) {
            if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
                return Err(format!("immediate {} does not fit in 32 bits", token));
            }
            return Ok(value as u32 as i32);
        }
        if let Some(value) = parse_float(token) {
            return Ok(value.to_bits() as i32);
        }
        match self.symbols.get(token) {
            Some(Symbol::Label(index)) => Ok((index + self.prologue_len) as i32),
            Some(Symbol::Value(value)) => Ok(*value),
            None => Err(format!("unknown symbol `{}`", token)),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexical helpers
// ---------------------------------------------------------------------------

fn register(token: &str) -> Result<u8, String> {
    token
        .strip_prefix('r')
        .and_then(|digits| digits.parse::<u8>().ok())
        .filter(|&index| (index as usize) < REGISTER_COUNT)
        .ok_or_else(|| format!("expected a register r0..r{}, found `{}`", REGISTER_COUNT - 1, token))
}

fn parse_integer(token: &str) -> Option<i64> {
    let (negative, body) = match token.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, token),
    };
    let magnitude = if let Some(hex) = body.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if body.chars().all(|c| c.is_ascii_digit()) && !body.is_empty() {
        body.parse::<i64>().ok()?
    } else {
        return None;
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// `1.5f`, `-2f` or `0.25`.
fn parse_float(token: &str) -> Option<f32> {
    let body = token.strip_suffix('f').unwrap_or(token);
    if body == token && !token.contains('.') {
        return None;
    }
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
        return None;
    }
    body.parse::<f32>().ok()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `name: rest` when the line starts with a label.
fn split_label(code: &str) -> Option<(&str, &str)> {
    let (name, rest) = code.split_once(':')?;
    is_identifier(name.trim()).then(|| (name.trim(), rest))
}

/// Removes a `;` comment, ignoring semicolons inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

/// Parses a double-quoted literal with `\n \t \0 \\ \"` escapes. Returns the
/// bytes and whatever follows the closing quote.
fn parse_quoted(text: &str) -> Option<(Vec<u8>, &str)> {
    let body = text.strip_prefix('"')?;
    let mut bytes = Vec::new();
    let mut chars = body.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Some((bytes, &body[index + 1..])),
            '\\' => {
                let (_, escaped) = chars.next()?;
                bytes.push(match escaped {
                    'n' => b'\n',
                    't' => b'\t',
                    '0' => 0,
                    '\\' => b'\\',
                    '"' => b'"',
                    _ => return None,
                });
            }
            _ => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn externals() -> Vec<ExternalSignature> {
        vec![
            ExternalSignature::new(0, "sqrt", 4, 4).unwrap(),
            ExternalSignature::new(16, "print", 8, 4).unwrap(),
        ]
    }

    fn compile_with(text: &str, files: &[(&str, Option<&str>)]) -> (FrontendOutcome, Vec<SourceId>) {
        let table: HashMap<SourceId, Option<Arc<[u8]>>> = files
            .iter()
            .map(|(path, body)| {
                (
                    SourceId::local(*path),
                    body.map(|b| Arc::<[u8]>::from(b.as_bytes())),
                )
            })
            .collect();
        let mut asked = Vec::new();
        let mut resolve = |source: &SourceId| {
            asked.push(source.clone());
            match table.get(source) {
                Some(Some(text)) => DependencyLookup::Ready(text.clone()),
                _ => DependencyLookup::Pending,
            }
        };
        let outcome = AsmFrontend::new().compile(
            &SourceId::local("main.asm"),
            text.as_bytes(),
            &externals(),
            &mut resolve,
        );
        (outcome, asked)
    }

    fn compile(text: &str) -> FrontendOutcome {
        compile_with(text, &[]).0
    }

    fn program(text: &str) -> CompiledProgram {
        match compile(text) {
            FrontendOutcome::Compiled(program) => program,
            other => panic!("expected success, got {:?}", other),
        }
    }

    fn errors(text: &str) -> Vec<Diagnostic> {
        match compile(text) {
            FrontendOutcome::Failed { diagnostics } => diagnostics,
            other => panic!("expected failure, got {:?}", other),
        }
    }

    fn decode(program: &CompiledProgram) -> Vec<Instruction> {
        (0..program.bytecode.len() as u32)
            .map(|pc| program.bytecode.fetch(pc).unwrap().unwrap())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    #[test]
    fn encodes_operands() {
        let p = program("li r1, -5\naddi r2, r1, 0x10\nadd r3, r1, r2\nhalt\n");
        let code = decode(&p);
        assert_eq!(code[0], Instruction::new(Opcode::Li, 1, 0, 0, -5));
        assert_eq!(code[1], Instruction::new(Opcode::Addi, 2, 1, 0, 16));
        assert_eq!(code[2], Instruction::new(Opcode::Add, 3, 1, 2, 0));
        assert_eq!(code[3], Instruction::bare(Opcode::Halt));
    }

    #[test]
    fn labels_resolve_forward_and_backward() {
        let p = program("start: jmp end\nnop\nend:\n  jnz r1, start\n");
        let code = decode(&p);
        assert_eq!(code[0].imm, 2);
        assert_eq!(code[2].imm, 0);
    }

    #[test]
    fn float_and_symbol_immediates() {
        let p = program(".equ SPEED 3\nli r1, 1.5f\nli r2, SPEED\nld r3, r0, NAV_X\n");
        let code = decode(&p);
        assert_eq!(code[0].imm as u32, 1.5f32.to_bits());
        assert_eq!(code[1].imm, 3);
        assert_eq!(code[2].imm as u32, addr::NAV_X);
    }

    #[test]
    fn externals_by_name_or_id() {
        let p = program("ext print\next 999\n");
        let code = decode(&p);
        assert_eq!(code[0].imm, 16);
        assert_eq!(code[1].imm, 999);
    }

    #[test]
    fn strings_get_a_prologue() {
        let p = program(".string MSG \"hi; there\"\nli r1, MSG\nhalt\n");
        let code = decode(&p);
        // "hi; there\0" is 10 bytes -> 3 words -> 6 instructions + reset.
        assert_eq!(code.len(), 7 + 2);
        assert_eq!(code[7], Instruction::new(Opcode::Li, 1, 0, 0, HEAP_BASE as i32));
        assert_eq!(code[0].imm, i32::from_le_bytes(*b"hi; "));
        assert_eq!(code[6], Instruction::new(Opcode::Li, PROLOGUE_VALUE, 0, 0, 0));
    }

    #[test]
    fn labels_account_for_prologue() {
        let p = program(".string S \"a\"\ntop: jmp top\n");
        let code = decode(&p);
        assert_eq!(code.last().unwrap().imm, 3);
    }

    #[test]
    fn debug_info_maps_lines() {
        let p = program("; header\n\nnop\n  halt\n");
        assert_eq!(p.debug_info.location(0).as_deref(), Some("main.asm:3"));
        assert_eq!(p.debug_info.location(1).as_deref(), Some("main.asm:4"));
    }

    #[test]
    fn empty_program_warns() {
        let p = program("; nothing\n");
        assert!(p.bytecode.is_empty());
        assert_eq!(p.diagnostics.len(), 1);
        assert!(!p.diagnostics[0].is_error());
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    #[test]
    fn reports_every_error_with_its_line() {
        let d = errors("halt\nfrobnicate\nmov r1\nli r99, 1\n");
        assert_eq!(d.len(), 3);
        assert_eq!(d[0].range.start.line, 1);
        assert!(d[0].message.contains("frobnicate"));
        assert_eq!(d[1].range.start.line, 2);
        assert!(d[1].message.contains("expects 2"));
        assert!(d[2].message.contains("r0..r15"));
    }

    #[test]
    fn unknown_symbols_and_externals() {
        let d = errors("jmp nowhere\next launch_missiles\n");
        assert_eq!(d.len(), 2);
        assert!(d[0].message.contains("nowhere"));
        assert!(d[1].message.contains("launch_missiles"));
    }

    #[test]
    fn duplicate_label() {
        let d = errors("a: nop\na: nop\n");
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("already defined"));
    }

    #[test]
    fn diagnostic_range_covers_code() {
        let d = errors("    bogus r1 ; trailing\n");
        assert_eq!(d[0].range.start.column, 4);
        assert_eq!(d[0].range.end.column, 4 + "bogus r1".len() as u32);
    }

    // -----------------------------------------------------------------------
    // Includes
    // -----------------------------------------------------------------------

    #[test]
    fn include_is_textual() {
        let (outcome, asked) = compile_with(
            ".include \"lib.asm\"\nhalt\n",
            &[("lib.asm", Some("helper: nop\n"))],
        );
        let FrontendOutcome::Compiled(p) = outcome else {
            panic!("expected success");
        };
        assert_eq!(asked, vec![SourceId::local("lib.asm")]);
        assert_eq!(p.bytecode.len(), 2);
        assert_eq!(p.debug_info.location(0).as_deref(), Some("lib.asm:1"));
    }

    #[test]
    fn all_missing_includes_are_requested() {
        let (outcome, asked) = compile_with(
            ".include \"a.asm\"\n.include \"b.asm\"\nbogus\n",
            &[("a.asm", None), ("b.asm", None)],
        );
        assert_eq!(outcome, FrontendOutcome::NeedsDependency);
        assert_eq!(asked.len(), 2);
    }

    #[test]
    fn include_cycle_is_an_error() {
        let (outcome, _) = compile_with(
            ".include \"a.asm\"\n",
            &[("a.asm", Some(".include \"main.asm\"\n"))],
        );
        let FrontendOutcome::Failed { diagnostics } = outcome else {
            panic!("expected failure");
        };
        assert!(diagnostics[0].message.starts_with("a.asm: include cycle"));
    }

    #[test]
    fn repeated_include_is_expanded_once() {
        let (outcome, _) = compile_with(
            ".include \"lib.asm\"\n.include \"lib.asm\"\n",
            &[("lib.asm", Some("only_once: nop\n"))],
        );
        assert!(matches!(outcome, FrontendOutcome::Compiled(_)));
    }
}
