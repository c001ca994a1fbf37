//! Decoded instructions.
//!
//! Raw wordcode is decoded once into a flat list of [`Instruction`]s.
//! `EXTENDED_ARG` prefixes are folded into the argument of the instruction
//! they extend, and the folded instruction keeps the offset of its first
//! prefix, because that is the offset jumps refer to.

use capsicum_core::DecodeError;
use rustc_hash::FxHashSet;

use crate::line_table::LineTable;
use crate::opcode::{INSTRUCTION_WIDTH, JumpKind, OpCode};

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the instruction (of its first `EXTENDED_ARG`, if any).
    pub offset: usize,
    /// Byte offset of the instruction that follows.
    pub next_offset: usize,
    pub op: OpCode,
    /// Full argument, with extended prefixes applied. Zero when unused.
    pub arg: u32,
    /// Source line.
    pub line: u32,
}

impl Instruction {
    /// Destination offset, for jumps and block setups.
    pub fn jump_target(&self) -> Option<usize> {
        match self.op.jump_kind()? {
            JumpKind::Relative => Some(self.next_offset + self.arg as usize),
            JumpKind::Absolute => Some(self.arg as usize),
        }
    }
}

/// Decode wordcode into instructions.
///
/// Every jump destination must land on an instruction boundary.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn decode(code: &[u8], lines: &LineTable) -> Result<Vec<Instruction>, DecodeError> {
    if code.len() % INSTRUCTION_WIDTH != 0 {
        return Err(DecodeError::Truncated { len: code.len() });
    }

    let mut instructions = Vec::with_capacity(code.len() / INSTRUCTION_WIDTH);
    let mut extended: u32 = 0;
    let mut prefix_start: Option<usize> = None;

    for (index, pair) in code.chunks_exact(INSTRUCTION_WIDTH).enumerate() {
        let offset = index * INSTRUCTION_WIDTH;
        let op = OpCode::from_u8(pair[0]).ok_or(DecodeError::UnknownOpcode {
            offset,
            byte: pair[0],
        })?;
        let raw = if op.has_arg() { pair[1] as u32 } else { 0 };

        if op == OpCode::EXTENDED_ARG {
            extended = (extended | raw) << 8;
            prefix_start.get_or_insert(offset);
            continue;
        }

        let start = prefix_start.take().unwrap_or(offset);
        instructions.push(Instruction {
            offset: start,
            next_offset: offset + INSTRUCTION_WIDTH,
            op,
            arg: extended | raw,
            line: lines.line_at(start),
        });
        extended = 0;
    }

    if let Some(offset) = prefix_start {
        return Err(DecodeError::DanglingExtendedArg { offset });
    }

    let boundaries: FxHashSet<usize> = instructions.iter().map(|i| i.offset).collect();
    for instr in &instructions {
        if let Some(target) = instr.jump_target() {
            // Jumping to the very end is legal only for block exits of the last block.
            if !boundaries.contains(&target) && target != code.len() {
                return Err(DecodeError::BadJumpTarget {
                    offset: instr.offset,
                    target,
                });
            }
        }
    }

    Ok(instructions)
}

/// Encode one instruction, with `EXTENDED_ARG` prefixes when the argument
/// needs more than one byte.
pub fn encode(op: OpCode, arg: u32, out: &mut Vec<u8>) {
    let arg = if op.has_arg() { arg } else { 0 };
    for shift in [24u32, 16, 8] {
        if arg >> shift != 0 {
            out.push(OpCode::EXTENDED_ARG.into());
            out.push((arg >> shift) as u8);
        }
    }
    out.push(op.into());
    out.push(arg as u8);
}

/// Number of bytes [`encode`] writes for this argument.
pub fn encoded_len(op: OpCode, arg: u32) -> usize {
    if !op.has_arg() {
        return INSTRUCTION_WIDTH;
    }
    let prefixes = [24u32, 16, 8].iter().filter(|&&s| arg >> s != 0).count();
    (prefixes + 1) * INSTRUCTION_WIDTH
}
