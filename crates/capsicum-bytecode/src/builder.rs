//! Programmatic assembly of code units.
//!
//! [`CodeBuilder`] plays the role of the host compiler for tests, benchmarks
//! and synthesized bodies: instructions are appended with symbolic labels,
//! and [`CodeBuilder::finish`] lays out the wordcode (growing `EXTENDED_ARG`
//! prefixes until jump offsets are stable), decodes it back and computes the
//! maximum stack depth.
//!
//! # Example
//!
//! ```
//! use capsicum_bytecode::{CodeBuilder, Constant, OpCode};
//!
//! let mut b = CodeBuilder::module("main");
//! b.load_const(Constant::Int(1));
//! b.store_name("x");
//! b.load_const(Constant::None);
//! b.emit(OpCode::RETURN_VALUE);
//! let code = b.finish();
//! assert_eq!(code.stacksize(), 1);
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::code_unit::CodeUnit;
use crate::constant::Constant;
use crate::effect::{HANDLER_ENTRY_PUSH, stack_effect};
use crate::flags::CodeFlags;
use crate::instruction::{decode, encode, encoded_len};
use crate::line_table::LineTable;
use crate::opcode::{INSTRUCTION_WIDTH, JumpKind, OpCode};

/// A position in the instruction stream, bound with [`CodeBuilder::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum Operand {
    Value(u32),
    Target(Label),
}

#[derive(Debug, Clone, Copy)]
struct PendingOp {
    op: OpCode,
    operand: Operand,
    line: u32,
}

/// Incremental builder for one [`CodeUnit`].
#[derive(Debug, Clone)]
pub struct CodeBuilder {
    name: String,
    module: String,
    filename: String,
    first_line: u32,
    line: u32,
    argcount: u32,
    kwonlyargcount: u32,
    flags: CodeFlags,
    stacksize: Option<u32>,
    ops: Vec<PendingOp>,
    /// Label -> index of the op it precedes.
    labels: Vec<Option<usize>>,
    consts: Vec<Arc<Constant>>,
    names: Vec<Arc<str>>,
    name_index: FxHashMap<Arc<str>, u32>,
    varnames: Vec<Arc<str>>,
    freevars: Vec<Arc<str>>,
    cellvars: Vec<Arc<str>>,
}

impl CodeBuilder {
    fn new(name: &str, module: &str, flags: CodeFlags) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            filename: format!("{}.py", module.replace('.', "/")),
            first_line: 1,
            line: 1,
            argcount: 0,
            kwonlyargcount: 0,
            flags,
            stacksize: None,
            ops: Vec::new(),
            labels: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            name_index: FxHashMap::default(),
            varnames: Vec::new(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
        }
    }

    /// Builder for a module body.
    pub fn module(module: &str) -> Self {
        Self::new("<module>", module, CodeFlags::NOFREE)
    }

    /// Builder for a function body with fast locals.
    pub fn function(name: &str, module: &str) -> Self {
        Self::new(
            name,
            module,
            CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS | CodeFlags::NOFREE,
        )
    }

    /// Builder for a generator function.
    pub fn generator(name: &str, module: &str) -> Self {
        let mut b = Self::function(name, module);
        b.flags |= CodeFlags::GENERATOR;
        b
    }

    pub fn set_filename(&mut self, filename: &str) -> &mut Self {
        self.filename = filename.into();
        self
    }

    pub fn set_first_line(&mut self, line: u32) -> &mut Self {
        self.first_line = line;
        self.line = self.line.max(line);
        self
    }

    pub fn set_argcount(&mut self, argcount: u32) -> &mut Self {
        self.argcount = argcount;
        self
    }

    pub fn set_kwonlyargcount(&mut self, count: u32) -> &mut Self {
        self.kwonlyargcount = count;
        self
    }

    pub fn set_flags(&mut self, flags: CodeFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Override the computed maximum stack depth.
    pub fn set_stacksize(&mut self, stacksize: u32) -> &mut Self {
        self.stacksize = Some(stacksize);
        self
    }

    /// Source line for the instructions that follow.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    // =========================================================================
    // Pools
    // =========================================================================

    /// Append a constant (no deduplication) and return its index.
    pub fn add_const(&mut self, constant: Constant) -> u32 {
        self.add_shared_const(Arc::new(constant))
    }

    /// Append an already shared constant object and return its index.
    pub fn add_shared_const(&mut self, constant: Arc<Constant>) -> u32 {
        self.consts.push(constant);
        (self.consts.len() - 1) as u32
    }

    /// Index of a name in the name pool, adding it on first use.
    pub fn name(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.name_index.get(name) {
            return idx;
        }
        let name: Arc<str> = Arc::from(name);
        let idx = self.names.len() as u32;
        self.names.push(name.clone());
        self.name_index.insert(name, idx);
        idx
    }

    /// Index of a local slot, adding it on first use.
    pub fn varname(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.varnames.iter().position(|v| &**v == name) {
            return idx as u32;
        }
        self.varnames.push(Arc::from(name));
        (self.varnames.len() - 1) as u32
    }

    pub fn cellvar(&mut self, name: &str) -> u32 {
        self.cellvars.push(Arc::from(name));
        (self.cellvars.len() - 1) as u32
    }

    pub fn freevar(&mut self, name: &str) -> u32 {
        self.freevars.push(Arc::from(name));
        (self.cellvars.len() + self.freevars.len() - 1) as u32
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    /// Append an instruction without an argument.
    pub fn emit(&mut self, op: OpCode) -> &mut Self {
        self.emit_arg(op, 0)
    }

    /// Append an instruction with a literal argument.
    pub fn emit_arg(&mut self, op: OpCode, arg: u32) -> &mut Self {
        self.ops.push(PendingOp {
            op,
            operand: Operand::Value(arg),
            line: self.line,
        });
        self
    }

    /// Create an unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the next appended instruction.
    ///
    /// # Panics
    ///
    /// Panics if the label is already bound.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let slot = &mut self.labels[label.0];
        assert!(slot.is_none(), "label {} bound twice", label.0);
        *slot = Some(self.ops.len());
        self
    }

    /// Append a jump or block setup targeting `label`.
    ///
    /// # Panics
    ///
    /// Panics if `op` does not take a jump target.
    pub fn jump(&mut self, op: OpCode, label: Label) -> &mut Self {
        assert!(op.jump_kind().is_some(), "{} is not a jump", op.name());
        self.ops.push(PendingOp {
            op,
            operand: Operand::Target(label),
            line: self.line,
        });
        self
    }

    pub fn load_const(&mut self, constant: Constant) -> &mut Self {
        let idx = self.add_const(constant);
        self.emit_arg(OpCode::LOAD_CONST, idx)
    }

    pub fn load_name(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_arg(OpCode::LOAD_NAME, idx)
    }

    pub fn store_name(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_arg(OpCode::STORE_NAME, idx)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_arg(OpCode::LOAD_GLOBAL, idx)
    }

    pub fn load_attr(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_arg(OpCode::LOAD_ATTR, idx)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.varname(name);
        self.emit_arg(OpCode::LOAD_FAST, idx)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.varname(name);
        self.emit_arg(OpCode::STORE_FAST, idx)
    }

    /// `import name` / `from name import fromlist`, leaving the module on the stack.
    pub fn import_name(&mut self, name: &str, fromlist: &[&str], level: u32) -> &mut Self {
        self.load_const(Constant::Int(level as i64));
        if fromlist.is_empty() {
            self.load_const(Constant::None);
        } else {
            let names = fromlist
                .iter()
                .map(|n| Arc::new(Constant::Str((*n).to_string())))
                .collect();
            self.load_const(Constant::Tuple(names));
        }
        let idx = self.name(name);
        self.emit_arg(OpCode::IMPORT_NAME, idx)
    }

    /// Number of instructions appended so far.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    /// Lay out, encode and decode the routine.
    ///
    /// # Panics
    ///
    /// Panics on unbound labels; the builder is an assembly tool and a
    /// dangling label is a programming error.
    pub fn finish(self) -> CodeUnit {
        let targets: Vec<usize> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, l)| l.unwrap_or_else(|| panic!("label {i} never bound")))
            .collect();

        // Grow instruction widths until every jump argument fits.
        let mut widths = vec![INSTRUCTION_WIDTH; self.ops.len()];
        let mut offsets = vec![0usize; self.ops.len() + 1];
        loop {
            for (i, w) in widths.iter().enumerate() {
                offsets[i + 1] = offsets[i] + w;
            }
            let mut changed = false;
            for (i, pending) in self.ops.iter().enumerate() {
                let arg = self.resolve_arg(pending, i, &offsets, &targets, &widths);
                let width = encoded_len(pending.op, arg);
                if width > widths[i] {
                    widths[i] = width;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut code = Vec::with_capacity(offsets[self.ops.len()]);
        let mut starts = Vec::new();
        let mut last_line = None;
        for (i, pending) in self.ops.iter().enumerate() {
            let arg = self.resolve_arg(pending, i, &offsets, &targets, &widths);
            // pad with EXTENDED_ARG 0 when an earlier pass widened this slot
            let natural = encoded_len(pending.op, arg);
            for _ in 0..(widths[i] - natural) / INSTRUCTION_WIDTH {
                code.extend_from_slice(&[OpCode::EXTENDED_ARG.into(), 0]);
            }
            encode(pending.op, arg, &mut code);
            if last_line != Some(pending.line) {
                starts.push((offsets[i], pending.line));
                last_line = Some(pending.line);
            }
        }

        let lines = LineTable::from_starts(self.first_line, starts);
        let instructions = match decode(&code, &lines) {
            Ok(instructions) => instructions,
            Err(err) => panic!("builder produced malformed wordcode: {err}"),
        };
        let stacksize = self
            .stacksize
            .unwrap_or_else(|| max_stack_depth(&instructions) as u32);

        CodeUnit {
            nlocals: self.varnames.len() as u32,
            name: self.name,
            module: self.module,
            filename: self.filename,
            first_line: self.first_line,
            argcount: self.argcount,
            kwonlyargcount: self.kwonlyargcount,
            stacksize,
            flags: self.flags,
            instructions,
            code_len: code.len(),
            consts: self.consts,
            names: self.names,
            varnames: self.varnames,
            freevars: self.freevars,
            cellvars: self.cellvars,
            lines,
        }
    }

    fn resolve_arg(
        &self,
        pending: &PendingOp,
        index: usize,
        offsets: &[usize],
        targets: &[usize],
        widths: &[usize],
    ) -> u32 {
        match pending.operand {
            Operand::Value(v) => v,
            Operand::Target(label) => {
                let target = offsets[targets[label.0]];
                match pending.op.jump_kind() {
                    Some(JumpKind::Relative) => (target - (offsets[index] + widths[index])) as u32,
                    _ => target as u32,
                }
            }
        }
    }
}

/// Maximum operand stack depth over every path, using normal-path effects
/// and handler-entry effects for block setups.
///
/// Handler entry overestimates what cleanup code leaves behind, so a
/// handler path that loops back can reach an instruction deeper on every
/// trip. An instruction is only re-walked while its depth stays within one
/// handler entry of the depth it was first reached at.
pub fn max_stack_depth(instructions: &[crate::instruction::Instruction]) -> usize {
    let index_of: FxHashMap<usize, usize> = instructions
        .iter()
        .enumerate()
        .map(|(i, instr)| (instr.offset, i))
        .collect();
    let mut first: Vec<Option<i32>> = vec![None; instructions.len()];
    let mut seen: Vec<Option<i32>> = vec![None; instructions.len()];
    let mut work = vec![(0usize, 0i32)];
    let mut max = 0i32;

    while let Some((mut i, mut depth)) = work.pop() {
        while i < instructions.len() {
            if seen[i].is_some_and(|d| d >= depth) {
                break;
            }
            let base = *first[i].get_or_insert(depth);
            if depth > base + HANDLER_ENTRY_PUSH {
                break;
            }
            seen[i] = Some(depth);
            max = max.max(depth);
            let instr = &instructions[i];
            let effect = stack_effect(instr.op, instr.arg);
            if let (Some(branch), Some(target)) = (effect.branch, instr.jump_target()) {
                if let Some(&t) = index_of.get(&target) {
                    work.push((t, depth + branch));
                }
            }
            match effect.fallthrough {
                Some(delta) => {
                    depth += delta;
                    i += 1;
                }
                None => break,
            }
        }
    }
    max.max(0) as usize
}
