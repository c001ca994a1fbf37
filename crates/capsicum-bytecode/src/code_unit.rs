//! Compiled routines.
//!
//! A [`CodeUnit`] is the immutable, decoded form of one compiled routine:
//! a module body, function, class body, lambda or comprehension. Nested
//! routines hang off the constant pool as [`Constant::Code`] entries.

use std::sync::Arc;

use crate::constant::Constant;
use crate::flags::CodeFlags;
use crate::import::{ImportStatement, extract_imports};
use crate::instruction::Instruction;
use crate::line_table::LineTable;

/// One compiled routine with its static metadata.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    pub(crate) name: String,
    pub(crate) module: String,
    pub(crate) filename: String,
    pub(crate) first_line: u32,
    pub(crate) argcount: u32,
    pub(crate) kwonlyargcount: u32,
    pub(crate) nlocals: u32,
    pub(crate) stacksize: u32,
    pub(crate) flags: CodeFlags,
    pub(crate) instructions: Vec<Instruction>,
    /// Total wordcode length in bytes.
    pub(crate) code_len: usize,
    pub(crate) consts: Vec<Arc<Constant>>,
    pub(crate) names: Vec<Arc<str>>,
    pub(crate) varnames: Vec<Arc<str>>,
    pub(crate) freevars: Vec<Arc<str>>,
    pub(crate) cellvars: Vec<Arc<str>>,
    pub(crate) lines: LineTable,
}

impl CodeUnit {
    /// Routine name (`<module>` for module bodies).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted name of the owning module.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn first_line(&self) -> u32 {
        self.first_line
    }

    pub fn argcount(&self) -> u32 {
        self.argcount
    }

    pub fn kwonlyargcount(&self) -> u32 {
        self.kwonlyargcount
    }

    /// Declared local slot count.
    pub fn nlocals(&self) -> u32 {
        self.nlocals
    }

    /// Declared maximum operand stack depth.
    pub fn stacksize(&self) -> u32 {
        self.stacksize
    }

    pub fn flags(&self) -> CodeFlags {
        self.flags
    }

    pub fn is_generator(&self) -> bool {
        self.flags.is_generator()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Wordcode length in bytes; also the offset one past the last instruction.
    pub fn code_len(&self) -> usize {
        self.code_len
    }

    pub fn consts(&self) -> &[Arc<Constant>] {
        &self.consts
    }

    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn varnames(&self) -> &[Arc<str>] {
        &self.varnames
    }

    pub fn freevars(&self) -> &[Arc<str>] {
        &self.freevars
    }

    pub fn cellvars(&self) -> &[Arc<str>] {
        &self.cellvars
    }

    pub fn lines(&self) -> &LineTable {
        &self.lines
    }

    pub fn constant(&self, index: u32) -> Option<&Arc<Constant>> {
        self.consts.get(index as usize)
    }

    pub fn name_at(&self, index: u32) -> Option<&Arc<str>> {
        self.names.get(index as usize)
    }

    pub fn varname_at(&self, index: u32) -> Option<&Arc<str>> {
        self.varnames.get(index as usize)
    }

    /// Cell and free variables share one index space, cells first.
    pub fn cell_or_free_at(&self, index: u32) -> Option<&Arc<str>> {
        let index = index as usize;
        if index < self.cellvars.len() {
            self.cellvars.get(index)
        } else {
            self.freevars.get(index - self.cellvars.len())
        }
    }

    /// Directly nested routines, with their constant pool index.
    pub fn nested(&self) -> impl Iterator<Item = (u32, &Arc<CodeUnit>)> {
        self.consts
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_code().map(|code| (i as u32, code)))
    }

    /// Every import site in this routine and the routines nested in it.
    pub fn imports(&self) -> Vec<ImportStatement> {
        let mut out = extract_imports(self);
        for (_, nested) in self.nested() {
            out.extend(nested.imports());
        }
        out
    }

    /// The body given to placeholder packages: `return None`.
    pub fn empty_module(module: &str) -> CodeUnit {
        CodeUnit {
            name: "<module>".into(),
            module: module.into(),
            filename: "<empty>".into(),
            first_line: 1,
            argcount: 0,
            kwonlyargcount: 0,
            nlocals: 0,
            stacksize: 1,
            flags: CodeFlags::NOFREE,
            instructions: vec![
                Instruction {
                    offset: 0,
                    next_offset: 2,
                    op: crate::opcode::OpCode::LOAD_CONST,
                    arg: 0,
                    line: 1,
                },
                Instruction {
                    offset: 2,
                    next_offset: 4,
                    op: crate::opcode::OpCode::RETURN_VALUE,
                    arg: 0,
                    line: 1,
                },
            ],
            code_len: 4,
            consts: vec![Arc::new(Constant::None)],
            names: Vec::new(),
            varnames: Vec::new(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
            lines: LineTable::from_starts(1, vec![(0, 1)]),
        }
    }
}
