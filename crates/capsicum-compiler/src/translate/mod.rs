//! Instruction translation.
//!
//! [`InstructionTranslator`] maps one instruction onto C statements and
//! context mutations. Dispatch is a match over [`OpCategory`]; each category
//! lives in its own submodule:
//!
//! - [`stack`] - shuffles and duplicates
//! - [`local`] - fast-local slots
//! - [`access`] - names, globals, attributes, subscripts, constants
//! - [`arith`] - operators and comparisons
//! - [`build`] - container builders and unpacking
//! - [`jump`] - jumps, loops and iteration
//! - [`call`] - calls and function construction
//! - [`exception`] - handler blocks, raise, context managers
//! - [`import`] - imports, resolved against the module graph
//! - [`generator`] - return, yield and yield-from
//! - [`closure`] - cell and free variables

mod access;
mod arith;
mod build;
mod call;
mod closure;
mod exception;
mod generator;
mod import;
mod jump;
mod local;
mod stack;

use std::ops::Range;
use std::sync::Arc;

use capsicum_bytecode::{CodeUnit, Instruction, OpCategory, OpCode};
use capsicum_core::{TranslationError, TranslationErrorKind};
use capsicum_registry::{Module, ModuleGraph, c_string_literal};

use crate::context::TranslationContext;

type Result<T> = std::result::Result<T, TranslationError>;

/// What imports are resolved against.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    pub graph: &'a ModuleGraph,
    /// Module whose code is being translated.
    pub importer: &'a Module,
    pub allow_external: bool,
}

/// Translates one instruction at a time into a [`TranslationContext`].
pub struct InstructionTranslator<'t, 'c> {
    ctx: &'t mut TranslationContext<'c>,
    unit: &'t CodeUnit,
    resolver: Resolver<'t>,
    /// Index of the current instruction in the unit.
    index: usize,
}

/// Drive the translator over `range` (instruction indices of `unit`).
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn translate_range(
    ctx: &mut TranslationContext<'_>,
    unit: &CodeUnit,
    resolver: Resolver<'_>,
    range: Range<usize>,
) -> Result<()> {
    let instructions = unit.instructions();
    for index in range {
        let instr = &instructions[index];
        ctx.note_structure(instr);
        if !ctx.begin(instr)? {
            if instr.op == OpCode::END_FINALLY {
                ctx.close_scope();
            }
            continue;
        }
        InstructionTranslator {
            ctx: &mut *ctx,
            unit,
            resolver,
            index,
        }
        .translate(instr)?;
    }
    Ok(())
}

impl InstructionTranslator<'_, '_> {
    /// Emit one live instruction.
    pub fn translate(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op.category() {
            OpCategory::Stack => self.stack(instr),
            OpCategory::Local => self.local(instr),
            OpCategory::Access => self.access(instr),
            OpCategory::Arithmetic => self.arithmetic(instr),
            OpCategory::Build => self.build(instr),
            OpCategory::Jump => self.jump(instr),
            OpCategory::Call => self.call(instr),
            OpCategory::Exception => self.exception(instr),
            OpCategory::Import => self.import(instr),
            OpCategory::Generator => self.generator(instr),
            OpCategory::Closure => self.closure(instr),
            // the instruction comment is all there is
            OpCategory::NoOp => Ok(()),
            OpCategory::Unsupported => self.unsupported(instr),
        }
    }

    // =========================================================================
    // Helpers shared by the category modules
    // =========================================================================

    fn unsupported(&self, instr: &Instruction) -> Result<()> {
        self.ctx.fail(TranslationErrorKind::UnsupportedOpcode {
            name: instr.op.name(),
        })
    }

    fn invalid<T>(&self, pool: &'static str, index: u32) -> Result<T> {
        self.ctx
            .fail(TranslationErrorKind::InvalidOperand { pool, index })
    }

    /// Emit several statements.
    fn emit(&mut self, stmts: &[&str]) {
        for stmt in stmts {
            self.ctx.stmt(*stmt);
        }
    }

    /// Accessor of the interned name at `index` of the name pool.
    fn name(&mut self, index: u32) -> Result<String> {
        match self.unit.name_at(index) {
            Some(name) => {
                let name = Arc::clone(name);
                Ok(self.ctx.consts().name(&name))
            }
            None => self.invalid("names", index),
        }
    }

    /// Quoted local variable name, for unbound-local messages.
    fn varname_literal(&self, index: u32) -> Result<String> {
        match self.unit.varname_at(index) {
            Some(name) => Ok(c_string_literal(name)),
            None => self.invalid("varnames", index),
        }
    }

    /// Quoted cell or free variable name.
    fn cell_literal(&self, index: u32) -> Result<String> {
        match self.unit.cell_or_free_at(index) {
            Some(name) => Ok(c_string_literal(name)),
            None => self.invalid("cells", index),
        }
    }

    /// Destination of a jump or block setup.
    fn target(&self, instr: &Instruction) -> Result<usize> {
        match instr.jump_target() {
            Some(target) => Ok(target),
            None => self.invalid("jump", instr.arg),
        }
    }

    /// Pop-result-push pattern: `SET_TOP(x)` followed by the NULL check.
    fn set_top_checked(&mut self) {
        self.ctx.stmt("SET_TOP(x);");
        self.ctx.check("x == NULL");
    }

    /// Push `x` after a NULL check.
    fn push_checked(&mut self) {
        self.ctx.check("x == NULL");
        self.ctx.stmt("PUSH(x);");
        self.ctx.push(1);
    }
}
