//! Translation context.
//!
//! One [`TranslationContext`] exists per routine (or per chunk of a split
//! routine). It simulates the operand stack height, tracks the static block
//! stack, records the state every jump expects at its target, and owns the
//! C statement buffer.
//!
//! ## Flow modes
//!
//! Translation is a single forward pass. After an unconditional transfer the
//! context is [`FlowMode::Dead`]: instructions are skipped until an offset
//! with a recorded jump is reached, whose height and blocks are adopted.
//! Falling through into a recorded offset with a different height is an
//! [`InconsistentHeight`] error.
//!
//! Finally bodies are special: besides normal fall-through, they are entered
//! by exits (`return`/`break`/`continue` pushing an exit marker) and by
//! exceptions (six values pushed). Their setups leave a *soft* record, used
//! only when nothing else reaches the body, and code reached that way is
//! [`FlowMode::Soft`]: emitted, but not height-checked.
//!
//! ## Generated shape
//!
//! ```c
//! PyObject* _main_MODULE__(PyFrameObject* f)
//! {
//!     PyObject** stack_pointer;
//!     PyObject* retval = NULL;
//!     ...
//!     stack_pointer = f->f_valuestack;
//!   label_0: ;
//!     /* 0: LOAD_CONST 0 (line 1) */
//!     ...
//!   pad_1: ;
//!     UNWIND_TO(0);
//!     __capsicum_enter_handler(f, &stack_pointer, 0);
//!     goto label_12;
//!   error: ;
//!     UNWIND_TO(0);
//!     retval = NULL;
//!   done: ;
//!     return retval;
//! }
//! ```
//!
//! [`InconsistentHeight`]: TranslationErrorKind::InconsistentHeight

use capsicum_bytecode::{CodeUnit, HANDLER_ENTRY_PUSH, Instruction};
use capsicum_core::{TranslationError, TranslationErrorKind};
use rustc_hash::FxHashMap;

use crate::blocks::{
    Block, BlockKind, Exit, FlowMode, JumpRecord, Scope, ScopeKind, Why, offset_label, pad_label,
    resume_label, unwind_label,
};
use crate::emit::{CEmitter, ConstantTable};

type Result<T> = std::result::Result<T, TranslationError>;

/// Flow state observed at one instruction, used by the chunk splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowProbe {
    pub offset: usize,
    /// Height at the instruction, `None` where it was skipped as dead.
    pub height: Option<usize>,
    /// Reachable with no open block or handler region.
    pub clean: bool,
}

/// One translated import site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    /// Absolute dotted name of the import target.
    pub target: String,
    /// Every module the import pulls in, ancestors first.
    pub modules: Vec<String>,
    pub line: u32,
}

/// Output of a flushed context.
#[derive(Debug, Clone)]
pub struct FlushedRoutine {
    /// The complete C function.
    pub text: String,
    /// Height when translation stopped.
    pub height: usize,
    /// Largest height seen.
    pub max_height: usize,
    pub imports: Vec<ImportSite>,
    pub probes: Vec<FlowProbe>,
    /// Offsets of the yields, in program order.
    pub resumes: Vec<usize>,
}

/// How translation ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineEnd {
    /// The last instruction of the routine; falling off is an error.
    Final,
    /// A chunk boundary; falling off continues in the next chunk.
    NextChunk,
}

/// Per-routine translation state.
pub struct TranslationContext<'c> {
    module: String,
    routine: String,
    nlocals: u32,
    is_generator: bool,
    entry_height: usize,
    first_offset: Option<usize>,

    emitter: CEmitter,
    consts: &'c mut ConstantTable,

    height: usize,
    max_height: usize,
    mode: FlowMode,
    blocks: Vec<Block>,
    scopes: Vec<(Scope, Option<usize>)>,
    scope_opens: FxHashMap<usize, ScopeKind>,
    records: FxHashMap<usize, JumpRecord>,
    seen: FxHashMap<usize, usize>,

    next_pad: usize,
    exits: Vec<Exit>,
    resumes: Vec<usize>,
    imports: Vec<ImportSite>,
    probes: Vec<FlowProbe>,

    offset: usize,
    line: u32,
}

impl<'c> TranslationContext<'c> {
    /// Context for `unit`, starting at `entry_height` (non-zero only for
    /// later chunks of a split routine).
    pub fn new(unit: &CodeUnit, consts: &'c mut ConstantTable, entry_height: usize) -> Self {
        let mut emitter = CEmitter::new();
        emitter.declare("stack_pointer", || "PyObject** stack_pointer;".to_string());
        emitter.declare("retval", || "PyObject* retval = NULL;".to_string());
        Self {
            module: unit.module().to_string(),
            routine: unit.name().to_string(),
            nlocals: unit.nlocals(),
            is_generator: unit.is_generator(),
            entry_height,
            first_offset: None,
            emitter,
            consts,
            height: entry_height,
            max_height: entry_height,
            mode: FlowMode::Reachable,
            blocks: Vec::new(),
            scopes: Vec::new(),
            scope_opens: FxHashMap::default(),
            records: FxHashMap::default(),
            seen: FxHashMap::default(),
            next_pad: 1,
            exits: Vec::new(),
            resumes: Vec::new(),
            imports: Vec::new(),
            probes: Vec::new(),
            offset: 0,
            line: unit.first_line(),
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    /// Error located at the current instruction.
    pub fn error(&self, kind: TranslationErrorKind) -> TranslationError {
        TranslationError::new(&self.module, &self.routine, self.offset, kind)
    }

    pub fn fail<T>(&self, kind: TranslationErrorKind) -> Result<T> {
        Err(self.error(kind))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn mode(&self) -> FlowMode {
        self.mode
    }

    pub fn is_dead(&self) -> bool {
        self.mode == FlowMode::Dead
    }

    pub fn is_generator(&self) -> bool {
        self.is_generator
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn consts(&mut self) -> &mut ConstantTable {
        &mut *self.consts
    }

    pub fn record_import(&mut self, site: ImportSite) {
        self.imports.push(site);
    }

    // =========================================================================
    // Instruction boundaries
    // =========================================================================

    /// Note block-setup structure. Runs for every instruction, dead or not,
    /// so handler regions stay paired with their `END_FINALLY`.
    pub fn note_structure(&mut self, instr: &Instruction) {
        use capsicum_bytecode::OpCode::*;
        let kind = match instr.op {
            SETUP_EXCEPT => ScopeKind::Except,
            SETUP_FINALLY => ScopeKind::Finally,
            SETUP_WITH => ScopeKind::With,
            _ => return,
        };
        if let Some(target) = instr.jump_target() {
            self.scope_opens.insert(target, kind);
        }
    }

    /// Enter `instr`. Returns whether it must be translated.
    pub fn begin(&mut self, instr: &Instruction) -> Result<bool> {
        self.offset = instr.offset;
        self.line = instr.line;
        self.first_offset.get_or_insert(instr.offset);

        if let Some(record) = self.records.get(&instr.offset) {
            match (self.mode, record.hard) {
                (FlowMode::Reachable, true) => {
                    if record.height != self.height {
                        return self.fail(TranslationErrorKind::InconsistentHeight {
                            expected: record.height,
                            found: self.height,
                        });
                    }
                }
                (FlowMode::Reachable, false) | (FlowMode::Soft, false) => {}
                (_, hard) => {
                    self.height = record.height;
                    self.blocks = record.blocks.clone();
                    self.mode = if hard {
                        FlowMode::Reachable
                    } else {
                        FlowMode::Soft
                    };
                }
            }
        }

        if let Some(kind) = self.scope_opens.remove(&instr.offset) {
            let floor = (!self.is_dead()).then(|| {
                let entered = match kind {
                    ScopeKind::Except => HANDLER_ENTRY_PUSH as usize,
                    ScopeKind::Finally => 1,
                    ScopeKind::With => 2,
                };
                self.height.saturating_sub(entered)
            });
            self.scopes.push((
                Scope {
                    kind,
                    target: instr.offset,
                },
                floor,
            ));
        }

        let live = !self.is_dead();
        self.probes.push(FlowProbe {
            offset: instr.offset,
            height: live.then_some(self.height),
            clean: self.mode == FlowMode::Reachable
                && self.blocks.is_empty()
                && self.scopes.is_empty(),
        });

        if live {
            if self.mode == FlowMode::Reachable {
                self.seen.insert(instr.offset, self.height);
            }
            self.emitter.label(offset_label(instr.offset));
            if instr.op.has_arg() {
                self.emitter.comment(format!(
                    "{}: {} {} (line {})",
                    instr.offset,
                    instr.op.name(),
                    instr.arg,
                    instr.line
                ));
            } else {
                self.emitter
                    .comment(format!("{}: {} (line {})", instr.offset, instr.op.name(), instr.line));
            }
        }
        Ok(live)
    }

    // =========================================================================
    // Stack
    // =========================================================================

    pub fn push(&mut self, n: usize) {
        self.height += n;
        self.max_height = self.max_height.max(self.height);
    }

    pub fn pop(&mut self, n: usize) -> Result<()> {
        if self.height < n {
            return self.fail(TranslationErrorKind::StackUnderflow);
        }
        self.height -= n;
        Ok(())
    }

    /// Fail unless at least `n` values are on the stack.
    pub fn require(&self, n: usize) -> Result<()> {
        if self.height < n {
            return self.fail(TranslationErrorKind::StackUnderflow);
        }
        Ok(())
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Declare C locals on first use.
    pub fn uses(&mut self, names: &[&str]) {
        for &name in names {
            let nlocals = self.nlocals;
            self.emitter.declare(name, || match name {
                "err" => "int err = 0;".to_string(),
                "fastlocals" => "PyObject** fastlocals = f->f_localsplus;".to_string(),
                "freevars" => format!("PyObject** freevars = f->f_localsplus + {nlocals};"),
                other => format!("PyObject* {other} = NULL;"),
            });
        }
    }

    pub fn stmt(&mut self, text: impl Into<String>) {
        self.emitter.stmt(text);
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.emitter.comment(text);
    }

    pub fn label(&mut self, name: impl Into<String>) {
        self.emitter.label(name);
    }

    pub fn goto(&mut self, label: &str) {
        self.emitter.goto(label);
    }

    /// Label an exception raised here unwinds to.
    pub fn handler_label(&self) -> String {
        self.blocks
            .iter()
            .rev()
            .find(|b| b.kind.catches())
            .and_then(|b| b.pad)
            .map(pad_label)
            .unwrap_or_else(|| "error".to_string())
    }

    /// `if (cond) { traceback; goto handler; }`
    pub fn check(&mut self, cond: &str) {
        self.check_with(cond, &[]);
    }

    /// Like [`check`](Self::check), running `first` before the traceback.
    pub fn check_with(&mut self, cond: &str, first: &[&str]) {
        let handler = self.handler_label();
        self.emitter.reference(&handler);
        let mut text = format!("if ({cond}) {{\n");
        for stmt in first {
            text.push_str("    ");
            text.push_str(stmt);
            text.push('\n');
        }
        text.push_str(&format!(
            "    __capsicum_traceback(f, {});\n    goto {handler};\n}}",
            self.line
        ));
        self.emitter.stmt(text);
    }

    /// Jump to the current handler with the error already set.
    pub fn raise_to_handler(&mut self) {
        let handler = self.handler_label();
        self.emitter.goto(&handler);
    }

    // =========================================================================
    // Jumps
    // =========================================================================

    fn record(&mut self, target: usize, height: usize, blocks: Vec<Block>) -> Result<()> {
        match self.mode {
            FlowMode::Dead => Ok(()),
            FlowMode::Soft => {
                self.records.entry(target).or_insert(JumpRecord {
                    height,
                    blocks,
                    hard: false,
                });
                Ok(())
            }
            FlowMode::Reachable => {
                if let Some(&seen) = self.seen.get(&target) {
                    if seen != height {
                        return self.fail(TranslationErrorKind::InconsistentHeight {
                            expected: seen,
                            found: height,
                        });
                    }
                }
                let hard = self
                    .records
                    .get(&target)
                    .filter(|r| r.hard)
                    .map(|r| r.height);
                match hard {
                    Some(expected) if expected != height => {
                        self.fail(TranslationErrorKind::InconsistentHeight {
                            expected,
                            found: height,
                        })
                    }
                    Some(_) => Ok(()),
                    None => {
                        self.records.insert(
                            target,
                            JumpRecord {
                                height,
                                blocks,
                                hard: true,
                            },
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    fn record_soft(&mut self, target: usize, height: usize, blocks: Vec<Block>) {
        if self.is_dead() {
            return;
        }
        self.records.entry(target).or_insert(JumpRecord {
            height,
            blocks,
            hard: false,
        });
    }

    /// Record a jump to `target` arriving with `height`, and return the
    /// referenced label.
    pub fn branch(&mut self, target: usize, height: usize) -> Result<String> {
        self.record(target, height, self.blocks.clone())?;
        let label = offset_label(target);
        self.emitter.reference(&label);
        Ok(label)
    }

    /// Control does not continue to the next instruction.
    pub fn transfer(&mut self) {
        self.mode = FlowMode::Dead;
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    fn handler_pad(&mut self, level: usize, target: usize) -> usize {
        let id = self.next_pad;
        self.next_pad += 1;
        let body = self.emitter.open_section(pad_label(id));
        self.emitter.stmt(format!("UNWIND_TO({level});"));
        self.emitter
            .stmt(format!("__capsicum_enter_handler(f, &stack_pointer, {level});"));
        self.emitter.goto(&offset_label(target));
        self.emitter.restore(body);
        id
    }

    /// Open a block at the current height.
    pub fn setup(&mut self, kind: BlockKind, target: usize) -> Result<()> {
        let level = self.height;
        let outer = self.blocks.clone();
        let pad = kind.catches().then(|| self.handler_pad(level, target));
        match kind {
            BlockKind::Loop => {}
            BlockKind::Except => {
                let mut inside = outer;
                inside.push(Block {
                    kind: BlockKind::ExceptHandler,
                    level,
                    target,
                    pad: None,
                });
                self.record(target, level + HANDLER_ENTRY_PUSH as usize, inside)?;
            }
            BlockKind::Finally | BlockKind::With => self.record_soft(target, level + 1, outer),
            BlockKind::ExceptHandler => {
                return self.fail(TranslationErrorKind::BlockMismatch {
                    detail: "except clauses are opened by handler entry",
                });
            }
        }
        self.blocks.push(Block {
            kind,
            level,
            target,
            pad,
        });
        Ok(())
    }

    /// `POP_BLOCK`.
    pub fn pop_block(&mut self) -> Result<()> {
        let Some(block) = self.blocks.pop() else {
            return self.fail(TranslationErrorKind::BlockMismatch {
                detail: "POP_BLOCK with no open block",
            });
        };
        if block.kind == BlockKind::ExceptHandler {
            return self.fail(TranslationErrorKind::BlockMismatch {
                detail: "POP_BLOCK inside an except clause",
            });
        }
        if self.height > block.level {
            self.stmt(format!("STACK_UNWIND({});", block.level));
            self.height = block.level;
        }
        Ok(())
    }

    /// `POP_EXCEPT`: leave an except clause, restoring the saved exception.
    pub fn pop_except(&mut self) -> Result<()> {
        match self.blocks.last() {
            Some(block) if block.kind == BlockKind::ExceptHandler => {}
            _ => {
                return self.fail(TranslationErrorKind::BlockMismatch {
                    detail: "POP_EXCEPT outside an except clause",
                });
            }
        }
        let level = self.blocks.pop().map(|b| b.level).unwrap_or_default();
        self.require(level + 3)?;
        self.stmt(format!("UNWIND_TO({level});"));
        self.height = level;
        Ok(())
    }

    // =========================================================================
    // Exits
    // =========================================================================

    fn floor(&self) -> usize {
        let blocks = self.blocks.first().map(Block::settled_level);
        let scopes = self.scopes.iter().filter_map(|(_, floor)| *floor).min();
        match (blocks, scopes) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => self.height,
        }
    }

    /// `RETURN_VALUE`.
    pub fn return_value(&mut self) -> Result<()> {
        self.pop(1)?;
        self.uses(&["retval"]);
        self.stmt("retval = POP();");
        if self.mode == FlowMode::Reachable {
            let floor = self.floor();
            if floor != 0 {
                return self.fail(TranslationErrorKind::UnbalancedReturn { height: floor });
            }
        }
        let (depth, height) = (self.blocks.len(), self.height);
        self.unwind_exit(Why::Return, depth, height, None)?;
        self.transfer();
        Ok(())
    }

    /// `BREAK_LOOP`.
    pub fn break_loop(&mut self) -> Result<()> {
        let (depth, height) = (self.blocks.len(), self.height);
        self.unwind_exit(Why::Break, depth, height, None)?;
        self.transfer();
        Ok(())
    }

    /// `CONTINUE_LOOP target`.
    pub fn continue_loop(&mut self, target: usize) -> Result<()> {
        let (depth, height) = (self.blocks.len(), self.height);
        self.unwind_exit(Why::Continue, depth, height, Some(target))?;
        self.transfer();
        Ok(())
    }

    /// Leave through `blocks[..depth]`, innermost first. The first block
    /// that intercepts exits receives a numbered exit marker; the rest of
    /// the walk is emitted as that exit's continuation.
    fn unwind_exit(
        &mut self,
        why: Why,
        depth: usize,
        mut height: usize,
        continue_target: Option<usize>,
    ) -> Result<()> {
        for i in (0..depth).rev() {
            let block = self.blocks[i].clone();
            match block.kind {
                BlockKind::Loop => match (why, continue_target) {
                    (Why::Break, _) => {
                        self.stmt(format!("UNWIND_TO({});", block.level));
                        self.record(block.target, block.level, self.blocks[..i].to_vec())?;
                        self.goto(&offset_label(block.target));
                        return Ok(());
                    }
                    (Why::Continue, Some(target)) => {
                        self.stmt(format!("UNWIND_TO({height});"));
                        self.record(target, height, self.blocks[..=i].to_vec())?;
                        self.goto(&offset_label(target));
                        return Ok(());
                    }
                    _ => {}
                },
                kind if kind.intercepts_exits() => {
                    let id = self.exits.len() + 1;
                    self.exits.push(Exit {
                        id,
                        through: block.target,
                        why,
                    });
                    self.uses(&["retval"]);
                    self.stmt(format!("UNWIND_TO({});", block.level));
                    if why == Why::Return {
                        self.stmt("PUSH(retval);");
                    }
                    self.stmt(format!(
                        "PUSH(PyLong_FromLong(CAPSICUM_EXIT({id}, {})));",
                        why.c_name()
                    ));
                    self.goto(&offset_label(block.target));

                    let body = self.emitter.open_section(unwind_label(id));
                    let walked = self.unwind_exit(why, i, block.settled_level(), continue_target);
                    self.emitter.restore(body);
                    return walked;
                }
                _ => height = block.level,
            }
        }
        match why {
            Why::Return => {
                self.stmt("UNWIND_TO(0);");
                self.goto("done");
                Ok(())
            }
            Why::Break | Why::Continue => self.fail(TranslationErrorKind::BlockMismatch {
                detail: "break or continue outside a loop",
            }),
        }
    }

    // =========================================================================
    // Handler regions
    // =========================================================================

    /// `END_FINALLY` on a dead path: only close the region.
    pub fn close_scope(&mut self) {
        self.scopes.pop();
    }

    /// `END_FINALLY`.
    pub fn end_finally(&mut self) -> Result<()> {
        let Some((scope, _)) = self.scopes.pop() else {
            return self.fail(TranslationErrorKind::BlockMismatch {
                detail: "END_FINALLY outside a handler region",
            });
        };
        self.pop(1)?;
        self.uses(&["v"]);
        let handler = self.handler_label();
        self.emitter.reference(&handler);

        if scope.kind == ScopeKind::Except {
            // no clause matched
            self.stmt("v = POP();");
            self.stmt("__capsicum_reraise(&stack_pointer, v);");
            self.goto(&handler);
            self.transfer();
            return Ok(());
        }

        self.uses(&["err", "retval"]);
        let mut text = String::from(
            "v = POP();\nif (v == Py_None) {\n    Py_DECREF(v);\n}\nelse if (PyLong_CheckExact(v)) {\n    err = (int)PyLong_AsLong(v);\n    Py_DECREF(v);\n    switch (err) {\n",
        );
        let exits: Vec<Exit> = self
            .exits
            .iter()
            .filter(|e| e.through == scope.target)
            .copied()
            .collect();
        for exit in exits {
            let label = unwind_label(exit.id);
            self.emitter.reference(&label);
            text.push_str(&format!(
                "    case CAPSICUM_EXIT({}, {}):\n",
                exit.id,
                exit.why.c_name()
            ));
            if exit.why == Why::Return {
                text.push_str("        retval = POP();\n");
            }
            text.push_str(&format!("        goto {label};\n"));
        }
        if scope.kind == ScopeKind::With {
            text.push_str(&format!(
                "    case CAPSICUM_WHY_SILENCED:\n        UNWIND_TO({});\n        break;\n",
                self.height
            ));
        }
        text.push_str(&format!(
            "    default:\n        break;\n    }}\n}}\nelse {{\n    __capsicum_reraise(&stack_pointer, v);\n    goto {handler};\n}}"
        ));
        self.stmt(text);
        Ok(())
    }

    // =========================================================================
    // Generators
    // =========================================================================

    /// Record a resume point after the yield at `offset`; returns its label.
    pub fn add_resume(&mut self, offset: usize) -> String {
        self.resumes.push(offset);
        let label = resume_label(offset);
        self.emitter.reference(&label);
        label
    }

    // =========================================================================
    // Flush
    // =========================================================================

    fn prologue(&mut self) -> String {
        let mut out = String::new();
        if self.is_generator {
            let first = offset_label(self.first_offset.unwrap_or(0));
            self.emitter.reference(&first);
            self.emitter.reference("error");
            out.push_str("    stack_pointer = f->f_stacktop;\n    f->f_stacktop = NULL;\n");
            out.push_str("    switch (f->f_lasti) {\n");
            out.push_str(&format!("    case -1:\n        goto {first};\n"));
            for &offset in &self.resumes {
                out.push_str(&format!(
                    "    case {offset}:\n        goto {};\n",
                    resume_label(offset)
                ));
            }
            out.push_str("    default:\n        PyErr_SetString(PyExc_SystemError, \"invalid generator resume point\");\n        goto error;\n    }\n");
        } else if self.entry_height == 0 {
            out.push_str("    stack_pointer = f->f_valuestack;\n");
        } else {
            out.push_str(&format!(
                "    stack_pointer = f->f_valuestack + {};\n",
                self.entry_height
            ));
        }
        out
    }

    /// Close the routine and render it as one C function.
    ///
    /// `preamble` statements run before the stack pointer is set up.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn finish(
        mut self,
        signature: &str,
        preamble: &[String],
        end: RoutineEnd,
    ) -> Result<FlushedRoutine> {
        match end {
            RoutineEnd::Final if !self.is_dead() => {
                return self.fail(TranslationErrorKind::FallsOffEnd);
            }
            RoutineEnd::Final => {}
            RoutineEnd::NextChunk => {
                if !self.is_dead() {
                    self.stmt("return CAPSICUM_NEXT_CHUNK;");
                }
            }
        }

        let prologue = self.prologue();

        let body = self.emitter.open_section("error");
        self.emitter.stmt("UNWIND_TO(0);");
        self.emitter.stmt("retval = NULL;");
        self.emitter.restore(body);
        let body = self.emitter.open_section("done");
        self.emitter.stmt("return retval;");
        self.emitter.restore(body);
        self.emitter.reference("done");

        let mut text = String::new();
        text.push_str(signature);
        text.push_str("\n{\n");
        for decl in self.emitter.declarations() {
            text.push_str("    ");
            text.push_str(decl);
            text.push('\n');
        }
        text.push('\n');
        for stmt in preamble {
            text.push_str("    ");
            text.push_str(stmt);
            text.push('\n');
        }
        text.push_str(&prologue);
        self.emitter.render(&mut text);
        text.push_str("}\n");

        tracing::trace!(
            routine = %self.routine,
            statements = self.emitter.statement_count(),
            max_height = self.max_height,
            "routine flushed"
        );

        Ok(FlushedRoutine {
            text,
            height: self.height,
            max_height: self.max_height,
            imports: self.imports,
            probes: self.probes,
            resumes: self.resumes,
        })
    }
}
