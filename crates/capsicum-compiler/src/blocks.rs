//! Static block and flow bookkeeping.
//!
//! The interpreter keeps a block stack per frame. Translation mirrors it
//! statically: each `SETUP_*` pushes a [`Block`] recording the stack level
//! at setup, and every instruction knows which handler an exception raised
//! there lands in. Exception handler entry is the one place the runtime
//! keeps its own record (see `UNWIND_TO` in `capsicum.h`), because a
//! `finally` body can be entered both normally and by an exception.

/// Kind of an open block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// `SETUP_LOOP`: target is the loop exit.
    Loop,
    /// `SETUP_EXCEPT`: try body; target is the first except clause.
    Except,
    /// `SETUP_FINALLY`: try body; target is the finally body.
    Finally,
    /// `SETUP_WITH`: with body; target is the cleanup sequence.
    With,
    /// Inside an except clause, until `POP_EXCEPT`.
    ExceptHandler,
}

impl BlockKind {
    /// Whether an exception raised inside lands in this block's pad.
    pub fn catches(self) -> bool {
        matches!(self, BlockKind::Except | BlockKind::Finally | BlockKind::With)
    }

    /// Whether `break`, `continue` and `return` must run this block's
    /// target before leaving.
    pub fn intercepts_exits(self) -> bool {
        matches!(self, BlockKind::Finally | BlockKind::With)
    }
}

/// One open block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Stack height when the block was set up.
    pub level: usize,
    /// Offset the block's setup names.
    pub target: usize,
    /// Landing pad id, for blocks that catch.
    pub pad: Option<usize>,
}

impl Block {
    /// Height left once the block's target sequence has run to completion.
    ///
    /// A with block's level counts the bound `__exit__`, which the cleanup
    /// consumes.
    pub fn settled_level(&self) -> usize {
        match self.kind {
            BlockKind::With => self.level.saturating_sub(1),
            _ => self.level,
        }
    }
}

/// C label of landing pad `id`.
pub fn pad_label(id: usize) -> String {
    format!("pad_{id}")
}

/// C label of the instruction at `offset`.
pub fn offset_label(offset: usize) -> String {
    format!("label_{offset}")
}

/// C label of exit continuation `id`.
pub fn unwind_label(id: usize) -> String {
    format!("unwind_{id}")
}

/// C label of the resume point after the yield at `offset`.
pub fn resume_label(offset: usize) -> String {
    format!("resume_{offset}")
}

/// Handler region opened at a setup target and closed by `END_FINALLY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Except,
    Finally,
    With,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Offset where the region starts.
    pub target: usize,
}

/// Reason for leaving a region through a finally body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Why {
    Return,
    Break,
    Continue,
}

impl Why {
    /// Name of the matching `CAPSICUM_WHY_*` constant.
    pub fn c_name(self) -> &'static str {
        match self {
            Why::Return => "CAPSICUM_WHY_RETURN",
            Why::Break => "CAPSICUM_WHY_BREAK",
            Why::Continue => "CAPSICUM_WHY_CONTINUE",
        }
    }
}

/// A numbered exit through a finally body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub id: usize,
    /// Target of the finally or with block the exit runs.
    pub through: usize,
    pub why: Why,
}

/// Reachability of the instruction being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowMode {
    /// Reached by fall-through or by a jump recorded on a checked path.
    #[default]
    Reachable,
    /// Reached only through a finally body entered by an exit or exception;
    /// heights are taken from the setup rather than checked.
    Soft,
    /// Follows an unconditional transfer with no recorded jump here yet.
    Dead,
}

/// The state a jump expects at its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpRecord {
    pub height: usize,
    pub blocks: Vec<Block>,
    /// Hard records come from checked paths and must agree with each other.
    pub hard: bool,
}
