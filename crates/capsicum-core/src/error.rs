//! Error types for every translation phase.
//!
//! ## Error Hierarchy
//!
//! ```text
//! CapsicumError (top-level wrapper)
//! ├── CompileError      - a module's compiled form could not be obtained
//! ├── DecodeError       - raw wordcode is malformed
//! ├── ResolutionError   - an import cannot be satisfied
//! ├── TranslationError  - an instruction cannot be emitted as C
//! ├── ChunkingError     - an oversized routine has no valid split point
//! └── Io / Config       - orchestration plumbing
//! ```
//!
//! Every phase error is local to one module or code unit. The orchestrator
//! collects them per module and decides whether the batch continues.

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Decode Errors
// ============================================================================

/// Malformed wordcode found while decoding a code unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Wordcode length is not a multiple of the instruction width.
    #[error("truncated wordcode: {len} bytes is not a whole number of instructions")]
    Truncated { len: usize },

    /// An opcode byte with no known meaning.
    #[error("unknown opcode {byte} at offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },

    /// `EXTENDED_ARG` as the last instruction, with nothing to extend.
    #[error("EXTENDED_ARG at offset {offset} is not followed by an instruction")]
    DanglingExtendedArg { offset: usize },

    /// A jump whose destination is not an instruction boundary.
    #[error("jump at offset {offset} targets {target}, which is not an instruction")]
    BadJumpTarget { offset: usize, target: usize },
}

// ============================================================================
// Compile Errors
// ============================================================================

/// The compiler collaborator could not produce a code unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The module has no source text to compile.
    #[error("module '{module}' has no source")]
    MissingSource { module: String },

    /// The compiled dump could not be parsed.
    #[error("cannot parse compiled unit for '{module}': {detail}")]
    Parse { module: String, detail: String },

    /// The dump parsed but its wordcode is malformed.
    #[error("malformed bytecode in '{module}': {source}")]
    Decode {
        module: String,
        #[source]
        source: DecodeError,
    },
}

// ============================================================================
// Resolution Errors
// ============================================================================

/// An import statement that cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Relative import walks above the root package.
    #[error("relative import of '{name}' (level {level}) from '{importer}' goes beyond the top-level package")]
    BeyondTopLevel {
        importer: String,
        name: String,
        level: u32,
    },

    /// Name is unknown and external resolution is disabled.
    #[error("cannot resolve import '{name}' from '{importer}'")]
    Unresolved { importer: String, name: String },

    /// Name lies under a local package that does not contain it.
    #[error("'{name}' is not part of local package '{package}'")]
    MissingSubmodule { name: String, package: String },

    /// Two names hash to the same module id.
    #[error("module id collision between '{name}' and '{existing}'")]
    IdCollision { name: String, existing: String },

    /// Two names mangle to the same C entry symbol.
    #[error("modules '{name}' and '{existing}' share the C symbol '{symbol}'")]
    SymbolCollision {
        name: String,
        existing: String,
        symbol: String,
    },
}

impl ResolutionError {
    /// Name of the import that failed.
    pub fn name(&self) -> &str {
        match self {
            ResolutionError::BeyondTopLevel { name, .. } => name,
            ResolutionError::Unresolved { name, .. } => name,
            ResolutionError::MissingSubmodule { name, .. } => name,
            ResolutionError::IdCollision { name, .. } => name,
            ResolutionError::SymbolCollision { name, .. } => name,
        }
    }
}

// ============================================================================
// Translation Errors
// ============================================================================

/// What went wrong while translating one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationErrorKind {
    /// An instruction popped more values than the simulated stack holds.
    #[error("stack underflow")]
    StackUnderflow,

    /// Two paths reach the same offset with different stack heights.
    #[error("inconsistent stack height: expected {expected}, found {found}")]
    InconsistentHeight { expected: usize, found: usize },

    /// A return leaves values behind after block unwinding.
    #[error("unbalanced stack at return: {height} value(s) left")]
    UnbalancedReturn { height: usize },

    /// A chunk ends at a different height than the next chunk inherits.
    #[error("chunk boundary height mismatch: next chunk expects {expected}, found {found}")]
    ChunkBoundary { expected: usize, found: usize },

    /// The opcode is decoded but has no C translation.
    #[error("unsupported opcode {name}")]
    UnsupportedOpcode { name: &'static str },

    /// An operand indexes outside the code unit's pools.
    #[error("{pool} index {index} out of range")]
    InvalidOperand { pool: &'static str, index: u32 },

    /// Block stack misuse (pop of an empty stack, wrong block kind).
    #[error("block stack: {detail}")]
    BlockMismatch { detail: &'static str },

    /// An import whose level or from-list is not a compile-time constant.
    #[error("non-constant import operand")]
    ImportOperand,

    /// A yield in a routine without the generator flag.
    #[error("yield outside a generator")]
    YieldOutsideGenerator,

    /// Two routines of one module mangle to the same C symbol.
    #[error("duplicate routine symbol '{symbol}'")]
    DuplicateSymbol { symbol: String },

    /// The last instruction can fall through past the end of the routine.
    #[error("control falls off the end of the routine")]
    FallsOffEnd,

    /// An import that cannot be resolved against the module graph.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The wordcode itself is malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A code unit that could not be translated, with its location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{module}: {routine} at offset {offset}: {kind}")]
pub struct TranslationError {
    /// Owning module's dotted name.
    pub module: String,
    /// Name of the routine (code unit) being translated.
    pub routine: String,
    /// Byte offset of the offending instruction.
    pub offset: usize,
    /// Failure detail.
    pub kind: TranslationErrorKind,
}

impl TranslationError {
    pub fn new(
        module: impl Into<String>,
        routine: impl Into<String>,
        offset: usize,
        kind: TranslationErrorKind,
    ) -> Self {
        Self {
            module: module.into(),
            routine: routine.into(),
            offset,
            kind,
        }
    }
}

// ============================================================================
// Chunking Errors
// ============================================================================

/// An oversized routine with no valid split point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot split routine '{routine}' ({instructions} instructions): no valid split point between {min_chunk} and {threshold} instructions after offset {offset}")]
pub struct ChunkingError {
    pub routine: String,
    pub instructions: usize,
    pub threshold: usize,
    pub min_chunk: usize,
    /// Offset of the first instruction of the chunk that could not be closed.
    pub offset: usize,
}

// ============================================================================
// Top-level Error
// ============================================================================

/// Umbrella error reported by the orchestration layer.
#[derive(Debug, Error)]
pub enum CapsicumError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// File-system failure while reading inputs or writing artifacts.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid project configuration.
    #[error("configuration: {0}")]
    Config(String),
}

impl CapsicumError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CapsicumError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short phase name, used in build reports.
    pub fn phase(&self) -> &'static str {
        match self {
            CapsicumError::Compile(_) => "compile",
            CapsicumError::Decode(_) => "decode",
            CapsicumError::Resolution(_) => "resolution",
            CapsicumError::Translation(_) => "translation",
            CapsicumError::Chunking(_) => "chunking",
            CapsicumError::Io { .. } => "io",
            CapsicumError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_error_display_has_location() {
        let err = TranslationError::new(
            "pkg.mod",
            "<module>",
            14,
            TranslationErrorKind::UnsupportedOpcode { name: "GET_AWAITABLE" },
        );
        assert_eq!(
            err.to_string(),
            "pkg.mod: <module> at offset 14: unsupported opcode GET_AWAITABLE"
        );
    }

    #[test]
    fn resolution_converts_into_translation_kind() {
        let res = ResolutionError::Unresolved {
            importer: "main".into(),
            name: "missing".into(),
        };
        let kind: TranslationErrorKind = res.clone().into();
        assert_eq!(kind.to_string(), res.to_string());
        assert_eq!(res.name(), "missing");
    }

    #[test]
    fn phase_names() {
        let err: CapsicumError = ChunkingError {
            routine: "big".into(),
            instructions: 10_000,
            threshold: 4096,
            min_chunk: 64,
            offset: 0,
        }
        .into();
        assert_eq!(err.phase(), "chunking");
        assert!(err.to_string().contains("10000 instructions"));
    }

    #[test]
    fn io_error_mentions_path() {
        let err = CapsicumError::io(
            "build/gen/main.c",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "build/gen/main.c: denied");
    }
}
