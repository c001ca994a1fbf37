//! Bytecode to C translation for the capsicum translator.
//!
//! This crate turns code units into C functions written against the CPython
//! C API and `capsicum.h`:
//!
//! - [`TranslationContext`] - simulated operand stack, blocks and C emission
//! - [`translate`] - the per-instruction translator, one module per category
//! - [`ChunkSplitter`] - splitting oversized routines at clean points
//! - [`RoutineCompiler`] - one code unit to one (or several) C functions
//! - [`ModuleCompiler`] - a module and all its nested routines to one C file
//!
//! # Example
//!
//! ```
//! use capsicum_bytecode::{CodeBuilder, Constant, DumpCompiler, OpCode};
//! use capsicum_compiler::{ModuleCompiler, TranslateOptions};
//! use capsicum_registry::{ModuleGraph, ModuleKind};
//!
//! let mut b = CodeBuilder::module("main");
//! b.load_const(Constant::Int(1));
//! b.store_name("x");
//! b.load_const(Constant::None);
//! b.emit(OpCode::RETURN_VALUE);
//!
//! let graph = ModuleGraph::new();
//! let main = graph.add_compiled("main", ModuleKind::Defined, b.finish()).unwrap();
//! let options = TranslateOptions::default();
//! let out = ModuleCompiler::new(&graph, &DumpCompiler, &options)
//!     .compile_module(&main)
//!     .unwrap();
//! assert!(out.source.contains("PyObject* _main_MODULE__(PyFrameObject* f)"));
//! ```

pub mod blocks;
pub mod chunk;
pub mod codegen;
pub mod context;
pub mod emit;
pub mod options;
pub mod routine;
pub mod translate;

pub use blocks::{Block, BlockKind};
pub use chunk::{Chunk, ChunkSplitter};
pub use codegen::{ModuleCompiler, ModuleOutput};
pub use context::{FlowProbe, FlushedRoutine, ImportSite, RoutineEnd, TranslationContext};
pub use emit::{CEmitter, ConstantTable};
pub use options::{DEFAULT_CHUNK_THRESHOLD, DEFAULT_MIN_CHUNK, TranslateOptions};
pub use routine::{RoutineCompiler, RoutineOutput, nested_symbol};
pub use translate::{Resolver, translate_range};
