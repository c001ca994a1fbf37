//! Compiled-unit model for the capsicum translator.
//!
//! This crate turns the host interpreter's compiled output into the typed
//! form the translator walks:
//!
//! - [`OpCode`] / [`Instruction`] - the wordcode instruction set and decoder
//! - [`CodeUnit`] - one immutable compiled routine with its pools and flags
//! - [`Constant`] - constant pool values, shared by identity
//! - [`LineTable`] - offset to line mapping
//! - [`CodeCompiler`] - the seam to the host compiler, with [`DumpCompiler`]
//! - [`CodeBuilder`] - assembles code units programmatically
//!
//! # Example
//!
//! ```
//! use capsicum_bytecode::{CodeCompiler, DumpCompiler, OpCode};
//!
//! let source = r#"{"name": "<module>", "stacksize": 1,
//!                  "code": [100, 0, 83, 0], "consts": ["none"]}"#;
//! let code = DumpCompiler.compile("main", source, "main.json").unwrap();
//! assert_eq!(code.instructions()[1].op, OpCode::RETURN_VALUE);
//! ```

pub mod builder;
pub mod code_unit;
pub mod compile;
pub mod constant;
pub mod dump;
pub mod effect;
pub mod flags;
pub mod import;
pub mod instruction;
pub mod line_table;
pub mod opcode;

pub use builder::{CodeBuilder, Label, max_stack_depth};
pub use code_unit::CodeUnit;
pub use compile::{CodeCompiler, DumpCompiler};
pub use constant::Constant;
pub use dump::CodeDump;
pub use effect::{HANDLER_ENTRY_PUSH, StackEffect, stack_effect};
pub use flags::CodeFlags;
pub use import::ImportStatement;
pub use instruction::{Instruction, decode};
pub use line_table::LineTable;
pub use opcode::{JumpKind, OpCategory, OpCode};
