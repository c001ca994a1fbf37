//! Module registry for the capsicum translator.
//!
//! - [`Module`] / [`ModuleKind`] - one node of the program
//! - [`ModuleGraph`] - dotted-name table with import resolution and stub synthesis
//! - [`ModuleTable`] - the C descriptor table written for the loader
//! - [`DependencyGraph`] - import edges, reachability and Graphviz output

pub mod builtins;
pub mod deps;
pub mod graph;
pub mod module;
pub mod table;

pub use builtins::BUILTIN_MODULES;
pub use deps::DependencyGraph;
pub use graph::{ModuleGraph, ResolvedImport};
pub use module::{Module, ModuleKind, ModuleSource, entry_symbol, mangle, parent_name, prefixes};
pub use table::{ModuleRow, ModuleTable, RowBody, c_bytes_literal, c_string_literal};
