//! Per-module C generation.
//!
//! A module's C file holds every routine reachable from its top-level code
//! unit. Nested routines come before the routines whose constants create
//! them, and all of them are forward declared at the top of the file.

use std::fmt::Write;
use std::sync::Arc;

use capsicum_bytecode::CodeCompiler;
use capsicum_core::{CapsicumError, TranslationError, TranslationErrorKind};
use capsicum_registry::{Module, ModuleGraph};
use rustc_hash::FxHashSet;

use crate::context::ImportSite;
use crate::options::TranslateOptions;
use crate::routine::{RoutineCompiler, routine_tree};
use crate::translate::Resolver;

/// The generated C of one module.
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    /// Dotted module name.
    pub module: String,
    /// `<mangled>.c`
    pub file_name: String,
    pub source: String,
    pub imports: Vec<ImportSite>,
    pub routines: usize,
    /// C functions across all routines, chunk functions included.
    pub chunks: usize,
}

/// Translates whole modules against a shared graph.
pub struct ModuleCompiler<'a> {
    graph: &'a ModuleGraph,
    compiler: &'a dyn CodeCompiler,
    options: &'a TranslateOptions,
}

impl<'a> ModuleCompiler<'a> {
    pub fn new(
        graph: &'a ModuleGraph,
        compiler: &'a dyn CodeCompiler,
        options: &'a TranslateOptions,
    ) -> Self {
        Self {
            graph,
            compiler,
            options,
        }
    }

    /// Generate the C file of `module`, compiling its code unit if needed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_module(&self, module: &Arc<Module>) -> Result<ModuleOutput, CapsicumError> {
        let _span = tracing::debug_span!("module", name = module.name()).entered();

        let code = module.code(self.compiler)?;
        let tree = routine_tree(&code, module.entry_symbol());

        let mut seen = FxHashSet::default();
        for (unit, symbol) in &tree {
            if !seen.insert(symbol.as_str()) {
                return Err(TranslationError::new(
                    module.name(),
                    unit.name(),
                    0,
                    TranslationErrorKind::DuplicateSymbol {
                        symbol: symbol.clone(),
                    },
                )
                .into());
            }
        }

        let resolver = Resolver {
            graph: self.graph,
            importer: module,
            allow_external: self.options.allow_external,
        };
        let routines = RoutineCompiler::new(resolver, self.options);

        let mut source = String::new();
        let _ = writeln!(source, "/* capsicum: module '{}' */", module.name());
        source.push_str("#include \"capsicum.h\"\n\n");
        for (_, symbol) in tree.iter().skip(1) {
            let _ = writeln!(source, "PyObject* {symbol}(PyFrameObject* f); /* fwd decl */");
        }
        if tree.len() > 1 {
            source.push('\n');
        }

        let mut imports = Vec::new();
        let mut chunks = 0;
        // children sit after their parents in the tree
        for (unit, symbol) in tree.iter().rev() {
            let out = routines.compile(unit, symbol)?;
            chunks += out.chunks;
            imports.extend(out.imports);
            source.push_str(&out.text);
            source.push('\n');
        }

        tracing::debug!(
            routines = tree.len(),
            chunks,
            imports = imports.len(),
            "module translated"
        );
        Ok(ModuleOutput {
            module: module.name().to_string(),
            file_name: format!("{}.c", module.mangled_name()),
            source,
            imports,
            routines: tree.len(),
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsicum_bytecode::{CodeBuilder, CodeUnit, Constant, DumpCompiler, OpCode};
    use capsicum_registry::ModuleKind;

    fn function(name: &str) -> Arc<CodeUnit> {
        let mut b = CodeBuilder::function(name, "pkg.mod");
        b.load_const(Constant::Int(7));
        b.emit(OpCode::RETURN_VALUE);
        Arc::new(b.finish())
    }

    fn compile(graph: &ModuleGraph, name: &str) -> Result<ModuleOutput, CapsicumError> {
        let options = TranslateOptions::default();
        let module = graph.get(name).unwrap();
        ModuleCompiler::new(graph, &DumpCompiler, &options).compile_module(&module)
    }

    #[test]
    fn nested_routines_precede_their_parent() {
        let mut b = CodeBuilder::module("pkg.mod");
        let code = b.add_shared_const(Arc::new(Constant::Code(function("answer"))));
        b.emit_arg(OpCode::LOAD_CONST, code);
        b.load_const(Constant::Str("answer".into()));
        b.emit_arg(OpCode::MAKE_FUNCTION, 0);
        b.store_name("answer");
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);

        let graph = ModuleGraph::new();
        graph
            .add_compiled("pkg.mod", ModuleKind::Defined, b.finish())
            .unwrap();
        let out = compile(&graph, "pkg.mod").unwrap();

        assert_eq!(out.file_name, "pkg_mod.c");
        assert_eq!(out.routines, 2);
        assert!(out.source.starts_with("/* capsicum: module 'pkg.mod' */\n#include \"capsicum.h\"\n"));
        assert!(out.source.contains(
            "PyObject* _pkg_mod_MODULE___0_answer(PyFrameObject* f); /* fwd decl */"
        ));
        let child = out
            .source
            .find("PyObject* _pkg_mod_MODULE___0_answer(PyFrameObject* f)\n{")
            .unwrap();
        let parent = out
            .source
            .find("PyObject* _pkg_mod_MODULE__(PyFrameObject* f)\n{")
            .unwrap();
        assert!(child < parent);
        assert!(out.source.contains("__capsicum_new_code("));
    }

    #[test]
    fn module_without_code_fails_to_compile() {
        let graph = ModuleGraph::new();
        graph.add_module("lonely", ModuleKind::Defined, None).unwrap();
        let err = compile(&graph, "lonely").unwrap_err();
        assert!(matches!(err, CapsicumError::Compile(_)));
    }

    #[test]
    fn translation_errors_name_the_module() {
        let mut b = CodeBuilder::module("broken");
        b.emit(OpCode::POP_TOP);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let graph = ModuleGraph::new();
        graph
            .add_compiled("broken", ModuleKind::Defined, b.finish())
            .unwrap();
        match compile(&graph, "broken").unwrap_err() {
            CapsicumError::Translation(e) => {
                assert_eq!(e.module, "broken");
                assert_eq!(e.kind, TranslationErrorKind::StackUnderflow);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
