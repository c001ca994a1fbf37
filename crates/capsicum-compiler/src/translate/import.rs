//! Imports.
//!
//! `IMPORT_NAME` is resolved at translation time: the target's module id is
//! baked into the call, so the runtime can find a translated module without
//! going through the import machinery.

use capsicum_bytecode::{ImportStatement, Instruction, OpCode};
use capsicum_core::TranslationErrorKind;
use capsicum_registry::c_string_literal;

use super::{InstructionTranslator, Resolver, Result};
use crate::context::ImportSite;

impl InstructionTranslator<'_, '_> {
    pub(super) fn import(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op {
            OpCode::IMPORT_NAME => self.import_name(instr)?,
            OpCode::IMPORT_FROM => {
                let name = self.name(instr.arg)?;
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "x"]);
                self.ctx.stmt("v = TOP();");
                self.ctx
                    .stmt(format!("x = __capsicum_import_from(v, {name});"));
                self.push_checked();
            }
            OpCode::IMPORT_STAR => {
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "err"]);
                self.emit(&[
                    "v = POP();",
                    "err = __capsicum_import_star(f, v);",
                    "Py_DECREF(v);",
                ]);
                self.ctx.check("err != 0");
            }
            _ => return self.unsupported(instr),
        }
        Ok(())
    }

    /// Read back the statement from the two constant loads before `instr`.
    fn import_statement(&self, instr: &Instruction) -> Result<ImportStatement> {
        let instrs = self.unit.instructions();
        if self.index < 2 {
            return self.ctx.fail(TranslationErrorKind::ImportOperand);
        }
        let (level_op, from_op) = (&instrs[self.index - 2], &instrs[self.index - 1]);
        if level_op.op != OpCode::LOAD_CONST || from_op.op != OpCode::LOAD_CONST {
            return self.ctx.fail(TranslationErrorKind::ImportOperand);
        }
        let level = self.unit.constant(level_op.arg).and_then(|c| c.as_int());
        let fromlist = self.unit.constant(from_op.arg).and_then(|c| c.as_name_list());
        let (Some(level), Some(fromlist)) = (level, fromlist) else {
            return self.ctx.fail(TranslationErrorKind::ImportOperand);
        };
        let Some(name) = self.unit.name_at(instr.arg) else {
            return self.invalid("names", instr.arg);
        };
        Ok(ImportStatement {
            name: name.to_string(),
            fromlist: fromlist.into_iter().map(str::to_string).collect(),
            level: level.max(0) as u32,
            offset: instr.offset,
            line: instr.line,
        })
    }

    fn import_name(&mut self, instr: &Instruction) -> Result<()> {
        let statement = self.import_statement(instr)?;
        let Resolver {
            graph,
            importer,
            allow_external,
        } = self.resolver;
        let resolved = graph
            .resolve_from_import(importer, &statement, allow_external)
            .map_err(|e| self.ctx.error(TranslationErrorKind::Resolution(e)))?;

        self.ctx.pop(2)?;
        self.ctx.uses(&["v", "w", "x"]);
        self.emit(&["w = POP();", "v = POP();"]);
        self.ctx.stmt(format!(
            "x = __capsicum_import_module(f, {}, {}, w);",
            resolved.target.id().to_c_literal(),
            c_string_literal(&resolved.absolute)
        ));
        self.emit(&["Py_DECREF(v);", "Py_DECREF(w);"]);
        self.push_checked();

        tracing::trace!(
            importer = importer.name(),
            target = %resolved.absolute,
            line = statement.line,
            "import resolved"
        );
        self.ctx.record_import(ImportSite {
            target: resolved.absolute,
            modules: resolved
                .modules
                .iter()
                .map(|m| m.name().to_string())
                .collect(),
            line: statement.line,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{FlushedRoutine, RoutineEnd, TranslationContext};
    use crate::emit::ConstantTable;
    use crate::translate::translate_range;
    use crate::translate::test_support::try_translate;
    use capsicum_bytecode::{CodeBuilder, CodeUnit, Constant};
    use capsicum_core::ModuleId;
    use capsicum_registry::{ModuleGraph, ModuleKind};
    use pretty_assertions::assert_eq;

    fn translate_in(
        graph: &ModuleGraph,
        module: &str,
        unit: &CodeUnit,
        external: bool,
    ) -> Result<FlushedRoutine> {
        let importer = graph.get(module).unwrap();
        let resolver = Resolver {
            graph,
            importer: &importer,
            allow_external: external,
        };
        let mut consts = ConstantTable::new("t");
        let mut ctx = TranslationContext::new(unit, &mut consts, 0);
        translate_range(&mut ctx, unit, resolver, 0..unit.instructions().len())?;
        ctx.finish("PyObject* t(PyFrameObject* f)", &[], RoutineEnd::Final)
    }

    fn importing(module: &str, name: &str, fromlist: &[&str], level: u32) -> CodeUnit {
        let mut b = CodeBuilder::module(module);
        b.import_name(name, fromlist, level);
        b.emit(OpCode::POP_TOP);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        b.finish()
    }

    #[test]
    fn id_of_the_target_is_baked_in() {
        let graph = ModuleGraph::new();
        graph.add_module("main", ModuleKind::Defined, None).unwrap();
        graph.add_module("pkg", ModuleKind::Package, None).unwrap();
        graph.add_module("pkg.mod", ModuleKind::Defined, None).unwrap();
        let unit = importing("main", "pkg.mod", &[], 0);
        let out = translate_in(&graph, "main", &unit, false).unwrap();
        let id = ModuleId::from_name("pkg.mod").to_c_literal();
        assert!(out.text.contains(&format!(
            "x = __capsicum_import_module(f, {id}, \"pkg.mod\", w);"
        )));
        assert_eq!(out.imports.len(), 1);
        assert_eq!(out.imports[0].target, "pkg.mod");
        assert_eq!(out.imports[0].modules, vec!["pkg", "pkg.mod"]);
    }

    #[test]
    fn relative_import_is_made_absolute() {
        let graph = ModuleGraph::new();
        graph.add_module("pkg", ModuleKind::Package, None).unwrap();
        graph.add_module("pkg.a", ModuleKind::Defined, None).unwrap();
        graph.add_module("pkg.b", ModuleKind::Defined, None).unwrap();
        let unit = importing("pkg.a", "b", &["thing"], 1);
        let out = translate_in(&graph, "pkg.a", &unit, false).unwrap();
        assert_eq!(out.imports[0].target, "pkg.b");
    }

    #[test]
    fn unresolved_import_without_externals_fails() {
        let graph = ModuleGraph::new();
        graph.add_module("main", ModuleKind::Defined, None).unwrap();
        let unit = importing("main", "nowhere", &[], 0);
        let err = translate_in(&graph, "main", &unit, false).unwrap_err();
        assert!(matches!(err.kind, TranslationErrorKind::Resolution(_)));
    }

    #[test]
    fn non_constant_operands_are_rejected() {
        let mut b = CodeBuilder::module("m");
        b.load_name("level");
        b.load_const(Constant::None);
        let idx = b.name("os");
        b.emit_arg(OpCode::IMPORT_NAME, idx);
        b.emit(OpCode::RETURN_VALUE);
        let err = try_translate(&b.finish()).unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::ImportOperand);
    }
}
