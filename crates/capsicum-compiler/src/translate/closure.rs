//! Cell and free variables.
//!
//! Cells follow the fast locals in `f->f_localsplus`; `freevars[i]` indexes
//! cell variables first, then free variables.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};

impl InstructionTranslator<'_, '_> {
    pub(super) fn closure(&mut self, instr: &Instruction) -> Result<()> {
        let i = instr.arg;
        let name = self.cell_literal(i)?;
        let is_free = i as usize >= self.unit.cellvars().len();
        let unbound = format!("__capsicum_unbound_deref({name}, {});", is_free as u8);
        self.ctx.uses(&["freevars", "x"]);
        match instr.op {
            OpCode::LOAD_CLOSURE => {
                self.ctx.stmt(format!("x = freevars[{i}];"));
                self.emit(&["Py_INCREF(x);", "PUSH(x);"]);
                self.ctx.push(1);
            }
            OpCode::LOAD_DEREF => {
                self.ctx.stmt(format!("x = PyCell_GET(freevars[{i}]);"));
                self.ctx.check_with("x == NULL", &[&unbound]);
                self.emit(&["Py_INCREF(x);", "PUSH(x);"]);
                self.ctx.push(1);
            }
            OpCode::STORE_DEREF => {
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "w"]);
                self.ctx.stmt("v = POP();");
                self.ctx.stmt(format!("w = freevars[{i}];"));
                self.emit(&["x = PyCell_GET(w);", "PyCell_SET(w, v);", "Py_XDECREF(x);"]);
            }
            OpCode::DELETE_DEREF => {
                self.ctx.uses(&["w"]);
                self.ctx.stmt(format!("w = freevars[{i}];"));
                self.ctx.stmt("x = PyCell_GET(w);");
                self.ctx.check_with("x == NULL", &[&unbound]);
                self.emit(&["PyCell_SET(w, NULL);", "Py_DECREF(x);"]);
            }
            OpCode::LOAD_CLASSDEREF => {
                self.ctx.stmt(format!(
                    "x = __capsicum_load_classderef(f, freevars[{i}], {name});"
                ));
                self.push_checked();
            }
            _ => return self.unsupported(instr),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::translate::test_support::{translate, try_translate};
    use capsicum_bytecode::{CodeBuilder, Constant, OpCode};
    use capsicum_core::TranslationErrorKind;

    #[test]
    fn free_variables_follow_cells() {
        let mut b = CodeBuilder::function("inner", "m");
        b.varname("a");
        let cell = b.cellvar("c");
        let free = b.freevar("n");
        b.emit_arg(OpCode::LOAD_DEREF, free);
        b.emit_arg(OpCode::STORE_DEREF, cell);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        assert!(c.contains("PyObject** freevars = f->f_localsplus + 1;"));
        assert!(c.contains("x = PyCell_GET(freevars[1]);"));
        assert!(c.contains("__capsicum_unbound_deref(\"n\", 1);"));
        assert!(c.contains("PyCell_SET(w, v);"));
    }

    #[test]
    fn class_body_lookup_names_the_variable() {
        let mut b = CodeBuilder::function("C", "m");
        let free = b.freevar("x");
        b.emit_arg(OpCode::LOAD_CLASSDEREF, free);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        assert!(c.contains("x = __capsicum_load_classderef(f, freevars[0], \"x\");"));
    }

    #[test]
    fn cell_index_out_of_range() {
        let mut b = CodeBuilder::function("f", "m");
        b.emit_arg(OpCode::LOAD_CLOSURE, 0);
        b.emit(OpCode::RETURN_VALUE);
        let err = try_translate(&b.finish()).unwrap_err();
        assert_eq!(
            err.kind,
            TranslationErrorKind::InvalidOperand {
                pool: "cells",
                index: 0
            }
        );
    }
}
