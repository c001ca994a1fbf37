//! Constants, names, globals, attributes and subscripts.

use std::sync::Arc;

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};

impl InstructionTranslator<'_, '_> {
    pub(super) fn access(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op {
            OpCode::LOAD_CONST => {
                let Some(constant) = self.unit.constant(instr.arg) else {
                    return self.invalid("consts", instr.arg);
                };
                let constant = Arc::clone(constant);
                let accessor = self.ctx.consts().constant(&constant);
                self.ctx.uses(&["x"]);
                self.ctx.stmt(format!("x = {accessor};"));
                self.emit(&["Py_INCREF(x);", "PUSH(x);"]);
                self.ctx.push(1);
            }

            // =================================================================
            // Namespace lookups
            // =================================================================
            OpCode::LOAD_NAME => {
                let name = self.name(instr.arg)?;
                self.ctx.uses(&["x"]);
                self.ctx.stmt(format!("x = __capsicum_load_name(f, {name});"));
                self.push_checked();
            }
            OpCode::STORE_NAME => {
                let name = self.name(instr.arg)?;
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "err"]);
                self.ctx.stmt("v = POP();");
                self.ctx
                    .stmt(format!("err = __capsicum_store_name(f, {name}, v);"));
                self.ctx.stmt("Py_DECREF(v);");
                self.ctx.check("err != 0");
            }
            OpCode::DELETE_NAME => {
                let name = self.name(instr.arg)?;
                self.ctx.uses(&["err"]);
                self.ctx
                    .stmt(format!("err = __capsicum_delete_name(f, {name});"));
                self.ctx.check("err != 0");
            }
            OpCode::LOAD_GLOBAL => {
                let name = self.name(instr.arg)?;
                self.ctx.uses(&["x"]);
                self.ctx
                    .stmt(format!("x = __capsicum_load_global(f, {name});"));
                self.push_checked();
            }
            OpCode::STORE_GLOBAL => {
                let name = self.name(instr.arg)?;
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "err"]);
                self.ctx.stmt("v = POP();");
                self.ctx
                    .stmt(format!("err = PyDict_SetItem(f->f_globals, {name}, v);"));
                self.ctx.stmt("Py_DECREF(v);");
                self.ctx.check("err != 0");
            }
            OpCode::DELETE_GLOBAL => {
                let name = self.name(instr.arg)?;
                self.ctx.uses(&["err"]);
                self.ctx
                    .stmt(format!("err = __capsicum_delete_global(f, {name});"));
                self.ctx.check("err != 0");
            }

            // =================================================================
            // Attributes
            // =================================================================
            OpCode::LOAD_ATTR => {
                let name = self.name(instr.arg)?;
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "x"]);
                self.ctx.stmt("v = TOP();");
                self.ctx.stmt(format!("x = PyObject_GetAttr(v, {name});"));
                self.ctx.stmt("Py_DECREF(v);");
                self.set_top_checked();
            }
            OpCode::STORE_ATTR => {
                let name = self.name(instr.arg)?;
                self.ctx.pop(2)?;
                self.ctx.uses(&["v", "w", "err"]);
                self.emit(&["v = TOP();", "w = SECOND();", "STACKADJ(-2);"]);
                self.ctx
                    .stmt(format!("err = PyObject_SetAttr(v, {name}, w);"));
                self.emit(&["Py_DECREF(v);", "Py_DECREF(w);"]);
                self.ctx.check("err != 0");
            }
            OpCode::DELETE_ATTR => {
                let name = self.name(instr.arg)?;
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "err"]);
                self.ctx.stmt("v = POP();");
                self.ctx
                    .stmt(format!("err = PyObject_SetAttr(v, {name}, NULL);"));
                self.ctx.stmt("Py_DECREF(v);");
                self.ctx.check("err != 0");
            }

            // =================================================================
            // Subscripts
            // =================================================================
            OpCode::BINARY_SUBSCR => {
                self.ctx.pop(1)?;
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "w", "x"]);
                self.emit(&[
                    "w = POP();",
                    "v = TOP();",
                    "x = PyObject_GetItem(v, w);",
                    "Py_DECREF(v);",
                    "Py_DECREF(w);",
                ]);
                self.set_top_checked();
            }
            OpCode::STORE_SUBSCR => {
                self.ctx.pop(3)?;
                self.ctx.uses(&["u", "v", "w", "err"]);
                self.emit(&[
                    "w = TOP();",
                    "v = SECOND();",
                    "u = THIRD();",
                    "STACKADJ(-3);",
                    "err = PyObject_SetItem(v, w, u);",
                    "Py_DECREF(u);",
                    "Py_DECREF(v);",
                    "Py_DECREF(w);",
                ]);
                self.ctx.check("err != 0");
            }
            OpCode::DELETE_SUBSCR => {
                self.ctx.pop(2)?;
                self.ctx.uses(&["v", "w", "err"]);
                self.emit(&[
                    "w = TOP();",
                    "v = SECOND();",
                    "STACKADJ(-2);",
                    "err = PyObject_DelItem(v, w);",
                    "Py_DECREF(v);",
                    "Py_DECREF(w);",
                ]);
                self.ctx.check("err != 0");
            }

            // =================================================================
            // Class bodies, annotations, the interactive hook
            // =================================================================
            OpCode::LOAD_BUILD_CLASS => {
                self.ctx.uses(&["x"]);
                self.ctx.stmt("x = __capsicum_load_build_class(f);");
                self.push_checked();
            }
            OpCode::SETUP_ANNOTATIONS => {
                self.ctx.uses(&["err"]);
                self.ctx.stmt("err = __capsicum_setup_annotations(f);");
                self.ctx.check("err != 0");
            }
            OpCode::STORE_ANNOTATION => {
                let name = self.name(instr.arg)?;
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "err"]);
                self.ctx.stmt("v = POP();");
                self.ctx
                    .stmt(format!("err = __capsicum_store_annotation(f, {name}, v);"));
                self.ctx.stmt("Py_DECREF(v);");
                self.ctx.check("err != 0");
            }
            OpCode::PRINT_EXPR => {
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "err"]);
                self.emit(&["v = POP();", "err = __capsicum_print_expr(v);", "Py_DECREF(v);"]);
                self.ctx.check("err != 0");
            }
            _ => return self.unsupported(instr),
        }
        Ok(())
    }
}
