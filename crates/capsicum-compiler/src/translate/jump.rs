//! Jumps, loops and iteration.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};
use crate::blocks::BlockKind;

impl InstructionTranslator<'_, '_> {
    pub(super) fn jump(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op {
            OpCode::JUMP_FORWARD | OpCode::JUMP_ABSOLUTE => {
                let target = self.target(instr)?;
                let label = self.ctx.branch(target, self.ctx.height())?;
                self.ctx.goto(&label);
                self.ctx.transfer();
            }
            OpCode::POP_JUMP_IF_FALSE | OpCode::POP_JUMP_IF_TRUE => {
                let target = self.target(instr)?;
                self.ctx.pop(1)?;
                let label = self.ctx.branch(target, self.ctx.height())?;
                self.ctx.uses(&["v", "err"]);
                self.emit(&["v = POP();", "err = PyObject_IsTrue(v);", "Py_DECREF(v);"]);
                self.ctx.check("err < 0");
                let taken = if instr.op == OpCode::POP_JUMP_IF_FALSE {
                    "err == 0"
                } else {
                    "err > 0"
                };
                self.ctx.stmt(format!("if ({taken})\n    goto {label};"));
            }
            OpCode::JUMP_IF_FALSE_OR_POP | OpCode::JUMP_IF_TRUE_OR_POP => {
                let target = self.target(instr)?;
                self.ctx.require(1)?;
                let label = self.ctx.branch(target, self.ctx.height())?;
                self.ctx.uses(&["v", "err"]);
                self.emit(&["v = TOP();", "err = PyObject_IsTrue(v);"]);
                self.ctx.check("err < 0");
                let taken = if instr.op == OpCode::JUMP_IF_FALSE_OR_POP {
                    "err == 0"
                } else {
                    "err > 0"
                };
                self.ctx.stmt(format!("if ({taken})\n    goto {label};"));
                self.emit(&["STACKADJ(-1);", "Py_DECREF(v);"]);
                self.ctx.pop(1)?;
            }

            // =================================================================
            // Loops
            // =================================================================
            OpCode::SETUP_LOOP => {
                let target = self.target(instr)?;
                self.ctx.setup(BlockKind::Loop, target)?;
            }
            OpCode::POP_BLOCK => self.ctx.pop_block()?,
            OpCode::BREAK_LOOP => self.ctx.break_loop()?,
            OpCode::CONTINUE_LOOP => {
                let target = self.target(instr)?;
                self.ctx.continue_loop(target)?;
            }
            OpCode::GET_ITER => {
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "x"]);
                self.emit(&["v = TOP();", "x = PyObject_GetIter(v);", "Py_DECREF(v);"]);
                self.set_top_checked();
            }
            OpCode::FOR_ITER => {
                let target = self.target(instr)?;
                self.ctx.require(1)?;
                // exhaustion drops the iterator before jumping
                let label = self.ctx.branch(target, self.ctx.height() - 1)?;
                self.ctx.uses(&["v", "x"]);
                self.emit(&["v = TOP();", "x = __capsicum_for_iter(v);"]);
                self.ctx.check("x == NULL && PyErr_Occurred()");
                self.ctx.stmt(format!(
                    "if (x == NULL) {{\n    STACKADJ(-1);\n    Py_DECREF(v);\n    goto {label};\n}}"
                ));
                self.ctx.stmt("PUSH(x);");
                self.ctx.push(1);
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
    use pretty_assertions::assert_eq;

    /// `for i in seq: if i: break`
    fn for_loop(with_break: bool) -> CodeBuilder {
        let mut b = CodeBuilder::module("m");
        let exit = b.new_label();
        let head = b.new_label();
        let done = b.new_label();
        b.jump(OpCode::SETUP_LOOP, exit);
        b.load_name("seq");
        b.emit(OpCode::GET_ITER);
        b.bind(head);
        b.jump(OpCode::FOR_ITER, done);
        b.store_name("i");
        if with_break {
            let next = b.new_label();
            b.load_name("i");
            b.jump(OpCode::POP_JUMP_IF_FALSE, next);
            b.emit(OpCode::BREAK_LOOP);
            b.bind(next);
        }
        b.jump(OpCode::JUMP_ABSOLUTE, head);
        b.bind(done);
        b.emit(OpCode::POP_BLOCK);
        b.bind(exit);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        b
    }

    #[test]
    fn for_loop_jumps_back_to_the_header() {
        let unit = for_loop(false).finish();
        let head = unit.instructions()[3].offset;
        let c = translate(&unit);
        assert!(c.contains(&format!("goto label_{head};")));
        assert!(c.contains("x = __capsicum_for_iter(v);"));
        assert!(c.contains("if (x == NULL && PyErr_Occurred())"));
    }

    #[test]
    fn break_unwinds_to_the_loop_level() {
        let unit = for_loop(true).finish();
        let exit = unit
            .instructions()
            .iter()
            .find(|i| i.op == OpCode::LOAD_CONST)
            .map(|i| i.offset)
            .unwrap();
        let c = translate(&unit);
        assert!(c.contains("UNWIND_TO(0);"));
        assert!(c.contains(&format!("goto label_{exit};")));
    }

    #[test]
    fn conditional_jump_records_height() {
        let mut b = CodeBuilder::module("m");
        let skip = b.new_label();
        b.load_name("a");
        b.jump(OpCode::JUMP_IF_TRUE_OR_POP, skip);
        b.load_name("b");
        b.bind(skip);
        b.emit(OpCode::RETURN_VALUE);
        let out = try_translate(&b.finish()).unwrap();
        assert!(out.text.contains("if (err > 0)\n"));
        assert_eq!(out.height, 0);
    }

    #[test]
    fn mismatched_join_is_rejected() {
        let mut b = CodeBuilder::module("m");
        let join = b.new_label();
        b.load_name("a");
        b.jump(OpCode::POP_JUMP_IF_FALSE, join);
        b.load_const(Constant::Int(1));
        b.bind(join);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let err = try_translate(&b.finish()).unwrap_err();
        assert_eq!(
            err.kind,
            TranslationErrorKind::InconsistentHeight {
                expected: 0,
                found: 1
            }
        );
    }
}
