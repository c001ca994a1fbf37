//! Stack shuffles.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};

impl InstructionTranslator<'_, '_> {
    pub(super) fn stack(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op {
            OpCode::POP_TOP => {
                self.ctx.pop(1)?;
                self.ctx.uses(&["v"]);
                self.emit(&["v = POP();", "Py_DECREF(v);"]);
            }
            OpCode::ROT_TWO => {
                self.ctx.require(2)?;
                self.ctx.uses(&["v", "w"]);
                self.emit(&["v = TOP();", "w = SECOND();", "SET_TOP(w);", "SET_SECOND(v);"]);
            }
            OpCode::ROT_THREE => {
                self.ctx.require(3)?;
                self.ctx.uses(&["v", "w", "x"]);
                self.emit(&[
                    "v = TOP();",
                    "w = SECOND();",
                    "x = THIRD();",
                    "SET_TOP(w);",
                    "SET_SECOND(x);",
                    "SET_THIRD(v);",
                ]);
            }
            OpCode::DUP_TOP => {
                self.ctx.require(1)?;
                self.ctx.uses(&["v"]);
                self.emit(&["v = TOP();", "Py_INCREF(v);", "PUSH(v);"]);
                self.ctx.push(1);
            }
            OpCode::DUP_TOP_TWO => {
                self.ctx.require(2)?;
                self.ctx.uses(&["v", "w"]);
                self.emit(&[
                    "v = TOP();",
                    "w = SECOND();",
                    "Py_INCREF(v);",
                    "Py_INCREF(w);",
                    "STACKADJ(2);",
                    "SET_TOP(v);",
                    "SET_SECOND(w);",
                ]);
                self.ctx.push(2);
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
    fn rot_three_rotates_in_place() {
        let mut b = CodeBuilder::module("m");
        b.load_const(Constant::Int(1));
        b.load_const(Constant::Int(2));
        b.load_const(Constant::Int(3));
        b.emit(OpCode::ROT_THREE);
        b.emit(OpCode::POP_TOP);
        b.emit(OpCode::POP_TOP);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        assert!(c.contains("SET_THIRD(v);"));
        assert!(c.contains("PyObject* x = NULL;"));
    }

    #[test]
    fn dup_top_two_grows_the_stack() {
        let mut b = CodeBuilder::module("m");
        b.load_const(Constant::Int(1));
        b.load_const(Constant::Int(2));
        b.emit(OpCode::DUP_TOP_TWO);
        for _ in 0..3 {
            b.emit(OpCode::POP_TOP);
        }
        b.emit(OpCode::RETURN_VALUE);
        let out = try_translate(&b.finish()).unwrap();
        assert_eq!(out.max_height, 4);
    }

    #[test]
    fn pop_on_empty_stack_underflows() {
        let mut b = CodeBuilder::module("m");
        b.emit(OpCode::POP_TOP);
        let err = try_translate(&b.finish()).unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::StackUnderflow);
        assert_eq!(err.offset, 0);
    }
}
