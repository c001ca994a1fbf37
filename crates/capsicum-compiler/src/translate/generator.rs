//! Return, yield and yield-from.
//!
//! A generator routine suspends by saving its offset in `f->f_lasti` and its
//! stack top in `f->f_stacktop`, then returning the yielded value. On resume
//! the prologue switches on `f_lasti` to the matching `resume_<offset>` label.

use capsicum_bytecode::{Instruction, OpCode};
use capsicum_core::TranslationErrorKind;

use super::{InstructionTranslator, Result};

impl InstructionTranslator<'_, '_> {
    pub(super) fn generator(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op {
            OpCode::RETURN_VALUE => self.ctx.return_value()?,
            OpCode::YIELD_VALUE => {
                self.require_generator()?;
                self.ctx.pop(1)?;
                self.ctx.stmt("retval = POP();");
                self.suspend(instr.offset);
                let resume = self.ctx.add_resume(instr.offset);
                self.ctx.label(resume);
                // the sent value
                self.ctx.push(1);
            }
            OpCode::YIELD_FROM => {
                self.require_generator()?;
                self.ctx.require(2)?;
                // re-entered here, with the sent value pushed, until the
                // delegate is exhausted
                let resume = self.ctx.add_resume(instr.offset);
                self.ctx.label(resume);
                self.ctx.pop(1)?;
                self.ctx.uses(&["v", "err"]);
                self.emit(&[
                    "v = POP();",
                    "err = __capsicum_yield_from(&stack_pointer, v, &retval);",
                ]);
                self.ctx.check("err < 0");
                self.ctx.stmt(format!(
                    "if (err > 0) {{\n    f->f_lasti = {offset};\n    f->f_stacktop = stack_pointer;\n    return retval;\n}}",
                    offset = instr.offset
                ));
            }
            OpCode::GET_YIELD_FROM_ITER => {
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "x"]);
                self.emit(&[
                    "v = TOP();",
                    "x = __capsicum_yield_from_iter(f, v);",
                    "Py_DECREF(v);",
                ]);
                self.set_top_checked();
            }
            _ => return self.unsupported(instr),
        }
        Ok(())
    }

    fn require_generator(&self) -> Result<()> {
        if self.ctx.is_generator() {
            Ok(())
        } else {
            self.ctx.fail(TranslationErrorKind::YieldOutsideGenerator)
        }
    }

    fn suspend(&mut self, offset: usize) {
        self.ctx.stmt(format!("f->f_lasti = {offset};"));
        self.ctx.stmt("f->f_stacktop = stack_pointer;");
        self.ctx.stmt("return retval;");
    }
}

#[cfg(test)]
mod tests {
    use crate::translate::test_support::{translate, try_translate};
    use capsicum_bytecode::{CodeBuilder, Constant, OpCode};
    use capsicum_core::TranslationErrorKind;
    use pretty_assertions::assert_eq;

    fn counter() -> CodeBuilder {
        let mut b = CodeBuilder::generator("count", "m");
        b.load_const(Constant::Int(1));
        b.emit(OpCode::YIELD_VALUE);
        b.emit(OpCode::POP_TOP);
        b.load_const(Constant::Int(2));
        b.emit(OpCode::YIELD_VALUE);
        b.emit(OpCode::POP_TOP);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        b
    }

    #[test]
    fn yields_become_resume_points() {
        let out = try_translate(&counter().finish()).unwrap();
        assert_eq!(out.resumes, vec![2, 8]);
        assert!(out.text.contains("switch (f->f_lasti) {"));
        assert!(out.text.contains("case 2:\n        goto resume_2;"));
        assert!(out.text.contains("  resume_8: ;"));
        assert!(out.text.contains("stack_pointer = f->f_stacktop;"));
    }

    #[test]
    fn yield_in_a_plain_function_fails() {
        let mut b = CodeBuilder::function("f", "m");
        b.load_const(Constant::None);
        b.emit(OpCode::YIELD_VALUE);
        b.emit(OpCode::RETURN_VALUE);
        let err = try_translate(&b.finish()).unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::YieldOutsideGenerator);
    }

    #[test]
    fn yield_from_resumes_before_itself() {
        let mut b = CodeBuilder::generator("g", "m");
        b.load_name("inner");
        b.emit(OpCode::GET_YIELD_FROM_ITER);
        b.load_const(Constant::None);
        b.emit(OpCode::YIELD_FROM);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        let resume = c.find("  resume_6: ;").unwrap();
        let call = c.find("__capsicum_yield_from(&stack_pointer, v, &retval)").unwrap();
        assert!(resume < call);
        assert!(c.contains("f->f_lasti = 6;"));
    }
}
