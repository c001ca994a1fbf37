//! Fast locals.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};

impl InstructionTranslator<'_, '_> {
    pub(super) fn local(&mut self, instr: &Instruction) -> Result<()> {
        let slot = instr.arg;
        let name = self.varname_literal(slot)?;
        let unbound = format!("__capsicum_unbound_local({name});");
        match instr.op {
            OpCode::LOAD_FAST => {
                self.ctx.uses(&["fastlocals", "x"]);
                self.ctx.stmt(format!("x = GETLOCAL({slot});"));
                self.ctx.check_with("x == NULL", &[&unbound]);
                self.emit(&["Py_INCREF(x);", "PUSH(x);"]);
                self.ctx.push(1);
            }
            OpCode::STORE_FAST => {
                self.ctx.pop(1)?;
                self.ctx.uses(&["fastlocals", "v"]);
                self.ctx.stmt("v = POP();");
                self.ctx.stmt(format!("SETLOCAL({slot}, v);"));
            }
            OpCode::DELETE_FAST => {
                self.ctx.uses(&["fastlocals", "x"]);
                self.ctx.stmt(format!("x = GETLOCAL({slot});"));
                self.ctx.check_with("x == NULL", &[&unbound]);
                self.ctx.stmt(format!("SETLOCAL({slot}, NULL);"));
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
    fn load_fast_checks_for_unbound() {
        let mut b = CodeBuilder::function("f", "m");
        b.load_fast("a");
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        assert!(c.contains("PyObject** fastlocals = f->f_localsplus;"));
        assert!(c.contains("x = GETLOCAL(0);"));
        assert!(c.contains("__capsicum_unbound_local(\"a\");"));
    }

    #[test]
    fn store_fast_replaces_slot() {
        let mut b = CodeBuilder::function("f", "m");
        b.load_const(Constant::Int(1));
        b.store_fast("a");
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        assert!(c.contains("SETLOCAL(0, v);"));
    }

    #[test]
    fn bad_slot_is_an_invalid_operand() {
        let mut b = CodeBuilder::function("f", "m");
        b.emit_arg(OpCode::LOAD_FAST, 3);
        b.emit(OpCode::RETURN_VALUE);
        let err = try_translate(&b.finish()).unwrap_err();
        assert_eq!(
            err.kind,
            TranslationErrorKind::InvalidOperand {
                pool: "varnames",
                index: 3
            }
        );
    }
}
