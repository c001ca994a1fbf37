//! Handler blocks, raise and context managers.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};
use crate::blocks::BlockKind;

impl InstructionTranslator<'_, '_> {
    pub(super) fn exception(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op {
            OpCode::SETUP_EXCEPT => {
                let target = self.target(instr)?;
                self.ctx.setup(BlockKind::Except, target)?;
            }
            OpCode::SETUP_FINALLY => {
                let target = self.target(instr)?;
                self.ctx.setup(BlockKind::Finally, target)?;
            }
            OpCode::SETUP_WITH => {
                let target = self.target(instr)?;
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "w", "x"]);
                self.emit(&[
                    "v = TOP();",
                    "x = __capsicum_with_enter(v, &w);",
                    "Py_DECREF(v);",
                    "SET_TOP(w);",
                ]);
                self.ctx.check("x == NULL");
                // the block covers the bound __exit__ left in the slot
                self.ctx.setup(BlockKind::With, target)?;
                self.ctx.stmt("PUSH(x);");
                self.ctx.push(1);
            }
            OpCode::POP_EXCEPT => self.ctx.pop_except()?,
            OpCode::END_FINALLY => self.ctx.end_finally()?,
            OpCode::RAISE_VARARGS => self.raise(instr.arg)?,
            OpCode::WITH_CLEANUP_START => {
                self.ctx.require(1)?;
                self.ctx.uses(&["err"]);
                self.ctx
                    .stmt("err = __capsicum_with_cleanup_start(f, &stack_pointer);");
                self.ctx.check("err != 0");
                self.ctx.push(1);
            }
            OpCode::WITH_CLEANUP_FINISH => {
                self.ctx.pop(2)?;
                self.ctx.uses(&["err"]);
                self.ctx
                    .stmt("err = __capsicum_with_cleanup_finish(&stack_pointer);");
                self.ctx.check("err != 0");
            }
            _ => return self.unsupported(instr),
        }
        Ok(())
    }

    /// `RAISE_VARARGS n`: bare re-raise, `raise exc`, or `raise exc from cause`.
    fn raise(&mut self, n: u32) -> Result<()> {
        self.ctx.uses(&["v", "w", "err"]);
        match n {
            0 => self.emit(&["v = NULL;", "w = NULL;"]),
            1 => {
                self.ctx.pop(1)?;
                self.emit(&["w = NULL;", "v = POP();"]);
            }
            2 => {
                self.ctx.pop(2)?;
                self.emit(&["w = POP();", "v = POP();"]);
            }
            _ => return self.invalid("raise arity", n),
        }
        self.ctx.stmt("err = __capsicum_do_raise(v, w);");
        // a re-raise keeps the traceback it already has
        self.ctx.stmt(format!(
            "if (err == 0)\n    __capsicum_traceback(f, {});",
            self.ctx.line()
        ));
        self.ctx.raise_to_handler();
        self.ctx.transfer();
        Ok(())
    }
}
