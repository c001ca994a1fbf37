//! Calls and function construction.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};

/// `MAKE_FUNCTION` flag bits for the optional values below the qualname.
const MAKE_FUNCTION_EXTRAS: u32 = 0x0f;

impl InstructionTranslator<'_, '_> {
    pub(super) fn call(&mut self, instr: &Instruction) -> Result<()> {
        let n = instr.arg;
        self.ctx.uses(&["x"]);
        match instr.op {
            OpCode::CALL_FUNCTION => {
                self.ctx.pop(n as usize + 1)?;
                self.ctx.stmt(format!(
                    "x = __capsicum_call_function(&stack_pointer, {n}, NULL);"
                ));
            }
            OpCode::CALL_FUNCTION_KW => {
                self.ctx.pop(n as usize + 2)?;
                self.ctx.uses(&["w"]);
                self.ctx.stmt("w = POP();");
                self.ctx.stmt(format!(
                    "x = __capsicum_call_function(&stack_pointer, {n}, w);"
                ));
                self.ctx.stmt("Py_DECREF(w);");
            }
            OpCode::CALL_FUNCTION_EX => {
                let has_kwargs = n & 1;
                self.ctx.pop(2 + has_kwargs as usize)?;
                self.ctx.stmt(format!(
                    "x = __capsicum_call_function_ex(&stack_pointer, {has_kwargs});"
                ));
            }
            OpCode::MAKE_FUNCTION => {
                let extras = (n & MAKE_FUNCTION_EXTRAS).count_ones() as usize;
                self.ctx.pop(2 + extras)?;
                self.ctx.stmt(format!(
                    "x = __capsicum_make_function(f, &stack_pointer, {n});"
                ));
            }
            _ => return self.unsupported(instr),
        }
        self.push_checked();
        Ok(())
    }
}
