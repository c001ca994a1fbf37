//! Unary, binary, in-place and comparison operators.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};

/// C-API call for a two-operand opcode, applied as `fn(v, w)`.
fn binary_call(op: OpCode) -> Option<&'static str> {
    use OpCode::*;
    Some(match op {
        BINARY_POWER => "PyNumber_Power(v, w, Py_None)",
        INPLACE_POWER => "PyNumber_InPlacePower(v, w, Py_None)",
        BINARY_MULTIPLY => "PyNumber_Multiply(v, w)",
        INPLACE_MULTIPLY => "PyNumber_InPlaceMultiply(v, w)",
        BINARY_MATRIX_MULTIPLY => "PyNumber_MatrixMultiply(v, w)",
        INPLACE_MATRIX_MULTIPLY => "PyNumber_InPlaceMatrixMultiply(v, w)",
        BINARY_TRUE_DIVIDE => "PyNumber_TrueDivide(v, w)",
        INPLACE_TRUE_DIVIDE => "PyNumber_InPlaceTrueDivide(v, w)",
        BINARY_FLOOR_DIVIDE => "PyNumber_FloorDivide(v, w)",
        INPLACE_FLOOR_DIVIDE => "PyNumber_InPlaceFloorDivide(v, w)",
        BINARY_MODULO => "PyNumber_Remainder(v, w)",
        INPLACE_MODULO => "PyNumber_InPlaceRemainder(v, w)",
        BINARY_ADD => "PyNumber_Add(v, w)",
        INPLACE_ADD => "PyNumber_InPlaceAdd(v, w)",
        BINARY_SUBTRACT => "PyNumber_Subtract(v, w)",
        INPLACE_SUBTRACT => "PyNumber_InPlaceSubtract(v, w)",
        BINARY_LSHIFT => "PyNumber_Lshift(v, w)",
        INPLACE_LSHIFT => "PyNumber_InPlaceLshift(v, w)",
        BINARY_RSHIFT => "PyNumber_Rshift(v, w)",
        INPLACE_RSHIFT => "PyNumber_InPlaceRshift(v, w)",
        BINARY_AND => "PyNumber_And(v, w)",
        INPLACE_AND => "PyNumber_InPlaceAnd(v, w)",
        BINARY_XOR => "PyNumber_Xor(v, w)",
        INPLACE_XOR => "PyNumber_InPlaceXor(v, w)",
        BINARY_OR => "PyNumber_Or(v, w)",
        INPLACE_OR => "PyNumber_InPlaceOr(v, w)",
        _ => return None,
    })
}

/// Rich comparison operator for `COMPARE_OP` arguments 0 through 5.
const RICH_COMPARE: [&str; 6] = ["Py_LT", "Py_LE", "Py_EQ", "Py_NE", "Py_GT", "Py_GE"];

/// Highest `COMPARE_OP` argument: `in`, `not in`, `is`, `is not`,
/// exception match.
const LAST_COMPARE: u32 = 10;

impl InstructionTranslator<'_, '_> {
    pub(super) fn arithmetic(&mut self, instr: &Instruction) -> Result<()> {
        match instr.op {
            OpCode::UNARY_POSITIVE | OpCode::UNARY_NEGATIVE | OpCode::UNARY_INVERT => {
                let call = match instr.op {
                    OpCode::UNARY_POSITIVE => "PyNumber_Positive",
                    OpCode::UNARY_NEGATIVE => "PyNumber_Negative",
                    _ => "PyNumber_Invert",
                };
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "x"]);
                self.ctx.stmt("v = TOP();");
                self.ctx.stmt(format!("x = {call}(v);"));
                self.ctx.stmt("Py_DECREF(v);");
                self.set_top_checked();
            }
            OpCode::UNARY_NOT => {
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "err"]);
                self.emit(&["v = TOP();", "err = PyObject_IsTrue(v);", "Py_DECREF(v);"]);
                // the operand is released; leave a valid object in its slot
                self.ctx.check_with("err < 0", &["SET_TOP(Py_None);", "Py_INCREF(Py_None);"]);
                self.ctx.stmt("v = err ? Py_False : Py_True;");
                self.emit(&["Py_INCREF(v);", "SET_TOP(v);"]);
            }
            OpCode::COMPARE_OP => self.compare(instr.arg)?,
            op => {
                let Some(call) = binary_call(op) else {
                    return self.unsupported(instr);
                };
                self.ctx.pop(1)?;
                self.ctx.require(1)?;
                self.ctx.uses(&["v", "w", "x"]);
                self.emit(&["w = POP();", "v = TOP();"]);
                self.ctx.stmt(format!("x = {call};"));
                self.emit(&["Py_DECREF(v);", "Py_DECREF(w);"]);
                self.set_top_checked();
            }
        }
        Ok(())
    }

    fn compare(&mut self, arg: u32) -> Result<()> {
        let call = match arg {
            0..=5 => format!("PyObject_RichCompare(v, w, {})", RICH_COMPARE[arg as usize]),
            6..=LAST_COMPARE => format!("__capsicum_cmp_outcome({arg}, v, w)"),
            _ => return self.invalid("compare", arg),
        };
        self.ctx.pop(1)?;
        self.ctx.require(1)?;
        self.ctx.uses(&["v", "w", "x"]);
        self.emit(&["w = POP();", "v = TOP();"]);
        self.ctx.stmt(format!("x = {call};"));
        self.emit(&["Py_DECREF(v);", "Py_DECREF(w);"]);
        self.set_top_checked();
        Ok(())
    }
}
