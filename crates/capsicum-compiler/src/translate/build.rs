//! Container builders, comprehension appends, unpacking and f-strings.

use capsicum_bytecode::{Instruction, OpCode};

use super::{InstructionTranslator, Result};

/// `FORMAT_VALUE` flag: a format spec sits above the value.
const FVS_HAVE_SPEC: u32 = 0x4;

/// `FORMAT_VALUE` flag bits selecting `str`, `repr` or `ascii`.
const FVC_MASK: u32 = 0x3;

/// Kind argument of `__capsicum_build_unpack` for each unpacking builder.
fn unpack_kind(op: OpCode) -> Option<&'static str> {
    Some(match op {
        OpCode::BUILD_LIST_UNPACK => "CAPSICUM_UNPACK_LIST",
        OpCode::BUILD_TUPLE_UNPACK => "CAPSICUM_UNPACK_TUPLE",
        OpCode::BUILD_TUPLE_UNPACK_WITH_CALL => "CAPSICUM_UNPACK_TUPLE_CALL",
        OpCode::BUILD_SET_UNPACK => "CAPSICUM_UNPACK_SET",
        OpCode::BUILD_MAP_UNPACK => "CAPSICUM_UNPACK_MAP",
        OpCode::BUILD_MAP_UNPACK_WITH_CALL => "CAPSICUM_UNPACK_MAP_CALL",
        _ => return None,
    })
}

impl InstructionTranslator<'_, '_> {
    pub(super) fn build(&mut self, instr: &Instruction) -> Result<()> {
        let n = instr.arg;
        match instr.op {
            OpCode::BUILD_TUPLE | OpCode::BUILD_LIST => {
                let (new, fill) = if instr.op == OpCode::BUILD_TUPLE {
                    ("PyTuple_New", "STACK_TO_TUPLE")
                } else {
                    ("PyList_New", "STACK_TO_LIST")
                };
                self.ctx.require(n as usize)?;
                self.ctx.uses(&["x"]);
                self.ctx.stmt(format!("x = {new}({n});"));
                // on failure the items stay on the stack for the unwinder
                self.ctx.check("x == NULL");
                self.ctx.stmt(format!("{fill}(x, {n});"));
                self.ctx.pop(n as usize)?;
                self.ctx.stmt("PUSH(x);");
                self.ctx.push(1);
            }
            OpCode::BUILD_SET => self.consume_into("__capsicum_build_set", n as usize, n)?,
            OpCode::BUILD_MAP => self.consume_into("__capsicum_build_map", 2 * n as usize, n)?,
            OpCode::BUILD_CONST_KEY_MAP => {
                self.consume_into("__capsicum_build_const_key_map", n as usize + 1, n)?
            }
            OpCode::BUILD_STRING => self.consume_into("__capsicum_build_string", n as usize, n)?,
            OpCode::BUILD_SLICE => self.slice(n)?,

            // =================================================================
            // Comprehension appends
            // =================================================================
            OpCode::LIST_APPEND | OpCode::SET_ADD => {
                let call = if instr.op == OpCode::LIST_APPEND {
                    "PyList_Append"
                } else {
                    "PySet_Add"
                };
                self.ctx.pop(1)?;
                self.ctx.require(n as usize)?;
                self.ctx.uses(&["v", "err"]);
                self.ctx.stmt("v = POP();");
                self.ctx.stmt(format!("err = {call}(PEEK({n}), v);"));
                self.ctx.stmt("Py_DECREF(v);");
                self.ctx.check("err != 0");
            }
            OpCode::MAP_ADD => {
                self.ctx.pop(2)?;
                self.ctx.require(n as usize)?;
                self.ctx.uses(&["v", "w", "err"]);
                self.emit(&["w = TOP();", "v = SECOND();", "STACKADJ(-2);"]);
                self.ctx
                    .stmt(format!("err = PyDict_SetItem(PEEK({n}), w, v);"));
                self.emit(&["Py_DECREF(v);", "Py_DECREF(w);"]);
                self.ctx.check("err != 0");
            }

            // =================================================================
            // Unpacking
            // =================================================================
            OpCode::UNPACK_SEQUENCE => self.unpack(n as usize, format!("{n}, -1"))?,
            OpCode::UNPACK_EX => {
                let (before, after) = (n & 0xff, n >> 8);
                self.unpack(
                    before as usize + after as usize + 1,
                    format!("{before}, {after}"),
                )?;
            }

            OpCode::FORMAT_VALUE => {
                self.ctx.uses(&["v", "w", "x"]);
                if n & FVS_HAVE_SPEC != 0 {
                    self.ctx.pop(1)?;
                    self.ctx.stmt("w = POP();");
                } else {
                    self.ctx.stmt("w = NULL;");
                }
                self.ctx.require(1)?;
                self.ctx.stmt("v = TOP();");
                self.ctx.stmt(format!(
                    "x = __capsicum_format_value(v, {}, w);",
                    n & FVC_MASK
                ));
                self.emit(&["Py_DECREF(v);", "Py_XDECREF(w);"]);
                self.set_top_checked();
            }
            op => {
                let Some(kind) = unpack_kind(op) else {
                    return self.unsupported(instr);
                };
                // the call variants name the callee, which sits below the items
                match op {
                    OpCode::BUILD_TUPLE_UNPACK_WITH_CALL => self.ctx.require(n as usize + 1)?,
                    OpCode::BUILD_MAP_UNPACK_WITH_CALL => self.ctx.require(n as usize + 2)?,
                    _ => {}
                }
                self.ctx.pop(n as usize)?;
                self.ctx.uses(&["x"]);
                self.ctx.stmt(format!(
                    "x = __capsicum_build_unpack(&stack_pointer, {kind}, {n});"
                ));
                self.push_checked();
            }
        }
        Ok(())
    }

    /// A runtime builder that consumes `count` stack items and always
    /// leaves the stack without them, success or not.
    fn consume_into(&mut self, helper: &str, count: usize, n: u32) -> Result<()> {
        self.ctx.pop(count)?;
        self.ctx.uses(&["x"]);
        self.ctx
            .stmt(format!("x = {helper}(&stack_pointer, {n});"));
        self.push_checked();
        Ok(())
    }

    fn slice(&mut self, n: u32) -> Result<()> {
        self.ctx.uses(&["u", "v", "w", "x"]);
        match n {
            3 => {
                self.ctx.pop(2)?;
                self.ctx.require(1)?;
                self.emit(&[
                    "w = POP();",
                    "v = POP();",
                    "u = TOP();",
                    "x = PySlice_New(u, v, w);",
                    "Py_DECREF(u);",
                    "Py_DECREF(v);",
                    "Py_DECREF(w);",
                ]);
            }
            2 => {
                self.ctx.pop(1)?;
                self.ctx.require(1)?;
                self.emit(&[
                    "v = POP();",
                    "u = TOP();",
                    "x = PySlice_New(u, v, NULL);",
                    "Py_DECREF(u);",
                    "Py_DECREF(v);",
                ]);
            }
            _ => return self.invalid("slice arity", n),
        }
        self.set_top_checked();
        Ok(())
    }

    /// Pop one iterable and push `produced` items, via `__capsicum_unpack`.
    fn unpack(&mut self, produced: usize, counts: String) -> Result<()> {
        self.ctx.pop(1)?;
        self.ctx.uses(&["v", "err"]);
        self.ctx.stmt("v = POP();");
        self.ctx
            .stmt(format!("err = __capsicum_unpack(&stack_pointer, v, {counts});"));
        self.ctx.stmt("Py_DECREF(v);");
        self.ctx.check("err != 0");
        self.ctx.push(produced);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::test_support::{translate, try_translate};
    use capsicum_bytecode::{CodeBuilder, Constant};
    use capsicum_core::TranslationErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn tuple_checks_before_moving_items() {
        let mut b = CodeBuilder::module("m");
        b.load_const(Constant::Int(1));
        b.load_const(Constant::Int(2));
        b.emit_arg(OpCode::BUILD_TUPLE, 2);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        let new = c.find("x = PyTuple_New(2);").unwrap();
        let check = c.find("if (x == NULL)").unwrap();
        let fill = c.find("STACK_TO_TUPLE(x, 2);").unwrap();
        assert!(new < check && check < fill);
    }

    #[test]
    fn map_consumes_pairs() {
        let mut b = CodeBuilder::module("m");
        for i in 0..4 {
            b.load_const(Constant::Int(i));
        }
        b.emit_arg(OpCode::BUILD_MAP, 2);
        b.emit(OpCode::RETURN_VALUE);
        let out = try_translate(&b.finish()).unwrap();
        assert!(out.text.contains("x = __capsicum_build_map(&stack_pointer, 2);"));
        assert_eq!(out.max_height, 4);
    }

    #[test]
    fn unpack_ex_splits_the_argument() {
        let mut b = CodeBuilder::module("m");
        b.load_name("seq");
        b.emit_arg(OpCode::UNPACK_EX, (2 << 8) | 1);
        for name in ["a", "rest", "b", "c"] {
            b.store_name(name);
        }
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let out = try_translate(&b.finish()).unwrap();
        assert!(out.text.contains("err = __capsicum_unpack(&stack_pointer, v, 1, 2);"));
        assert_eq!(out.max_height, 4);
    }

    #[test]
    fn format_value_with_spec() {
        let mut b = CodeBuilder::module("m");
        b.load_name("x");
        b.load_const(Constant::Str(">10".into()));
        b.emit_arg(OpCode::FORMAT_VALUE, FVS_HAVE_SPEC | 2);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        assert!(c.contains("w = POP();"));
        assert!(c.contains("x = __capsicum_format_value(v, 2, w);"));
    }

    #[test]
    fn one_argument_slice_is_rejected() {
        let mut b = CodeBuilder::module("m");
        b.load_name("x");
        b.emit_arg(OpCode::BUILD_SLICE, 1);
        b.emit(OpCode::RETURN_VALUE);
        let err = try_translate(&b.finish()).unwrap_err();
        assert_eq!(
            err.kind,
            TranslationErrorKind::InvalidOperand {
                pool: "slice arity",
                index: 1
            }
        );
    }

    #[test]
    fn list_append_addresses_the_accumulator() {
        let mut b = CodeBuilder::module("m");
        b.emit_arg(OpCode::BUILD_LIST, 0);
        b.load_name("item");
        b.emit_arg(OpCode::LIST_APPEND, 1);
        b.emit(OpCode::RETURN_VALUE);
        let c = translate(&b.finish());
        assert!(c.contains("err = PyList_Append(PEEK(1), v);"));
    }
}
