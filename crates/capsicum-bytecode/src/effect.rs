//! Per-instruction stack effects.
//!
//! Effects describe the normal (non-exceptional) path. Exception handler
//! entry pushes six values: the previous exception state and the new one.

use crate::opcode::OpCode;

/// Values pushed on entry to an exception handler.
pub const HANDLER_ENTRY_PUSH: i32 = 6;

/// Net stack effect of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    /// Effect when execution continues with the next instruction.
    /// `None` when control never falls through.
    pub fallthrough: Option<i32>,
    /// Effect when the jump is taken, for jumps and block setups.
    pub branch: Option<i32>,
}

impl StackEffect {
    const fn linear(delta: i32) -> Self {
        Self {
            fallthrough: Some(delta),
            branch: None,
        }
    }

    const fn both(fallthrough: i32, branch: i32) -> Self {
        Self {
            fallthrough: Some(fallthrough),
            branch: Some(branch),
        }
    }

    const fn transfer(branch: Option<i32>) -> Self {
        Self {
            fallthrough: None,
            branch,
        }
    }
}

/// Stack effect of `op` with argument `arg`.
pub fn stack_effect(op: OpCode, arg: u32) -> StackEffect {
    use OpCode::*;
    let arg = arg as i32;
    match op {
        NOP | EXTENDED_ARG | ROT_TWO | ROT_THREE => StackEffect::linear(0),
        POP_TOP => StackEffect::linear(-1),
        DUP_TOP => StackEffect::linear(1),
        DUP_TOP_TWO => StackEffect::linear(2),

        UNARY_POSITIVE | UNARY_NEGATIVE | UNARY_NOT | UNARY_INVERT => StackEffect::linear(0),

        BINARY_MATRIX_MULTIPLY | INPLACE_MATRIX_MULTIPLY | BINARY_POWER | BINARY_MULTIPLY
        | BINARY_MODULO | BINARY_ADD | BINARY_SUBTRACT | BINARY_SUBSCR | BINARY_FLOOR_DIVIDE
        | BINARY_TRUE_DIVIDE | INPLACE_FLOOR_DIVIDE | INPLACE_TRUE_DIVIDE | INPLACE_ADD
        | INPLACE_SUBTRACT | INPLACE_MULTIPLY | INPLACE_MODULO | BINARY_LSHIFT | BINARY_RSHIFT
        | BINARY_AND | BINARY_XOR | BINARY_OR | INPLACE_POWER | INPLACE_LSHIFT
        | INPLACE_RSHIFT | INPLACE_AND | INPLACE_XOR | INPLACE_OR | COMPARE_OP => {
            StackEffect::linear(-1)
        }

        STORE_SUBSCR => StackEffect::linear(-3),
        DELETE_SUBSCR => StackEffect::linear(-2),

        GET_ITER | GET_YIELD_FROM_ITER | GET_AITER | GET_AWAITABLE => StackEffect::linear(0),
        GET_ANEXT => StackEffect::linear(1),
        PRINT_EXPR => StackEffect::linear(-1),
        LOAD_BUILD_CLASS => StackEffect::linear(1),
        YIELD_FROM => StackEffect::linear(-1),
        YIELD_VALUE => StackEffect::linear(0),
        BEFORE_ASYNC_WITH => StackEffect::linear(1),

        BREAK_LOOP | CONTINUE_LOOP => StackEffect::transfer(None),
        RETURN_VALUE => StackEffect::transfer(None),
        RAISE_VARARGS => StackEffect::transfer(None),
        WITH_CLEANUP_START => StackEffect::linear(1),
        WITH_CLEANUP_FINISH => StackEffect::linear(-2),
        IMPORT_STAR => StackEffect::linear(-1),
        SETUP_ANNOTATIONS => StackEffect::linear(0),
        POP_BLOCK => StackEffect::linear(0),
        END_FINALLY => StackEffect::linear(-1),
        POP_EXCEPT => StackEffect::linear(-3),

        STORE_NAME | STORE_GLOBAL | STORE_FAST | STORE_DEREF => StackEffect::linear(-1),
        DELETE_NAME | DELETE_GLOBAL | DELETE_FAST | DELETE_DEREF => StackEffect::linear(0),
        LOAD_CONST | LOAD_NAME | LOAD_GLOBAL | LOAD_FAST | LOAD_CLOSURE | LOAD_DEREF
        | LOAD_CLASSDEREF => StackEffect::linear(1),
        STORE_ANNOTATION => StackEffect::linear(-1),

        UNPACK_SEQUENCE => StackEffect::linear(arg - 1),
        UNPACK_EX => StackEffect::linear((arg & 0xff) + (arg >> 8)),
        FOR_ITER => StackEffect::both(1, -1),

        STORE_ATTR => StackEffect::linear(-2),
        DELETE_ATTR => StackEffect::linear(-1),
        LOAD_ATTR => StackEffect::linear(0),

        BUILD_TUPLE | BUILD_LIST | BUILD_SET | BUILD_STRING => StackEffect::linear(1 - arg),
        BUILD_LIST_UNPACK | BUILD_TUPLE_UNPACK | BUILD_TUPLE_UNPACK_WITH_CALL
        | BUILD_SET_UNPACK | BUILD_MAP_UNPACK | BUILD_MAP_UNPACK_WITH_CALL => {
            StackEffect::linear(1 - arg)
        }
        BUILD_MAP => StackEffect::linear(1 - 2 * arg),
        BUILD_CONST_KEY_MAP => StackEffect::linear(-arg),
        BUILD_SLICE => StackEffect::linear(if arg == 3 { -2 } else { -1 }),
        LIST_APPEND | SET_ADD => StackEffect::linear(-1),
        MAP_ADD => StackEffect::linear(-2),
        FORMAT_VALUE => StackEffect::linear(if arg & 0x04 == 0x04 { -1 } else { 0 }),

        IMPORT_NAME => StackEffect::linear(-1),
        IMPORT_FROM => StackEffect::linear(1),

        JUMP_FORWARD | JUMP_ABSOLUTE => StackEffect::transfer(Some(0)),
        POP_JUMP_IF_FALSE | POP_JUMP_IF_TRUE => StackEffect::both(-1, -1),
        JUMP_IF_FALSE_OR_POP | JUMP_IF_TRUE_OR_POP => StackEffect::both(-1, 0),

        SETUP_LOOP => StackEffect::both(0, 0),
        SETUP_EXCEPT | SETUP_FINALLY => StackEffect::both(0, HANDLER_ENTRY_PUSH),
        SETUP_WITH | SETUP_ASYNC_WITH => StackEffect::both(1, HANDLER_ENTRY_PUSH),

        // callable + positional args (+ kwnames tuple) -> result
        CALL_FUNCTION => StackEffect::linear(-arg),
        CALL_FUNCTION_KW => StackEffect::linear(-arg - 1),
        CALL_FUNCTION_EX => StackEffect::linear(-1 - (arg & 0x01)),
        // code + qualname (+ optional extras) -> function
        MAKE_FUNCTION => StackEffect::linear(
            -1 - ((arg & 0x01) + ((arg >> 1) & 0x01) + ((arg >> 2) & 0x01) + ((arg >> 3) & 0x01)),
        ),
    }
}
