//! Wordcode operation codes.
//!
//! The instruction set of the CPython 3.6 interpreter. Every instruction is
//! two bytes wide: an opcode byte and an argument byte. Opcodes at or above
//! [`HAVE_ARGUMENT`] use their argument; wider arguments are built from
//! `EXTENDED_ARG` prefixes.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Opcodes below this value ignore their argument byte.
pub const HAVE_ARGUMENT: u8 = 90;

/// Width of one instruction in bytes.
pub const INSTRUCTION_WIDTH: usize = 2;

/// Interpreter operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum OpCode {
    // =========================================================================
    // Stack Operations
    // =========================================================================
    POP_TOP = 1,
    ROT_TWO = 2,
    ROT_THREE = 3,
    DUP_TOP = 4,
    DUP_TOP_TWO = 5,
    NOP = 9,

    // =========================================================================
    // Unary / Binary / In-place Arithmetic
    // =========================================================================
    UNARY_POSITIVE = 10,
    UNARY_NEGATIVE = 11,
    UNARY_NOT = 12,
    UNARY_INVERT = 15,
    BINARY_MATRIX_MULTIPLY = 16,
    INPLACE_MATRIX_MULTIPLY = 17,
    BINARY_POWER = 19,
    BINARY_MULTIPLY = 20,
    BINARY_MODULO = 22,
    BINARY_ADD = 23,
    BINARY_SUBTRACT = 24,
    BINARY_SUBSCR = 25,
    BINARY_FLOOR_DIVIDE = 26,
    BINARY_TRUE_DIVIDE = 27,
    INPLACE_FLOOR_DIVIDE = 28,
    INPLACE_TRUE_DIVIDE = 29,

    // =========================================================================
    // Coroutines (decoded, not translated)
    // =========================================================================
    GET_AITER = 50,
    GET_ANEXT = 51,
    BEFORE_ASYNC_WITH = 52,

    INPLACE_ADD = 55,
    INPLACE_SUBTRACT = 56,
    INPLACE_MULTIPLY = 57,
    INPLACE_MODULO = 59,
    STORE_SUBSCR = 60,
    DELETE_SUBSCR = 61,
    BINARY_LSHIFT = 62,
    BINARY_RSHIFT = 63,
    BINARY_AND = 64,
    BINARY_XOR = 65,
    BINARY_OR = 66,
    INPLACE_POWER = 67,
    GET_ITER = 68,
    GET_YIELD_FROM_ITER = 69,
    PRINT_EXPR = 70,
    LOAD_BUILD_CLASS = 71,
    YIELD_FROM = 72,
    GET_AWAITABLE = 73,
    INPLACE_LSHIFT = 75,
    INPLACE_RSHIFT = 76,
    INPLACE_AND = 77,
    INPLACE_XOR = 78,
    INPLACE_OR = 79,

    // =========================================================================
    // Blocks, Returns, Generators
    // =========================================================================
    BREAK_LOOP = 80,
    WITH_CLEANUP_START = 81,
    WITH_CLEANUP_FINISH = 82,
    RETURN_VALUE = 83,
    IMPORT_STAR = 84,
    SETUP_ANNOTATIONS = 85,
    YIELD_VALUE = 86,
    POP_BLOCK = 87,
    END_FINALLY = 88,
    POP_EXCEPT = 89,

    // =========================================================================
    // Opcodes with arguments
    // =========================================================================
    STORE_NAME = 90,
    DELETE_NAME = 91,
    UNPACK_SEQUENCE = 92,
    FOR_ITER = 93,
    UNPACK_EX = 94,
    STORE_ATTR = 95,
    DELETE_ATTR = 96,
    STORE_GLOBAL = 97,
    DELETE_GLOBAL = 98,
    LOAD_CONST = 100,
    LOAD_NAME = 101,
    BUILD_TUPLE = 102,
    BUILD_LIST = 103,
    BUILD_SET = 104,
    BUILD_MAP = 105,
    LOAD_ATTR = 106,
    COMPARE_OP = 107,
    IMPORT_NAME = 108,
    IMPORT_FROM = 109,
    JUMP_FORWARD = 110,
    JUMP_IF_FALSE_OR_POP = 111,
    JUMP_IF_TRUE_OR_POP = 112,
    JUMP_ABSOLUTE = 113,
    POP_JUMP_IF_FALSE = 114,
    POP_JUMP_IF_TRUE = 115,
    LOAD_GLOBAL = 116,
    CONTINUE_LOOP = 119,
    SETUP_LOOP = 120,
    SETUP_EXCEPT = 121,
    SETUP_FINALLY = 122,
    LOAD_FAST = 124,
    STORE_FAST = 125,
    DELETE_FAST = 126,
    STORE_ANNOTATION = 127,
    RAISE_VARARGS = 130,
    CALL_FUNCTION = 131,
    MAKE_FUNCTION = 132,
    BUILD_SLICE = 133,
    LOAD_CLOSURE = 135,
    LOAD_DEREF = 136,
    STORE_DEREF = 137,
    DELETE_DEREF = 138,
    CALL_FUNCTION_KW = 141,
    CALL_FUNCTION_EX = 142,
    SETUP_WITH = 143,
    EXTENDED_ARG = 144,
    LIST_APPEND = 145,
    SET_ADD = 146,
    MAP_ADD = 147,
    LOAD_CLASSDEREF = 148,
    BUILD_LIST_UNPACK = 149,
    BUILD_MAP_UNPACK = 150,
    BUILD_MAP_UNPACK_WITH_CALL = 151,
    BUILD_TUPLE_UNPACK = 152,
    BUILD_SET_UNPACK = 153,
    SETUP_ASYNC_WITH = 154,
    FORMAT_VALUE = 155,
    BUILD_CONST_KEY_MAP = 156,
    BUILD_STRING = 157,
    BUILD_TUPLE_UNPACK_WITH_CALL = 158,
}

/// How a jump argument maps to a destination offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Destination is the offset of the next instruction plus the argument.
    Relative,
    /// Destination is the argument itself.
    Absolute,
}

/// Closed set of instruction categories the translator dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    /// Pure stack shuffling.
    Stack,
    /// Fast-local slot access.
    Local,
    /// Name, global, attribute and subscript access.
    Access,
    /// Unary, binary, in-place and comparison operators.
    Arithmetic,
    /// Container construction and unpacking.
    Build,
    /// Jumps and loop setup/teardown.
    Jump,
    /// Calls and function construction.
    Call,
    /// Exception blocks, raise and context managers.
    Exception,
    /// Import statements.
    Import,
    /// Return, yield and yield-from.
    Generator,
    /// Cell and free variable access.
    Closure,
    /// Comment-only instructions.
    NoOp,
    /// Decoded but intentionally not translated.
    Unsupported,
}

impl OpCode {
    /// Decode an opcode byte.
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        OpCode::try_from(byte).ok()
    }

    /// Whether the instruction reads its argument byte.
    #[inline]
    pub fn has_arg(self) -> bool {
        u8::from(self) >= HAVE_ARGUMENT
    }

    /// The interpreter's spelling of the opcode.
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            POP_TOP => "POP_TOP",
            ROT_TWO => "ROT_TWO",
            ROT_THREE => "ROT_THREE",
            DUP_TOP => "DUP_TOP",
            DUP_TOP_TWO => "DUP_TOP_TWO",
            NOP => "NOP",
            UNARY_POSITIVE => "UNARY_POSITIVE",
            UNARY_NEGATIVE => "UNARY_NEGATIVE",
            UNARY_NOT => "UNARY_NOT",
            UNARY_INVERT => "UNARY_INVERT",
            BINARY_MATRIX_MULTIPLY => "BINARY_MATRIX_MULTIPLY",
            INPLACE_MATRIX_MULTIPLY => "INPLACE_MATRIX_MULTIPLY",
            BINARY_POWER => "BINARY_POWER",
            BINARY_MULTIPLY => "BINARY_MULTIPLY",
            BINARY_MODULO => "BINARY_MODULO",
            BINARY_ADD => "BINARY_ADD",
            BINARY_SUBTRACT => "BINARY_SUBTRACT",
            BINARY_SUBSCR => "BINARY_SUBSCR",
            BINARY_FLOOR_DIVIDE => "BINARY_FLOOR_DIVIDE",
            BINARY_TRUE_DIVIDE => "BINARY_TRUE_DIVIDE",
            INPLACE_FLOOR_DIVIDE => "INPLACE_FLOOR_DIVIDE",
            INPLACE_TRUE_DIVIDE => "INPLACE_TRUE_DIVIDE",
            GET_AITER => "GET_AITER",
            GET_ANEXT => "GET_ANEXT",
            BEFORE_ASYNC_WITH => "BEFORE_ASYNC_WITH",
            INPLACE_ADD => "INPLACE_ADD",
            INPLACE_SUBTRACT => "INPLACE_SUBTRACT",
            INPLACE_MULTIPLY => "INPLACE_MULTIPLY",
            INPLACE_MODULO => "INPLACE_MODULO",
            STORE_SUBSCR => "STORE_SUBSCR",
            DELETE_SUBSCR => "DELETE_SUBSCR",
            BINARY_LSHIFT => "BINARY_LSHIFT",
            BINARY_RSHIFT => "BINARY_RSHIFT",
            BINARY_AND => "BINARY_AND",
            BINARY_XOR => "BINARY_XOR",
            BINARY_OR => "BINARY_OR",
            INPLACE_POWER => "INPLACE_POWER",
            GET_ITER => "GET_ITER",
            GET_YIELD_FROM_ITER => "GET_YIELD_FROM_ITER",
            PRINT_EXPR => "PRINT_EXPR",
            LOAD_BUILD_CLASS => "LOAD_BUILD_CLASS",
            YIELD_FROM => "YIELD_FROM",
            GET_AWAITABLE => "GET_AWAITABLE",
            INPLACE_LSHIFT => "INPLACE_LSHIFT",
            INPLACE_RSHIFT => "INPLACE_RSHIFT",
            INPLACE_AND => "INPLACE_AND",
            INPLACE_XOR => "INPLACE_XOR",
            INPLACE_OR => "INPLACE_OR",
            BREAK_LOOP => "BREAK_LOOP",
            WITH_CLEANUP_START => "WITH_CLEANUP_START",
            WITH_CLEANUP_FINISH => "WITH_CLEANUP_FINISH",
            RETURN_VALUE => "RETURN_VALUE",
            IMPORT_STAR => "IMPORT_STAR",
            SETUP_ANNOTATIONS => "SETUP_ANNOTATIONS",
            YIELD_VALUE => "YIELD_VALUE",
            POP_BLOCK => "POP_BLOCK",
            END_FINALLY => "END_FINALLY",
            POP_EXCEPT => "POP_EXCEPT",
            STORE_NAME => "STORE_NAME",
            DELETE_NAME => "DELETE_NAME",
            UNPACK_SEQUENCE => "UNPACK_SEQUENCE",
            FOR_ITER => "FOR_ITER",
            UNPACK_EX => "UNPACK_EX",
            STORE_ATTR => "STORE_ATTR",
            DELETE_ATTR => "DELETE_ATTR",
            STORE_GLOBAL => "STORE_GLOBAL",
            DELETE_GLOBAL => "DELETE_GLOBAL",
            LOAD_CONST => "LOAD_CONST",
            LOAD_NAME => "LOAD_NAME",
            BUILD_TUPLE => "BUILD_TUPLE",
            BUILD_LIST => "BUILD_LIST",
            BUILD_SET => "BUILD_SET",
            BUILD_MAP => "BUILD_MAP",
            LOAD_ATTR => "LOAD_ATTR",
            COMPARE_OP => "COMPARE_OP",
            IMPORT_NAME => "IMPORT_NAME",
            IMPORT_FROM => "IMPORT_FROM",
            JUMP_FORWARD => "JUMP_FORWARD",
            JUMP_IF_FALSE_OR_POP => "JUMP_IF_FALSE_OR_POP",
            JUMP_IF_TRUE_OR_POP => "JUMP_IF_TRUE_OR_POP",
            JUMP_ABSOLUTE => "JUMP_ABSOLUTE",
            POP_JUMP_IF_FALSE => "POP_JUMP_IF_FALSE",
            POP_JUMP_IF_TRUE => "POP_JUMP_IF_TRUE",
            LOAD_GLOBAL => "LOAD_GLOBAL",
            CONTINUE_LOOP => "CONTINUE_LOOP",
            SETUP_LOOP => "SETUP_LOOP",
            SETUP_EXCEPT => "SETUP_EXCEPT",
            SETUP_FINALLY => "SETUP_FINALLY",
            LOAD_FAST => "LOAD_FAST",
            STORE_FAST => "STORE_FAST",
            DELETE_FAST => "DELETE_FAST",
            STORE_ANNOTATION => "STORE_ANNOTATION",
            RAISE_VARARGS => "RAISE_VARARGS",
            CALL_FUNCTION => "CALL_FUNCTION",
            MAKE_FUNCTION => "MAKE_FUNCTION",
            BUILD_SLICE => "BUILD_SLICE",
            LOAD_CLOSURE => "LOAD_CLOSURE",
            LOAD_DEREF => "LOAD_DEREF",
            STORE_DEREF => "STORE_DEREF",
            DELETE_DEREF => "DELETE_DEREF",
            CALL_FUNCTION_KW => "CALL_FUNCTION_KW",
            CALL_FUNCTION_EX => "CALL_FUNCTION_EX",
            SETUP_WITH => "SETUP_WITH",
            EXTENDED_ARG => "EXTENDED_ARG",
            LIST_APPEND => "LIST_APPEND",
            SET_ADD => "SET_ADD",
            MAP_ADD => "MAP_ADD",
            LOAD_CLASSDEREF => "LOAD_CLASSDEREF",
            BUILD_LIST_UNPACK => "BUILD_LIST_UNPACK",
            BUILD_MAP_UNPACK => "BUILD_MAP_UNPACK",
            BUILD_MAP_UNPACK_WITH_CALL => "BUILD_MAP_UNPACK_WITH_CALL",
            BUILD_TUPLE_UNPACK => "BUILD_TUPLE_UNPACK",
            BUILD_SET_UNPACK => "BUILD_SET_UNPACK",
            SETUP_ASYNC_WITH => "SETUP_ASYNC_WITH",
            FORMAT_VALUE => "FORMAT_VALUE",
            BUILD_CONST_KEY_MAP => "BUILD_CONST_KEY_MAP",
            BUILD_STRING => "BUILD_STRING",
            BUILD_TUPLE_UNPACK_WITH_CALL => "BUILD_TUPLE_UNPACK_WITH_CALL",
        }
    }

    /// Jump encoding, if the argument is a jump destination.
    ///
    /// Block setups count as jumps: their argument names the handler or
    /// loop exit.
    pub fn jump_kind(self) -> Option<JumpKind> {
        use OpCode::*;
        match self {
            JUMP_FORWARD | FOR_ITER | SETUP_LOOP | SETUP_EXCEPT | SETUP_FINALLY
            | SETUP_WITH | SETUP_ASYNC_WITH => Some(JumpKind::Relative),
            JUMP_ABSOLUTE | POP_JUMP_IF_FALSE | POP_JUMP_IF_TRUE | JUMP_IF_FALSE_OR_POP
            | JUMP_IF_TRUE_OR_POP | CONTINUE_LOOP => Some(JumpKind::Absolute),
            _ => None,
        }
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_unconditional_transfer(self) -> bool {
        use OpCode::*;
        matches!(
            self,
            JUMP_FORWARD
                | JUMP_ABSOLUTE
                | CONTINUE_LOOP
                | BREAK_LOOP
                | RETURN_VALUE
                | RAISE_VARARGS
        )
    }

    /// Category used for translation dispatch.
    pub fn category(self) -> OpCategory {
        use OpCode::*;
        match self {
            POP_TOP | ROT_TWO | ROT_THREE | DUP_TOP | DUP_TOP_TWO => OpCategory::Stack,
            NOP | EXTENDED_ARG => OpCategory::NoOp,

            LOAD_FAST | STORE_FAST | DELETE_FAST => OpCategory::Local,

            LOAD_CONST | LOAD_NAME | STORE_NAME | DELETE_NAME | LOAD_GLOBAL | STORE_GLOBAL
            | DELETE_GLOBAL | LOAD_ATTR | STORE_ATTR | DELETE_ATTR | BINARY_SUBSCR
            | STORE_SUBSCR | DELETE_SUBSCR | LOAD_BUILD_CLASS | SETUP_ANNOTATIONS
            | STORE_ANNOTATION | PRINT_EXPR => OpCategory::Access,

            UNARY_POSITIVE | UNARY_NEGATIVE | UNARY_NOT | UNARY_INVERT
            | BINARY_MATRIX_MULTIPLY | INPLACE_MATRIX_MULTIPLY | BINARY_POWER
            | BINARY_MULTIPLY | BINARY_MODULO | BINARY_ADD | BINARY_SUBTRACT
            | BINARY_FLOOR_DIVIDE | BINARY_TRUE_DIVIDE | INPLACE_FLOOR_DIVIDE
            | INPLACE_TRUE_DIVIDE | INPLACE_ADD | INPLACE_SUBTRACT | INPLACE_MULTIPLY
            | INPLACE_MODULO | BINARY_LSHIFT | BINARY_RSHIFT | BINARY_AND | BINARY_XOR
            | BINARY_OR | INPLACE_POWER | INPLACE_LSHIFT | INPLACE_RSHIFT | INPLACE_AND
            | INPLACE_XOR | INPLACE_OR | COMPARE_OP => OpCategory::Arithmetic,

            BUILD_TUPLE | BUILD_LIST | BUILD_SET | BUILD_MAP | BUILD_CONST_KEY_MAP
            | BUILD_STRING | BUILD_SLICE | BUILD_LIST_UNPACK | BUILD_MAP_UNPACK
            | BUILD_MAP_UNPACK_WITH_CALL | BUILD_TUPLE_UNPACK | BUILD_SET_UNPACK
            | BUILD_TUPLE_UNPACK_WITH_CALL | LIST_APPEND | SET_ADD | MAP_ADD
            | UNPACK_SEQUENCE | UNPACK_EX | FORMAT_VALUE => OpCategory::Build,

            JUMP_FORWARD | JUMP_ABSOLUTE | POP_JUMP_IF_FALSE | POP_JUMP_IF_TRUE
            | JUMP_IF_FALSE_OR_POP | JUMP_IF_TRUE_OR_POP | SETUP_LOOP | BREAK_LOOP
            | CONTINUE_LOOP | POP_BLOCK | GET_ITER | FOR_ITER => OpCategory::Jump,

            CALL_FUNCTION | CALL_FUNCTION_KW | CALL_FUNCTION_EX | MAKE_FUNCTION => {
                OpCategory::Call
            }

            SETUP_EXCEPT | SETUP_FINALLY | SETUP_WITH | POP_EXCEPT | END_FINALLY
            | RAISE_VARARGS | WITH_CLEANUP_START | WITH_CLEANUP_FINISH => OpCategory::Exception,

            IMPORT_NAME | IMPORT_FROM | IMPORT_STAR => OpCategory::Import,

            RETURN_VALUE | YIELD_VALUE | YIELD_FROM | GET_YIELD_FROM_ITER => {
                OpCategory::Generator
            }

            LOAD_CLOSURE | LOAD_DEREF | STORE_DEREF | DELETE_DEREF | LOAD_CLASSDEREF => {
                OpCategory::Closure
            }

            GET_AITER | GET_ANEXT | BEFORE_ASYNC_WITH | GET_AWAITABLE | SETUP_ASYNC_WITH => {
                OpCategory::Unsupported
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known_bytes() {
        assert_eq!(OpCode::from_u8(1), Some(OpCode::POP_TOP));
        assert_eq!(OpCode::from_u8(100), Some(OpCode::LOAD_CONST));
        assert_eq!(OpCode::from_u8(144), Some(OpCode::EXTENDED_ARG));
        assert_eq!(OpCode::from_u8(0), None);
        assert_eq!(OpCode::from_u8(255), None);
    }

    #[test]
    fn argument_threshold() {
        assert!(!OpCode::RETURN_VALUE.has_arg());
        assert!(!OpCode::POP_EXCEPT.has_arg());
        assert!(OpCode::STORE_NAME.has_arg());
        assert!(OpCode::LOAD_CONST.has_arg());
    }

    #[test]
    fn names_match_variants() {
        for byte in 0..=u8::MAX {
            if let Some(op) = OpCode::from_u8(byte) {
                assert_eq!(format!("{op:?}"), op.name());
            }
        }
    }

    #[test]
    fn jump_kinds() {
        assert_eq!(OpCode::JUMP_FORWARD.jump_kind(), Some(JumpKind::Relative));
        assert_eq!(OpCode::SETUP_EXCEPT.jump_kind(), Some(JumpKind::Relative));
        assert_eq!(OpCode::POP_JUMP_IF_TRUE.jump_kind(), Some(JumpKind::Absolute));
        assert_eq!(OpCode::LOAD_FAST.jump_kind(), None);
    }

    #[test]
    fn async_opcodes_are_unsupported() {
        assert_eq!(OpCode::GET_AWAITABLE.category(), OpCategory::Unsupported);
        assert_eq!(OpCode::SETUP_ASYNC_WITH.category(), OpCategory::Unsupported);
    }
}
