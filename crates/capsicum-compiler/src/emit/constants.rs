//! Per-routine constant table.
//!
//! Every constant a routine loads gets a slot in a static C array, filled
//! once by an init function that runs on the routine's first call:
//!
//! ```c
//! static PyObject* _main_MODULE___consts[2];
//!
//! static void _main_MODULE___init_consts(void)
//! {
//!     ...
//!     _main_MODULE___consts[0] = PyLong_FromLongLong(1LL); /* 1 */
//!     _main_MODULE___consts[1] = PyUnicode_InternFromString("x"); /* name x */
//!     ...
//! }
//! ```
//!
//! Slots are keyed on object identity: loading the same [`Constant`] object
//! twice reuses its slot, while two equal objects get one slot each.
//! Interpreter singletons never get a slot.

use std::fmt::Write as _;
use std::sync::Arc;

use capsicum_bytecode::{CodeUnit, Constant};
use capsicum_registry::{c_bytes_literal, c_string_literal};
use rustc_hash::FxHashMap;

/// C expression for an interpreter singleton, if `constant` is one.
pub fn singleton_expr(constant: &Constant) -> Option<&'static str> {
    match constant {
        Constant::None => Some("Py_None"),
        Constant::Ellipsis => Some("Py_Ellipsis"),
        Constant::Bool(true) => Some("Py_True"),
        Constant::Bool(false) => Some("Py_False"),
        _ => None,
    }
}

#[derive(Debug)]
struct Slot {
    init: String,
    comment: String,
}

/// Identity-keyed table of a routine's materialized constants.
#[derive(Debug)]
pub struct ConstantTable {
    symbol: String,
    slots: Vec<Slot>,
    by_identity: FxHashMap<usize, u32>,
    names: FxHashMap<usize, u32>,
    code_symbols: FxHashMap<usize, String>,
    // held so that identity keys stay unique for the table's lifetime
    kept_constants: Vec<Arc<Constant>>,
    kept_names: Vec<Arc<str>>,
}

impl ConstantTable {
    /// Table for the routine whose C function is `symbol`.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            slots: Vec::new(),
            by_identity: FxHashMap::default(),
            names: FxHashMap::default(),
            code_symbols: FxHashMap::default(),
            kept_constants: Vec::new(),
            kept_names: Vec::new(),
        }
    }

    /// C name of the static array.
    pub fn array(&self) -> String {
        format!("{}_consts", self.symbol)
    }

    /// C name of the init function.
    pub fn init_function(&self) -> String {
        format!("{}_init_consts", self.symbol)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Tell the table which C function implements a nested code object.
    pub fn bind_code(&mut self, code: &Arc<CodeUnit>, symbol: impl Into<String>) {
        self.code_symbols
            .insert(Arc::as_ptr(code) as usize, symbol.into());
    }

    fn accessor(&self, slot: u32) -> String {
        format!("{}[{}]", self.array(), slot)
    }

    fn push(&mut self, init: String, comment: String) -> u32 {
        let slot = self.slots.len() as u32;
        self.slots.push(Slot { init, comment });
        slot
    }

    /// Accessor for a constant object: a singleton or a table slot.
    pub fn constant(&mut self, constant: &Arc<Constant>) -> String {
        if let Some(expr) = singleton_expr(constant) {
            return expr.to_string();
        }
        let key = Arc::as_ptr(constant) as usize;
        if let Some(&slot) = self.by_identity.get(&key) {
            return self.accessor(slot);
        }
        // members first, so they are built before the container
        let init = self.init_expr(constant);
        let slot = self.push(init, comment_safe(&constant.to_string()));
        self.by_identity.insert(key, slot);
        self.kept_constants.push(Arc::clone(constant));
        self.accessor(slot)
    }

    /// Accessor for a name-pool entry, as an interned string.
    pub fn name(&mut self, name: &Arc<str>) -> String {
        let key = Arc::as_ptr(name) as *const u8 as usize;
        if let Some(&slot) = self.names.get(&key) {
            return self.accessor(slot);
        }
        let init = format!("PyUnicode_InternFromString({})", c_string_literal(name));
        let slot = self.push(init, format!("name {}", comment_safe(name)));
        self.names.insert(key, slot);
        self.kept_names.push(Arc::clone(name));
        self.accessor(slot)
    }

    fn members(&mut self, items: &[Arc<Constant>]) -> String {
        let mut args = items.len().to_string();
        for item in items {
            args.push_str(", ");
            args.push_str(&self.constant(item));
        }
        args
    }

    fn init_expr(&mut self, constant: &Constant) -> String {
        match constant {
            Constant::Int(v) if *v == i64::MIN => {
                "PyLong_FromLongLong(-9223372036854775807LL - 1)".to_string()
            }
            Constant::Int(v) => format!("PyLong_FromLongLong({v}LL)"),
            Constant::BigInt(digits) => {
                format!("PyLong_FromString({}, NULL, 10)", c_string_literal(digits))
            }
            Constant::Float(v) => format!("PyFloat_FromDouble({})", c_double(v.0)),
            Constant::Complex { real, imag } => format!(
                "PyComplex_FromDoubles({}, {})",
                c_double(real.0),
                c_double(imag.0)
            ),
            Constant::Str(s) => format!(
                "PyUnicode_DecodeUTF8({}, {}, NULL)",
                c_string_literal(s),
                s.len()
            ),
            Constant::Bytes(b) => format!(
                "PyBytes_FromStringAndSize({}, {})",
                c_bytes_literal(b),
                b.len()
            ),
            Constant::Tuple(items) => format!("PyTuple_Pack({})", self.members(items)),
            Constant::FrozenSet(items) => {
                format!("__capsicum_frozenset(PyTuple_Pack({}))", self.members(items))
            }
            Constant::Code(code) => self.code_expr(code),
            // singletons are filtered out before this point
            Constant::None | Constant::Ellipsis | Constant::Bool(_) => "Py_None".to_string(),
        }
    }

    fn code_expr(&self, code: &Arc<CodeUnit>) -> String {
        let symbol = self
            .code_symbols
            .get(&(Arc::as_ptr(code) as usize))
            .map(String::as_str)
            .unwrap_or("NULL");
        format!(
            "__capsicum_new_code({symbol}, {name}, {file}, {line}, {argc}, {kwonly}, {nlocals}, {stack}, {flags}, {varnames}, {freevars}, {cellvars})",
            name = c_string_literal(code.name()),
            file = c_string_literal(code.filename()),
            line = code.first_line(),
            argc = code.argcount(),
            kwonly = code.kwonlyargcount(),
            nlocals = code.nlocals(),
            stack = code.stacksize(),
            flags = code.flags().bits(),
            varnames = name_tuple(code.varnames()),
            freevars = name_tuple(code.freevars()),
            cellvars = name_tuple(code.cellvars()),
        )
    }

    /// The static array and its init function. Empty when no slots exist.
    pub fn render(&self) -> String {
        if self.slots.is_empty() {
            return String::new();
        }
        let array = self.array();
        let mut out = String::new();
        let _ = writeln!(out, "static PyObject* {array}[{}];", self.slots.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "static void {}(void)", self.init_function());
        out.push_str("{\n    static int ready = 0;\n\n    if (ready)\n        return;\n");
        for (i, slot) in self.slots.iter().enumerate() {
            let _ = writeln!(out, "    {array}[{i}] = {}; /* {} */", slot.init, slot.comment);
        }
        let _ = writeln!(
            out,
            "    __capsicum_check_consts({array}, {}, {});",
            self.slots.len(),
            c_string_literal(&self.symbol)
        );
        out.push_str("    ready = 1;\n}\n");
        out
    }
}

fn comment_safe(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .replace("*/", "* /")
}

fn c_double(v: f64) -> String {
    if v.is_nan() {
        "Py_NAN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Py_HUGE_VAL" } else { "-Py_HUGE_VAL" }.to_string()
    } else {
        format!("{v:?}")
    }
}

fn name_tuple(names: &[Arc<str>]) -> String {
    if names.is_empty() {
        return "PyTuple_New(0)".to_string();
    }
    let mut out = format!("Py_BuildValue(\"({})\"", "s".repeat(names.len()));
    for name in names {
        out.push_str(", ");
        out.push_str(&c_string_literal(name));
    }
    out.push(')');
    out
}
