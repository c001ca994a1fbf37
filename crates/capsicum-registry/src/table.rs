//! Module descriptor table.
//!
//! The generated program's loader finds modules through one C table with a
//! row per graph module, in graph insertion order:
//!
//! ```c
//! PyObject* _main_MODULE__(PyFrameObject* f); /* fwd decl */
//!
//! capsicum_module_t __capsicum_modules[1];
//! const size_t __capsicum_module_count = 1;
//!
//! void __capsicum_setup_modules(void)
//! {
//!     capsicum_module_t* m;
//!
//!     m = &__capsicum_modules[0];
//!     m->name = "main";
//!     m->type = MODULE_DEFINED;
//!     ...
//! }
//! ```

use std::fmt;

use capsicum_bytecode::CodeCompiler;
use capsicum_core::{CompileError, ModuleId};

use crate::graph::ModuleGraph;
use crate::module::ModuleKind;

/// Entry point and frame sizes of a module with a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBody {
    pub symbol: String,
    pub stacksize: u32,
    pub nlocals: u32,
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRow {
    pub name: String,
    pub kind: ModuleKind,
    pub id: ModuleId,
    pub parent: ModuleId,
    pub is_main: bool,
    /// `None` for External and Builtin rows.
    pub body: Option<RowBody>,
}

/// The whole table, rendered as C through [`fmt::Display`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTable {
    rows: Vec<ModuleRow>,
}

impl ModuleTable {
    /// Snapshot the graph. Bodied modules are compiled if they are not yet.
    pub fn build(graph: &ModuleGraph, compiler: &dyn CodeCompiler) -> Result<Self, CompileError> {
        let rows = graph
            .modules()
            .iter()
            .map(|module| {
                let body = if module.kind().has_body() {
                    let code = module.code(compiler)?;
                    Some(RowBody {
                        symbol: module.entry_symbol().to_string(),
                        stacksize: code.stacksize(),
                        nlocals: code.nlocals(),
                    })
                } else {
                    None
                };
                Ok(ModuleRow {
                    name: module.name().to_string(),
                    kind: module.kind(),
                    id: module.id(),
                    parent: module
                        .parent_name()
                        .map(ModuleId::from_name)
                        .unwrap_or(ModuleId::NONE),
                    is_main: module.is_main(),
                    body,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;
        tracing::debug!(rows = rows.len(), "module table built");
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ModuleRow] {
        &self.rows
    }
}

impl fmt::Display for ModuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.rows.len();
        writeln!(f, "/* capsicum module table: {count} module(s) */")?;
        writeln!(f, "#include \"capsicum.h\"")?;
        writeln!(f)?;

        for body in self.rows.iter().filter_map(|r| r.body.as_ref()) {
            writeln!(f, "PyObject* {}(PyFrameObject* f); /* fwd decl */", body.symbol)?;
        }
        writeln!(f)?;

        // zero-length arrays are not valid C
        writeln!(f, "capsicum_module_t __capsicum_modules[{}];", count.max(1))?;
        writeln!(f, "const size_t __capsicum_module_count = {count};")?;
        writeln!(f)?;
        writeln!(f, "void __capsicum_setup_modules(void)")?;
        writeln!(f, "{{")?;
        writeln!(f, "    capsicum_module_t* m;")?;

        for (i, row) in self.rows.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "    m = &__capsicum_modules[{i}];")?;
            writeln!(f, "    m->name = {};", c_string_literal(&row.name))?;
            writeln!(f, "    m->type = {};", row.kind.c_tag())?;
            writeln!(f, "    m->id = {};", row.id.to_c_literal())?;
            writeln!(f, "    m->parent = {};", row.parent.to_c_literal())?;
            writeln!(f, "    m->is_main = {};", u8::from(row.is_main))?;
            match &row.body {
                Some(body) => {
                    writeln!(f, "    m->stacksize = {};", body.stacksize)?;
                    writeln!(f, "    m->nlocals = {};", body.nlocals)?;
                    writeln!(f, "    m->ptr = {};", body.symbol)?;
                }
                None => {
                    writeln!(f, "    m->stacksize = 0;")?;
                    writeln!(f, "    m->nlocals = 0;")?;
                    writeln!(f, "    m->ptr = NULL;")?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

/// Quote `s` as a C string literal. Non-printable and non-ASCII bytes are
/// written as three-digit octal escapes.
pub fn c_string_literal(s: &str) -> String {
    c_bytes_literal(s.as_bytes())
}

/// Quote raw bytes as a C string literal.
pub fn c_bytes_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            // keep trigraphs from forming
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out.push('"');
    out
}
