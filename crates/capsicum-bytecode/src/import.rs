//! Import sites recovered from bytecode.
//!
//! The host compiler lowers every import to the same three instructions:
//!
//! ```text
//! LOAD_CONST   level
//! LOAD_CONST   fromlist    (None for `import a.b`)
//! IMPORT_NAME  name
//! ```
//!
//! so each site can be read back without the source text.

use crate::code_unit::CodeUnit;
use crate::opcode::OpCode;

/// One import site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    /// Dotted target as written (empty for `from . import x`).
    pub name: String,
    /// Imported names for `from ... import`, empty for plain `import`.
    pub fromlist: Vec<String>,
    /// Number of leading dots; 0 means absolute.
    pub level: u32,
    /// Offset of the `IMPORT_NAME` instruction.
    pub offset: usize,
    pub line: u32,
}

impl ImportStatement {
    /// A plain `import name`.
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.into(),
            fromlist: Vec::new(),
            level: 0,
            offset: 0,
            line: 0,
        }
    }

    /// A `from <dots><name> import <names>`.
    pub fn from_import(name: &str, names: &[&str], level: u32) -> Self {
        Self {
            name: name.into(),
            fromlist: names.iter().map(|n| n.to_string()).collect(),
            level,
            offset: 0,
            line: 0,
        }
    }

    pub fn is_from(&self) -> bool {
        !self.fromlist.is_empty()
    }

    pub fn is_star(&self) -> bool {
        self.fromlist.iter().any(|n| n == "*")
    }
}

/// Import sites of one routine (nested routines excluded).
pub(crate) fn extract_imports(code: &CodeUnit) -> Vec<ImportStatement> {
    let instrs = code.instructions();
    let mut out = Vec::new();

    for (i, instr) in instrs.iter().enumerate() {
        if instr.op != OpCode::IMPORT_NAME || i < 2 {
            continue;
        }
        let (level_op, from_op) = (&instrs[i - 2], &instrs[i - 1]);
        if level_op.op != OpCode::LOAD_CONST || from_op.op != OpCode::LOAD_CONST {
            tracing::debug!(
                module = code.module(),
                offset = instr.offset,
                "skipping non-constant import site"
            );
            continue;
        }
        let level = code.constant(level_op.arg).and_then(|c| c.as_int());
        let fromlist = code.constant(from_op.arg).and_then(|c| c.as_name_list());
        let name = code.name_at(instr.arg);
        if let (Some(level), Some(fromlist), Some(name)) = (level, fromlist, name) {
            out.push(ImportStatement {
                name: name.to_string(),
                fromlist: fromlist.into_iter().map(str::to_string).collect(),
                level: level.max(0) as u32,
                offset: instr.offset,
                line: instr.line,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CodeBuilder;
    use crate::constant::Constant;

    #[test]
    fn plain_and_from_imports() {
        let mut b = CodeBuilder::module("pkg.mod");
        b.import_name("os.path", &[], 0);
        b.store_name("os");
        b.import_name("sibling", &["thing", "other"], 1);
        b.emit_arg(OpCode::IMPORT_FROM, 0);
        b.store_name("thing");
        b.emit(OpCode::POP_TOP);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let code = b.finish();

        let imports = code.imports();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].name, "os.path");
        assert!(!imports[0].is_from());
        assert_eq!(imports[0].level, 0);
        assert_eq!(imports[1].name, "sibling");
        assert_eq!(imports[1].fromlist, vec!["thing", "other"]);
        assert_eq!(imports[1].level, 1);
        assert_eq!(imports[1].offset, 12);
    }

    #[test]
    fn star_import() {
        let stmt = ImportStatement::from_import("os", &["*"], 0);
        assert!(stmt.is_star());
        assert!(stmt.is_from());
    }

    #[test]
    fn nested_routine_imports_are_collected() {
        let mut inner = CodeBuilder::function("f", "m");
        inner.import_name("json", &[], 0);
        inner.emit(OpCode::RETURN_VALUE);
        let inner = inner.finish();

        let mut outer = CodeBuilder::module("m");
        outer.load_const(Constant::Code(std::sync::Arc::new(inner)));
        outer.load_const(Constant::Str("f".into()));
        outer.emit_arg(OpCode::MAKE_FUNCTION, 0);
        outer.store_name("f");
        outer.load_const(Constant::None);
        outer.emit(OpCode::RETURN_VALUE);

        let names: Vec<_> = outer.finish().imports().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["json"]);
    }
}
