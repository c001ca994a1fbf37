//! Modules and their kinds.
//!
//! A [`Module`] is one node of the program: a dotted name, a stable
//! [`ModuleId`], a [`ModuleKind`] tag and, for kinds with a body, a lazily
//! compiled [`CodeUnit`]. Parents are not stored; they are found by dotted
//! lookup in the [`ModuleGraph`](crate::ModuleGraph).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use capsicum_bytecode::{CodeCompiler, CodeUnit};
use capsicum_core::{CompileError, ModuleId};
use once_cell::sync::OnceCell;

/// What a module is and whether it has a body to translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// A source module of the program.
    Defined,
    /// A source package (`__init__` module).
    Package,
    /// Resolved at run time by the host interpreter.
    External,
    /// Compiled into the host interpreter.
    Builtin,
    /// A directory with no init module; its body is empty.
    Null,
}

impl ModuleKind {
    /// Kinds that produce a translated C body.
    pub fn has_body(self) -> bool {
        matches!(self, ModuleKind::Defined | ModuleKind::Package | ModuleKind::Null)
    }

    /// Kinds that can hold submodules and act as a relative-import base.
    pub fn is_package(self) -> bool {
        matches!(self, ModuleKind::Package | ModuleKind::Null)
    }

    /// Kinds that belong to the program tree rather than the host interpreter.
    pub fn is_local(self) -> bool {
        self.has_body()
    }

    /// Enumerator used in the module descriptor table.
    pub fn c_tag(self) -> &'static str {
        match self {
            ModuleKind::Defined => "MODULE_DEFINED",
            ModuleKind::Package | ModuleKind::Null => "MODULE_PACKAGE",
            ModuleKind::External | ModuleKind::Builtin => "MODULE_BUILTIN",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Defined => "defined",
            ModuleKind::Package => "package",
            ModuleKind::External => "external",
            ModuleKind::Builtin => "builtin",
            ModuleKind::Null => "null",
        }
    }
}

/// Source text of a module together with where it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub text: String,
    pub origin: String,
}

impl ModuleSource {
    pub fn new(text: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: origin.into(),
        }
    }
}

/// One module of the program.
#[derive(Debug)]
pub struct Module {
    name: String,
    id: ModuleId,
    kind: ModuleKind,
    symbol: String,
    source: Option<ModuleSource>,
    code: OnceCell<Arc<CodeUnit>>,
    is_main: AtomicBool,
}

impl Module {
    pub(crate) fn new(name: &str, kind: ModuleKind, source: Option<ModuleSource>) -> Self {
        Self {
            name: name.to_string(),
            id: ModuleId::from_name(name),
            kind,
            symbol: entry_symbol(name),
            source,
            code: OnceCell::new(),
            is_main: AtomicBool::new(false),
        }
    }

    /// A module whose code unit is already available.
    pub(crate) fn with_code(name: &str, kind: ModuleKind, code: CodeUnit) -> Self {
        let module = Self::new(name, kind, None);
        // a fresh cell cannot already be set
        let _ = module.code.set(Arc::new(code));
        module
    }

    /// Dotted name, unique in the graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn source(&self) -> Option<&ModuleSource> {
        self.source.as_ref()
    }

    /// Name of the C entry function, `_<mangled>_MODULE__`.
    pub fn entry_symbol(&self) -> &str {
        &self.symbol
    }

    /// Mangled dotted name, used for generated file names.
    pub fn mangled_name(&self) -> String {
        mangle(&self.name)
    }

    /// Dotted name of the parent package, if any.
    pub fn parent_name(&self) -> Option<&str> {
        parent_name(&self.name)
    }

    pub fn is_main(&self) -> bool {
        self.is_main.load(Ordering::Acquire)
    }

    pub(crate) fn set_main_flag(&self, value: bool) {
        self.is_main.store(value, Ordering::Release);
    }

    /// The module's code unit, compiling it on first use.
    ///
    /// Null placeholder packages get an empty body. Only the first caller
    /// compiles; concurrent callers wait for that result.
    pub fn code(&self, compiler: &dyn CodeCompiler) -> Result<Arc<CodeUnit>, CompileError> {
        self.code
            .get_or_try_init(|| {
                if let Some(source) = &self.source {
                    return compiler
                        .compile(&self.name, &source.text, &source.origin)
                        .map(Arc::new);
                }
                match self.kind {
                    ModuleKind::Null => Ok(Arc::new(CodeUnit::empty_module(&self.name))),
                    _ => Err(CompileError::MissingSource {
                        module: self.name.clone(),
                    }),
                }
            })
            .cloned()
    }

    /// The code unit if it has already been compiled.
    pub fn compiled(&self) -> Option<&Arc<CodeUnit>> {
        self.code.get()
    }
}

/// Dotted name with every character that is not valid in a C identifier
/// replaced by `_`.
pub fn mangle(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// C entry function name for a module.
pub fn entry_symbol(name: &str) -> String {
    format!("_{}_MODULE__", mangle(name))
}

/// Everything before the last dot.
pub fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(parent, _)| parent)
}

/// `a`, `a.b`, `a.b.c` for `a.b.c`.
pub fn prefixes(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('.')
        .map(move |(i, _)| &name[..i])
        .chain(std::iter::once(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsicum_bytecode::DumpCompiler;

    #[test]
    fn kind_tags() {
        assert_eq!(ModuleKind::Defined.c_tag(), "MODULE_DEFINED");
        assert_eq!(ModuleKind::Null.c_tag(), "MODULE_PACKAGE");
        assert_eq!(ModuleKind::External.c_tag(), "MODULE_BUILTIN");
        assert!(ModuleKind::Null.has_body());
        assert!(!ModuleKind::Builtin.has_body());
        assert!(ModuleKind::Package.is_package());
        assert!(!ModuleKind::Defined.is_package());
    }

    #[test]
    fn naming() {
        assert_eq!(entry_symbol("pkg.sub.mod"), "_pkg_sub_mod_MODULE__");
        assert_eq!(mangle("a-b.c"), "a_b_c");
        assert_eq!(parent_name("a.b.c"), Some("a.b"));
        assert_eq!(parent_name("a"), None);
        assert_eq!(prefixes("a.b.c").collect::<Vec<_>>(), vec!["a", "a.b", "a.b.c"]);
        assert_eq!(prefixes("solo").collect::<Vec<_>>(), vec!["solo"]);
    }

    #[test]
    fn null_module_compiles_to_empty_body() {
        let m = Module::new("pkg", ModuleKind::Null, None);
        let code = m.code(&DumpCompiler).unwrap();
        assert_eq!(code.module(), "pkg");
        assert_eq!(code.instructions().len(), 2);
        assert!(Arc::ptr_eq(&code, &m.code(&DumpCompiler).unwrap()));
    }

    #[test]
    fn defined_module_without_source_fails() {
        let m = Module::new("main", ModuleKind::Defined, None);
        assert_eq!(
            m.code(&DumpCompiler).unwrap_err(),
            CompileError::MissingSource {
                module: "main".into()
            }
        );
    }

    #[test]
    fn source_is_compiled_once() {
        let src = r#"{"name": "<module>", "stacksize": 1, "code": [100, 0, 83, 0], "consts": ["none"]}"#;
        let m = Module::new(
            "main",
            ModuleKind::Defined,
            Some(ModuleSource::new(src, "main.json")),
        );
        assert!(m.compiled().is_none());
        let first = m.code(&DumpCompiler).unwrap();
        assert!(Arc::ptr_eq(&first, m.compiled().unwrap()));
    }
}
