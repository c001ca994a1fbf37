//! The module graph and import resolution.
//!
//! The graph is an append-only table from dotted name to [`Module`]. The
//! orchestrator seeds it with the program's own modules; translation workers
//! then grow it concurrently as imports are resolved, synthesizing stub
//! modules for builtin and external names.
//!
//! ## Invariants
//!
//! - Every dotted prefix of a present name is itself present. Seeding inserts
//!   Null placeholder packages for missing ancestors; stubs synthesize missing
//!   ancestors of their own kind.
//! - A name maps to exactly one module. Resolving the same name twice returns
//!   the same `Arc`.
//! - Insertion order is stable and is the row order of the descriptor table.
//!
//! ## Locking
//!
//! Lookups take a shared read lock. Inserts take the write lock only for the
//! insert itself, re-checking under it, so concurrent resolution of the same
//! name races to one winner.

use std::sync::Arc;

use capsicum_bytecode::{CodeUnit, ImportStatement};
use capsicum_core::{ModuleId, ResolutionError};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::builtins::BUILTIN_MODULES;
use crate::module::{Module, ModuleKind, ModuleSource, parent_name, prefixes};

#[derive(Debug, Default)]
struct Table {
    modules: Vec<Arc<Module>>,
    by_name: FxHashMap<String, usize>,
    by_id: FxHashMap<ModuleId, usize>,
    by_symbol: FxHashMap<String, usize>,
}

impl Table {
    fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.by_name.get(name).map(|&i| &self.modules[i])
    }

    fn push(&mut self, module: Module) -> Result<Arc<Module>, ResolutionError> {
        if let Some(&i) = self.by_id.get(&module.id()) {
            return Err(ResolutionError::IdCollision {
                name: module.name().to_string(),
                existing: self.modules[i].name().to_string(),
            });
        }
        if let Some(&i) = self.by_symbol.get(module.entry_symbol()) {
            return Err(ResolutionError::SymbolCollision {
                name: module.name().to_string(),
                existing: self.modules[i].name().to_string(),
                symbol: module.entry_symbol().to_string(),
            });
        }
        let index = self.modules.len();
        let module = Arc::new(module);
        self.by_name.insert(module.name().to_string(), index);
        self.by_id.insert(module.id(), index);
        self.by_symbol.insert(module.entry_symbol().to_string(), index);
        self.modules.push(module.clone());
        Ok(module)
    }

    /// Insert `kind` placeholders for every missing proper ancestor of `name`.
    fn fill_ancestors(&mut self, name: &str, kind: ModuleKind) -> Result<(), ResolutionError> {
        for prefix in prefixes(name) {
            if prefix.len() == name.len() {
                break;
            }
            if self.get(prefix).is_none() {
                self.push(Module::new(prefix, kind, None))?;
            }
        }
        Ok(())
    }
}

/// Outcome of resolving one import statement.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    /// Absolute dotted name of the import target.
    pub absolute: String,
    /// The target module itself.
    pub target: Arc<Module>,
    /// Every module the statement pulls in, ancestors first.
    pub modules: Vec<Arc<Module>>,
}

/// Dotted name to module, shared by all translation workers.
#[derive(Debug)]
pub struct ModuleGraph {
    table: RwLock<Table>,
    builtins: FxHashSet<String>,
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleGraph {
    /// An empty graph that knows the host interpreter's builtin modules.
    pub fn new() -> Self {
        Self::with_builtins(std::iter::empty::<String>())
    }

    /// An empty graph with additional builtin module names.
    pub fn with_builtins<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builtins: FxHashSet<String> =
            BUILTIN_MODULES.iter().map(|s| s.to_string()).collect();
        builtins.extend(extra.into_iter().map(Into::into));
        Self {
            table: RwLock::new(Table::default()),
            builtins,
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Add a program module. Missing ancestors become Null placeholders.
    ///
    /// Adding a name that is already present returns the existing module,
    /// except that a Null placeholder is upgraded when its real package or
    /// module is added later.
    pub fn add_module(
        &self,
        name: &str,
        kind: ModuleKind,
        source: Option<ModuleSource>,
    ) -> Result<Arc<Module>, ResolutionError> {
        self.insert(Module::new(name, kind, source))
    }

    /// Add a program module whose code unit is already compiled.
    pub fn add_compiled(
        &self,
        name: &str,
        kind: ModuleKind,
        code: CodeUnit,
    ) -> Result<Arc<Module>, ResolutionError> {
        self.insert(Module::with_code(name, kind, code))
    }

    fn insert(&self, module: Module) -> Result<Arc<Module>, ResolutionError> {
        let mut table = self.table.write();
        table.fill_ancestors(module.name(), ModuleKind::Null)?;

        if let Some(&index) = table.by_name.get(module.name()) {
            let existing = &table.modules[index];
            if existing.kind() == ModuleKind::Null && module.kind() != ModuleKind::Null {
                tracing::debug!(
                    module = module.name(),
                    kind = module.kind().name(),
                    "replacing placeholder package"
                );
                module.set_main_flag(existing.is_main());
                let module = Arc::new(module);
                table.modules[index] = module.clone();
                return Ok(module);
            }
            tracing::warn!(module = module.name(), "module added twice, keeping the first");
            return Ok(existing.clone());
        }

        tracing::trace!(module = module.name(), kind = module.kind().name(), "module added");
        table.push(module)
    }

    /// Mark `name` as the program entry point, clearing any previous holder.
    pub fn set_main(&self, name: &str) -> Option<Arc<Module>> {
        let table = self.table.write();
        let main = table.get(name)?.clone();
        for module in &table.modules {
            module.set_main_flag(Arc::ptr_eq(module, &main));
        }
        Some(main)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.table.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every module in insertion order.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.table.read().modules.clone()
    }

    /// Snapshot of the modules that need a translated body.
    pub fn bodied(&self) -> Vec<Arc<Module>> {
        self.table
            .read()
            .modules
            .iter()
            .filter(|m| m.kind().has_body())
            .cloned()
            .collect()
    }

    /// The entry-point module, if one has been set.
    pub fn main(&self) -> Option<Arc<Module>> {
        self.table.read().modules.iter().find(|m| m.is_main()).cloned()
    }

    pub fn parent_of(&self, module: &Module) -> Option<Arc<Module>> {
        module.parent_name().and_then(|p| self.get(p))
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Names whose parent is absent. Always empty for a well-formed graph.
    pub fn orphans(&self) -> Vec<String> {
        let table = self.table.read();
        table
            .modules
            .iter()
            .filter(|m| m.parent_name().is_some_and(|p| table.get(p).is_none()))
            .map(|m| m.name().to_string())
            .collect()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve an absolute dotted name.
    ///
    /// Order: a module already in the graph, then a host builtin, then an
    /// external stub when `allow_external` is set. Names under a local
    /// package never become external stubs.
    pub fn resolve(&self, name: &str, allow_external: bool) -> Option<Arc<Module>> {
        self.try_resolve("", name, allow_external).ok()
    }

    /// Like [`resolve`](Self::resolve) but reports why a name is unresolvable.
    pub fn try_resolve(
        &self,
        importer: &str,
        name: &str,
        allow_external: bool,
    ) -> Result<Arc<Module>, ResolutionError> {
        if let Some(module) = self.get(name) {
            return Ok(module);
        }
        if self.is_builtin(name) {
            return self.synthesize(name, ModuleKind::Builtin);
        }
        if let Some(package) = self.local_ancestor(name) {
            return Err(ResolutionError::MissingSubmodule {
                name: name.to_string(),
                package: package.name().to_string(),
            });
        }
        if allow_external {
            return self.synthesize(name, ModuleKind::External);
        }
        Err(ResolutionError::Unresolved {
            importer: importer.to_string(),
            name: name.to_string(),
        })
    }

    /// Nearest present ancestor of `name`, if it belongs to the program tree.
    fn local_ancestor(&self, name: &str) -> Option<Arc<Module>> {
        let mut current = parent_name(name);
        while let Some(candidate) = current {
            if let Some(module) = self.get(candidate) {
                return module.kind().is_local().then_some(module);
            }
            current = parent_name(candidate);
        }
        None
    }

    /// Insert a stub module and its missing ancestors, all of `kind`.
    fn synthesize(&self, name: &str, kind: ModuleKind) -> Result<Arc<Module>, ResolutionError> {
        let mut table = self.table.write();
        if let Some(module) = table.get(name) {
            return Ok(module.clone());
        }
        table.fill_ancestors(name, kind)?;
        let module = table.push(Module::new(name, kind, None))?;
        tracing::debug!(module = name, kind = kind.name(), "synthesized stub module");
        Ok(module)
    }

    /// Rewrite a possibly relative import target to an absolute name.
    ///
    /// The base of a relative import is the importer itself when it is a
    /// package, otherwise its parent; each extra level walks one package up.
    pub fn absolute_name(
        &self,
        importer: &Module,
        name: &str,
        level: u32,
    ) -> Result<String, ResolutionError> {
        if level == 0 {
            return Ok(name.to_string());
        }
        let mut package = if importer.kind().is_package() {
            Some(importer.name())
        } else {
            importer.parent_name()
        };
        for _ in 1..level {
            package = package.and_then(parent_name);
        }
        let Some(package) = package else {
            return Err(ResolutionError::BeyondTopLevel {
                importer: importer.name().to_string(),
                name: name.to_string(),
                level,
            });
        };
        Ok(if name.is_empty() {
            package.to_string()
        } else {
            format!("{package}.{name}")
        })
    }

    /// Resolve one import statement of `importer` into the modules it pulls in.
    pub fn resolve_from_import(
        &self,
        importer: &Module,
        statement: &ImportStatement,
        allow_external: bool,
    ) -> Result<ResolvedImport, ResolutionError> {
        let absolute = self.absolute_name(importer, &statement.name, statement.level)?;
        let target = self.try_resolve(importer.name(), &absolute, allow_external)?;

        let mut modules: Vec<Arc<Module>> = prefixes(&absolute)
            .filter(|p| p.len() < absolute.len())
            .filter_map(|p| self.get(p))
            .collect();
        modules.push(target.clone());

        // from-list names are often attributes; only known modules count
        for item in statement.fromlist.iter().filter(|n| n.as_str() != "*") {
            if let Some(module) = self.get(&format!("{absolute}.{item}")) {
                if !modules.iter().any(|m| Arc::ptr_eq(m, &module)) {
                    modules.push(module);
                }
            }
        }

        Ok(ResolvedImport {
            absolute,
            target,
            modules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(modules: &[Arc<Module>]) -> Vec<&str> {
        modules.iter().map(|m| m.name()).collect()
    }

    fn seeded() -> ModuleGraph {
        let graph = ModuleGraph::new();
        graph.add_module("main", ModuleKind::Defined, None).unwrap();
        graph.add_module("parent", ModuleKind::Package, None).unwrap();
        graph.add_module("parent.child", ModuleKind::Package, None).unwrap();
        graph.add_module("parent.child.leaf", ModuleKind::Defined, None).unwrap();
        graph
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    #[test]
    fn missing_ancestors_become_null_packages() {
        let graph = ModuleGraph::new();
        graph.add_module("a.b.c", ModuleKind::Defined, None).unwrap();
        assert_eq!(names(&graph.modules()), vec!["a", "a.b", "a.b.c"]);
        assert_eq!(graph.get("a").unwrap().kind(), ModuleKind::Null);
        assert!(graph.orphans().is_empty());
    }

    #[test]
    fn placeholder_is_upgraded_in_place() {
        let graph = ModuleGraph::new();
        graph.add_module("pkg.mod", ModuleKind::Defined, None).unwrap();
        graph.add_module("pkg", ModuleKind::Package, None).unwrap();
        assert_eq!(graph.get("pkg").unwrap().kind(), ModuleKind::Package);
        assert_eq!(names(&graph.modules()), vec!["pkg", "pkg.mod"]);
    }

    #[test]
    fn adding_twice_keeps_first() {
        let graph = ModuleGraph::new();
        let first = graph.add_module("m", ModuleKind::Defined, None).unwrap();
        let second = graph.add_module("m", ModuleKind::Package, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn symbol_collision_is_rejected() {
        let graph = ModuleGraph::new();
        graph.add_module("a_b", ModuleKind::Defined, None).unwrap();
        graph.add_module("a", ModuleKind::Package, None).unwrap();
        let err = graph.add_module("a.b", ModuleKind::Defined, None).unwrap_err();
        assert!(matches!(err, ResolutionError::SymbolCollision { .. }));
    }

    #[test]
    fn main_flag_moves() {
        let graph = seeded();
        graph.set_main("main").unwrap();
        assert!(graph.get("main").unwrap().is_main());
        graph.set_main("parent.child.leaf").unwrap();
        assert!(!graph.get("main").unwrap().is_main());
        assert_eq!(graph.main().unwrap().name(), "parent.child.leaf");
        assert!(graph.set_main("nope").is_none());
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    #[test]
    fn resolve_prefers_graph_then_builtin_then_external() {
        let graph = seeded();
        assert_eq!(graph.resolve("main", false).unwrap().kind(), ModuleKind::Defined);
        assert_eq!(graph.resolve("sys", false).unwrap().kind(), ModuleKind::Builtin);
        assert!(graph.resolve("numpy", false).is_none());
        assert_eq!(graph.resolve("numpy", true).unwrap().kind(), ModuleKind::External);
    }

    #[test]
    fn resolution_is_idempotent() {
        let graph = seeded();
        let a = graph.resolve("os.path", true).unwrap();
        let b = graph.resolve("os.path", true).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(graph.get("os").unwrap().kind(), ModuleKind::External);
        assert!(graph.orphans().is_empty());
    }

    #[test]
    fn local_packages_mask_external_names() {
        let graph = seeded();
        assert!(graph.resolve("parent.missing", true).is_none());
        let err = graph.try_resolve("main", "parent.missing", true).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingSubmodule {
                name: "parent.missing".into(),
                package: "parent".into()
            }
        );
    }

    #[test]
    fn extra_builtins() {
        let graph = ModuleGraph::with_builtins(["_custom"]);
        assert_eq!(graph.resolve("_custom", false).unwrap().kind(), ModuleKind::Builtin);
    }

    #[test]
    fn relative_names_from_package() {
        let graph = seeded();
        let child = graph.get("parent.child").unwrap();
        assert_eq!(
            graph.absolute_name(&child, "sibling", 1).unwrap(),
            "parent.child.sibling"
        );
        assert_eq!(graph.absolute_name(&child, "name", 2).unwrap(), "parent.name");
        assert_eq!(graph.absolute_name(&child, "", 1).unwrap(), "parent.child");
        assert!(matches!(
            graph.absolute_name(&child, "name", 3),
            Err(ResolutionError::BeyondTopLevel { level: 3, .. })
        ));
    }

    #[test]
    fn relative_names_from_module() {
        let graph = seeded();
        let leaf = graph.get("parent.child.leaf").unwrap();
        assert_eq!(graph.absolute_name(&leaf, "x", 1).unwrap(), "parent.child.x");
        let main = graph.get("main").unwrap();
        assert!(graph.absolute_name(&main, "x", 1).is_err());
        assert_eq!(graph.absolute_name(&main, "os", 0).unwrap(), "os");
    }

    #[test]
    fn plain_import_pulls_in_ancestors() {
        let graph = seeded();
        let main = graph.get("main").unwrap();
        let stmt = ImportStatement::plain("parent.child.leaf");
        let resolved = graph.resolve_from_import(&main, &stmt, false).unwrap();
        assert_eq!(resolved.absolute, "parent.child.leaf");
        assert_eq!(
            names(&resolved.modules),
            vec!["parent", "parent.child", "parent.child.leaf"]
        );
    }

    #[test]
    fn from_import_adds_known_submodules_only() {
        let graph = seeded();
        let main = graph.get("main").unwrap();
        let stmt = ImportStatement::from_import("parent.child", &["leaf", "attr"], 0);
        let resolved = graph.resolve_from_import(&main, &stmt, true).unwrap();
        assert_eq!(resolved.target.name(), "parent.child");
        assert_eq!(
            names(&resolved.modules),
            vec!["parent", "parent.child", "parent.child.leaf"]
        );
        assert!(!graph.contains("parent.child.attr"));
    }

    #[test]
    fn relative_from_import() {
        let graph = seeded();
        let leaf = graph.get("parent.child.leaf").unwrap();
        let stmt = ImportStatement::from_import("", &["leaf"], 2);
        let resolved = graph.resolve_from_import(&leaf, &stmt, false).unwrap();
        assert_eq!(resolved.target.name(), "parent");
    }

    #[test]
    fn unresolved_plain_import_is_an_error() {
        let graph = seeded();
        let main = graph.get("main").unwrap();
        let err = graph
            .resolve_from_import(&main, &ImportStatement::plain("requests"), false)
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::Unresolved {
                importer: "main".into(),
                name: "requests".into()
            }
        );
    }

    #[test]
    fn concurrent_stub_synthesis_yields_one_module() {
        let graph = seeded();
        let found: Vec<Arc<Module>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| graph.resolve("xml.dom.minidom", true).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(found.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        let stubs = graph
            .modules()
            .iter()
            .filter(|m| m.name().starts_with("xml"))
            .count();
        assert_eq!(stubs, 3);
    }
}
