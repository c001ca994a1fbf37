//! Project orchestration.
//!
//! A [`Project`] seeds the module graph from files and directory trees,
//! translates every module with a body on the worker pool, then writes the
//! descriptor table, the import graph and the CMake file.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use capsicum_bytecode::{CodeCompiler, CodeUnit, DumpCompiler};
use capsicum_compiler::{ModuleCompiler, ModuleOutput};
use capsicum_core::CapsicumError;
use capsicum_registry::{DependencyGraph, Module, ModuleGraph, ModuleKind, ModuleSource, ModuleTable};

use crate::config::BuildConfig;
use crate::output::{CMakeFile, OutputTree};
use crate::pool::WorkerPool;
use crate::report::{BuildReport, ModuleFailure};

type Result<T> = std::result::Result<T, CapsicumError>;

const PACKAGE_INIT: &str = "__init__";

/// One translated module, already written to disk.
struct Translated {
    output: ModuleOutput,
    path: PathBuf,
}

/// A program being translated.
pub struct Project {
    config: BuildConfig,
    graph: ModuleGraph,
    compiler: Arc<dyn CodeCompiler>,
}

impl Project {
    /// Empty project reading compiled-unit dumps.
    pub fn new(config: BuildConfig) -> Self {
        Self::with_compiler(config, Arc::new(DumpCompiler::new()))
    }

    pub fn with_compiler(config: BuildConfig, compiler: Arc<dyn CodeCompiler>) -> Self {
        let graph = ModuleGraph::with_builtins(config.extra_builtins.iter().cloned());
        Self {
            config,
            graph,
            compiler,
        }
    }

    /// Project seeded with the files and directories named in `config`.
    pub fn from_config(config: BuildConfig) -> Result<Self> {
        let project = Self::new(config);
        for dir in project.config.directories.clone() {
            project.add_tree(&dir)?;
        }
        for file in project.config.files.clone() {
            project.add_file(&file)?;
        }
        if let Some(main) = project.config.main.clone() {
            project.set_main(&main)?;
        }
        Ok(project)
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    fn read_source(path: &Path) -> Result<ModuleSource> {
        let text = std::fs::read_to_string(path).map_err(|e| CapsicumError::io(path, e))?;
        Ok(ModuleSource::new(text, path.display().to_string()))
    }

    /// Register one file. `__init__` files become the package named after
    /// their directory; anything else is a module named after its stem.
    pub fn add_file(&self, path: &Path) -> Result<Arc<Module>> {
        let stem = file_stem(path)?;
        let (name, kind) = if stem == PACKAGE_INIT {
            let dir = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    CapsicumError::Config(format!("{}: package has no directory name", path.display()))
                })?;
            (dir.to_string(), ModuleKind::Package)
        } else {
            (stem.to_string(), ModuleKind::Defined)
        };
        let source = Self::read_source(path)?;
        tracing::debug!(module = %name, kind = kind.name(), path = %path.display(), "file added");
        Ok(self.graph.add_module(&name, kind, Some(source))?)
    }

    /// Register every source file under `dir`. The directory itself is the
    /// top-level package; directories without an init file become Null
    /// placeholders. Returns the number of files registered.
    pub fn add_tree(&self, dir: &Path) -> Result<usize> {
        let base = dir.parent().unwrap_or(Path::new(""));
        let root = dir.to_str().ok_or_else(|| {
            CapsicumError::Config(format!("{}: path is not valid UTF-8", dir.display()))
        })?;
        let pattern = format!(
            "{}/**/*.{}",
            glob::Pattern::escape(root),
            self.config.source_extension
        );
        let paths = glob::glob(&pattern).map_err(|e| CapsicumError::Config(e.to_string()))?;

        let mut files = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                CapsicumError::io(path, e.into_error())
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
        // parents before children, so packages never start as placeholders
        files.sort_by_key(|p| p.components().count());

        for path in &files {
            let rel = path.strip_prefix(base).unwrap_or(path);
            let mut parts: Vec<&str> = rel
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => s.to_str(),
                    _ => None,
                })
                .collect();
            let stem = file_stem(path)?;
            parts.pop();
            let kind = if stem == PACKAGE_INIT {
                ModuleKind::Package
            } else {
                parts.push(stem);
                ModuleKind::Defined
            };
            if parts.is_empty() {
                continue;
            }
            let name = parts.join(".");
            let source = Self::read_source(path)?;
            self.graph.add_module(&name, kind, Some(source))?;
        }

        // the tree root is a package even without an init file
        if let Some(top) = dir.file_name().and_then(|n| n.to_str()) {
            if !self.graph.contains(top) {
                self.graph.add_module(top, ModuleKind::Null, None)?;
            }
        }

        tracing::debug!(dir = %dir.display(), files = files.len(), "tree added");
        Ok(files.len())
    }

    /// Register a module whose code unit is already available.
    pub fn add_compiled(&self, name: &str, kind: ModuleKind, code: CodeUnit) -> Result<Arc<Module>> {
        Ok(self.graph.add_compiled(name, kind, code)?)
    }

    pub fn set_main(&self, name: &str) -> Result<Arc<Module>> {
        self.graph
            .set_main(name)
            .ok_or_else(|| CapsicumError::Config(format!("entry-point module '{name}' is not part of the project")))
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Translate every module and write the generated tree.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(&self) -> Result<BuildReport> {
        let main = self.graph.main().ok_or_else(|| {
            CapsicumError::Config("no entry-point module; set one with --main".into())
        })?;

        let out = OutputTree::new(&self.config.output_dir);
        out.prepare()?;

        let jobs = self.graph.bodied();
        tracing::info!(
            project = %self.config.name,
            modules = jobs.len(),
            threads = self.config.nthreads,
            "translating"
        );

        let compiler = ModuleCompiler::new(&self.graph, self.compiler.as_ref(), &self.config.options);
        let pool = WorkerPool::new(self.config.nthreads, self.config.fail_fast);
        let results = pool.run(&jobs, |module| {
            let output = compiler.compile_module(module)?;
            let path = out.write_module(&output.file_name, &output.source)?;
            Ok::<_, CapsicumError>(Translated { output, path })
        });

        let mut report = BuildReport::default();
        let mut deps = DependencyGraph::new();
        let mut sources = Vec::new();
        for (module, result) in jobs.iter().zip(results) {
            deps.add_module(module.name());
            match result {
                Some(Ok(Translated { output, path })) => {
                    for site in &output.imports {
                        for imported in &site.modules {
                            deps.add_import(module.name(), imported, site.line);
                        }
                    }
                    report.translated += 1;
                    report.routines += output.routines;
                    report.functions += output.chunks;
                    sources.push(out.relative(&path));
                    report.generated.push(path);
                }
                Some(Err(error)) => {
                    if self.config.fail_fast {
                        return Err(error);
                    }
                    tracing::warn!(module = module.name(), %error, "module failed");
                    report.failures.push(ModuleFailure {
                        module: module.name().to_string(),
                        error,
                    });
                }
                None => {}
            }
        }

        // stubs synthesized while translating are part of the table
        let table = ModuleTable::build(&self.graph, self.compiler.as_ref())?;
        report.table_rows = table.rows().len();
        let table_path = out.write_table(&table.to_string())?;
        sources.push(out.relative(&table_path));
        report.generated.push(table_path);

        report.unreachable = deps
            .unreachable_from(main.name())
            .into_iter()
            .map(str::to_string)
            .collect();
        if !report.unreachable.is_empty() {
            tracing::debug!(modules = ?report.unreachable, "modules unreachable from the entry point");
        }
        report.generated.push(out.write_import_graph(&deps.to_dot())?);

        let cmake = CMakeFile::new(self.config.name.clone(), sources);
        report.generated.push(out.write_cmake(&cmake)?);

        tracing::info!(
            translated = report.translated,
            failed = report.failures.len(),
            "build finished"
        );
        Ok(report)
    }
}

fn file_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CapsicumError::Config(format!("{}: no usable file name", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const EMPTY_DUMP: &str = r#"{"name": "<module>", "stacksize": 1, "code": [100, 0, 83, 0], "consts": ["none"]}"#;

    fn project(dir: &Path) -> Project {
        Project::new(BuildConfig::new("demo").with_output_dir(dir.join("build")))
    }

    #[test]
    fn init_file_names_its_package() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("engine");
        fs::create_dir(&pkg).unwrap();
        fs::write(pkg.join("__init__.json"), EMPTY_DUMP).unwrap();
        let module = project(dir.path()).add_file(&pkg.join("__init__.json")).unwrap();
        assert_eq!(module.name(), "engine");
        assert_eq!(module.kind(), ModuleKind::Package);
    }

    #[test]
    fn tree_registers_packages_and_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tree1");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("bare")).unwrap();
        fs::write(root.join("__init__.json"), EMPTY_DUMP).unwrap();
        fs::write(root.join("a/__init__.json"), EMPTY_DUMP).unwrap();
        fs::write(root.join("a/b/leaf.json"), EMPTY_DUMP).unwrap();
        fs::write(root.join("bare/mod.json"), EMPTY_DUMP).unwrap();
        fs::write(root.join("notes.txt"), "ignored").unwrap();

        let p = project(dir.path());
        assert_eq!(p.add_tree(&root).unwrap(), 4);
        let kind = |name: &str| p.graph().get(name).unwrap().kind();
        assert_eq!(kind("tree1"), ModuleKind::Package);
        assert_eq!(kind("tree1.a"), ModuleKind::Package);
        assert_eq!(kind("tree1.a.b"), ModuleKind::Null);
        assert_eq!(kind("tree1.a.b.leaf"), ModuleKind::Defined);
        assert_eq!(kind("tree1.bare"), ModuleKind::Null);
        assert_eq!(kind("tree1.bare.mod"), ModuleKind::Defined);
    }

    #[test]
    fn run_requires_an_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let p = project(dir.path());
        let err = p.run().unwrap_err();
        assert!(err.to_string().contains("entry-point"));
    }

    #[test]
    fn unknown_main_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = project(dir.path()).set_main("nope").unwrap_err();
        assert!(matches!(err, CapsicumError::Config(_)));
    }
}
