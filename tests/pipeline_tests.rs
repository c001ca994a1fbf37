//! End-to-end runs of the project pipeline: seeding, translation on the
//! worker pool, descriptor table and build file output.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use capsicum::{BuildConfig, Cli, Project, ProjectFile};
use capsicum_bytecode::{CodeBuilder, CodeUnit, Constant, OpCode};
use capsicum_compiler::TranslateOptions;
use capsicum_core::{CapsicumError, ResolutionError, TranslationErrorKind};
use capsicum_registry::ModuleKind;
use clap::Parser;
use pretty_assertions::assert_eq;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/basic")
}

fn config(out: &Path) -> BuildConfig {
    BuildConfig::new("demo").with_output_dir(out).with_threads(2)
}

fn assignment(module: &str) -> CodeUnit {
    let mut b = CodeBuilder::module(module);
    b.load_const(Constant::Int(1));
    b.store_name("x");
    b.load_const(Constant::None);
    b.emit(OpCode::RETURN_VALUE);
    b.finish()
}

fn importing(module: &str, target: &str, level: u32) -> CodeUnit {
    let mut b = CodeBuilder::module(module);
    b.import_name(target, &[], level);
    b.emit(OpCode::POP_TOP);
    b.load_const(Constant::None);
    b.emit(OpCode::RETURN_VALUE);
    b.finish()
}

fn read(out: &Path, rel: &str) -> String {
    fs::read_to_string(out.join(rel)).unwrap_or_else(|e| panic!("{rel}: {e}"))
}

/// The table block describing one module, up to the next row.
fn row<'a>(table: &'a str, name: &str) -> &'a str {
    let marker = format!("m->name = \"{name}\";");
    let start = table.find(&marker).unwrap_or_else(|| panic!("no row for {name}"));
    let rest = &table[start..];
    let end = rest[1..].find("m->name").map(|i| i + 1).unwrap_or(rest.len());
    &rest[..end]
}

// =============================================================================
// Descriptor table
// =============================================================================

#[test]
fn single_module_yields_one_defined_row() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(config(dir.path()));
    let unit = assignment("main");
    let stacksize = unit.stacksize();
    project.add_compiled("main", ModuleKind::Defined, unit).unwrap();
    project.set_main("main").unwrap();

    let report = project.run().unwrap();
    assert!(report.is_success());
    assert_eq!(report.table_rows, 1);

    let table = read(dir.path(), "gen/modules.c");
    assert!(table.contains("PyObject* _main_MODULE__(PyFrameObject* f); /* fwd decl */"));
    assert!(table.contains("capsicum_module_t __capsicum_modules[1];"));
    let main = row(&table, "main");
    assert!(main.contains("m->type = MODULE_DEFINED;"));
    assert!(main.contains("m->is_main = 1;"));
    assert!(main.contains(&format!("m->stacksize = {stacksize};")));
    assert!(main.contains("m->ptr = _main_MODULE__;"));

    let c = read(dir.path(), "gen/modules/main.c");
    assert!(c.contains("#include \"capsicum.h\""));
    assert!(c.contains("PyObject* _main_MODULE__(PyFrameObject* f)\n{"));
}

#[test]
fn unresolvable_import_becomes_an_external_row() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(config(dir.path()));
    project
        .add_compiled("main", ModuleKind::Defined, importing("main", "nowhere", 0))
        .unwrap();
    project.set_main("main").unwrap();

    let report = project.run().unwrap();
    assert!(report.is_success());

    let table = read(dir.path(), "gen/modules.c");
    let external = row(&table, "nowhere");
    assert!(external.contains("m->type = MODULE_BUILTIN;"));
    assert!(external.contains("m->stacksize = 0;"));
    assert!(external.contains("m->nlocals = 0;"));
    assert!(external.contains("m->ptr = NULL;"));
    assert!(!table.contains("_nowhere_MODULE__"));
    assert_eq!(
        project.graph().get("nowhere").unwrap().kind(),
        ModuleKind::External
    );
}

// =============================================================================
// Trees and files on disk
// =============================================================================

#[test]
fn fixture_project_writes_the_full_tree() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(config(dir.path()));
    project.add_tree(&fixtures().join("tree1")).unwrap();
    project.add_file(&fixtures().join("main.json")).unwrap();
    project.set_main("main").unwrap();

    let report = project.run().unwrap();
    assert!(report.is_success(), "{report}");
    assert_eq!(report.translated, 3);
    assert!(report.unreachable.is_empty());

    for rel in [
        "gen/modules/main.c",
        "gen/modules/tree1.c",
        "gen/modules/tree1_util.c",
        "gen/modules.c",
        "gen/imports.dot",
        "CMakeLists.txt",
    ] {
        assert!(dir.path().join(rel).is_file(), "{rel} missing");
    }

    let cmake = read(dir.path(), "CMakeLists.txt");
    assert!(cmake.contains(
        "set(CAPSICUM_SOURCES\n    gen/modules.c\n    gen/modules/main.c\n    gen/modules/tree1.c\n    gen/modules/tree1_util.c\n)"
    ));

    let dot = read(dir.path(), "gen/imports.dot");
    assert!(dot.contains("\"main\" -> \"tree1.util\""));
    assert!(dot.contains("\"tree1.util\" -> \"zlib_external\""));

    let table = read(dir.path(), "gen/modules.c");
    assert!(row(&table, "tree1").contains("m->type = MODULE_PACKAGE;"));
    assert!(row(&table, "zlib_external").contains("m->type = MODULE_BUILTIN;"));
    assert!(project.graph().orphans().is_empty());
}

#[test]
fn command_line_drives_a_whole_build() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let fixtures = fixtures();
    let cli = Cli::try_parse_from([
        "capsicum",
        "demo",
        "-o",
        out.to_str().unwrap(),
        "-t",
        "3",
        "-d",
        fixtures.join("tree1").to_str().unwrap(),
        "-f",
        fixtures.join("main.json").to_str().unwrap(),
        "--main",
        "main",
    ])
    .unwrap();
    let config = BuildConfig::merge(&cli, ProjectFile::default()).unwrap();
    let report = Project::from_config(config).unwrap().run().unwrap();
    assert_eq!(report.translated, 3);
    assert!(out.join("gen/modules/tree1_util.c").is_file());
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn disabled_externals_fail_the_importing_module_only() {
    let dir = tempfile::tempdir().unwrap();
    let options = TranslateOptions::default().with_external(false);
    let project = Project::new(config(dir.path()).with_options(options));
    project
        .add_compiled("main", ModuleKind::Defined, importing("main", "nowhere", 0))
        .unwrap();
    project
        .add_compiled("other", ModuleKind::Defined, assignment("other"))
        .unwrap();
    project.set_main("main").unwrap();

    let report = project.run().unwrap();
    assert!(!report.is_success());
    assert_eq!(report.translated, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].module, "main");
    assert!(dir.path().join("gen/modules/other.c").is_file());
    assert!(!project.graph().contains("nowhere"));
}

#[test]
fn fail_fast_returns_the_error() {
    let dir = tempfile::tempdir().unwrap();
    let options = TranslateOptions::default().with_external(false);
    let project = Project::new(
        config(dir.path())
            .with_options(options)
            .with_fail_fast(true),
    );
    project
        .add_compiled("main", ModuleKind::Defined, importing("main", "nowhere", 0))
        .unwrap();
    project.set_main("main").unwrap();
    let err = project.run().unwrap_err();
    assert!(matches!(err, CapsicumError::Translation(_)));
}

#[test]
fn relative_import_beyond_the_top_level_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(config(dir.path()));
    project
        .add_compiled("pkg", ModuleKind::Package, assignment("pkg"))
        .unwrap();
    project
        .add_compiled("pkg.mod", ModuleKind::Defined, importing("pkg.mod", "x", 3))
        .unwrap();
    project.set_main("pkg.mod").unwrap();

    let report = project.run().unwrap();
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0].error {
        CapsicumError::Translation(e) => assert!(matches!(
            e.kind,
            TranslationErrorKind::Resolution(ResolutionError::BeyondTopLevel { .. })
        )),
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Graph properties
// =============================================================================

#[test]
fn stub_synthesis_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(config(dir.path()));
    let first = project.graph().resolve("far.away.module", true).unwrap();
    let second = project.graph().resolve("far.away.module", true).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(project.graph().contains("far.away"));
    assert!(project.graph().contains("far"));
    assert!(project.graph().orphans().is_empty());
}

#[test]
fn concurrent_stub_synthesis_yields_one_module() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(config(dir.path()));
    let graph = project.graph();
    let found: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| graph.resolve("shared.stub", true).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(found.iter().all(|m| Arc::ptr_eq(m, &found[0])));
    assert_eq!(graph.modules().iter().filter(|m| m.name() == "shared.stub").count(), 1);
}
