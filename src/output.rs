//! Generated tree layout and the CMake build file.
//!
//! ```text
//! <out>/CMakeLists.txt
//! <out>/gen/modules.c          module descriptor table
//! <out>/gen/modules/<m>.c      one file per translated module
//! <out>/gen/imports.dot        import graph
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use capsicum_core::CapsicumError;

type Result<T> = std::result::Result<T, CapsicumError>;

/// Writes artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct OutputTree {
    root: PathBuf,
}

impl OutputTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn gen_dir(&self) -> PathBuf {
        self.root.join("gen")
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.gen_dir().join("modules")
    }

    /// Create the directory skeleton.
    pub fn prepare(&self) -> Result<()> {
        let dir = self.modules_dir();
        fs::create_dir_all(&dir).map_err(|e| CapsicumError::io(&dir, e))
    }

    fn write(&self, path: PathBuf, contents: &str) -> Result<PathBuf> {
        fs::write(&path, contents).map_err(|e| CapsicumError::io(&path, e))?;
        tracing::trace!(path = %path.display(), bytes = contents.len(), "artifact written");
        Ok(path)
    }

    pub fn write_module(&self, file_name: &str, source: &str) -> Result<PathBuf> {
        self.write(self.modules_dir().join(file_name), source)
    }

    pub fn write_table(&self, table: &str) -> Result<PathBuf> {
        self.write(self.gen_dir().join("modules.c"), table)
    }

    pub fn write_import_graph(&self, dot: &str) -> Result<PathBuf> {
        self.write(self.gen_dir().join("imports.dot"), dot)
    }

    pub fn write_cmake(&self, cmake: &CMakeFile) -> Result<PathBuf> {
        self.write(self.root.join("CMakeLists.txt"), &cmake.to_string())
    }

    /// `path` relative to the output root, with forward slashes for CMake.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// `CMakeLists.txt` for the generated program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMakeFile {
    pub project: String,
    /// Source paths relative to the output root.
    pub sources: Vec<String>,
}

impl CMakeFile {
    pub fn new(project: impl Into<String>, mut sources: Vec<String>) -> Self {
        sources.sort();
        sources.dedup();
        Self {
            project: project.into(),
            sources,
        }
    }
}

impl fmt::Display for CMakeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = capsicum_registry::mangle(&self.project);
        writeln!(f, "# Generated by capsicum; do not edit.")?;
        writeln!(f, "cmake_minimum_required(VERSION 3.12)")?;
        writeln!(f, "project({target} C)")?;
        writeln!(f)?;
        writeln!(f, "find_package(Python3 3.6 EXACT REQUIRED COMPONENTS Development)")?;
        writeln!(
            f,
            "set(CAPSICUM_RUNTIME \"${{CMAKE_CURRENT_LIST_DIR}}/runtime\" CACHE PATH \"capsicum runtime directory\")"
        )?;
        writeln!(
            f,
            "find_library(CAPSICUM_RUNTIME_LIB capsicum_runtime HINTS \"${{CAPSICUM_RUNTIME}}/lib\" REQUIRED)"
        )?;
        writeln!(f)?;
        writeln!(f, "set(CAPSICUM_SOURCES")?;
        for source in &self.sources {
            writeln!(f, "    {source}")?;
        }
        writeln!(f, ")")?;
        writeln!(f)?;
        writeln!(f, "add_executable({target} ${{CAPSICUM_SOURCES}})")?;
        writeln!(
            f,
            "target_include_directories({target} PRIVATE \"${{CAPSICUM_RUNTIME}}/include\")"
        )?;
        writeln!(
            f,
            "target_link_libraries({target} PRIVATE ${{CAPSICUM_RUNTIME_LIB}} Python3::Python)"
        )
    }
}
