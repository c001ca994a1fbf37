//! Outcome of a project run.

use std::fmt;
use std::path::PathBuf;

use capsicum_core::CapsicumError;

/// A module that could not be translated.
#[derive(Debug)]
pub struct ModuleFailure {
    pub module: String,
    pub error: CapsicumError,
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Every file written, in write order.
    pub generated: Vec<PathBuf>,
    pub failures: Vec<ModuleFailure>,
    /// Modules translated successfully.
    pub translated: usize,
    pub routines: usize,
    /// C functions emitted, chunk functions included.
    pub functions: usize,
    /// Rows in the descriptor table.
    pub table_rows: usize,
    /// Modules no import chain from the entry point reaches.
    pub unreachable: Vec<String>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} module(s) translated ({} routine(s), {} C function(s)), {} table row(s), {} file(s) written",
            self.translated,
            self.routines,
            self.functions,
            self.table_rows,
            self.generated.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  failed: {}: {}", failure.module, failure.error)?;
        }
        Ok(())
    }
}
