//! The compiler seam.
//!
//! Producing bytecode from source is the host interpreter's job. The
//! translator only needs "give me the compiled unit for this module", which
//! is what [`CodeCompiler`] expresses. [`DumpCompiler`] implements it over
//! JSON dumps (see [`crate::dump`]).

use capsicum_core::CompileError;

use crate::code_unit::CodeUnit;
use crate::dump::CodeDump;

/// Produces the top-level code unit of a module from its source text.
///
/// Implementations must be shareable across translation workers.
pub trait CodeCompiler: Send + Sync {
    /// Compile `source` (read from `origin`) as the body of module `module`.
    fn compile(&self, module: &str, source: &str, origin: &str) -> Result<CodeUnit, CompileError>;
}

/// Compiler over JSON code-object dumps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpCompiler;

impl DumpCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl CodeCompiler for DumpCompiler {
    #[cfg_attr(feature = "profiling", profiling::function)]
    fn compile(&self, module: &str, source: &str, origin: &str) -> Result<CodeUnit, CompileError> {
        let dump = CodeDump::from_json(source).map_err(|e| CompileError::Parse {
            module: module.into(),
            detail: format!("{origin}: {e}"),
        })?;
        let code = dump
            .into_code_unit(module)
            .map_err(|source| CompileError::Decode {
                module: module.into(),
                source,
            })?;
        tracing::trace!(
            module,
            origin,
            instructions = code.instructions().len(),
            "compiled unit loaded"
        );
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsicum_core::DecodeError;

    #[test]
    fn compiles_dump() {
        let src = r#"{"name": "<module>", "stacksize": 1, "code": [100, 0, 83, 0], "consts": ["none"]}"#;
        let code = DumpCompiler.compile("main", src, "main.json").unwrap();
        assert_eq!(code.module(), "main");
        assert_eq!(code.instructions().len(), 2);
    }

    #[test]
    fn parse_error_names_module_and_origin() {
        let err = DumpCompiler.compile("main", "not json", "main.json").unwrap_err();
        match err {
            CompileError::Parse { module, detail } => {
                assert_eq!(module, "main");
                assert!(detail.starts_with("main.json:"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn decode_error_is_wrapped() {
        let src = r#"{"name": "<module>", "stacksize": 1, "code": [253, 0]}"#;
        let err = DumpCompiler.compile("main", src, "main.json").unwrap_err();
        assert_eq!(
            err,
            CompileError::Decode {
                module: "main".into(),
                source: DecodeError::UnknownOpcode {
                    offset: 0,
                    byte: 253
                }
            }
        );
    }
}
