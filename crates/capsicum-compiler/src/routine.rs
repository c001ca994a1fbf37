//! One code unit to C.
//!
//! A routine is translated once in full. When it exceeds the chunk
//! threshold, the flow probes of that pass choose split points and the
//! routine is translated again, one chunk per C function, behind an entry
//! wrapper that calls the chunks in order.

use std::fmt::Write;
use std::sync::Arc;

use capsicum_bytecode::CodeUnit;
use capsicum_core::{CapsicumError, TranslationError, TranslationErrorKind};
use capsicum_registry::mangle;

use crate::chunk::{Chunk, ChunkSplitter};
use crate::context::{FlushedRoutine, ImportSite, RoutineEnd, TranslationContext};
use crate::emit::ConstantTable;
use crate::options::TranslateOptions;
use crate::translate::{Resolver, translate_range};

/// C symbol of the routine bound to constant `index` of `parent`.
pub fn nested_symbol(parent: &str, index: u32, name: &str) -> String {
    format!("{parent}_{index}_{}", mangle(name))
}

/// One translated routine.
#[derive(Debug, Clone)]
pub struct RoutineOutput {
    pub symbol: String,
    /// Constant table, chunk functions and entry function.
    pub text: String,
    /// Number of C functions the body was split into.
    pub chunks: usize,
    pub max_height: usize,
    pub imports: Vec<ImportSite>,
}

/// Translates single code units.
pub struct RoutineCompiler<'a> {
    resolver: Resolver<'a>,
    options: &'a TranslateOptions,
}

impl<'a> RoutineCompiler<'a> {
    pub fn new(resolver: Resolver<'a>, options: &'a TranslateOptions) -> Self {
        Self { resolver, options }
    }

    fn entry_signature(symbol: &str) -> String {
        format!("PyObject* {symbol}(PyFrameObject* f)")
    }

    fn chunk_name(symbol: &str, index: usize) -> String {
        format!("{symbol}_chunk{index}")
    }

    /// Translate `unit` as the C function `symbol`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile(
        &self,
        unit: &CodeUnit,
        symbol: &str,
    ) -> Result<RoutineOutput, CapsicumError> {
        let mut consts = ConstantTable::new(symbol);
        for (index, nested) in unit.nested() {
            consts.bind_code(nested, nested_symbol(symbol, index, nested.name()));
        }
        let whole = self.translate(
            unit,
            &mut consts,
            0..unit.instructions().len(),
            0,
            RoutineEnd::Final,
            &Self::entry_signature(symbol),
            true,
        )?;

        let splitter = ChunkSplitter::new(unit, &whole.probes, self.options);
        if !splitter.needs_split() {
            let mut text = consts.render();
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&whole.text);
            tracing::debug!(
                routine = symbol,
                max_height = whole.max_height,
                "routine translated"
            );
            return Ok(RoutineOutput {
                symbol: symbol.to_string(),
                text,
                chunks: 1,
                max_height: whole.max_height,
                imports: whole.imports,
            });
        }

        let chunks = splitter.split()?;
        let mut bodies = Vec::with_capacity(chunks.len());
        let mut max_height = 0;
        for (k, chunk) in chunks.iter().enumerate() {
            let next = chunks.get(k + 1);
            let end = if next.is_some() {
                RoutineEnd::NextChunk
            } else {
                RoutineEnd::Final
            };
            let signature = format!(
                "static PyObject* {}(PyFrameObject* f)",
                Self::chunk_name(symbol, k)
            );
            let flushed = self.translate(
                unit,
                &mut consts,
                chunk.start..chunk.end,
                chunk.entry_height,
                end,
                &signature,
                false,
            )?;
            if let Some(next) = next {
                check_boundary(unit, &flushed, next)?;
            }
            max_height = max_height.max(flushed.max_height);
            bodies.push(flushed.text);
        }

        let mut text = consts.render();
        if !text.is_empty() {
            text.push('\n');
        }
        for body in &bodies {
            text.push_str(body);
            text.push('\n');
        }
        text.push_str(&self.entry_wrapper(symbol, &consts, chunks.len()));

        tracing::debug!(
            routine = symbol,
            chunks = chunks.len(),
            max_height,
            "routine translated in chunks"
        );
        Ok(RoutineOutput {
            symbol: symbol.to_string(),
            text,
            chunks: chunks.len(),
            max_height,
            // every import was seen by the whole-routine pass
            imports: whole.imports,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn translate(
        &self,
        unit: &CodeUnit,
        consts: &mut ConstantTable,
        range: std::ops::Range<usize>,
        entry_height: usize,
        end: RoutineEnd,
        signature: &str,
        init_consts: bool,
    ) -> Result<FlushedRoutine, TranslationError> {
        let mut ctx = TranslationContext::new(unit, consts, entry_height);
        translate_range(&mut ctx, unit, self.resolver, range)?;
        let mut preamble = Vec::new();
        if init_consts && !ctx.consts().is_empty() {
            preamble.push(format!("{}();", ctx.consts().init_function()));
        }
        ctx.finish(signature, &preamble, end)
    }

    fn entry_wrapper(&self, symbol: &str, consts: &ConstantTable, chunks: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", Self::entry_signature(symbol));
        out.push_str("{\n    PyObject* retval;\n\n");
        if !consts.is_empty() {
            let _ = writeln!(out, "    {}();", consts.init_function());
        }
        for k in 0..chunks - 1 {
            let _ = writeln!(out, "    retval = {}(f);", Self::chunk_name(symbol, k));
            out.push_str("    if (retval != CAPSICUM_NEXT_CHUNK)\n        return retval;\n");
        }
        let _ = writeln!(out, "    return {}(f);", Self::chunk_name(symbol, chunks - 1));
        out.push_str("}\n");
        out
    }
}

/// The height a chunk ends with must be the next chunk's entry height.
fn check_boundary(
    unit: &CodeUnit,
    flushed: &FlushedRoutine,
    next: &Chunk,
) -> Result<(), TranslationError> {
    if flushed.height == next.entry_height {
        return Ok(());
    }
    let offset = unit
        .instructions()
        .get(next.start)
        .map(|i| i.offset)
        .unwrap_or_default();
    Err(TranslationError::new(
        unit.module(),
        unit.name(),
        offset,
        TranslationErrorKind::ChunkBoundary {
            expected: next.entry_height,
            found: flushed.height,
        },
    ))
}

/// Every routine reachable through nested code constants, parents first,
/// paired with its C symbol.
pub fn routine_tree(root: &Arc<CodeUnit>, symbol: &str) -> Vec<(Arc<CodeUnit>, String)> {
    let mut out = vec![(Arc::clone(root), symbol.to_string())];
    let mut i = 0;
    while i < out.len() {
        let (unit, parent) = out[i].clone();
        for (index, nested) in unit.nested() {
            out.push((Arc::clone(nested), nested_symbol(&parent, index, nested.name())));
        }
        i += 1;
    }
    out
}
