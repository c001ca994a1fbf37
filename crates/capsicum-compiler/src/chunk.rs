//! Splitting oversized routines.
//!
//! C compilers degrade badly on multi-thousand-label functions, so a routine
//! with more instructions than the threshold is emitted as a sequence of
//! chunk functions called in order. A split point must be *clean*:
//!
//! - no jump or block setup crosses it,
//! - the point is reached by fall-through with a known stack height,
//! - no block or handler region is open there.
//!
//! The splitter scans backwards from `start + threshold` towards
//! `start + min_chunk` and takes the first clean point it finds.

use capsicum_bytecode::CodeUnit;
use capsicum_core::ChunkingError;
use rustc_hash::FxHashMap;

use crate::context::FlowProbe;
use crate::options::TranslateOptions;

/// A run of instructions translated into one C function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Index of the first instruction.
    pub start: usize,
    /// One past the last instruction.
    pub end: usize,
    /// Operand stack height on entry.
    pub entry_height: usize,
}

/// Chooses split points from the flow probes of a dry run.
pub struct ChunkSplitter<'a> {
    unit: &'a CodeUnit,
    probes: &'a [FlowProbe],
    threshold: usize,
    min_chunk: usize,
}

impl<'a> ChunkSplitter<'a> {
    /// `probes` must hold one entry per instruction, in order.
    pub fn new(unit: &'a CodeUnit, probes: &'a [FlowProbe], options: &TranslateOptions) -> Self {
        Self {
            unit,
            probes,
            threshold: options.chunk_threshold.max(1),
            min_chunk: options.min_chunk.clamp(1, options.chunk_threshold.max(1)),
        }
    }

    /// Whether the routine must be split at all.
    pub fn needs_split(&self) -> bool {
        !self.unit.is_generator() && self.unit.instructions().len() > self.threshold
    }

    /// Number of jumps crossing the boundary before each instruction index.
    fn crossings(&self) -> Vec<i32> {
        let instrs = self.unit.instructions();
        let n = instrs.len();
        let index_of: FxHashMap<usize, usize> = instrs
            .iter()
            .enumerate()
            .map(|(i, instr)| (instr.offset, i))
            .collect();

        let mut diff = vec![0i32; n + 2];
        for (i, instr) in instrs.iter().enumerate() {
            let Some(target) = instr.jump_target() else {
                continue;
            };
            let j = index_of.get(&target).copied().unwrap_or(n);
            // boundary p lies between p-1 and p; the jump crosses it when
            // exactly one of i, j is below p
            let (lo, hi) = if i < j { (i, j) } else { (j, i) };
            if lo != hi {
                diff[lo + 1] += 1;
                diff[hi + 1] -= 1;
            }
        }

        let mut running = 0;
        diff.iter()
            .take(n + 1)
            .map(|d| {
                running += d;
                running
            })
            .collect()
    }

    fn is_clean(&self, crossings: &[i32], p: usize) -> bool {
        crossings[p] == 0
            && self
                .probes
                .get(p)
                .is_some_and(|probe| probe.clean && probe.height.is_some())
    }

    /// Split the routine into chunks. A routine at or below the threshold
    /// (or any generator) is a single chunk.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn split(&self) -> Result<Vec<Chunk>, ChunkingError> {
        let n = self.unit.instructions().len();
        if !self.needs_split() {
            return Ok(vec![Chunk {
                start: 0,
                end: n,
                entry_height: 0,
            }]);
        }

        let crossings = self.crossings();
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut entry_height = 0;

        while n - start > self.threshold {
            let low = start + self.min_chunk;
            let high = start + self.threshold;
            let Some(p) = (low..=high).rev().find(|&p| self.is_clean(&crossings, p)) else {
                return Err(ChunkingError {
                    routine: self.unit.name().to_string(),
                    instructions: n,
                    threshold: self.threshold,
                    min_chunk: self.min_chunk,
                    offset: self.unit.instructions()[start].offset,
                });
            };
            chunks.push(Chunk {
                start,
                end: p,
                entry_height,
            });
            entry_height = self.probes[p].height.unwrap_or_default();
            start = p;
        }
        chunks.push(Chunk {
            start,
            end: n,
            entry_height,
        });

        tracing::debug!(
            routine = self.unit.name(),
            instructions = n,
            chunks = chunks.len(),
            "routine split"
        );
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsicum_bytecode::{CodeBuilder, Constant, OpCode};
    use pretty_assertions::assert_eq;

    fn straight_line(statements: usize) -> CodeUnit {
        let mut b = CodeBuilder::module("m");
        for i in 0..statements {
            b.load_const(Constant::Int(i as i64));
            b.store_name("x");
        }
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        b.finish()
    }

    /// Probes of a straight-line module; `clean` decides which points qualify.
    fn probes(unit: &CodeUnit, clean: impl Fn(usize) -> bool) -> Vec<FlowProbe> {
        let mut height = 0usize;
        unit.instructions()
            .iter()
            .map(|instr| {
                let probe = FlowProbe {
                    offset: instr.offset,
                    height: Some(height),
                    clean: clean(height),
                };
                match instr.op {
                    OpCode::LOAD_CONST => height += 1,
                    OpCode::STORE_NAME | OpCode::RETURN_VALUE => height -= 1,
                    _ => {}
                }
                probe
            })
            .collect()
    }

    fn options(threshold: usize, min_chunk: usize) -> TranslateOptions {
        TranslateOptions::default()
            .with_chunk_threshold(threshold)
            .with_min_chunk(min_chunk)
    }

    #[test]
    fn small_routine_is_one_chunk() {
        let unit = straight_line(3);
        let probes = probes(&unit, |_| true);
        let chunks = ChunkSplitter::new(&unit, &probes, &options(100, 4))
            .split()
            .unwrap();
        assert_eq!(
            chunks,
            vec![Chunk {
                start: 0,
                end: 8,
                entry_height: 0
            }]
        );
    }

    #[test]
    fn takes_the_latest_clean_point() {
        let unit = straight_line(10);
        let probes = probes(&unit, |_| true);
        let chunks = ChunkSplitter::new(&unit, &probes, &options(5, 2))
            .split()
            .unwrap();
        let ends: Vec<usize> = chunks.iter().map(|c| c.end).collect();
        let heights: Vec<usize> = chunks.iter().map(|c| c.entry_height).collect();
        assert_eq!(ends, vec![5, 10, 15, 20, 22]);
        // a chunk may start with values on the stack
        assert_eq!(heights, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn unclean_points_are_skipped() {
        let unit = straight_line(10);
        let probes = probes(&unit, |height| height == 0);
        let chunks = ChunkSplitter::new(&unit, &probes, &options(5, 2))
            .split()
            .unwrap();
        let ends: Vec<usize> = chunks.iter().map(|c| c.end).collect();
        assert_eq!(ends, vec![4, 8, 12, 16, 20, 22]);
        assert!(chunks.iter().all(|c| c.entry_height == 0));
    }

    #[test]
    fn jumps_block_split_points() {
        let mut b = CodeBuilder::module("m");
        let end = b.new_label();
        b.load_name("c");
        b.jump(OpCode::POP_JUMP_IF_FALSE, end);
        for _ in 0..4 {
            b.load_const(Constant::Int(1));
            b.store_name("x");
        }
        b.bind(end);
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let unit = b.finish();
        let probes: Vec<FlowProbe> = unit
            .instructions()
            .iter()
            .map(|i| FlowProbe {
                offset: i.offset,
                height: Some(0),
                clean: true,
            })
            .collect();
        let err = ChunkSplitter::new(&unit, &probes, &options(4, 2))
            .split()
            .unwrap_err();
        assert_eq!(err.routine, "<module>");
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn generators_are_never_split() {
        let mut b = CodeBuilder::generator("g", "m");
        for _ in 0..10 {
            b.load_const(Constant::None);
            b.emit(OpCode::YIELD_VALUE);
            b.emit(OpCode::POP_TOP);
        }
        b.load_const(Constant::None);
        b.emit(OpCode::RETURN_VALUE);
        let unit = b.finish();
        let splitter = ChunkSplitter::new(&unit, &[], &options(4, 2));
        assert!(!splitter.needs_split());
        assert_eq!(splitter.split().unwrap().len(), 1);
    }
}
