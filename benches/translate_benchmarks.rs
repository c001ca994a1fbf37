//! Translation throughput benchmarks.
//!
//! Synthetic code units of increasing size go through the module compiler,
//! with and without routine chunking, plus a module holding many nested
//! functions.
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use std::hint::black_box;
use std::sync::Arc;

use capsicum_bytecode::{CodeBuilder, CodeUnit, Constant, DumpCompiler, OpCode};
use capsicum_compiler::{ModuleCompiler, TranslateOptions};
use capsicum_registry::{ModuleGraph, ModuleKind};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

/// Print the top-level scope timings averaged over the recorded frames.
#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    use puffin::Reader;
    use std::collections::HashMap;

    let Some(frame_view) = FRAME_VIEW.get() else {
        return;
    };
    let view = frame_view.lock();
    let scopes = view.scope_collection();

    let mut timings: HashMap<String, i64> = HashMap::new();
    let mut frames = 0i64;
    for frame in view.recent_frames() {
        frames += 1;
        let Ok(unpacked) = frame.unpacked() else {
            continue;
        };
        for (_, stream_info) in unpacked.thread_streams.iter() {
            if let Ok(top) = Reader::from_start(&stream_info.stream).read_top_scopes() {
                for scope in top {
                    if let Some(details) = scopes.fetch_by_id(&scope.id) {
                        *timings.entry(details.name().to_string()).or_insert(0) +=
                            scope.record.duration_ns;
                    }
                }
            }
        }
    }

    println!("\n=== Profiling Summary ({frames} frames) ===");
    let mut entries: Vec<_> = timings.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, ns) in entries {
        let avg = if frames > 0 { ns / frames } else { ns };
        println!(
            "  {:30} {:>10.2?} avg",
            name,
            std::time::Duration::from_nanos(avg as u64)
        );
    }
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

// =============================================================================
// Inputs
// =============================================================================

/// `x = i; if x: y = x` repeated `statements` times.
fn straight_line(module: &str, statements: i64) -> CodeUnit {
    let mut b = CodeBuilder::module(module);
    for i in 0..statements {
        let skip = b.new_label();
        b.line(i as u32 + 1);
        b.load_const(Constant::Int(i));
        b.store_name("x");
        b.load_name("x");
        b.jump(OpCode::POP_JUMP_IF_FALSE, skip);
        b.load_name("x");
        b.store_name("y");
        b.bind(skip);
    }
    b.load_const(Constant::None);
    b.emit(OpCode::RETURN_VALUE);
    b.finish()
}

/// A module defining `count` small functions.
fn many_functions(module: &str, count: usize) -> CodeUnit {
    let mut b = CodeBuilder::module(module);
    for i in 0..count {
        let name = format!("f{i}");
        let mut f = CodeBuilder::function(&name, module);
        f.set_argcount(1);
        f.load_fast("a");
        f.load_const(Constant::Int(i as i64));
        f.emit(OpCode::BINARY_ADD);
        f.emit(OpCode::RETURN_VALUE);
        let code = b.add_shared_const(Arc::new(Constant::Code(Arc::new(f.finish()))));
        b.emit_arg(OpCode::LOAD_CONST, code);
        b.load_const(Constant::Str(name.clone()));
        b.emit_arg(OpCode::MAKE_FUNCTION, 0);
        b.store_name(&name);
    }
    b.load_const(Constant::None);
    b.emit(OpCode::RETURN_VALUE);
    b.finish()
}

fn translate(graph: &ModuleGraph, name: &str, options: &TranslateOptions) -> usize {
    let module = graph.get(name).unwrap();
    let out = ModuleCompiler::new(graph, &DumpCompiler, options)
        .compile_module(&module)
        .unwrap();
    out.source.len()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn size_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("translate/statements");

    for statements in [10, 100, 1000, 5000] {
        let graph = ModuleGraph::new();
        let unit = straight_line("bench", statements);
        group.throughput(Throughput::Elements(unit.instructions().len() as u64));
        graph.add_compiled("bench", ModuleKind::Defined, unit).unwrap();

        let whole = TranslateOptions::default().with_chunk_threshold(usize::MAX);
        group.bench_function(format!("whole_{statements}"), |b| {
            b.iter(|| {
                black_box(translate(&graph, "bench", &whole));
                end_profiling_frame();
            });
        });

        let chunked = TranslateOptions::default()
            .with_chunk_threshold(200)
            .with_min_chunk(20);
        group.bench_function(format!("chunked_{statements}"), |b| {
            b.iter(|| {
                black_box(translate(&graph, "bench", &chunked));
                end_profiling_frame();
            });
        });
    }

    group.finish();
    print_profiling_stats();
}

fn nested_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate/nested");
    let options = TranslateOptions::default();

    for count in [10, 200] {
        let graph = ModuleGraph::new();
        graph
            .add_compiled("funcs", ModuleKind::Defined, many_functions("funcs", count))
            .unwrap();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("functions_{count}"), |b| {
            b.iter(|| {
                black_box(translate(&graph, "funcs", &options));
                end_profiling_frame();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, size_benchmarks, nested_benchmarks);
criterion_main!(benches);
