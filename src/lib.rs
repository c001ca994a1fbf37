//! capsicum: ahead-of-time translation of compiled Python 3.6 programs to C.
//!
//! The workspace crates do the translation; this crate drives it for a
//! whole program:
//!
//! - [`BuildConfig`] - merged command line and `capsicum.toml` settings
//! - [`Project`] - seeds the module graph from files and trees, then runs
//! - [`WorkerPool`] - translates independent modules in parallel
//! - [`OutputTree`] / [`CMakeFile`] - the generated tree and its build file
//! - [`BuildReport`] - what a run produced and which modules failed
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use capsicum::{BuildConfig, Project};
//!
//! let config = BuildConfig::new("game").with_output_dir("build").with_main("main");
//! let project = Project::new(config);
//! project.add_tree(Path::new("tree1"))?;
//! project.add_file(Path::new("main.json"))?;
//! project.set_main("main")?;
//! let report = project.run()?;
//! println!("{report}");
//! # Ok::<(), capsicum::CapsicumError>(())
//! ```

pub mod config;
pub mod output;
pub mod pool;
pub mod project;
pub mod report;

pub use capsicum_core::CapsicumError;
pub use config::{BuildConfig, ChunkingSection, Cli, PROJECT_FILE, ProjectFile};
pub use output::{CMakeFile, OutputTree};
pub use pool::WorkerPool;
pub use project::Project;
pub use report::{BuildReport, ModuleFailure};
