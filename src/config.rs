//! Build configuration.
//!
//! Settings come from two places: an optional `capsicum.toml` project file
//! and the command line. [`BuildConfig::resolve`] merges them, with command
//! line values winning, and validates the result.
//!
//! ```toml
//! name = "game"
//! output_dir = "build"
//! nthreads = 8
//! files = ["main.json"]
//! directories = ["lib"]
//! main = "main"
//! allow_external = true
//! extra_builtins = ["_engine"]
//! fail_fast = false
//! source_extension = "json"
//!
//! [chunking]
//! threshold = 4096
//! min_chunk = 64
//! ```

use std::path::{Path, PathBuf};

use capsicum_compiler::{DEFAULT_CHUNK_THRESHOLD, DEFAULT_MIN_CHUNK, TranslateOptions};
use capsicum_core::CapsicumError;
use clap::Parser;
use serde::Deserialize;

/// File name looked up in the project directory when `--config` is absent.
pub const PROJECT_FILE: &str = "capsicum.toml";

/// Extension of the compiled-unit dumps the default compiler reads.
pub const DEFAULT_SOURCE_EXTENSION: &str = "json";

const DEFAULT_OUTPUT_DIR: &str = "build";

// ============================================================================
// Command Line
// ============================================================================

/// Command line of the `capsicum` binary.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "capsicum")]
#[command(version, about = "Translate compiled Python 3.6 modules to C", long_about = None)]
pub struct Cli {
    /// Project name, used for the CMake target.
    pub project: String,

    /// Directory that receives the generated tree.
    #[arg(short = 'o', long = "outputdir")]
    pub output_dir: Option<PathBuf>,

    /// Number of translation workers.
    #[arg(short = 't', long)]
    pub nthreads: Option<usize>,

    /// Module files to translate.
    #[arg(short = 'f', long, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Directories translated as package trees.
    #[arg(short = 'd', long, num_args = 1..)]
    pub directories: Vec<PathBuf>,

    /// Dotted name of the entry-point module.
    #[arg(long)]
    pub main: Option<String>,

    /// Fail on imports that resolve to nothing instead of stubbing them.
    #[arg(long)]
    pub no_external: bool,

    /// Project file; defaults to `capsicum.toml` when it exists.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Instruction count past which routines are split.
    #[arg(long)]
    pub chunk_threshold: Option<usize>,

    /// Stop at the first module that fails to translate.
    #[arg(long)]
    pub fail_fast: bool,
}

// ============================================================================
// Project File
// ============================================================================

/// `[chunking]` table of the project file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkingSection {
    pub threshold: Option<usize>,
    pub min_chunk: Option<usize>,
}

/// Contents of `capsicum.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectFile {
    pub name: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub nthreads: Option<usize>,
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub main: Option<String>,
    pub allow_external: Option<bool>,
    pub extra_builtins: Vec<String>,
    pub fail_fast: Option<bool>,
    pub chunking: ChunkingSection,
    pub source_extension: Option<String>,
}

impl ProjectFile {
    pub fn parse(text: &str) -> Result<Self, CapsicumError> {
        toml::from_str(text).map_err(|e| CapsicumError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CapsicumError> {
        let text = std::fs::read_to_string(path).map_err(|e| CapsicumError::io(path, e))?;
        Self::parse(&text).map_err(|e| match e {
            CapsicumError::Config(msg) => CapsicumError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Paths in the file are relative to the directory holding it.
    fn rebase(mut self, base: &Path) -> Self {
        let join = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        self.output_dir = self.output_dir.map(join);
        self.files = self.files.into_iter().map(join).collect();
        self.directories = self.directories.into_iter().map(join).collect();
        self
    }
}

// ============================================================================
// Merged Configuration
// ============================================================================

/// Validated configuration handed to [`crate::Project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub name: String,
    pub output_dir: PathBuf,
    pub nthreads: usize,
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub main: Option<String>,
    pub extra_builtins: Vec<String>,
    pub fail_fast: bool,
    pub source_extension: String,
    pub options: TranslateOptions,
}

impl BuildConfig {
    /// Defaults for a project called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            nthreads: default_threads(),
            files: Vec::new(),
            directories: Vec::new(),
            main: None,
            extra_builtins: Vec::new(),
            fail_fast: false,
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            options: TranslateOptions::default(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_threads(mut self, nthreads: usize) -> Self {
        self.nthreads = nthreads;
        self
    }

    pub fn with_main(mut self, main: impl Into<String>) -> Self {
        self.main = Some(main.into());
        self
    }

    pub fn with_options(mut self, options: TranslateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Merge the project file (if any) with the command line.
    pub fn resolve(cli: &Cli) -> Result<Self, CapsicumError> {
        let file = match &cli.config {
            Some(path) => Some((ProjectFile::load(path)?, path.clone())),
            None => {
                let path = PathBuf::from(PROJECT_FILE);
                if path.is_file() {
                    Some((ProjectFile::load(&path)?, path))
                } else {
                    None
                }
            }
        };
        let file = file.map(|(file, path)| {
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            tracing::debug!(path = %path.display(), "project file loaded");
            file.rebase(&base)
        });
        Self::merge(cli, file.unwrap_or_default())
    }

    /// Command line values override file values; list values accumulate.
    pub fn merge(cli: &Cli, file: ProjectFile) -> Result<Self, CapsicumError> {
        let name = if cli.project.is_empty() {
            file.name.unwrap_or_default()
        } else {
            cli.project.clone()
        };
        let mut config = Self::new(name);

        if let Some(dir) = cli.output_dir.clone().or(file.output_dir) {
            config.output_dir = dir;
        }
        if let Some(n) = cli.nthreads.or(file.nthreads) {
            config.nthreads = n;
        }
        config.files = file.files;
        config.files.extend(cli.files.iter().cloned());
        config.directories = file.directories;
        config.directories.extend(cli.directories.iter().cloned());
        config.main = cli.main.clone().or(file.main);
        config.extra_builtins = file.extra_builtins;
        config.fail_fast = cli.fail_fast || file.fail_fast.unwrap_or(false);
        if let Some(ext) = file.source_extension {
            config.source_extension = ext.trim_start_matches('.').to_string();
        }

        let allow_external = !cli.no_external && file.allow_external.unwrap_or(true);
        config.options = TranslateOptions::default()
            .with_external(allow_external)
            .with_chunk_threshold(
                cli.chunk_threshold
                    .or(file.chunking.threshold)
                    .unwrap_or(DEFAULT_CHUNK_THRESHOLD),
            )
            .with_min_chunk(file.chunking.min_chunk.unwrap_or(DEFAULT_MIN_CHUNK));

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CapsicumError> {
        let fail = |msg: String| Err(CapsicumError::Config(msg));
        if self.name.is_empty() {
            return fail("project name is empty".into());
        }
        if self.nthreads == 0 {
            return fail("nthreads must be at least 1".into());
        }
        if self.options.chunk_threshold == 0 {
            return fail("chunk threshold must be at least 1".into());
        }
        if self.options.min_chunk == 0 || self.options.min_chunk > self.options.chunk_threshold {
            return fail(format!(
                "min_chunk must be between 1 and the chunk threshold ({})",
                self.options.chunk_threshold
            ));
        }
        if self.source_extension.is_empty() {
            return fail("source_extension is empty".into());
        }
        Ok(())
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("capsicum").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_line_overrides_file() {
        let file = ProjectFile::parse(
            r#"
            output_dir = "out"
            nthreads = 2
            files = ["a.json"]
            main = "a"

            [chunking]
            threshold = 500
            min_chunk = 10
            "#,
        )
        .unwrap();
        let config = BuildConfig::merge(
            &cli(&["game", "-t", "6", "-f", "b.json", "--main", "b"]),
            file,
        )
        .unwrap();
        assert_eq!(config.name, "game");
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.nthreads, 6);
        assert_eq!(
            config.files,
            vec![PathBuf::from("a.json"), PathBuf::from("b.json")]
        );
        assert_eq!(config.main.as_deref(), Some("b"));
        assert_eq!(config.options.chunk_threshold, 500);
        assert_eq!(config.options.min_chunk, 10);
        assert!(config.options.allow_external);
    }

    #[test]
    fn defaults_without_a_file() {
        let config = BuildConfig::merge(&cli(&["demo", "--no-external"]), ProjectFile::default())
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("build"));
        assert_eq!(config.source_extension, "json");
        assert_eq!(config.options.chunk_threshold, DEFAULT_CHUNK_THRESHOLD);
        assert!(!config.options.allow_external);
        assert!(!config.fail_fast);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ProjectFile::parse("threads = 3").unwrap_err();
        assert!(matches!(err, CapsicumError::Config(_)));
    }

    #[test]
    fn zero_threads_is_invalid() {
        let err = BuildConfig::merge(&cli(&["demo", "-t", "0"]), ProjectFile::default())
            .unwrap_err();
        assert!(err.to_string().contains("nthreads"));
    }

    #[test]
    fn min_chunk_cannot_exceed_threshold() {
        let file = ProjectFile::parse("[chunking]\nmin_chunk = 100").unwrap();
        let err = BuildConfig::merge(&cli(&["demo", "--chunk-threshold", "50"]), file)
            .unwrap_err();
        assert!(err.to_string().contains("min_chunk"));
    }

    #[test]
    fn file_paths_are_relative_to_the_file() {
        let file = ProjectFile::parse("files = [\"main.json\"]\noutput_dir = \"/abs\"")
            .unwrap()
            .rebase(Path::new("proj"));
        assert_eq!(file.files, vec![PathBuf::from("proj/main.json")]);
        assert_eq!(file.output_dir, Some(PathBuf::from("/abs")));
    }
}
