//! Translator options.

/// Default instruction count past which a routine is split.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 4096;

/// Default smallest chunk the splitter backs off to.
pub const DEFAULT_MIN_CHUNK: usize = 64;

/// The part of the build configuration the translator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateOptions {
    /// Routines with more instructions than this are split into chunks.
    pub chunk_threshold: usize,
    /// No chunk is made shorter than this, except the last.
    pub min_chunk: usize,
    /// Whether unknown imports become External modules.
    pub allow_external: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            min_chunk: DEFAULT_MIN_CHUNK,
            allow_external: true,
        }
    }
}

impl TranslateOptions {
    pub fn with_chunk_threshold(mut self, threshold: usize) -> Self {
        self.chunk_threshold = threshold;
        self
    }

    pub fn with_min_chunk(mut self, min_chunk: usize) -> Self {
        self.min_chunk = min_chunk;
        self
    }

    pub fn with_external(mut self, allow: bool) -> Self {
        self.allow_external = allow;
        self
    }
}
