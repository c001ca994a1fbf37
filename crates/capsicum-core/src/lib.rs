//! Core types shared by every capsicum crate.
//!
//! This crate holds the pieces that all translation phases agree on:
//!
//! - [`ModuleId`] - deterministic, name-derived module identity
//! - The error hierarchy ([`CapsicumError`] and the per-phase errors)

pub mod error;
pub mod module_id;

pub use error::{
    CapsicumError, ChunkingError, CompileError, DecodeError, ResolutionError, TranslationError,
    TranslationErrorKind,
};
pub use module_id::ModuleId;
