//! Deterministic, name-derived module identity.
//!
//! Every module in a program gets a [`ModuleId`], a 64-bit hash of its dotted
//! name. Ids are computed rather than allocated, so:
//!
//! - The same module keeps the same id across builds and worker threads
//! - Translated code can embed the id of an import target before the
//!   descriptor table is written
//! - No registration-order dependency between parallel translation jobs
//!
//! # Examples
//!
//! ```
//! use capsicum_core::ModuleId;
//!
//! let a = ModuleId::from_name("pkg.mod");
//! assert_eq!(a, ModuleId::from_name("pkg.mod"));
//! assert_ne!(a, ModuleId::from_name("pkg"));
//! assert!(!a.is_none());
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain marker mixed into every module hash.
const MODULE_DOMAIN: u64 = 0x6d1f0c3a9e57b24d;

/// Replacement value for the (astronomically unlikely) hash that lands on zero.
const ZERO_REMAP: u64 = 0x9e3779b97f4a7c15;

/// A stable 64-bit identifier for one module.
///
/// Zero is reserved as "no module" and is never produced by [`ModuleId::from_name`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct ModuleId(pub u64);

impl ModuleId {
    /// The "no module" id, used for absent parents.
    pub const NONE: ModuleId = ModuleId(0);

    /// Derive the id of the module with the given dotted name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        match MODULE_DOMAIN ^ xxh64(name.as_bytes(), 0) {
            0 => ModuleId(ZERO_REMAP),
            hash => ModuleId(hash),
        }
    }

    /// Check whether this is the reserved "no module" id.
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Render the id as a C 64-bit unsigned literal.
    pub fn to_c_literal(self) -> String {
        format!("UINT64_C(0x{:016x})", self.0)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId(0x{:016x})", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_id() {
        assert_eq!(ModuleId::from_name("os.path"), ModuleId::from_name("os.path"));
    }

    #[test]
    fn different_names_differ() {
        let names = ["main", "os", "os.path", "pkg", "pkg.sub", "pkg.sub.leaf"];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(ModuleId::from_name(a), ModuleId::from_name(b), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn never_none() {
        assert!(!ModuleId::from_name("").is_none());
        assert!(ModuleId::NONE.is_none());
    }

    #[test]
    fn c_literal_is_zero_padded() {
        assert_eq!(ModuleId(0x2a).to_c_literal(), "UINT64_C(0x000000000000002a)");
        assert_eq!(ModuleId::NONE.to_c_literal(), "UINT64_C(0x0000000000000000)");
    }
}
