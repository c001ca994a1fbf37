//! Code unit flag bits.

use bitflags::bitflags;

bitflags! {
    /// `co_flags` of a compiled routine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CodeFlags: u32 {
        const OPTIMIZED = 0x0001;
        const NEWLOCALS = 0x0002;
        const VARARGS = 0x0004;
        const VARKEYWORDS = 0x0008;
        const NESTED = 0x0010;
        const GENERATOR = 0x0020;
        const NOFREE = 0x0040;
        const COROUTINE = 0x0080;
        const ITERABLE_COROUTINE = 0x0100;
        const ASYNC_GENERATOR = 0x0200;
    }
}

impl CodeFlags {
    /// Whether the routine suspends and resumes (plain generators only).
    pub fn is_generator(self) -> bool {
        self.contains(CodeFlags::GENERATOR)
    }

    /// Whether the routine is a coroutine of any flavor.
    pub fn is_async(self) -> bool {
        self.intersects(
            CodeFlags::COROUTINE | CodeFlags::ITERABLE_COROUTINE | CodeFlags::ASYNC_GENERATOR,
        )
    }

    /// Module and class bodies look names up in a namespace dict instead of
    /// fast local slots.
    pub fn uses_namespace(self) -> bool {
        !self.contains(CodeFlags::OPTIMIZED)
    }
}
