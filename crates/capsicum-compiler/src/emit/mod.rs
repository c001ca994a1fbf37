//! C statement emission.
//!
//! [`CEmitter`] collects the statements of one C function. Output is split
//! into sections: section 0 is the routine body, every later section is a
//! landing pad or exit continuation placed after the body. A section is
//! opened by name and written to until the previous one is restored, so pad
//! code can be produced in the middle of body translation.
//!
//! Labels are recorded as placeholders and only rendered when some `goto`
//! references them. Declarations are declare-once: the first request for a
//! name wins and later requests are ignored.

mod constants;

pub use constants::{ConstantTable, singleton_expr};

use rustc_hash::FxHashSet;

/// One line of emitted C.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// A statement, possibly spanning several lines.
    Stmt(String),
    /// `/* ... */`
    Comment(String),
    /// A label placeholder.
    Label(String),
}

#[derive(Debug, Clone)]
struct Section {
    /// Label opening the section; `None` for the body.
    label: Option<String>,
    lines: Vec<Line>,
}

/// Statement buffer for one C function.
#[derive(Debug, Clone)]
pub struct CEmitter {
    sections: Vec<Section>,
    current: usize,
    referenced: FxHashSet<String>,
    decls: Vec<String>,
    declared: FxHashSet<String>,
}

impl Default for CEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`CEmitter::open_section`], used to switch back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHandle(usize);

impl CEmitter {
    pub fn new() -> Self {
        Self {
            sections: vec![Section {
                label: None,
                lines: Vec::new(),
            }],
            current: 0,
            referenced: FxHashSet::default(),
            decls: Vec::new(),
            declared: FxHashSet::default(),
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Append a statement to the current section.
    pub fn stmt(&mut self, text: impl Into<String>) {
        self.sections[self.current].lines.push(Line::Stmt(text.into()));
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        // a stray terminator would close the comment early
        let text = text.as_ref().replace("*/", "* /");
        self.sections[self.current].lines.push(Line::Comment(text));
    }

    /// Place a label. It is rendered only if referenced.
    pub fn label(&mut self, name: impl Into<String>) {
        self.sections[self.current].lines.push(Line::Label(name.into()));
    }

    /// Mark `label` as the target of some transfer.
    pub fn reference(&mut self, label: &str) {
        if !self.referenced.contains(label) {
            self.referenced.insert(label.to_string());
        }
    }

    /// `goto label;`
    pub fn goto(&mut self, label: &str) {
        self.reference(label);
        self.stmt(format!("goto {label};"));
    }

    /// Declare a C local once. Returns `false` if it already was.
    pub fn declare(&mut self, name: &str, decl: impl FnOnce() -> String) -> bool {
        if self.declared.contains(name) {
            return false;
        }
        self.declared.insert(name.to_string());
        self.decls.push(decl());
        true
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    pub fn is_referenced(&self, label: &str) -> bool {
        self.referenced.contains(label)
    }

    // =========================================================================
    // Sections
    // =========================================================================

    /// Start a new trailing section headed by `label` and make it current.
    pub fn open_section(&mut self, label: impl Into<String>) -> SectionHandle {
        let previous = SectionHandle(self.current);
        self.sections.push(Section {
            label: Some(label.into()),
            lines: Vec::new(),
        });
        self.current = self.sections.len() - 1;
        previous
    }

    /// Resume writing to the section that was current before `open_section`.
    pub fn restore(&mut self, handle: SectionHandle) {
        self.current = handle.0;
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Declarations in first-use order, one per line.
    pub fn declarations(&self) -> &[String] {
        &self.decls
    }

    /// Number of statements written so far, across all sections.
    pub fn statement_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| &s.lines)
            .filter(|l| matches!(l, Line::Stmt(_)))
            .count()
    }

    /// Render the body followed by every referenced trailing section.
    pub fn render(&self, out: &mut String) {
        for (i, section) in self.sections.iter().enumerate() {
            if let Some(label) = &section.label {
                if !self.referenced.contains(label) {
                    continue;
                }
                render_label(out, label);
            } else if i != 0 {
                continue;
            }
            for line in &section.lines {
                match line {
                    Line::Stmt(text) => {
                        for part in text.lines() {
                            out.push_str("    ");
                            out.push_str(part);
                            out.push('\n');
                        }
                    }
                    Line::Comment(text) => {
                        out.push_str("    /* ");
                        out.push_str(text);
                        out.push_str(" */\n");
                    }
                    Line::Label(name) => {
                        if self.referenced.contains(name) {
                            render_label(out, name);
                        }
                    }
                }
            }
        }
    }
}

fn render_label(out: &mut String, name: &str) {
    // the empty statement keeps a label legal at the end of a block
    out.push_str("  ");
    out.push_str(name);
    out.push_str(": ;\n");
}
