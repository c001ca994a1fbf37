//! Offset to source-line mapping.
//!
//! Compiled units carry their line information as an `lnotab`: a byte string
//! of `(offset increment, line increment)` pairs, where the line increment is
//! a signed byte. [`LineTable`] decodes it once into sorted line starts.

/// Sorted `(offset, line)` starts for one code unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    first_line: u32,
    starts: Vec<(usize, u32)>,
}

impl LineTable {
    /// Build a table from already-sorted line starts.
    pub fn from_starts(first_line: u32, mut starts: Vec<(usize, u32)>) -> Self {
        starts.sort_by_key(|&(offset, _)| offset);
        starts.dedup_by_key(|&mut (offset, _)| offset);
        Self { first_line, starts }
    }

    /// Decode an `lnotab` byte string.
    pub fn from_lnotab(first_line: u32, lnotab: &[u8]) -> Self {
        let mut starts = Vec::with_capacity(lnotab.len() / 2);
        let mut last_line: Option<i64> = None;
        let mut line = first_line as i64;
        let mut addr = 0usize;

        for pair in lnotab.chunks_exact(2) {
            let (byte_incr, line_incr) = (pair[0], pair[1] as i8);
            if byte_incr != 0 {
                if last_line != Some(line) {
                    starts.push((addr, line.max(0) as u32));
                    last_line = Some(line);
                }
                addr += byte_incr as usize;
            }
            line += line_incr as i64;
        }
        if last_line != Some(line) {
            starts.push((addr, line.max(0) as u32));
        }

        Self { first_line, starts }
    }

    /// Source line of the instruction at `offset`.
    pub fn line_at(&self, offset: usize) -> u32 {
        match self.starts.partition_point(|&(start, _)| start <= offset) {
            0 => self.first_line,
            i => self.starts[i - 1].1,
        }
    }

    /// First line of the unit's definition.
    pub fn first_line(&self) -> u32 {
        self.first_line
    }

    /// Line starts, sorted by offset.
    pub fn starts(&self) -> &[(usize, u32)] {
        &self.starts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_first_line() {
        let table = LineTable::from_lnotab(7, &[]);
        assert_eq!(table.line_at(0), 7);
        assert_eq!(table.line_at(40), 7);
    }

    #[test]
    fn decodes_increments() {
        // line 1 at 0, line 2 at 4, line 4 at 10
        let table = LineTable::from_lnotab(1, &[4, 1, 6, 2]);
        assert_eq!(table.starts(), &[(0, 1), (4, 2), (10, 4)]);
        assert_eq!(table.line_at(0), 1);
        assert_eq!(table.line_at(2), 1);
        assert_eq!(table.line_at(4), 2);
        assert_eq!(table.line_at(8), 2);
        assert_eq!(table.line_at(12), 4);
    }

    #[test]
    fn negative_line_increment() {
        // 0xfe is -2 as a signed byte
        let table = LineTable::from_lnotab(10, &[2, 3, 2, 0xfe]);
        assert_eq!(table.line_at(0), 10);
        assert_eq!(table.line_at(2), 13);
        assert_eq!(table.line_at(4), 11);
    }

    #[test]
    fn zero_byte_increment_accumulates_lines() {
        // large line jumps are split into several pairs with a zero offset step
        let table = LineTable::from_lnotab(1, &[0, 127, 0, 127, 2, 1]);
        assert_eq!(table.line_at(0), 255);
        assert_eq!(table.line_at(2), 256);
    }

    #[test]
    fn from_starts_sorts() {
        let table = LineTable::from_starts(1, vec![(6, 3), (0, 1), (2, 2)]);
        assert_eq!(table.line_at(4), 2);
        assert_eq!(table.line_at(6), 3);
    }
}
