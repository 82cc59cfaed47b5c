// src/table/mod.rs
pub mod delimited;
pub mod html;

/// Read-only view over a parsed results table: rows of cell text.
pub trait CellGrid {
    fn row_count(&self) -> usize;

    fn cell_count(&self, row: usize) -> usize;

    /// Trimmed text of cell `col` in `row`, or `None` past the end.
    fn cell(&self, row: usize, col: usize) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    /// Each source row, one `String` per cell, already trimmed.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Convenience for tests and static fixtures.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.as_ref().trim().to_string()).collect())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl CellGrid for RawTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cell_count(&self, row: usize) -> usize {
        self.rows.get(row).map_or(0, Vec::len)
    }

    fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_table_reads_cells_and_trims() {
        let t = RawTable::from_rows([vec![" Adams ", "1,200"], vec!["Brown"]]);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.cell_count(0), 2);
        assert_eq!(t.cell_count(1), 1);
        assert_eq!(t.cell_count(5), 0);
        assert_eq!(t.cell(0, 0), Some("Adams"));
        assert_eq!(t.cell(1, 1), None);
    }
}
