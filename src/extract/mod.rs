// src/extract/mod.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, trace};

use crate::error::ExtractionError;
use crate::table::CellGrid;
use crate::tally::NamedCount;

static FOOTNOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("footnote pattern should compile"));
static PARENTHESISED_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\w+)\)").expect("parenthesis pattern should compile"));

/// Which alternating columns a `MultiColumnSum` row adds up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// Columns 2, 4, 6, ...
    Even,
    /// Columns 1, 3, 5, ...
    Odd,
}

impl Parity {
    fn selects(self, col: usize) -> bool {
        col > 0
            && match self {
                Parity::Even => col % 2 == 0,
                Parity::Odd => col % 2 == 1,
            }
    }
}

/// How one results row (or pair of rows) becomes a name and a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Name in the first cell, count in the last non-blank cell.
    #[default]
    SingleValue,
    /// Name row followed by a count row.
    SplitPair,
    /// Count is the sum of every other column, e.g. one column per voting method.
    MultiColumnSum { parity: Parity },
    /// Count sits `from_end` cells from the end (1 = last), ahead of percentage cells.
    FixedOffset { from_end: usize },
}

/// Shape of one jurisdiction's results table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractSpec {
    #[serde(default)]
    pub strategy: Strategy,
    /// Leading heading rows, skipped by position.
    #[serde(default)]
    pub skip_rows: usize,
    /// Turn `baltimore (city)` into `baltimore city`.
    #[serde(default)]
    pub unwrap_parentheses: bool,
}

impl ExtractSpec {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn skip_rows(mut self, n: usize) -> Self {
        self.skip_rows = n;
        self
    }
}

/// Read every data row of `grid` into a `(name, count)` pair, in table order.
#[instrument(level = "debug", skip(grid), fields(rows = grid.row_count()))]
pub fn extract<G: CellGrid + ?Sized>(
    grid: &G,
    spec: &ExtractSpec,
) -> Result<Vec<NamedCount>, ExtractionError> {
    let first = spec.skip_rows.min(grid.row_count());
    let mut out = Vec::with_capacity(grid.row_count().saturating_sub(first));

    match spec.strategy {
        Strategy::SplitPair => {
            let data_rows = grid.row_count() - first;
            if data_rows % 2 != 0 {
                return Err(ExtractionError::UnpairedRow {
                    row: grid.row_count() - 1,
                });
            }
            for row in (first..grid.row_count()).step_by(2) {
                let name = read_name(grid, row, spec)?;
                let count = split_pair_count(grid, row + 1)?;
                trace!(row, %name, count, "pair");
                out.push(NamedCount { name, count });
            }
        }
        strategy => {
            for row in first..grid.row_count() {
                let name = read_name(grid, row, spec)?;
                let count = match strategy {
                    Strategy::SingleValue => last_non_blank_count(grid, row)?,
                    Strategy::MultiColumnSum { parity } => column_sum(grid, row, parity)?,
                    Strategy::FixedOffset { from_end } => offset_count(grid, row, from_end)?,
                    Strategy::SplitPair => unreachable!("handled above"),
                };
                trace!(row, %name, count, "row");
                out.push(NamedCount { name, count });
            }
        }
    }

    debug!(extracted = out.len(), "extraction finished");
    Ok(out)
}

/// Lowercase, trim and strip footnote markers from a region name.
pub fn clean_name(raw: &str, unwrap_parentheses: bool) -> String {
    let stripped = FOOTNOTE.replace_all(raw, "");
    let lowered = stripped.trim().to_lowercase();
    if unwrap_parentheses {
        PARENTHESISED_WORD.replace(&lowered, "$1").into_owned()
    } else {
        lowered
    }
}

/// Strip thousands separators and parse. `None` for anything that isn't a
/// plain non-negative integer afterwards.
pub fn parse_count(text: &str, strip: &[char]) -> Option<u64> {
    let digits: String = text.chars().filter(|c| !strip.contains(c)).collect();
    digits.trim().parse::<u64>().ok()
}

fn read_name<G: CellGrid + ?Sized>(
    grid: &G,
    row: usize,
    spec: &ExtractSpec,
) -> Result<String, ExtractionError> {
    let raw = grid.cell(row, 0).ok_or_else(|| ExtractionError::MissingCell {
        row,
        position: "first cell".into(),
    })?;
    Ok(clean_name(raw, spec.unwrap_parentheses))
}

fn last_non_blank<G: CellGrid + ?Sized>(grid: &G, row: usize) -> Result<&str, ExtractionError> {
    (0..grid.cell_count(row))
        .rev()
        .filter_map(|col| grid.cell(row, col))
        .find(|text| !text.trim().is_empty())
        .ok_or_else(|| ExtractionError::MissingCell {
            row,
            position: "last non-blank cell".into(),
        })
}

fn strict_count(row: usize, text: &str, strip: &[char]) -> Result<u64, ExtractionError> {
    parse_count(text, strip).ok_or_else(|| ExtractionError::MalformedCount {
        row,
        text: text.to_string(),
    })
}

fn last_non_blank_count<G: CellGrid + ?Sized>(grid: &G, row: usize) -> Result<u64, ExtractionError> {
    strict_count(row, last_non_blank(grid, row)?, &[','])
}

fn split_pair_count<G: CellGrid + ?Sized>(grid: &G, row: usize) -> Result<u64, ExtractionError> {
    let text = last_non_blank(grid, row)?;
    // a bare dash is a "no votes" placeholder
    if text.chars().all(|c| c == '-' || c.is_whitespace()) {
        return Ok(0);
    }
    strict_count(row, text, &[',', '-'])
}

fn column_sum<G: CellGrid + ?Sized>(
    grid: &G,
    row: usize,
    parity: Parity,
) -> Result<u64, ExtractionError> {
    let mut sum = 0;
    for col in (0..grid.cell_count(row)).filter(|c| parity.selects(*c)) {
        let text = grid.cell(row, col).unwrap_or("");
        if text.trim().is_empty() {
            continue;
        }
        sum += strict_count(row, text, &[','])?;
    }
    Ok(sum)
}

fn offset_count<G: CellGrid + ?Sized>(
    grid: &G,
    row: usize,
    from_end: usize,
) -> Result<u64, ExtractionError> {
    let len = grid.cell_count(row);
    let col = len
        .checked_sub(from_end)
        .filter(|_| from_end > 0)
        .ok_or_else(|| ExtractionError::MissingCell {
            row,
            position: format!("{from_end} from the end of {len} cells"),
        })?;
    let text = grid.cell(row, col).unwrap_or("");
    strict_count(row, text, &[','])
}
