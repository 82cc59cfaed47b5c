// src/resolve/authority.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::table::{delimited, CellGrid};

const COUNTY_LEVEL: &str = "050";
const STATE_LEVEL: &str = "040";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLevel {
    County,
    State,
    Other,
}

impl SummaryLevel {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            COUNTY_LEVEL => SummaryLevel::County,
            STATE_LEVEL => SummaryLevel::State,
            _ => SummaryLevel::Other,
        }
    }
}

/// One row of the geocode reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityRecord {
    pub summary_level: SummaryLevel,
    pub state_code: String,
    pub region_code: String,
    pub display_name: String,
}

impl AuthorityRecord {
    pub fn county(state_code: &str, region_code: &str, display_name: &str) -> Self {
        Self {
            summary_level: SummaryLevel::County,
            state_code: state_code.into(),
            region_code: region_code.into(),
            display_name: display_name.into(),
        }
    }

    pub fn state(state_code: &str, display_name: &str) -> Self {
        Self {
            summary_level: SummaryLevel::State,
            state_code: state_code.into(),
            region_code: "000".into(),
            display_name: display_name.into(),
        }
    }

    /// `state_code + region_code`, the five-digit county identifier.
    pub fn region_id(&self) -> String {
        format!("{}{}", self.state_code, self.region_code)
    }
}

/// Column positions in the geocode export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityColumns {
    #[serde(default)]
    pub summary_level: usize,
    #[serde(default = "default_state_col")]
    pub state_code: usize,
    #[serde(default = "default_county_col")]
    pub region_code: usize,
    #[serde(default = "default_name_col")]
    pub display_name: usize,
}

fn default_state_col() -> usize {
    1
}

fn default_county_col() -> usize {
    2
}

fn default_name_col() -> usize {
    6
}

impl Default for AuthorityColumns {
    fn default() -> Self {
        Self {
            summary_level: 0,
            state_code: default_state_col(),
            region_code: default_county_col(),
            display_name: default_name_col(),
        }
    }
}

/// The reference table, kept in its given row order (state row, then its counties).
#[derive(Debug, Clone, Default)]
pub struct AuthorityTable {
    records: Vec<AuthorityRecord>,
}

impl AuthorityTable {
    pub fn new(records: Vec<AuthorityRecord>) -> Self {
        Self { records }
    }

    /// Rows whose summary-level cell is not a three-digit code (titles,
    /// column headings, notes) are not records and are skipped.
    pub fn from_grid<G: CellGrid + ?Sized>(grid: &G, cols: &AuthorityColumns) -> Self {
        let mut records = Vec::with_capacity(grid.row_count());
        for row in 0..grid.row_count() {
            let level = grid.cell(row, cols.summary_level).unwrap_or("");
            if level.len() != 3 || !level.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let (Some(state), Some(region), Some(name)) = (
                grid.cell(row, cols.state_code),
                grid.cell(row, cols.region_code),
                grid.cell(row, cols.display_name),
            ) else {
                debug!(row, "short geocode row skipped");
                continue;
            };
            records.push(AuthorityRecord {
                summary_level: SummaryLevel::from_code(level),
                state_code: state.to_string(),
                region_code: region.to_string(),
                display_name: name.to_string(),
            });
        }
        Self { records }
    }

    #[instrument(level = "info", skip(cols), fields(path = %path.display()))]
    pub fn load_csv(path: &Path, cols: &AuthorityColumns) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening authority table {}", path.display()))?;
        let grid = delimited::parse_delimited(file, b',')
            .with_context(|| format!("parsing authority table {}", path.display()))?;
        let table = Self::from_grid(&grid, cols);
        info!(records = table.len(), "loaded authority table");
        Ok(table)
    }

    pub fn records(&self) -> &[AuthorityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
