// src/table/html.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, trace};

use super::RawTable;
use crate::error::ExtractionError;

static WITH_ID: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[id]").expect("id selector should parse"));
static WIKITABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.wikitable").expect("wikitable selector should parse"));
static BODY_ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr").expect("row selector should parse"));
static CELLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td, th").expect("cell selector should parse"));
static DATA_CELLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("data cell selector should parse"));

/// Where the results table sits relative to the section anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLocator {
    /// First `table.wikitable` among the following siblings of the anchor's parent.
    #[default]
    FollowingTable,
    /// First `table.wikitable` inside the element right after the anchor's parent.
    NextWrapped,
}

/// Which `tr` elements become rows of the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSelection {
    /// Only rows holding at least one `td`; pure heading rows vanish.
    #[default]
    DataRows,
    /// Every row holding a `td` or `th`.
    AllRows,
}

/// Find the results table under section `anchor` and read it into a grid.
pub fn locate_table(
    html: &str,
    anchor: &str,
    locator: TableLocator,
    rows: RowSelection,
) -> Result<RawTable, ExtractionError> {
    let document = Html::parse_document(html);

    let anchor_el = document
        .select(&WITH_ID)
        .find(|el| el.value().id() == Some(anchor))
        .ok_or_else(|| ExtractionError::TableNotFound(format!("no element with id {anchor:?}")))?;

    let parent = anchor_el
        .parent()
        .and_then(ElementRef::wrap)
        .ok_or_else(|| ExtractionError::TableNotFound(format!("anchor {anchor:?} has no parent")))?;

    let table = match locator {
        TableLocator::FollowingTable => parent
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| WIKITABLE.matches(el)),
        TableLocator::NextWrapped => parent
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .and_then(|next| next.select(&WIKITABLE).next()),
    }
    .ok_or_else(|| {
        ExtractionError::TableNotFound(format!("no wikitable after anchor {anchor:?} ({locator:?})"))
    })?;

    let grid = read_rows(table, rows);
    debug!(anchor, rows = grid.rows.len(), "located results table");
    Ok(grid)
}

fn read_rows(table: ElementRef<'_>, selection: RowSelection) -> RawTable {
    let mut rows = Vec::new();
    for tr in table.select(&BODY_ROWS) {
        let keep = match selection {
            RowSelection::DataRows => tr.select(&DATA_CELLS).next().is_some(),
            RowSelection::AllRows => tr.select(&CELLS).next().is_some(),
        };
        if !keep {
            trace!("skipping heading-only row");
            continue;
        }
        let cells: Vec<String> = tr
            .select(&CELLS)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();
        rows.push(cells);
    }
    RawTable::new(rows)
}

/// Split a `page#section` location into the document part and the anchor.
pub fn split_anchor(location: &str) -> (&str, Option<&str>) {
    match location.split_once('#') {
        Some((doc, anchor)) if !anchor.is_empty() => (doc, Some(anchor)),
        Some((doc, _)) => (doc, None),
        None => (location, None),
    }
}
