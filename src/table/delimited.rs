// src/table/delimited.rs

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::io::Read;

use super::RawTable;

/// Parse delimited text into a grid. Every field is trimmed, which also
/// absorbs the padded `" ,"` separators some election offices emit.
pub fn parse_delimited<R: Read>(reader: R, delimiter: u8) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("delimited parse error at record {}", idx))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable::new(rows))
}

pub fn parse_csv_str(text: &str) -> Result<RawTable> {
    parse_delimited(text.as_bytes(), b',')
}
