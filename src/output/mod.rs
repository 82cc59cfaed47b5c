// src/output/mod.rs

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};
use tracing::info;

use crate::aggregate::FinalDataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// `id,name,count` rows, no header.
    Csv,
    /// `[{"stateCode", "regions": [{"regionCode", "name", "count"}]}]`
    Json,
}

impl OutputFormat {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Some(OutputFormat::Csv),
            Some("json") => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonRegion {
    pub region_code: String,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonJurisdiction {
    pub state_code: String,
    pub regions: Vec<JsonRegion>,
}

/// `(region_id, name, count)` as written to disk.
pub type Triple = (String, String, u64);

pub fn write(dataset: &FinalDataset, path: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => write_csv(dataset, path),
        OutputFormat::Json => write_json(dataset, path),
    }
}

pub fn write_csv(dataset: &FinalDataset, path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for (_, record) in dataset.records() {
        wtr.write_record([
            record.region_id.as_str(),
            record.name.as_str(),
            record.count.to_string().as_str(),
        ])
        .with_context(|| format!("writing {}", path.display()))?;
    }
    wtr.flush()?;
    info!(path = %path.display(), records = dataset.record_count(), "finished writing CSV results");
    Ok(())
}

pub fn to_json_document(dataset: &FinalDataset) -> Vec<JsonJurisdiction> {
    dataset
        .jurisdictions()
        .iter()
        .map(|j| JsonJurisdiction {
            state_code: j.code.clone(),
            regions: j
                .records
                .iter()
                .map(|r| JsonRegion {
                    region_code: r.region_id.clone(),
                    name: r.name.clone(),
                    count: r.count,
                })
                .collect(),
        })
        .collect()
}

pub fn write_json(dataset: &FinalDataset, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &to_json_document(dataset))
        .with_context(|| format!("writing {}", path.display()))?;
    writer.flush()?;
    info!(path = %path.display(), jurisdictions = dataset.len(), "finished writing JSON results");
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<Triple>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("{} record {}", path.display(), idx))?;
        let field = |i: usize| {
            record
                .get(i)
                .ok_or_else(|| anyhow!("{} record {} has no field {}", path.display(), idx, i))
        };
        let count = field(2)?
            .parse::<u64>()
            .with_context(|| format!("{} record {}: bad count", path.display(), idx))?;
        out.push((field(0)?.to_string(), field(1)?.to_string(), count));
    }
    Ok(out)
}

pub fn read_json(path: &Path) -> Result<Vec<JsonJurisdiction>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

/// Flatten a dataset into the triples a serializer writes.
pub fn triples(dataset: &FinalDataset) -> Vec<Triple> {
    dataset
        .records()
        .map(|(_, r)| (r.region_id.clone(), r.name.clone(), r.count))
        .collect()
}
