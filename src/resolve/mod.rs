// src/resolve/mod.rs
//! Replace region names with reference-table identifiers.
//!
//! The table is scanned once, in its own row order, and every jurisdiction's
//! working map is re-keyed as matches are found. Prefix matches look at the
//! keys as they stand at that moment, so the outcome depends on that order
//! (state row first, then its counties) exactly as supplied.

pub mod authority;

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

pub use authority::{AuthorityColumns, AuthorityRecord, AuthorityTable, SummaryLevel};

use crate::error::{PipelineError, ResolutionError};
use crate::tally::{Tally, TOTAL_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveOptions {
    /// Only state codes below this bound are states or state equivalents.
    #[serde(default = "default_max_state_code")]
    pub max_state_code: String,
    /// Fail the run on any unmatched name instead of passing it through.
    #[serde(default)]
    pub strict: bool,
}

fn default_max_state_code() -> String {
    "57".into()
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_state_code: default_max_state_code(),
            strict: false,
        }
    }
}

/// A region (or the state total) under its canonical identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub region_id: String,
    pub name: String,
    pub count: u64,
}

/// One jurisdiction after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJurisdiction {
    pub code: String,
    pub records: Vec<ResolvedRecord>,
    /// Names that matched nothing and were passed through keyed by name.
    pub unresolved: Vec<String>,
}

impl ResolvedJurisdiction {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

#[derive(Debug)]
struct Slot {
    key: String,
    display: Option<String>,
    count: u64,
}

/// Working copy of one jurisdiction's tally during the scan.
#[derive(Debug)]
struct Working {
    slots: Vec<Slot>,
}

impl Working {
    fn from_tally(tally: Tally) -> Self {
        Self {
            slots: tally
                .into_iter()
                .map(|(key, count)| Slot {
                    key,
                    display: None,
                    count,
                })
                .collect(),
        }
    }

    fn find_exact(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.key == name)
    }

    /// First key `k` with `name` starting with `k` followed by a space.
    fn find_word_prefix(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| {
            name.strip_prefix(s.key.as_str())
                .map_or(false, |rest| rest.starts_with(' '))
        })
    }

    /// Remove the slot at `idx` and append it under its new key.
    fn rekey(&mut self, idx: usize, key: String, display: &str) {
        let slot = self.slots.remove(idx);
        self.slots.push(Slot {
            key,
            display: Some(display.to_string()),
            count: slot.count,
        });
    }
}

/// Resolve every jurisdiction's tally against `table`. Tallies are given as
/// `(state_code, tally)` in output order.
#[instrument(level = "info", skip_all, fields(jurisdictions = tallies.len(), authority_rows = table.len()))]
pub fn resolve(
    tallies: Vec<(String, Tally)>,
    table: &AuthorityTable,
    opts: &ResolveOptions,
) -> Result<Vec<ResolvedJurisdiction>, PipelineError> {
    let mut order = Vec::with_capacity(tallies.len());
    let mut working: HashMap<String, Working> = HashMap::with_capacity(tallies.len());
    for (code, tally) in tallies {
        order.push(code.clone());
        working.insert(code, Working::from_tally(tally));
    }

    for record in table.records() {
        if record.state_code.as_str() >= opts.max_state_code.as_str() || record.state_code == "00" {
            continue;
        }
        let Some(w) = working.get_mut(&record.state_code) else {
            continue;
        };

        match record.summary_level {
            SummaryLevel::County if record.region_code != "000" => {
                let name = record.display_name.to_lowercase();
                if let Some(idx) = w.find_exact(&name) {
                    w.rekey(idx, record.region_id(), &record.display_name);
                } else if let Some(idx) = w.find_word_prefix(&name) {
                    debug!(
                        state = %record.state_code,
                        key = %w.slots[idx].key,
                        authority = %record.display_name,
                        "prefix match"
                    );
                    w.rekey(idx, record.region_id(), &record.display_name);
                }
            }
            SummaryLevel::State => match w.find_exact(TOTAL_KEY) {
                Some(idx) => w.rekey(idx, record.state_code.clone(), &record.display_name),
                None => debug!(state = %record.state_code, "no total; state row omitted"),
            },
            _ => {}
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for code in order {
        let Some(w) = working.remove(&code) else {
            continue;
        };
        let unresolved: Vec<String> = w
            .slots
            .iter()
            .filter(|s| s.display.is_none())
            .map(|s| s.key.clone())
            .collect();

        if !unresolved.is_empty() {
            if opts.strict {
                return Err(PipelineError::resolution(
                    code,
                    ResolutionError::Unmatched { names: unresolved },
                ));
            }
            warn!(jurisdiction = %code, names = ?unresolved, "unmatched regions passed through by name");
        }

        let records = w
            .slots
            .into_iter()
            .map(|s| ResolvedRecord {
                name: s.display.unwrap_or_else(|| s.key.clone()),
                region_id: s.key,
                count: s.count,
            })
            .collect::<Vec<_>>();
        info!(jurisdiction = %code, records = records.len(), unresolved = unresolved.len(), "resolved");
        out.push(ResolvedJurisdiction {
            code,
            records,
            unresolved,
        });
    }

    Ok(out)
}
