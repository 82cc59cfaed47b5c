// src/apportion/mod.rs
//! Precinct-level results → region counts.
//!
//! Some ballots (absentee, early, questioned) are reported per district only.
//! Each district's bucket is spread over the regions that district touches in
//! proportion to their election-day votes, with floor division. The rounding
//! loss is kept; nothing redistributes remainders.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use tracing::{debug, instrument, trace};

use crate::error::ApportionmentError;
use crate::extract::parse_count;
use crate::table::{delimited, CellGrid};
use crate::tally::{Tally, TOTAL_KEY};

static DISTRICT_PRECINCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})-\d{3}").expect("precinct pattern should compile"));
static NON_PRECINCT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"District (\d+) - (?:Absentee|Early Voting|Question)")
        .expect("district bucket pattern should compile")
});

const PRECINCT_COL: usize = 0;
const RACE_COL: usize = 1;
const CANDIDATE_COL: usize = 2;
const PARTY_COL: usize = 3;
const COUNT_COL: usize = 5;

/// Which lines of the precinct file count toward the result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApportionSpec {
    #[serde(default = "default_race")]
    pub race: String,
    /// Party code whose candidates are left out...
    #[serde(default = "default_excluded_party")]
    pub excluded_party: String,
    /// ...except this one write-in line.
    #[serde(default = "default_write_in")]
    pub write_in: String,
}

fn default_race() -> String {
    "US PRESIDENT".into()
}

fn default_excluded_party() -> String {
    "NP".into()
}

fn default_write_in() -> String {
    "Write-in 60".into()
}

impl Default for ApportionSpec {
    fn default() -> Self {
        Self {
            race: default_race(),
            excluded_party: default_excluded_party(),
            write_in: default_write_in(),
        }
    }
}

impl ApportionSpec {
    fn counts(&self, race: &str, candidate: &str, party: &str) -> bool {
        race == self.race && (party != self.excluded_party || candidate == self.write_in)
    }
}

/// `DD-PPP` precinct code → lowercased region name.
#[derive(Debug, Clone, Default)]
pub struct PrecinctMap {
    regions: HashMap<String, String>,
}

impl PrecinctMap {
    pub fn from_grid<G: CellGrid + ?Sized>(grid: &G) -> Self {
        let regions = (0..grid.row_count())
            .filter_map(|row| {
                let code = grid.cell(row, 0)?;
                let region = grid.cell(row, 1)?;
                (!code.is_empty()).then(|| (code.to_string(), region.to_lowercase()))
            })
            .collect();
        Self { regions }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening precinct map {}", path.display()))?;
        let grid = delimited::parse_delimited(file, b',')
            .with_context(|| format!("parsing precinct map {}", path.display()))?;
        let map = Self::from_grid(&grid);
        debug!(path = %path.display(), precincts = map.len(), "loaded precinct map");
        Ok(map)
    }

    pub fn region(&self, code: &str) -> Option<&str> {
        self.regions.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl FromIterator<(String, String)> for PrecinctMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            regions: iter
                .into_iter()
                .map(|(code, region)| (code, region.to_lowercase()))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct District {
    /// Election-day votes per region, in first-seen order.
    regions: Tally,
    /// Absentee / early / question votes with no precinct.
    non_precinct: u64,
}

/// Turn precinct records into region counts plus a `total`.
#[instrument(level = "debug", skip(grid, map), fields(records = grid.row_count()))]
pub fn apportion<G: CellGrid + ?Sized>(
    grid: &G,
    map: &PrecinctMap,
    spec: &ApportionSpec,
) -> Result<Tally, ApportionmentError> {
    let districts = collect_districts(grid, map, spec)?;

    let mut out = Tally::new();
    let mut total = 0u64;

    for (district_id, district) in &districts {
        let precinct_sum = district.regions.region_sum();
        if precinct_sum == 0 && district.non_precinct > 0 {
            return Err(ApportionmentError::ZeroPrecinctVotes {
                district: district_id.clone(),
                non_precinct: district.non_precinct,
            });
        }

        for (region, count) in district.regions.iter() {
            let share = if district.non_precinct == 0 {
                0
            } else {
                // exact integer floor of bucket * count / precinct_sum
                (u128::from(district.non_precinct) * u128::from(count) / u128::from(precinct_sum))
                    as u64
            };
            trace!(district = %district_id, %region, count, share, "apportioned");
            out.add(region, count + share);
            total += count + share;
        }
        debug!(
            district = %district_id,
            precinct_sum,
            non_precinct = district.non_precinct,
            "district apportioned"
        );
    }

    out.insert(TOTAL_KEY, total);
    Ok(out)
}

fn collect_districts<G: CellGrid + ?Sized>(
    grid: &G,
    map: &PrecinctMap,
    spec: &ApportionSpec,
) -> Result<Vec<(String, District)>, ApportionmentError> {
    let mut districts: Vec<(String, District)> = Vec::new();

    for row in 0..grid.row_count() {
        let cell = |col| grid.cell(row, col).unwrap_or("");
        if !spec.counts(cell(RACE_COL), cell(CANDIDATE_COL), cell(PARTY_COL)) {
            continue;
        }
        let label = cell(PRECINCT_COL);

        if let Some(caps) = DISTRICT_PRECINCT.captures(label) {
            let code = &caps[0];
            let region = map
                .region(code)
                .ok_or_else(|| ApportionmentError::UnknownPrecinct {
                    code: code.to_string(),
                })?;
            let count = record_count(row, cell(COUNT_COL))?;
            district_mut(&mut districts, &caps[1]).regions.add(region, count);
        } else if let Some(caps) = NON_PRECINCT.captures(label) {
            let district_id = format!("{:0>2}", &caps[1]);
            let count = record_count(row, cell(COUNT_COL))?;
            district_mut(&mut districts, &district_id).non_precinct += count;
        } else {
            trace!(row, %label, "label is neither precinct nor district bucket");
        }
    }

    Ok(districts)
}

fn district_mut<'a>(districts: &'a mut Vec<(String, District)>, id: &str) -> &'a mut District {
    let idx = match districts.iter().position(|(d, _)| d == id) {
        Some(idx) => idx,
        None => {
            districts.push((id.to_string(), District::default()));
            districts.len() - 1
        }
    };
    &mut districts[idx].1
}

fn record_count(row: usize, text: &str) -> Result<u64, ApportionmentError> {
    parse_count(text, &[',']).ok_or_else(|| ApportionmentError::MalformedCount {
        row,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RawTable;

    fn precinct_map() -> PrecinctMap {
        [
            ("01-446", "Fairbanks North Star Borough"),
            ("01-455", "Southeast Fairbanks Census Area"),
            ("02-100", "Fairbanks North Star Borough"),
        ]
        .into_iter()
        .map(|(p, r)| (p.to_string(), r.to_string()))
        .collect()
    }

    fn record<'a>(precinct: &'a str, candidate: &'a str, party: &'a str, count: &'a str) -> Vec<&'a str> {
        vec![precinct, "US PRESIDENT", candidate, party, "", count]
    }

    #[test]
    fn worked_example_keeps_floor_loss() -> anyhow::Result<()> {
        let grid = RawTable::from_rows([
            record("01-446 Aurora", "Clinton, Hillary", "DEM", "30"),
            record("01-455 Badger", "Trump, Donald", "REP", "70"),
            record("District 1 - Absentee", "Trump, Donald", "REP", "9"),
        ]);
        let out = apportion(&grid, &precinct_map(), &ApportionSpec::default())?;
        assert_eq!(out.get("fairbanks north star borough"), Some(32));
        assert_eq!(out.get("southeast fairbanks census area"), Some(76));
        assert_eq!(out.total(), Some(108));
        Ok(())
    }

    #[test]
    fn regions_spanning_districts_are_summed() -> anyhow::Result<()> {
        let grid = RawTable::from_rows([
            record("01-446 Aurora", "A", "DEM", "30"),
            record("01-455 Badger", "A", "DEM", "70"),
            record("District 1 - Early Voting", "A", "DEM", "9"),
            record("02-100 Chena", "A", "DEM", "10"),
            record("District 2 - Question", "A", "DEM", "5"),
        ]);
        let out = apportion(&grid, &precinct_map(), &ApportionSpec::default())?;
        // 32 from district 01, 15 from district 02
        assert_eq!(out.get("fairbanks north star borough"), Some(47));
        assert_eq!(out.total(), Some(out.region_sum()));
        assert_eq!(out.total(), Some(123));
        Ok(())
    }

    #[test]
    fn party_filter_and_write_in_carve_out() -> anyhow::Result<()> {
        let grid = RawTable::from_rows([
            record("01-446 Aurora", "Someone", "NP", "1000"),
            record("01-446 Aurora", "Write-in 60", "NP", "4"),
            record("01-446 Aurora", "Clinton, Hillary", "DEM", "6"),
            vec!["01-446 Aurora", "US SENATE", "X", "DEM", "", "500"],
            record("HD99 Fake", "Clinton, Hillary", "DEM", "77"),
        ]);
        let out = apportion(&grid, &precinct_map(), &ApportionSpec::default())?;
        assert_eq!(out.get("fairbanks north star borough"), Some(10));
        assert_eq!(out.total(), Some(10));
        Ok(())
    }

    #[test]
    fn unknown_precinct_is_fatal() {
        let grid = RawTable::from_rows([record("09-999 Nowhere", "A", "DEM", "3")]);
        let err = apportion(&grid, &precinct_map(), &ApportionSpec::default()).unwrap_err();
        assert!(matches!(err, ApportionmentError::UnknownPrecinct { ref code } if code == "09-999"));
    }

    #[test]
    fn bucket_without_precinct_votes_is_fatal() {
        let grid = RawTable::from_rows([
            record("01-446 Aurora", "Someone", "NP", "5"),
            record("District 1 - Absentee", "A", "DEM", "9"),
        ]);
        let err = apportion(&grid, &precinct_map(), &ApportionSpec::default()).unwrap_err();
        assert!(matches!(
            err,
            ApportionmentError::ZeroPrecinctVotes { ref district, non_precinct: 9 } if district == "01"
        ));
    }

    #[test]
    fn same_input_same_output() -> anyhow::Result<()> {
        let grid = RawTable::from_rows([
            record("01-446 Aurora", "A", "DEM", "33"),
            record("01-455 Badger", "A", "DEM", "67"),
            record("District 1 - Absentee", "A", "DEM", "11"),
        ]);
        let map = precinct_map();
        let first = apportion(&grid, &map, &ApportionSpec::default())?;
        let second = apportion(&grid, &map, &ApportionSpec::default())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn precinct_map_loads_from_csv() -> anyhow::Result<()> {
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new()?;
        writeln!(tmp, "01-446,Fairbanks North Star Borough")?;
        writeln!(tmp, "40-010,Nome Census Area")?;
        let map = PrecinctMap::load(tmp.path())?;
        assert_eq!(map.len(), 2);
        assert_eq!(map.region("40-010"), Some("nome census area"));
        Ok(())
    }
}
