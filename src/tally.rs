// src/tally.rs

use std::fmt;

use crate::error::ExtractionError;

/// Reserved key for the jurisdiction-wide sum.
pub const TOTAL_KEY: &str = "total";

/// One extracted row: a lowercased region name and its vote count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

impl NamedCount {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// Insertion-ordered `name → count` map for a single jurisdiction.
///
/// Jurisdictions hold at most a few hundred regions, so lookups are linear
/// scans over a `Vec`; what matters is that order survives every rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    entries: Vec<(String, u64)>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from extracted rows, rejecting repeated names.
    pub fn from_counts(counts: Vec<NamedCount>) -> Result<Self, ExtractionError> {
        let mut tally = Self {
            entries: Vec::with_capacity(counts.len()),
        };
        for (row, nc) in counts.into_iter().enumerate() {
            if tally.contains(&nc.name) {
                return Err(ExtractionError::DuplicateName { name: nc.name, row });
            }
            tally.entries.push((nc.name, nc.count));
        }
        Ok(tally)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.position(key).map(|i| self.entries[i].1)
    }

    pub fn total(&self) -> Option<u64> {
        self.get(TOTAL_KEY)
    }

    /// Set `key`. An existing entry keeps its position, a new one is appended.
    pub fn insert(&mut self, key: impl Into<String>, count: u64) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = count,
            None => self.entries.push((key, count)),
        }
    }

    /// Add to `key`, creating it at the end when absent.
    pub fn add(&mut self, key: &str, count: u64) {
        match self.position(key) {
            Some(i) => self.entries[i].1 += count,
            None => self.entries.push((key.to_string(), count)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<u64> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    /// Sum of every entry except `total`.
    pub fn region_sum(&self) -> u64 {
        self.regions().map(|(_, c)| c).sum()
    }

    /// All entries in insertion order, `total` included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), *c))
    }

    /// Entries other than `total`.
    pub fn regions(&self) -> impl Iterator<Item = (&str, u64)> {
        self.iter().filter(|(k, _)| *k != TOTAL_KEY)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl IntoIterator for Tally {
    type Item = (String, u64);
    type IntoIter = std::vec::IntoIter<(String, u64)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, u64)> for Tally {
    /// Later duplicates overwrite earlier ones in place.
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for (k, c) in iter {
            tally.insert(k, c);
        }
        tally
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, c)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {c}")?;
        }
        f.write_str("}")
    }
}
