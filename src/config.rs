// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::apportion::ApportionSpec;
use crate::extract::ExtractSpec;
use crate::normalize::{Step, TotalPolicy};
use crate::resolve::{AuthorityColumns, ResolveOptions};
use crate::table::html::{RowSelection, TableLocator};

pub const DEFAULT_CONFIG_PATH: &str = "config/jurisdictions.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub resolve: ResolveOptions,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub jurisdictions: Vec<JurisdictionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub columns: AuthorityColumns,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_concurrency() -> usize {
    8
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    concat!("votescraper/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// Where a jurisdiction's results come from and how they are read.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// An HTML page; `location` may carry a `#section` anchor.
    Html {
        location: String,
        #[serde(default)]
        locator: TableLocator,
        #[serde(default)]
        rows: RowSelection,
    },
    /// Delimited text, one region per row.
    Delimited {
        location: String,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    /// Precinct-level results that need district apportionment.
    Precinct {
        location: String,
        precinct_map: PathBuf,
        #[serde(default)]
        apportion: ApportionSpec,
    },
    /// Counts known up front, with no table to read.
    Static { counts: Vec<StaticCount> },
}

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JurisdictionConfig {
    /// Two-digit state code, the key the resolver matches on.
    pub code: String,
    pub name: String,
    pub source: Source,
    #[serde(default)]
    pub extract: ExtractSpec,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl JurisdictionConfig {
    /// Whether `total` is computed, promoted from a literal row, or missing.
    pub fn total_policy(&self) -> TotalPolicy {
        match self.source {
            Source::Precinct { .. } => TotalPolicy::Apportioned,
            _ => TotalPolicy::from_steps(&self.steps),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.fetch.max_concurrency == 0 {
            bail!("fetch.max_concurrency must be at least 1");
        }
        let mut seen = HashSet::new();
        for j in &self.jurisdictions {
            if j.code.len() != 2 || !j.code.chars().all(|c| c.is_ascii_digit()) {
                bail!("jurisdiction {:?}: code {:?} is not two digits", j.name, j.code);
            }
            if !seen.insert(j.code.as_str()) {
                bail!("jurisdiction code {} listed twice", j.code);
            }
            if let Source::Delimited { delimiter, .. } = &j.source {
                if !delimiter.is_ascii() {
                    bail!("jurisdiction {}: delimiter must be a single ASCII character", j.code);
                }
            }
        }
        Ok(())
    }

    /// Keep only the named jurisdictions (by code or case-insensitive name).
    pub fn retain_jurisdictions(&mut self, wanted: &[String]) {
        if wanted.is_empty() {
            return;
        }
        self.jurisdictions.retain(|j| {
            wanted
                .iter()
                .any(|w| w == &j.code || w.eq_ignore_ascii_case(&j.name))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Parity, Strategy};

    const SAMPLE: &str = r#"
authority:
  path: local_data/all-geocodes-v2017.csv
resolve:
  strict: true
jurisdictions:
  - code: "01"
    name: Alabama
    source:
      kind: html
      location: "https://en.wikipedia.org/wiki/Page#By_county"
    steps:
      - op: compute_total
  - code: "02"
    name: Alaska
    source:
      kind: precinct
      location: local_data/alaska_results.csv
      precinct_map: local_data/alaska_precinct_to_county.csv
  - code: "16"
    name: Idaho
    source:
      kind: html
      location: "idaho.html#Results"
      rows: all_rows
      locator: next_wrapped
    extract:
      strategy: { kind: multi_column_sum, parity: even }
      skip_rows: 1
    steps:
      - op: compute_total
  - code: "11"
    name: Washington D.C.
    source:
      kind: static
      counts:
        - { name: district of columbia, count: 311268 }
        - { name: total, count: 311268 }
  - code: "08"
    name: Colorado
    source: { kind: html, location: "co.html#x" }
    steps:
      - { op: promote_total, label: colorado total }
"#;

    #[test]
    fn sample_config_parses_with_defaults() -> Result<()> {
        let cfg = Config::from_yaml(SAMPLE)?;
        assert!(cfg.resolve.strict);
        assert_eq!(cfg.resolve.max_state_code, "57");
        assert_eq!(cfg.fetch.max_concurrency, 8);
        assert_eq!(cfg.authority.columns, AuthorityColumns::default());
        assert_eq!(cfg.jurisdictions.len(), 5);

        let alaska = &cfg.jurisdictions[1];
        match &alaska.source {
            Source::Precinct { apportion, .. } => assert_eq!(apportion, &ApportionSpec::default()),
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(alaska.total_policy(), TotalPolicy::Apportioned);

        let idaho = &cfg.jurisdictions[2];
        assert_eq!(
            idaho.extract.strategy,
            Strategy::MultiColumnSum {
                parity: Parity::Even
            }
        );
        assert_eq!(idaho.extract.skip_rows, 1);
        assert!(matches!(
            idaho.source,
            Source::Html {
                locator: TableLocator::NextWrapped,
                rows: RowSelection::AllRows,
                ..
            }
        ));

        assert_eq!(cfg.jurisdictions[0].total_policy(), TotalPolicy::Computed);
        assert_eq!(cfg.jurisdictions[3].total_policy(), TotalPolicy::Absent);
        assert_eq!(
            cfg.jurisdictions[4].total_policy(),
            TotalPolicy::Literal("colorado total".into())
        );
        Ok(())
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let yaml = r#"
authority: { path: a.csv }
jurisdictions:
  - { code: "01", name: A, source: { kind: static, counts: [] } }
  - { code: "01", name: B, source: { kind: static, counts: [] } }
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("listed twice"), "{err}");
    }

    #[test]
    fn retain_matches_code_or_name() -> Result<()> {
        let mut cfg = Config::from_yaml(SAMPLE)?;
        cfg.retain_jurisdictions(&["alaska".to_string(), "16".to_string()]);
        let codes: Vec<_> = cfg.jurisdictions.iter().map(|j| j.code.as_str()).collect();
        assert_eq!(codes, vec!["02", "16"]);
        Ok(())
    }

    #[test]
    fn shipped_config_is_valid() -> Result<()> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let cfg = Config::load_from_file(&path)?;
        assert_eq!(cfg.jurisdictions.len(), 51);
        Ok(())
    }
}
