// src/error.rs

use thiserror::Error;

/// Failures while turning a parsed table into named counts, or while
/// rewriting those counts.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("row {row}: cannot read a count from {text:?}")]
    MalformedCount { row: usize, text: String },
    #[error("row {row}: no cell at {position}")]
    MissingCell { row: usize, position: String },
    #[error("split-pair table has an unpaired trailing row {row}")]
    UnpairedRow { row: usize },
    #[error("duplicate region name {name:?} at row {row}")]
    DuplicateName { name: String, row: usize },
    #[error("literal total row {label:?} not found")]
    MissingTotalRow { label: String },
    #[error("merge source {name:?} not found")]
    MissingMergeSource { name: String },
    #[error("no results table found: {0}")]
    TableNotFound(String),
}

/// Failures of the precinct → district → region apportionment.
#[derive(Debug, Error)]
pub enum ApportionmentError {
    #[error("precinct {code} has no region in the precinct map")]
    UnknownPrecinct { code: String },
    #[error("district {district} has {non_precinct} non-precinct votes but no precinct votes to apportion them by")]
    ZeroPrecinctVotes { district: String, non_precinct: u64 },
    #[error("record {row}: cannot read a count from {text:?}")]
    MalformedCount { row: usize, text: String },
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no authority match for {names:?}")]
    Unmatched { names: Vec<String> },
}

/// Any failure of a run, always tagged with the jurisdiction it came from.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("jurisdiction {jurisdiction}: extraction failed: {source}")]
    Extraction {
        jurisdiction: String,
        #[source]
        source: ExtractionError,
    },
    #[error("jurisdiction {jurisdiction}: apportionment failed: {source}")]
    Apportionment {
        jurisdiction: String,
        #[source]
        source: ApportionmentError,
    },
    #[error("jurisdiction {jurisdiction}: resolution failed: {source}")]
    Resolution {
        jurisdiction: String,
        #[source]
        source: ResolutionError,
    },
    #[error("jurisdiction {jurisdiction}: reading source failed: {source:#}")]
    Source {
        jurisdiction: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("jurisdiction {jurisdiction}: task did not complete: {message}")]
    Task {
        jurisdiction: String,
        message: String,
    },
}

impl PipelineError {
    pub fn extraction(jurisdiction: impl Into<String>, source: ExtractionError) -> Self {
        Self::Extraction {
            jurisdiction: jurisdiction.into(),
            source,
        }
    }

    pub fn apportionment(jurisdiction: impl Into<String>, source: ApportionmentError) -> Self {
        Self::Apportionment {
            jurisdiction: jurisdiction.into(),
            source,
        }
    }

    pub fn resolution(jurisdiction: impl Into<String>, source: ResolutionError) -> Self {
        Self::Resolution {
            jurisdiction: jurisdiction.into(),
            source,
        }
    }

    pub fn source(jurisdiction: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Source {
            jurisdiction: jurisdiction.into(),
            source,
        }
    }

    /// Code of the jurisdiction that failed.
    pub fn jurisdiction(&self) -> &str {
        match self {
            Self::Extraction { jurisdiction, .. }
            | Self::Apportionment { jurisdiction, .. }
            | Self::Resolution { jurisdiction, .. }
            | Self::Source { jurisdiction, .. }
            | Self::Task { jurisdiction, .. } => jurisdiction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_names_the_jurisdiction() {
        let err = PipelineError::extraction(
            "06",
            ExtractionError::MalformedCount {
                row: 4,
                text: "n/a".into(),
            },
        );
        assert_eq!(err.jurisdiction(), "06");
        let msg = err.to_string();
        assert!(msg.contains("jurisdiction 06"), "{msg}");
        assert!(msg.contains("row 4"), "{msg}");
    }
}
