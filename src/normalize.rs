// src/normalize.rs

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::tally::{Tally, TOTAL_KEY};

/// One rewrite of a jurisdiction's tally. Steps run in configured order and
/// each one consumes the tally it is given.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Move the count at `from` to `to`, overwriting any existing `to`.
    Rename { from: String, to: String },
    /// Replace `into` with the sum of `from`, removing every source.
    Merge { from: Vec<String>, into: String },
    /// Remove a row that isn't a region.
    Drop { name: String },
    /// The source's own total row becomes `total`.
    PromoteTotal { label: String },
    /// `total` becomes the sum of every other entry.
    ComputeTotal,
}

/// How a jurisdiction arrives at its `total` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TotalPolicy {
    Computed,
    Literal(String),
    /// Precinct sources sum their apportioned regions themselves.
    Apportioned,
    Absent,
}

impl TotalPolicy {
    /// The last step that touches `total` decides.
    pub fn from_steps(steps: &[Step]) -> Self {
        steps
            .iter()
            .rev()
            .find_map(|step| match step {
                Step::ComputeTotal => Some(TotalPolicy::Computed),
                Step::PromoteTotal { label } => Some(TotalPolicy::Literal(label.clone())),
                Step::Rename { from, to } if to == TOTAL_KEY => {
                    Some(TotalPolicy::Literal(from.clone()))
                }
                _ => None,
            })
            .unwrap_or(TotalPolicy::Absent)
    }
}

impl Step {
    pub fn apply(&self, mut tally: Tally) -> Result<Tally, ExtractionError> {
        match self {
            Step::Rename { from, to } => match tally.remove(from) {
                Some(count) => tally.insert(to.as_str(), count),
                None => warn!(%from, %to, "rename source missing; left unchanged"),
            },
            Step::Merge { from, into } => {
                let mut sum = 0;
                for name in from {
                    sum += tally
                        .remove(name)
                        .ok_or_else(|| ExtractionError::MissingMergeSource { name: name.clone() })?;
                }
                tally.insert(into.as_str(), sum);
            }
            Step::Drop { name } => {
                if tally.remove(name).is_none() {
                    debug!(%name, "drop target not present");
                }
            }
            Step::PromoteTotal { label } => {
                let count = tally
                    .remove(label)
                    .ok_or_else(|| ExtractionError::MissingTotalRow { label: label.clone() })?;
                tally.insert(TOTAL_KEY, count);
                let listed = tally.region_sum();
                if listed != count {
                    // trusted as published; unlisted categories make up the gap
                    debug!(%label, literal = count, listed, "literal total differs from listed regions");
                }
            }
            Step::ComputeTotal => {
                let sum = tally.region_sum();
                tally.insert(TOTAL_KEY, sum);
            }
        }
        Ok(tally)
    }
}

/// Run `steps` in order.
pub fn apply_steps(tally: Tally, steps: &[Step]) -> Result<Tally, ExtractionError> {
    steps.iter().try_fold(tally, |t, step| step.apply(t))
}
