// src/aggregate.rs

use crate::resolve::{ResolvedJurisdiction, ResolvedRecord};

/// Every jurisdiction's resolved records, in jurisdiction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalDataset {
    jurisdictions: Vec<ResolvedJurisdiction>,
}

impl FinalDataset {
    pub fn jurisdictions(&self) -> &[ResolvedJurisdiction] {
        &self.jurisdictions
    }

    pub fn len(&self) -> usize {
        self.jurisdictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jurisdictions.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.jurisdictions.iter().map(|j| j.records.len()).sum()
    }

    /// `(jurisdiction code, record)` pairs, flattened in output order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &ResolvedRecord)> {
        self.jurisdictions
            .iter()
            .flat_map(|j| j.records.iter().map(move |r| (j.code.as_str(), r)))
    }

    /// Names that went out keyed by name, per jurisdiction.
    pub fn unresolved(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.jurisdictions
            .iter()
            .filter(|j| !j.unresolved.is_empty())
            .map(|j| (j.code.as_str(), j.unresolved.as_slice()))
    }
}

impl FromIterator<ResolvedJurisdiction> for FinalDataset {
    fn from_iter<I: IntoIterator<Item = ResolvedJurisdiction>>(iter: I) -> Self {
        Self {
            jurisdictions: iter.into_iter().collect(),
        }
    }
}

/// Fold resolved jurisdictions into the dataset, keeping their order.
pub fn aggregate(resolved: Vec<ResolvedJurisdiction>) -> FinalDataset {
    resolved.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jurisdiction(code: &str, ids: &[&str], unresolved: &[&str]) -> ResolvedJurisdiction {
        ResolvedJurisdiction {
            code: code.into(),
            records: ids
                .iter()
                .map(|id| ResolvedRecord {
                    region_id: id.to_string(),
                    name: id.to_string(),
                    count: 1,
                })
                .collect(),
            unresolved: unresolved.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn aggregation_preserves_both_orders() {
        let ds = aggregate(vec![
            jurisdiction("56", &["56", "56001"], &[]),
            jurisdiction("01", &["01", "01003", "01001"], &["nowhere"]),
        ]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.record_count(), 5);
        let flat: Vec<_> = ds.records().map(|(j, r)| (j, r.region_id.as_str())).collect();
        assert_eq!(
            flat,
            vec![
                ("56", "56"),
                ("56", "56001"),
                ("01", "01"),
                ("01", "01003"),
                ("01", "01001")
            ]
        );
        let unresolved: Vec<_> = ds.unresolved().map(|(j, _)| j).collect();
        assert_eq!(unresolved, vec!["01"]);
    }
}
