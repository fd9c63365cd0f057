// Dashboard views over the stored records: name search and tier counts

use crate::classify::Classification;
use crate::db::Household;
use serde::Serialize;
use std::collections::HashSet;

/// Case-insensitive substring match on the name; empty query keeps everything
pub fn filter_by_name(records: &[Household], query: &str) -> Vec<Household> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|h| h.name.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

/// Unique names in first-seen order (delete picker)
pub fn distinct_names(records: &[Household]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|h| seen.insert(h.name.as_str()))
        .map(|h| h.name.clone())
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub total: usize,
    pub poor: usize,
    pub middle: usize,
    pub wealthy: usize,
}

impl TierCounts {
    pub fn from_records(records: &[Household]) -> Self {
        let mut counts = TierCounts::default();

        for h in records {
            counts.total += 1;
            match h.classification {
                Classification::Poor => counts.poor += 1,
                Classification::Middle => counts.middle += 1,
                Classification::Wealthy => counts.wealthy += 1,
            }
        }

        counts
    }
}
