//! Merging incoming records into a dataset.

use crate::types::dataset::Dataset;
use crate::types::job::JobRecord;

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub dataset: Dataset,
    /// Incoming records appended
    pub added: usize,
    /// Incoming records dropped because their `job_id` was already present
    pub duplicates: usize,
}

/// Merge `incoming` into `existing`, keyed by `job_id`.
///
/// Existing records win, so a posting keeps its first-seen `scraped_at`.
/// New records are appended in incoming order and the result stays ordered by
/// `scraped_at`.
pub fn merge(existing: Dataset, incoming: impl IntoIterator<Item = JobRecord>) -> MergeOutcome {
    let mut dataset = existing;
    let mut added = 0;
    let mut duplicates = 0;

    for record in incoming {
        if dataset.push_unique(record) {
            added += 1;
        } else {
            duplicates += 1;
        }
    }
    dataset.restore_order();

    MergeOutcome {
        dataset,
        added,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::job_record;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_merge_into_empty() {
        let outcome = merge(
            Dataset::new(),
            vec![job_record("a", "Toronto", 0), job_record("b", "Toronto", 1)],
        );

        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(outcome.dataset.len(), 2);
    }

    #[test]
    fn test_existing_record_wins() {
        let existing = Dataset::from_records([job_record("a", "Toronto", 0)]);
        let mut later = job_record("a", "Toronto", 60);
        later.title = "Renamed".to_string();

        let outcome = merge(existing, vec![later, job_record("b", "Toronto", 61)]);

        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.duplicates, 1);
        let first = &outcome.dataset.records()[0];
        assert_eq!(first.job_id, "a");
        assert_eq!(first.title, "Software Engineer");
        assert_eq!(first.scraped_at, job_record("a", "Toronto", 0).scraped_at);
    }

    #[test]
    fn test_out_of_order_incoming_is_sorted() {
        let existing = Dataset::from_records([job_record("a", "Toronto", 10)]);
        let outcome = merge(existing, vec![job_record("b", "Toronto", 5)]);

        let ids: Vec<&str> = outcome.dataset.records().iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    fn batch() -> impl Strategy<Value = Vec<JobRecord>> {
        prop::collection::vec((0u8..20, 0i64..500), 0..30).prop_map(|items| {
            items
                .into_iter()
                .map(|(id, minute)| job_record(&format!("job-{id}"), "Toronto", minute))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_merge_is_union_with_first_seen_timestamps(a in batch(), b in batch()) {
            let once = merge(Dataset::new(), a.clone());
            let twice = merge(once.dataset, b.clone());

            let mut first_seen: HashMap<String, JobRecord> = HashMap::new();
            for record in a.iter().chain(b.iter()) {
                first_seen.entry(record.job_id.clone()).or_insert_with(|| record.clone());
            }

            prop_assert_eq!(twice.dataset.len(), first_seen.len());
            for record in twice.dataset.records() {
                prop_assert_eq!(record.scraped_at, first_seen[&record.job_id].scraped_at);
            }

            let ordered = twice
                .dataset
                .records()
                .windows(2)
                .all(|pair| pair[0].scraped_at <= pair[1].scraped_at);
            prop_assert!(ordered);
        }

        #[test]
        fn prop_merge_is_idempotent(a in batch()) {
            let once = merge(Dataset::new(), a.clone());
            let again = merge(once.dataset.clone(), a);

            prop_assert_eq!(again.added, 0);
            prop_assert_eq!(again.dataset, once.dataset);
        }
    }
}
