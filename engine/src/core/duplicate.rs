// Duplicate record grouping within owner scopes.
// The newest record of a (owner, filename) group is canonical; ties go to the
// highest id so that every run picks the same survivor.

use crate::database::models::AssetRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub owner: String,
    pub filename: String,
    pub keep: AssetRecord,
    pub remove: Vec<AssetRecord>,
}

impl DuplicateGroup {
    pub fn record_count(&self) -> usize {
        self.remove.len() + 1
    }

    pub fn remove_ids(&self) -> Vec<i64> {
        self.remove.iter().map(|r| r.id).collect()
    }
}

/// Summary of a (owner, filename) pair that still maps to several records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSummary {
    pub owner: String,
    pub filename: String,
    pub count: usize,
}

/// Pick the canonical record of a group, or `None` for an empty slice.
pub fn canonical(records: &[AssetRecord]) -> Option<&AssetRecord> {
    records.iter().max_by_key(|r| (r.created_at, r.id))
}

/// Group records by owner and filename and plan the removal of every
/// non-canonical record. Groups come back ordered by owner, then filename.
pub fn plan_groups(records: &[AssetRecord]) -> Vec<DuplicateGroup> {
    group_by_name(records)
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .filter_map(|((owner, filename), members)| {
            let keep = canonical(&members)?.clone();
            let mut remove: Vec<AssetRecord> =
                members.into_iter().filter(|r| r.id != keep.id).collect();
            remove.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Some(DuplicateGroup {
                owner,
                filename,
                keep,
                remove,
            })
        })
        .collect()
}

/// Every (owner, filename) pair with more than one record.
pub fn find_remaining(records: &[AssetRecord]) -> Vec<DuplicateSummary> {
    group_by_name(records)
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((owner, filename), members)| DuplicateSummary {
            owner,
            filename,
            count: members.len(),
        })
        .collect()
}

fn group_by_name(records: &[AssetRecord]) -> BTreeMap<(String, String), Vec<AssetRecord>> {
    let mut groups: BTreeMap<(String, String), Vec<AssetRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.owner.clone(), record.filename.clone()))
            .or_default()
            .push(record.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: i64, owner: &str, filename: &str, secs: i64) -> AssetRecord {
        AssetRecord {
            id,
            owner: owner.to_string(),
            filename: filename.to_string(),
            file_hash: Some(format!("{:016x}", id)),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            file_size: 1024,
        }
    }

    #[test]
    fn test_latest_record_is_canonical() {
        let records = vec![record(1, "dev", "f1", 1), record(2, "dev", "f1", 2)];

        let groups = plan_groups(&records);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].keep.id, 2);
        assert_eq!(groups[0].remove_ids(), vec![1]);
        assert_eq!(groups[0].record_count(), 2);

        let survivors: Vec<AssetRecord> = records
            .into_iter()
            .filter(|r| !groups[0].remove_ids().contains(&r.id))
            .collect();
        assert!(find_remaining(&survivors).is_empty());
    }

    #[test]
    fn test_ties_prefer_highest_id() {
        let records = vec![
            record(7, "dev", "f", 5),
            record(9, "dev", "f", 5),
            record(8, "dev", "f", 1),
        ];
        let groups = plan_groups(&records);
        assert_eq!(groups[0].keep.id, 9);
        assert_eq!(groups[0].remove_ids(), vec![7, 8]);
    }

    #[test]
    fn test_same_filename_in_different_scopes_is_not_a_duplicate() {
        let records = vec![
            record(1, "phone", "IMG_1.JPG", 1),
            record(2, "tablet", "IMG_1.JPG", 2),
            record(3, "phone", "IMG_2.JPG", 3),
        ];
        assert!(plan_groups(&records).is_empty());
        assert!(find_remaining(&records).is_empty());
    }

    #[test]
    fn test_find_remaining_counts_members() {
        let records = vec![
            record(1, "dev", "a", 1),
            record(2, "dev", "a", 2),
            record(3, "dev", "a", 3),
            record(4, "dev", "b", 1),
        ];
        let remaining = find_remaining(&records);
        assert_eq!(
            remaining,
            vec![DuplicateSummary {
                owner: "dev".to_string(),
                filename: "a".to_string(),
                count: 3,
            }]
        );
    }
}
