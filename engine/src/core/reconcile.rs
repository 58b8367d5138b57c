//! Filename-keyed diff of a device inventory against the server listing.
//!
//! Two different files sharing a name are indistinguishable here, and a
//! rename shows up as one upload plus one download. `suspect_conflicts`
//! points at the first case when both sides carry fingerprints.

use crate::core::fingerprint::Fingerprint;
use crate::core::similarity::{SimilarityClass, SimilarityComparator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub filename: String,
    #[serde(default, alias = "file_hash")]
    pub hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time snapshot of one owner scope's assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub owner: String,
    #[serde(alias = "files")]
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(owner: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            owner: owner.into(),
            entries,
        }
    }

    /// One entry per filename; repeated names keep the newest entry.
    fn by_filename(&self) -> BTreeMap<&str, &CatalogEntry> {
        let mut map: BTreeMap<&str, &CatalogEntry> = BTreeMap::new();
        for entry in &self.entries {
            map.entry(entry.filename.as_str())
                .and_modify(|current| {
                    if entry.created_at > current.created_at {
                        *current = entry;
                    }
                })
                .or_insert(entry);
        }
        map
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// Local entries missing remotely, oldest first.
    pub to_upload: Vec<CatalogEntry>,
    /// Remote entries missing locally, by filename.
    pub to_download: Vec<CatalogEntry>,
    pub synchronized: usize,
    /// Filenames present on both sides whose fingerprints disagree.
    pub suspect_conflicts: Vec<String>,
}

impl ReconciliationPlan {
    pub fn upload_filenames(&self) -> Vec<&str> {
        self.to_upload.iter().map(|e| e.filename.as_str()).collect()
    }

    pub fn download_filenames(&self) -> Vec<&str> {
        self.to_download.iter().map(|e| e.filename.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    comparator: SimilarityComparator,
}

impl Reconciler {
    pub fn new(comparator: SimilarityComparator) -> Self {
        Self { comparator }
    }

    pub fn reconcile(&self, local: &Catalog, remote: &Catalog) -> ReconciliationPlan {
        let local_names = local.by_filename();
        let remote_names = remote.by_filename();

        let mut to_upload = Vec::new();
        let mut synchronized = 0;
        let mut suspect_conflicts = Vec::new();

        for (name, entry) in &local_names {
            match remote_names.get(name) {
                None => to_upload.push((*entry).clone()),
                Some(remote_entry) => {
                    synchronized += 1;
                    if self.contents_differ(entry, remote_entry) {
                        suspect_conflicts.push((*name).to_string());
                    }
                }
            }
        }

        // BTreeMap iteration is already by filename, so a stable sort on the
        // timestamp keeps equal timestamps in filename order.
        to_upload.sort_by_key(|e| e.created_at);

        let to_download = remote_names
            .iter()
            .filter(|(name, _)| !local_names.contains_key(*name))
            .map(|(_, entry)| (*entry).clone())
            .collect();

        ReconciliationPlan {
            to_upload,
            to_download,
            synchronized,
            suspect_conflicts,
        }
    }

    fn contents_differ(&self, local: &CatalogEntry, remote: &CatalogEntry) -> bool {
        let parse = |hash: &Option<String>| {
            hash.as_deref()
                .and_then(|h| h.parse::<Fingerprint>().ok())
        };
        match (parse(&local.hash), parse(&remote.hash)) {
            (Some(a), Some(b)) => {
                self.comparator.compare(&a, &b).class == SimilarityClass::Distinct
            }
            _ => false,
        }
    }
}

/// Reconcile with the default comparator.
pub fn reconcile(local: &Catalog, remote: &Catalog) -> ReconciliationPlan {
    Reconciler::default().reconcile(local, remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(filename: &str, secs: i64) -> CatalogEntry {
        CatalogEntry {
            filename: filename.to_string(),
            hash: None,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn hashed(filename: &str, secs: i64, hash: &str) -> CatalogEntry {
        CatalogEntry {
            hash: Some(hash.to_string()),
            ..entry(filename, secs)
        }
    }

    #[test]
    fn test_reconcile_basic_diff() {
        let local = Catalog::new("device", vec![entry("a", 1), entry("b", 2)]);
        let remote = Catalog::new("device", vec![entry("b", 2), entry("c", 3)]);

        let plan = reconcile(&local, &remote);
        assert_eq!(plan.upload_filenames(), vec!["a"]);
        assert_eq!(plan.download_filenames(), vec!["c"]);
        assert_eq!(plan.synchronized, 1);
        assert!(plan.suspect_conflicts.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let local = Catalog::new("d", vec![entry("x", 5), entry("y", 1), entry("z", 3)]);
        let remote = Catalog::new("d", vec![entry("y", 1), entry("w", 9)]);

        let first = reconcile(&local, &remote);
        let second = reconcile(&local, &remote);
        assert_eq!(first, second);
    }

    #[test]
    fn test_uploads_are_chronological_then_by_name() {
        let local = Catalog::new(
            "d",
            vec![
                entry("IMG_0003.JPG", 30),
                entry("IMG_0002.JPG", 10),
                entry("IMG_0001.JPG", 20),
                entry("B.MOV", 10),
            ],
        );

        let plan = reconcile(&local, &Catalog::default());
        assert_eq!(
            plan.upload_filenames(),
            vec!["B.MOV", "IMG_0002.JPG", "IMG_0001.JPG", "IMG_0003.JPG"]
        );
    }

    #[test]
    fn test_empty_catalogs_give_empty_plan() {
        let plan = reconcile(&Catalog::default(), &Catalog::default());
        assert!(plan.is_empty());
        assert_eq!(plan.synchronized, 0);
    }

    #[test]
    fn test_repeated_filename_counts_once() {
        let local = Catalog::new("d", vec![entry("a", 1), entry("a", 7)]);
        let plan = reconcile(&local, &Catalog::default());
        assert_eq!(plan.to_upload.len(), 1);
        assert_eq!(plan.to_upload[0].created_at.timestamp(), 7);

        let remote = Catalog::new("d", vec![entry("a", 2)]);
        let plan = reconcile(&local, &remote);
        assert!(plan.is_empty());
        assert_eq!(plan.synchronized, 1);
    }

    #[test]
    fn test_distinct_fingerprints_flag_suspect_conflict() {
        let local = Catalog::new(
            "d",
            vec![
                hashed("same.jpg", 1, "838383c1c1c0fc3c"),
                hashed("clash.jpg", 2, "0000000000000000"),
                hashed("legacy.jpg", 3, "not-a-fingerprint"),
            ],
        );
        let remote = Catalog::new(
            "d",
            vec![
                hashed("same.jpg", 1, "83838383c1c0fc3c"),
                hashed("clash.jpg", 2, "ffffffffffffffff"),
                hashed("legacy.jpg", 3, "0000000000000000"),
            ],
        );

        let plan = reconcile(&local, &remote);
        assert!(plan.is_empty());
        assert_eq!(plan.synchronized, 3);
        assert_eq!(plan.suspect_conflicts, vec!["clash.jpg".to_string()]);
    }

    #[test]
    fn test_catalog_reads_server_listing_json() {
        let json = r#"{
            "files": [
                {"filename": "IMG_1.JPG", "file_hash": "838383c1c1c0fc3c", "created_at": "2024-05-01T10:00:00Z"},
                {"filename": "IMG_2.JPG", "created_at": "2024-05-02T10:00:00Z"}
            ]
        }"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.entries.len(), 2);
        assert_eq!(catalog.entries[0].hash.as_deref(), Some("838383c1c1c0fc3c"));
        assert!(catalog.entries[1].hash.is_none());
    }
}
