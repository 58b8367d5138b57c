use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Disagreement between the record store and the upload directory.
///
/// Violations are reported, never repaired automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    CountMismatch { db_count: usize, disk_count: usize },
    OrphanFile { filename: String },
    OrphanRecord { filename: String },
    DuplicateRecords { filename: String, count: usize },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch {
                db_count,
                disk_count,
            } => write!(
                f,
                "DB has {} entries, filesystem has {} files (difference {})",
                db_count,
                disk_count,
                db_count.abs_diff(*disk_count)
            ),
            Self::OrphanFile { filename } => write!(f, "file without record: {}", filename),
            Self::OrphanRecord { filename } => write!(f, "record without file: {}", filename),
            Self::DuplicateRecords { filename, count } => {
                write!(f, "{} has {} records", filename, count)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateName {
    pub filename: String,
    pub count: usize,
}

/// Integrity of one owner scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub owner: String,
    pub db_count: usize,
    pub disk_count: usize,
    pub orphan_files: Vec<String>,
    pub orphan_records: Vec<String>,
    pub duplicate_groups: Vec<DuplicateName>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.violations().is_empty()
    }

    pub fn violations(&self) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();
        if self.db_count != self.disk_count {
            violations.push(IntegrityViolation::CountMismatch {
                db_count: self.db_count,
                disk_count: self.disk_count,
            });
        }
        violations.extend(
            self.orphan_files
                .iter()
                .map(|f| IntegrityViolation::OrphanFile { filename: f.clone() }),
        );
        violations.extend(
            self.orphan_records
                .iter()
                .map(|f| IntegrityViolation::OrphanRecord { filename: f.clone() }),
        );
        violations.extend(self.duplicate_groups.iter().map(|d| {
            IntegrityViolation::DuplicateRecords {
                filename: d.filename.clone(),
                count: d.count,
            }
        }));
        violations
    }
}

/// Compare the filenames recorded for a scope (one entry per row) with the
/// filenames found in the scope's directory.
pub fn check_scope<S: AsRef<str>>(
    owner: &str,
    db_filenames: &[S],
    disk_filenames: &[S],
) -> IntegrityReport {
    let mut recorded: BTreeMap<&str, usize> = BTreeMap::new();
    for name in db_filenames {
        *recorded.entry(name.as_ref()).or_default() += 1;
    }
    let on_disk: BTreeSet<&str> = disk_filenames.iter().map(|n| n.as_ref()).collect();

    let orphan_files = on_disk
        .iter()
        .filter(|name| !recorded.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    let orphan_records = recorded
        .keys()
        .filter(|name| !on_disk.contains(*name))
        .map(|name| name.to_string())
        .collect();
    let duplicate_groups = recorded
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(name, count)| DuplicateName {
            filename: name.to_string(),
            count: *count,
        })
        .collect();

    IntegrityReport {
        owner: owner.to_string(),
        db_count: db_filenames.len(),
        disk_count: disk_filenames.len(),
        orphan_files,
        orphan_records,
        duplicate_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}.jpg", prefix, i)).collect()
    }

    #[test]
    fn test_extra_file_on_disk() {
        let db = names("IMG_", 5);
        let mut disk = names("IMG_", 5);
        disk.push("stray.jpg".to_string());

        let report = check_scope("device-1", &db, &disk);
        assert_eq!(report.db_count, 5);
        assert_eq!(report.disk_count, 6);
        assert_eq!(report.orphan_files, vec!["stray.jpg".to_string()]);
        assert!(report.orphan_records.is_empty());
        assert!(!report.is_consistent());
        assert_eq!(
            report.violations(),
            vec![
                IntegrityViolation::CountMismatch {
                    db_count: 5,
                    disk_count: 6
                },
                IntegrityViolation::OrphanFile {
                    filename: "stray.jpg".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_one_to_one_match() {
        let db = names("IMG_", 4);
        let disk = names("IMG_", 4);

        let report = check_scope("device-1", &db, &disk);
        assert_eq!(report.db_count, report.disk_count);
        assert!(report.orphan_files.is_empty());
        assert!(report.orphan_records.is_empty());
        assert!(report.is_consistent());
    }

    #[test]
    fn test_missing_file_and_duplicate_rows() {
        let db = vec!["a.jpg", "a.jpg", "b.jpg"];
        let disk = vec!["a.jpg"];

        let report = check_scope("d", &db, &disk);
        assert_eq!(report.db_count, 3);
        assert_eq!(report.disk_count, 1);
        assert_eq!(report.orphan_records, vec!["b.jpg".to_string()]);
        assert_eq!(
            report.duplicate_groups,
            vec![DuplicateName {
                filename: "a.jpg".to_string(),
                count: 2
            }]
        );
    }

    #[test]
    fn test_empty_scope_is_consistent() {
        let empty: Vec<String> = Vec::new();
        assert!(check_scope("d", &empty, &empty).is_consistent());
    }
}
