use crate::core::duplicate::{canonical, DuplicateGroup, DuplicateSummary};
use crate::database::has_column;
use crate::database::models::{AssetRecord, NewAssetRecord};
use crate::error::{EngineError, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// Access to the `files` relation.
pub struct FileRepository {
    conn: Connection,
    columns: &'static str,
}

impl FileRepository {
    /// Wrap a connection. Read-only connections may point at a legacy table
    /// without `file_size`; such rows load with a size of 0.
    pub fn new(conn: Connection) -> Self {
        let columns = match has_column(&conn, "files", "file_size") {
            Ok(false) => AssetRecord::LEGACY_COLUMNS,
            _ => AssetRecord::COLUMNS,
        };
        Self { conn, columns }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn insert(&self, record: &NewAssetRecord) -> Result<AssetRecord> {
        self.conn.execute(
            "INSERT INTO files (user_id, filename, file_hash, created_at, file_size)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.owner,
                record.filename,
                record.file_hash,
                record.created_at.to_rfc3339(),
                record.file_size,
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        self.find_by_id(id)?
            .ok_or(EngineError::Persistence(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<AssetRecord>> {
        let sql = format!("SELECT {} FROM files WHERE id = ?1", self.columns);
        let record = self
            .conn
            .query_row(&sql, params![id], AssetRecord::from_row)
            .optional()?;
        Ok(record)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Distinct owner scopes present in the table.
    pub fn owners(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT user_id FROM files ORDER BY user_id")?;
        let owners = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(owners)
    }

    /// Filenames recorded for an owner, one entry per row.
    pub fn filenames_by_owner(&self, owner: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT filename FROM files WHERE user_id = ?1 ORDER BY filename")?;
        let names = stmt
            .query_map(params![owner], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn find_by_owner(&self, owner: &str) -> Result<Vec<AssetRecord>> {
        let sql = format!(
            "SELECT {} FROM files WHERE user_id = ?1 ORDER BY filename, id",
            self.columns
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![owner], AssetRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn find_all(&self) -> Result<Vec<AssetRecord>> {
        let sql = format!(
            "SELECT {} FROM files ORDER BY user_id, filename, id",
            self.columns
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], AssetRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// (owner, filename) pairs that map to more than one record.
    pub fn find_duplicate_names(&self) -> Result<Vec<DuplicateSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, filename, COUNT(*) AS count
             FROM files
             GROUP BY user_id, filename
             HAVING count > 1
             ORDER BY user_id, filename",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok(DuplicateSummary {
                    owner: row.get(0)?,
                    filename: row.get(1)?,
                    count: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Every record that belongs to a duplicate group.
    pub fn find_duplicate_records(&self) -> Result<Vec<AssetRecord>> {
        let sql = format!(
            "SELECT {} FROM files
             WHERE (user_id, filename) IN (
                 SELECT user_id, filename FROM files
                 GROUP BY user_id, filename
                 HAVING COUNT(*) > 1
             )
             ORDER BY user_id, filename, id",
            self.columns
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], AssetRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Remove the non-canonical records of one group in a single IMMEDIATE
    /// transaction.
    ///
    /// The group is re-read inside the transaction. If its canonical record
    /// differs from the plan, a planned record is already gone, or any
    /// statement fails, the transaction rolls back and the group is reported
    /// as a conflict with nothing deleted.
    pub fn delete_group(&mut self, group: &DuplicateGroup) -> Result<usize> {
        let conflict = |reason: String| EngineError::DuplicateGroupConflict {
            owner: group.owner.clone(),
            filename: group.filename.clone(),
            reason,
        };

        let sql = format!(
            "SELECT {} FROM files WHERE user_id = ?1 AND filename = ?2",
            self.columns
        );
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| conflict(format!("could not start transaction: {}", e)))?;

        let current = {
            let mut stmt = tx.prepare(&sql).map_err(|e| conflict(e.to_string()))?;
            let rows = stmt
                .query_map(params![group.owner, group.filename], AssetRecord::from_row)
                .map_err(|e| conflict(e.to_string()))?;
            let records: Vec<AssetRecord> = rows
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| conflict(e.to_string()))?;
            records
        };

        match canonical(&current) {
            Some(keep) if keep.id == group.keep.id => {}
            Some(keep) => {
                return Err(conflict(format!(
                    "canonical record changed from {} to {}",
                    group.keep.id, keep.id
                )))
            }
            None => return Err(conflict("group no longer exists".to_string())),
        }

        let mut deleted = 0;
        for id in group.remove_ids() {
            let affected = tx
                .execute(
                    "DELETE FROM files WHERE id = ?1 AND user_id = ?2 AND filename = ?3",
                    params![id, group.owner, group.filename],
                )
                .map_err(|e| conflict(format!("deleting record {}: {}", id, e)))?;
            if affected != 1 {
                return Err(conflict(format!("record {} was already removed", id)));
            }
            deleted += affected;
        }

        tx.commit()
            .map_err(|e| conflict(format!("commit failed: {}", e)))?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::duplicate::plan_groups;
    use crate::database::{open_in_memory, open_or_create, open_read_only};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn new_record(owner: &str, filename: &str, secs: i64) -> NewAssetRecord {
        NewAssetRecord {
            owner: owner.to_string(),
            filename: filename.to_string(),
            file_hash: Some("838383c1c1c0fc3c".to_string()),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            file_size: 2048,
        }
    }

    fn repo() -> FileRepository {
        FileRepository::new(open_in_memory().unwrap())
    }

    #[test]
    fn test_insert_and_find() {
        let repo = repo();
        let record = repo.insert(&new_record("dev", "IMG_1.JPG", 100)).unwrap();

        assert!(record.id > 0);
        assert_eq!(record.owner, "dev");
        assert_eq!(record.created_at.timestamp(), 100);
        assert_eq!(repo.find_by_id(record.id).unwrap(), Some(record));
        assert_eq!(repo.find_by_id(9999).unwrap(), None);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_owners_and_filenames() {
        let repo = repo();
        repo.insert(&new_record("tablet", "b.jpg", 1)).unwrap();
        repo.insert(&new_record("phone", "a.jpg", 1)).unwrap();
        repo.insert(&new_record("phone", "a.jpg", 2)).unwrap();

        assert_eq!(repo.owners().unwrap(), vec!["phone", "tablet"]);
        assert_eq!(repo.filenames_by_owner("phone").unwrap(), vec!["a.jpg", "a.jpg"]);
        assert_eq!(repo.find_by_owner("tablet").unwrap().len(), 1);
        assert_eq!(repo.find_all().unwrap().len(), 3);
    }

    #[test]
    fn test_duplicate_queries() {
        let repo = repo();
        repo.insert(&new_record("phone", "a.jpg", 1)).unwrap();
        repo.insert(&new_record("phone", "a.jpg", 2)).unwrap();
        repo.insert(&new_record("phone", "b.jpg", 1)).unwrap();
        repo.insert(&new_record("tablet", "a.jpg", 1)).unwrap();

        let names = repo.find_duplicate_names().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].owner, "phone");
        assert_eq!(names[0].count, 2);

        let records = repo.find_duplicate_records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.filename == "a.jpg" && r.owner == "phone"));
    }

    #[test]
    fn test_delete_group_keeps_canonical() {
        let mut repo = repo();
        let old = repo.insert(&new_record("dev", "f1", 1)).unwrap();
        let new = repo.insert(&new_record("dev", "f1", 2)).unwrap();

        let groups = plan_groups(&repo.find_duplicate_records().unwrap());
        assert_eq!(groups.len(), 1);

        let deleted = repo.delete_group(&groups[0]).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.find_by_id(old.id).unwrap(), None);
        assert!(repo.find_by_id(new.id).unwrap().is_some());
        assert!(repo.find_duplicate_names().unwrap().is_empty());
    }

    #[test]
    fn test_delete_group_rolls_back_on_failure() {
        let mut repo = repo();
        let a = repo.insert(&new_record("dev", "f1", 1)).unwrap();
        let b = repo.insert(&new_record("dev", "f1", 2)).unwrap();
        let c = repo.insert(&new_record("dev", "f1", 3)).unwrap();

        // Deleting `a` succeeds first; deleting `b` is then refused mid-group.
        repo.connection()
            .execute_batch(&format!(
                "CREATE TRIGGER block_delete BEFORE DELETE ON files
                 WHEN OLD.id = {}
                 BEGIN SELECT RAISE(ABORT, 'record is locked'); END;",
                b.id
            ))
            .unwrap();

        let mut groups = plan_groups(&repo.find_duplicate_records().unwrap());
        let group = groups.remove(0);
        assert_eq!(group.keep.id, c.id);
        // Force `a` to be attempted before `b`.
        let group = DuplicateGroup {
            remove: vec![a.clone(), b.clone()],
            ..group
        };

        let result = repo.delete_group(&group);
        assert!(matches!(
            result,
            Err(EngineError::DuplicateGroupConflict { .. })
        ));
        assert_eq!(repo.filenames_by_owner("dev").unwrap().len(), 3);
        assert!(repo.find_by_id(a.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_group_detects_changed_canonical() {
        let mut repo = repo();
        repo.insert(&new_record("dev", "f1", 1)).unwrap();
        repo.insert(&new_record("dev", "f1", 2)).unwrap();
        let groups = plan_groups(&repo.find_duplicate_records().unwrap());

        // A newer upload lands between planning and cleanup.
        repo.insert(&new_record("dev", "f1", 3)).unwrap();

        assert!(matches!(
            repo.delete_group(&groups[0]),
            Err(EngineError::DuplicateGroupConflict { .. })
        ));
        assert_eq!(repo.filenames_by_owner("dev").unwrap().len(), 3);
    }

    #[test]
    fn test_delete_group_after_another_run_removed_a_record() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("backup.db");
        let mut first = FileRepository::new(open_or_create(&db_path).unwrap());
        let second = FileRepository::new(open_or_create(&db_path).unwrap());

        let oldest = first.insert(&new_record("dev", "f1", 1)).unwrap();
        let middle = first.insert(&new_record("dev", "f1", 2)).unwrap();
        let newest = first.insert(&new_record("dev", "f1", 3)).unwrap();
        let groups = plan_groups(&first.find_duplicate_records().unwrap());
        assert_eq!(groups[0].remove_ids(), vec![middle.id, oldest.id]);

        // The other run removes the last planned record; `middle` is deleted
        // first here and must come back when the group rolls back.
        second
            .connection()
            .execute("DELETE FROM files WHERE id = ?1", params![oldest.id])
            .unwrap();

        let result = first.delete_group(&groups[0]);
        assert!(matches!(
            result,
            Err(EngineError::DuplicateGroupConflict { ref reason, .. })
                if reason.contains("already removed")
        ));
        assert!(first.find_by_id(middle.id).unwrap().is_some());
        assert!(first.find_by_id(newest.id).unwrap().is_some());
        assert_eq!(second.count().unwrap(), 2);
    }

    #[test]
    fn test_created_at_formats_and_bad_rows() {
        let repo = repo();
        repo.connection()
            .execute(
                "INSERT INTO files (user_id, filename, created_at)
                 VALUES ('dev', 'int.jpg', 1700000000)",
                [],
            )
            .unwrap();
        let loaded = repo.find_by_owner("dev").unwrap();
        assert_eq!(loaded[0].created_at.timestamp(), 1_700_000_000);

        repo.connection()
            .execute(
                "INSERT INTO files (user_id, filename, created_at)
                 VALUES ('dev', 'bad.jpg', 'last week')",
                [],
            )
            .unwrap();
        let bad_id = repo.connection().last_insert_rowid();

        let message = repo.find_all().unwrap_err().to_string();
        assert!(message.contains(&format!("record {}", bad_id)), "{}", message);
        assert!(message.contains("last week"), "{}", message);
    }

    #[test]
    fn test_read_only_repository_on_legacy_table() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("backup.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    filename TEXT NOT NULL,
                    file_hash TEXT,
                    created_at TEXT NOT NULL
                );
                INSERT INTO files (user_id, filename, created_at)
                VALUES ('dev', 'a.jpg', '2024-01-01 00:00:00');",
            )
            .unwrap();
        }

        let repo = FileRepository::new(open_read_only(&db_path).unwrap());
        let records = repo.find_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_size, 0);
        assert!(!has_column(repo.connection(), "files", "file_size").unwrap());
    }
}
