use crate::config::StorageConfig;
use crate::core::integrity::{check_scope, IntegrityReport};
use crate::database::{self, repositories::FileRepository};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Integrity of the whole store: every owner scope found in the database or
/// in the upload directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreIntegrityReport {
    pub upload_dir: PathBuf,
    pub db_path: PathBuf,
    pub db_total: usize,
    pub disk_total: usize,
    pub scopes: Vec<IntegrityReport>,
}

impl StoreIntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.scopes.iter().all(IntegrityReport::is_consistent)
    }

    pub fn violation_count(&self) -> usize {
        self.scopes.iter().map(|s| s.violations().len()).sum()
    }
}

pub struct IntegrityService<'a> {
    config: &'a StorageConfig,
}

impl<'a> IntegrityService<'a> {
    pub fn new(config: &'a StorageConfig) -> Self {
        Self { config }
    }

    /// Compare every scope's records with its directory. The database is
    /// opened read-only and its schema is left as found.
    pub fn run(&self) -> Result<StoreIntegrityReport> {
        self.config.ensure_available()?;
        let repo = FileRepository::new(database::open_read_only(&self.config.db_path)?);

        let db_owners = repo.owners()?;
        let disk_owners = list_entries(&self.config.upload_dir, EntryKind::Directory)?;
        let owners: BTreeSet<String> = db_owners.into_iter().chain(disk_owners).collect();
        log::info!(
            "checking {} owner scope(s) under {}",
            owners.len(),
            self.config.upload_dir.display()
        );

        let mut scopes = Vec::with_capacity(owners.len());
        for owner in &owners {
            let recorded = repo.filenames_by_owner(owner)?;
            let owner_dir = self.config.owner_dir(owner);
            let on_disk = if owner_dir.is_dir() {
                list_entries(&owner_dir, EntryKind::File)?
            } else {
                log::warn!("no upload directory for owner {}", owner);
                Vec::new()
            };

            let report = check_scope(owner, &recorded, &on_disk);
            log::debug!(
                "{}: {} records, {} files",
                owner,
                report.db_count,
                report.disk_count
            );
            scopes.push(report);
        }

        Ok(StoreIntegrityReport {
            upload_dir: self.config.upload_dir.clone(),
            db_path: self.config.db_path.clone(),
            db_total: repo.count()?,
            disk_total: scopes.iter().map(|s| s.disk_count).sum(),
            scopes,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
}

/// Non-hidden entries directly inside `dir`, sorted by name.
fn list_entries(dir: &Path, kind: EntryKind) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let matches = match kind {
            EntryKind::File => entry.file_type().is_file(),
            EntryKind::Directory => entry.file_type().is_dir(),
        };
        if matches {
            names.push(name);
        }
    }
    Ok(names)
}
