use crate::config::StorageConfig;
use crate::core::duplicate::{plan_groups, DuplicateGroup, DuplicateSummary};
use crate::database::{self, repositories::FileRepository};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    /// Dry run: nothing was touched.
    Planned,
    Resolved { removed: usize },
    /// The group transaction rolled back; the group is intact and can be retried.
    Conflict { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    pub group: DuplicateGroup,
    pub outcome: GroupOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub groups: Vec<GroupResult>,
    pub removed: usize,
    /// Duplicate groups still present after the run.
    pub remaining: Vec<DuplicateSummary>,
}

impl CleanupReport {
    pub fn conflicts(&self) -> impl Iterator<Item = &GroupResult> {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Conflict { .. }))
    }

    /// No duplicates left after a real run.
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Removes redundant `files` rows, keeping the newest record per
/// (owner, filename).
pub struct DuplicateCleanup {
    repo: FileRepository,
}

impl DuplicateCleanup {
    pub fn new(repo: FileRepository) -> Self {
        Self { repo }
    }

    pub fn open(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(FileRepository::new(database::open_existing(
            &config.db_path,
        )?)))
    }

    pub fn plan(&self) -> Result<Vec<DuplicateGroup>> {
        Ok(plan_groups(&self.repo.find_duplicate_records()?))
    }

    /// Resolve every duplicate group, each in its own transaction, then
    /// re-scan for leftovers.
    ///
    /// A group whose transaction fails is reported as a conflict and left
    /// untouched. Errors reading the store abort the run.
    pub fn run(&mut self, dry_run: bool) -> Result<CleanupReport> {
        let groups = self.plan()?;
        log::info!("found {} duplicate group(s)", groups.len());

        let mut results = Vec::with_capacity(groups.len());
        let mut removed = 0;
        for group in groups {
            let outcome = if dry_run {
                GroupOutcome::Planned
            } else {
                match self.repo.delete_group(&group) {
                    Ok(count) => {
                        removed += count;
                        GroupOutcome::Resolved { removed: count }
                    }
                    Err(EngineError::DuplicateGroupConflict { reason, .. }) => {
                        log::warn!(
                            "left {}/{} for retry: {}",
                            group.owner,
                            group.filename,
                            reason
                        );
                        GroupOutcome::Conflict { reason }
                    }
                    Err(e) => return Err(e),
                }
            };
            results.push(GroupResult { group, outcome });
        }

        let remaining = self.repo.find_duplicate_names()?;
        if !dry_run && !remaining.is_empty() {
            log::warn!("{} duplicate group(s) remain after cleanup", remaining.len());
        }

        Ok(CleanupReport {
            dry_run,
            groups: results,
            removed,
            remaining,
        })
    }
}
