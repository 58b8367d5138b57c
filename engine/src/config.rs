//! Storage locations for the backup server.
//!
//! Resolved once at startup from explicit overrides and platform
//! directories, then passed by reference to the services.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PRODUCT_DIR: &str = "PhotoSync";
const SERVER_DIR: &str = "server";
const UPLOADS_DIR: &str = "uploads";
const DATABASE_FILE: &str = "backup.db";

/// Values supplied by flags or environment. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct StorageOverrides {
    pub data_dir: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
}

/// Platform directories used for the defaults.
#[derive(Debug, Clone, Default)]
pub struct PlatformDirs {
    pub home: Option<PathBuf>,
    /// Per-user application data directory.
    pub data: Option<PathBuf>,
}

impl PlatformDirs {
    pub fn detect() -> Self {
        Self {
            home: dirs::home_dir(),
            data: dirs::data_dir(),
        }
    }

    fn platform_default(&self) -> Option<PathBuf> {
        self.data
            .as_ref()
            .map(|data| data.join(PRODUCT_DIR).join(SERVER_DIR))
    }

    /// `~/PhotoSync/server`, where releases before the per-platform layout
    /// kept their data.
    fn legacy(&self) -> Option<PathBuf> {
        self.home
            .as_ref()
            .map(|home| home.join(PRODUCT_DIR).join(SERVER_DIR))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseDirSource {
    DataDirOverride,
    UploadDirOverride,
    PlatformDefault,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub db_path: PathBuf,
    pub source: BaseDirSource,
}

impl StorageConfig {
    pub fn resolve(overrides: &StorageOverrides, platform: &PlatformDirs) -> Result<Self> {
        let (base_dir, upload_dir, source) = if let Some(data_dir) = &overrides.data_dir {
            (
                data_dir.clone(),
                data_dir.join(UPLOADS_DIR),
                BaseDirSource::DataDirOverride,
            )
        } else if let Some(upload_dir) = &overrides.upload_dir {
            let base = upload_dir
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| upload_dir.clone());
            (base, upload_dir.clone(), BaseDirSource::UploadDirOverride)
        } else {
            let default = platform.platform_default();
            let legacy = platform.legacy();
            let (base, source) = match (default, legacy) {
                (Some(default), _) if default.is_dir() => (default, BaseDirSource::PlatformDefault),
                (_, Some(legacy)) if legacy.is_dir() => {
                    log::info!("using legacy data directory {}", legacy.display());
                    (legacy, BaseDirSource::Legacy)
                }
                (Some(default), _) => (default, BaseDirSource::PlatformDefault),
                (None, Some(legacy)) => (legacy, BaseDirSource::Legacy),
                (None, None) => {
                    return Err(EngineError::argument(
                        "no data directory given and no home directory found",
                    ))
                }
            };
            let uploads = base.join(UPLOADS_DIR);
            (base, uploads, source)
        };

        let db_path = overrides
            .db_path
            .clone()
            .unwrap_or_else(|| base_dir.join(DATABASE_FILE));

        Ok(Self {
            base_dir,
            upload_dir,
            db_path,
            source,
        })
    }

    /// Fail with `StorageUnavailable` unless both the upload directory and the
    /// database file exist.
    pub fn ensure_available(&self) -> Result<()> {
        if !self.upload_dir.is_dir() {
            return Err(EngineError::StorageUnavailable {
                what: "Upload directory",
                path: self.upload_dir.clone(),
            });
        }
        if !self.db_path.is_file() {
            return Err(EngineError::StorageUnavailable {
                what: "Database",
                path: self.db_path.clone(),
            });
        }
        Ok(())
    }

    /// Directory holding one owner's uploaded files.
    pub fn owner_dir(&self, owner: &str) -> PathBuf {
        self.upload_dir.join(owner)
    }
}
