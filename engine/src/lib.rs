//! Content identification and catalog reconciliation for PhotoSync backups.

pub mod config;
pub mod core;
pub mod database;
pub mod error;
pub mod services;

pub use crate::config::{PlatformDirs, StorageConfig, StorageOverrides};
pub use crate::core::fingerprint::{compute_fingerprint, Fingerprint, PixelBuffer};
pub use crate::core::reconcile::{reconcile, Catalog, CatalogEntry, ReconciliationPlan};
pub use crate::core::similarity::{compare, Comparison, SimilarityClass, SimilarityComparator};
pub use crate::error::{EngineError, Result};
