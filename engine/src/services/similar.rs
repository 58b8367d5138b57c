use crate::core::fingerprint::Fingerprint;
use crate::core::similarity::{Comparison, SimilarityComparator};
use crate::database::models::AssetRecord;
use crate::database::repositories::FileRepository;
use crate::error::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarPair {
    pub first: AssetRecord,
    pub second: AssetRecord,
    pub comparison: Comparison,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarityScan {
    pub compared: usize,
    /// Records without a parsable fingerprint.
    pub skipped: usize,
    pub pairs: Vec<SimilarPair>,
}

/// All record pairs whose fingerprints are identical or near-duplicates,
/// closest first.
pub fn find_similar(
    records: &[AssetRecord],
    comparator: &SimilarityComparator,
) -> SimilarityScan {
    let hashed: Vec<(&AssetRecord, Fingerprint)> = records
        .iter()
        .filter_map(|record| {
            let fingerprint = record.file_hash.as_deref()?.parse::<Fingerprint>().ok()?;
            Some((record, fingerprint))
        })
        .collect();
    let skipped = records.len() - hashed.len();
    if skipped > 0 {
        log::debug!("skipping {} record(s) without a usable fingerprint", skipped);
    }

    let mut pairs: Vec<SimilarPair> = (0..hashed.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let hashed = &hashed;
            (i + 1..hashed.len()).filter_map(move |j| {
                let (first, a) = &hashed[i];
                let (second, b) = &hashed[j];
                let comparison = comparator.compare(a, b);
                comparison.is_match().then(|| SimilarPair {
                    first: (*first).clone(),
                    second: (*second).clone(),
                    comparison,
                })
            })
        })
        .collect();

    pairs.sort_by(|x, y| {
        x.comparison
            .distance
            .cmp(&y.comparison.distance)
            .then(x.first.id.cmp(&y.first.id))
            .then(x.second.id.cmp(&y.second.id))
    });

    SimilarityScan {
        compared: hashed.len(),
        skipped,
        pairs,
    }
}

/// Scan stored fingerprints, optionally limited to one owner scope.
pub fn scan_store(
    repo: &FileRepository,
    owner: Option<&str>,
    comparator: &SimilarityComparator,
) -> Result<SimilarityScan> {
    let records = match owner {
        Some(owner) => repo.find_by_owner(owner)?,
        None => repo.find_all()?,
    };
    Ok(find_similar(&records, comparator))
}
