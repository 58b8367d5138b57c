use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// One row of the `files` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    /// Device or user identifier; also the name of the owner's upload directory.
    pub owner: String,
    pub filename: String,
    pub file_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub file_size: i64,
}

impl AssetRecord {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, filename, file_hash, created_at, file_size";
    /// Select list for tables written before `file_size` existed.
    pub(crate) const LEGACY_COLUMNS: &'static str =
        "id, user_id, filename, file_hash, created_at, 0 AS file_size";

    /// `created_at` may be RFC 3339 text, SQLite `CURRENT_TIMESTAMP` text or
    /// integer Unix seconds. Anything else fails naming the record id.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let id: i64 = row.get(0)?;
        let raw = row.get_ref(4)?;
        let created_at = match raw {
            ValueRef::Text(text) => std::str::from_utf8(text).ok().and_then(|text| {
                parse_timestamp(text).or_else(|| {
                    let secs = text.parse::<i64>().ok()?;
                    DateTime::from_timestamp(secs, 0)
                })
            }),
            ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0),
            _ => None,
        };
        let created_at = created_at.ok_or_else(|| {
            let shown = match raw {
                ValueRef::Text(text) => format!("{:?}", String::from_utf8_lossy(text)),
                other => format!("{:?}", other),
            };
            rusqlite::Error::FromSqlConversionFailure(
                4,
                raw.data_type(),
                format!("record {} has unrecognised created_at {}", id, shown).into(),
            )
        })?;

        Ok(Self {
            id,
            owner: row.get(1)?,
            filename: row.get(2)?,
            file_hash: row.get(3)?,
            created_at,
            file_size: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAssetRecord {
    pub owner: String,
    pub filename: String,
    pub file_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub file_size: i64,
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format (UTC).
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-03-01T12:30:00+02:00").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-03-01T10:30:00+00:00");

        let sqlite = parse_timestamp("2024-03-01 10:30:00").unwrap();
        assert_eq!(sqlite, rfc);

        assert!(parse_timestamp("yesterday").is_none());
    }
}
