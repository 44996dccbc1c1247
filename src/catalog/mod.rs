//! Photoshop Elements catalog database access.
//!
//! The catalog is an SQLite file whose layout belongs to the vendor. Table
//! names, column order and the numeric `description_id` codes below are a
//! compatibility contract and must not change.

pub mod allocator;
pub mod media;
pub mod resolver;
pub mod schema;
pub mod tags;

#[cfg(test)]
pub(crate) mod testutil;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

use crate::error::CatalogError;

pub use allocator::IdAllocator;
pub use resolver::Resolution;

/// Name of the implicit tag every user tag descends from.
pub const NAMESPACE_ROOT: &str = "user_ns";

/// Parent id stored on root tags.
pub const ROOT_PARENT_ID: i64 = 0;

/// `metadata_integer_table` code for a media rating.
pub const MEDIA_RATING_DESCRIPTION_ID: i64 = 4;

/// `metadata_string_table` code for a media caption.
pub const MEDIA_CAPTION_DESCRIPTION_ID: i64 = 2;

/// `metadata_string_table` code for a tag note.
pub const TAG_NOTE_DESCRIPTION_ID: i64 = 38;

/// `metadata_string_table` code for a tag caption.
pub const TAG_CAPTION_DESCRIPTION_ID: i64 = 43;

/// `metadata_decimal_table` code for a tag latitude.
pub const TAG_LATITUDE_DESCRIPTION_ID: i64 = 44;

/// `metadata_decimal_table` code for a tag longitude.
pub const TAG_LONGITUDE_DESCRIPTION_ID: i64 = 45;

/// `metadata_decimal_table` code for the third tag location value.
pub const TAG_LOCATION_EXTRA_DESCRIPTION_ID: i64 = 46;

/// A media row as enumerated for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub id: i64,
    /// Path as stored by the catalog, without a drive letter.
    pub full_filepath: String,
}

/// Restricts which media rows `Catalog::records` returns.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Only rows whose earliest date-time metadata value sorts after this day.
    pub taken_after: Option<NaiveDate>,
    /// Number of leading rows to skip.
    pub start: usize,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
}

pub struct Catalog {
    pub(crate) conn: Connection,
}

impl Catalog {
    /// Open an existing catalog. Never creates a new file.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()).into());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!("Opened catalog at {:?}", path);
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Enumerate media rows in id order.
    pub fn records(&self, filter: &RecordFilter) -> Result<Vec<CatalogRecord>> {
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = filter.start as i64;

        let records = match filter.taken_after {
            Some(date) => {
                // Date-time values are stored as text starting with YYYYMMDD.
                let threshold = date.format("%Y%m%d").to_string();
                let mut stmt = self.conn.prepare(
                    r#"
                    SELECT id, full_filepath FROM (
                        SELECT media_table.id AS id,
                               media_table.full_filepath AS full_filepath,
                               MIN(metadata_date_time_table.value) AS min_date
                        FROM media_table, media_to_metadata_table, metadata_date_time_table
                        WHERE media_table.id = media_to_metadata_table.media_id
                          AND media_to_metadata_table.metadata_id = metadata_date_time_table.id
                        GROUP BY media_table.id
                    )
                    WHERE min_date > ?1
                    ORDER BY id
                    LIMIT ?2 OFFSET ?3
                    "#,
                )?;
                let rows = stmt.query_map(rusqlite::params![threshold, limit, offset], |row| {
                    Ok(CatalogRecord { id: row.get(0)?, full_filepath: row.get(1)? })
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, full_filepath FROM media_table ORDER BY id LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![limit, offset], |row| {
                    Ok(CatalogRecord { id: row.get(0)?, full_filepath: row.get(1)? })
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(records)
    }

    pub fn record(&self, id: i64) -> Result<Option<CatalogRecord>> {
        let result = self.conn.query_row(
            "SELECT id, full_filepath FROM media_table WHERE id = ?1",
            [id],
            |row| Ok(CatalogRecord { id: row.get(0)?, full_filepath: row.get(1)? }),
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{add_date, add_media, fixture};
    use super::*;

    #[test]
    fn test_records_in_id_order() {
        let catalog = fixture();
        add_media(&catalog, 12, "/Users/me/Pictures/b.jpg");
        add_media(&catalog, 11, "/Users/me/Pictures/a.jpg");

        let records = catalog.records(&RecordFilter::default()).unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![11, 12]);
        assert_eq!(records[0].full_filepath, "/Users/me/Pictures/a.jpg");
    }

    #[test]
    fn test_records_start_and_limit() {
        let catalog = fixture();
        for id in 20..25 {
            add_media(&catalog, id, &format!("/p/{}.jpg", id));
        }

        let filter = RecordFilter { start: 1, limit: Some(2), ..Default::default() };
        let ids: Vec<i64> = catalog.records(&filter).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![21, 22]);
    }

    #[test]
    fn test_records_taken_after_uses_earliest_date() {
        let catalog = fixture();
        add_media(&catalog, 30, "/p/old.jpg");
        add_media(&catalog, 31, "/p/new.jpg");
        add_media(&catalog, 32, "/p/undated.jpg");
        add_date(&catalog, 30, 900, "20100101T120000");
        add_date(&catalog, 30, 901, "20190101T120000");
        add_date(&catalog, 31, 902, "20180215T080000");

        let filter = RecordFilter {
            taken_after: NaiveDate::from_ymd_opt(2018, 1, 30),
            ..Default::default()
        };
        let ids: Vec<i64> = catalog.records(&filter).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![31]);
    }

    #[test]
    fn test_record_by_id() {
        let catalog = fixture();
        add_media(&catalog, 40, "/p/a.jpg");
        assert_eq!(
            catalog.record(40).unwrap(),
            Some(CatalogRecord { id: 40, full_filepath: "/p/a.jpg".to_string() })
        );
        assert_eq!(catalog.record(41).unwrap(), None);
    }

    #[test]
    fn test_open_missing_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::open(&dir.path().join("catalog.psedb")).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::NotFound(_))
        ));
    }
}
