//! Reader for the catalog's thumbnail cache database.
//!
//! The cache is a separate SQLite file next to the catalog. Each media row
//! may have several thumbnails, one per size, stored as JPEG blobs.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

use crate::error::CatalogError;

pub struct ThumbnailCache {
    pub(crate) conn: Connection,
}

impl ThumbnailCache {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()).into());
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Raw thumbnail bytes for an exact size, usually 160x120 or 320x240.
    pub fn fetch(&self, media_id: i64, width: u32, height: u32) -> Result<Option<Vec<u8>>> {
        let result = self.conn.query_row(
            r#"
            SELECT thumbnail_data_table.thumbnail
            FROM thumbnail_data_table, thumbnail_info_table
            WHERE thumbnail_info_table.media_id = ?1
              AND thumbnail_info_table.width = ?2
              AND thumbnail_info_table.height = ?3
              AND thumbnail_data_table.thumb_id = thumbnail_info_table.id
            LIMIT 1
            "#,
            rusqlite::params![media_id, width, height],
            |row| row.get::<_, Vec<u8>>(0),
        );
        match result {
            Ok(blob) => Ok(Some(blob)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to load thumbnail for media {}", media_id)),
        }
    }

    /// Decoded thumbnail for an exact size.
    pub fn load_image(&self, media_id: i64, width: u32, height: u32) -> Result<Option<DynamicImage>> {
        let Some(blob) = self.fetch(media_id, width, height)? else {
            return Ok(None);
        };
        let image = image::load_from_memory_with_format(&blob, ImageFormat::Jpeg)
            .with_context(|| format!("Thumbnail for media {} is not a JPEG", media_id))?;
        Ok(Some(image))
    }
}
