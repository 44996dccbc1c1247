//! Per-photo metadata as the catalog records it.

use anyhow::Result;

use super::{Catalog, MEDIA_CAPTION_DESCRIPTION_ID, MEDIA_RATING_DESCRIPTION_ID};

impl Catalog {
    /// One ancestry path per tag attached to the record.
    pub fn tags_for_record(&self, record_id: i64) -> Result<Vec<Vec<String>>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tag_to_media_table.tag_id
            FROM media_table, tag_to_media_table
            WHERE media_table.id = ?1
              AND media_table.id = tag_to_media_table.media_id
            ORDER BY tag_to_media_table.tag_id
            "#,
        )?;
        let tag_ids = stmt
            .query_map([record_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut paths = Vec::with_capacity(tag_ids.len());
        for tag_id in tag_ids {
            paths.push(self.lookup_ancestry(tag_id)?);
        }
        Ok(paths)
    }

    /// Rating, or `None` when the catalog has no rating value (not zero).
    pub fn rating_for_record(&self, record_id: i64) -> Result<Option<i64>> {
        let result = self.conn.query_row(
            r#"
            SELECT metadata_integer_table.value
            FROM media_to_metadata_table, metadata_integer_table
            WHERE media_to_metadata_table.media_id = ?1
              AND metadata_integer_table.id = media_to_metadata_table.metadata_id
              AND metadata_integer_table.description_id = ?2
            LIMIT 1
            "#,
            [record_id, MEDIA_RATING_DESCRIPTION_ID],
            |row| row.get::<_, Option<i64>>(0),
        );
        match result {
            Ok(rating) => Ok(rating),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn caption_for_record(&self, record_id: i64) -> Result<Option<String>> {
        let result = self.conn.query_row(
            r#"
            SELECT metadata_string_table.value
            FROM media_to_metadata_table, metadata_string_table
            WHERE media_to_metadata_table.media_id = ?1
              AND metadata_string_table.id = media_to_metadata_table.metadata_id
              AND metadata_string_table.description_id = ?2
            LIMIT 1
            "#,
            [record_id, MEDIA_CAPTION_DESCRIPTION_ID],
            |row| row.get::<_, Option<String>>(0),
        );
        match result {
            Ok(caption) => Ok(caption),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find the record for a file path, ignoring drive letter and case.
    pub fn locate_record_by_path(&self, path: &str) -> Result<Option<i64>> {
        let (directory, filename) = search_index(path);
        let result = self.conn.query_row(
            r#"
            SELECT id FROM media_table
            WHERE filepath_search_index = ?1 AND filename_search_index = ?2
            ORDER BY id
            LIMIT 1
            "#,
            [&directory, &filename],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// The `(filepath_search_index, filename_search_index)` pair for a path.
///
/// Drive letters and UNC shares are dropped, everything is lower-cased, the
/// directory uses forward slashes and always ends in one.
pub fn search_index(path: &str) -> (String, String) {
    let normalized = path.to_lowercase().replace('/', "\\");
    let rest = strip_drive(&normalized);

    let (head, filename) = match rest.rfind('\\') {
        Some(pos) => (&rest[..=pos], &rest[pos + 1..]),
        None => ("", rest),
    };
    let trimmed = head.trim_end_matches('\\');
    let head = if trimmed.is_empty() { head } else { trimmed };

    let mut directory = head.replace('\\', "/");
    if !directory.ends_with('/') {
        directory.push('/');
    }
    (directory, filename.to_string())
}

fn strip_drive(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return &path[2..];
    }

    // \\server\share\rest
    if path.starts_with("\\\\") && !path[2..].starts_with('\\') {
        if let Some(server_len) = path[2..].find('\\') {
            let share_start = 2 + server_len + 1;
            return match path[share_start..].find('\\') {
                Some(share_len) => &path[share_start + share_len..],
                None => "",
            };
        }
    }

    path
}
