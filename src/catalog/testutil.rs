//! Scratch catalogs for unit tests.

use rusqlite::Connection;

use super::schema::CATALOG_SCHEMA;
use super::{Catalog, MEDIA_CAPTION_DESCRIPTION_ID, MEDIA_RATING_DESCRIPTION_ID};

pub const USER_NS_ID: i64 = 1;
pub const PEOPLE_ID: i64 = 2;
pub const PLACES_ID: i64 = 3;
pub const EVENTS_ID: i64 = 4;
pub const OTHER_ID: i64 = 5;

/// Allocator value of a fresh fixture.
pub const FIXTURE_LAST_ID: i64 = 100;

/// In-memory catalog with `user_ns` and the four categories beneath it.
pub fn fixture() -> Catalog {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(CATALOG_SCHEMA).unwrap();
    conn.execute(
        "INSERT INTO _dbl_auto_id_table (last_assigned_id) VALUES (?1)",
        [FIXTURE_LAST_ID],
    )
    .unwrap();

    let catalog = Catalog::from_connection(conn);
    add_tag(&catalog, USER_NS_ID, "user_ns", 0, 0, true);
    add_tag(&catalog, PEOPLE_ID, "People", USER_NS_ID, 0, true);
    add_tag(&catalog, PLACES_ID, "Places", USER_NS_ID, 1, true);
    add_tag(&catalog, EVENTS_ID, "Events", USER_NS_ID, 2, true);
    add_tag(&catalog, OTHER_ID, "Other", USER_NS_ID, 3, true);
    catalog
}

pub fn add_tag(
    catalog: &Catalog,
    id: i64,
    name: &str,
    parent_id: i64,
    sibling_index: i64,
    can_have_children: bool,
) {
    catalog
        .conn
        .execute(
            r#"
            INSERT INTO tag_table (id, name, parent_id, sibling_index, type_name,
                                   media_is_ordered, can_tag_media, can_have_children,
                                   applies_to_all_in_media_stack, applies_to_all_in_version_stack)
            VALUES (?1, ?2, ?3, ?4, 'user_misc', 0, 1, ?5, 0, 0)
            "#,
            rusqlite::params![id, name, parent_id, sibling_index, can_have_children as i64],
        )
        .unwrap();
}

/// Insert a media row whose search indexes are derived the way the vendor does.
pub fn add_media(catalog: &Catalog, id: i64, full_filepath: &str) {
    let (dir, file) = match full_filepath.rfind('/') {
        Some(pos) => (&full_filepath[..=pos], &full_filepath[pos + 1..]),
        None => ("/", full_filepath),
    };
    catalog
        .conn
        .execute(
            r#"
            INSERT INTO media_table (id, full_filepath, filepath_search_index, filename_search_index)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            rusqlite::params![id, full_filepath, dir.to_lowercase(), file.to_lowercase()],
        )
        .unwrap();
}

pub fn attach_tag(catalog: &Catalog, tag_id: i64, media_id: i64) {
    catalog
        .conn
        .execute(
            "INSERT INTO tag_to_media_table (tag_id, media_id) VALUES (?1, ?2)",
            [tag_id, media_id],
        )
        .unwrap();
}

pub fn add_rating(catalog: &Catalog, media_id: i64, metadata_id: i64, rating: i64) {
    catalog
        .conn
        .execute(
            "INSERT INTO metadata_integer_table (id, description_id, value) VALUES (?1, ?2, ?3)",
            [metadata_id, MEDIA_RATING_DESCRIPTION_ID, rating],
        )
        .unwrap();
    link_media_metadata(catalog, media_id, metadata_id);
}

pub fn add_caption(catalog: &Catalog, media_id: i64, metadata_id: i64, caption: &str) {
    catalog
        .conn
        .execute(
            "INSERT INTO metadata_string_table (id, description_id, value) VALUES (?1, ?2, ?3)",
            rusqlite::params![metadata_id, MEDIA_CAPTION_DESCRIPTION_ID, caption],
        )
        .unwrap();
    link_media_metadata(catalog, media_id, metadata_id);
}

pub fn add_date(catalog: &Catalog, media_id: i64, metadata_id: i64, value: &str) {
    catalog
        .conn
        .execute(
            "INSERT INTO metadata_date_time_table (id, description_id, value) VALUES (?1, 8, ?2)",
            rusqlite::params![metadata_id, value],
        )
        .unwrap();
    link_media_metadata(catalog, media_id, metadata_id);
}

fn link_media_metadata(catalog: &Catalog, media_id: i64, metadata_id: i64) {
    catalog
        .conn
        .execute(
            "INSERT INTO media_to_metadata_table (media_id, metadata_id) VALUES (?1, ?2)",
            [media_id, metadata_id],
        )
        .unwrap();
}

pub fn last_assigned_id(catalog: &Catalog) -> i64 {
    catalog
        .conn
        .query_row("SELECT last_assigned_id FROM _dbl_auto_id_table", [], |row| row.get(0))
        .unwrap()
}
