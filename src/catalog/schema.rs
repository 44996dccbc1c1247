//! Vendor table layout.
//!
//! Elemsync never creates these tables in a real catalog. They exist so that
//! scratch catalogs used by tests (and `elemsync` developers poking at an
//! empty file) have the same shape as a Photoshop Elements 6 catalog.

pub const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS _dbl_auto_id_table (
    last_assigned_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tag_table (
    id INTEGER PRIMARY KEY,
    name TEXT,
    parent_id INTEGER,
    sibling_index INTEGER,
    type_name TEXT,
    media_is_ordered INTEGER,
    can_tag_media INTEGER,
    can_have_children INTEGER,
    applies_to_all_in_media_stack INTEGER,
    applies_to_all_in_version_stack INTEGER
);

CREATE TABLE IF NOT EXISTS tag_to_metadata_table (
    tag_id INTEGER,
    metadata_id INTEGER
);

CREATE TABLE IF NOT EXISTS metadata_string_table (
    id INTEGER PRIMARY KEY,
    description_id INTEGER,
    value TEXT
);

CREATE TABLE IF NOT EXISTS metadata_integer_table (
    id INTEGER PRIMARY KEY,
    description_id INTEGER,
    value INTEGER
);

CREATE TABLE IF NOT EXISTS metadata_decimal_table (
    id INTEGER PRIMARY KEY,
    description_id INTEGER,
    value REAL
);

CREATE TABLE IF NOT EXISTS metadata_date_time_table (
    id INTEGER PRIMARY KEY,
    description_id INTEGER,
    value TEXT
);

CREATE TABLE IF NOT EXISTS media_table (
    id INTEGER PRIMARY KEY,
    full_filepath TEXT,
    filepath_search_index TEXT,
    filename_search_index TEXT
);

CREATE TABLE IF NOT EXISTS media_to_metadata_table (
    media_id INTEGER,
    metadata_id INTEGER
);

CREATE TABLE IF NOT EXISTS tag_to_media_table (
    tag_id INTEGER,
    media_id INTEGER
);
"#;

pub const THUMBNAIL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS thumbnail_info_table (
    id INTEGER PRIMARY KEY,
    media_id INTEGER,
    width INTEGER,
    height INTEGER
);

CREATE TABLE IF NOT EXISTS thumbnail_data_table (
    thumb_id INTEGER,
    thumbnail BLOB
);
"#;
