//! Tag hierarchy stored in `tag_table`.

use anyhow::Result;
use rusqlite::{Connection, Transaction};
use std::collections::HashSet;

use super::{
    Catalog, IdAllocator, NAMESPACE_ROOT, ROOT_PARENT_ID, TAG_CAPTION_DESCRIPTION_ID,
    TAG_LATITUDE_DESCRIPTION_ID, TAG_LOCATION_EXTRA_DESCRIPTION_ID, TAG_LONGITUDE_DESCRIPTION_ID,
    TAG_NOTE_DESCRIPTION_ID,
};
use crate::error::CatalogError;

/// A metadata value attached to every newly created tag.
#[derive(Debug, Clone, Copy)]
enum Placeholder {
    Text { description_id: i64, value: &'static str },
    Decimal { description_id: i64, value: f64 },
}

/// The catalog application expects these on every tag, even blank.
const TAG_PLACEHOLDERS: [Placeholder; 5] = [
    Placeholder::Text { description_id: TAG_NOTE_DESCRIPTION_ID, value: "" },
    Placeholder::Text { description_id: TAG_CAPTION_DESCRIPTION_ID, value: "" },
    Placeholder::Decimal { description_id: TAG_LONGITUDE_DESCRIPTION_ID, value: -181.0 },
    Placeholder::Decimal { description_id: TAG_LATITUDE_DESCRIPTION_ID, value: -91.0 },
    Placeholder::Decimal { description_id: TAG_LOCATION_EXTRA_DESCRIPTION_ID, value: 0.0 },
];

/// Ids consumed by one `append_child`: the tag row plus its placeholders.
pub const IDS_PER_TAG: i64 = 1 + TAG_PLACEHOLDERS.len() as i64;

impl Catalog {
    /// Id of the `user_ns` tag every path is resolved from.
    pub fn namespace_root(&self) -> Result<i64> {
        let result = self.conn.query_row(
            "SELECT id FROM tag_table WHERE name = ?1 ORDER BY id LIMIT 1",
            [NAMESPACE_ROOT],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(CatalogError::MissingNamespaceRoot(NAMESPACE_ROOT).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn tag_name(&self, tag_id: i64) -> Result<Option<String>> {
        Ok(self.tag_row(tag_id)?.map(|row| row.name))
    }

    /// Exact, case-sensitive child lookup.
    pub fn lookup_by_name_and_parent(&self, name: &str, parent_id: i64) -> Result<Option<i64>> {
        Ok(self.child_row(name, parent_id)?.map(|(id, _)| id))
    }

    /// Child id and its `can_have_children` flag.
    pub(crate) fn child_row(&self, name: &str, parent_id: i64) -> Result<Option<(i64, bool)>> {
        let result = self.conn.query_row(
            "SELECT id, can_have_children FROM tag_table WHERE name = ?1 AND parent_id = ?2 ORDER BY id LIMIT 1",
            rusqlite::params![name, parent_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0) != 0)),
        );
        match result {
            Ok(found) => Ok(Some(found)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Names from the top category down to `tag_id`, inclusive.
    ///
    /// Ancestors sitting directly under the sentinel parent (the `user_ns`
    /// namespace) are left out, but `tag_id` itself is always the last
    /// element. Unknown ids give an empty path.
    pub fn lookup_ancestry(&self, tag_id: i64) -> Result<Vec<String>> {
        let Some(start) = self.tag_row(tag_id)? else {
            return Ok(Vec::new());
        };

        let mut names = vec![start.name];
        let mut visited = HashSet::from([tag_id]);
        let mut parent_id = start.parent_id;

        while parent_id != ROOT_PARENT_ID {
            if !visited.insert(parent_id) {
                return Err(CatalogError::CyclicHierarchy { tag_id, repeated: parent_id }.into());
            }
            let Some(parent) = self.tag_row(parent_id)? else {
                tracing::warn!("Tag {} has dangling parent link {}", tag_id, parent_id);
                break;
            };
            if parent.parent_id != ROOT_PARENT_ID {
                names.push(parent.name);
            }
            parent_id = parent.parent_id;
        }

        names.reverse();
        Ok(names)
    }

    pub fn set_can_have_children(&self, tag_id: i64) -> Result<()> {
        set_can_have_children(&self.conn, tag_id)
    }

    /// Create `name` under `parent_id` and return its id.
    ///
    /// The parent flag, tag row, placeholder metadata and allocator advance
    /// commit together or not at all.
    pub fn append_child(&self, name: &str, parent_id: i64, can_have_children: bool) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        set_can_have_children(&tx, parent_id)?;

        let mut ids = IdAllocator::load(&tx)?;
        let sibling_index = next_sibling_index(&tx, parent_id)?;

        let tag_id = ids.next_id();
        tx.execute(
            r#"
            INSERT INTO tag_table (id, name, parent_id, sibling_index, type_name,
                                   media_is_ordered, can_tag_media, can_have_children,
                                   applies_to_all_in_media_stack, applies_to_all_in_version_stack)
            VALUES (?1, ?2, ?3, ?4, 'user_misc', 0, 1, ?5, 0, 0)
            "#,
            rusqlite::params![tag_id, name, parent_id, sibling_index, can_have_children as i64],
        )?;

        for placeholder in TAG_PLACEHOLDERS {
            attach_placeholder(&tx, &mut ids, tag_id, placeholder)?;
        }

        ids.persist(&tx)?;
        tx.commit()?;

        tracing::info!(
            "Created tag {} '{}' under {} (sibling index {})",
            tag_id,
            name,
            parent_id,
            sibling_index
        );
        Ok(tag_id)
    }

    fn tag_row(&self, tag_id: i64) -> Result<Option<TagRow>> {
        let result = self.conn.query_row(
            "SELECT name, parent_id FROM tag_table WHERE id = ?1",
            [tag_id],
            |row| {
                Ok(TagRow {
                    name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    parent_id: row.get::<_, Option<i64>>(1)?.unwrap_or(ROOT_PARENT_ID),
                })
            },
        );
        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

struct TagRow {
    name: String,
    parent_id: i64,
}

fn set_can_have_children(conn: &Connection, tag_id: i64) -> Result<()> {
    conn.execute("UPDATE tag_table SET can_have_children = 1 WHERE id = ?1", [tag_id])?;
    Ok(())
}

fn next_sibling_index(conn: &Connection, parent_id: i64) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sibling_index) FROM tag_table WHERE parent_id = ?1",
        [parent_id],
        |row| row.get(0),
    )?;
    Ok(max.map_or(0, |m| m + 1))
}

fn attach_placeholder(
    tx: &Transaction<'_>,
    ids: &mut IdAllocator,
    tag_id: i64,
    placeholder: Placeholder,
) -> Result<()> {
    let metadata_id = ids.next_id();
    match placeholder {
        Placeholder::Text { description_id, value } => {
            tx.execute(
                "INSERT INTO metadata_string_table (id, description_id, value) VALUES (?1, ?2, ?3)",
                rusqlite::params![metadata_id, description_id, value],
            )?;
        }
        Placeholder::Decimal { description_id, value } => {
            tx.execute(
                "INSERT INTO metadata_decimal_table (id, description_id, value) VALUES (?1, ?2, ?3)",
                rusqlite::params![metadata_id, description_id, value],
            )?;
        }
    }
    tx.execute(
        "INSERT INTO tag_to_metadata_table (tag_id, metadata_id) VALUES (?1, ?2)",
        [tag_id, metadata_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testutil::*;

    fn sibling_index_of(catalog: &Catalog, tag_id: i64) -> i64 {
        catalog
            .conn
            .query_row("SELECT sibling_index FROM tag_table WHERE id = ?1", [tag_id], |row| row.get(0))
            .unwrap()
    }

    fn can_have_children(catalog: &Catalog, tag_id: i64) -> bool {
        catalog
            .conn
            .query_row("SELECT can_have_children FROM tag_table WHERE id = ?1", [tag_id], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap()
            != 0
    }

    #[test]
    fn test_namespace_root() {
        let catalog = fixture();
        assert_eq!(catalog.namespace_root().unwrap(), USER_NS_ID);
    }

    #[test]
    fn test_missing_namespace_root() {
        let catalog = fixture();
        catalog.conn.execute("DELETE FROM tag_table WHERE name = 'user_ns'", []).unwrap();
        let err = catalog.namespace_root().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::MissingNamespaceRoot(_))
        ));
    }

    #[test]
    fn test_lookup_by_name_is_case_sensitive() {
        let catalog = fixture();
        assert_eq!(catalog.lookup_by_name_and_parent("People", USER_NS_ID).unwrap(), Some(PEOPLE_ID));
        assert_eq!(catalog.lookup_by_name_and_parent("people", USER_NS_ID).unwrap(), None);
        assert_eq!(catalog.lookup_by_name_and_parent("People", PLACES_ID).unwrap(), None);
    }

    #[test]
    fn test_ancestry_excludes_namespace_root() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Family", PEOPLE_ID, 0, true);
        add_tag(&catalog, 11, "Smith", 10, 0, false);

        assert_eq!(catalog.lookup_ancestry(11).unwrap(), vec!["People", "Family", "Smith"]);
        assert_eq!(catalog.lookup_ancestry(PEOPLE_ID).unwrap(), vec!["People"]);
    }

    #[test]
    fn test_ancestry_of_namespace_root_is_itself() {
        let catalog = fixture();
        assert_eq!(catalog.lookup_ancestry(USER_NS_ID).unwrap(), vec!["user_ns"]);
    }

    #[test]
    fn test_ancestry_of_unknown_tag_is_empty() {
        let catalog = fixture();
        assert!(catalog.lookup_ancestry(9999).unwrap().is_empty());
    }

    #[test]
    fn test_ancestry_cycle_is_an_error() {
        let catalog = fixture();
        add_tag(&catalog, 20, "Loop A", 21, 0, true);
        add_tag(&catalog, 21, "Loop B", 20, 0, true);

        let err = catalog.lookup_ancestry(20).unwrap_err();
        match err.downcast_ref::<CatalogError>() {
            Some(CatalogError::CyclicHierarchy { tag_id, repeated }) => {
                assert_eq!(*tag_id, 20);
                assert_eq!(*repeated, 20);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_ancestry_stops_at_dangling_parent() {
        let catalog = fixture();
        add_tag(&catalog, 40, "Orphan", 777, 0, true);
        add_tag(&catalog, 41, "Child", 40, 0, false);
        assert_eq!(catalog.lookup_ancestry(41).unwrap(), vec!["Orphan", "Child"]);
    }

    #[test]
    fn test_tag_name() {
        let catalog = fixture();
        assert_eq!(catalog.tag_name(PLACES_ID).unwrap().as_deref(), Some("Places"));
        assert_eq!(catalog.tag_name(9999).unwrap(), None);
    }

    #[test]
    fn test_ancestry_self_parent_is_an_error() {
        let catalog = fixture();
        add_tag(&catalog, 30, "Mirror", 30, 0, true);
        assert!(catalog.lookup_ancestry(30).is_err());
    }

    #[test]
    fn test_set_can_have_children_is_idempotent() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Leaf", PEOPLE_ID, 0, false);

        catalog.set_can_have_children(10).unwrap();
        catalog.set_can_have_children(10).unwrap();
        assert!(can_have_children(&catalog, 10));
    }

    #[test]
    fn test_append_child_sibling_index() {
        let catalog = fixture();

        // No children yet under People.
        let first = catalog.append_child("Family", PEOPLE_ID, true).unwrap();
        assert_eq!(sibling_index_of(&catalog, first), 0);

        // user_ns already has four children at indexes 0..=3.
        let fifth = catalog.append_child("Misc", USER_NS_ID, true).unwrap();
        assert_eq!(sibling_index_of(&catalog, fifth), 4);
    }

    #[test]
    fn test_append_child_skips_past_highest_sibling_index() {
        let catalog = fixture();
        add_tag(&catalog, 10, "A", EVENTS_ID, 0, false);
        add_tag(&catalog, 11, "B", EVENTS_ID, 7, false);

        let id = catalog.append_child("C", EVENTS_ID, false).unwrap();
        assert_eq!(sibling_index_of(&catalog, id), 8);
    }

    #[test]
    fn test_append_child_sets_parent_flag() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Leaf", PEOPLE_ID, 0, false);

        let child = catalog.append_child("Below", 10, false).unwrap();
        assert!(can_have_children(&catalog, 10));
        assert!(!can_have_children(&catalog, child));
    }

    #[test]
    fn test_append_child_advances_allocator() {
        let catalog = fixture();

        let first = catalog.append_child("Family", PEOPLE_ID, true).unwrap();
        assert_eq!(first, FIXTURE_LAST_ID + 1);
        assert_eq!(last_assigned_id(&catalog), first + IDS_PER_TAG - 1);

        let second = catalog.append_child("Smith", first, false).unwrap();
        assert_eq!(second, first + IDS_PER_TAG);
        assert_eq!(last_assigned_id(&catalog), second + IDS_PER_TAG - 1);
    }

    #[test]
    fn test_append_child_attaches_placeholders() {
        let catalog = fixture();
        let id = catalog.append_child("Family", PEOPLE_ID, true).unwrap();

        let strings: Vec<(i64, String)> = catalog
            .conn
            .prepare(
                r#"
                SELECT s.description_id, s.value
                FROM metadata_string_table s
                JOIN tag_to_metadata_table t ON t.metadata_id = s.id
                WHERE t.tag_id = ?1
                ORDER BY s.id
                "#,
            )
            .unwrap()
            .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(strings, vec![(38, String::new()), (43, String::new())]);

        let decimals: Vec<(i64, f64)> = catalog
            .conn
            .prepare(
                r#"
                SELECT d.description_id, d.value
                FROM metadata_decimal_table d
                JOIN tag_to_metadata_table t ON t.metadata_id = d.id
                WHERE t.tag_id = ?1
                ORDER BY d.id
                "#,
            )
            .unwrap()
            .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(decimals, vec![(45, -181.0), (44, -91.0), (46, 0.0)]);
    }

    #[test]
    fn test_append_child_is_atomic() {
        let catalog = fixture();
        // Occupy the id the second placeholder will be given.
        catalog
            .conn
            .execute(
                "INSERT INTO metadata_string_table (id, description_id, value) VALUES (?1, 99, 'taken')",
                [FIXTURE_LAST_ID + 3],
            )
            .unwrap();
        add_tag(&catalog, 10, "Leaf", PEOPLE_ID, 0, false);

        assert!(catalog.append_child("Doomed", 10, false).is_err());

        assert_eq!(last_assigned_id(&catalog), FIXTURE_LAST_ID);
        assert_eq!(catalog.lookup_by_name_and_parent("Doomed", 10).unwrap(), None);
        assert!(!can_have_children(&catalog, 10));
        let links: i64 = catalog
            .conn
            .query_row("SELECT COUNT(*) FROM tag_to_metadata_table", [], |row| row.get(0))
            .unwrap();
        assert_eq!(links, 0);
    }

    #[test]
    fn test_created_leaf_ancestry_round_trip() {
        let catalog = fixture();
        let family = catalog.append_child("Family", PEOPLE_ID, true).unwrap();
        let smith = catalog.append_child("Smith", family, false).unwrap();
        assert_eq!(catalog.lookup_ancestry(smith).unwrap(), vec!["People", "Family", "Smith"]);
        assert_eq!(catalog.tag_name(smith).unwrap().as_deref(), Some("Smith"));
    }
}
