//! Map tag paths such as `["People", "Family", "Smith"]` to tag ids.

use anyhow::Result;

use super::Catalog;

/// Position of the first segment that may be created automatically.
///
/// Index 0 is a top-level category and index 1 sits directly beneath one;
/// both must already exist so that a typo cannot grow the taxonomy.
const FIRST_CREATABLE_DEPTH: usize = 2;

/// Outcome of `Catalog::resolve_or_create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Every segment exists (possibly after creating some of them).
    Resolved { tag_id: i64, created: usize },
    /// Segment `missing_at` is absent and may not be created.
    Incomplete { created: usize, missing_at: usize },
}

impl Resolution {
    pub fn tag_id(&self) -> Option<i64> {
        match self {
            Resolution::Resolved { tag_id, .. } => Some(*tag_id),
            Resolution::Incomplete { .. } => None,
        }
    }

    pub fn created(&self) -> usize {
        match self {
            Resolution::Resolved { created, .. } | Resolution::Incomplete { created, .. } => *created,
        }
    }
}

impl Catalog {
    /// Walk `path` from the namespace root, creating missing segments below
    /// the first two levels.
    ///
    /// Existing intermediate tags get `can_have_children` repaired on the way.
    pub fn resolve_or_create<S: AsRef<str>>(&self, path: &[S]) -> Result<Resolution> {
        let mut tag_id = self.namespace_root()?;
        let mut created = 0;
        let last = path.len().saturating_sub(1);

        for (depth, segment) in path.iter().enumerate() {
            let segment = segment.as_ref();
            let is_leaf = depth == last;

            match self.child_row(segment, tag_id)? {
                Some((child_id, can_have_children)) => {
                    if !is_leaf && !can_have_children {
                        tracing::debug!("Repairing can_have_children on tag {} '{}'", child_id, segment);
                        self.set_can_have_children(child_id)?;
                    }
                    tag_id = child_id;
                }
                None if depth >= FIRST_CREATABLE_DEPTH => {
                    tag_id = self.append_child(segment, tag_id, !is_leaf)?;
                    created += 1;
                }
                None => {
                    tracing::warn!(
                        "Refusing to create top-level tag segment '{}' at depth {}",
                        segment,
                        depth
                    );
                    return Ok(Resolution::Incomplete { created, missing_at: depth });
                }
            }
        }

        Ok(Resolution::Resolved { tag_id, created })
    }

    /// Walk `path` without writing anything.
    pub fn resolve_strict<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<i64>> {
        let mut tag_id = self.namespace_root()?;
        for segment in path {
            match self.lookup_by_name_and_parent(segment.as_ref(), tag_id)? {
                Some(child_id) => tag_id = child_id,
                None => return Ok(None),
            }
        }
        Ok(Some(tag_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testutil::*;

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
    fn test_resolve_existing_path() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Family", PEOPLE_ID, 0, true);

        let resolution = catalog.resolve_or_create(&["People", "Family"]).unwrap();
        assert_eq!(resolution, Resolution::Resolved { tag_id: 10, created: 0 });
        assert_eq!(last_assigned_id(&catalog), FIXTURE_LAST_ID);
    }

    #[test]
    fn test_create_below_second_level() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Family", PEOPLE_ID, 0, true);

        let path = ["People", "Family", "Smith", "Jane Smith"];
        let resolution = catalog.resolve_or_create(&path).unwrap();
        assert_eq!(resolution.created(), 2);

        let leaf = resolution.tag_id().unwrap();
        assert_eq!(catalog.lookup_ancestry(leaf).unwrap(), path);
        assert!(!can_have_children(&catalog, leaf));

        let smith = catalog.lookup_by_name_and_parent("Smith", 10).unwrap().unwrap();
        assert!(can_have_children(&catalog, smith));
    }

    #[test]
    fn test_refuses_new_category() {
        let catalog = fixture();
        let resolution = catalog.resolve_or_create(&["Peeple", "Family", "Smith"]).unwrap();
        assert_eq!(resolution, Resolution::Incomplete { created: 0, missing_at: 0 });
        assert_eq!(last_assigned_id(&catalog), FIXTURE_LAST_ID);
    }

    #[test]
    fn test_refuses_new_second_level() {
        let catalog = fixture();
        let resolution = catalog.resolve_or_create(&["People", "Family", "Smith"]).unwrap();
        assert_eq!(resolution, Resolution::Incomplete { created: 0, missing_at: 1 });
        assert_eq!(catalog.resolve_strict(&["People", "Family"]).unwrap(), None);
    }

    #[test]
    fn test_repairs_can_have_children_on_descent() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Family", PEOPLE_ID, 0, false);
        add_tag(&catalog, 11, "Smith", 10, 0, false);

        catalog.resolve_or_create(&["People", "Family", "Smith"]).unwrap();
        assert!(can_have_children(&catalog, 10));
        // The leaf is left alone.
        assert!(!can_have_children(&catalog, 11));
    }

    #[test]
    fn test_resolve_or_create_then_strict_agree() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Holidays", EVENTS_ID, 0, true);

        for path in [
            vec!["Events", "Holidays", "2018", "Spain"],
            vec!["Events", "Holidays", "2018"],
            vec!["Events", "Holidays", "2019", "France", "Paris"],
            vec!["Places"],
        ] {
            let created = catalog.resolve_or_create(path.as_slice()).unwrap().tag_id().unwrap();
            assert_eq!(catalog.resolve_strict(path.as_slice()).unwrap(), Some(created));
            // A second pass creates nothing.
            assert_eq!(
                catalog.resolve_or_create(path.as_slice()).unwrap(),
                Resolution::Resolved { tag_id: created, created: 0 }
            );
        }
    }

    #[test]
    fn test_resolve_strict_never_writes() {
        let catalog = fixture();
        add_tag(&catalog, 10, "Family", PEOPLE_ID, 0, false);
        assert_eq!(catalog.resolve_strict(&["People", "Family", "Smith"]).unwrap(), None);
        assert_eq!(catalog.resolve_strict(&["People", "Family"]).unwrap(), Some(10));
        assert!(!can_have_children(&catalog, 10));
        assert_eq!(last_assigned_id(&catalog), FIXTURE_LAST_ID);
    }

    #[test]
    fn test_empty_path_is_namespace_root() {
        let catalog = fixture();
        let empty: [&str; 0] = [];
        assert_eq!(catalog.resolve_strict(&empty).unwrap(), Some(USER_NS_ID));
    }
}
