//! The catalog's shared row identifier counter.
//!
//! Tag rows and metadata value rows all draw their ids from the single
//! `_dbl_auto_id_table.last_assigned_id` value. An `IdAllocator` is loaded
//! inside a transaction, handed by reference to every insert that needs an
//! id, and persisted in that same transaction before commit.

use anyhow::Result;
use rusqlite::Connection;

use crate::error::CatalogError;

#[derive(Debug)]
pub struct IdAllocator {
    loaded: i64,
    last_assigned: i64,
}

impl IdAllocator {
    /// Read the current counter. Call with a `Transaction` so the value
    /// cannot move before `persist`.
    pub fn load(conn: &Connection) -> Result<Self> {
        let result = conn.query_row(
            "SELECT last_assigned_id FROM _dbl_auto_id_table",
            [],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(last_assigned) => Ok(Self { loaded: last_assigned, last_assigned }),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(CatalogError::MissingAllocator.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn next_id(&mut self) -> i64 {
        self.last_assigned += 1;
        self.last_assigned
    }

    pub fn last_assigned(&self) -> i64 {
        self.last_assigned
    }

    /// Number of ids handed out since `load`.
    pub fn consumed(&self) -> i64 {
        self.last_assigned - self.loaded
    }

    /// Store the highest id handed out.
    pub fn persist(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE _dbl_auto_id_table SET last_assigned_id = ?1",
            [self.last_assigned],
        )?;
        Ok(())
    }
}
