//! Database Registry
//!
//! A fixed set of numbered databases chosen with `SELECT`, plus one
//! administrative database that clients can never select. The admin database
//! holds server bookkeeping as ordinary keys:
//!
//! | Key               | Value                                 |
//! |-------------------|---------------------------------------|
//! | `channel:<name>`  | set of subscribed session ids         |
//! | `session:<id>`    | set of channels the session follows   |
//! | `role`            | `master` or `slave`                   |
//! | `slaves`          | set of attached replica addresses     |

use crate::error::{CommandError, CommandResult};
use crate::storage::database::Database;
use std::sync::Arc;

/// Default number of selectable databases.
pub const DEFAULT_DATABASES: usize = 16;

#[derive(Debug)]
pub struct Databases {
    databases: Vec<Arc<Database>>,
    admin: Arc<Database>,
}

impl Default for Databases {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASES)
    }
}

impl Databases {
    /// Creates `count` empty databases and the admin database.
    pub fn new(count: usize) -> Self {
        Self {
            databases: (0..count).map(|_| Arc::new(Database::new())).collect(),
            admin: Arc::new(Database::new()),
        }
    }

    /// Bounds-checked selection by client-supplied index.
    pub fn select(&self, index: i64) -> CommandResult<&Arc<Database>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.databases.get(i))
            .ok_or(CommandError::OutOfRange("DB index is out of range"))
    }

    /// The bookkeeping database. Not reachable through [`Databases::select`].
    pub fn admin(&self) -> &Arc<Database> {
        &self.admin
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// The selectable databases in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Database>> {
        self.databases.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Entry;
    use bytes::Bytes;

    #[test]
    fn test_select_bounds() {
        let dbs = Databases::new(4);
        assert_eq!(dbs.len(), 4);
        assert!(dbs.select(0).is_ok());
        assert!(dbs.select(3).is_ok());
        assert_eq!(
            dbs.select(4).unwrap_err(),
            CommandError::OutOfRange("DB index is out of range")
        );
        assert!(dbs.select(-1).is_err());
    }

    #[test]
    fn test_databases_are_isolated() {
        let dbs = Databases::new(2);
        dbs.select(0).unwrap().put(Bytes::from("k"), Entry::string("v"));

        assert!(dbs.select(0).unwrap().contains(b"k"));
        assert!(!dbs.select(1).unwrap().contains(b"k"));
        assert!(!dbs.admin().contains(b"k"));
    }

    #[test]
    fn test_admin_is_not_selectable() {
        let dbs = Databases::new(1);
        dbs.admin().put(Bytes::from("role"), Entry::string("master"));
        assert!(dbs.iter().all(|db| db.is_empty()));
    }
}
