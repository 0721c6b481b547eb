use rusqlite::{Connection, Result};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);
const SCHEMA_VERSION: i64 = 1;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open with a bounded wait on locked tables instead of blocking forever.
    pub fn open_with_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas(timeout)?;
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas(DEFAULT_BUSY_TIMEOUT)?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self, timeout: Duration) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        self.conn.busy_timeout(timeout)?;
        debug!("SQLite pragmas configured (WAL mode, busy timeout {:?})", timeout);
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version >= SCHEMA_VERSION {
            debug!("SQLite schema is current (version {})", version);
            return Ok(());
        }

        debug!(
            "Schema version {} < {}, creating tables",
            version, SCHEMA_VERSION
        );
        self.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CategoryRecord;

    fn user_version(db: &Database) -> i64 {
        db.connection()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_current_schema() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(user_version(&db), SCHEMA_VERSION);
        assert!(db.find_all_categories().unwrap().is_empty());
    }

    #[test]
    fn test_reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catimg.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_category(&CategoryRecord::new("507f1f77bcf86cd799439011", Some("/images/a.jpg")))
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(user_version(&db), SCHEMA_VERSION);
        let record = db.get_category("507f1f77bcf86cd799439011").unwrap().unwrap();
        assert_eq!(record.image_path.as_deref(), Some("/images/a.jpg"));
    }
}
