use crate::schema::SCHEMA;
use portdump_core::{PortdumpError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct Db {
    pub conn: Connection,
    path: Option<PathBuf>,
}

impl Db {
    /// Delete any store left by a previous run, then create an empty one with all four tables.
    pub fn open_fresh(path: impl AsRef<Path>) -> Result<Self> {
        Self::create(path.as_ref(), SCHEMA)
    }

    fn create(path: &Path, schema: &str) -> Result<Self> {
        remove_store_files(path)?;
        let conn = Connection::open(path).map_err(|e| PortdumpError::StorageUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let db = Db { conn, path: Some(path.to_path_buf()) };
        if let Err(e) = apply_pragmas(&db.conn).and_then(|_| db.conn.execute_batch(schema)) {
            let err = db.unavailable(e);
            // the file exists by now; leave nothing behind
            if let Err(cleanup) = db.discard() {
                warn!(error = %cleanup, "could not remove half-built store");
            }
            return Err(err);
        }
        info!(path = %path.display(), "created fresh port store");
        Ok(db)
    }

    /// Open a store written by an earlier run. Never creates a file.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| PortdumpError::StorageUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Db { conn, path: Some(path.to_path_buf()) })
    }

    /// Store that lives only as long as the connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PortdumpError::StorageUnavailable {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        let db = Db { conn, path: None };
        create_schema(&db.conn).map_err(|e| db.unavailable(e))?;
        Ok(db)
    }

    /// Close the connection and delete the store, leaving nothing half-built behind.
    pub fn discard(self) -> Result<()> {
        let Db { conn, path } = self;
        if let Err((_conn, e)) = conn.close() {
            debug!(error = %e, "closing store before discard failed");
        }
        match path {
            Some(p) => remove_store_files(&p),
            None => Ok(()),
        }
    }

    fn unavailable(&self, err: rusqlite::Error) -> PortdumpError {
        PortdumpError::StorageUnavailable {
            path: self.path.clone().unwrap_or_else(|| PathBuf::from(":memory:")),
            reason: err.to_string(),
        }
    }
}

/// Remove the store file and its SQLite side files. Missing files are fine.
pub fn remove_store_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        let candidate = PathBuf::from(name);
        match std::fs::remove_file(&candidate) {
            Ok(()) => debug!(path = %candidate.display(), "removed previous store file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PortdumpError::StorageUnavailable {
                    path: candidate,
                    reason: format!("cannot remove previous store: {e}"),
                })
            }
        }
    }
    Ok(())
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", &"WAL")?;
    conn.pragma_update(None, "synchronous", &"NORMAL")?;
    conn.pragma_update(None, "foreign_keys", &"ON")?;
    Ok(())
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TABLES;

    #[test]
    fn fresh_store_has_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_fresh(dir.path().join("ports.db")).unwrap();
        for table in TABLES {
            assert!(db.table_exists(table).unwrap(), "missing {table}");
        }
    }

    #[test]
    fn reopening_discards_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.db");
        {
            let db = Db::open_fresh(&path).unwrap();
            db.conn
                .execute("INSERT INTO host_networking(service_name) VALUES ('plex')", [])
                .unwrap();
        }
        let db = Db::open_fresh(&path).unwrap();
        assert_eq!(db.table_counts().unwrap().host_networking, 0);
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let db = Db::open_in_memory().unwrap();
        create_schema(&db.conn).unwrap();
        assert!(db.table_exists("container_ports").unwrap());
    }

    #[test]
    fn unwritable_location_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = Db::open_fresh(dir.path().join("missing").join("ports.db")).err().unwrap();
        assert!(matches!(err, PortdumpError::StorageUnavailable { .. }));
    }

    #[test]
    fn existing_store_reopens_with_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.db");
        {
            let db = Db::open_fresh(&path).unwrap();
            db.conn
                .execute("INSERT INTO host_networking(service_name) VALUES ('plex')", [])
                .unwrap();
        }
        let db = Db::open_existing(&path).unwrap();
        assert_eq!(db.table_counts().unwrap().host_networking, 1);
    }

    #[test]
    fn missing_store_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        assert!(matches!(Db::open_existing(&path), Err(PortdumpError::StorageUnavailable { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn failed_schema_leaves_no_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.db");
        let err = Db::create(&path, "CREATE TABLE broken (").err().unwrap();
        assert!(matches!(err, PortdumpError::StorageUnavailable { .. }));
        assert!(!path.exists());
        assert!(!dir.path().join("ports.db-wal").exists());
    }

    #[test]
    fn discard_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.db");
        let db = Db::open_fresh(&path).unwrap();
        assert!(path.exists());
        db.discard().unwrap();
        assert!(!path.exists());
    }
}
