use crate::schema::MIG_0001_INIT;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Migrations in order; `user_version` counts the applied ones.
const MIGRATIONS: &[&str] = &[MIG_0001_INIT];

/// Tuning for file databases. mmap 256 MiB, page cache about 1 GiB.
const FILE_PRAGMAS: &[(&str, i64)] = &[("mmap_size", 268_435_456), ("page_size", 4096), ("cache_size", -262_144)];

pub struct Db {
    pub conn: Connection,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        for (name, value) in FILE_PRAGMAS {
            conn.pragma_update(None, name, value)?;
        }
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let applied = migrate(&conn)?;
        if applied > 0 {
            tracing::debug!(applied, "applied schema migrations");
        }
        Ok(Db { conn })
    }

    pub fn schema_version(&self) -> Result<usize> {
        let v: i64 = self.conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        Ok(usize::try_from(v).unwrap_or(0))
    }

    /// Run `f` inside `BEGIN IMMEDIATE` .. `COMMIT`; rolls back when `f` fails.
    /// The immediate lock makes check-then-write sequences inside `f` exclusive
    /// against other writers of the same database file.
    pub fn transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f() {
            Ok(v) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(v)
            }
            Err(e) => {
                if let Err(rb) = self.conn.execute_batch("ROLLBACK") {
                    tracing::error!(error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

fn migrate(conn: &Connection) -> Result<usize> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    let current = usize::try_from(current).unwrap_or(0);
    let pending = MIGRATIONS.iter().enumerate().skip(current);
    let mut applied = 0;
    for (idx, sql) in pending {
        conn.execute_batch(sql).with_context(|| format!("schema migration {}", idx + 1))?;
        conn.pragma_update(None, "user_version", (idx + 1) as i64)?;
        applied += 1;
    }
    Ok(applied)
}
