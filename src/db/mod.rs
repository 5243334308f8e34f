//! Local SQLite file holding the persisted session slot.
//!
//! Schema versions are tracked in `PRAGMA user_version`: migration `n` in
//! [`MIGRATIONS`] brings the file from version `n` to `n + 1`.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

pub const MIGRATIONS: &[&str] = &[include_str!("../../migrations/001_preferences.sql")];

const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA busy_timeout = 5000;
";

/// Few connections: the slot sees one read per call and a write per login.
const POOL_SIZE: u32 = 2;

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager =
        SqliteConnectionManager::file(db_path).with_init(|c| c.execute_batch(CONNECTION_PRAGMAS));
    let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;
    tracing::debug!("Opened token database at {}", db_path.display());
    Ok(pool)
}

pub fn schema_version(pool: &DbPool) -> anyhow::Result<usize> {
    let conn = pool.get()?;
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version as usize)
}

/// Apply every migration past the file's `user_version`, each in its own
/// transaction together with the version bump.
pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let current = schema_version(pool)?;
    if current > MIGRATIONS.len() {
        anyhow::bail!(
            "token database is at schema version {}, newer than this client ({})",
            current,
            MIGRATIONS.len()
        );
    }

    let mut conn = pool.get()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = index + 1;
        tracing::info!("Migrating token database to version {}", version);
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version as i64)?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn memory_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    Pool::builder().max_size(1).build(manager).unwrap()
}
