use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Open the shared store. WAL keeps readers off the writers' backs; the busy
/// timeout bounds how long a writer waits on the lock so contention surfaces
/// as a retryable error instead of hanging.
pub async fn make_pool(database_path: impl AsRef<Path>) -> anyhow::Result<SqlitePool> {
    let max_connections = std::env::var("FEEDFLOW_DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(8)
        .clamp(1, 32);

    let busy_timeout_secs = std::env::var("FEEDFLOW_BUSY_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5)
        .clamp(1, 60);

    let opts = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(busy_timeout_secs))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(busy_timeout_secs * 2))
        .connect_with(opts)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// True for transient "store busy" failures that are worth retrying locally:
/// SQLITE_BUSY / SQLITE_LOCKED (and their extended codes) or a pool that
/// could not hand out a connection in time.
pub fn is_store_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            if let Some(code) = db.code() {
                if matches!(code.as_ref(), "5" | "6" | "261" | "262" | "517") {
                    return true;
                }
            }
            let msg = db.message();
            msg.contains("database is locked") || msg.contains("database table is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}
