use sociwave_core::{CoreError, DatabaseError};
use sqlx::SqlitePool;
use tracing::debug;

const MIGRATIONS: &[&str] = &[
    // V1: Page configuration as key/value rows
    "CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );",
    // V1: Reply rules, one per reel or post
    "CREATE TABLE IF NOT EXISTS rules (
        object_id TEXT PRIMARY KEY,
        match_words TEXT NOT NULL DEFAULT '[]',
        reply_message TEXT NOT NULL,
        inbox_message TEXT,
        enabled INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    );",
    // V1: Monitoring counters, single row
    "CREATE TABLE IF NOT EXISTS monitor_stats (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        total_checks INTEGER NOT NULL DEFAULT 0,
        total_replies INTEGER NOT NULL DEFAULT 0,
        total_private_replies INTEGER NOT NULL DEFAULT 0,
        last_check_time INTEGER,
        last_error TEXT,
        last_error_code TEXT
    );",
    "INSERT OR IGNORE INTO monitor_stats (id) VALUES (1);",
];

pub async fn run(pool: &SqlitePool) -> Result<(), CoreError> {
    for (index, migration) in MIGRATIONS.iter().enumerate() {
        sqlx::query(migration).execute(pool).await.map_err(|e| {
            CoreError::Database(DatabaseError::MigrationFailed {
                migration: format!("#{}: {}", index + 1, e),
            })
        })?;
    }
    debug!("Applied {} schema statements", MIGRATIONS.len());
    Ok(())
}
