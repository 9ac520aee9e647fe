use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

/// A named schema step, applied at most once per database.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    name: "0001_answer_cache.sql",
    sql: include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_answer_cache.sql"
    )),
}];

fn db_error(code: &str, message: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> AppError {
    let code = code.to_string();
    let message = message.into();
    move |e| AppError::new(code, message).with_details(e.to_string())
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    Connection::open(path).map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open answer cache database")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(db_error(
        "DB_OPEN_FAILED",
        "Failed to open in-memory answer cache database",
    ))
}

fn applied_migrations(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let mut stmt = conn
        .prepare("SELECT name FROM _migrations")
        .map_err(db_error("DB_MIGRATIONS_QUERY_FAILED", "Failed to query applied migrations"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(db_error("DB_MIGRATIONS_QUERY_FAILED", "Failed to read applied migrations"))?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(db_error("DB_MIGRATIONS_QUERY_FAILED", "Failed to read applied migration row"))?;
    Ok(names)
}

/// Bring the schema up to date. Each migration runs in its own transaction.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
           name TEXT PRIMARY KEY NOT NULL,
           applied_at TEXT NOT NULL
         );",
    )
    .map_err(db_error(
        "DB_MIGRATIONS_TABLE_FAILED",
        "Failed to ensure migrations table exists",
    ))?;

    let applied = applied_migrations(conn)?;
    for m in MIGRATIONS.iter().filter(|m| !applied.contains(m.name)) {
        let tx = conn
            .transaction()
            .map_err(db_error("DB_TX_FAILED", "Failed to start migration transaction"))?;
        tx.execute_batch(m.sql)
            .map_err(db_error("DB_MIGRATION_FAILED", format!("Migration {} failed", m.name)))?;
        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [m.name],
        )
        .map_err(db_error(
            "DB_MIGRATION_FAILED",
            format!("Failed to record migration {}", m.name),
        ))?;
        tx.commit()
            .map_err(db_error("DB_TX_FAILED", "Failed to commit migration transaction"))?;
        tracing::debug!(migration = m.name, "applied migration");
    }

    Ok(())
}
