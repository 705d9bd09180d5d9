use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{types::Type, Connection, Row};
use urbalert_shared::{Location, Report, User};

use crate::{error::AppError, DbPool};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn connection_manager(database_url: &str) -> SqliteConnectionManager {
    let manager = if database_url == ":memory:" {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(database_url)
    };

    manager.with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
    })
}

pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            email         TEXT,
            display_name  TEXT,
            phone_number  TEXT,
            role          TEXT NOT NULL DEFAULT 'user',
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now')),
            last_login_at TEXT
        );

        CREATE TABLE IF NOT EXISTS reports (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            report_type TEXT NOT NULL,
            description TEXT NOT NULL,
            latitude    REAL NOT NULL,
            longitude   REAL NOT NULL,
            photo_url   TEXT,
            status      TEXT NOT NULL DEFAULT 'pending',
            user_id     TEXT NOT NULL REFERENCES users(id),
            votes       INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_reports_latitude ON reports(latitude);
        CREATE INDEX IF NOT EXISTS idx_reports_status_type ON reports(status, report_type);
        CREATE INDEX IF NOT EXISTS idx_reports_user ON reports(user_id);

        CREATE TABLE IF NOT EXISTS votes (
            report_id   INTEGER NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            vote_type   TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (report_id, user_id)
        );
        ",
    )?;

    Ok(())
}

/// Runs blocking database work on the blocking thread pool with a pooled
/// connection. The connection is released before the future resolves.
pub async fn run<F, T>(pool: &DbPool, work: F) -> Result<T, AppError>
where
    F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        work(&mut conn)
    })
    .await?
}

pub const REPORT_COLUMNS: &str = "id, report_type, description, latitude, longitude, photo_url, \
     status, user_id, votes, created_at, updated_at";

pub const USER_COLUMNS: &str =
    "id, email, display_name, phone_number, role, created_at, updated_at, last_login_at";

/// Reads a TEXT column holding one of the shared wire enums.
pub fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Maps a row selected with [`REPORT_COLUMNS`].
pub fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: row.get(0)?,
        report_type: parse_column(row, 1)?,
        description: row.get(2)?,
        location: Location {
            latitude: row.get(3)?,
            longitude: row.get(4)?,
        },
        photo_url: row.get(5)?,
        status: parse_column(row, 6)?,
        user_id: row.get(7)?,
        votes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Maps a row selected with [`USER_COLUMNS`].
pub fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        phone_number: row.get(3)?,
        role: parse_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        last_login_at: row.get(7)?,
    })
}

pub fn find_report(conn: &Connection, id: i64) -> Result<Report, AppError> {
    use rusqlite::OptionalExtension;

    conn.query_row(
        &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"),
        [id],
        report_from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound("report"))
}

pub fn find_user(conn: &Connection, id: &str) -> Result<User, AppError> {
    use rusqlite::OptionalExtension;

    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound("user"))
}
