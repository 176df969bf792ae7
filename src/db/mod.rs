//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    init_database_from_url(&db_url).await
}

/// Initialize from a raw SQLite URL (also used by tests with `sqlite::memory:`).
pub async fn init_database_from_url(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone_number TEXT NOT NULL UNIQUE,
            age INTEGER NOT NULL,
            place TEXT,
            registration_date TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_accounts (
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            must_change_password INTEGER NOT NULL DEFAULT 0,
            member_id TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS change_requests (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL,
            member_email TEXT NOT NULL,
            change_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            before_snapshot TEXT NOT NULL,
            requested TEXT,
            submitted_by TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            reviewed_by TEXT,
            reviewed_at TEXT,
            rejection_reason TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    // At most one PENDING request per member, enforced by the store itself.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_change_requests_pending
            ON change_requests(member_id) WHERE status = 'PENDING';
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_members_name ON members(name);
        CREATE INDEX IF NOT EXISTS idx_members_registration_date ON members(registration_date);
        CREATE INDEX IF NOT EXISTS idx_user_accounts_member_id ON user_accounts(member_id);
        CREATE INDEX IF NOT EXISTS idx_change_requests_status_submitted
            ON change_requests(status, submitted_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
