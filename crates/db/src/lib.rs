pub mod migrate;
pub mod repo;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("password hash error: {0}")]
    Hash(String),
    #[error("duplicate review for this title")]
    DuplicateReview,
    #[error("duplicate favorite for this title")]
    DuplicateFavorite,
    #[error("review not found")]
    ReviewNotFound,
    #[error("title not found")]
    TitleNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid rating: {0}")]
    InvalidRating(i32),
    #[error("review content must not be blank")]
    BlankContent,
    #[error("write conflict on title aggregate")]
    WriteConflict,
}

/// Create a SQLite connection pool with WAL mode enabled.
///
/// The busy timeout matters: review writes run read-modify-write
/// transactions against the title aggregate, and concurrent writers must
/// queue on the writer lock instead of failing immediately.
pub async fn connect(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    // Ensure parent directory exists
    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let opts = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    // An in-memory SQLite database is private to its connection, so the
    // pool must stay at exactly one or later connections see empty schemas.
    let max_connections = if db_path.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await?;

    Ok(pool)
}
