use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use password_hash::rand_core::OsRng;
use sqlx::SqlitePool;

/// User row from the database.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub nickname: String,
    pub role: String,
    pub created_ts: i64,
}

type UserTuple = (String, String, String, Option<String>, String, String, i64);

fn row_to_user(r: UserTuple) -> UserRow {
    UserRow {
        id: r.0,
        username: r.1,
        password_hash: r.2,
        email: r.3,
        nickname: r.4,
        role: r.5,
        created_ts: r.6,
    }
}

/// Create a new user. Returns the user ID.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    nickname: &str,
    email: Option<&str>,
    role: &str,
) -> Result<String, crate::DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    let hash = hash_password(password)?;
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO user_account (id, username, password_hash, email, nickname, role, created_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(username)
    .bind(&hash)
    .bind(email)
    .bind(nickname)
    .bind(role)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Find user by username.
pub async fn find_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    let row: Option<UserTuple> = sqlx::query_as(
        "SELECT id, username, password_hash, email, nickname, role, created_ts \
         FROM user_account WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_user))
}

/// Find user by ID.
pub async fn find_by_id(pool: &SqlitePool, user_id: &str) -> Result<Option<UserRow>, sqlx::Error> {
    let row: Option<UserTuple> = sqlx::query_as(
        "SELECT id, username, password_hash, email, nickname, role, created_ts \
         FROM user_account WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_user))
}

/// Delete a user by ID. Their reviews cascade away, but the title
/// aggregates are corrected by the caller before this runs.
pub async fn delete_user(pool: &SqlitePool, user_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM user_account WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Review ids authored by a user, oldest first.
pub async fn review_ids_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM review WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Check if any users exist (for admin bootstrap).
pub async fn count_users(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_account")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, crate::DbError> {
    let parsed = PasswordHash::new(hash).map_err(|e| crate::DbError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn hash_password(password: &str) -> Result<String, crate::DbError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| crate::DbError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}
