use cinelog_core::page::{Page, PageParams};
use cinelog_core::rating::{self, RatingAggregate};
use cinelog_core::types::TitleRef;
use sqlx::SqlitePool;
use tracing::debug;

use crate::DbError;

/// Writes retry the whole transaction this many times when SQLite reports
/// a writer conflict before surfacing `WriteConflict`.
const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub id: i64,
    pub user_id: String,
    pub nickname: String,
    pub title_id: i64,
    pub title_kind: String,
    pub rating: i64,
    pub content: String,
    pub created_ts: i64,
    pub updated_ts: i64,
}

const REVIEW_SELECT: &str = "SELECT r.id, r.user_id, u.nickname, r.title_id, t.kind, r.rating, \
     r.content, r.created_ts, r.updated_ts \
     FROM review r \
     JOIN user_account u ON u.id = r.user_id \
     JOIN title t ON t.id = r.title_id";

type ReviewTuple = (
    i64,
    String,
    String,
    i64,
    String,
    i64,
    String,
    i64,
    i64,
);

fn row_to_review(r: ReviewTuple) -> ReviewRow {
    ReviewRow {
        id: r.0,
        user_id: r.1,
        nickname: r.2,
        title_id: r.3,
        title_kind: r.4,
        rating: r.5,
        content: r.6,
        created_ts: r.7,
        updated_ts: r.8,
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// SQLite surfaces writer contention as BUSY (code 5) or LOCKED (code 6);
/// in WAL mode a snapshot-upgrade conflict also lands here. The whole
/// transaction is safe to rerun.
fn is_busy(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5") | Some("6") | Some("517"))
        }
        _ => false,
    }
}

/// Create a review and fold its rating into the title aggregate.
///
/// The review insert and the aggregate update commit or roll back as one
/// transaction; the one-review-per-(user, title) rule is the UNIQUE
/// constraint on the review table, with the violation mapped to
/// `DuplicateReview`.
pub async fn create_review(
    pool: &SqlitePool,
    user_id: &str,
    title_ref: TitleRef,
    rating_value: i32,
    content: &str,
) -> Result<ReviewRow, DbError> {
    if !rating::is_valid_rating(rating_value) {
        return Err(DbError::InvalidRating(rating_value));
    }
    if content.trim().is_empty() {
        return Err(DbError::BlankContent);
    }

    let user: Option<(String,)> = sqlx::query_as("SELECT id FROM user_account WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if user.is_none() {
        return Err(DbError::UserNotFound);
    }

    let mut attempt = 0;
    let review_id = loop {
        attempt += 1;
        match try_create(pool, user_id, title_ref, rating_value, content).await {
            Ok(id) => break id,
            Err(DbError::Sqlx(e)) if is_busy(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                debug!(attempt, "review create hit writer conflict, retrying");
            }
            Err(DbError::Sqlx(e)) if is_busy(&e) => return Err(DbError::WriteConflict),
            Err(e) => return Err(e),
        }
    };

    Ok(get_review(pool, review_id).await?.ok_or(DbError::ReviewNotFound)?)
}

async fn try_create(
    pool: &SqlitePool,
    user_id: &str,
    title_ref: TitleRef,
    rating_value: i32,
    content: &str,
) -> Result<i64, DbError> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    // The insert comes first so the transaction holds the write lock from
    // its opening statement; the aggregate read below then sees a state no
    // other writer can move under us.
    let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
        "INSERT INTO review (user_id, title_id, rating, content, created_ts, updated_ts) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(title_ref.id())
    .bind(rating_value)
    .bind(content)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await;

    let (review_id,) = match inserted {
        Ok(row) => row,
        Err(e) if is_unique_violation(&e) => return Err(DbError::DuplicateReview),
        Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
            return Err(DbError::TitleNotFound);
        }
        Err(e) => return Err(e.into()),
    };

    let agg: Option<(f64, i64)> = sqlx::query_as(
        "SELECT average_rating, rating_count FROM title WHERE id = ? AND kind = ?",
    )
    .bind(title_ref.id())
    .bind(title_ref.kind().as_str())
    .fetch_optional(&mut *tx)
    .await?;
    let Some((average, count)) = agg else {
        // A row of the other kind satisfied the FK; roll the insert back.
        return Err(DbError::TitleNotFound);
    };

    let next = RatingAggregate::new(average, count).apply_create(rating_value);
    write_aggregate(&mut tx, title_ref.id(), next).await?;

    tx.commit().await?;
    Ok(review_id)
}

/// Patch a review. A rating change shifts the title average by the
/// difference without moving the count; the content is replaced only when
/// the new value is non-blank.
pub async fn update_review(
    pool: &SqlitePool,
    review_id: i64,
    new_rating: Option<i32>,
    new_content: Option<&str>,
) -> Result<ReviewRow, DbError> {
    if let Some(r) = new_rating {
        if !rating::is_valid_rating(r) {
            return Err(DbError::InvalidRating(r));
        }
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_update(pool, review_id, new_rating, new_content).await {
            Ok(()) => break,
            Err(DbError::Sqlx(e)) if is_busy(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                debug!(attempt, "review update hit writer conflict, retrying");
            }
            Err(DbError::Sqlx(e)) if is_busy(&e) => return Err(DbError::WriteConflict),
            Err(e) => return Err(e),
        }
    }

    Ok(get_review(pool, review_id).await?.ok_or(DbError::ReviewNotFound)?)
}

async fn try_update(
    pool: &SqlitePool,
    review_id: i64,
    new_rating: Option<i32>,
    new_content: Option<&str>,
) -> Result<(), DbError> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT title_id, rating FROM review WHERE id = ?")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((title_id, old_rating)) = row else {
        return Err(DbError::ReviewNotFound);
    };
    let old_rating = old_rating as i32;

    // The aggregate moves only when the rating actually changes.
    if let Some(new) = new_rating {
        if new != old_rating {
            let (average, count): (f64, i64) = sqlx::query_as(
                "SELECT average_rating, rating_count FROM title WHERE id = ?",
            )
            .bind(title_id)
            .fetch_one(&mut *tx)
            .await?;

            let next = RatingAggregate::new(average, count).apply_update(old_rating, new);
            write_aggregate(&mut tx, title_id, next).await?;

            sqlx::query("UPDATE review SET rating = ?, updated_ts = ? WHERE id = ?")
                .bind(new)
                .bind(now)
                .bind(review_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    if let Some(content) = new_content {
        if !content.trim().is_empty() {
            sqlx::query("UPDATE review SET content = ?, updated_ts = ? WHERE id = ?")
                .bind(content)
                .bind(now)
                .bind(review_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Delete a review and fold its rating back out of the title aggregate.
pub async fn delete_review(pool: &SqlitePool, review_id: i64) -> Result<(), DbError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_delete(pool, review_id).await {
            Ok(()) => return Ok(()),
            Err(DbError::Sqlx(e)) if is_busy(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                debug!(attempt, "review delete hit writer conflict, retrying");
            }
            Err(DbError::Sqlx(e)) if is_busy(&e) => return Err(DbError::WriteConflict),
            Err(e) => return Err(e),
        }
    }
}

async fn try_delete(pool: &SqlitePool, review_id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    // Writer-first, same as create: the delete takes the lock and tells us
    // which title to fold the rating back out of.
    let row: Option<(i64, i64)> =
        sqlx::query_as("DELETE FROM review WHERE id = ? RETURNING title_id, rating")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((title_id, rating_value)) = row else {
        return Err(DbError::ReviewNotFound);
    };

    let (average, count): (f64, i64) =
        sqlx::query_as("SELECT average_rating, rating_count FROM title WHERE id = ?")
            .bind(title_id)
            .fetch_one(&mut *tx)
            .await?;

    let next = RatingAggregate::new(average, count).apply_delete(rating_value as i32);
    write_aggregate(&mut tx, title_id, next).await?;

    tx.commit().await?;
    Ok(())
}

async fn write_aggregate(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    title_id: i64,
    agg: RatingAggregate,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE title SET average_rating = ?, rating_count = ?, updated_ts = ? WHERE id = ?")
        .bind(agg.average)
        .bind(agg.count)
        .bind(chrono::Utc::now().timestamp())
        .bind(title_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn get_review(
    pool: &SqlitePool,
    review_id: i64,
) -> Result<Option<ReviewRow>, sqlx::Error> {
    let sql = format!("{REVIEW_SELECT} WHERE r.id = ?");
    let row: Option<ReviewTuple> = sqlx::query_as(&sql)
        .bind(review_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(row_to_review))
}

/// All reviews, newest first.
pub async fn list_reviews(
    pool: &SqlitePool,
    params: PageParams,
) -> Result<Page<ReviewRow>, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM review")
        .fetch_one(pool)
        .await?;

    let sql = format!("{REVIEW_SELECT} ORDER BY r.id DESC LIMIT ? OFFSET ?");
    let rows: Vec<ReviewTuple> = sqlx::query_as(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok(Page::new(
        rows.into_iter().map(row_to_review).collect(),
        total,
        params,
    ))
}

/// Reviews attached to one title, newest first.
pub async fn list_reviews_for_title(
    pool: &SqlitePool,
    title_id: i64,
    params: PageParams,
) -> Result<Page<ReviewRow>, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM review WHERE title_id = ?")
        .bind(title_id)
        .fetch_one(pool)
        .await?;

    let sql = format!("{REVIEW_SELECT} WHERE r.title_id = ? ORDER BY r.id DESC LIMIT ? OFFSET ?");
    let rows: Vec<ReviewTuple> = sqlx::query_as(&sql)
        .bind(title_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok(Page::new(
        rows.into_iter().map(row_to_review).collect(),
        total,
        params,
    ))
}

/// Keyword search over author nickname and review content.
pub async fn search_reviews(
    pool: &SqlitePool,
    keyword: &str,
    params: PageParams,
) -> Result<Page<ReviewRow>, sqlx::Error> {
    let pattern = format!("%{keyword}%");

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM review r JOIN user_account u ON u.id = r.user_id \
         WHERE u.nickname LIKE ? OR r.content LIKE ?",
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    let sql = format!(
        "{REVIEW_SELECT} WHERE u.nickname LIKE ? OR r.content LIKE ? \
         ORDER BY r.id DESC LIMIT ? OFFSET ?"
    );
    let rows: Vec<ReviewTuple> = sqlx::query_as(&sql)
        .bind(&pattern)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok(Page::new(
        rows.into_iter().map(row_to_review).collect(),
        total,
        params,
    ))
}
