use cinelog_core::page::{Page, PageParams};
use cinelog_core::types::TitleRef;
use sqlx::SqlitePool;

use crate::DbError;

/// Favorite row joined with the title it points at.
#[derive(Debug, Clone)]
pub struct FavoriteRow {
    pub id: i64,
    pub user_id: String,
    pub title_id: i64,
    pub title_kind: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_ts: i64,
}

type FavoriteTuple = (
    i64,
    String,
    i64,
    String,
    String,
    Option<String>,
    f64,
    i64,
    i64,
);

const FAVORITE_SELECT: &str = "SELECT f.id, f.user_id, f.title_id, t.kind, t.title, t.poster_url, \
     t.average_rating, t.rating_count, f.created_ts \
     FROM favorite f JOIN title t ON t.id = f.title_id";

fn row_to_favorite(r: FavoriteTuple) -> FavoriteRow {
    FavoriteRow {
        id: r.0,
        user_id: r.1,
        title_id: r.2,
        title_kind: r.3,
        title: r.4,
        poster_url: r.5,
        average_rating: r.6,
        rating_count: r.7,
        created_ts: r.8,
    }
}

/// Sort order for a user's favorites page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteSort {
    Id,
    Rating,
}

impl FavoriteSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(Self::Id),
            "rating" => Some(Self::Rating),
            _ => None,
        }
    }

    fn order_clause(self) -> &'static str {
        match self {
            Self::Id => "f.id DESC",
            Self::Rating => "t.average_rating DESC, f.id DESC",
        }
    }
}

pub async fn create_favorite(
    pool: &SqlitePool,
    user_id: &str,
    title_ref: TitleRef,
) -> Result<FavoriteRow, DbError> {
    let title: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM title WHERE id = ? AND kind = ?")
            .bind(title_ref.id())
            .bind(title_ref.kind().as_str())
            .fetch_optional(pool)
            .await?;
    if title.is_none() {
        return Err(DbError::TitleNotFound);
    }

    let now = chrono::Utc::now().timestamp();
    let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
        "INSERT INTO favorite (user_id, title_id, created_ts) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(title_ref.id())
    .bind(now)
    .fetch_one(pool)
    .await;

    let (id,) = match inserted {
        Ok(row) => row,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(DbError::DuplicateFavorite);
        }
        Err(e) => return Err(e.into()),
    };

    get_favorite(pool, id)
        .await?
        .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
}

pub async fn get_favorite(
    pool: &SqlitePool,
    favorite_id: i64,
) -> Result<Option<FavoriteRow>, sqlx::Error> {
    let sql = format!("{FAVORITE_SELECT} WHERE f.id = ?");
    let row: Option<FavoriteTuple> = sqlx::query_as(&sql)
        .bind(favorite_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(row_to_favorite))
}

pub async fn list_favorites(
    pool: &SqlitePool,
    user_id: &str,
    sort: FavoriteSort,
    params: PageParams,
) -> Result<Page<FavoriteRow>, sqlx::Error> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM favorite WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "{FAVORITE_SELECT} WHERE f.user_id = ? ORDER BY {} LIMIT ? OFFSET ?",
        sort.order_clause()
    );
    let rows: Vec<FavoriteTuple> = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok(Page::new(
        rows.into_iter().map(row_to_favorite).collect(),
        total,
        params,
    ))
}

pub async fn delete_favorite(pool: &SqlitePool, favorite_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM favorite WHERE id = ?")
        .bind(favorite_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::titles::{self, TitleSummaryPatch};
    use cinelog_core::types::TitleKind;

    async fn test_pool() -> SqlitePool {
        let pool = crate::connect(":memory:").await.unwrap();
        crate::migrate::run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn favorite_lifecycle_and_duplicates() {
        let pool = test_pool().await;
        let user = crate::repo::users::create_user(&pool, "alice", "pw123456", "Alice", None, "user")
            .await
            .unwrap();
        let movie = titles::upsert_summary(
            &pool,
            TitleKind::Movie,
            &TitleSummaryPatch {
                tmdb_id: 550,
                title: "Fight Club".into(),
                overview: None,
                release_date: None,
                poster_url: None,
            },
        )
        .await
        .unwrap();

        let fav = create_favorite(&pool, &user, TitleRef::Movie(movie))
            .await
            .unwrap();
        assert_eq!(fav.title, "Fight Club");

        let err = create_favorite(&pool, &user, TitleRef::Movie(movie))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateFavorite));

        let err = create_favorite(&pool, &user, TitleRef::Series(movie))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::TitleNotFound));

        let page = list_favorites(&pool, &user, FavoriteSort::Id, PageParams::default())
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);

        assert!(delete_favorite(&pool, fav.id).await.unwrap());
        assert!(!delete_favorite(&pool, fav.id).await.unwrap());
    }
}
