use cinelog_core::page::{Page, PageParams};
use cinelog_core::types::TitleKind;
use sqlx::SqlitePool;

/// Title row from the database. Movies and series share the table; the
/// kind column says which of the optional columns are meaningful.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TitleRow {
    pub id: i64,
    pub kind: String,
    pub tmdb_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub status: String,
    pub poster_url: Option<String>,
    pub release_date: Option<String>,
    pub end_date: Option<String>,
    pub runtime_minutes: Option<i64>,
    pub episode_count: Option<i64>,
    pub country: Option<String>,
    pub company: Option<String>,
    pub average_rating: f64,
    pub rating_count: i64,
    pub fetch_date: Option<String>,
    pub director_id: Option<i64>,
    pub created_ts: i64,
    pub updated_ts: i64,
}

const TITLE_COLUMNS: &str = "id, kind, tmdb_id, title, overview, status, poster_url, \
     release_date, end_date, runtime_minutes, episode_count, country, company, \
     average_rating, rating_count, fetch_date, director_id, created_ts, updated_ts";

/// Descriptive fields seen on a list/search result. Used by the upsert
/// path, which must never touch the rating aggregate.
#[derive(Debug, Clone)]
pub struct TitleSummaryPatch {
    pub tmdb_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_url: Option<String>,
}

/// Full descriptive payload written by a detail refresh.
#[derive(Debug, Clone, Default)]
pub struct TitleDetailPatch {
    pub title: String,
    pub overview: Option<String>,
    pub status: String,
    pub poster_url: Option<String>,
    pub release_date: Option<String>,
    pub end_date: Option<String>,
    pub runtime_minutes: Option<i64>,
    pub episode_count: Option<i64>,
    pub country: Option<String>,
    pub company: Option<String>,
    pub fetch_date: String,
    pub director_id: Option<i64>,
}

/// Sort order for title listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSort {
    Id,
    Rating,
    RatingCount,
}

impl TitleSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(Self::Id),
            "rating" => Some(Self::Rating),
            "rating_count" => Some(Self::RatingCount),
            _ => None,
        }
    }

    fn order_clause(self) -> &'static str {
        match self {
            Self::Id => "id ASC",
            Self::Rating => "average_rating DESC, id ASC",
            Self::RatingCount => "rating_count DESC, id ASC",
        }
    }
}

pub async fn get_title(pool: &SqlitePool, title_id: i64) -> Result<Option<TitleRow>, sqlx::Error> {
    let sql = format!("SELECT {TITLE_COLUMNS} FROM title WHERE id = ?");
    sqlx::query_as(&sql).bind(title_id).fetch_optional(pool).await
}

pub async fn get_title_of_kind(
    pool: &SqlitePool,
    kind: TitleKind,
    title_id: i64,
) -> Result<Option<TitleRow>, sqlx::Error> {
    let sql = format!("SELECT {TITLE_COLUMNS} FROM title WHERE id = ? AND kind = ?");
    sqlx::query_as(&sql)
        .bind(title_id)
        .bind(kind.as_str())
        .fetch_optional(pool)
        .await
}

pub async fn get_title_by_external_id(
    pool: &SqlitePool,
    kind: TitleKind,
    tmdb_id: i64,
) -> Result<Option<TitleRow>, sqlx::Error> {
    let sql = format!("SELECT {TITLE_COLUMNS} FROM title WHERE kind = ? AND tmdb_id = ?");
    sqlx::query_as(&sql)
        .bind(kind.as_str())
        .bind(tmdb_id)
        .fetch_optional(pool)
        .await
}

/// Keyword page over one kind. Matching ignores case and spaces, so
/// "darkknight" finds "The Dark Knight".
pub async fn search_titles(
    pool: &SqlitePool,
    kind: TitleKind,
    keyword: &str,
    sort: TitleSort,
    params: PageParams,
) -> Result<Page<TitleRow>, sqlx::Error> {
    let needle = keyword.to_lowercase().replace(' ', "");

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM title \
         WHERE kind = ? AND lower(replace(title, ' ', '')) LIKE '%' || ? || '%'",
    )
    .bind(kind.as_str())
    .bind(&needle)
    .fetch_one(pool)
    .await?;

    let sql = format!(
        "SELECT {TITLE_COLUMNS} FROM title \
         WHERE kind = ? AND lower(replace(title, ' ', '')) LIKE '%' || ? || '%' \
         ORDER BY {} LIMIT ? OFFSET ?",
        sort.order_clause()
    );
    let rows: Vec<TitleRow> = sqlx::query_as(&sql)
        .bind(kind.as_str())
        .bind(&needle)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

    Ok(Page::new(rows, total, params))
}

/// Insert a title seen on a list/search response, or update its
/// descriptive fields if the external id is already known. The rating
/// aggregate columns are owned by the review path and are left alone.
pub async fn upsert_summary(
    pool: &SqlitePool,
    kind: TitleKind,
    patch: &TitleSummaryPatch,
) -> Result<i64, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO title (kind, tmdb_id, title, overview, release_date, poster_url, \
                            created_ts, updated_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(kind, tmdb_id) DO UPDATE SET \
             title = excluded.title, \
             overview = excluded.overview, \
             release_date = excluded.release_date, \
             poster_url = excluded.poster_url, \
             updated_ts = excluded.updated_ts \
         RETURNING id",
    )
    .bind(kind.as_str())
    .bind(patch.tmdb_id)
    .bind(&patch.title)
    .bind(&patch.overview)
    .bind(&patch.release_date)
    .bind(&patch.poster_url)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Overwrite a title's descriptive fields after a detail fetch.
pub async fn save_detail(
    pool: &SqlitePool,
    title_id: i64,
    patch: &TitleDetailPatch,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "UPDATE title SET \
             title = ?, overview = ?, status = ?, poster_url = ?, release_date = ?, \
             end_date = ?, runtime_minutes = ?, episode_count = ?, country = ?, \
             company = ?, fetch_date = ?, director_id = ?, updated_ts = ? \
         WHERE id = ?",
    )
    .bind(&patch.title)
    .bind(&patch.overview)
    .bind(&patch.status)
    .bind(&patch.poster_url)
    .bind(&patch.release_date)
    .bind(&patch.end_date)
    .bind(patch.runtime_minutes)
    .bind(patch.episode_count)
    .bind(&patch.country)
    .bind(&patch.company)
    .bind(&patch.fetch_date)
    .bind(patch.director_id)
    .bind(now)
    .bind(title_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace the genre links for a title.
pub async fn set_genres(
    pool: &SqlitePool,
    title_id: i64,
    genre_ids: &[i64],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM title_genre WHERE title_id = ?")
        .bind(title_id)
        .execute(&mut *tx)
        .await?;
    for genre_id in genre_ids {
        sqlx::query("INSERT OR IGNORE INTO title_genre (title_id, genre_id) VALUES (?, ?)")
            .bind(title_id)
            .bind(genre_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Replace the cast links for a title, preserving source order.
pub async fn set_cast(
    pool: &SqlitePool,
    title_id: i64,
    cast: &[(i64, Option<String>)],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM title_cast WHERE title_id = ?")
        .bind(title_id)
        .execute(&mut *tx)
        .await?;
    for (position, (person_id, character_name)) in cast.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO title_cast (title_id, person_id, character_name, position) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(title_id)
        .bind(person_id)
        .bind(character_name)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = crate::connect(":memory:").await.unwrap();
        crate::migrate::run(&pool).await.unwrap();
        pool
    }

    fn patch(tmdb_id: i64, title: &str) -> TitleSummaryPatch {
        TitleSummaryPatch {
            tmdb_id,
            title: title.to_string(),
            overview: Some("overview".into()),
            release_date: Some("2020-01-01".into()),
            poster_url: None,
        }
    }

    #[tokio::test]
    async fn upsert_summary_is_keyed_on_external_id() {
        let pool = test_pool().await;

        let id1 = upsert_summary(&pool, TitleKind::Movie, &patch(550, "Fight Club"))
            .await
            .unwrap();
        let id2 = upsert_summary(&pool, TitleKind::Movie, &patch(550, "Fight Club (updated)"))
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let row = get_title(&pool, id1).await.unwrap().unwrap();
        assert_eq!(row.title, "Fight Club (updated)");

        let row = get_title_by_external_id(&pool, TitleKind::Movie, 550)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.id, id1);

        // Same external id under the other kind is a distinct row.
        let id3 = upsert_summary(&pool, TitleKind::Series, &patch(550, "Some Show"))
            .await
            .unwrap();
        assert_ne!(id1, id3);
        assert!(
            get_title_by_external_id(&pool, TitleKind::Series, 550)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn upsert_summary_never_touches_the_aggregate() {
        let pool = test_pool().await;
        let id = upsert_summary(&pool, TitleKind::Movie, &patch(603, "The Matrix"))
            .await
            .unwrap();

        sqlx::query("UPDATE title SET average_rating = 8.5, rating_count = 2 WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        upsert_summary(&pool, TitleKind::Movie, &patch(603, "The Matrix (refetched)"))
            .await
            .unwrap();

        let row = get_title(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.title, "The Matrix (refetched)");
        assert_eq!(row.rating_count, 2);
        assert!((row.average_rating - 8.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn search_matches_ignoring_case_and_spaces() {
        let pool = test_pool().await;
        upsert_summary(&pool, TitleKind::Movie, &patch(155, "The Dark Knight"))
            .await
            .unwrap();
        upsert_summary(&pool, TitleKind::Movie, &patch(603, "The Matrix"))
            .await
            .unwrap();

        let page = search_titles(
            &pool,
            TitleKind::Movie,
            "darkknight",
            TitleSort::Id,
            PageParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].title, "The Dark Knight");

        let page = search_titles(
            &pool,
            TitleKind::Series,
            "darkknight",
            TitleSort::Id,
            PageParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.total_items, 0);
    }

    #[tokio::test]
    async fn sort_by_rating_orders_descending() {
        let pool = test_pool().await;
        let a = upsert_summary(&pool, TitleKind::Movie, &patch(1, "Alpha")).await.unwrap();
        let b = upsert_summary(&pool, TitleKind::Movie, &patch(2, "Beta")).await.unwrap();
        sqlx::query("UPDATE title SET average_rating = 4.0, rating_count = 1 WHERE id = ?")
            .bind(a)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE title SET average_rating = 9.0, rating_count = 3 WHERE id = ?")
            .bind(b)
            .execute(&pool)
            .await
            .unwrap();

        let page = search_titles(
            &pool,
            TitleKind::Movie,
            "",
            TitleSort::Rating,
            PageParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.items[0].id, b);
        assert_eq!(page.items[1].id, a);
    }
}
