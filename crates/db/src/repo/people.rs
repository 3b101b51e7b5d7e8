use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct GenreRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PersonRow {
    pub id: i64,
    pub name: String,
    pub profile_url: Option<String>,
}

/// A cast credit attached to a title, in billing order.
#[derive(Debug, Clone)]
pub struct CastRow {
    pub person_id: i64,
    pub name: String,
    pub profile_url: Option<String>,
    pub character_name: Option<String>,
    pub position: i64,
}

/// A title a person is credited on.
#[derive(Debug, Clone)]
pub struct CreditRow {
    pub title_id: i64,
    pub kind: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub character_name: Option<String>,
}

/// Resolve a genre by external id, creating the row on first sight.
/// Re-running with the same id is a no-op, which is what makes the
/// metadata backfill idempotent.
pub async fn ensure_genre(pool: &SqlitePool, id: i64, name: &str) -> Result<i64, sqlx::Error> {
    sqlx::query("INSERT INTO genre (id, name) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(id)
}

/// Resolve a person (actor or director) by external id, creating the row
/// on first sight.
pub async fn ensure_person(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    profile_url: Option<&str>,
) -> Result<i64, sqlx::Error> {
    sqlx::query(
        "INSERT INTO person (id, name, profile_url) VALUES (?, ?, ?) \
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(id)
    .bind(name)
    .bind(profile_url)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn get_person(pool: &SqlitePool, id: i64) -> Result<Option<PersonRow>, sqlx::Error> {
    let row: Option<(i64, String, Option<String>)> =
        sqlx::query_as("SELECT id, name, profile_url FROM person WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(id, name, profile_url)| PersonRow {
        id,
        name,
        profile_url,
    }))
}

pub async fn count_genres(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM genre")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn count_people(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM person")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Genres attached to a title.
pub async fn genres_for_title(
    pool: &SqlitePool,
    title_id: i64,
) -> Result<Vec<GenreRow>, sqlx::Error> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT g.id, g.name FROM genre g \
         JOIN title_genre tg ON tg.genre_id = g.id \
         WHERE tg.title_id = ? ORDER BY g.name",
    )
    .bind(title_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name)| GenreRow { id, name })
        .collect())
}

/// Cast attached to a title, in billing order.
pub async fn cast_for_title(pool: &SqlitePool, title_id: i64) -> Result<Vec<CastRow>, sqlx::Error> {
    let rows: Vec<(i64, String, Option<String>, Option<String>, i64)> = sqlx::query_as(
        "SELECT p.id, p.name, p.profile_url, tc.character_name, tc.position \
         FROM title_cast tc JOIN person p ON p.id = tc.person_id \
         WHERE tc.title_id = ? ORDER BY tc.position",
    )
    .bind(title_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| CastRow {
            person_id: r.0,
            name: r.1,
            profile_url: r.2,
            character_name: r.3,
            position: r.4,
        })
        .collect())
}

/// Titles a person is credited on: cast credits plus directing credits.
pub async fn credits_for_person(
    pool: &SqlitePool,
    person_id: i64,
) -> Result<Vec<CreditRow>, sqlx::Error> {
    let rows: Vec<(i64, String, String, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT t.id, t.kind, t.title, t.poster_url, tc.character_name \
         FROM title_cast tc JOIN title t ON t.id = tc.title_id \
         WHERE tc.person_id = ? \
         UNION \
         SELECT t.id, t.kind, t.title, t.poster_url, NULL \
         FROM title t WHERE t.director_id = ? \
         ORDER BY 1",
    )
    .bind(person_id)
    .bind(person_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| CreditRow {
            title_id: r.0,
            kind: r.1,
            title: r.2,
            poster_url: r.3,
            character_name: r.4,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = crate::connect(":memory:").await.unwrap();
        crate::migrate::run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn ensure_is_idempotent_by_external_id() {
        let pool = test_pool().await;

        ensure_genre(&pool, 18, "Drama").await.unwrap();
        ensure_genre(&pool, 18, "Drama").await.unwrap();
        assert_eq!(count_genres(&pool).await.unwrap(), 1);

        ensure_person(&pool, 287, "Brad Pitt", None).await.unwrap();
        ensure_person(&pool, 287, "Brad Pitt", Some("http://img/287.jpg"))
            .await
            .unwrap();
        assert_eq!(count_people(&pool).await.unwrap(), 1);

        // First write wins; a re-run does not clobber the existing row.
        let p = get_person(&pool, 287).await.unwrap().unwrap();
        assert_eq!(p.name, "Brad Pitt");
        assert!(p.profile_url.is_none());
    }
}
