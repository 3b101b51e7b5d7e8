//! Catalog synchronization against the external media source.
//!
//! Three paths touch the source: a detail refresh (fetch-on-miss /
//! fetch-on-stale per `RefreshPolicy`), the zero-result search fallback,
//! and popular-list ingestion. All of them write descriptive fields only;
//! the rating aggregate is owned by the review path and is never written
//! from here.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use cinelog_core::page::{Page, PageParams};
use cinelog_core::types::TitleKind;
use cinelog_db::repo::people::{self, CastRow, GenreRow, PersonRow};
use cinelog_db::repo::titles::{
    self, TitleDetailPatch, TitleRow, TitleSort, TitleSummaryPatch,
};

use crate::provider::MediaSource;
use crate::refresh::RefreshPolicy;
use crate::{MetadataError, SummaryRecord};

/// A title row together with its attached genres, cast, and director.
#[derive(Debug, Clone)]
pub struct TitleDetailView {
    pub title: TitleRow,
    pub genres: Vec<GenreRow>,
    pub cast: Vec<CastRow>,
    pub director: Option<PersonRow>,
}

/// Load a title's detail, refreshing from the source first when the
/// policy demands it.
///
/// Failure policy: a title that has never been detail-fetched propagates
/// the upstream error; a stale-but-cached title degrades to its cached
/// detail with a warning.
pub async fn get_title_detail(
    pool: &SqlitePool,
    source: &dyn MediaSource,
    policy: &RefreshPolicy,
    kind: TitleKind,
    title_id: i64,
) -> Result<TitleDetailView, MetadataError> {
    let row = titles::get_title_of_kind(pool, kind, title_id)
        .await?
        .ok_or(MetadataError::NotFound)?;

    let today = chrono::Utc::now().date_naive();
    let fetched = parse_fetch_date(row.fetch_date.as_deref());

    if policy.needs_refresh(&row.status, fetched, today) {
        match refresh_title(pool, source, policy, &row).await {
            Ok(()) => {}
            Err(e) if fetched.is_some() => {
                warn!(title_id, error = %e, "refresh failed, serving cached detail");
            }
            Err(e) => return Err(e),
        }
    }

    let row = titles::get_title(pool, title_id)
        .await?
        .ok_or(MetadataError::NotFound)?;
    load_view(pool, row).await.map_err(MetadataError::from)
}

/// Fetch full detail for one title and overwrite its local record,
/// resolving genre/cast/director rows by external id as they are seen.
/// Re-running against the same source payload creates no duplicate rows.
pub async fn refresh_title(
    pool: &SqlitePool,
    source: &dyn MediaSource,
    policy: &RefreshPolicy,
    row: &TitleRow,
) -> Result<(), MetadataError> {
    let kind = TitleKind::parse(&row.kind)
        .ok_or_else(|| MetadataError::Provider(format!("unknown title kind {}", row.kind)))?;

    let detail = source.detail(kind, row.tmdb_id).await?;
    debug!(title_id = row.id, tmdb_id = row.tmdb_id, "fetched detail");

    let mut genre_ids = Vec::with_capacity(detail.genres.len());
    for genre in &detail.genres {
        people::ensure_genre(pool, genre.id, &genre.name).await?;
        genre_ids.push(genre.id);
    }

    let mut cast_links = Vec::new();
    for member in detail.cast.iter().take(policy.cast_limit) {
        people::ensure_person(pool, member.id, &member.name, member.profile_url.as_deref())
            .await?;
        cast_links.push((member.id, member.character.clone()));
    }

    // Director is the first crew entry credited with that exact job.
    let mut director_id = None;
    if let Some(director) = detail.crew.iter().find(|c| c.job == "Director") {
        people::ensure_person(pool, director.id, &director.name, director.profile_url.as_deref())
            .await?;
        director_id = Some(director.id);
    }

    let patch = TitleDetailPatch {
        title: detail.title,
        overview: detail.overview,
        status: detail.status,
        poster_url: detail.poster_url,
        release_date: detail.release_date,
        end_date: detail.end_date,
        runtime_minutes: detail.runtime_minutes,
        episode_count: detail.episode_count,
        country: detail.country,
        company: detail.company,
        fetch_date: chrono::Utc::now().date_naive().to_string(),
        director_id,
    };
    titles::save_detail(pool, row.id, &patch).await?;
    titles::set_genres(pool, row.id, &genre_ids).await?;
    titles::set_cast(pool, row.id, &cast_links).await?;

    Ok(())
}

/// Keyword page over the local catalog with the one-shot upstream
/// fallback: a zero-match result triggers exactly one fetch-and-persist
/// cycle before the query is repeated. A still-empty second query is an
/// empty page, not an error.
pub async fn search_titles(
    pool: &SqlitePool,
    source: &dyn MediaSource,
    kind: TitleKind,
    keyword: &str,
    sort: TitleSort,
    params: PageParams,
) -> Result<Page<TitleRow>, MetadataError> {
    let page = titles::search_titles(pool, kind, keyword, sort, params).await?;
    if page.total_items > 0 {
        return Ok(page);
    }

    let fetched = if keyword.trim().is_empty() {
        ingest_popular_page(pool, source, kind, 1).await?
    } else {
        ingest_search(pool, source, kind, keyword).await?
    };
    debug!(kind = %kind, keyword, fetched, "local miss, ingested from source");

    Ok(titles::search_titles(pool, kind, keyword, sort, params).await?)
}

/// Persist one page of the source's popular list. Returns how many
/// records were upserted.
pub async fn ingest_popular_page(
    pool: &SqlitePool,
    source: &dyn MediaSource,
    kind: TitleKind,
    page: u32,
) -> Result<usize, MetadataError> {
    let records = source.popular(kind, page).await?;
    upsert_records(pool, kind, &records).await?;
    info!(kind = %kind, page, count = records.len(), "ingested popular page");
    Ok(records.len())
}

async fn ingest_search(
    pool: &SqlitePool,
    source: &dyn MediaSource,
    kind: TitleKind,
    keyword: &str,
) -> Result<usize, MetadataError> {
    let records = source.search(kind, keyword).await?;
    upsert_records(pool, kind, &records).await?;
    Ok(records.len())
}

async fn upsert_records(
    pool: &SqlitePool,
    kind: TitleKind,
    records: &[SummaryRecord],
) -> Result<(), sqlx::Error> {
    for record in records {
        titles::upsert_summary(
            pool,
            kind,
            &TitleSummaryPatch {
                tmdb_id: record.tmdb_id,
                title: record.title.clone(),
                overview: record.overview.clone(),
                release_date: record.release_date.clone(),
                poster_url: record.poster_url.clone(),
            },
        )
        .await?;
    }
    Ok(())
}

async fn load_view(pool: &SqlitePool, row: TitleRow) -> Result<TitleDetailView, sqlx::Error> {
    let genres = people::genres_for_title(pool, row.id).await?;
    let cast = people::cast_for_title(pool, row.id).await?;
    let director = match row.director_id {
        Some(id) => people::get_person(pool, id).await?,
        None => None,
    };
    Ok(TitleDetailView {
        title: row,
        genres,
        cast,
        director,
    })
}

fn parse_fetch_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CastRecord, CrewRecord, DetailRecord, GenreRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory stand-in for TMDB with call counters.
    struct StubSource {
        detail: DetailRecord,
        search_results: Vec<SummaryRecord>,
        popular_results: Vec<SummaryRecord>,
        fail: bool,
        detail_calls: AtomicUsize,
        search_calls: AtomicUsize,
        popular_calls: AtomicUsize,
    }

    impl StubSource {
        fn new(detail: DetailRecord) -> Self {
            Self {
                detail,
                search_results: Vec::new(),
                popular_results: Vec::new(),
                fail: false,
                detail_calls: AtomicUsize::new(0),
                search_calls: AtomicUsize::new(0),
                popular_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl MediaSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        async fn popular(
            &self,
            _kind: TitleKind,
            _page: u32,
        ) -> Result<Vec<SummaryRecord>, MetadataError> {
            self.popular_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MetadataError::Network("stub offline".into()));
            }
            Ok(self.popular_results.clone())
        }

        async fn search(
            &self,
            _kind: TitleKind,
            _keyword: &str,
        ) -> Result<Vec<SummaryRecord>, MetadataError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MetadataError::Network("stub offline".into()));
            }
            Ok(self.search_results.clone())
        }

        async fn detail(
            &self,
            _kind: TitleKind,
            _tmdb_id: i64,
        ) -> Result<DetailRecord, MetadataError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MetadataError::Network("stub offline".into()));
            }
            Ok(self.detail.clone())
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = cinelog_db::connect(":memory:").await.unwrap();
        cinelog_db::migrate::run(&pool).await.unwrap();
        pool
    }

    async fn seed_stub_movie(pool: &SqlitePool, tmdb_id: i64, title: &str) -> i64 {
        titles::upsert_summary(
            pool,
            TitleKind::Movie,
            &TitleSummaryPatch {
                tmdb_id,
                title: title.to_string(),
                overview: None,
                release_date: None,
                poster_url: None,
            },
        )
        .await
        .unwrap()
    }

    fn full_detail(tmdb_id: i64) -> DetailRecord {
        DetailRecord {
            tmdb_id,
            title: "Fight Club".into(),
            overview: Some("An insomniac office worker...".into()),
            status: "Released".into(),
            poster_url: Some("http://img/poster.jpg".into()),
            release_date: Some("1999-10-15".into()),
            runtime_minutes: Some(139),
            country: Some("United States of America".into()),
            company: Some("Fox 2000 Pictures".into()),
            genres: vec![
                GenreRecord { id: 18, name: "Drama".into() },
                GenreRecord { id: 53, name: "Thriller".into() },
            ],
            cast: (0..7)
                .map(|i| CastRecord {
                    id: 100 + i,
                    name: format!("Actor {i}"),
                    character: Some(format!("Role {i}")),
                    profile_url: None,
                })
                .collect(),
            crew: vec![
                CrewRecord {
                    id: 7469,
                    name: "Jim Uhls".into(),
                    job: "Screenplay".into(),
                    profile_url: None,
                },
                CrewRecord {
                    id: 7467,
                    name: "David Fincher".into(),
                    job: "Director".into(),
                    profile_url: None,
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn refresh_backfill_is_idempotent_and_caps_cast() {
        let pool = test_pool().await;
        let source = StubSource::new(full_detail(550));
        let policy = RefreshPolicy::default();
        let id = seed_stub_movie(&pool, 550, "stub").await;

        // Run the refresh twice against the same payload; the second pass
        // must not mint new genre/person rows.
        for _ in 0..2 {
            let row = titles::get_title(&pool, id).await.unwrap().unwrap();
            refresh_title(&pool, &source, &policy, &row).await.unwrap();
        }
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 2);

        let view = get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap();
        assert_eq!(view.title.title, "Fight Club");
        assert_eq!(view.genres.len(), 2);
        assert_eq!(view.cast.len(), 5);
        assert_eq!(view.cast[0].character_name.as_deref(), Some("Role 0"));
        assert_eq!(view.director.as_ref().unwrap().name, "David Fincher");

        // Two genres, five cast members, one director; no duplicates.
        assert_eq!(people::count_genres(&pool).await.unwrap(), 2);
        assert_eq!(people::count_people(&pool).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn released_titles_are_fetched_once() {
        let pool = test_pool().await;
        let source = StubSource::new(full_detail(550));
        let policy = RefreshPolicy::default();
        let id = seed_stub_movie(&pool, 550, "stub").await;

        get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap();
        get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap();

        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_unreleased_titles_are_refetched() {
        let pool = test_pool().await;
        let source = StubSource::new(DetailRecord {
            status: "In Production".into(),
            ..full_detail(550)
        });
        let policy = RefreshPolicy::default();
        let id = seed_stub_movie(&pool, 550, "stub").await;

        get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap();
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 1);

        // Fresh fetch date: no second upstream call.
        get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap();
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 1);

        // Age the fetch date past the window: the next read refetches.
        let old = (chrono::Utc::now().date_naive() - chrono::Duration::days(8)).to_string();
        sqlx::query("UPDATE title SET fetch_date = ? WHERE id = ?")
            .bind(&old)
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap();
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn upstream_failure_propagates_only_without_cached_detail() {
        let pool = test_pool().await;
        let mut source = StubSource::new(full_detail(550));
        source.fail = true;
        let policy = RefreshPolicy::default();
        let id = seed_stub_movie(&pool, 550, "stub").await;

        // Never fetched: the failure surfaces.
        let err = get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Network(_)));

        // Cached but stale: the read degrades to the cached row.
        let old = (chrono::Utc::now().date_naive() - chrono::Duration::days(30)).to_string();
        sqlx::query("UPDATE title SET fetch_date = ?, status = 'In Production' WHERE id = ?")
            .bind(&old)
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        let view = get_title_detail(&pool, &source, &policy, TitleKind::Movie, id)
            .await
            .unwrap();
        assert_eq!(view.title.title, "stub");
    }

    #[tokio::test]
    async fn zero_match_search_falls_back_upstream_exactly_once() {
        let pool = test_pool().await;
        let mut source = StubSource::new(full_detail(550));
        source.search_results = vec![
            SummaryRecord {
                tmdb_id: 603,
                title: "The Matrix".into(),
                overview: None,
                release_date: Some("1999-03-30".into()),
                poster_url: None,
            },
            SummaryRecord {
                tmdb_id: 604,
                title: "The Matrix Reloaded".into(),
                overview: None,
                release_date: None,
                poster_url: None,
            },
        ];

        let page = search_titles(
            &pool,
            &source,
            TitleKind::Movie,
            "matrix",
            TitleSort::Id,
            PageParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(page.total_items, 2);
        assert_eq!(source.search_calls.load(Ordering::SeqCst), 1);

        // A warm catalog answers locally.
        search_titles(
            &pool,
            &source,
            TitleKind::Movie,
            "matrix",
            TitleSort::Id,
            PageParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(source.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_that_finds_nothing_yields_an_empty_page() {
        let pool = test_pool().await;
        let source = StubSource::new(full_detail(550));

        let page = search_titles(
            &pool,
            &source,
            TitleKind::Series,
            "no such show",
            TitleSort::Id,
            PageParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(page.total_items, 0);
        assert!(page.items.is_empty());
        assert_eq!(source.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_keyword_fallback_pulls_the_popular_list() {
        let pool = test_pool().await;
        let mut source = StubSource::new(full_detail(550));
        source.popular_results = vec![SummaryRecord {
            tmdb_id: 278,
            title: "The Shawshank Redemption".into(),
            overview: None,
            release_date: None,
            poster_url: None,
        }];

        let page = search_titles(
            &pool,
            &source,
            TitleKind::Movie,
            "",
            TitleSort::Id,
            PageParams::default(),
        )
        .await
        .unwrap();

        assert_eq!(page.total_items, 1);
        assert_eq!(source.popular_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.search_calls.load(Ordering::SeqCst), 0);
    }
}
