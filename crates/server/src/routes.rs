use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use cinelog_core::error::ApiError;
use cinelog_core::page::{Page, PageParams};
use cinelog_core::types::{TitleKind, TitleRef};
use cinelog_db::repo;
use cinelog_db::repo::favorites::FavoriteSort;
use cinelog_db::repo::titles::TitleSort;
use cinelog_metadata::sync;
use serde::{Deserialize, Serialize};

use crate::auth::{AdminUser, AuthUser, issue_token};
use crate::error::AppError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    use tower_http::cors::CorsLayer;
    use tower_http::timeout::TimeoutLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        // Bounds slow upstream fetches on the detail/search paths.
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        // Auth
        .route("/auth/register", post(auth_register))
        .route("/auth/login", post(auth_login))
        // Users
        .route("/users/me", get(users_me))
        .route("/users/{id}", axum::routing::delete(delete_user_route))
        // Catalog
        .route("/movies", get(list_movies))
        .route("/movies/{id}", get(get_movie))
        .route("/series", get(list_series))
        .route("/series/{id}", get(get_series))
        .route("/people/{id}", get(get_person))
        // Reviews
        .route("/reviews", post(create_review).get(list_reviews))
        .route("/reviews/search", get(search_reviews))
        .route("/reviews/movie/{title_id}", get(movie_reviews))
        .route("/reviews/series/{title_id}", get(series_reviews))
        .route(
            "/reviews/{id}",
            axum::routing::put(update_review).delete(delete_review),
        )
        // Favorites
        .route("/favorites", post(create_favorite).get(list_favorites))
        .route("/favorites/{id}", axum::routing::delete(delete_favorite))
        // Catalog sync jobs
        .route("/admin/sync", post(start_sync))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/events", get(sse_events))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("database check failed: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    nickname: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize)]
struct UserResponse {
    id: String,
    username: String,
    nickname: String,
    role: String,
}

async fn auth_register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<UserResponse>), AppError> {
    if body.username.trim().is_empty() || body.nickname.trim().is_empty() {
        return Err(ApiError::BadRequest("username and nickname must be non-empty".into()).into());
    }
    if body.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()).into());
    }

    if repo::users::find_by_username(&state.db, &body.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("username is already taken".into()).into());
    }

    let id = repo::users::create_user(
        &state.db,
        &body.username,
        &body.password,
        &body.nickname,
        body.email.as_deref(),
        "user",
    )
    .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(UserResponse {
            id,
            username: body.username,
            nickname: body.nickname,
            role: "user".into(),
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user_id: String,
    username: String,
    nickname: String,
    role: String,
}

async fn auth_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = repo::users::find_by_username(&state.db, &body.username)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;

    let valid = repo::users::verify_password(&body.password, &user.password_hash)?;
    if !valid {
        return Err(ApiError::Unauthorized("invalid credentials".into()).into());
    }

    let token = issue_token(
        &user.id,
        &user.username,
        &user.nickname,
        &user.role,
        &state.jwt_secret,
    )?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        nickname: user.nickname,
        role: user.role,
    }))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

async fn users_me(auth: AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        id: auth.user_id,
        username: auth.username,
        nickname: auth.nickname,
        role: auth.role,
    })
}

/// Remove an account (self, or any account for admins). The account's
/// reviews are deleted one by one first so every affected title aggregate
/// is folded down before the row cascade fires.
async fn delete_user_route(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !auth.is_admin() && auth.user_id != user_id {
        return Err(ApiError::Forbidden("cannot delete another user's account".into()).into());
    }

    if repo::users::find_by_id(&state.db, &user_id).await?.is_none() {
        return Err(ApiError::NotFound("user not found".into()).into());
    }

    for review_id in repo::users::review_ids_for_user(&state.db, &user_id).await? {
        repo::reviews::delete_review(&state.db, review_id).await?;
    }

    repo::users::delete_user(&state.db, &user_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

fn default_sort() -> String {
    "id".to_string()
}

#[derive(Deserialize)]
struct TitleListQuery {
    #[serde(default)]
    keyword: String,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
    #[serde(default = "default_sort")]
    sort: String,
}

#[derive(Serialize)]
struct TitleSummaryResponse {
    id: i64,
    title: String,
    poster_url: Option<String>,
    release_date: Option<String>,
    average_rating: f64,
    rating_count: i64,
}

fn title_to_summary(row: repo::titles::TitleRow) -> TitleSummaryResponse {
    TitleSummaryResponse {
        id: row.id,
        title: row.title,
        poster_url: row.poster_url,
        release_date: row.release_date,
        average_rating: row.average_rating,
        rating_count: row.rating_count,
    }
}

async fn list_titles(
    state: &AppState,
    kind: TitleKind,
    query: TitleListQuery,
) -> Result<Json<Page<TitleSummaryResponse>>, AppError> {
    let sort = TitleSort::parse(&query.sort)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid sort '{}'", query.sort)))?;
    let params = PageParams::new(query.page, query.page_size);

    let page = sync::search_titles(
        &state.db,
        state.media.as_ref(),
        kind,
        &query.keyword,
        sort,
        params,
    )
    .await?;

    Ok(Json(page.map(title_to_summary)))
}

async fn list_movies(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<TitleListQuery>,
) -> Result<Json<Page<TitleSummaryResponse>>, AppError> {
    list_titles(&state, TitleKind::Movie, query).await
}

async fn list_series(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<TitleListQuery>,
) -> Result<Json<Page<TitleSummaryResponse>>, AppError> {
    list_titles(&state, TitleKind::Series, query).await
}

#[derive(Serialize)]
struct GenreResponse {
    id: i64,
    name: String,
}

#[derive(Serialize)]
struct CastResponse {
    person_id: i64,
    name: String,
    character: Option<String>,
    profile_url: Option<String>,
}

#[derive(Serialize)]
struct PersonSummaryResponse {
    id: i64,
    name: String,
    profile_url: Option<String>,
}

#[derive(Serialize)]
struct TitleDetailResponse {
    id: i64,
    kind: String,
    tmdb_id: i64,
    title: String,
    overview: Option<String>,
    status: String,
    poster_url: Option<String>,
    release_date: Option<String>,
    end_date: Option<String>,
    runtime_minutes: Option<i64>,
    episode_count: Option<i64>,
    country: Option<String>,
    company: Option<String>,
    average_rating: f64,
    rating_count: i64,
    genres: Vec<GenreResponse>,
    cast: Vec<CastResponse>,
    director: Option<PersonSummaryResponse>,
}

fn view_to_detail(view: sync::TitleDetailView) -> TitleDetailResponse {
    let t = view.title;
    TitleDetailResponse {
        id: t.id,
        kind: t.kind,
        tmdb_id: t.tmdb_id,
        title: t.title,
        overview: t.overview,
        status: t.status,
        poster_url: t.poster_url,
        release_date: t.release_date,
        end_date: t.end_date,
        runtime_minutes: t.runtime_minutes,
        episode_count: t.episode_count,
        country: t.country,
        company: t.company,
        average_rating: t.average_rating,
        rating_count: t.rating_count,
        genres: view
            .genres
            .into_iter()
            .map(|g| GenreResponse {
                id: g.id,
                name: g.name,
            })
            .collect(),
        cast: view
            .cast
            .into_iter()
            .map(|c| CastResponse {
                person_id: c.person_id,
                name: c.name,
                character: c.character_name,
                profile_url: c.profile_url,
            })
            .collect(),
        director: view.director.map(|d| PersonSummaryResponse {
            id: d.id,
            name: d.name,
            profile_url: d.profile_url,
        }),
    }
}

async fn get_movie(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TitleDetailResponse>, AppError> {
    let view = sync::get_title_detail(
        &state.db,
        state.media.as_ref(),
        &state.refresh_policy,
        TitleKind::Movie,
        id,
    )
    .await?;
    Ok(Json(view_to_detail(view)))
}

async fn get_series(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TitleDetailResponse>, AppError> {
    let view = sync::get_title_detail(
        &state.db,
        state.media.as_ref(),
        &state.refresh_policy,
        TitleKind::Series,
        id,
    )
    .await?;
    Ok(Json(view_to_detail(view)))
}

// ---------------------------------------------------------------------------
// People
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CreditResponse {
    title_id: i64,
    kind: String,
    title: String,
    poster_url: Option<String>,
    character: Option<String>,
}

#[derive(Serialize)]
struct PersonResponse {
    id: i64,
    name: String,
    profile_url: Option<String>,
    credits: Vec<CreditResponse>,
}

async fn get_person(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PersonResponse>, AppError> {
    let person = repo::people::get_person(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("person not found".into()))?;

    let credits = repo::people::credits_for_person(&state.db, id).await?;

    Ok(Json(PersonResponse {
        id: person.id,
        name: person.name,
        profile_url: person.profile_url,
        credits: credits
            .into_iter()
            .map(|c| CreditResponse {
                title_id: c.title_id,
                kind: c.kind,
                title: c.title,
                poster_url: c.poster_url,
                character: c.character_name,
            })
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateReviewRequest {
    title: TitleRef,
    rating: i32,
    content: String,
}

#[derive(Serialize)]
struct ReviewResponse {
    id: i64,
    user_id: String,
    nickname: String,
    title: TitleRef,
    rating: i64,
    content: String,
    created_ts: i64,
    updated_ts: i64,
}

fn review_to_response(row: repo::reviews::ReviewRow) -> ReviewResponse {
    let title = match TitleKind::parse(&row.title_kind) {
        Some(kind) => TitleRef::new(kind, row.title_id),
        // The kind column is CHECK-constrained; treat anything else as a movie.
        None => TitleRef::Movie(row.title_id),
    };
    ReviewResponse {
        id: row.id,
        user_id: row.user_id,
        nickname: row.nickname,
        title,
        rating: row.rating,
        content: row.content,
        created_ts: row.created_ts,
        updated_ts: row.updated_ts,
    }
}

async fn create_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(axum::http::StatusCode, Json<ReviewResponse>), AppError> {
    let review = repo::reviews::create_review(
        &state.db,
        &auth.user_id,
        body.title,
        body.rating,
        &body.content,
    )
    .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(review_to_response(review)),
    ))
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

async fn list_reviews(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ReviewResponse>>, AppError> {
    let params = PageParams::new(query.page, query.page_size);
    let page = repo::reviews::list_reviews(&state.db, params).await?;
    Ok(Json(page.map(review_to_response)))
}

#[derive(Deserialize)]
struct ReviewSearchQuery {
    keyword: String,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

async fn search_reviews(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ReviewSearchQuery>,
) -> Result<Json<Page<ReviewResponse>>, AppError> {
    let params = PageParams::new(query.page, query.page_size);
    let page = repo::reviews::search_reviews(&state.db, &query.keyword, params).await?;
    Ok(Json(page.map(review_to_response)))
}

#[derive(Serialize)]
struct TitleReviewsResponse {
    title_id: i64,
    average_rating: f64,
    rating_count: i64,
    reviews: Page<ReviewResponse>,
}

async fn title_reviews(
    state: &AppState,
    kind: TitleKind,
    title_id: i64,
    query: PageQuery,
) -> Result<Json<TitleReviewsResponse>, AppError> {
    let title = repo::titles::get_title_of_kind(&state.db, kind, title_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("title not found".into()))?;

    let params = PageParams::new(query.page, query.page_size);
    let page = repo::reviews::list_reviews_for_title(&state.db, title_id, params).await?;

    Ok(Json(TitleReviewsResponse {
        title_id: title.id,
        average_rating: title.average_rating,
        rating_count: title.rating_count,
        reviews: page.map(review_to_response),
    }))
}

async fn movie_reviews(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TitleReviewsResponse>, AppError> {
    title_reviews(&state, TitleKind::Movie, title_id, query).await
}

async fn series_reviews(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TitleReviewsResponse>, AppError> {
    title_reviews(&state, TitleKind::Series, title_id, query).await
}

/// Only the author (or an admin) may touch an existing review.
async fn ensure_review_access(
    auth: &AuthUser,
    state: &AppState,
    review_id: i64,
) -> Result<(), AppError> {
    let review = repo::reviews::get_review(&state.db, review_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("review not found".into()))?;

    if !auth.is_admin() && review.user_id != auth.user_id {
        return Err(ApiError::Forbidden("not the author of this review".into()).into());
    }
    Ok(())
}

#[derive(Deserialize)]
struct UpdateReviewRequest {
    #[serde(default)]
    rating: Option<i32>,
    #[serde(default)]
    content: Option<String>,
}

async fn update_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<ReviewResponse>, AppError> {
    ensure_review_access(&auth, &state, id).await?;

    let review =
        repo::reviews::update_review(&state.db, id, body.rating, body.content.as_deref()).await?;
    Ok(Json(review_to_response(review)))
}

async fn delete_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, AppError> {
    ensure_review_access(&auth, &state, id).await?;

    repo::reviews::delete_review(&state.db, id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Favorites
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateFavoriteRequest {
    title: TitleRef,
}

#[derive(Serialize)]
struct FavoriteResponse {
    id: i64,
    title: TitleRef,
    title_text: String,
    poster_url: Option<String>,
    average_rating: f64,
    rating_count: i64,
    created_ts: i64,
}

fn favorite_to_response(row: repo::favorites::FavoriteRow) -> FavoriteResponse {
    let title = match TitleKind::parse(&row.title_kind) {
        Some(kind) => TitleRef::new(kind, row.title_id),
        None => TitleRef::Movie(row.title_id),
    };
    FavoriteResponse {
        id: row.id,
        title,
        title_text: row.title,
        poster_url: row.poster_url,
        average_rating: row.average_rating,
        rating_count: row.rating_count,
        created_ts: row.created_ts,
    }
}

async fn create_favorite(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateFavoriteRequest>,
) -> Result<(axum::http::StatusCode, Json<FavoriteResponse>), AppError> {
    let favorite = repo::favorites::create_favorite(&state.db, &auth.user_id, body.title).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(favorite_to_response(favorite)),
    ))
}

#[derive(Deserialize)]
struct FavoriteListQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
    #[serde(default = "default_sort")]
    sort: String,
}

async fn list_favorites(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FavoriteListQuery>,
) -> Result<Json<Page<FavoriteResponse>>, AppError> {
    let sort = FavoriteSort::parse(&query.sort)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid sort '{}'", query.sort)))?;
    let params = PageParams::new(query.page, query.page_size);

    let page = repo::favorites::list_favorites(&state.db, &auth.user_id, sort, params).await?;
    Ok(Json(page.map(favorite_to_response)))
}

async fn delete_favorite(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, AppError> {
    let favorite = repo::favorites::get_favorite(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("favorite not found".into()))?;

    if !auth.is_admin() && favorite.user_id != auth.user_id {
        return Err(ApiError::Forbidden("not the owner of this favorite".into()).into());
    }

    repo::favorites::delete_favorite(&state.db, id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Catalog sync jobs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SyncRequest {
    kind: TitleKind,
    #[serde(default = "default_sync_pages")]
    pages: u32,
}

fn default_sync_pages() -> u32 {
    1
}

#[derive(Serialize)]
struct JobResponse {
    id: String,
    kind: String,
    status: String,
    progress: f64,
    payload: Option<serde_json::Value>,
    error: Option<String>,
    created_ts: i64,
    updated_ts: i64,
}

fn job_to_response(job: repo::jobs::JobRow) -> JobResponse {
    let payload = job
        .payload_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());
    JobResponse {
        id: job.id,
        kind: job.kind,
        status: job.status,
        progress: job.progress,
        payload,
        error: job.error,
        created_ts: job.created_ts,
        updated_ts: job.updated_ts,
    }
}

/// Kick off a background popular-list ingestion for one title kind.
async fn start_sync(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(body): Json<SyncRequest>,
) -> Result<(axum::http::StatusCode, Json<JobResponse>), AppError> {
    if body.pages == 0 || body.pages > 20 {
        return Err(ApiError::BadRequest("pages must be between 1 and 20".into()).into());
    }

    let payload = serde_json::json!({ "kind": body.kind, "pages": body.pages });
    let job = repo::jobs::create_job(&state.db, "catalog_sync", Some(&payload.to_string())).await?;

    let job_id = job.id.clone();
    let pool = state.db.clone();
    let media = state.media.clone();
    let events_tx = state.events.clone();
    let kind = body.kind;
    let pages = body.pages;
    tokio::spawn(async move {
        let _ = repo::jobs::update_job_status(&pool, &job_id, "running", 0.0, None).await;
        let _ = events_tx.send(crate::state::ServerEvent::JobUpdate {
            job_id: job_id.clone(),
            status: "running".into(),
            progress: 0.0,
        });

        let mut ingested: u64 = 0;
        let mut failure: Option<String> = None;
        for page in 1..=pages {
            match sync::ingest_popular_page(&pool, media.as_ref(), kind, page).await {
                Ok(count) => {
                    ingested += count as u64;
                    let progress = page as f64 / pages as f64;
                    let _ = repo::jobs::update_job_status(
                        &pool, &job_id, "running", progress, None,
                    )
                    .await;
                    let _ = events_tx.send(crate::state::ServerEvent::SyncProgress {
                        job_id: job_id.clone(),
                        kind: kind.to_string(),
                        page,
                        pages,
                        ingested,
                    });
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        match failure {
            None => {
                tracing::info!(job_id = %job_id, ingested, "catalog sync completed");
                let _ =
                    repo::jobs::update_job_status(&pool, &job_id, "completed", 1.0, None).await;
                let _ = events_tx.send(crate::state::ServerEvent::SyncComplete {
                    job_id: job_id.clone(),
                    ingested,
                });
                let _ = events_tx.send(crate::state::ServerEvent::JobUpdate {
                    job_id,
                    status: "completed".into(),
                    progress: 1.0,
                });
            }
            Some(error) => {
                tracing::error!(job_id = %job_id, error = %error, "catalog sync failed");
                let _ = repo::jobs::update_job_status(
                    &pool,
                    &job_id,
                    "failed",
                    0.0,
                    Some(&error),
                )
                .await;
                let _ = events_tx.send(crate::state::ServerEvent::JobUpdate {
                    job_id,
                    status: "failed".into(),
                    progress: 0.0,
                });
            }
        }
    });

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(job_to_response(job)),
    ))
}

async fn list_jobs(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<JobResponse>>, AppError> {
    let jobs = repo::jobs::list_jobs(&state.db).await?;
    Ok(Json(jobs.into_iter().map(job_to_response).collect()))
}

async fn get_job(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job = repo::jobs::get_job(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("job not found".into()))?;
    Ok(Json(job_to_response(job)))
}

async fn cancel_job(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cancelled = repo::jobs::cancel_job(&state.db, &id).await?;
    if !cancelled {
        return Err(ApiError::BadRequest("job not found or not cancellable".into()).into());
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ---------------------------------------------------------------------------
// SSE events
// ---------------------------------------------------------------------------

async fn sse_events(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> axum::response::Sse<
    impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>,
> {
    use axum::response::sse::Event;

    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(evt) => {
                    let event_type = match &evt {
                        crate::state::ServerEvent::SyncProgress { .. } => "sync_progress",
                        crate::state::ServerEvent::SyncComplete { .. } => "sync_complete",
                        crate::state::ServerEvent::JobUpdate { .. } => "job_update",
                        crate::state::ServerEvent::Heartbeat { .. } => "heartbeat",
                    };
                    if let Ok(data) = serde_json::to_string(&evt) {
                        yield Ok(Event::default().event(event_type).data(data));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(format!(r#"{{"lagged":{n}}}"#)));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    axum::response::Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
