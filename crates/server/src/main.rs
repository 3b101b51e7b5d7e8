use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // DB path: use CINELOG_DB env or default
    let db_path = std::env::var("CINELOG_DB").unwrap_or_else(|_| "cinelog.db".to_string());
    info!(db_path = %db_path, "connecting to database");

    let pool = cinelog_db::connect(&db_path)
        .await
        .context("failed to connect to database")?;

    // Run migrations
    cinelog_db::migrate::run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("migrations complete");

    // Bootstrap admin if no users exist
    let user_count = cinelog_db::repo::users::count_users(&pool)
        .await
        .context("failed to count users")?;

    if user_count == 0 {
        let admin_pass =
            std::env::var("CINELOG_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
        cinelog_db::repo::users::create_user(
            &pool,
            "admin",
            &admin_pass,
            "Administrator",
            None,
            "admin",
        )
        .await
        .context("failed to bootstrap admin user")?;
        info!("admin user bootstrapped (username: admin)");
    }

    // JWT secret: use env or generate random
    let jwt_secret =
        std::env::var("CINELOG_JWT_SECRET").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

    // Media source (TMDB)
    let tmdb_key = std::env::var("CINELOG_TMDB_KEY").unwrap_or_default();
    if tmdb_key.is_empty() {
        warn!("CINELOG_TMDB_KEY is not set; catalog fetches will fail until it is");
    }
    let media: Arc<dyn cinelog_metadata::provider::MediaSource> =
        Arc::new(cinelog_metadata::tmdb::TmdbClient::new(tmdb_key));

    // Refresh policy thresholds
    let stale_after_days: i64 = std::env::var("CINELOG_STALE_AFTER_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(7);
    let cast_limit: usize = std::env::var("CINELOG_CAST_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let refresh_policy = cinelog_metadata::refresh::RefreshPolicy {
        stale_after: chrono::Duration::days(stale_after_days),
        cast_limit,
    };

    // Event broadcast channel
    let (events_tx, _) =
        tokio::sync::broadcast::channel::<cinelog_server::state::ServerEvent>(256);

    // Spawn heartbeat emitter
    {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            let mut seq = 0u64;
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                let _ = tx.send(cinelog_server::state::ServerEvent::Heartbeat { seq });
                seq += 1;
            }
        });
    }

    let app_state = cinelog_server::state::AppState {
        db: pool,
        jwt_secret,
        media,
        refresh_policy,
        events: events_tx,
    };

    let app = cinelog_server::routes::build_router(app_state);

    let bind_addr = std::env::var("CINELOG_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("failed to bind")?;
    info!(addr = %bind_addr, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
