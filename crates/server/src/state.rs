use std::sync::Arc;

use cinelog_metadata::provider::MediaSource;
use cinelog_metadata::refresh::RefreshPolicy;
use sqlx::SqlitePool;

/// Server-sent event types.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "sync_progress")]
    SyncProgress {
        job_id: String,
        kind: String,
        page: u32,
        pages: u32,
        ingested: u64,
    },
    #[serde(rename = "sync_complete")]
    SyncComplete { job_id: String, ingested: u64 },
    #[serde(rename = "job_update")]
    JobUpdate {
        job_id: String,
        status: String,
        progress: f64,
    },
    #[serde(rename = "heartbeat")]
    Heartbeat { seq: u64 },
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub jwt_secret: String,
    pub media: Arc<dyn MediaSource>,
    pub refresh_policy: RefreshPolicy,
    pub events: tokio::sync::broadcast::Sender<ServerEvent>,
}
