//! Fetch-or-refresh decision for cached title detail.

use chrono::NaiveDate;

/// Titles in this status have settled metadata and are never auto-refreshed.
const RELEASED: &str = "Released";

/// Decides whether a cached title detail is servable as-is or must be
/// re-fetched from the source first. The thresholds are injected so tests
/// (and deployments) can vary them.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// How long an unreleased title's detail stays fresh.
    pub stale_after: chrono::Duration,
    /// How many credited cast members are attached on a refresh.
    pub cast_limit: usize,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            stale_after: chrono::Duration::days(7),
            cast_limit: 5,
        }
    }
}

impl RefreshPolicy {
    /// `true` when the title has never been detail-fetched, or when it is
    /// not yet released and its last fetch is older than the staleness
    /// window. Released titles keep their cached detail indefinitely.
    pub fn needs_refresh(&self, status: &str, fetch_date: Option<NaiveDate>, today: NaiveDate) -> bool {
        match fetch_date {
            None => true,
            Some(fetched) => status != RELEASED && fetched < today - self.stale_after,
        }
    }
}
