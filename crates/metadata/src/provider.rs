use cinelog_core::types::TitleKind;

use crate::{DetailRecord, MetadataError, SummaryRecord};

/// An external media database that can list, search, and describe titles.
#[async_trait::async_trait]
pub trait MediaSource: Send + Sync {
    fn name(&self) -> &str;

    /// One page of the source's popular list for a kind. Pages are 1-based.
    async fn popular(
        &self,
        kind: TitleKind,
        page: u32,
    ) -> Result<Vec<SummaryRecord>, MetadataError>;

    /// Keyword search for a kind.
    async fn search(
        &self,
        kind: TitleKind,
        keyword: &str,
    ) -> Result<Vec<SummaryRecord>, MetadataError>;

    /// Full detail for one title by its external id, credits included.
    async fn detail(&self, kind: TitleKind, tmdb_id: i64) -> Result<DetailRecord, MetadataError>;
}
