pub mod provider;
pub mod refresh;
pub mod sync;
pub mod tmdb;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("not found")]
    NotFound,
    #[error("db error: {0}")]
    Db(#[from] sqlx::Error),
}

/// A title as it appears on a list or search response from the source.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SummaryRecord {
    pub tmdb_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_url: Option<String>,
}

/// Full detail payload for one title, credits included.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DetailRecord {
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
    pub genres: Vec<GenreRecord>,
    pub cast: Vec<CastRecord>,
    pub crew: Vec<CrewRecord>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenreRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CastRecord {
    pub id: i64,
    pub name: String,
    pub character: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CrewRecord {
    pub id: i64,
    pub name: String,
    pub job: String,
    pub profile_url: Option<String>,
}
