//! TMDB (The Movie Database) source client.
//!
//! Uses TMDB API v3: https://developer.themoviedb.org/docs

use std::time::Duration;

use tracing::debug;

use crate::provider::MediaSource;
use crate::{CastRecord, CrewRecord, DetailRecord, GenreRecord, MetadataError, SummaryRecord};
use cinelog_core::types::TitleKind;

const BASE_URL: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

pub struct TmdbClient {
    api_key: String,
    client: reqwest::Client,
}

impl TmdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, MetadataError> {
        let mut all_params = vec![("api_key", self.api_key.as_str())];
        all_params.extend_from_slice(params);

        let url = format!("{BASE_URL}{path}");
        debug!(url = %url, "TMDB request");

        let resp = self
            .client
            .get(&url)
            .query(&all_params)
            .send()
            .await
            .map_err(|e| MetadataError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound);
        }

        if !resp.status().is_success() {
            return Err(MetadataError::Provider(format!(
                "TMDB returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| MetadataError::Provider(format!("parse JSON: {e}")))
    }
}

#[async_trait::async_trait]
impl MediaSource for TmdbClient {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn popular(
        &self,
        kind: TitleKind,
        page: u32,
    ) -> Result<Vec<SummaryRecord>, MetadataError> {
        let path = match kind {
            TitleKind::Movie => "/movie/popular",
            TitleKind::Series => "/tv/popular",
        };
        let page_str = page.to_string();
        let data = self.get_json(path, &[("page", &page_str)]).await?;
        Ok(parse_summaries(&data, kind))
    }

    async fn search(
        &self,
        kind: TitleKind,
        keyword: &str,
    ) -> Result<Vec<SummaryRecord>, MetadataError> {
        let path = match kind {
            TitleKind::Movie => "/search/movie",
            TitleKind::Series => "/search/tv",
        };
        let data = self.get_json(path, &[("query", keyword)]).await?;
        Ok(parse_summaries(&data, kind))
    }

    async fn detail(&self, kind: TitleKind, tmdb_id: i64) -> Result<DetailRecord, MetadataError> {
        let path = match kind {
            TitleKind::Movie => format!("/movie/{tmdb_id}"),
            TitleKind::Series => format!("/tv/{tmdb_id}"),
        };
        let data = self
            .get_json(&path, &[("append_to_response", "credits")])
            .await?;

        Ok(match kind {
            TitleKind::Movie => parse_movie_detail(&data),
            TitleKind::Series => parse_series_detail(&data),
        })
    }
}

fn parse_summaries(data: &serde_json::Value, kind: TitleKind) -> Vec<SummaryRecord> {
    let (title_key, date_key) = match kind {
        TitleKind::Movie => ("title", "release_date"),
        TitleKind::Series => ("name", "first_air_date"),
    };
    let results = data["results"].as_array().cloned().unwrap_or_default();

    results
        .iter()
        .filter_map(|r| {
            let tmdb_id = r["id"].as_i64()?;
            Some(SummaryRecord {
                tmdb_id,
                title: r[title_key].as_str().unwrap_or("Unknown").to_string(),
                overview: r["overview"].as_str().map(|s| s.to_string()),
                release_date: r[date_key]
                    .as_str()
                    .filter(|d| !d.is_empty())
                    .map(|s| s.to_string()),
                poster_url: r["poster_path"]
                    .as_str()
                    .map(|p| format!("{IMAGE_BASE}/w500{p}")),
            })
        })
        .collect()
}

fn parse_movie_detail(data: &serde_json::Value) -> DetailRecord {
    DetailRecord {
        tmdb_id: data["id"].as_i64().unwrap_or(0),
        title: data["title"].as_str().unwrap_or("Unknown").to_string(),
        overview: data["overview"].as_str().map(|s| s.to_string()),
        status: data["status"].as_str().unwrap_or("").to_string(),
        poster_url: data["poster_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/original{p}")),
        release_date: data["release_date"]
            .as_str()
            .filter(|d| !d.is_empty())
            .map(|s| s.to_string()),
        end_date: None,
        runtime_minutes: data["runtime"].as_i64(),
        episode_count: None,
        country: first_name(&data["production_countries"]),
        company: first_name(&data["production_companies"]),
        genres: parse_genres(&data["genres"]),
        cast: parse_cast(data.get("credits")),
        crew: parse_crew(data.get("credits")),
    }
}

fn parse_series_detail(data: &serde_json::Value) -> DetailRecord {
    DetailRecord {
        tmdb_id: data["id"].as_i64().unwrap_or(0),
        title: data["name"].as_str().unwrap_or("Unknown").to_string(),
        overview: data["overview"].as_str().map(|s| s.to_string()),
        status: data["status"].as_str().unwrap_or("").to_string(),
        poster_url: data["poster_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/original{p}")),
        release_date: data["first_air_date"]
            .as_str()
            .filter(|d| !d.is_empty())
            .map(|s| s.to_string()),
        end_date: data["last_air_date"]
            .as_str()
            .filter(|d| !d.is_empty())
            .map(|s| s.to_string()),
        runtime_minutes: None,
        episode_count: data["number_of_episodes"].as_i64(),
        country: first_name(&data["production_countries"]),
        company: first_name(&data["production_companies"]),
        genres: parse_genres(&data["genres"]),
        cast: parse_cast(data.get("credits")),
        crew: parse_crew(data.get("credits")),
    }
}

fn first_name(value: &serde_json::Value) -> Option<String> {
    value
        .as_array()
        .and_then(|a| a.first())
        .and_then(|v| v["name"].as_str())
        .map(|s| s.to_string())
}

fn parse_genres(value: &serde_json::Value) -> Vec<GenreRecord> {
    value
        .as_array()
        .map(|gs| {
            gs.iter()
                .filter_map(|g| {
                    Some(GenreRecord {
                        id: g["id"].as_i64()?,
                        name: g["name"].as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_cast(credits: Option<&serde_json::Value>) -> Vec<CastRecord> {
    let Some(credits) = credits else {
        return Vec::new();
    };
    credits["cast"]
        .as_array()
        .map(|cast| {
            cast.iter()
                .filter_map(|person| {
                    Some(CastRecord {
                        id: person["id"].as_i64()?,
                        name: person["name"].as_str().unwrap_or("").to_string(),
                        character: person["character"].as_str().map(|s| s.to_string()),
                        profile_url: person["profile_path"]
                            .as_str()
                            .map(|p| format!("{IMAGE_BASE}/w185{p}")),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_crew(credits: Option<&serde_json::Value>) -> Vec<CrewRecord> {
    let Some(credits) = credits else {
        return Vec::new();
    };
    credits["crew"]
        .as_array()
        .map(|crew| {
            crew.iter()
                .filter_map(|person| {
                    Some(CrewRecord {
                        id: person["id"].as_i64()?,
                        name: person["name"].as_str().unwrap_or("").to_string(),
                        job: person["job"].as_str().unwrap_or("").to_string(),
                        profile_url: person["profile_path"]
                            .as_str()
                            .map(|p| format!("{IMAGE_BASE}/w185{p}")),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_movie_detail_from_json() {
        let json = serde_json::json!({
            "id": 550,
            "title": "Fight Club",
            "overview": "An insomniac office worker...",
            "status": "Released",
            "release_date": "1999-10-15",
            "runtime": 139,
            "poster_path": "/poster.jpg",
            "production_countries": [
                { "iso_3166_1": "US", "name": "United States of America" }
            ],
            "production_companies": [
                { "name": "Fox 2000 Pictures" }
            ],
            "genres": [
                { "id": 18, "name": "Drama" }
            ],
            "credits": {
                "cast": [
                    { "id": 819, "name": "Edward Norton", "character": "The Narrator", "profile_path": "/norton.jpg" },
                    { "id": 287, "name": "Brad Pitt", "character": "Tyler Durden", "profile_path": "/pitt.jpg" }
                ],
                "crew": [
                    { "id": 7467, "name": "David Fincher", "job": "Director", "profile_path": "/fincher.jpg" },
                    { "id": 7469, "name": "Jim Uhls", "job": "Screenplay", "profile_path": null }
                ]
            }
        });

        let detail = parse_movie_detail(&json);
        assert_eq!(detail.tmdb_id, 550);
        assert_eq!(detail.title, "Fight Club");
        assert_eq!(detail.status, "Released");
        assert_eq!(detail.runtime_minutes, Some(139));
        assert_eq!(detail.country.as_deref(), Some("United States of America"));
        assert_eq!(detail.company.as_deref(), Some("Fox 2000 Pictures"));
        assert_eq!(detail.genres.len(), 1);
        assert_eq!(detail.cast.len(), 2);
        assert_eq!(detail.cast[0].character.as_deref(), Some("The Narrator"));
        assert_eq!(detail.crew.len(), 2);
        assert_eq!(detail.crew[0].job, "Director");
        assert!(detail.poster_url.as_ref().unwrap().contains("/poster.jpg"));
    }

    #[test]
    fn parse_series_detail_from_json() {
        let json = serde_json::json!({
            "id": 1396,
            "name": "Breaking Bad",
            "overview": "A high school chemistry teacher...",
            "status": "Ended",
            "first_air_date": "2008-01-20",
            "last_air_date": "2013-09-29",
            "number_of_episodes": 62,
            "production_countries": [
                { "iso_3166_1": "US", "name": "United States of America" }
            ],
            "genres": [
                { "id": 18, "name": "Drama" }
            ]
        });

        let detail = parse_series_detail(&json);
        assert_eq!(detail.tmdb_id, 1396);
        assert_eq!(detail.title, "Breaking Bad");
        assert_eq!(detail.status, "Ended");
        assert_eq!(detail.episode_count, Some(62));
        assert_eq!(detail.end_date.as_deref(), Some("2013-09-29"));
        assert!(detail.cast.is_empty());
    }

    #[test]
    fn parse_summaries_skips_entries_without_an_id() {
        let json = serde_json::json!({
            "results": [
                { "id": 603, "title": "The Matrix", "release_date": "1999-03-30", "poster_path": "/m.jpg" },
                { "title": "No Id Here" },
                { "id": 604, "title": "The Matrix Reloaded", "release_date": "" }
            ]
        });

        let summaries = parse_summaries(&json, TitleKind::Movie);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].tmdb_id, 603);
        assert!(summaries[0].poster_url.as_ref().unwrap().contains("/m.jpg"));
        // Empty release dates are dropped rather than stored as "".
        assert!(summaries[1].release_date.is_none());
    }
}
