use serde::{Deserialize, Serialize};

/// Catalog entry kind stored in the `title.kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleKind {
    Movie,
    Series,
}

impl TitleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "series" => Some(Self::Series),
            _ => None,
        }
    }
}

impl std::fmt::Display for TitleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to exactly one catalog title. A review or favorite always
/// points at a movie or a series, never both and never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TitleRef {
    Movie(i64),
    Series(i64),
}

impl TitleRef {
    pub fn kind(self) -> TitleKind {
        match self {
            Self::Movie(_) => TitleKind::Movie,
            Self::Series(_) => TitleKind::Series,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::Movie(id) | Self::Series(id) => id,
        }
    }

    pub fn new(kind: TitleKind, id: i64) -> Self {
        match kind {
            TitleKind::Movie => Self::Movie(id),
            TitleKind::Series => Self::Series(id),
        }
    }
}

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_ref_round_trips_kind_and_id() {
        let r = TitleRef::new(TitleKind::Series, 42);
        assert_eq!(r.kind(), TitleKind::Series);
        assert_eq!(r.id(), 42);

        let json = serde_json::to_value(TitleRef::Movie(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "movie", "id": 7 }));
    }
}
