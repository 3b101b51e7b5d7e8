use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cinelog_core::error::{ApiError, ErrorEnvelope};
use cinelog_db::DbError;
use cinelog_metadata::MetadataError;

/// Newtype wrapper so we can implement `IntoResponse` in this crate.
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope::from(&self.0);
        (status, Json(envelope)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        let api = match e {
            DbError::DuplicateReview => ApiError::Conflict("review already exists for this title".into()),
            DbError::DuplicateFavorite => {
                ApiError::Conflict("title is already in favorites".into())
            }
            DbError::WriteConflict => {
                ApiError::Conflict("concurrent update, please retry".into())
            }
            DbError::InvalidRating(r) => {
                ApiError::BadRequest(format!("rating must be between 1 and 10, got {r}"))
            }
            DbError::BlankContent => ApiError::BadRequest("review content must not be blank".into()),
            DbError::ReviewNotFound => ApiError::NotFound("review not found".into()),
            DbError::TitleNotFound => ApiError::NotFound("title not found".into()),
            DbError::UserNotFound => ApiError::NotFound("user not found".into()),
            DbError::Hash(e) => ApiError::Internal(format!("hash error: {e}")),
            DbError::Sqlx(e) => ApiError::Internal(format!("db error: {e}")),
        };
        Self(api)
    }
}

impl From<MetadataError> for AppError {
    fn from(e: MetadataError) -> Self {
        let api = match e {
            MetadataError::NotFound => ApiError::NotFound("title not found".into()),
            MetadataError::Network(e) => ApiError::Upstream(format!("media source unreachable: {e}")),
            MetadataError::Provider(e) => ApiError::Upstream(format!("media source error: {e}")),
            MetadataError::Db(e) => ApiError::Internal(format!("db error: {e}")),
        };
        Self(api)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self(ApiError::Internal(format!("db error: {e}")))
    }
}
