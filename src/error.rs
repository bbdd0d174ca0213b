use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Per-field validation messages, serialized as `{"field": ["msg", ...]}`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("{0}")]
    NonField(String),
    #[error("{1}")]
    Detail(StatusCode, String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Unauthorized(String),
    #[error("permission denied")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Single field error, the common case.
    pub fn field(name: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.to_string()]);
        ApiError::Validation(errors)
    }

    pub fn token_expired() -> Self {
        ApiError::Detail(StatusCode::BAD_REQUEST, "token has been expired".into())
    }

    pub fn token_invalid() -> Self {
        ApiError::Detail(StatusCode::BAD_REQUEST, "invalid token".into())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!(errors))).into_response()
            }
            ApiError::NonField(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "non_field_errors": [msg] })),
            )
                .into_response(),
            ApiError::Detail(status, msg) => {
                (status, Json(json!({ "detail": msg }))).into_response()
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "not found" })),
            )
                .into_response(),
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": msg })),
            )
                .into_response(),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "you do not have permission to perform this action" })),
            )
                .into_response(),
            ApiError::Internal(e) => {
                error!(error = %e, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = futures_executor(response);
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn futures_executor(response: Response) -> Vec<u8> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            body.to_vec()
        })
    }

    #[test]
    fn field_error_is_mapped_to_400_with_field_payload() {
        let (status, body) = body_json(ApiError::field("password2", "Passwords do not match"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["password2"][0], "Passwords do not match");
    }

    #[test]
    fn non_field_error_shape_matches_login_failures() {
        let (status, body) = body_json(ApiError::NonField(
            "Unable to log in with provided credentials.".into(),
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["non_field_errors"][0],
            "Unable to log in with provided credentials."
        );
    }

    #[test]
    fn token_errors_use_detail_payloads() {
        let (status, body) = body_json(ApiError::token_expired());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "token has been expired");

        let (status, body) = body_json(ApiError::token_invalid());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "invalid token");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        let (status, _) = body_json(err);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
