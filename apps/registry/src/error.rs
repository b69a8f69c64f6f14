use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gc_domain_engine::EngineError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Serialize)]
struct ErrorEnvelope {
    kind: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

/// HTTP-boundary error, one variant per kind in spec.md §7.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    State(String),
    #[error("{0}")]
    Integrity(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::Authorization(_) => "authorization",
            ApiError::NotFound(_) => "not_found",
            ApiError::State(_) => "state",
            ApiError::Integrity(_) => "integrity",
            ApiError::Upstream(_) => "upstream",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authorization(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::State(_) => StatusCode::CONFLICT,
            ApiError::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(m) => ApiError::Validation(m),
            EngineError::Authorization(m) => ApiError::Authorization(m),
            EngineError::NotFound(m) => ApiError::NotFound(m),
            EngineError::State(m) => ApiError::State(m),
            EngineError::Integrity(m) => ApiError::Integrity(m),
            EngineError::Upstream(m) => ApiError::Upstream(m),
            EngineError::Internal(m) => ApiError::Internal(m),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(kind = self.kind(), "request failed: {self}");
        let body = ErrorEnvelope {
            kind: self.kind(),
            message: self.to_string(),
            details: None,
        };
        (status, Json(json!(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_variant_to_its_http_status() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Authorization("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::State("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Integrity("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn converts_engine_errors_by_matching_variant() {
        let converted: ApiError = EngineError::NotFound("bundle 1".into()).into();
        assert!(matches!(converted, ApiError::NotFound(m) if m == "bundle 1"));

        let converted: ApiError = EngineError::State("already claimed".into()).into();
        assert!(matches!(converted, ApiError::State(_)));
    }

    #[test]
    fn response_body_carries_kind_and_message() {
        let response = ApiError::Validation("bad quantity".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
