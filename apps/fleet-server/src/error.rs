use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Store-level error taxonomy. Provider failures are not represented here:
/// they are classified into failed job results and never surface as faults.
/// A stale-lease discard is likewise internal to the job engine and invisible
/// to callers.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("invalid {field}: {detail}")]
    Validation { field: &'static str, detail: String },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("sandbox capacity exhausted")]
    CapacityExceeded,
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl StoreError {
    pub(crate) fn validation(field: &'static str, detail: impl Into<String>) -> Self {
        Self::Validation {
            field,
            detail: detail.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Invalid Request",
            Self::NotFound(_) => "Not Found",
            Self::Conflict(_) => "Conflict",
            Self::CapacityExceeded => "Capacity Exceeded",
            Self::Invariant(_) => "Internal Error",
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        if let Self::Invariant(ref detail) = self {
            tracing::error!(detail, "store invariant violated");
        }
        let status = self.status();
        (
            status,
            Json(json!({
                "type": "about:blank",
                "title": self.title(),
                "status": status.as_u16(),
                "detail": self.to_string(),
            })),
        )
            .into_response()
    }
}
