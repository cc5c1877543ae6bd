//! Error responses for the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};
use vdb_retrieval::{ErrorKind, RetrievalError};

/// Error returned by a handler.
#[derive(Debug)]
pub enum ApiError {
    /// Ingestion or query failed.
    Retrieval(RetrievalError),
    /// The request itself could not be understood.
    BadRequest(String),
}

/// JSON body returned on error.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    kind: &'static str,
    detail: String,
}

/// HTTP status for an error kind.
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyText
        | ErrorKind::EmptyQuery
        | ErrorKind::EmptyKey
        | ErrorKind::InvalidUrl => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound | ErrorKind::NoCaptions => StatusCode::NOT_FOUND,
        ErrorKind::DimensionMismatch => StatusCode::CONFLICT,
        ErrorKind::ExtractionError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::VectorizationFailed | ErrorKind::FetchError => StatusCode::BAD_GATEWAY,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self {
            ApiError::Retrieval(err) => {
                let kind = err.kind();
                (status_for_kind(kind), kind.as_str(), err.to_string())
            }
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "bad_request", detail),
        };

        if status.is_server_error() {
            error!("Request failed ({kind}): {detail}");
        } else {
            warn!("Request rejected ({kind}): {detail}");
        }

        let body = ErrorBody {
            status: "error",
            kind,
            detail,
        };
        (status, Json(body)).into_response()
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        ApiError::Retrieval(err)
    }
}

impl From<vdb_sources::ExtractionError> for ApiError {
    fn from(err: vdb_sources::ExtractionError) -> Self {
        ApiError::Retrieval(err.into())
    }
}
