//! Typed-error-to-JSON-problem mapping, the same "one `IntoResponse` impl
//! per API error enum" shape the teacher uses for its own WebRTC signaling
//! error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Router(#[from] crate::router::RouterError),
    #[error(transparent)]
    Ptz(#[from] crate::ptz::PtzError),
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

#[derive(Serialize)]
struct ProblemBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Router(e) => match e {
                crate::router::RouterError::NotIdle(_)
                | crate::router::RouterError::NotPreview(_)
                | crate::router::RouterError::NotActive(_)
                | crate::router::RouterError::EmptyDestinations => StatusCode::CONFLICT,
                crate::router::RouterError::ServerUnhealthy => StatusCode::SERVICE_UNAVAILABLE,
                crate::router::RouterError::Timeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::Ptz(e) => match e {
                crate::ptz::PtzError::Unreachable { .. } | crate::ptz::PtzError::Timeout { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                crate::ptz::PtzError::AuthFailed { .. } => StatusCode::UNAUTHORIZED,
                crate::ptz::PtzError::UnsupportedProfile { .. } => StatusCode::NOT_IMPLEMENTED,
            },
            ApiError::Store(e) => match e {
                crate::store::StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                crate::store::StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        (status, Json(ProblemBody { error: self.to_string() })).into_response()
    }
}
