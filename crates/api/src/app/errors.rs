use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use catalog_infra::DispatchError;

/// | error | status | body |
/// |---|---|---|
/// | `Validation` | 400 | `ValidationSummary` |
/// | `InvariantViolation` | 400 | `{error, message}` |
/// | `NotFound` | 404 | `{error, message}` |
/// | `Concurrency` | 409 | `{error, message}` |
/// | `Serialize`, `Store` | 500 | `{error, message}` |
pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Validation(summary) => (StatusCode::BAD_REQUEST, axum::Json(summary)).into_response(),
        DispatchError::InvariantViolation(msg) => json_error(StatusCode::BAD_REQUEST, "invariant_violation", msg),
        DispatchError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Serialize(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialize_error", msg),
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "request failed in store");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage is unavailable")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
