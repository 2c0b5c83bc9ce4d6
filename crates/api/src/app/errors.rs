use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use itemflow_infra::jobs::EngineError;
use itemflow_infra::WriteError;

pub fn write_error_to_response(err: WriteError) -> axum::response::Response {
    match err {
        WriteError::Conflict {
            current_version,
            provided_version,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "version_conflict",
                "message": "item was modified by another request; reload and retry",
                "current_version": current_version,
                "provided_version": provided_version,
            })),
        )
            .into_response(),
        WriteError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
        WriteError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        WriteError::Store(e) if e.is_retryable() => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
        }
        WriteError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        EngineError::JobNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "job_not_found",
            format!("bulk job {id} not found or expired"),
        ),
        e @ (EngineError::Bookkeeping(_) | EngineError::Timeout(_)) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "job_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}
