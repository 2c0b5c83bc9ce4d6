use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use itemflow_infra::jobs::{BulkRequest, JobId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_bulk_operation))
        .route("/:job_id", get(get_bulk_status))
}

pub async fn submit_bulk_operation(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<BulkRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => return errors::bad_request(e.body_text()),
    };

    match services.bulk.submit(request) {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(dto::BulkAcceptedResponse::from(&job)),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_bulk_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match job_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id");
        }
    };

    match services.bulk.status(job_id) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
