use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use itemflow_core::{ExpectedVersion, ItemId, NewItem};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_item).get(list_items))
        .route("/:id", get(get_item).put(update_item).delete(delete_item))
}

fn parse_id(raw: &str) -> Result<ItemId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id"))
}

fn expected_version(raw: Option<u64>) -> Result<ExpectedVersion, axum::response::Response> {
    let raw = raw.ok_or_else(|| errors::bad_request("version is required"))?;
    ExpectedVersion::new(raw).map_err(|e| errors::bad_request(e.to_string()))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<NewItem>, JsonRejection>,
) -> axum::response::Response {
    let Json(draft) = match body {
        Ok(body) => body,
        Err(e) => return errors::bad_request(e.body_text()),
    };

    match services.items.create_item(draft) {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::write_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.items.list_items() {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => errors::write_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.items.get_item(id) {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => errors::write_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateItemRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => return errors::bad_request(e.body_text()),
    };
    let version = match expected_version(body.version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.items.update_item(id, version, body.patch).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => errors::write_error_to_response(e),
    }
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    query: Result<Query<dto::VersionQuery>, QueryRejection>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return errors::bad_request(e.body_text()),
    };
    let version = match expected_version(query.version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.items.delete_item(id, version).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => errors::write_error_to_response(e),
    }
}
