use axum::Router;

pub mod bulk;
pub mod items;
pub mod system;

/// Router for all item and bulk endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/items", items::router())
        .nest("/bulk-operations", bulk::router())
}
