use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use shared::Order;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::OrderCache;

#[derive(Clone)]
pub struct AppState {
    pub cache: OrderCache,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

/// Read-only routes over the order cache.
pub fn create_router(cache: OrderCache) -> Router {
    Router::new()
        .route("/orders/", get(missing_order_id))
        .route("/orders/:id", get(get_order))
        .route("/cache", get(get_cache))
        .route("/health", get(health_check))
        .with_state(AppState { cache })
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any),
        )
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Arc<Order>>, ApiError> {
    match state.cache.get(&id) {
        Some(order) => Ok(Json(order)),
        None => {
            tracing::info!("Order {} not found in cache", id);
            Err(api_error(StatusCode::NOT_FOUND, format!("order {} not found", id)))
        }
    }
}

pub async fn get_cache(State(state): State<AppState>) -> Json<HashMap<String, Arc<Order>>> {
    Json(state.cache.snapshot())
}

async fn missing_order_id() -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "order id is required".to_string())
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use shared::Item;
    use tower::ServiceExt;

    async fn call(cache: &OrderCache, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = create_router(cache.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn cached(uid: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            items: vec![Item { chrt_id: 1, ..Default::default() }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn returns_cached_order() {
        let cache = OrderCache::new();
        cache.put(cached("order-123"));

        let (status, body) = call(&cache, "/orders/order-123").await;
        assert_eq!(status, StatusCode::OK);
        let order: Order = serde_json::from_value(body).unwrap();
        assert_eq!(order, cached("order-123"));
    }

    #[tokio::test]
    async fn unknown_order_is_404() {
        let (status, body) = call(&OrderCache::new(), "/orders/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "order missing not found");
    }

    #[tokio::test]
    async fn empty_id_is_400() {
        let (status, _) = call(&OrderCache::new(), "/orders/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cache_dump_lists_every_entry() {
        let cache = OrderCache::new();
        cache.put(cached("a"));
        cache.put(cached("b"));

        let (status, body) = call(&cache, "/cache").await;
        assert_eq!(status, StatusCode::OK);
        let dump: HashMap<String, Order> = serde_json::from_value(body).unwrap();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump["b"].order_uid, "b");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = create_router(OrderCache::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
