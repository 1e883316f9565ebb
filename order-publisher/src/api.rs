use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
use serde_json::{Map, Value};
use shared::Order;
use tracing::{error, info, warn};
use uuid::Uuid;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub producer: FutureProducer,
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/publish", post(publish_order))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Decodes a submitted order, generating the identifier, track number and
/// creation time when they are missing or blank.
///
/// A `date_created` that is present but not RFC 3339 is rejected here, so
/// everything this front door publishes carries a valid timestamp. The order
/// service still substitutes the processing time for unparsable timestamps,
/// which only matters for orders written to the topic by other producers.
pub fn prepare_order(body: &[u8], now: DateTime<Utc>) -> Result<Order, serde_json::Error> {
    let mut value: Value = serde_json::from_slice(body)?;
    if let Some(fields) = value.as_object_mut() {
        fill_if_blank(fields, "order_uid", || {
            format!("order-{}", Uuid::new_v4().simple())
        });
        fill_if_blank(fields, "track_number", || {
            let id = Uuid::new_v4().simple().to_string();
            format!("TRACK-{}", id[..12].to_uppercase())
        });
        fill_if_blank(fields, "date_created", || now.to_rfc3339());
    }
    serde_json::from_value(value)
}

fn fill_if_blank(fields: &mut Map<String, Value>, key: &str, generate: impl FnOnce() -> String) {
    let blank = match fields.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if blank {
        fields.insert(key.to_string(), Value::String(generate()));
    }
}

pub async fn publish_order(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Order>, ApiError> {
    let order = prepare_order(&body, Utc::now()).map_err(|e| {
        warn!("Rejected order submission: {}", e);
        api_error(StatusCode::BAD_REQUEST, format!("invalid order: {}", e))
    })?;

    let json = serde_json::to_string(&order).map_err(|e| {
        error!("Failed to encode order {}: {}", order.order_uid, e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode order".to_string())
    })?;

    let record = FutureRecord::to(&state.topic)
        .payload(&json)
        .key(&order.order_uid);

    state
        .producer
        .send(record, SEND_TIMEOUT)
        .await
        .map_err(|(e, _)| {
            error!("Error publishing order {}: {}", order.order_uid, e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to publish order".to_string())
        })?;

    info!("Order {} published", order.order_uid);
    Ok(Json(order))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::TimeZone;
    use rdkafka::config::ClientConfig;
    use tower::ServiceExt;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn generates_missing_identifiers() {
        let order = prepare_order(br#"{"entry": "WBIL", "track_number": ""}"#, now()).unwrap();

        assert!(order.order_uid.starts_with("order-"));
        assert_eq!(order.order_uid.len(), "order-".len() + 32);
        assert!(order.track_number.starts_with("TRACK-"));
        assert_eq!(order.track_number.len(), "TRACK-".len() + 12);
        assert_eq!(order.date_created, now());
        assert_eq!(order.entry, "WBIL");
    }

    #[test]
    fn keeps_supplied_identifiers() {
        let body = br#"{
            "order_uid": "order-123",
            "track_number": "T1",
            "date_created": "2021-11-26T06:22:19Z"
        }"#;
        let order = prepare_order(body, now()).unwrap();

        assert_eq!(order.order_uid, "order-123");
        assert_eq!(order.track_number, "T1");
        assert_eq!(order.date_created, Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(prepare_order(b"{oops", now()).is_err());
        assert!(prepare_order(b"42", now()).is_err());
        assert!(prepare_order(br#"{"items": "none"}"#, now()).is_err());
    }

    #[test]
    fn rejects_unparsable_date_created() {
        assert!(prepare_order(br#"{"date_created": "last tuesday"}"#, now()).is_err());
        assert!(prepare_order(br#"{"date_created": 1637907739}"#, now()).is_err());
    }

    #[test]
    fn null_items_publish_as_empty() {
        let order = prepare_order(br#"{"order_uid": "a", "items": null}"#, now()).unwrap();
        assert!(order.items.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_400() {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", "localhost:9092")
            .create()
            .unwrap();
        let app = create_router(AppState { producer, topic: "orders".to_string() });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/publish")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
