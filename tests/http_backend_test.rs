mod common;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use common::{engine_over, frame};
use rust_decimal_macros::dec;
use scooter_rent::domain::ports::{BearerToken, RentalBackend};
use scooter_rent::domain::rental::{RentalId, RentalState};
use scooter_rent::domain::scooter::ScooterStatus;
use scooter_rent::domain::tariff::TariffId;
use scooter_rent::error::{BackendError, RentalError};
use scooter_rent::infrastructure::credentials::StaticCredentials;
use scooter_rent::infrastructure::http::HttpBackend;
use serde_json::{Value, json};
use std::sync::Arc;

const TOKEN: &str = "good-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

fn detail(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "detail": text }))).into_response()
}

async fn scooter(headers: HeaderMap, Path(frame): Path<String>) -> Response {
    if !authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }
    match frame.as_str() {
        "GD029" => Json(json!({
            "frame": "GD029",
            "model": "Xiaomi M365",
            "battery": 85,
            "status": "available",
            "connection_status": "online",
            "location": "55.751244, 37.618423"
        }))
        .into_response(),
        _ => detail(StatusCode::NOT_FOUND, "Scooter not found"),
    }
}

async fn start(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }
    if body["frame"] == "OK200" {
        return detail(StatusCode::CONFLICT, "Scooter is already in use");
    }
    if body["tariff_id"] != 1 {
        return detail(StatusCode::BAD_REQUEST, "Unknown tariff");
    }
    Json(json!({ "id": 42, "start_time": "2024-05-01T12:30:00" })).into_response()
}

async fn end(headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if !authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }
    match id {
        42 => Json(json!({ "total_cost": 15.0, "duration_minutes": 3 })).into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn serve() -> String {
    let app = Router::new()
        .route("/scooters/:frame", get(scooter))
        .route("/rentals", post(start))
        .route("/rentals/:id/end", patch(end));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn backend(base_url: &str, token: Option<&str>) -> Arc<HttpBackend> {
    let credentials = Arc::new(StaticCredentials::new(token.map(BearerToken::new)));
    Arc::new(HttpBackend::try_new(base_url, credentials).unwrap())
}

#[tokio::test]
async fn test_scooter_lookup_over_http() {
    let api = backend(&serve().await, Some(TOKEN));

    let scooter = api.scooter_by_frame(&frame("GD029")).await.unwrap();
    assert_eq!(scooter.model, "Xiaomi M365");
    assert_eq!(scooter.status, ScooterStatus::Available);
    assert!(scooter.is_rentable());

    assert_eq!(
        api.scooter_by_frame(&frame("QQ000")).await,
        Err(BackendError::NotFound)
    );
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let base_url = serve().await;
    let api = backend(&base_url, Some(TOKEN));

    assert_eq!(
        api.start_rental(&frame("OK200"), TariffId(1)).await,
        Err(BackendError::Rejected("Scooter is already in use".to_string()))
    );
    assert_eq!(
        api.start_rental(&frame("GD029"), TariffId(9)).await,
        Err(BackendError::Rejected("Unknown tariff".to_string()))
    );
    assert!(matches!(
        api.end_rental(RentalId(13)).await,
        Err(BackendError::Transport(_))
    ));

    let stranger = backend(&base_url, Some("stolen"));
    assert_eq!(
        stranger.scooter_by_frame(&frame("GD029")).await,
        Err(BackendError::Unauthorized(
            "Could not validate credentials".to_string()
        ))
    );
}

#[tokio::test]
async fn test_missing_token_sends_nothing() {
    let api = backend("http://127.0.0.1:9", None);
    assert!(matches!(
        api.scooter_by_frame(&frame("GD029")).await,
        Err(BackendError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_refreshed_token_is_picked_up() {
    let credentials = Arc::new(StaticCredentials::new(Some(BearerToken::new("expired"))));
    let api = HttpBackend::try_new(&serve().await, credentials.clone()).unwrap();

    assert!(matches!(
        api.scooter_by_frame(&frame("GD029")).await,
        Err(BackendError::Unauthorized(_))
    ));
    credentials.replace(Some(BearerToken::new(TOKEN)));
    assert_eq!(
        api.scooter_by_frame(&frame("GD029")).await.unwrap().model,
        "Xiaomi M365"
    );
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let engine = engine_over(backend(&format!("http://{addr}"), Some(TOKEN)));
    assert!(matches!(
        engine.lookup_frame("GD029").await,
        Err(RentalError::TransportError(_))
    ));
    assert_eq!(engine.session().unwrap().state(), RentalState::AwaitingFrame);
}

#[tokio::test]
async fn test_rental_round_trip_through_engine() {
    let engine = engine_over(backend(&serve().await, Some(TOKEN)));

    engine.lookup_frame("GD029").await.unwrap();
    let started = engine.start(&frame("GD029"), TariffId(1)).await.unwrap();
    assert_eq!(started.id(), Some(RentalId(42)));
    assert_eq!(
        started.started_at(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap())
    );

    let ended = engine.end().await.unwrap();
    assert_eq!(ended.state(), RentalState::Ended);
    assert_eq!(ended.elapsed_minutes(), 3);
    assert_eq!(ended.accrued_cost().value(), dec!(15.00));
}
