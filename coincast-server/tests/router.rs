//! Requests through the assembled router: routing, extractors, layers and
//! status mapping together.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use coincast_core::SyntheticProvider;
use coincast_runner::{DeploymentThresholds, ForecastConfig, ForecastService};
use coincast_server::{app, AppState};

fn router(dir: &std::path::Path) -> Router {
    let mut config = ForecastConfig::default();
    config.deployment = DeploymentThresholds {
        min_r2: -1_000.0,
        max_mape: 100.0,
    };
    let service = ForecastService::new(config, dir, Arc::new(SyntheticProvider::new()))
        .unwrap()
        .with_clock(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    app(AppState::new(Arc::new(service)))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_on_both_paths() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());
    for uri in ["/", "/health"] {
        let (status, body) = send(&router, get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["status"], "healthy");
    }
}

#[tokio::test]
async fn get_forecast_with_query_string() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());

    let (status, body) = send(&router, get("/api/v1/forecast?days_ahead=7")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["forecast_days"], 7);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 7);
    assert_eq!(body["symbol"], "BTCUSDT");
}

#[tokio::test]
async fn post_forecast_with_json_body() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());

    let (status, body) =
        send(&router, post_json("/api/v1/forecast", r#"{"days_ahead":3,"retrain":true}"#)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["source"], "retrained");
    assert_eq!(body["model_version"], 1);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 3);
    assert_eq!(body["gate"]["accepted"], true);

    // Omitted fields take their defaults: configured horizon, no retrain.
    let (status, body) = send(&router, post_json("/api/v1/forecast", "{}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["model_version"], 1);
    assert_eq!(body["forecast_days"], 30);
}

#[tokio::test]
async fn malformed_bodies_are_422_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());

    for body in [r#"{"days_ahead":"x"}"#, r#"{"days_ahead":"#, r#"{"retrain":"yes"}"#] {
        let (status, value) = send(&router, post_json("/api/v1/forecast", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "ValidationError");
    }

    let (status, value) = send(&router, get("/api/v1/forecast?days_ahead=soon")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(value["kind"], "ValidationError");

    // Nothing was trained on the way.
    assert!(!dir.path().join("data/01_raw").exists());
}

#[tokio::test]
async fn model_info_without_a_model_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());

    let (status, body) = send(&router, get("/api/v1/model/info")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "ModelNotFoundError");
    assert!(body["message"].as_str().unwrap().contains("btc_price_forecaster"));

    let (status, body) = send(&router, get("/api/v1/model/versions")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["versions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn pipeline_run_then_model_info() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());

    let (status, body) = send(
        &router,
        post_json("/api/v1/pipelines/run", r#"{"pipeline_name":"bogus"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "UnknownPipelineError");

    let (status, body) = send(
        &router,
        post_json("/api/v1/pipelines/run", r#"{"pipeline_name":"__default__"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["model_version"], 1);

    let (status, body) = send(&router, get("/api/v1/model/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_exists"], true);
    assert_eq!(body["version"], 1);
    assert_eq!(body["stage"], "Production");
    assert!(body["metrics"]["mape"].is_number());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let response = router(dir.path())
        .oneshot(get("/api/v1/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
