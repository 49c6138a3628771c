use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::{create_cities, send, test_app};

#[tokio::test]
async fn create_rejects_dimension_over_maximum() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/collections",
        Some(json!({"name": "wide", "dimension": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .expect("message must be a string")
        .contains("exceeds configured maximum 8"));
}

#[tokio::test]
async fn create_rejects_blank_name_and_zero_dimension() {
    let app = test_app();
    let (status, _) = send(
        &app,
        "POST",
        "/collections",
        Some(json!({"name": "  ", "dimension": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/collections",
        Some(json!({"name": "flat", "dimension": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_config");
}

#[tokio::test]
async fn batches_are_bounded() {
    let app = test_app();
    create_cities(&app).await;

    let points: Vec<_> = (0..17)
        .map(|id| json!({"id": 100 + id, "vector": [0.1, 0.2, 0.3, 0.4]}))
        .collect();
    let (status, body) = send(
        &app,
        "PUT",
        "/collections/cities/points",
        Some(json!({ "points": points })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");

    let (status, _) = send(
        &app,
        "POST",
        "/collections/cities/points/delete",
        Some(json!({"ids": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_limit_is_bounded() {
    let app = test_app();
    create_cities(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/collections/cities/search",
        Some(json!({"vector": [0.2, 0.1, 0.9, 0.7], "limit": 11})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "limit must be <= 10");

    let (status, body) = send(
        &app,
        "POST",
        "/collections/cities/search",
        Some(json!({"vector": [0.2, 0.1, 0.9, 0.7], "limit": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hits"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn malformed_json_is_invalid_argument() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/collections")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .expect("request must build"),
        )
        .await
        .expect("response expected");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/collections")
                .body(Body::from(json!({"name": "x", "dimension": 2}).to_string()))
                .expect("request must build"),
        )
        .await
        .expect("response expected");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
