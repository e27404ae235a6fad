// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use stride_rank::db::StoreError;
use stride_rank::error::AppError;
use stride_rank::services::scoring::ScoringError;

#[test]
fn test_store_errors_map_to_app_errors() {
    let err: AppError = StoreError::NotFound("user 1".to_string()).into();
    assert!(matches!(err, AppError::NotFound(_)));

    let err: AppError = StoreError::Conflict {
        expected: Some(1),
        found: Some(2),
    }
    .into();
    assert!(matches!(err, AppError::Conflict(_)));

    let err: AppError = StoreError::Backend("unavailable".to_string()).into();
    assert!(matches!(err, AppError::Database(_)));
}

#[test]
fn test_scoring_error_maps_to_scoring() {
    let err: AppError = ScoringError::NonFinite.into();
    assert!(matches!(err, AppError::Scoring(_)));
}

#[test]
fn test_status_codes() {
    let cases = [
        (AppError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
        (AppError::Conflict("x".to_string()), StatusCode::CONFLICT),
        (
            AppError::Scoring("x".to_string()),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (AppError::BadRequest("x".to_string()), StatusCode::BAD_REQUEST),
        (
            AppError::Database("x".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}

#[tokio::test]
async fn test_database_details_withheld() {
    let response = AppError::Database("connection string with secrets".to_string()).into_response();
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(body["error"], "database_error");
    assert!(body.get("details").is_none());
}
