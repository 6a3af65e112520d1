//! Tests for `AppError` to HTTP response mapping.
//!
//! These call `IntoResponse` directly; no server or store is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use shopfront_api::error::AppError;
use shopfront_core::error::CoreError;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Core(CoreError::NotFound {
        entity: "Page",
        id: 42,
    }))
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Page with id 42 not found");
}

#[tokio::test]
async fn invalid_block_data_is_a_validation_error() {
    let (status, json) =
        error_to_response(CoreError::InvalidBlockData("product_grid: columns".into()).into()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "product_grid: columns");
}

#[tokio::test]
async fn legacy_mapping_returns_422() {
    let (status, json) = error_to_response(
        CoreError::LegacyMapping {
            row: 3,
            reason: "unknown layout_type 'carousel'".into(),
        }
        .into(),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "LEGACY_MAPPING_ERROR");
    assert!(json["error"].as_str().unwrap().contains("Legacy row 3"));
}

#[tokio::test]
async fn version_conflict_returns_409_with_both_versions() {
    let (status, json) = error_to_response(
        CoreError::VersionConflict {
            page_id: 1,
            expected: 2,
            actual: 5,
        }
        .into(),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "VERSION_CONFLICT");
    let msg = json["error"].as_str().unwrap();
    assert!(msg.contains("expected 2") && msg.contains("found 5"));
}

#[tokio::test]
async fn transient_failure_returns_503_without_details() {
    let (status, json) =
        error_to_response(CoreError::TransientSaveFailure("10.0.0.5:5432 refused".into()).into())
            .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
    assert!(!json["error"].as_str().unwrap().contains("10.0.0.5"));
}

#[tokio::test]
async fn forbidden_returns_403() {
    let (status, json) =
        error_to_response(CoreError::Forbidden("not your page".into()).into()).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn internal_errors_are_sanitized() {
    for err in [
        AppError::InternalError("secret database credentials leaked".into()),
        AppError::Core(CoreError::Internal("stack trace".into())),
    ] {
        let (status, json) = error_to_response(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"], "An internal error occurred");
    }
}

#[tokio::test]
async fn database_errors_are_classified() {
    let (status, _) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = error_to_response(AppError::Database(sqlx::Error::PoolTimedOut)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn bad_request_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("missing rows".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}
