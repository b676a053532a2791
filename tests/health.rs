mod common;

use axum::{extract::State, http::StatusCode};
use bookstore_api::routes::health::health_check;

#[tokio::test]
async fn health_check_reports_database_up() {
    let state = common::setup_state().await;
    let (status, response) = health_check(State(state)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.0.message, "Health check");
    assert!(response.0.data.is_some());
}
