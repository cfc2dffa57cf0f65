//! Offline continuity: cached auth during outages, replay on reconnect.

mod common;

use axum::http::StatusCode;
use common::{STUDENT_TOKEN, TestApp, body_json};
use gateway_service::services::StoreFault;

#[tokio::test]
async fn test_outage_serves_cached_auth_for_reads() {
    let app = TestApp::spawn().await;

    // Prime the cache with an online resolution.
    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.identity.set_fault(Some(StoreFault::Offline));

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["degraded"], true);
}

#[tokio::test]
async fn test_credential_rejection_is_never_masked_by_cache() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The store answers, and says no. The cache must not step in.
    app.identity.set_fault(Some(StoreFault::Reject));

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_outage_without_cached_state_denies() {
    let app = TestApp::spawn().await;
    app.identity.set_fault(Some(StoreFault::Offline));

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cached_auth_is_per_token() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.identity.set_fault(Some(StoreFault::Offline));

    // A different token gets no continuity from the student's cache entry.
    let response = app.get("/api/recommendations", Some("tok-someone-else")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_during_outage_is_queued_and_replayed() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.identity.set_fault(Some(StoreFault::Offline));

    let response = app.post_json("/auth/refresh", Some(STUDENT_TOKEN), "").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "queued");
    assert_eq!(app.state.retry_queue.len().await, 1);

    // Connectivity returns; the queued refresh replays exactly once.
    app.identity.set_fault(None);
    let report = app.state.retry_queue.drain_on_reconnect().await;
    assert_eq!(report.replayed, vec!["refresh_session"]);
    assert!(report.unconfirmed.is_empty());
    assert!(app.state.retry_queue.is_empty().await);
}

#[tokio::test]
async fn test_queued_operations_replay_in_enqueue_order() {
    let app = TestApp::spawn().await;

    app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    app.identity.set_fault(Some(StoreFault::Offline));

    app.post_json("/auth/refresh", Some(STUDENT_TOKEN), "").await;
    app.post_json("/auth/logout", Some(STUDENT_TOKEN), "").await;

    app.identity.set_fault(None);
    let report = app.state.retry_queue.drain_on_reconnect().await;
    assert_eq!(report.replayed, vec!["refresh_session", "sign_out"]);
}

#[tokio::test]
async fn test_sign_out_during_outage_still_clears_cache() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.identity.set_fault(Some(StoreFault::Offline));

    // Local deauthentication must win even though the upstream call fails.
    let response = app.post_json("/auth/logout", Some(STUDENT_TOKEN), "").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reconnect_endpoint_reports_drain() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json("/internal/reconnect", Some(common::ADMIN_TOKEN), "")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["remaining"], 0);
    assert_eq!(body["replayed"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_health_reports_degraded_identity_store() {
    let app = TestApp::spawn().await;
    app.identity.set_fault(Some(StoreFault::Offline));

    // Trip the connectivity monitor.
    app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["identity_store"], "degraded");
}
