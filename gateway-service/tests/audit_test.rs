//! Audit trail behavior: what gets recorded, with what context, and that
//! a broken store never affects the caller.

mod common;

use axum::http::StatusCode;
use common::{ADMIN_TOKEN, FailingAuditStore, STUDENT_TOKEN, TestApp, body_json};
use std::sync::Arc;

#[tokio::test]
async fn test_access_denial_is_recorded_with_request_context() {
    let app = TestApp::spawn().await;

    app.get_from("/api/admin/reports", Some(STUDENT_TOKEN), "203.0.113.9, 10.0.0.1")
        .await;

    let entries = app.audit_entries().await;
    let denial = entries
        .iter()
        .find(|e| e.action == "access_denied")
        .expect("denial recorded");
    assert_eq!(denial.user_id, Some(app.student.id));
    assert_eq!(denial.ip_address, "203.0.113.9");
    assert_eq!(denial.user_agent, "eduniti-tests/1.0");
    assert_eq!(denial.resource_id.as_deref(), Some("/api/admin/reports"));
}

#[tokio::test]
async fn test_missing_forwarding_headers_default_to_unknown() {
    let app = TestApp::spawn().await;

    app.get("/api/admin/reports", Some(STUDENT_TOKEN)).await;

    let entries = app.audit_entries().await;
    let denial = entries
        .iter()
        .find(|e| e.action == "access_denied")
        .expect("denial recorded");
    assert_eq!(denial.ip_address, "unknown");
    assert_eq!(denial.user_agent, "unknown");
}

#[tokio::test]
async fn test_rate_limit_trip_is_recorded() {
    let app = TestApp::spawn_with(|config| {
        config.rate_limit.default_max_requests = 1;
    })
    .await;

    app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;

    let entries = app.audit_entries().await;
    assert!(
        entries
            .iter()
            .any(|e| e.action == "rate_limit_exceeded" && e.user_id == Some(app.student.id))
    );
}

#[tokio::test]
async fn test_successful_auth_is_recorded() {
    let app = TestApp::spawn().await;

    app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;

    let entries = app.audit_entries().await;
    assert!(
        entries
            .iter()
            .any(|e| e.action == "auth_success" && e.user_id == Some(app.student.id))
    );
}

#[tokio::test]
async fn test_feature_toggle_disables_recording() {
    let app = TestApp::spawn_with(|config| {
        config.features.enable_audit_logging = false;
    })
    .await;

    app.get("/api/admin/reports", Some(STUDENT_TOKEN)).await;

    assert!(app.audit_entries().await.is_empty());
}

#[tokio::test]
async fn test_failing_audit_store_never_fails_the_request() {
    let app = TestApp::spawn_with_store(|_| {}, Some(Arc::new(FailingAuditStore))).await;

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_can_query_audit_trail() {
    let app = TestApp::spawn().await;

    app.get("/api/admin/reports", Some(STUDENT_TOKEN)).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let response = app
        .get("/audit/events?action=access_denied", Some(ADMIN_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let events = body["events"].as_array().unwrap();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e["action"] == "access_denied"));
}

#[tokio::test]
async fn test_students_cannot_query_audit_trail() {
    let app = TestApp::spawn().await;

    let response = app.get("/audit/events", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
