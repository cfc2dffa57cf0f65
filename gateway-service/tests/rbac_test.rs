//! Role enforcement through the full middleware stack.

mod common;

use axum::http::StatusCode;
use common::{ADMIN_TOKEN, COUNSELOR_TOKEN, STUDENT_TOKEN, TestApp, body_json};

#[tokio::test]
async fn test_student_denied_on_admin_route() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/admin/reports", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Insufficient permissions");
}

#[tokio::test]
async fn test_anonymous_denied_with_401() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/admin/reports", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
async fn test_invalid_token_denied_with_401() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/recommendations", Some("not-a-session")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_allowed_on_admin_route() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/admin/reports", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_matching_role_allowed_on_student_route() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/recommendations", Some(STUDENT_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["userId"], app.student.id.to_string());
}

#[tokio::test]
async fn test_counselor_not_in_required_set_is_forbidden() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/recommendations", Some(COUNSELOR_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_route_needs_no_identity() {
    let app = TestApp::spawn().await;

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_student_sees_own_profile_only() {
    let app = TestApp::spawn().await;
    let profile_id = uuid::Uuid::new_v4();
    app.ownership
        .insert("student_profiles", profile_id, app.student.id);

    let response = app
        .get(
            &format!("/api/students/{}/profile", profile_id),
            Some(STUDENT_TOKEN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Another student's profile is off limits.
    let other_profile = uuid::Uuid::new_v4();
    app.ownership
        .insert("student_profiles", other_profile, uuid::Uuid::new_v4());

    let response = app
        .get(
            &format!("/api/students/{}/profile", other_profile),
            Some(STUDENT_TOKEN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_counselor_sees_any_profile() {
    let app = TestApp::spawn().await;
    let profile_id = uuid::Uuid::new_v4();
    app.ownership
        .insert("student_profiles", profile_id, app.student.id);

    let response = app
        .get(
            &format!("/api/students/{}/profile", profile_id),
            Some(COUNSELOR_TOKEN),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
