use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Duration;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::gateway::GatewayOperation;
use crate::portal::domain::{ApprovalStatus, AssignmentId};
use crate::portal::router::portal_router;
use crate::portal::service::PortalService;

fn registration_parts<'a>(email: &'a str, bytes: &'a [u8]) -> Vec<Part<'a>> {
    vec![
        Part::Text("name", "Bea"),
        Part::Text("email", email),
        Part::Text("password", "pw"),
        Part::Text("terms_accepted", "on"),
        Part::File {
            field: "document",
            file_name: "proof.pdf",
            content_type: "application/pdf",
            bytes,
        },
    ]
}

fn multipart_request(uri: &str, parts: &[Part<'_>], token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, multipart_content_type());
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(multipart_body(parts)))
        .expect("request builds")
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request builds")
}

fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn registration_route_creates_pending_account() {
    let harness = harness();
    let router = portal_router(harness.service.clone());

    let response = router
        .oneshot(multipart_request(
            "/api/v1/accounts",
            &registration_parts("b@x.com", b"%PDF"),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "pending");
    assert_eq!(payload["email"], "b@x.com");
    let account = harness.gateway.account("b@x.com").expect("account stored");
    assert!(account.terms_accepted);
}

#[tokio::test]
async fn registration_route_maps_conflicts_and_missing_documents() {
    let harness = harness();
    harness
        .gateway
        .seed_account("Bea", "b@x.com", ApprovalStatus::Pending, true);

    let response = portal_router(harness.service.clone())
        .oneshot(multipart_request(
            "/api/v1/accounts",
            &registration_parts("b@x.com", b"%PDF"),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert!(payload["message"]
        .as_str()
        .expect("message")
        .contains("already registered"));

    let without_document = [
        Part::Text("name", "Dan"),
        Part::Text("email", "d@x.com"),
        Part::Text("password", "pw"),
    ];
    let response = portal_router(harness.service.clone())
        .oneshot(multipart_request("/api/v1/accounts", &without_document, None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn registration_route_reports_backend_failures_as_bad_gateway() {
    let harness = harness();
    harness.gateway.fail_on(GatewayOperation::Upload);

    let response = portal_router(harness.service.clone())
        .oneshot(multipart_request(
            "/api/v1/accounts",
            &registration_parts("b@x.com", b"%PDF"),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload["message"],
        "We could not upload your document. Please try again."
    );
}

#[tokio::test]
async fn session_route_maps_status_failures() {
    let harness = harness();
    harness
        .gateway
        .seed_account("Ana", "a@x.com", ApprovalStatus::Pending, true);
    approved_student(&harness.gateway, "c@x.com");

    let cases = [
        (json!({"email": "a@x.com", "password": "x"}), StatusCode::FORBIDDEN),
        (json!({"email": "c@x.com", "password": "nope"}), StatusCode::UNAUTHORIZED),
        (json!({"email": "z@x.com", "password": "x"}), StatusCode::NOT_FOUND),
        (json!({"email": "z", "password": "x"}), StatusCode::UNPROCESSABLE_ENTITY),
        (json!({"email": "c@x.com", "password": PASSWORD}), StatusCode::CREATED),
    ];
    for (payload, expected) in cases {
        let response = portal_router(harness.service.clone())
            .oneshot(post_json("/api/v1/sessions", payload.clone()))
            .await
            .expect("route executes");
        assert_eq!(response.status(), expected, "{payload}");
    }
}

#[tokio::test]
async fn status_route_reads_by_email() {
    let harness = harness();
    harness
        .gateway
        .seed_account("Wes", "w@x.com", ApprovalStatus::Waitlisted, true);

    let response = portal_router(harness.service.clone())
        .oneshot(get("/api/v1/accounts/status?email=w%40x.com", None))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "waitlisted");
}

#[tokio::test]
async fn password_reset_route_accepts_requests() {
    let harness = harness();

    let response = portal_router(harness.service.clone())
        .oneshot(post_json("/api/v1/password-reset", json!({"email": "c@x.com"})))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(harness.gateway.password_resets(), vec!["c@x.com".to_string()]);
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let harness = harness();
    for uri in [
        "/api/v1/profile",
        "/api/v1/announcements",
        "/api/v1/assignments",
        "/api/v1/grades",
        "/api/v1/schedule",
    ] {
        let response = portal_router(harness.service.clone())
            .oneshot(get(uri, Some("forged")))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn signed_in_student_reads_profile_and_grades() {
    let harness = harness();
    let session = signed_in(&harness, "c@x.com").await;
    let account = harness.gateway.account("c@x.com").expect("account");
    harness.gateway.seed_assignment(assignment(
        1,
        "Essay",
        date(2024, 1, 1),
        date(2024, 1, 10),
    ));
    harness
        .gateway
        .seed_submission(graded(10, 1, account.id, Some(9.0), "2024-01-02T10:00:00Z"));
    let token = Some(session.access_token.as_str());

    let response = portal_router(harness.service.clone())
        .oneshot(get("/api/v1/profile", token))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["email"], "c@x.com");

    let response = portal_router(harness.service.clone())
        .oneshot(get("/api/v1/grades?q=ess", token))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload[0]["assignment_title"], "Essay");
    assert_eq!(payload[0]["score"], 9.0);
}

#[tokio::test]
async fn submission_route_records_an_ungraded_submission() {
    let harness = harness();
    let session = signed_in(&harness, "c@x.com").await;
    let today = PortalService::today();
    harness.gateway.seed_assignment(assignment(
        5,
        "Essay",
        today - Duration::days(1),
        today + Duration::days(1),
    ));
    let parts = [Part::File {
        field: "file",
        file_name: "essay.docx",
        content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        bytes: b"essay",
    }];

    let response = portal_router(harness.service.clone())
        .oneshot(multipart_request(
            "/api/v1/assignments/5/submissions",
            &parts,
            Some(&session.access_token),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["assignment_id"], 5);
    assert!(payload["score"].is_null());
    assert!(harness
        .gateway
        .assignment(AssignmentId(5))
        .and_then(|a| a.file_url)
        .is_some());

    let response = portal_router(harness.service.clone())
        .oneshot(multipart_request(
            "/api/v1/assignments/5/submissions",
            &parts,
            Some(&session.access_token),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(harness.gateway.submissions().len(), 1);

    let response = portal_router(harness.service.clone())
        .oneshot(multipart_request(
            "/api/v1/assignments/404/submissions",
            &parts,
            Some(&session.access_token),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
