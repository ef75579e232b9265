//! End-to-end applicant journey through the public service facade and HTTP router: register,
//! wait for approval, sign in, and hand in coursework, all against the in-memory backend.

mod common {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use student_portal::gateway::{Backend, MemoryGateway};
    use student_portal::portal::domain::{AssignmentStatus, ScheduleEntry, ScheduleEntryId};
    use student_portal::portal::{
        Assignment, AssignmentId, Attachment, PortalService, PortalSettings, RegistrationRequest,
    };

    pub(super) fn service() -> (Arc<MemoryGateway>, Arc<PortalService>) {
        let gateway = Arc::new(MemoryGateway::new());
        let service = Arc::new(PortalService::new(
            Backend::from_gateway(gateway.clone()),
            PortalSettings::default(),
        ));
        (gateway, service)
    }

    pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    pub(super) fn seed_coursework(gateway: &MemoryGateway) {
        for (id, title) in [(1, "Essay"), (2, "Lab report"), (3, "Reading log")] {
            gateway.seed_assignment(Assignment {
                id: AssignmentId(id),
                title: title.to_string(),
                description: String::new(),
                available_from: date(2024, 3, 1),
                due_at: date(2024, 3, 15),
                status: AssignmentStatus::Open,
                file_url: None,
            });
        }
        gateway.seed_schedule_entry(ScheduleEntry {
            id: ScheduleEntryId(1),
            day: "Segunda".to_string(),
            time: "18:00".to_string(),
            subject: "Mathematics".to_string(),
            teacher: "Lima".to_string(),
            room: "12".to_string(),
            campus: "Centro".to_string(),
        });
    }

    pub(super) fn application(email: &str) -> RegistrationRequest {
        RegistrationRequest {
            name: "Bea Santos".to_string(),
            email: email.to_string(),
            password: "first-day".to_string(),
            terms_accepted: true,
        }
    }

    pub(super) fn id_card() -> Attachment {
        Attachment::new("id-card.png", "image/png", vec![0x89, b'P', b'N', b'G'])
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use student_portal::portal::{
    portal_router, ApprovalStatus, AssignmentBoard, AssignmentId, AttachmentSlot, LoginError,
    LoginRequest, MemoryPreviews,
};

use common::*;

#[tokio::test]
async fn applicant_registers_waits_for_approval_and_submits_work() {
    let (gateway, service) = service();
    seed_coursework(&gateway);

    let registration = service
        .register(&application("bea@x.com"), Some(&id_card()))
        .await
        .expect("registration succeeds");
    assert_eq!(registration.status(), ApprovalStatus::Pending);

    let credentials = LoginRequest {
        email: "bea@x.com".to_string(),
        password: "first-day".to_string(),
    };
    assert_eq!(
        service.login(&credentials).await.expect_err("still pending"),
        LoginError::NotApproved
    );

    assert!(gateway.set_approval_status("bea@x.com", ApprovalStatus::Approved));
    let session = service.login(&credentials).await.expect("approved login");

    let views = service.views();
    let today = date(2024, 3, 10);
    let mut board = AssignmentBoard::load(views, &session, today)
        .await
        .expect("assignments load");
    assert_eq!(board.visible().len(), 3);

    let previews = std::sync::Arc::new(MemoryPreviews::default());
    let mut slot = AttachmentSlot::new(previews.clone());
    slot.stage(student_portal::portal::Attachment::new(
        "essay.pdf",
        "application/pdf",
        b"%PDF essay".to_vec(),
    ));
    board
        .submit(views, &session, AssignmentId(1), &mut slot)
        .await
        .expect("essay submitted");
    assert_eq!(previews.live(), 0);

    let pending = views
        .pending_assignments(&session, today, "")
        .await
        .expect("assignments reload");
    assert!(pending.iter().all(|assignment| assignment.id != AssignmentId(1)));

    let grades = views.grades(&session, "").await.expect("grades load");
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0].assignment_title.as_deref(), Some("Essay"));
    assert_eq!(grades[0].score, None);
}

#[tokio::test]
async fn http_surface_serves_the_signed_in_student() {
    let (gateway, service) = service();
    seed_coursework(&gateway);
    let account = gateway.seed_account("Carla", "c@x.com", ApprovalStatus::Approved, true);
    gateway.seed_identity("c@x.com", "secret", &account);

    let response = portal_router(service.clone())
        .oneshot(
            Request::post("/api/v1/sessions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"email":"c@x.com","password":"secret"}"#))
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    let session: serde_json::Value = serde_json::from_slice(&body).expect("json");
    let token = session["access_token"]
        .as_str()
        .expect("token issued")
        .to_string();

    let response = portal_router(service.clone())
        .oneshot(
            Request::get("/api/v1/schedule?q=math")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    let schedule: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(schedule[0]["subject"], "Mathematics");
}
