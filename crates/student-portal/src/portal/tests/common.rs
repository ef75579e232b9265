use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::gateway::{Backend, GatewayError, MemoryGateway, RecordStore};
use crate::portal::attachment::Attachment;
use crate::portal::authentication::LoginRequest;
use crate::portal::domain::{
    Account, AccountId, Announcement, ApprovalStatus, Assignment, AssignmentId, AssignmentStatus,
    Author, AuthorId, NewAccount, NewSubmission, ScheduleEntry, Session, Submission,
};
use crate::portal::registration::RegistrationRequest;
use crate::portal::service::{PortalService, PortalSettings};

pub(super) const PASSWORD: &str = "correct-horse";

pub(super) struct Harness {
    pub gateway: Arc<MemoryGateway>,
    pub service: Arc<PortalService>,
}

pub(super) fn harness() -> Harness {
    let gateway = Arc::new(MemoryGateway::new());
    let service = Arc::new(PortalService::new(
        Backend::from_gateway(gateway.clone()),
        PortalSettings::default(),
    ));
    Harness { gateway, service }
}

/// Service whose account lookups take `delay`, leaving room for a second request to overlap.
pub(super) fn slow_harness(delay: Duration) -> Harness {
    let gateway = Arc::new(MemoryGateway::new());
    let records = Arc::new(SlowRecords {
        inner: gateway.clone(),
        delay,
    });
    let backend = Backend::new(gateway.clone(), records, gateway.clone());
    let service = Arc::new(PortalService::new(backend, PortalSettings::default()));
    Harness { gateway, service }
}

pub(super) fn document() -> Attachment {
    Attachment::new(
        "enrollment proof.pdf",
        "application/pdf",
        b"%PDF-1.7 proof".to_vec(),
    )
}

pub(super) fn registration(name: &str, email: &str, password: &str) -> RegistrationRequest {
    RegistrationRequest {
        name: name.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        terms_accepted: true,
    }
}

pub(super) fn login(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

/// Approved applicant with accepted terms and a working identity.
pub(super) fn approved_student(gateway: &MemoryGateway, email: &str) -> Account {
    let account = gateway.seed_account("Carla", email, ApprovalStatus::Approved, true);
    gateway.seed_identity(email, PASSWORD, &account);
    account
}

pub(super) async fn signed_in(harness: &Harness, email: &str) -> Session {
    approved_student(&harness.gateway, email);
    harness
        .service
        .login(&login(email, PASSWORD))
        .await
        .expect("approved student signs in")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub(super) fn assignment(id: i64, title: &str, from: NaiveDate, due: NaiveDate) -> Assignment {
    Assignment {
        id: AssignmentId(id),
        title: title.to_string(),
        description: format!("{title} instructions"),
        available_from: from,
        due_at: due,
        status: AssignmentStatus::Open,
        file_url: None,
    }
}

pub(super) fn graded(
    id: i64,
    assignment_id: i64,
    account_id: AccountId,
    score: Option<f64>,
    submitted_at: &str,
) -> Submission {
    Submission {
        id: crate::portal::domain::SubmissionId(id),
        assignment_id: AssignmentId(assignment_id),
        account_id,
        score,
        submitted_at: timestamp(submitted_at),
        file_url: None,
    }
}

pub(super) fn announcement(id: i64, author: Option<i64>, body: &str, at: &str) -> Announcement {
    Announcement {
        id: crate::portal::domain::AnnouncementId(id),
        author_id: author.map(AuthorId),
        body: body.to_string(),
        images: Vec::new(),
        file: None,
        created_at: timestamp(at),
    }
}

pub(super) fn author(id: i64, name: &str) -> Author {
    Author {
        id: AuthorId(id),
        name: name.to_string(),
        avatar_url: None,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) const BOUNDARY: &str = "portal-test-boundary";

pub(super) enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub(super) fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                field,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub(super) fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

pub(super) struct SlowRecords {
    inner: Arc<MemoryGateway>,
    delay: Duration,
}

#[async_trait]
impl RecordStore for SlowRecords {
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, GatewayError> {
        tokio::time::sleep(self.delay).await;
        self.inner.account_by_email(email).await
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, GatewayError> {
        self.inner.insert_account(account).await
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), GatewayError> {
        self.inner.delete_account(id).await
    }

    async fn announcements(&self) -> Result<Vec<Announcement>, GatewayError> {
        self.inner.announcements().await
    }

    async fn authors_by_ids(&self, ids: &[AuthorId]) -> Result<Vec<Author>, GatewayError> {
        self.inner.authors_by_ids(ids).await
    }

    async fn assignments(&self) -> Result<Vec<Assignment>, GatewayError> {
        self.inner.assignments().await
    }

    async fn assignments_by_ids(
        &self,
        ids: &[AssignmentId],
    ) -> Result<Vec<Assignment>, GatewayError> {
        self.inner.assignments_by_ids(ids).await
    }

    async fn set_assignment_file(
        &self,
        id: AssignmentId,
        file_url: &str,
    ) -> Result<(), GatewayError> {
        self.inner.set_assignment_file(id, file_url).await
    }

    async fn submissions_for(&self, account: AccountId) -> Result<Vec<Submission>, GatewayError> {
        self.inner.submissions_for(account).await
    }

    async fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Submission, GatewayError> {
        self.inner.insert_submission(submission).await
    }

    async fn schedule(&self) -> Result<Vec<ScheduleEntry>, GatewayError> {
        self.inner.schedule().await
    }
}
