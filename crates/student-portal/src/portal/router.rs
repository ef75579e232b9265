use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::attachment::Attachment;
use super::authentication::{LoginError, LoginRequest, ResetError};
use super::domain::{AssignmentId, Session};
use super::guard::GuardError;
use super::registration::{RegistrationError, RegistrationRequest};
use super::service::PortalService;
use super::status::{EmailRequest, StatusError};
use super::views::{SubmitError, ViewError};
use crate::gateway::GatewayError;

/// Uploaded documents and submissions may exceed axum's 2 MiB default.
const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Router builder exposing the portal workflows over HTTP.
pub fn portal_router(service: Arc<PortalService>) -> Router {
    Router::new()
        .route("/api/v1/accounts", post(register_handler))
        .route("/api/v1/accounts/status", get(status_handler))
        .route("/api/v1/sessions", post(login_handler))
        .route("/api/v1/password-reset", post(reset_handler))
        .route("/api/v1/profile", get(profile_handler))
        .route("/api/v1/announcements", get(announcements_handler))
        .route("/api/v1/assignments", get(assignments_handler))
        .route(
            "/api/v1/assignments/:assignment_id/submissions",
            post(submit_handler),
        )
        .route("/api/v1/grades", get(grades_handler))
        .route("/api/v1/schedule", get(schedule_handler))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .with_state(service)
}

/// Maps a workflow error onto an HTTP status and the message shown to the user.
trait ApiFailure: std::fmt::Display {
    fn status(&self) -> StatusCode;
    fn user_message(&self) -> String;

    fn into_failure(self) -> Response
    where
        Self: Sized,
    {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "portal request failed");
        }
        let payload = json!({
            "error": self.to_string(),
            "message": self.user_message(),
        });
        (status, Json(payload)).into_response()
    }
}

const REMOTE: StatusCode = StatusCode::BAD_GATEWAY;

impl ApiFailure for RegistrationError {
    fn status(&self) -> StatusCode {
        match self {
            RegistrationError::Validation(_) | RegistrationError::MissingAttachment => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RegistrationError::EmailTaken | RegistrationError::AlreadyInFlight => {
                StatusCode::CONFLICT
            }
            RegistrationError::Lookup(_)
            | RegistrationError::UploadFailed(_)
            | RegistrationError::AccountInsertFailed(_)
            | RegistrationError::IdentityCreationFailed(_) => REMOTE,
        }
    }

    fn user_message(&self) -> String {
        RegistrationError::user_message(self)
    }
}

impl ApiFailure for LoginError {
    fn status(&self) -> StatusCode {
        match self {
            LoginError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LoginError::NotFound => StatusCode::NOT_FOUND,
            LoginError::NotApproved
            | LoginError::Waitlisted
            | LoginError::Rejected
            | LoginError::TermsNotAccepted => StatusCode::FORBIDDEN,
            LoginError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LoginError::Unexpected(_) => REMOTE,
            LoginError::AlreadyInFlight => StatusCode::CONFLICT,
        }
    }

    fn user_message(&self) -> String {
        LoginError::user_message(self)
    }
}

impl ApiFailure for StatusError {
    fn status(&self) -> StatusCode {
        match self {
            StatusError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StatusError::NotFound => StatusCode::NOT_FOUND,
            StatusError::Unexpected(_) => REMOTE,
        }
    }

    fn user_message(&self) -> String {
        StatusError::user_message(self)
    }
}

impl ApiFailure for ResetError {
    fn status(&self) -> StatusCode {
        match self {
            ResetError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ResetError::Failed(_) => REMOTE,
        }
    }

    fn user_message(&self) -> String {
        ResetError::user_message(self)
    }
}

impl ApiFailure for GuardError {
    fn status(&self) -> StatusCode {
        match self {
            GuardError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GuardError::Unexpected(_) => REMOTE,
        }
    }

    fn user_message(&self) -> String {
        match self {
            GuardError::Unauthenticated => "Sign in to continue.".to_string(),
            GuardError::Unexpected(_) => "Could not verify your session. Please try again.".to_string(),
        }
    }
}

impl ApiFailure for ViewError {
    fn status(&self) -> StatusCode {
        match self {
            ViewError::AccountNotFound => StatusCode::NOT_FOUND,
            ViewError::Unexpected(_) => REMOTE,
        }
    }

    fn user_message(&self) -> String {
        ViewError::user_message(self)
    }
}

impl ApiFailure for SubmitError {
    fn status(&self) -> StatusCode {
        match self {
            SubmitError::NoFile => StatusCode::UNPROCESSABLE_ENTITY,
            SubmitError::UnknownAssignment(_) => StatusCode::NOT_FOUND,
            SubmitError::NotPending(_) => StatusCode::CONFLICT,
            SubmitError::Account(err) => err.status(),
            SubmitError::AssignmentUpdateFailed(GatewayError::NotFound) => StatusCode::NOT_FOUND,
            SubmitError::UploadFailed(_)
            | SubmitError::AssignmentUpdateFailed(_)
            | SubmitError::GradeInsertFailed(_) => REMOTE,
        }
    }

    fn user_message(&self) -> String {
        SubmitError::user_message(self)
    }
}

fn malformed_upload(err: MultipartError) -> Response {
    let payload = json!({
        "error": err.body_text(),
        "message": "The upload could not be read. Please try again.",
    });
    (err.status(), Json(payload)).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn signed_in(service: &PortalService, headers: &HeaderMap) -> Result<Session, Response> {
    service
        .require_session(bearer_token(headers))
        .await
        .map_err(ApiFailure::into_failure)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    q: String,
}

fn is_checked(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1" | "yes"
    )
}

async fn file_part(field: axum::extract::multipart::Field<'_>) -> Result<Attachment, MultipartError> {
    let name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref())
        .to_string();
    let bytes = field.bytes().await?;
    Ok(Attachment::new(name, content_type, bytes.to_vec()))
}

pub(crate) async fn register_handler(
    State(service): State<Arc<PortalService>>,
    mut multipart: Multipart,
) -> Response {
    let mut request = RegistrationRequest::default();
    let mut document = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return malformed_upload(err),
        };
        let name = field.name().unwrap_or_default().to_string();
        let outcome = match name.as_str() {
            "document" => file_part(field).await.map(|file| document = Some(file)),
            "name" => field.text().await.map(|text| request.name = text),
            "email" => field.text().await.map(|text| request.email = text),
            "password" => field.text().await.map(|text| request.password = text),
            "terms_accepted" => field
                .text()
                .await
                .map(|text| request.terms_accepted = is_checked(&text)),
            _ => Ok(()),
        };
        if let Err(err) = outcome {
            return malformed_upload(err);
        }
    }

    match service.register(&request, document.as_ref()).await {
        Ok(registration) => {
            let status = registration.status();
            let payload = json!({
                "account_id": registration.account.id,
                "email": registration.account.email,
                "status": status.label(),
                "headline": status.headline(),
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn status_handler(
    State(service): State<Arc<PortalService>>,
    Query(request): Query<EmailRequest>,
) -> Response {
    match service.check_status(&request).await {
        Ok(status) => {
            let payload = json!({
                "status": status.label(),
                "headline": status.headline(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn login_handler(
    State(service): State<Arc<PortalService>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    match service.login(&request).await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn reset_handler(
    State(service): State<Arc<PortalService>>,
    Json(request): Json<EmailRequest>,
) -> Response {
    match service.reset_password(&request).await {
        Ok(()) => {
            let payload = json!({
                "message": "A recovery email has been sent. Please check your inbox.",
            });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn profile_handler(
    State(service): State<Arc<PortalService>>,
    headers: HeaderMap,
) -> Response {
    let session = match signed_in(&service, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    match service.profile(&session).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn announcements_handler(
    State(service): State<Arc<PortalService>>,
    headers: HeaderMap,
    Query(search): Query<SearchQuery>,
) -> Response {
    if let Err(response) = signed_in(&service, &headers).await {
        return response;
    }
    match service.views().announcements(&search.q).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn assignments_handler(
    State(service): State<Arc<PortalService>>,
    headers: HeaderMap,
    Query(search): Query<SearchQuery>,
) -> Response {
    let session = match signed_in(&service, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let today = PortalService::today();
    match service
        .views()
        .pending_assignments(&session, today, &search.q)
        .await
    {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<PortalService>>,
    Path(assignment_id): Path<i64>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let session = match signed_in(&service, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let mut file = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => match file_part(field).await {
                Ok(part) => file = Some(part),
                Err(err) => return malformed_upload(err),
            },
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(err) => return malformed_upload(err),
        }
    }

    match service
        .views()
        .submit(
            &session,
            AssignmentId(assignment_id),
            PortalService::today(),
            file.as_ref(),
        )
        .await
    {
        Ok(submission) => (StatusCode::CREATED, Json(submission)).into_response(),
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn grades_handler(
    State(service): State<Arc<PortalService>>,
    headers: HeaderMap,
    Query(search): Query<SearchQuery>,
) -> Response {
    let session = match signed_in(&service, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    match service.views().grades(&session, &search.q).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(err) => err.into_failure(),
    }
}

pub(crate) async fn schedule_handler(
    State(service): State<Arc<PortalService>>,
    headers: HeaderMap,
    Query(search): Query<SearchQuery>,
) -> Response {
    if let Err(response) = signed_in(&service, &headers).await {
        return response;
    }
    match service.views().schedule(&search.q).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(err) => err.into_failure(),
    }
}
