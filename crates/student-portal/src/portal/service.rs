use chrono::NaiveDate;

use super::attachment::Attachment;
use super::authentication::{AuthenticationWorkflow, LoginError, LoginRequest, ResetError};
use super::domain::{Account, ApprovalStatus, Session};
use super::fields::normalize_email;
use super::flow::{FlowAction, SingleFlight};
use super::guard::{Access, GuardError, SessionGuard};
use super::registration::{Registration, RegistrationError, RegistrationRequest, RegistrationWorkflow};
use super::status::{EmailRequest, StatusChecker, StatusError};
use super::views::{PortalViews, ViewError};
use crate::config::{BackendConfig, DEFAULT_DOCUMENT_BUCKET, DEFAULT_SUBMISSION_BUCKET};
use crate::gateway::Backend;

/// Storage buckets the portal uploads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSettings {
    pub document_bucket: String,
    pub submission_bucket: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            document_bucket: DEFAULT_DOCUMENT_BUCKET.to_string(),
            submission_bucket: DEFAULT_SUBMISSION_BUCKET.to_string(),
        }
    }
}

impl From<&BackendConfig> for PortalSettings {
    fn from(config: &BackendConfig) -> Self {
        Self {
            document_bucket: config.document_bucket.clone(),
            submission_bucket: config.submission_bucket.clone(),
        }
    }
}

/// Service composing the portal workflows over one backend.
pub struct PortalService {
    registration: RegistrationWorkflow,
    authentication: AuthenticationWorkflow,
    status: StatusChecker,
    guard: SessionGuard,
    views: PortalViews,
    flights: SingleFlight<(FlowAction, String)>,
}

impl PortalService {
    pub fn new(backend: Backend, settings: PortalSettings) -> Self {
        Self {
            registration: RegistrationWorkflow::new(backend.clone(), settings.document_bucket),
            authentication: AuthenticationWorkflow::new(backend.clone()),
            status: StatusChecker::new(backend.clone()),
            guard: SessionGuard::new(backend.clone()),
            views: PortalViews::new(backend, settings.submission_bucket),
            flights: SingleFlight::default(),
        }
    }

    /// Registers an applicant. A second registration for the same email is refused while the
    /// first is still running.
    pub async fn register(
        &self,
        request: &RegistrationRequest,
        attachment: Option<&Attachment>,
    ) -> Result<Registration, RegistrationError> {
        let _permit = self
            .flights
            .try_begin((FlowAction::Register, normalize_email(&request.email)))
            .ok_or(RegistrationError::AlreadyInFlight)?;
        self.registration.register(request, attachment).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session, LoginError> {
        let _permit = self
            .flights
            .try_begin((FlowAction::Login, normalize_email(&request.email)))
            .ok_or(LoginError::AlreadyInFlight)?;
        self.authentication.login(request).await
    }

    pub async fn check_status(&self, request: &EmailRequest) -> Result<ApprovalStatus, StatusError> {
        self.status.check_status(request).await
    }

    pub async fn reset_password(&self, request: &EmailRequest) -> Result<(), ResetError> {
        self.authentication.reset_password(request).await
    }

    pub async fn authorize(&self, access_token: Option<&str>) -> Result<Access, GuardError> {
        self.guard.authorize(access_token).await
    }

    pub async fn require_session(&self, access_token: Option<&str>) -> Result<Session, GuardError> {
        self.guard.require(access_token).await
    }

    /// Account row of the signed-in applicant, shown on the dashboard greeting.
    pub async fn profile(&self, session: &Session) -> Result<Account, ViewError> {
        self.views.account_for(session).await
    }

    pub fn views(&self) -> &PortalViews {
        &self.views
    }

    /// Calendar date the assignments view compares availability windows against.
    pub fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}
