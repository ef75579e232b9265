use std::fmt;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::domain::{ApprovalStatus, Session};
use super::fields::{normalize_email, validate, Field, FieldSource, FormKind, ValidationError};
use super::registration::capitalize;
use super::status::EmailRequest;
use crate::gateway::{Backend, GatewayError};

#[derive(Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl FieldSource for LoginRequest {
    fn value(&self, field: Field) -> Option<&str> {
        match field {
            Field::Email => Some(&self.email),
            Field::Password => Some(&self.password),
            Field::Name => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no account registered for this email")]
    NotFound,
    #[error("account not yet approved")]
    NotApproved,
    #[error("account is on the waiting list")]
    Waitlisted,
    #[error("account was rejected")]
    Rejected,
    #[error("terms of use not accepted")]
    TermsNotAccepted,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("status lookup failed: {0}")]
    Unexpected(GatewayError),
    #[error("a sign-in for this email is already in progress")]
    AlreadyInFlight,
}

impl LoginError {
    pub fn user_message(&self) -> String {
        match self {
            LoginError::Validation(err) => capitalize(&err.to_string()),
            LoginError::NotFound => "Account not found. Check your credentials.".to_string(),
            LoginError::NotApproved => {
                "Your registration has not been approved yet. Please wait for approval."
                    .to_string()
            }
            LoginError::Waitlisted => "Your registration was placed on the waiting list. \
                 Contact the institution for more information."
                .to_string(),
            LoginError::Rejected => "Your registration was not approved.".to_string(),
            LoginError::TermsNotAccepted => "You did not accept the terms of use. \
                 Contact the project organizers to review this."
                .to_string(),
            LoginError::InvalidCredentials => "Invalid email or password.".to_string(),
            LoginError::Unexpected(_) => {
                "We could not check your account status. Please try again.".to_string()
            }
            LoginError::AlreadyInFlight => "You are already being signed in.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not send recovery email: {0}")]
    Failed(GatewayError),
}

impl ResetError {
    pub fn user_message(&self) -> String {
        match self {
            ResetError::Validation(err) => capitalize(&err.to_string()),
            ResetError::Failed(_) => {
                "Could not send the recovery email. Check the address you entered.".to_string()
            }
        }
    }
}

/// Sign-in gated by approval status.
///
/// Status and terms are checked before the password ever reaches the identity provider, so
/// an applicant who is not yet approved learns nothing about whether their password is right
/// and never holds a session they are not allowed to use.
pub struct AuthenticationWorkflow {
    backend: Backend,
}

impl AuthenticationWorkflow {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session, LoginError> {
        validate(FormKind::Login, request)?;
        let email = normalize_email(&request.email);

        let account = self
            .backend
            .records
            .account_by_email(&email)
            .await
            .map_err(|err| {
                error!(%email, error = %err, "status lookup failed during sign-in");
                LoginError::Unexpected(err)
            })?
            .ok_or_else(|| {
                debug!(%email, "sign-in for unknown email");
                LoginError::NotFound
            })?;

        let denied = match account.approval_status {
            ApprovalStatus::Approved => None,
            ApprovalStatus::Pending => Some(LoginError::NotApproved),
            ApprovalStatus::Waitlisted => Some(LoginError::Waitlisted),
            ApprovalStatus::Rejected => Some(LoginError::Rejected),
        };
        if let Some(denied) = denied {
            info!(
                %email,
                status = account.approval_status.label(),
                "sign-in blocked by approval status"
            );
            return Err(denied);
        }
        if !account.terms_accepted {
            info!(%email, "sign-in blocked, terms not accepted");
            return Err(LoginError::TermsNotAccepted);
        }

        match self.backend.auth.sign_in(&email, &request.password).await {
            Ok(Some(session)) => {
                info!(%email, account_id = %account.id, "signed in");
                Ok(session)
            }
            Ok(None) | Err(GatewayError::Unauthorized) => {
                debug!(%email, "credentials rejected");
                Err(LoginError::InvalidCredentials)
            }
            Err(err) => {
                warn!(%email, error = %err, "credential verification failed");
                Err(LoginError::InvalidCredentials)
            }
        }
    }

    /// Asks the identity provider to mail a recovery link.
    pub async fn reset_password(&self, request: &EmailRequest) -> Result<(), ResetError> {
        validate(FormKind::PasswordReset, request)?;
        let email = normalize_email(&request.email);

        self.backend
            .auth
            .reset_password(&email)
            .await
            .map_err(|err| {
                error!(%email, error = %err, "password recovery request failed");
                ResetError::Failed(err)
            })?;
        info!(%email, "password recovery email requested");
        Ok(())
    }
}
