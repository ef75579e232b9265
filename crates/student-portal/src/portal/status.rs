use serde::Deserialize;
use tracing::{error, info};

use super::domain::ApprovalStatus;
use super::fields::{normalize_email, validate, Field, FieldSource, FormKind, ValidationError};
use super::registration::capitalize;
use crate::gateway::{Backend, GatewayError};

/// Form carrying only an email: status lookup and password recovery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

impl EmailRequest {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

impl FieldSource for EmailRequest {
    fn value(&self, field: Field) -> Option<&str> {
        match field {
            Field::Email => Some(&self.email),
            Field::Name | Field::Password => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no registration found for this email")]
    NotFound,
    #[error("status lookup failed: {0}")]
    Unexpected(GatewayError),
}

impl StatusError {
    pub fn user_message(&self) -> String {
        match self {
            StatusError::Validation(err) => capitalize(&err.to_string()),
            StatusError::NotFound => "No registration was found for this email.".to_string(),
            StatusError::Unexpected(_) => {
                "We could not check your status. Please try again.".to_string()
            }
        }
    }
}

/// Password-free approval lookup for applicants waiting on a decision.
pub struct StatusChecker {
    backend: Backend,
}

impl StatusChecker {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn check_status(&self, request: &EmailRequest) -> Result<ApprovalStatus, StatusError> {
        validate(FormKind::StatusCheck, request)?;
        let email = normalize_email(&request.email);

        let account = self
            .backend
            .records
            .account_by_email(&email)
            .await
            .map_err(|err| {
                error!(%email, error = %err, "status lookup failed");
                StatusError::Unexpected(err)
            })?
            .ok_or(StatusError::NotFound)?;

        info!(%email, status = account.approval_status.label(), "approval status checked");
        Ok(account.approval_status)
    }
}
