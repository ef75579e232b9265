use std::fmt;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::attachment::{object_path, storage_segment, Attachment};
use super::domain::{Account, ApprovalStatus, Identity, IdentityProfile, NewAccount};
use super::fields::{normalize_email, validate, Field, FieldSource, FormKind, ValidationError};
use crate::gateway::{Backend, GatewayError};

/// Raw registration form values.
#[derive(Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("terms_accepted", &self.terms_accepted)
            .finish()
    }
}

impl FieldSource for RegistrationRequest {
    fn value(&self, field: Field) -> Option<&str> {
        Some(match field {
            Field::Name => &self.name,
            Field::Email => &self.email,
            Field::Password => &self.password,
        })
    }
}

/// Outcome of a completed registration. The account always starts out pending.
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: Account,
    pub identity: Identity,
}

impl Registration {
    pub fn status(&self) -> ApprovalStatus {
        self.account.approval_status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a supporting document is required")]
    MissingAttachment,
    #[error("email already registered")]
    EmailTaken,
    #[error("account lookup failed: {0}")]
    Lookup(GatewayError),
    #[error("document upload failed: {0}")]
    UploadFailed(GatewayError),
    #[error("account insert failed: {0}")]
    AccountInsertFailed(GatewayError),
    #[error("identity creation failed: {0}")]
    IdentityCreationFailed(GatewayError),
    #[error("a registration for this email is already in progress")]
    AlreadyInFlight,
}

impl RegistrationError {
    pub fn user_message(&self) -> String {
        match self {
            RegistrationError::Validation(err) => capitalize(&err.to_string()),
            RegistrationError::MissingAttachment => {
                "Attach a supporting document before submitting.".to_string()
            }
            RegistrationError::EmailTaken => {
                "This email is already registered. Check your approval status instead."
                    .to_string()
            }
            RegistrationError::AlreadyInFlight => {
                "Your registration is already being submitted.".to_string()
            }
            RegistrationError::UploadFailed(_) => {
                "We could not upload your document. Please try again.".to_string()
            }
            RegistrationError::Lookup(_)
            | RegistrationError::AccountInsertFailed(_)
            | RegistrationError::IdentityCreationFailed(_) => {
                "Registration failed. Please try again.".to_string()
            }
        }
    }
}

pub(crate) fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

/// Creates an applicant account, its supporting document, and its auth identity.
///
/// Steps run strictly in order because each needs the output of the one before: the document
/// URL goes into the account row and the account row id goes into the identity metadata.
pub struct RegistrationWorkflow {
    backend: Backend,
    document_bucket: String,
}

impl RegistrationWorkflow {
    pub fn new(backend: Backend, document_bucket: impl Into<String>) -> Self {
        Self {
            backend,
            document_bucket: document_bucket.into(),
        }
    }

    pub async fn register(
        &self,
        request: &RegistrationRequest,
        attachment: Option<&Attachment>,
    ) -> Result<Registration, RegistrationError> {
        let attachment = attachment
            .filter(|attachment| !attachment.is_empty())
            .ok_or(RegistrationError::MissingAttachment)?;
        validate(FormKind::Registration, request)?;

        let email = normalize_email(&request.email);
        let name = request.name.trim().to_string();

        let existing = self
            .backend
            .records
            .account_by_email(&email)
            .await
            .map_err(|err| {
                error!(%email, error = %err, "account lookup failed during registration");
                RegistrationError::Lookup(err)
            })?;
        if existing.is_some() {
            info!(%email, "registration rejected, email already registered");
            return Err(RegistrationError::EmailTaken);
        }

        let path = object_path(
            &storage_segment(&email, "applicant"),
            attachment,
            Utc::now(),
        );
        self.backend
            .storage
            .upload(
                &self.document_bucket,
                &path,
                &attachment.content_type,
                &attachment.bytes,
            )
            .await
            .map_err(|err| {
                error!(%email, %path, error = %err, "document upload failed");
                RegistrationError::UploadFailed(err)
            })?;
        let document_url = self.backend.storage.public_url(&self.document_bucket, &path);

        let account = self
            .backend
            .records
            .insert_account(NewAccount {
                name: name.clone(),
                email: email.clone(),
                approval_status: ApprovalStatus::Pending,
                terms_accepted: request.terms_accepted,
                document_url,
            })
            .await
            .map_err(|err| {
                error!(%email, error = %err, "account insert failed");
                RegistrationError::AccountInsertFailed(err)
            })?;

        let profile = IdentityProfile {
            name,
            account_id: account.id,
        };
        let identity = match self
            .backend
            .auth
            .sign_up(&email, &request.password, &profile)
            .await
        {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                let err = GatewayError::Malformed("sign-up returned no identity".to_string());
                return Err(self.abandon(&account, err).await);
            }
            Err(err) => return Err(self.abandon(&account, err).await),
        };

        info!(
            %email,
            account_id = %account.id,
            user_id = %identity.user_id,
            "registration submitted for approval"
        );
        Ok(Registration { account, identity })
    }

    /// Removes the account row left behind by a failed sign-up so the email can register again.
    async fn abandon(&self, account: &Account, cause: GatewayError) -> RegistrationError {
        error!(
            email = %account.email,
            account_id = %account.id,
            error = %cause,
            "identity creation failed, removing account row"
        );
        if let Err(cleanup) = self.backend.records.delete_account(account.id).await {
            warn!(
                account_id = %account.id,
                error = %cleanup,
                "could not remove orphaned account row"
            );
        }
        RegistrationError::IdentityCreationFailed(cause)
    }
}
