//! Capability surface of the hosted backend.
//!
//! The portal never talks to the backend directly; every workflow goes through the three
//! traits below so the hosted client and the in-memory stand-in are interchangeable.

pub mod hosted;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::portal::domain::{
    Account, AccountId, Announcement, Assignment, AssignmentId, Author, AuthorId, Identity,
    IdentityProfile, NewAccount, NewSubmission, ScheduleEntry, Session, Submission,
};

pub use hosted::HostedGateway;
pub use memory::{GatewayOperation, MemoryGateway};

/// Error enumeration for remote failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("credentials rejected")]
    Unauthorized,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Account rows are keyed on email without regard to case; older rows may keep mixed case.
pub(crate) fn same_email(stored: &str, wanted: &str) -> bool {
    stored.trim().to_lowercase() == wanted.trim().to_lowercase()
}

/// Identity provider: credentials, sign-up, recovery mail, and session lookup.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` means the provider answered without an identity.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<Session>, GatewayError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &IdentityProfile,
    ) -> Result<Option<Identity>, GatewayError>;

    async fn reset_password(&self, email: &str) -> Result<(), GatewayError>;

    /// Resolves a live session for the access token, `None` once it is unknown or expired.
    async fn session(&self, access_token: &str) -> Result<Option<Session>, GatewayError>;
}

/// Relational tables consumed by the portal.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, GatewayError>;
    async fn insert_account(&self, account: NewAccount) -> Result<Account, GatewayError>;
    async fn delete_account(&self, id: AccountId) -> Result<(), GatewayError>;

    /// Newest first.
    async fn announcements(&self) -> Result<Vec<Announcement>, GatewayError>;
    async fn authors_by_ids(&self, ids: &[AuthorId]) -> Result<Vec<Author>, GatewayError>;

    async fn assignments(&self) -> Result<Vec<Assignment>, GatewayError>;
    async fn assignments_by_ids(
        &self,
        ids: &[AssignmentId],
    ) -> Result<Vec<Assignment>, GatewayError>;
    async fn set_assignment_file(
        &self,
        id: AssignmentId,
        file_url: &str,
    ) -> Result<(), GatewayError>;

    async fn submissions_for(&self, account: AccountId) -> Result<Vec<Submission>, GatewayError>;
    async fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Submission, GatewayError>;

    async fn schedule(&self) -> Result<Vec<ScheduleEntry>, GatewayError>;
}

/// Object storage for uploaded documents.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), GatewayError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Handles to the three backend capabilities shared by every workflow.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub records: Arc<dyn RecordStore>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            auth,
            records,
            storage,
        }
    }

    /// Wraps a single client implementing all three capabilities.
    pub fn from_gateway<G>(gateway: Arc<G>) -> Self
    where
        G: AuthProvider + RecordStore + ObjectStorage + 'static,
    {
        Self {
            auth: gateway.clone(),
            records: gateway.clone(),
            storage: gateway,
        }
    }
}
