//! Read views behind the session guard.
//!
//! Every view fetches eagerly, joins what it needs in one batch, and finishes with the same
//! case-insensitive text filter over a single display field.

pub mod announcements;
pub mod assignments;
pub mod grades;
pub mod schedule;

use tracing::{error, warn};

use super::domain::{Account, Session};
use crate::gateway::{Backend, GatewayError};

pub use announcements::AnnouncementView;
pub use assignments::{AssignmentBoard, SubmitError};
pub use grades::GradeView;

/// Display field the free-text filter matches against.
pub trait Searchable {
    fn search_text(&self) -> &str;
}

impl<T: Searchable + ?Sized> Searchable for &T {
    fn search_text(&self) -> &str {
        (**self).search_text()
    }
}

/// Keeps items whose display field contains `query`, ignoring case. A blank query keeps
/// everything, and filtering an already filtered list by the same query changes nothing.
pub fn apply_filter<T: Searchable>(items: Vec<T>, query: &str) -> Vec<T> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| item.search_text().to_lowercase().contains(&needle))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("no account row for the signed-in user")]
    AccountNotFound,
    #[error("failed to load data: {0}")]
    Unexpected(GatewayError),
}

impl ViewError {
    pub fn user_message(&self) -> String {
        match self {
            ViewError::AccountNotFound => {
                "Your account could not be found. Please sign in again.".to_string()
            }
            ViewError::Unexpected(_) => "Could not load this page. Please try again.".to_string(),
        }
    }
}

pub(crate) fn unexpected(what: &'static str) -> impl FnOnce(GatewayError) -> ViewError {
    move |err| {
        error!(error = %err, "failed to load {what}");
        ViewError::Unexpected(err)
    }
}

/// Protected views over the backend. Account-scoped views key on the account row id, which is
/// reached through the session email rather than the auth identity.
#[derive(Clone)]
pub struct PortalViews {
    backend: Backend,
    submission_bucket: String,
}

impl PortalViews {
    pub fn new(backend: Backend, submission_bucket: impl Into<String>) -> Self {
        Self {
            backend,
            submission_bucket: submission_bucket.into(),
        }
    }

    pub async fn account_for(&self, session: &Session) -> Result<Account, ViewError> {
        self.backend
            .records
            .account_by_email(&session.email)
            .await
            .map_err(unexpected("account"))?
            .ok_or_else(|| {
                warn!(email = %session.email, "session without matching account row");
                ViewError::AccountNotFound
            })
    }
}
