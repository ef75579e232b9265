use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use super::{apply_filter, unexpected, PortalViews, Searchable, ViewError};
use crate::gateway::GatewayError;
use crate::portal::attachment::{object_path, Attachment, AttachmentSlot};
use crate::portal::domain::{
    AccountId, Assignment, AssignmentId, NewSubmission, Session, Submission,
};

impl Searchable for Assignment {
    fn search_text(&self) -> &str {
        &self.title
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("select a file to submit")]
    NoFile,
    #[error("assignment {0} does not exist")]
    UnknownAssignment(AssignmentId),
    #[error("assignment {0} is already submitted or not open")]
    NotPending(AssignmentId),
    #[error(transparent)]
    Account(#[from] ViewError),
    #[error("submission upload failed: {0}")]
    UploadFailed(GatewayError),
    #[error("assignment update failed: {0}")]
    AssignmentUpdateFailed(GatewayError),
    #[error("grade record insert failed: {0}")]
    GradeInsertFailed(GatewayError),
}

impl SubmitError {
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::NoFile => "Select a file before submitting.".to_string(),
            SubmitError::UnknownAssignment(_) => "This assignment no longer exists.".to_string(),
            SubmitError::NotPending(_) => {
                "This assignment was already submitted or is not open for submissions.".to_string()
            }
            SubmitError::Account(err) => err.user_message(),
            SubmitError::UploadFailed(_) => {
                "We could not upload your file. Please try again.".to_string()
            }
            SubmitError::AssignmentUpdateFailed(_) | SubmitError::GradeInsertFailed(_) => {
                "Your submission could not be recorded. Please try again.".to_string()
            }
        }
    }
}

impl PortalViews {
    /// Assignments the signed-in account still has to hand in: not yet submitted and open on
    /// `today`.
    pub async fn pending_assignments(
        &self,
        session: &Session,
        today: NaiveDate,
        query: &str,
    ) -> Result<Vec<Assignment>, ViewError> {
        let account = self.account_for(session).await?;
        let assignments = self
            .backend
            .records
            .assignments()
            .await
            .map_err(unexpected("assignments"))?;
        let submitted: HashSet<AssignmentId> = self
            .backend
            .records
            .submissions_for(account.id)
            .await
            .map_err(unexpected("submissions"))?
            .into_iter()
            .map(|submission| submission.assignment_id)
            .collect();

        let pending: Vec<Assignment> = assignments
            .into_iter()
            .filter(|assignment| !submitted.contains(&assignment.id))
            .filter(|assignment| assignment.is_open_on(today))
            .collect();
        Ok(apply_filter(pending, query))
    }

    /// Uploads the file, points the assignment at it, and records an ungraded submission.
    ///
    /// Only assignments still pending for the account on `today` are accepted; anything else is
    /// refused before the upload.
    pub async fn submit(
        &self,
        session: &Session,
        assignment_id: AssignmentId,
        today: NaiveDate,
        attachment: Option<&Attachment>,
    ) -> Result<Submission, SubmitError> {
        let attachment = attachment
            .filter(|attachment| !attachment.is_empty())
            .ok_or(SubmitError::NoFile)?;
        let account = self.account_for(session).await?;
        self.ensure_pending(account.id, assignment_id, today).await?;

        let submitted_at = Utc::now();
        let path = object_path(
            &format!("{}/{}", account.id, assignment_id),
            attachment,
            submitted_at,
        );
        self.backend
            .storage
            .upload(
                &self.submission_bucket,
                &path,
                &attachment.content_type,
                &attachment.bytes,
            )
            .await
            .map_err(|err| {
                error!(%assignment_id, %path, error = %err, "submission upload failed");
                SubmitError::UploadFailed(err)
            })?;
        let file_url = self.backend.storage.public_url(&self.submission_bucket, &path);

        self.backend
            .records
            .set_assignment_file(assignment_id, &file_url)
            .await
            .map_err(|err| {
                error!(%assignment_id, error = %err, "assignment file update failed");
                SubmitError::AssignmentUpdateFailed(err)
            })?;

        let submission = self
            .backend
            .records
            .insert_submission(NewSubmission {
                assignment_id,
                account_id: account.id,
                score: None,
                submitted_at,
                file_url: Some(file_url),
            })
            .await
            .map_err(|err| {
                error!(
                    %assignment_id,
                    account_id = %account.id,
                    error = %err,
                    "grade record insert failed"
                );
                SubmitError::GradeInsertFailed(err)
            })?;

        info!(%assignment_id, account_id = %account.id, "assignment submitted");
        Ok(submission)
    }

    async fn ensure_pending(
        &self,
        account_id: AccountId,
        assignment_id: AssignmentId,
        today: NaiveDate,
    ) -> Result<(), SubmitError> {
        let assignment = self
            .backend
            .records
            .assignments_by_ids(&[assignment_id])
            .await
            .map_err(unexpected("assignments"))?
            .into_iter()
            .find(|assignment| assignment.id == assignment_id)
            .ok_or(SubmitError::UnknownAssignment(assignment_id))?;

        let already_submitted = self
            .backend
            .records
            .submissions_for(account_id)
            .await
            .map_err(unexpected("submissions"))?
            .iter()
            .any(|submission| submission.assignment_id == assignment_id);

        if already_submitted || !assignment.is_open_on(today) {
            warn!(
                %assignment_id,
                %account_id,
                already_submitted,
                "submission refused for assignment that is not pending"
            );
            return Err(SubmitError::NotPending(assignment_id));
        }
        Ok(())
    }
}

/// Locally displayed list of pending assignments with its filter box, as loaded on `today`.
#[derive(Debug, Clone)]
pub struct AssignmentBoard {
    pending: Vec<Assignment>,
    query: String,
    today: NaiveDate,
}

impl AssignmentBoard {
    pub fn new(pending: Vec<Assignment>, today: NaiveDate) -> Self {
        Self {
            pending,
            query: String::new(),
            today,
        }
    }

    pub async fn load(
        views: &PortalViews,
        session: &Session,
        today: NaiveDate,
    ) -> Result<Self, ViewError> {
        let pending = views.pending_assignments(session, today, "").await?;
        Ok(Self::new(pending, today))
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn visible(&self) -> Vec<&Assignment> {
        apply_filter(self.pending.iter().collect(), &self.query)
    }

    pub fn contains(&self, id: AssignmentId) -> bool {
        self.pending.iter().any(|assignment| assignment.id == id)
    }

    /// Submits the file staged in `slot`. On success the assignment leaves the board and the
    /// slot's preview is released; on failure both stay as they were. Ids not on the board are
    /// refused without a remote call.
    pub async fn submit(
        &mut self,
        views: &PortalViews,
        session: &Session,
        assignment_id: AssignmentId,
        slot: &mut AttachmentSlot,
    ) -> Result<Submission, SubmitError> {
        if !self.contains(assignment_id) {
            return Err(SubmitError::NotPending(assignment_id));
        }
        let submission = views
            .submit(session, assignment_id, self.today, slot.attachment())
            .await?;
        slot.remove();
        self.pending.retain(|assignment| assignment.id != assignment_id);
        Ok(submission)
    }
}
