use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{apply_filter, unexpected, PortalViews, Searchable, ViewError};
use crate::portal::domain::{AssignmentId, Session, SubmissionId};

/// Submission row joined with the title of the assignment it answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeView {
    pub submission_id: SubmissionId,
    pub assignment_id: AssignmentId,
    /// `None` when the assignment no longer exists.
    pub assignment_title: Option<String>,
    pub score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
    pub file_url: Option<String>,
}

impl Searchable for GradeView {
    fn search_text(&self) -> &str {
        self.assignment_title.as_deref().unwrap_or("")
    }
}

impl PortalViews {
    /// Grades of the signed-in account, most recent submission first.
    pub async fn grades(&self, session: &Session, query: &str) -> Result<Vec<GradeView>, ViewError> {
        let account = self.account_for(session).await?;
        let mut submissions = self
            .backend
            .records
            .submissions_for(account.id)
            .await
            .map_err(unexpected("submissions"))?;
        submissions.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let ids: Vec<AssignmentId> = submissions
            .iter()
            .map(|submission| submission.assignment_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let titles: HashMap<AssignmentId, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.backend
                .records
                .assignments_by_ids(&ids)
                .await
                .map_err(unexpected("assignment titles"))?
                .into_iter()
                .map(|assignment| (assignment.id, assignment.title))
                .collect()
        };

        let grades = submissions
            .into_iter()
            .map(|submission| GradeView {
                submission_id: submission.id,
                assignment_id: submission.assignment_id,
                assignment_title: titles.get(&submission.assignment_id).cloned(),
                score: submission.score,
                submitted_at: submission.submitted_at,
                file_url: submission.file_url,
            })
            .collect();
        Ok(apply_filter(grades, query))
    }
}
