use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use super::{apply_filter, unexpected, PortalViews, Searchable, ViewError};
use crate::portal::domain::{Announcement, Author, AuthorId};

/// Announcement joined with its author, filtered on the body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnouncementView {
    #[serde(flatten)]
    pub announcement: Announcement,
    pub author: Option<Author>,
}

impl Searchable for AnnouncementView {
    fn search_text(&self) -> &str {
        &self.announcement.body
    }
}

impl PortalViews {
    /// Newest first. Authors are resolved in a single lookup.
    pub async fn announcements(&self, query: &str) -> Result<Vec<AnnouncementView>, ViewError> {
        let mut announcements = self
            .backend
            .records
            .announcements()
            .await
            .map_err(unexpected("announcements"))?;
        announcements.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let author_ids: Vec<AuthorId> = announcements
            .iter()
            .filter_map(|announcement| announcement.author_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let authors: HashMap<AuthorId, Author> = if author_ids.is_empty() {
            HashMap::new()
        } else {
            self.backend
                .records
                .authors_by_ids(&author_ids)
                .await
                .map_err(unexpected("announcement authors"))?
                .into_iter()
                .map(|author| (author.id, author))
                .collect()
        };

        let views: Vec<AnnouncementView> = announcements
            .into_iter()
            .map(|announcement| {
                let author = announcement
                    .author_id
                    .and_then(|id| authors.get(&id).cloned());
                AnnouncementView {
                    announcement,
                    author,
                }
            })
            .collect();
        debug!(count = views.len(), "announcements loaded");
        Ok(apply_filter(views, query))
    }
}
