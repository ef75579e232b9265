use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
}

/// File picked by the user, held locally until it is uploaded.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        match self.content_type.parse::<mime::Mime>() {
            Ok(parsed) if parsed.type_() == mime::IMAGE => AttachmentKind::Image,
            _ => AttachmentKind::Document,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Object-storage safe version of the original file name.
    pub fn storage_name(&self) -> String {
        storage_segment(&self.name, "document")
    }
}

/// Keeps ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub(crate) fn storage_segment(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c == '_');
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Storage key for an upload under `prefix`. The timestamp keeps re-uploads of the same file
/// from colliding with an earlier object.
pub(crate) fn object_path(prefix: &str, attachment: &Attachment, at: DateTime<Utc>) -> String {
    format!(
        "{prefix}/{}-{}",
        at.format("%Y%m%d%H%M%S%9f"),
        attachment.storage_name()
    )
}

/// Source of local preview handles (object URLs in a browser).
pub trait PreviewRegistry: Send + Sync {
    fn create(&self, attachment: &Attachment) -> String;
    fn revoke(&self, url: &str);
}

#[derive(Default)]
struct PreviewState {
    issued: u64,
    live: HashSet<String>,
    revoked: Vec<String>,
}

/// Preview registry that only tracks handles.
#[derive(Default)]
pub struct MemoryPreviews {
    state: Mutex<PreviewState>,
}

impl MemoryPreviews {
    pub fn live(&self) -> usize {
        self.state.lock().expect("preview mutex poisoned").live.len()
    }

    pub fn revocations_of(&self, url: &str) -> usize {
        self.state
            .lock()
            .expect("preview mutex poisoned")
            .revoked
            .iter()
            .filter(|revoked| revoked.as_str() == url)
            .count()
    }
}

impl PreviewRegistry for MemoryPreviews {
    fn create(&self, attachment: &Attachment) -> String {
        let mut state = self.state.lock().expect("preview mutex poisoned");
        state.issued += 1;
        let url = format!("preview://{}/{}", state.issued, attachment.storage_name());
        state.live.insert(url.clone());
        url
    }

    fn revoke(&self, url: &str) {
        let mut state = self.state.lock().expect("preview mutex poisoned");
        state.live.remove(url);
        state.revoked.push(url.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct StagedAttachment {
    pub attachment: Attachment,
    pub kind: AttachmentKind,
    pub preview_url: String,
}

/// Single-file slot owned by a form. The preview handle of whatever sits in the slot is
/// released exactly once: on replacement, removal, successful upload, or drop.
pub struct AttachmentSlot {
    previews: Arc<dyn PreviewRegistry>,
    staged: Option<StagedAttachment>,
}

impl AttachmentSlot {
    pub fn new(previews: Arc<dyn PreviewRegistry>) -> Self {
        Self {
            previews,
            staged: None,
        }
    }

    /// Stages `attachment`, replacing (and releasing) any previous one.
    pub fn stage(&mut self, attachment: Attachment) -> &StagedAttachment {
        self.remove();
        let preview_url = self.previews.create(&attachment);
        let kind = attachment.kind();
        self.staged.insert(StagedAttachment {
            attachment,
            kind,
            preview_url,
        })
    }

    /// Returns `false` when the slot was already empty.
    pub fn remove(&mut self) -> bool {
        match self.staged.take() {
            Some(staged) => {
                self.previews.revoke(&staged.preview_url);
                true
            }
            None => false,
        }
    }

    pub fn staged(&self) -> Option<&StagedAttachment> {
        self.staged.as_ref()
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.staged.as_ref().map(|staged| &staged.attachment)
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_none()
    }
}

impl Drop for AttachmentSlot {
    fn drop(&mut self) {
        self.remove();
    }
}
