use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Relational id of an account row. Assignment and grade records key on this, not on the
    /// auth identity.
    AccountId
);
row_id!(AssignmentId);
row_id!(SubmissionId);
row_id!(AnnouncementId);
row_id!(AuthorId);
row_id!(ScheduleEntryId);

/// Manual approval state set by an approver outside the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Waitlisted,
    Rejected,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Waitlisted => "waitlisted",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Headline shown on the approval status screen.
    pub const fn headline(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "Your registration is under review",
            ApprovalStatus::Approved => "Your registration was approved, you can now sign in",
            ApprovalStatus::Waitlisted => "Your registration was placed on the waiting list",
            ApprovalStatus::Rejected => "Your registration was not approved",
        }
    }
}

/// Applicant row as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub approval_status: ApprovalStatus,
    pub terms_accepted: bool,
    #[serde(default)]
    pub document_url: Option<String>,
}

/// Insert payload for a new applicant. The document URL is mandatory here so an account can
/// never be created without its supporting document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub approval_status: ApprovalStatus,
    pub terms_accepted: bool,
    pub document_url: String,
}

/// Metadata attached to the auth identity at sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub name: String,
    pub account_id: AccountId,
}

/// Auth identity returned by the provider after sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Proof of a successful sign-in. Expiry is owned by the auth provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Read-only notice published by staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: AnnouncementId,
    #[serde(default)]
    pub author_id: Option<AuthorId>,
    pub body: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub file: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Open,
    Submitted,
    Graded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "calendar_date")]
    pub available_from: NaiveDate,
    #[serde(with = "calendar_date")]
    pub due_at: NaiveDate,
    #[serde(default)]
    pub status: AssignmentStatus,
    #[serde(default)]
    pub file_url: Option<String>,
}

impl Assignment {
    /// Both bounds are inclusive calendar dates.
    pub fn is_open_on(&self, today: NaiveDate) -> bool {
        self.available_from <= today && today <= self.due_at
    }
}

/// Grade record linking an account to an assignment. The score is filled in later by a grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub account_id: AccountId,
    #[serde(default)]
    pub score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub assignment_id: AssignmentId,
    pub account_id: AccountId,
    pub score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleEntryId,
    pub day: String,
    pub time: String,
    pub subject: String,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub campus: String,
}

/// Accepts either `YYYY-MM-DD` or a full RFC 3339 timestamp and keeps only the calendar date.
pub(crate) mod calendar_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<NaiveDate, String> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(date);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|timestamp| timestamp.date_naive())
            .map_err(|err| format!("failed to parse '{raw}' as a calendar date ({err})"))
    }

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
