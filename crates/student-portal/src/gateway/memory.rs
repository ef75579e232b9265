use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{same_email, AuthProvider, GatewayError, ObjectStorage, RecordStore};
use crate::portal::domain::{
    Account, AccountId, Announcement, ApprovalStatus, Assignment, AssignmentId, Author, AuthorId,
    Identity, IdentityProfile, NewAccount, NewSubmission, ScheduleEntry, Session, Submission,
    SubmissionId,
};

/// Oldest entries are dropped once the call or reset log holds this many.
const CALL_LOG_CAPACITY: usize = 1024;

const DEFAULT_SESSION_TTL_MINUTES: i64 = 60;

/// Every remote call the in-memory gateway can serve, used for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    SignIn,
    SignUp,
    ResetPassword,
    Session,
    AccountByEmail,
    InsertAccount,
    DeleteAccount,
    Announcements,
    AuthorsByIds,
    Assignments,
    AssignmentsByIds,
    SetAssignmentFile,
    SubmissionsFor,
    InsertSubmission,
    Schedule,
    Upload,
}

#[derive(Debug, Clone)]
struct StoredIdentity {
    user_id: String,
    password: String,
    profile: IdentityProfile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    identities: HashMap<String, StoredIdentity>,
    sessions: HashMap<String, Session>,
    authors: BTreeMap<AuthorId, Author>,
    announcements: Vec<Announcement>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    submissions: Vec<Submission>,
    schedule: Vec<ScheduleEntry>,
    objects: HashMap<(String, String), StoredObject>,
    password_resets: VecDeque<String>,
    failures: HashSet<GatewayOperation>,
    calls: VecDeque<GatewayOperation>,
    next_row_id: i64,
    next_token: u64,
}

impl MemoryState {
    fn next_row_id(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn enter(&mut self, operation: GatewayOperation) -> Result<(), GatewayError> {
        if self.calls.len() == CALL_LOG_CAPACITY {
            self.calls.pop_front();
        }
        self.calls.push_back(operation);
        if self.failures.contains(&operation) {
            return Err(GatewayError::Unavailable(format!(
                "injected failure for {operation:?}"
            )));
        }
        Ok(())
    }
}

fn is_live(session: &Session, now: DateTime<Utc>) -> bool {
    session.expires_at.map_or(true, |expires_at| expires_at > now)
}

/// Process-local stand-in for the hosted backend.
///
/// Serves the demo mode of the API service and the test suites. Identities keep their
/// password in clear text because they never leave the process.
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    public_base: String,
    session_ttl: Duration,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            public_base: "memory://storage".to_string(),
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }

    /// Sessions issued from now on expire after `ttl`.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sessions still held, expired ones included until the next sign-in prunes them.
    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("gateway mutex poisoned")
    }

    /// Seeds an account row as an approver would have left it.
    pub fn seed_account(
        &self,
        name: &str,
        email: &str,
        status: ApprovalStatus,
        terms_accepted: bool,
    ) -> Account {
        let mut state = self.state();
        let id = AccountId(state.next_row_id());
        let account = Account {
            id,
            name: name.to_string(),
            email: email.to_string(),
            approval_status: status,
            terms_accepted,
            document_url: Some(format!("{}/seed/{id}.pdf", self.public_base)),
        };
        state.accounts.insert(id, account.clone());
        account
    }

    /// Seeds an auth identity linked to an existing account row.
    pub fn seed_identity(&self, email: &str, password: &str, account: &Account) {
        let mut state = self.state();
        let user_id = format!("user-{}", account.id);
        state.identities.insert(
            email.to_string(),
            StoredIdentity {
                user_id,
                password: password.to_string(),
                profile: IdentityProfile {
                    name: account.name.clone(),
                    account_id: account.id,
                },
            },
        );
    }

    /// Stand-in for the approver's decision.
    pub fn set_approval_status(&self, email: &str, status: ApprovalStatus) -> bool {
        let mut state = self.state();
        match state
            .accounts
            .values_mut()
            .find(|account| account.email == email)
        {
            Some(account) => {
                account.approval_status = status;
                true
            }
            None => false,
        }
    }

    pub fn seed_author(&self, author: Author) {
        self.state().authors.insert(author.id, author);
    }

    pub fn seed_announcement(&self, announcement: Announcement) {
        self.state().announcements.push(announcement);
    }

    pub fn seed_assignment(&self, assignment: Assignment) {
        self.state().assignments.insert(assignment.id, assignment);
    }

    pub fn seed_submission(&self, submission: Submission) {
        self.state().submissions.push(submission);
    }

    pub fn seed_schedule_entry(&self, entry: ScheduleEntry) {
        self.state().schedule.push(entry);
    }

    /// Makes every subsequent call of `operation` fail until [`MemoryGateway::recover`].
    pub fn fail_on(&self, operation: GatewayOperation) {
        self.state().failures.insert(operation);
    }

    pub fn recover(&self, operation: GatewayOperation) {
        self.state().failures.remove(&operation);
    }

    /// Most recent calls, oldest first.
    pub fn calls(&self) -> Vec<GatewayOperation> {
        self.state().calls.iter().copied().collect()
    }

    pub fn call_count(&self, operation: GatewayOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn account(&self, email: &str) -> Option<Account> {
        self.state()
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.state().accounts.values().cloned().collect()
    }

    pub fn has_identity(&self, email: &str) -> bool {
        self.state().identities.contains_key(email)
    }

    /// Metadata attached to the identity at sign-up.
    pub fn identity_profile(&self, email: &str) -> Option<IdentityProfile> {
        self.state()
            .identities
            .get(email)
            .map(|identity| identity.profile.clone())
    }

    pub fn assignment(&self, id: AssignmentId) -> Option<Assignment> {
        self.state().assignments.get(&id).cloned()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.state()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn password_resets(&self) -> Vec<String> {
        self.state().password_resets.iter().cloned().collect()
    }
}

#[async_trait]
impl AuthProvider for MemoryGateway {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<Session>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::SignIn)?;

        let user_id = match state.identities.get(email) {
            Some(identity) if identity.password == password => identity.user_id.clone(),
            _ => return Err(GatewayError::Unauthorized),
        };

        let now = Utc::now();
        state.sessions.retain(|_, session| is_live(session, now));
        state.next_token += 1;
        let session = Session {
            access_token: format!("memory-session-{:06}", state.next_token),
            user_id,
            email: email.to_string(),
            expires_at: Some(now + self.session_ttl),
        };
        state
            .sessions
            .insert(session.access_token.clone(), session.clone());
        Ok(Some(session))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &IdentityProfile,
    ) -> Result<Option<Identity>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::SignUp)?;

        if state.identities.contains_key(email) {
            return Err(GatewayError::Conflict);
        }

        let user_id = format!("user-{}", profile.account_id);
        state.identities.insert(
            email.to_string(),
            StoredIdentity {
                user_id: user_id.clone(),
                password: password.to_string(),
                profile: profile.clone(),
            },
        );
        Ok(Some(Identity {
            user_id,
            email: email.to_string(),
        }))
    }

    async fn reset_password(&self, email: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::ResetPassword)?;
        if state.password_resets.len() == CALL_LOG_CAPACITY {
            state.password_resets.pop_front();
        }
        state.password_resets.push_back(email.to_string());
        Ok(())
    }

    async fn session(&self, access_token: &str) -> Result<Option<Session>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::Session)?;
        Ok(state
            .sessions
            .get(access_token)
            .filter(|session| is_live(session, Utc::now()))
            .cloned())
    }
}

#[async_trait]
impl RecordStore for MemoryGateway {
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::AccountByEmail)?;
        Ok(state
            .accounts
            .values()
            .find(|account| same_email(&account.email, email))
            .cloned())
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::InsertAccount)?;

        if state
            .accounts
            .values()
            .any(|existing| existing.email == account.email)
        {
            return Err(GatewayError::Conflict);
        }

        let id = AccountId(state.next_row_id());
        let stored = Account {
            id,
            name: account.name,
            email: account.email,
            approval_status: account.approval_status,
            terms_accepted: account.terms_accepted,
            document_url: Some(account.document_url),
        };
        state.accounts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::DeleteAccount)?;
        state
            .accounts
            .remove(&id)
            .map(|_| ())
            .ok_or(GatewayError::NotFound)
    }

    async fn announcements(&self) -> Result<Vec<Announcement>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::Announcements)?;
        let mut announcements = state.announcements.clone();
        announcements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(announcements)
    }

    async fn authors_by_ids(&self, ids: &[AuthorId]) -> Result<Vec<Author>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::AuthorsByIds)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.authors.get(id).cloned())
            .collect())
    }

    async fn assignments(&self) -> Result<Vec<Assignment>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::Assignments)?;
        Ok(state.assignments.values().cloned().collect())
    }

    async fn assignments_by_ids(
        &self,
        ids: &[AssignmentId],
    ) -> Result<Vec<Assignment>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::AssignmentsByIds)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.assignments.get(id).cloned())
            .collect())
    }

    async fn set_assignment_file(
        &self,
        id: AssignmentId,
        file_url: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::SetAssignmentFile)?;
        let assignment = state
            .assignments
            .get_mut(&id)
            .ok_or(GatewayError::NotFound)?;
        assignment.file_url = Some(file_url.to_string());
        Ok(())
    }

    async fn submissions_for(&self, account: AccountId) -> Result<Vec<Submission>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::SubmissionsFor)?;
        Ok(state
            .submissions
            .iter()
            .filter(|submission| submission.account_id == account)
            .cloned()
            .collect())
    }

    async fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Submission, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::InsertSubmission)?;
        let stored = Submission {
            id: SubmissionId(state.next_row_id()),
            assignment_id: submission.assignment_id,
            account_id: submission.account_id,
            score: submission.score,
            submitted_at: submission.submitted_at,
            file_url: submission.file_url,
        };
        state.submissions.push(stored.clone());
        Ok(stored)
    }

    async fn schedule(&self) -> Result<Vec<ScheduleEntry>, GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::Schedule)?;
        Ok(state.schedule.clone())
    }
}

#[async_trait]
impl ObjectStorage for MemoryGateway {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.enter(GatewayOperation::Upload)?;
        let key = (bucket.to_string(), path.to_string());
        if state.objects.contains_key(&key) {
            return Err(GatewayError::Conflict);
        }
        state.objects.insert(
            key,
            StoredObject {
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{bucket}/{path}", self.public_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_with_student(ttl: Duration) -> MemoryGateway {
        let gateway = MemoryGateway::new().with_session_ttl(ttl);
        let account = gateway.seed_account("Carla", "c@x.com", ApprovalStatus::Approved, true);
        gateway.seed_identity("c@x.com", "secret", &account);
        gateway
    }

    #[tokio::test]
    async fn call_log_keeps_only_the_most_recent_calls() {
        let gateway = MemoryGateway::new();
        for _ in 0..CALL_LOG_CAPACITY {
            gateway.schedule().await.expect("schedule loads");
        }
        gateway.assignments().await.expect("assignments load");

        let calls = gateway.calls();
        assert_eq!(calls.len(), CALL_LOG_CAPACITY);
        assert_eq!(calls.last(), Some(&GatewayOperation::Assignments));
        assert_eq!(
            gateway.call_count(GatewayOperation::Schedule),
            CALL_LOG_CAPACITY - 1
        );
    }

    #[tokio::test]
    async fn account_lookup_ignores_stored_case() {
        let gateway = MemoryGateway::new();
        gateway.seed_account("Ana", "Ana.Souza@X.com", ApprovalStatus::Pending, true);

        let account = gateway
            .account_by_email("ana.souza@x.com")
            .await
            .expect("lookup");

        assert_eq!(account.map(|a| a.name), Some("Ana".to_string()));
    }

    #[tokio::test]
    async fn sessions_carry_an_expiry() {
        let gateway = gateway_with_student(Duration::minutes(5));

        let session = gateway
            .sign_in("c@x.com", "secret")
            .await
            .expect("sign in")
            .expect("session issued");

        assert!(session.expires_at.is_some_and(|at| at > Utc::now()));
        assert_eq!(
            gateway.session(&session.access_token).await.expect("lookup"),
            Some(session)
        );
    }

    #[tokio::test]
    async fn expired_sessions_are_denied_and_pruned() {
        let gateway = gateway_with_student(Duration::seconds(-1));

        let first = gateway
            .sign_in("c@x.com", "secret")
            .await
            .expect("sign in")
            .expect("session issued");
        assert_eq!(
            gateway.session(&first.access_token).await.expect("lookup"),
            None
        );

        gateway
            .sign_in("c@x.com", "secret")
            .await
            .expect("sign in")
            .expect("session issued");
        assert_eq!(gateway.session_count(), 1);
    }
}
