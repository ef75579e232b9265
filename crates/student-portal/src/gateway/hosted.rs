//! Client for the hosted backend's REST dialect: `/auth/v1` for identities, `/rest/v1` for
//! tables, and `/storage/v1` for objects.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{same_email, AuthProvider, GatewayError, ObjectStorage, RecordStore};
use crate::config::RemoteBackend;
use crate::portal::domain::{
    Account, AccountId, Announcement, Assignment, AssignmentId, Author, AuthorId, Identity,
    IdentityProfile, NewAccount, NewSubmission, ScheduleEntry, Session, Submission,
};

const ACCOUNTS: &str = "accounts";
const ANNOUNCEMENTS: &str = "announcements";
const AUTHORS: &str = "authors";
const ASSIGNMENTS: &str = "assignments";
const SUBMISSIONS: &str = "submissions";
const SCHEDULE: &str = "schedule_entries";

pub struct HostedGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<UserPayload>,
}

/// Sign-up answers with either a bare user or a session wrapping one, depending on whether
/// email confirmation is enabled on the project.
#[derive(Debug, Deserialize)]
struct SignUpPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user: Option<UserPayload>,
}

impl HostedGateway {
    pub fn new(remote: &RemoteBackend, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            api_key: remote.api_key.clone(),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, GatewayError> {
        let response = self
            .request(Method::GET, self.table_url(table))
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn insert<B, T>(&self, table: &str, body: &B) -> Result<T, GatewayError>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&[body])
            .send()
            .await
            .map_err(transport)?;
        let mut rows: Vec<T> = read_json(response).await?;
        if rows.is_empty() {
            return Err(GatewayError::Malformed(format!(
                "insert into {table} returned no row"
            )));
        }
        Ok(rows.swap_remove(0))
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(err.to_string())
}

fn status_error(status: StatusCode, message: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::NOT_FOUND => GatewayError::NotFound,
        StatusCode::CONFLICT => GatewayError::Conflict,
        status if status.is_server_error() => GatewayError::Unavailable(message),
        status => GatewayError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(status_error(status, message))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let response = ensure_success(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| GatewayError::Malformed(err.to_string()))
}

fn id_set<I: ToString>(ids: &[I]) -> String {
    let joined = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

/// Case-insensitive match with the pattern wildcards escaped.
fn email_filter(email: &str) -> String {
    let mut escaped = String::with_capacity(email.len());
    for c in email.chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("ilike.{escaped}")
}

fn session_from_token(payload: TokenPayload, fallback_email: &str) -> Option<Session> {
    let user = payload.user?;
    Some(Session {
        access_token: payload.access_token,
        email: user.email.unwrap_or_else(|| fallback_email.to_string()),
        user_id: user.id,
        expires_at: payload
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
    })
}

#[async_trait]
impl AuthProvider for HostedGateway {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<Session>, GatewayError> {
        let response = self
            .request(Method::POST, self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport)?;
        let payload: TokenPayload = read_json(response).await?;
        Ok(session_from_token(payload, email))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &IdentityProfile,
    ) -> Result<Option<Identity>, GatewayError> {
        let response = self
            .request(Method::POST, self.auth_url("signup"))
            .json(&json!({
                "email": email,
                "password": password,
                "data": profile,
            }))
            .send()
            .await
            .map_err(transport)?;
        let payload: SignUpPayload = read_json(response).await?;

        let identity = match (payload.user, payload.id) {
            (Some(user), _) => Some(Identity {
                user_id: user.id,
                email: user.email.unwrap_or_else(|| email.to_string()),
            }),
            (None, Some(id)) => Some(Identity {
                user_id: id,
                email: payload.email.unwrap_or_else(|| email.to_string()),
            }),
            (None, None) => None,
        };
        Ok(identity)
    }

    async fn reset_password(&self, email: &str) -> Result<(), GatewayError> {
        let response = self
            .request(Method::POST, self.auth_url("recover"))
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn session(&self, access_token: &str) -> Result<Option<Session>, GatewayError> {
        let response = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;

        match read_json::<UserPayload>(response).await {
            Ok(user) => Ok(Some(Session {
                access_token: access_token.to_string(),
                email: user.email.unwrap_or_default(),
                user_id: user.id,
                expires_at: None,
            })),
            Err(GatewayError::Unauthorized) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl RecordStore for HostedGateway {
    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, GatewayError> {
        let rows: Vec<Account> = self
            .select(ACCOUNTS, &[("email", email_filter(email))])
            .await?;
        Ok(rows.into_iter().find(|row| same_email(&row.email, email)))
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, GatewayError> {
        self.insert(ACCOUNTS, &account).await
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), GatewayError> {
        let response = self
            .request(Method::DELETE, self.table_url(ACCOUNTS))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn announcements(&self) -> Result<Vec<Announcement>, GatewayError> {
        self.select(ANNOUNCEMENTS, &[("order", "created_at.desc".to_string())])
            .await
    }

    async fn authors_by_ids(&self, ids: &[AuthorId]) -> Result<Vec<Author>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(AUTHORS, &[("id", id_set(ids))]).await
    }

    async fn assignments(&self) -> Result<Vec<Assignment>, GatewayError> {
        self.select(ASSIGNMENTS, &[("order", "due_at.asc".to_string())])
            .await
    }

    async fn assignments_by_ids(
        &self,
        ids: &[AssignmentId],
    ) -> Result<Vec<Assignment>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(ASSIGNMENTS, &[("id", id_set(ids))]).await
    }

    async fn set_assignment_file(
        &self,
        id: AssignmentId,
        file_url: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .request(Method::PATCH, self.table_url(ASSIGNMENTS))
            .query(&[("id", format!("eq.{id}"))])
            .json(&json!({ "file_url": file_url }))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await.map(|_| ())
    }

    async fn submissions_for(&self, account: AccountId) -> Result<Vec<Submission>, GatewayError> {
        self.select(SUBMISSIONS, &[("account_id", format!("eq.{account}"))])
            .await
    }

    async fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<Submission, GatewayError> {
        self.insert(SUBMISSIONS, &submission).await
    }

    async fn schedule(&self) -> Result<Vec<ScheduleEntry>, GatewayError> {
        self.select(SCHEDULE, &[]).await
    }
}

#[async_trait]
impl ObjectStorage for HostedGateway {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), GatewayError> {
        let response = self
            .request(Method::POST, self.object_url(bucket, path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await.map(|_| ())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}
