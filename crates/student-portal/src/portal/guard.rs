use tracing::{debug, error};

use super::domain::Session;
use crate::gateway::{Backend, GatewayError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow(Session),
    Deny,
}

impl Access {
    pub fn session(self) -> Option<Session> {
        match self {
            Access::Allow(session) => Some(session),
            Access::Deny => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("sign in to continue")]
    Unauthenticated,
    #[error("session lookup failed: {0}")]
    Unexpected(GatewayError),
}

/// Sole gate in front of the protected views: a live session is the only requirement.
pub struct SessionGuard {
    backend: Backend,
}

impl SessionGuard {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn authorize(&self, access_token: Option<&str>) -> Result<Access, GuardError> {
        let Some(token) = access_token.map(str::trim).filter(|token| !token.is_empty()) else {
            return Ok(Access::Deny);
        };

        match self.backend.auth.session(token).await {
            Ok(Some(session)) => Ok(Access::Allow(session)),
            Ok(None) | Err(GatewayError::Unauthorized) => {
                debug!("no live session for presented token");
                Ok(Access::Deny)
            }
            Err(err) => {
                error!(error = %err, "session lookup failed");
                Err(GuardError::Unexpected(err))
            }
        }
    }

    /// Like [`SessionGuard::authorize`] but turns a denial into [`GuardError::Unauthenticated`].
    pub async fn require(&self, access_token: Option<&str>) -> Result<Session, GuardError> {
        self.authorize(access_token)
            .await?
            .session()
            .ok_or(GuardError::Unauthenticated)
    }
}
