use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use super::domain::{ApprovalStatus, Session};

/// Remote action a form submission kicks off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowAction {
    Register,
    Login,
    CheckStatus,
    ResetPassword,
}

/// Screen-level state shared by the registration, login, and approval-status forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Unauthenticated,
    Submitting { action: FlowAction },
    PendingApproval { status: ApprovalStatus },
    Authenticated { session: Session },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    Submit(FlowAction),
    Registered(ApprovalStatus),
    StatusReported(ApprovalStatus),
    SignedIn(Session),
    RecoverySent,
    Failed(String),
    Input,
    BackToLogin,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("a submission is already in flight")]
    AlreadySubmitting,
    #[error("session already established")]
    Terminal,
    #[error("cannot apply {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}

impl FlowState {
    pub const fn name(&self) -> &'static str {
        match self {
            FlowState::Unauthenticated => "unauthenticated",
            FlowState::Submitting { .. } => "submitting",
            FlowState::PendingApproval { .. } => "pending_approval",
            FlowState::Authenticated { .. } => "authenticated",
            FlowState::Error { .. } => "error",
        }
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self, FlowState::Submitting { .. })
    }

    pub fn apply(self, event: FlowEvent) -> Result<FlowState, FlowError> {
        use FlowEvent as E;
        use FlowState as S;

        match (self, event) {
            (S::Authenticated { .. }, _) => Err(FlowError::Terminal),
            (S::Submitting { .. }, E::Submit(_)) => Err(FlowError::AlreadySubmitting),

            (S::Unauthenticated | S::Error { .. }, E::Submit(action)) => {
                Ok(S::Submitting { action })
            }
            (S::Unauthenticated | S::Error { .. }, E::Input) => Ok(S::Unauthenticated),

            (
                S::Submitting {
                    action: FlowAction::Register,
                },
                E::Registered(status),
            ) => Ok(S::PendingApproval { status }),
            (
                S::Submitting {
                    action: FlowAction::CheckStatus,
                },
                E::StatusReported(status),
            ) => Ok(match status {
                ApprovalStatus::Approved => S::Unauthenticated,
                status => S::PendingApproval { status },
            }),
            (
                S::Submitting {
                    action: FlowAction::Login,
                },
                E::SignedIn(session),
            ) => Ok(S::Authenticated { session }),
            (
                S::Submitting {
                    action: FlowAction::ResetPassword,
                },
                E::RecoverySent,
            ) => Ok(S::Unauthenticated),
            (S::Submitting { .. }, E::Failed(message)) => Ok(S::Error { message }),

            (S::PendingApproval { .. }, E::BackToLogin) => Ok(S::Unauthenticated),

            (state, event) => Err(FlowError::InvalidTransition {
                state: state.name(),
                event: event_name(&event),
            }),
        }
    }
}

fn event_name(event: &FlowEvent) -> &'static str {
    match event {
        FlowEvent::Submit(_) => "submit",
        FlowEvent::Registered(_) => "registered",
        FlowEvent::StatusReported(_) => "status_reported",
        FlowEvent::SignedIn(_) => "signed_in",
        FlowEvent::RecoverySent => "recovery_sent",
        FlowEvent::Failed(_) => "failed",
        FlowEvent::Input => "input",
        FlowEvent::BackToLogin => "back_to_login",
    }
}

/// Rejects a second submission for a key while the first one is still running.
pub struct SingleFlight<K> {
    inflight: Arc<Mutex<HashSet<K>>>,
}

impl<K> Default for SingleFlight<K> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    /// `None` while another permit for `key` is alive.
    pub fn try_begin(&self, key: K) -> Option<FlightPermit<K>> {
        let mut inflight = self.inflight.lock().expect("single-flight mutex poisoned");
        if !inflight.insert(key.clone()) {
            return None;
        }
        Some(FlightPermit {
            key,
            inflight: Arc::clone(&self.inflight),
        })
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight
            .lock()
            .expect("single-flight mutex poisoned")
            .contains(key)
    }
}

/// Releases its key when dropped, whichever way the submission ends.
pub struct FlightPermit<K: Eq + Hash> {
    key: K,
    inflight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash> Drop for FlightPermit<K> {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(&self.key);
        }
    }
}
