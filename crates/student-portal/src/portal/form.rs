use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::attachment::{Attachment, AttachmentSlot, PreviewRegistry, StagedAttachment};
use super::authentication::LoginRequest;
use super::fields::{Field, FieldSource, FormKind};
use super::flow::{FlowAction, FlowError, FlowEvent, FlowState};
use super::registration::RegistrationRequest;
use super::service::PortalService;
use super::status::EmailRequest;

const REGISTERED_NOTICE: &str =
    "Registration complete! You will be able to sign in once your registration is approved.";
const RECOVERY_NOTICE: &str =
    "A recovery email has been sent. Please check your inbox.";

/// One entry form that switches between registration, login, status lookup, and password
/// recovery, driving the shared flow state machine.
///
/// Submitting takes `&mut self`, so a form instance can never have two submissions in flight;
/// the `Submitting` state check backs that up for callers that hold the form across tasks.
pub struct PortalForm {
    service: Arc<PortalService>,
    kind: FormKind,
    values: HashMap<Field, String>,
    terms_accepted: bool,
    slot: AttachmentSlot,
    state: FlowState,
    notice: Option<&'static str>,
}

impl FieldSource for PortalForm {
    fn value(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }
}

impl PortalForm {
    pub fn new(service: Arc<PortalService>, previews: Arc<dyn PreviewRegistry>) -> Self {
        Self {
            service,
            kind: FormKind::Login,
            values: HashMap::new(),
            terms_accepted: false,
            slot: AttachmentSlot::new(previews),
            state: FlowState::Unauthenticated,
            notice: None,
        }
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Confirmation shown after a registration or a recovery request.
    pub fn notice(&self) -> Option<&'static str> {
        self.notice
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Switches the visible field set. Typed values are kept; fields outside the new set are
    /// simply ignored.
    pub fn switch_to(&mut self, kind: FormKind) {
        self.kind = kind;
        self.clear_error();
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
        self.clear_error();
    }

    pub fn accept_terms(&mut self, accepted: bool) {
        self.terms_accepted = accepted;
        self.clear_error();
    }

    pub fn attach(&mut self, attachment: Attachment) -> &StagedAttachment {
        self.clear_error();
        self.slot.stage(attachment)
    }

    pub fn remove_attachment(&mut self) -> bool {
        self.slot.remove()
    }

    pub fn staged_attachment(&self) -> Option<&StagedAttachment> {
        self.slot.staged()
    }

    pub fn back_to_login(&mut self) -> Result<(), FlowError> {
        self.transition(FlowEvent::BackToLogin)?;
        self.kind = FormKind::Login;
        Ok(())
    }

    /// Runs the workflow behind the current field set and returns the resulting state.
    /// Workflow failures land in [`FlowState::Error`]; only illegal transitions are errors here.
    pub async fn submit(&mut self) -> Result<&FlowState, FlowError> {
        let action = match self.kind {
            FormKind::Registration => FlowAction::Register,
            FormKind::Login => FlowAction::Login,
            FormKind::StatusCheck => FlowAction::CheckStatus,
            FormKind::PasswordReset => FlowAction::ResetPassword,
        };
        self.transition(FlowEvent::Submit(action))?;
        self.notice = None;

        let outcome = match action {
            FlowAction::Register => {
                let request = RegistrationRequest {
                    name: self.text(Field::Name),
                    email: self.text(Field::Email),
                    password: self.text(Field::Password),
                    terms_accepted: self.terms_accepted,
                };
                match self.service.register(&request, self.slot.attachment()).await {
                    Ok(registration) => {
                        self.slot.remove();
                        self.notice = Some(REGISTERED_NOTICE);
                        FlowEvent::Registered(registration.status())
                    }
                    Err(err) => FlowEvent::Failed(err.user_message()),
                }
            }
            FlowAction::Login => {
                let request = LoginRequest {
                    email: self.text(Field::Email),
                    password: self.text(Field::Password),
                };
                match self.service.login(&request).await {
                    Ok(session) => FlowEvent::SignedIn(session),
                    Err(err) => FlowEvent::Failed(err.user_message()),
                }
            }
            FlowAction::CheckStatus => {
                let request = EmailRequest::new(self.text(Field::Email));
                match self.service.check_status(&request).await {
                    Ok(status) => FlowEvent::StatusReported(status),
                    Err(err) => FlowEvent::Failed(err.user_message()),
                }
            }
            FlowAction::ResetPassword => {
                let request = EmailRequest::new(self.text(Field::Email));
                match self.service.reset_password(&request).await {
                    Ok(()) => {
                        self.notice = Some(RECOVERY_NOTICE);
                        FlowEvent::RecoverySent
                    }
                    Err(err) => FlowEvent::Failed(err.user_message()),
                }
            }
        };

        self.transition(outcome)?;
        if matches!(self.state, FlowState::Unauthenticated) && action == FlowAction::CheckStatus {
            self.kind = FormKind::Login;
        }
        Ok(&self.state)
    }

    fn text(&self, field: Field) -> String {
        self.value(field).unwrap_or_default().to_string()
    }

    fn clear_error(&mut self) {
        if matches!(self.state, FlowState::Error { .. }) {
            self.state = FlowState::Unauthenticated;
        }
    }

    fn transition(&mut self, event: FlowEvent) -> Result<(), FlowError> {
        let from = self.state.name();
        self.state = self.state.clone().apply(event)?;
        debug!(from, to = self.state.name(), "form state changed");
        Ok(())
    }
}
