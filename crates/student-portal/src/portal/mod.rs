//! Applicant approval, authentication, and coursework views.
//!
//! The entry form (`form`) drives the shared flow state machine (`flow`) through the
//! registration, authentication, and status workflows; signed-in requests pass the session
//! guard before reaching the read views. [`PortalService`] composes all of them over one
//! [`crate::gateway::Backend`] and [`portal_router`] exposes them over HTTP.

pub mod attachment;
pub mod authentication;
pub mod domain;
pub mod fields;
pub mod flow;
pub mod form;
pub mod guard;
pub mod registration;
pub mod router;
pub mod service;
pub mod status;
pub mod views;

#[cfg(test)]
mod tests;

pub use attachment::{Attachment, AttachmentKind, AttachmentSlot, MemoryPreviews, PreviewRegistry};
pub use authentication::{AuthenticationWorkflow, LoginError, LoginRequest, ResetError};
pub use domain::{Account, AccountId, ApprovalStatus, Assignment, AssignmentId, Session};
pub use fields::{Field, FormKind, ValidationError};
pub use flow::{FlowAction, FlowError, FlowEvent, FlowState, SingleFlight};
pub use form::PortalForm;
pub use guard::{Access, GuardError, SessionGuard};
pub use registration::{Registration, RegistrationError, RegistrationRequest, RegistrationWorkflow};
pub use router::portal_router;
pub use service::{PortalService, PortalSettings};
pub use status::{EmailRequest, StatusChecker, StatusError};
pub use views::{AnnouncementView, AssignmentBoard, GradeView, PortalViews, SubmitError, ViewError};
