use std::time::Duration;

use super::common::*;
use crate::gateway::GatewayOperation;
use crate::portal::attachment::Attachment;
use crate::portal::domain::ApprovalStatus;
use crate::portal::fields::{Field, Problem};
use crate::portal::registration::RegistrationError;
use crate::portal::service::PortalSettings;

#[tokio::test]
async fn new_applicant_is_registered_as_pending() {
    let harness = harness();

    let registration = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect("registration succeeds");

    assert_eq!(registration.status(), ApprovalStatus::Pending);
    let account = harness.gateway.account("b@x.com").expect("account row stored");
    assert_eq!(account.approval_status, ApprovalStatus::Pending);
    assert!(account.terms_accepted);
    let document_url = account.document_url.expect("document url recorded");
    assert!(document_url.starts_with("memory://storage/applicant-documents/b_x.com/"));
    assert!(document_url.ends_with("-enrollment_proof.pdf"));

    let path = document_url
        .strip_prefix("memory://storage/applicant-documents/")
        .expect("bucket prefix");
    let stored = harness
        .gateway
        .object(&PortalSettings::default().document_bucket, path)
        .expect("document uploaded");
    assert_eq!(stored.content_type, "application/pdf");
    assert_eq!(stored.bytes, document().bytes);
}

#[tokio::test]
async fn identity_links_back_to_the_account_row() {
    let harness = harness();

    let registration = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect("registration succeeds");

    let profile = harness
        .gateway
        .identity_profile("b@x.com")
        .expect("identity created");
    assert_eq!(profile.account_id, registration.account.id);
    assert_eq!(profile.name, "Bea");
}

#[tokio::test]
async fn steps_run_in_dependency_order() {
    let harness = harness();

    harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect("registration succeeds");

    assert_eq!(
        harness.gateway.calls(),
        vec![
            GatewayOperation::AccountByEmail,
            GatewayOperation::Upload,
            GatewayOperation::InsertAccount,
            GatewayOperation::SignUp,
        ]
    );
}

#[tokio::test]
async fn email_is_normalized_before_lookup_and_storage() {
    let harness = harness();

    let registration = harness
        .service
        .register(&registration("  Bea ", "  Bea@X.com ", "pw"), Some(&document()))
        .await
        .expect("registration succeeds");

    assert_eq!(registration.account.email, "bea@x.com");
    assert_eq!(registration.account.name, "Bea");
    assert!(harness.gateway.has_identity("bea@x.com"));
}

#[tokio::test]
async fn taken_email_fails_before_upload_or_identity_creation() {
    let harness = harness();
    harness
        .gateway
        .seed_account("Ana", "a@x.com", ApprovalStatus::Approved, true);
    harness.gateway.clear_calls();

    let err = harness
        .service
        .register(&registration("Ana", "A@x.com", "pw"), Some(&document()))
        .await
        .expect_err("email taken");

    assert_eq!(err, RegistrationError::EmailTaken);
    assert_eq!(harness.gateway.calls(), vec![GatewayOperation::AccountByEmail]);
}

#[tokio::test]
async fn missing_attachment_fails_without_remote_calls() {
    let harness = harness();

    let err = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), None)
        .await
        .expect_err("attachment required");
    assert_eq!(err, RegistrationError::MissingAttachment);

    let empty = Attachment::new("empty.pdf", "application/pdf", Vec::new());
    let err = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&empty))
        .await
        .expect_err("empty attachment rejected");
    assert_eq!(err, RegistrationError::MissingAttachment);

    assert!(harness.gateway.calls().is_empty());
}

#[tokio::test]
async fn invalid_fields_fail_without_remote_calls() {
    let harness = harness();

    let err = harness
        .service
        .register(&registration("", "b@x.com", "pw"), Some(&document()))
        .await
        .expect_err("name required");

    match err {
        RegistrationError::Validation(err) => {
            assert_eq!(err.field, Field::Name);
            assert_eq!(err.problem, Problem::Missing);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(harness.gateway.calls().is_empty());
}

#[tokio::test]
async fn upload_failure_stops_before_account_insert() {
    let harness = harness();
    harness.gateway.fail_on(GatewayOperation::Upload);

    let err = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect_err("upload fails");

    assert!(matches!(err, RegistrationError::UploadFailed(_)));
    assert_eq!(harness.gateway.call_count(GatewayOperation::InsertAccount), 0);
    assert_eq!(harness.gateway.call_count(GatewayOperation::SignUp), 0);
    assert!(harness.gateway.account("b@x.com").is_none());
}

#[tokio::test]
async fn account_insert_failure_creates_no_identity() {
    let harness = harness();
    harness.gateway.fail_on(GatewayOperation::InsertAccount);

    let err = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect_err("insert fails");

    assert!(matches!(err, RegistrationError::AccountInsertFailed(_)));
    assert_eq!(harness.gateway.call_count(GatewayOperation::SignUp), 0);
    assert!(!harness.gateway.has_identity("b@x.com"));
}

#[tokio::test]
async fn identity_failure_removes_the_orphaned_account_row() {
    let harness = harness();
    harness.gateway.fail_on(GatewayOperation::SignUp);

    let err = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect_err("sign-up fails");

    assert!(matches!(err, RegistrationError::IdentityCreationFailed(_)));
    assert_eq!(harness.gateway.call_count(GatewayOperation::DeleteAccount), 1);
    assert!(harness.gateway.account("b@x.com").is_none());

    harness.gateway.recover(GatewayOperation::SignUp);
    harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect("the email can register again");
}

#[tokio::test]
async fn failed_cleanup_still_reports_identity_failure() {
    let harness = harness();
    harness.gateway.fail_on(GatewayOperation::SignUp);
    harness.gateway.fail_on(GatewayOperation::DeleteAccount);

    let err = harness
        .service
        .register(&registration("Bea", "b@x.com", "pw"), Some(&document()))
        .await
        .expect_err("sign-up fails");

    assert!(matches!(err, RegistrationError::IdentityCreationFailed(_)));
    assert!(harness.gateway.account("b@x.com").is_some());
}

#[tokio::test]
async fn concurrent_registration_for_the_same_email_is_refused() {
    let harness = slow_harness(Duration::from_millis(50));
    let request = registration("Bea", "b@x.com", "pw");
    let shouted = registration("Bea", "B@X.COM", "pw");
    let attachment = document();

    let (first, second) = tokio::join!(
        harness.service.register(&request, Some(&attachment)),
        harness.service.register(&shouted, Some(&attachment)),
    );

    assert!(first.is_ok());
    assert_eq!(second.expect_err("second in flight"), RegistrationError::AlreadyInFlight);
    assert_eq!(harness.gateway.accounts().len(), 1);
}

#[test]
fn user_messages_hide_backend_details() {
    let err = RegistrationError::AccountInsertFailed(crate::gateway::GatewayError::Unavailable(
        "connection reset".to_string(),
    ));
    assert!(!err.user_message().contains("connection reset"));
    assert_eq!(
        RegistrationError::MissingAttachment.user_message(),
        "Attach a supporting document before submitting."
    );
}
