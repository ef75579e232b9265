use crate::infra::sample_gateway;
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use student_portal::error::AppError;
use student_portal::gateway::Backend;
use student_portal::portal::{
    ApprovalStatus, Attachment, AssignmentBoard, AttachmentSlot, EmailRequest, LoginRequest,
    MemoryPreviews, PortalService, PortalSettings, RegistrationRequest,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Override the calendar date used for assignment windows (defaults to today).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Identity document to upload during registration (defaults to a generated placeholder).
    #[arg(long)]
    pub(crate) document: Option<PathBuf>,
    /// Applicant name used for the registration.
    #[arg(long, default_value = "Bea Santos")]
    pub(crate) name: String,
    /// Applicant email used for the registration.
    #[arg(long, default_value = "bea@portal.test")]
    pub(crate) email: String,
}

const DEMO_PASSWORD: &str = "first-day";

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        document,
        name,
        email,
    } = args;

    let today = today.unwrap_or_else(PortalService::today);
    let gateway = sample_gateway(today);
    let service = PortalService::new(
        Backend::from_gateway(gateway.clone()),
        PortalSettings::default(),
    );

    println!("Student portal demo (in-memory backend, {today})");

    let document = load_document(document)?;
    println!(
        "\nRegistration: {} <{}> with {} ({}, {} bytes)",
        name,
        email,
        document.name,
        document.content_type,
        document.bytes.len()
    );
    let request = RegistrationRequest {
        name,
        email: email.clone(),
        password: DEMO_PASSWORD.to_string(),
        terms_accepted: true,
    };
    let registration = match service.register(&request, Some(&document)).await {
        Ok(registration) => registration,
        Err(err) => {
            println!("  Registration rejected: {}", err.user_message());
            return Ok(());
        }
    };
    println!(
        "- Account {} created -> status {}",
        registration.account.id,
        registration.status().label()
    );
    if let Some(url) = &registration.account.document_url {
        println!("  Document stored at {url}");
    }

    let credentials = LoginRequest {
        email: email.clone(),
        password: DEMO_PASSWORD.to_string(),
    };
    match service.login(&credentials).await {
        Ok(_) => println!("- Sign-in before approval unexpectedly succeeded"),
        Err(err) => println!("- Sign-in before approval: {}", err.user_message()),
    }

    gateway.set_approval_status(&email, ApprovalStatus::Approved);
    match service.check_status(&EmailRequest::new(email.clone())).await {
        Ok(status) => println!("- Approver decision recorded: {}", status.headline()),
        Err(err) => println!("  Status unavailable: {}", err.user_message()),
    }

    let session = match service.login(&credentials).await {
        Ok(session) => session,
        Err(err) => {
            println!("  Sign-in failed: {}", err.user_message());
            return Ok(());
        }
    };
    let profile = match service.profile(&session).await {
        Ok(profile) => profile,
        Err(err) => {
            println!("  Profile unavailable: {}", err.user_message());
            return Ok(());
        }
    };
    println!("- Signed in as {} ({})", profile.name, profile.email);

    let views = service.views();
    let mut board = match AssignmentBoard::load(views, &session, today).await {
        Ok(board) => board,
        Err(err) => {
            println!("  Assignments unavailable: {}", err.user_message());
            return Ok(());
        }
    };
    println!("\nOpen assignments");
    for assignment in board.visible() {
        println!(
            "- #{} {} (due {})",
            assignment.id, assignment.title, assignment.due_at
        );
    }

    let first = board.visible().first().map(|assignment| assignment.id);
    if let Some(assignment_id) = first {
        let mut slot = AttachmentSlot::new(Arc::new(MemoryPreviews::default()));
        slot.stage(Attachment::new(
            "answers.pdf",
            "application/pdf",
            b"%PDF-1.4 demo answers".to_vec(),
        ));
        match board.submit(views, &session, assignment_id, &mut slot).await {
            Ok(submission) => println!(
                "- Submitted #{} -> grade record {} awaiting a score",
                assignment_id, submission.id
            ),
            Err(err) => println!("  Submission failed: {}", err.user_message()),
        }
        println!("  {} assignment(s) still open", board.visible().len());
    }

    match views.grades(&session, "").await {
        Ok(grades) if grades.is_empty() => println!("\nGrades: none yet"),
        Ok(grades) => {
            println!("\nGrades");
            for grade in grades {
                let score = grade
                    .score
                    .map(|score| format!("{score:.1}"))
                    .unwrap_or_else(|| "pending".to_string());
                println!(
                    "- {}: {}",
                    grade.assignment_title.as_deref().unwrap_or("(removed assignment)"),
                    score
                );
            }
        }
        Err(err) => println!("  Grades unavailable: {}", err.user_message()),
    }

    match views.announcements("").await {
        Ok(items) => {
            println!("\nAnnouncements");
            for item in items {
                let author = item
                    .author
                    .as_ref()
                    .map(|author| author.name.as_str())
                    .unwrap_or("Staff");
                println!(
                    "- [{}] {}: {}",
                    item.announcement.created_at.format("%Y-%m-%d"),
                    author,
                    item.announcement.body
                );
            }
        }
        Err(err) => println!("  Announcements unavailable: {}", err.user_message()),
    }

    match views.schedule("").await {
        Ok(entries) => {
            println!("\nWeekly schedule");
            for entry in entries {
                println!(
                    "- {} {} {} (room {}, {})",
                    entry.day, entry.time, entry.subject, entry.room, entry.campus
                );
            }
        }
        Err(err) => println!("  Schedule unavailable: {}", err.user_message()),
    }

    Ok(())
}

fn load_document(path: Option<PathBuf>) -> Result<Attachment, AppError> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            let content_type = mime_guess::from_path(&path).first_or_octet_stream();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            Ok(Attachment::new(name, content_type.essence_str(), bytes))
        }
        None => Ok(Attachment::new(
            "identity-document.pdf",
            "application/pdf",
            b"%PDF-1.4 placeholder identity document".to_vec(),
        )),
    }
}
