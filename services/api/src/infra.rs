use chrono::{Duration, NaiveDate, TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use student_portal::gateway::MemoryGateway;
use student_portal::portal::domain::{
    Announcement, AnnouncementId, ApprovalStatus, Assignment, AssignmentId, AssignmentStatus,
    Author, AuthorId, ScheduleEntry, ScheduleEntryId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const SAMPLE_STUDENT_EMAIL: &str = "carla@portal.test";
pub(crate) const SAMPLE_STUDENT_PASSWORD: &str = "portal-demo";

/// In-memory backend with one approved student and a week of coursework around `today`.
pub(crate) fn sample_gateway(today: NaiveDate) -> Arc<MemoryGateway> {
    let gateway = Arc::new(MemoryGateway::new());

    let student = gateway.seed_account(
        "Carla Mendes",
        SAMPLE_STUDENT_EMAIL,
        ApprovalStatus::Approved,
        true,
    );
    gateway.seed_identity(SAMPLE_STUDENT_EMAIL, SAMPLE_STUDENT_PASSWORD, &student);
    gateway.seed_account("Davi Rocha", "davi@portal.test", ApprovalStatus::Waitlisted, true);

    let coursework = [
        (1, "Reading log", -7, 7),
        (2, "Algebra worksheet", -3, 2),
        (3, "Final essay", 5, 20),
    ];
    for (id, title, opens, closes) in coursework {
        gateway.seed_assignment(Assignment {
            id: AssignmentId(id),
            title: title.to_string(),
            description: format!("{title} for this term"),
            available_from: today + Duration::days(opens),
            due_at: today + Duration::days(closes),
            status: AssignmentStatus::Open,
            file_url: None,
        });
    }

    gateway.seed_author(Author {
        id: AuthorId(1),
        name: "Secretaria".to_string(),
        avatar_url: None,
    });
    let noon = today
        .and_hms_opt(12, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or_else(Utc::now);
    let notices = [
        (1, Some(AuthorId(1)), "Enrollment documents are due by Friday", 2),
        (2, Some(AuthorId(1)), "Library hours extended during exams", 1),
        (3, None, "Welcome to the new term", 10),
    ];
    for (id, author_id, body, days_ago) in notices {
        gateway.seed_announcement(Announcement {
            id: AnnouncementId(id),
            author_id,
            body: body.to_string(),
            images: Vec::new(),
            file: None,
            created_at: noon - Duration::days(days_ago),
        });
    }

    let classes = [
        (1, "Quarta", "19:00", "Portuguese"),
        (2, "Segunda", "20:40", "History"),
        (3, "Segunda-feira", "19:00", "Mathematics"),
        (4, "Sexta", "19:00", "Biology"),
    ];
    for (id, day, time, subject) in classes {
        gateway.seed_schedule_entry(ScheduleEntry {
            id: ScheduleEntryId(id),
            day: day.to_string(),
            time: time.to_string(),
            subject: subject.to_string(),
            teacher: "Staff".to_string(),
            room: (100 + id).to_string(),
            campus: "Centro".to_string(),
        });
    }

    gateway
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_rejects_other_formats() {
        assert_eq!(
            parse_date(" 2024-03-10 "),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date"))
        );
        assert!(parse_date("10/03/2024").is_err());
    }

    #[test]
    fn sample_gateway_seeds_a_signed_in_ready_student() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date");
        let gateway = sample_gateway(today);

        let student = gateway.account(SAMPLE_STUDENT_EMAIL).expect("student seeded");
        assert_eq!(student.approval_status, ApprovalStatus::Approved);
        assert!(gateway.has_identity(SAMPLE_STUDENT_EMAIL));
        let open: Vec<i64> = (1..=3)
            .filter_map(|id| gateway.assignment(AssignmentId(id)))
            .filter(|assignment| assignment.is_open_on(today))
            .map(|assignment| assignment.id.0)
            .collect();
        assert_eq!(open, vec![1, 2]);
    }
}
