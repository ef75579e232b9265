use std::cmp::Ordering;

use chrono::Weekday;

use super::{apply_filter, unexpected, PortalViews, Searchable, ViewError};
use crate::portal::domain::ScheduleEntry;

impl Searchable for ScheduleEntry {
    fn search_text(&self) -> &str {
        &self.subject
    }
}

/// Reads English names and abbreviations as well as the Portuguese names class timetables
/// are usually written with ("Segunda", "Terça-feira", ...).
pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    let day = raw.trim();
    if let Ok(weekday) = day.parse::<Weekday>() {
        return Some(weekday);
    }
    let day = day.to_lowercase();
    let day = day.strip_suffix("-feira").unwrap_or(&day);
    match day {
        "segunda" => Some(Weekday::Mon),
        "terça" | "terca" => Some(Weekday::Tue),
        "quarta" => Some(Weekday::Wed),
        "quinta" => Some(Weekday::Thu),
        "sexta" => Some(Weekday::Fri),
        "sábado" | "sabado" => Some(Weekday::Sat),
        "domingo" => Some(Weekday::Sun),
        _ => None,
    }
}

fn by_day_then_time(a: &ScheduleEntry, b: &ScheduleEntry) -> Ordering {
    let day = |entry: &ScheduleEntry| parse_weekday(&entry.day).map(|d| d.num_days_from_monday());
    match (day(a), day(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.day.cmp(&b.day),
    }
    .then_with(|| a.time.cmp(&b.time))
}

impl PortalViews {
    /// Class timetable ordered Monday first, then by start time. Unrecognised days go last.
    pub async fn schedule(&self, query: &str) -> Result<Vec<ScheduleEntry>, ViewError> {
        let mut entries = self
            .backend
            .records
            .schedule()
            .await
            .map_err(unexpected("schedule"))?;
        entries.sort_by(by_day_then_time);
        Ok(apply_filter(entries, query))
    }
}
