//! Calendar math for reminder scheduling.
//!
//! All arithmetic works on local wall-clock calendar fields (add a day, a
//! week, a year) rather than fixed-duration offsets, so recurring reminders
//! stay aligned to calendar weekdays and dates across local-clock shifts.

use chrono::{DateTime, Datelike, Days, Local, LocalResult, Months, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Repeat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2})$").expect("time pattern"));
static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})\s+(\d{2}):(\d{2})$").expect("datetime pattern")
});

/// Parse a strict `HH:MM` 24-hour time of day.
pub fn parse_time(input: &str) -> Option<TimeOfDay> {
    let caps = TIME_RE.captures(input)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(TimeOfDay { hour, minute })
}

/// Parse a strict `YYYY-MM-DD HH:MM` local datetime.
pub fn parse_date_time(input: &str) -> Option<DateTime<Local>> {
    let caps = DATE_TIME_RE.captures(input)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    let naive = chrono::NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    resolve_local(naive)
}

/// Resolve a naive local datetime, taking the earliest instant when the
/// local clock makes it ambiguous and `None` when it does not exist.
pub(crate) fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(early, _) => Some(early),
        LocalResult::None => None,
    }
}

/// Next occurrence of a fired reminder. `None` for one-shot rules — the
/// caller removes the reminder instead of rescheduling it.
pub fn advance(time: DateTime<Local>, repeat: Repeat) -> Option<DateTime<Local>> {
    match repeat {
        Repeat::None => None,
        Repeat::Daily => time.checked_add_days(Days::new(1)),
        Repeat::Weekly => time.checked_add_days(Days::new(7)),
        Repeat::Yearly => time.checked_add_months(Months::new(12)),
    }
}

/// Next timestamp at or after `now` that falls on the given weekday at the
/// given time of day. Weekday names match case-insensitively on their first
/// three letters (Sun..Sat). If today is the target weekday but the time has
/// already passed, the occurrence a week out is returned, not today's.
pub fn next_weekly_occurrence(
    day: &str,
    time: TimeOfDay,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    const DAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
    let lowered = day.to_lowercase();
    let prefix = lowered.get(..3)?;
    let target = DAYS.iter().position(|d| *d == prefix)? as i64;

    let candidate = resolve_local(now.date_naive().and_hms_opt(time.hour, time.minute, 0)?)?;
    let current = candidate.weekday().num_days_from_sunday() as i64;
    let diff = (target - current).rem_euclid(7) as u64;
    if diff == 0 && candidate <= now {
        candidate.checked_add_days(Days::new(7))
    } else {
        candidate.checked_add_days(Days::new(diff))
    }
}

/// Push a date one calendar year out when it is not strictly in the future.
/// Used to seed birthdays/anniversaries so the first fire is always upcoming.
pub fn ensure_future(date: DateTime<Local>, now: DateTime<Local>) -> Option<DateTime<Local>> {
    if date > now {
        Some(date)
    } else {
        date.checked_add_months(Months::new(12))
    }
}
