//! Favor ledger: signed per-user standing counters, the daily check-in
//! gate, and the household summary.

use crate::types::{GuildState, UserId};

/// Unconditional signed adjustment; favor has no floor or ceiling.
/// Returns the new total.
pub fn adjust_favor(guild: &mut GuildState, user_id: &str, delta: i64) -> i64 {
    let entry = guild.favor.entry(user_id.to_string()).or_insert(0);
    *entry += delta;
    *entry
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInOutcome {
    AlreadyCheckedIn,
    /// First check-in of the day; carries the new favor total.
    Completed { favor: i64 },
}

/// Record a daily check-in. The bonus is granted at most once per user per
/// local calendar day (`today` is a `YYYY-MM-DD` string); a repeat attempt
/// mutates nothing.
pub fn check_in(guild: &mut GuildState, user_id: &str, today: &str) -> CheckInOutcome {
    if guild.check_ins.get(user_id).map(String::as_str) == Some(today) {
        return CheckInOutcome::AlreadyCheckedIn;
    }
    guild.check_ins.insert(user_id.to_string(), today.to_string());
    let favor = adjust_favor(guild, user_id, 1);
    CheckInOutcome::Completed { favor }
}

#[derive(Debug, Clone, Default)]
pub struct FavorSummary {
    /// Highest favor holder, if anyone holds favor at all.
    pub top: Option<(UserId, i64)>,
    /// Lowest favor holder, reported only when their total is negative.
    pub bottom: Option<(UserId, i64)>,
}

/// Top and bottom of the favor ledger. Ties break in stable map-key order.
pub fn summarize(guild: &GuildState) -> FavorSummary {
    let mut entries: Vec<(UserId, i64)> =
        guild.favor.iter().map(|(user, favor)| (user.clone(), *favor)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    let top = entries.first().cloned();
    let bottom = entries.last().filter(|(_, favor)| *favor < 0).cloned();
    FavorSummary { top, bottom }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favor_is_unbounded_in_both_directions() {
        let mut guild = GuildState::default();
        assert_eq!(adjust_favor(&mut guild, "u1", 5), 5);
        assert_eq!(adjust_favor(&mut guild, "u1", -20), -15);
        assert_eq!(adjust_favor(&mut guild, "u1", 0), -15);
    }

    #[test]
    fn second_check_in_same_day_grants_nothing() {
        let mut guild = GuildState::default();
        assert_eq!(
            check_in(&mut guild, "u1", "2026-08-07"),
            CheckInOutcome::Completed { favor: 1 }
        );
        assert_eq!(check_in(&mut guild, "u1", "2026-08-07"), CheckInOutcome::AlreadyCheckedIn);
        assert_eq!(guild.favor.get("u1"), Some(&1));
    }

    #[test]
    fn check_in_resets_on_a_new_day() {
        let mut guild = GuildState::default();
        check_in(&mut guild, "u1", "2026-08-07");
        assert_eq!(
            check_in(&mut guild, "u1", "2026-08-08"),
            CheckInOutcome::Completed { favor: 2 }
        );
    }

    #[test]
    fn summary_of_empty_ledger_is_empty() {
        let summary = summarize(&GuildState::default());
        assert!(summary.top.is_none());
        assert!(summary.bottom.is_none());
    }

    #[test]
    fn summary_reports_bottom_only_when_negative() {
        let mut guild = GuildState::default();
        guild.favor.insert("ann".into(), 10);
        guild.favor.insert("ben".into(), 2);
        let summary = summarize(&guild);
        assert_eq!(summary.top, Some(("ann".into(), 10)));
        assert!(summary.bottom.is_none());

        guild.favor.insert("cal".into(), -4);
        let summary = summarize(&guild);
        assert_eq!(summary.top, Some(("ann".into(), 10)));
        assert_eq!(summary.bottom, Some(("cal".into(), -4)));
    }

    #[test]
    fn summary_ties_break_in_stable_key_order() {
        let mut guild = GuildState::default();
        guild.favor.insert("zed".into(), 3);
        guild.favor.insert("amy".into(), 3);
        let summary = summarize(&guild);
        assert_eq!(summary.top, Some(("amy".into(), 3)));
    }
}
