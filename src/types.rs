use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub type GuildId = String;
pub type ChannelId = String;
pub type UserId = String;

/// Process-wide root of all persisted state. Serializes to a single
/// human-readable JSON document: `{ "guilds": {...}, "global": {...} }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub guilds: BTreeMap<GuildId, GuildState>,
    pub global: GlobalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Presence lines cycled by the status rotation job. Append-only.
    pub status_rotation: Vec<String>,
    pub status_interval_minutes: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            status_rotation: vec![
                "Polishing silverware".to_string(),
                "Judging quietly".to_string(),
                "Preparing snacks".to_string(),
                "Watching the hallway".to_string(),
            ],
            status_interval_minutes: 10,
        }
    }
}

/// Current personality of the steward in one guild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Polite,
    #[default]
    Sassy,
    Chaotic,
    Tired,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Polite => "polite",
            Mode::Sassy => "sassy",
            Mode::Chaotic => "chaotic",
            Mode::Tired => "tired",
        };
        f.write_str(name)
    }
}

/// Recurrence rule for a reminder. `None` means one-shot: the reminder is
/// removed after delivery instead of being rescheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    #[default]
    None,
    Daily,
    Weekly,
    Yearly,
}

impl Repeat {
    pub fn is_none(&self) -> bool {
        matches!(self, Repeat::None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Unique within the owning guild, assigned max+1.
    pub id: u32,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub text: String,
    pub time: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Repeat::is_none")]
    pub repeat: Repeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub user_id: UserId,
    pub text: String,
    pub author_id: UserId,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Joke {
    pub text: String,
    pub author_id: UserId,
    pub at: DateTime<Local>,
}

/// Everything the steward tracks for one community. Created on first
/// reference, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GuildState {
    pub mode: Mode,
    pub night_mode: bool,
    pub announce_channel_id: Option<ChannelId>,
    pub last_active_channel_id: Option<ChannelId>,
    pub last_message_at: Option<DateTime<Local>>,
    pub last_nudge_at: Option<DateTime<Local>>,
    /// Local calendar day (`YYYY-MM-DD`) of the last curfew notice.
    pub last_curfew_at: Option<String>,
    /// Generic rate-limit ledger keyed by feature + channel.
    pub cooldowns: BTreeMap<String, DateTime<Local>>,
    /// Household role name (lowercased) -> holder. Kept consistent with
    /// `roles_by_user` in both directions; see [`GuildState::assign_role`].
    pub roles: BTreeMap<String, UserId>,
    pub roles_by_user: BTreeMap<UserId, String>,
    /// Explicit overrides for how a user is addressed.
    pub addresses: BTreeMap<UserId, String>,
    pub notes: Vec<Note>,
    pub jokes: Vec<Joke>,
    pub reminders: Vec<Reminder>,
    pub sl_home: Option<String>,
    /// Nightly curfew as `HH:MM` local time.
    pub curfew: String,
    pub favor: BTreeMap<UserId, i64>,
    /// User -> local calendar day (`YYYY-MM-DD`) of their last check-in.
    pub check_ins: BTreeMap<UserId, String>,
}

impl Default for GuildState {
    fn default() -> Self {
        Self {
            mode: Mode::Sassy,
            night_mode: false,
            announce_channel_id: None,
            last_active_channel_id: None,
            last_message_at: None,
            last_nudge_at: None,
            last_curfew_at: None,
            cooldowns: BTreeMap::new(),
            roles: BTreeMap::new(),
            roles_by_user: BTreeMap::new(),
            addresses: BTreeMap::new(),
            notes: Vec::new(),
            jokes: Vec::new(),
            reminders: Vec::new(),
            sl_home: None,
            curfew: "23:00".to_string(),
            favor: BTreeMap::new(),
            check_ins: BTreeMap::new(),
        }
    }
}

static HEAD_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(mom|dad|parent|guardian)").expect("head title pattern"));
static YOUNG_MASTER_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(child|kid|son|teen)").expect("young master pattern"));
static YOUNG_MISS_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(daughter|miss)").expect("young miss pattern"));

impl GuildState {
    /// Next free reminder id: max existing + 1. Ids are never reused while
    /// a higher one exists.
    pub fn next_reminder_id(&self) -> u32 {
        self.reminders.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    /// Remove a reminder by id. Returns whether anything was removed.
    pub fn remove_reminder(&mut self, id: u32) -> bool {
        let before = self.reminders.len();
        self.reminders.retain(|r| r.id != id);
        self.reminders.len() != before
    }

    /// Assign a household role to a user, keeping `roles` and
    /// `roles_by_user` consistent: the previous holder of the role and the
    /// user's previous role are both unlinked.
    pub fn assign_role(&mut self, role_name: &str, user_id: &str) {
        let key = role_name.to_lowercase();
        if let Some(prev_holder) = self.roles.insert(key.clone(), user_id.to_string()) {
            if prev_holder != user_id && self.roles_by_user.get(&prev_holder) == Some(&key) {
                self.roles_by_user.remove(&prev_holder);
            }
        }
        if let Some(prev_role) = self.roles_by_user.insert(user_id.to_string(), key.clone()) {
            if prev_role != key && self.roles.get(&prev_role).map(String::as_str) == Some(user_id)
            {
                self.roles.remove(&prev_role);
            }
        }
    }

    /// How the steward addresses a user: explicit address override first,
    /// then an honorific derived from their household role. `None` when
    /// neither applies (callers fall back to a platform display name).
    pub fn display_title(&self, user_id: &str) -> Option<String> {
        if let Some(address) = self.addresses.get(user_id) {
            return Some(address.clone());
        }
        let role = self.roles_by_user.get(user_id)?;
        if HEAD_TITLE.is_match(role) {
            Some("Head of Household".to_string())
        } else if YOUNG_MASTER_TITLE.is_match(role) {
            Some("Young Master".to_string())
        } else if YOUNG_MISS_TITLE.is_match(role) {
            Some("Young Miss".to_string())
        } else {
            None
        }
    }
}
