//! Typed command operations over the guild state store.
//!
//! This is the boundary the platform glue drives: it parses chat
//! interactions into [`Command`] values and sends the returned confirmation
//! text back itself. Validation happens before any mutation; privileged
//! operations are gated on the caller being the guild owner or holding the
//! configured head-of-household role in the guild's own ledger.

use std::sync::Arc;

use chrono::Local;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

use crate::config::RolesConfig;
use crate::economy::{self, CheckInOutcome};
use crate::error::CommandError;
use crate::persist::Persister;
use crate::recurrence::{ensure_future, next_weekly_occurrence, parse_date_time, parse_time};
use crate::store::Store;
use crate::traits::Messenger;
use crate::types::{Joke, Mode, Note, Reminder, Repeat};

static GUARDIAN_ROLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(mom|dad|parent|guardian|adult)").expect("guardian pattern"));

/// Who invoked a command, and where.
#[derive(Debug, Clone)]
pub struct CommandCtx {
    pub guild_id: String,
    pub channel_id: String,
    pub user_id: String,
    /// Whether the platform reports the caller as the guild owner. Owners
    /// always count as head of household.
    pub is_owner: bool,
}

/// A command invocation with typed arguments, as produced by the platform
/// glue's string dispatch.
#[derive(Debug, Clone)]
pub enum Command {
    SetMode { mode: Mode },
    SetNightMode { enabled: Option<bool> },
    Announce { text: String },
    AddStatus { text: String },
    ListStatuses,
    SetAnnounceChannel { channel_id: String },
    AssignRole { role: String, user_id: String },
    ListRoles,
    AddNote { user_id: String, text: String },
    ListNotes { user_id: Option<String> },
    Remember { text: String },
    Recall,
    SetCurfew { time: String },
    Curfew,
    Remind { text: String, datetime: String },
    RemindMe { minutes: i64, text: String },
    ListReminders,
    DeleteReminder { id: u32 },
    SetBirthday { user_id: String, date: String },
    SetAnniversary { user_id: String, date: String },
    AddEvent { name: String, date: String, time: String },
    AddWeekly { name: String, day: String, time: String },
    InitTraditions,
    ListEvents,
    DeleteEvent { id: u32 },
    SetAddress { user_id: String, title: String },
    WhoAmI,
    Reward { user_id: String },
    Ground { user_id: String },
    Favor { user_id: Option<String> },
    Household,
    CheckIn,
    SummonGuardians,
    SetSlHome { url: String },
    SlHome,
}

pub struct Engine {
    store: Arc<Store>,
    persister: Arc<Persister>,
    messenger: Arc<dyn Messenger>,
    roles: RolesConfig,
}

type Reply = Result<String, CommandError>;

impl Engine {
    pub fn new(
        store: Arc<Store>,
        persister: Arc<Persister>,
        messenger: Arc<dyn Messenger>,
        roles: RolesConfig,
    ) -> Self {
        Self { store, persister, messenger, roles }
    }

    pub async fn dispatch(&self, ctx: &CommandCtx, command: Command) -> Reply {
        match command {
            Command::SetMode { mode } => self.set_mode(ctx, mode),
            Command::SetNightMode { enabled } => self.set_night_mode(ctx, enabled),
            Command::Announce { text } => self.announce(ctx, &text).await,
            Command::AddStatus { text } => self.add_status(&text),
            Command::ListStatuses => self.list_statuses(),
            Command::SetAnnounceChannel { channel_id } => {
                self.set_announce_channel(ctx, &channel_id)
            }
            Command::AssignRole { role, user_id } => self.assign_role(ctx, &role, &user_id),
            Command::ListRoles => self.list_roles(ctx),
            Command::AddNote { user_id, text } => self.add_note(ctx, &user_id, &text),
            Command::ListNotes { user_id } => self.list_notes(ctx, user_id.as_deref()),
            Command::Remember { text } => self.remember(ctx, &text),
            Command::Recall => self.recall(ctx),
            Command::SetCurfew { time } => self.set_curfew(ctx, &time),
            Command::Curfew => self.curfew(ctx),
            Command::Remind { text, datetime } => self.remind(ctx, &text, &datetime),
            Command::RemindMe { minutes, text } => self.remind_me(ctx, minutes, &text),
            Command::ListReminders => self.list_reminders(ctx),
            Command::DeleteReminder { id } => self.delete_reminder(ctx, id),
            Command::SetBirthday { user_id, date } => self.set_birthday(ctx, &user_id, &date),
            Command::SetAnniversary { user_id, date } => {
                self.set_anniversary(ctx, &user_id, &date)
            }
            Command::AddEvent { name, date, time } => self.add_event(ctx, &name, &date, &time),
            Command::AddWeekly { name, day, time } => self.add_weekly(ctx, &name, &day, &time),
            Command::InitTraditions => self.init_traditions(ctx),
            Command::ListEvents => self.list_events(ctx),
            Command::DeleteEvent { id } => self.delete_event(ctx, id),
            Command::SetAddress { user_id, title } => self.set_address(ctx, &user_id, &title),
            Command::WhoAmI => self.whoami(ctx),
            Command::Reward { user_id } => self.reward(ctx, &user_id),
            Command::Ground { user_id } => self.ground(ctx, &user_id),
            Command::Favor { user_id } => self.favor(ctx, user_id.as_deref()),
            Command::Household => self.household(ctx),
            Command::CheckIn => self.check_in(ctx),
            Command::SummonGuardians => self.summon_guardians(ctx),
            Command::SetSlHome { url } => self.set_sl_home(ctx, &url),
            Command::SlHome => self.sl_home(ctx),
        }
    }

    /// Advance the idle cursors for a command interaction, same as for an
    /// observed message.
    pub fn touch_activity(&self, ctx: &CommandCtx) {
        self.store.with_guild(&ctx.guild_id, |guild| {
            guild.last_message_at = Some(Local::now());
            guild.last_active_channel_id = Some(ctx.channel_id.clone());
        });
        self.persister.mark_dirty();
    }

    fn is_head(&self, ctx: &CommandCtx) -> bool {
        if ctx.is_owner {
            return true;
        }
        let head = self.roles.head.to_lowercase();
        self.store.with_guild(&ctx.guild_id, |guild| {
            guild.roles_by_user.get(&ctx.user_id) == Some(&head)
        })
    }

    fn require_head(&self, ctx: &CommandCtx) -> Result<(), CommandError> {
        if self.is_head(ctx) {
            Ok(())
        } else {
            Err(CommandError::forbidden(format!(
                "Only the {} may issue this command.",
                self.roles.head
            )))
        }
    }

    fn push_reminder(
        &self,
        ctx: &CommandCtx,
        user_id: &str,
        text: String,
        time: chrono::DateTime<Local>,
        repeat: Repeat,
    ) -> u32 {
        let id = self.store.with_guild(&ctx.guild_id, |guild| {
            let id = guild.next_reminder_id();
            guild.reminders.push(Reminder {
                id,
                guild_id: ctx.guild_id.clone(),
                channel_id: ctx.channel_id.clone(),
                user_id: user_id.to_string(),
                text,
                time,
                repeat,
            });
            id
        });
        self.persister.mark_dirty();
        id
    }

    // ---- personality & global configuration ----

    pub fn set_mode(&self, ctx: &CommandCtx, mode: Mode) -> Reply {
        self.require_head(ctx)?;
        self.store.with_guild(&ctx.guild_id, |guild| {
            guild.mode = mode;
            guild.night_mode = false;
        });
        self.persister.mark_dirty();
        Ok(format!("Mode set to {mode}."))
    }

    pub fn set_night_mode(&self, ctx: &CommandCtx, enabled: Option<bool>) -> Reply {
        let enabled = enabled.unwrap_or(true);
        self.store.with_guild(&ctx.guild_id, |guild| guild.night_mode = enabled);
        self.persister.mark_dirty();
        Ok(if enabled {
            "Night mode enabled. Voices low.".to_string()
        } else {
            "Night mode disabled.".to_string()
        })
    }

    pub async fn announce(&self, ctx: &CommandCtx, text: &str) -> Reply {
        let channel_id = self
            .store
            .with_guild(&ctx.guild_id, |guild| guild.announce_channel_id.clone())
            .unwrap_or_else(|| ctx.channel_id.clone());
        let channel = self
            .messenger
            .fetch_channel(&channel_id)
            .await
            .map_err(|e| CommandError::delivery(format!("Channel lookup failed: {e}")))?
            .ok_or_else(|| CommandError::lookup("That channel does not exist."))?;
        self.messenger
            .send_message(&channel.id, &format!("Announcement: {text}"))
            .await
            .map_err(|_| CommandError::delivery("The announcement could not be delivered."))?;
        Ok("Announcement sent.".to_string())
    }

    pub fn add_status(&self, text: &str) -> Reply {
        self.store.with_data(|data| data.global.status_rotation.push(text.to_string()));
        self.persister.mark_dirty();
        Ok("Status added.".to_string())
    }

    pub fn list_statuses(&self) -> Reply {
        let statuses = self.store.with_data(|data| data.global.status_rotation.join(" | "));
        Ok(format!("Statuses: {statuses}"))
    }

    pub fn set_announce_channel(&self, ctx: &CommandCtx, channel_id: &str) -> Reply {
        self.store.with_guild(&ctx.guild_id, |guild| {
            guild.announce_channel_id = Some(channel_id.to_string());
        });
        self.persister.mark_dirty();
        Ok(format!("Announcement channel set to <#{channel_id}>."))
    }

    // ---- household roles, notes, memory ----

    pub fn assign_role(&self, ctx: &CommandCtx, role: &str, user_id: &str) -> Reply {
        self.require_head(ctx)?;
        self.store.with_guild(&ctx.guild_id, |guild| guild.assign_role(role, user_id));
        self.persister.mark_dirty();
        Ok(format!("Role {role} set for <@{user_id}>."))
    }

    pub fn list_roles(&self, ctx: &CommandCtx) -> Reply {
        let lines = self.store.with_guild(&ctx.guild_id, |guild| {
            guild
                .roles
                .iter()
                .map(|(role, user)| format!("{role}: <@{user}>"))
                .collect::<Vec<_>>()
        });
        if lines.is_empty() {
            Ok("No roles set yet.".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }

    pub fn add_note(&self, ctx: &CommandCtx, user_id: &str, text: &str) -> Reply {
        self.store.with_guild(&ctx.guild_id, |guild| {
            guild.notes.push(Note {
                user_id: user_id.to_string(),
                text: text.to_string(),
                author_id: ctx.user_id.clone(),
                at: Local::now(),
            });
        });
        self.persister.mark_dirty();
        Ok("Noted. This will be used against you later.".to_string())
    }

    pub fn list_notes(&self, ctx: &CommandCtx, user_id: Option<&str>) -> Reply {
        let lines = self.store.with_guild(&ctx.guild_id, |guild| {
            let matching: Vec<&Note> = guild
                .notes
                .iter()
                .filter(|note| user_id.map_or(true, |u| note.user_id == u))
                .collect();
            matching[matching.len().saturating_sub(5)..]
                .iter()
                .map(|note| format!("- <@{}>: {}", note.user_id, note.text))
                .collect::<Vec<_>>()
        });
        if lines.is_empty() {
            Ok("No notes yet.".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }

    pub fn remember(&self, ctx: &CommandCtx, text: &str) -> Reply {
        self.store.with_guild(&ctx.guild_id, |guild| {
            guild.jokes.push(Joke {
                text: text.to_string(),
                author_id: ctx.user_id.clone(),
                at: Local::now(),
            });
        });
        self.persister.mark_dirty();
        Ok("Noted. This will be used against you later.".to_string())
    }

    pub fn recall(&self, ctx: &CommandCtx) -> Reply {
        let memory = self.store.with_guild(&ctx.guild_id, |guild| {
            guild.jokes.choose(&mut rand::thread_rng()).map(|joke| joke.text.clone())
        });
        Ok(memory.unwrap_or_else(|| "I remember nothing. Yet.".to_string()))
    }

    // ---- curfew ----

    pub fn set_curfew(&self, ctx: &CommandCtx, time: &str) -> Reply {
        self.require_head(ctx)?;
        if parse_time(time).is_none() {
            return Err(CommandError::validation("Provide time as HH:MM (24h)."));
        }
        self.store.with_guild(&ctx.guild_id, |guild| guild.curfew = time.to_string());
        self.persister.mark_dirty();
        Ok(format!("Curfew set to {time}."))
    }

    pub fn curfew(&self, ctx: &CommandCtx) -> Reply {
        let curfew = self.store.with_guild(&ctx.guild_id, |guild| guild.curfew.clone());
        Ok(format!("Curfew is {curfew}."))
    }

    // ---- reminders & events ----

    pub fn remind(&self, ctx: &CommandCtx, text: &str, datetime: &str) -> Reply {
        let time = parse_date_time(datetime).ok_or_else(|| {
            CommandError::validation("Provide datetime as YYYY-MM-DD HH:MM (24h).")
        })?;
        let id =
            self.push_reminder(ctx, &ctx.user_id, format!("Reminder: {text}"), time, Repeat::None);
        Ok(format!("Reminder set (#{id})."))
    }

    pub fn remind_me(&self, ctx: &CommandCtx, minutes: i64, text: &str) -> Reply {
        if minutes <= 0 {
            return Err(CommandError::validation("Provide a positive number of minutes."));
        }
        let time = Local::now() + chrono::Duration::minutes(minutes);
        let id =
            self.push_reminder(ctx, &ctx.user_id, format!("Reminder: {text}"), time, Repeat::None);
        Ok(format!("Reminder set (#{id})."))
    }

    pub fn list_reminders(&self, ctx: &CommandCtx) -> Reply {
        let lines = self.store.with_guild(&ctx.guild_id, |guild| {
            guild
                .reminders
                .iter()
                .take(10)
                .map(|r| format!("#{} at {}: {}", r.id, r.time.format("%Y-%m-%d %H:%M"), r.text))
                .collect::<Vec<_>>()
        });
        if lines.is_empty() {
            Ok("No reminders set.".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }

    pub fn delete_reminder(&self, ctx: &CommandCtx, id: u32) -> Reply {
        let removed = self.store.with_guild(&ctx.guild_id, |guild| guild.remove_reminder(id));
        if removed {
            self.persister.mark_dirty();
            Ok("Reminder deleted.".to_string())
        } else {
            Err(CommandError::lookup("No reminder found."))
        }
    }

    pub fn set_birthday(&self, ctx: &CommandCtx, user_id: &str, date: &str) -> Reply {
        self.seed_annual(ctx, user_id, date, format!("Happy birthday <@{user_id}>!"))
    }

    pub fn set_anniversary(&self, ctx: &CommandCtx, user_id: &str, date: &str) -> Reply {
        self.seed_annual(ctx, user_id, date, format!("Happy anniversary, <@{user_id}>!"))
    }

    /// Shared birthday/anniversary seeding: the date gets a 09:00 fire
    /// time, is pushed into the future if needed, and repeats yearly.
    fn seed_annual(&self, ctx: &CommandCtx, user_id: &str, date: &str, text: String) -> Reply {
        let seeded = parse_date_time(&format!("{date} 09:00"))
            .ok_or_else(|| CommandError::validation("Provide a valid date YYYY-MM-DD."))?;
        let time = ensure_future(seeded, Local::now())
            .ok_or_else(|| CommandError::validation("That date is out of range."))?;
        self.push_reminder(ctx, user_id, text, time, Repeat::Yearly);
        Ok("Date saved.".to_string())
    }

    pub fn add_event(&self, ctx: &CommandCtx, name: &str, date: &str, time: &str) -> Reply {
        let when = parse_date_time(&format!("{date} {time}")).ok_or_else(|| {
            CommandError::validation("Provide date/time as YYYY-MM-DD and HH:MM (24h).")
        })?;
        let id = self.push_reminder(
            ctx,
            &ctx.user_id,
            format!("Event: {name} is starting now."),
            when,
            Repeat::None,
        );
        Ok(format!("Event scheduled (#{id})."))
    }

    pub fn add_weekly(&self, ctx: &CommandCtx, name: &str, day: &str, time: &str) -> Reply {
        let time_of_day =
            parse_time(time).ok_or_else(|| CommandError::validation("Provide time as HH:MM (24h)."))?;
        let next = next_weekly_occurrence(day, time_of_day, Local::now())
            .ok_or_else(|| CommandError::validation("Invalid day name."))?;
        let id = self.push_reminder(
            ctx,
            &ctx.user_id,
            format!("Weekly tradition: {name} starts now."),
            next,
            Repeat::Weekly,
        );
        Ok(format!("Weekly event scheduled (#{id})."))
    }

    pub fn init_traditions(&self, ctx: &CommandCtx) -> Reply {
        self.require_head(ctx)?;
        let defaults =
            [("Family Friday", "Fri", "20:00"), ("Movie Night", "Sat", "19:00"), ("Game Night", "Sun", "21:00")];
        let mut created = Vec::new();
        let now = Local::now();
        for (name, day, time) in defaults {
            let Some(time_of_day) = parse_time(time) else { continue };
            let Some(next) = next_weekly_occurrence(day, time_of_day, now) else { continue };
            self.push_reminder(
                ctx,
                &ctx.user_id,
                format!("Weekly tradition: {name} starts now."),
                next,
                Repeat::Weekly,
            );
            created.push(name);
        }
        if created.is_empty() {
            Ok("No traditions added.".to_string())
        } else {
            Ok(format!("Traditions added: {}", created.join(", ")))
        }
    }

    pub fn list_events(&self, ctx: &CommandCtx) -> Reply {
        let lines = self.store.with_guild(&ctx.guild_id, |guild| {
            guild
                .reminders
                .iter()
                .filter(|r| {
                    r.text.starts_with("Event:") || r.text.starts_with("Weekly tradition:")
                })
                .take(10)
                .map(|r| format!("#{} at {}: {}", r.id, r.time.format("%Y-%m-%d %H:%M"), r.text))
                .collect::<Vec<_>>()
        });
        if lines.is_empty() {
            Ok("No events scheduled.".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }

    pub fn delete_event(&self, ctx: &CommandCtx, id: u32) -> Reply {
        self.require_head(ctx)?;
        let removed = self.store.with_guild(&ctx.guild_id, |guild| guild.remove_reminder(id));
        if removed {
            self.persister.mark_dirty();
            Ok("Event deleted.".to_string())
        } else {
            Err(CommandError::lookup("No event found."))
        }
    }

    // ---- addresses ----

    pub fn set_address(&self, ctx: &CommandCtx, user_id: &str, title: &str) -> Reply {
        self.store.with_guild(&ctx.guild_id, |guild| {
            guild.addresses.insert(user_id.to_string(), title.to_string());
        });
        self.persister.mark_dirty();
        Ok(format!("Address set for <@{user_id}>."))
    }

    pub fn whoami(&self, ctx: &CommandCtx) -> Reply {
        let title = self
            .store
            .with_guild(&ctx.guild_id, |guild| guild.display_title(&ctx.user_id))
            .unwrap_or_else(|| "dear".to_string());
        Ok(format!("You are addressed as: {title}"))
    }

    // ---- favor economy ----

    pub fn reward(&self, ctx: &CommandCtx, user_id: &str) -> Reply {
        self.require_head(ctx)?;
        let favor = self
            .store
            .with_guild(&ctx.guild_id, |guild| economy::adjust_favor(guild, user_id, 5));
        self.persister.mark_dirty();
        Ok(format!("<@{user_id}> has been rewarded 5 favor points. Current favor: {favor}"))
    }

    pub fn ground(&self, ctx: &CommandCtx, user_id: &str) -> Reply {
        self.require_head(ctx)?;
        let favor = self
            .store
            .with_guild(&ctx.guild_id, |guild| economy::adjust_favor(guild, user_id, -5));
        self.persister.mark_dirty();
        Ok(format!("<@{user_id}> has lost 5 favor points. Current favor: {favor}"))
    }

    pub fn favor(&self, ctx: &CommandCtx, user_id: Option<&str>) -> Reply {
        let target = user_id.unwrap_or(&ctx.user_id);
        let favor = self
            .store
            .with_guild(&ctx.guild_id, |guild| guild.favor.get(target).copied())
            .unwrap_or(0);
        Ok(format!("<@{target}> has {favor} favor points."))
    }

    pub fn household(&self, ctx: &CommandCtx) -> Reply {
        let (night_mode, curfew, reminder_count, summary) =
            self.store.with_guild(&ctx.guild_id, |guild| {
                (
                    guild.night_mode,
                    guild.curfew.clone(),
                    guild.reminders.len(),
                    economy::summarize(guild),
                )
            });
        let top = summary
            .top
            .map(|(user, favor)| format!("<@{user}> ({favor} favor)"))
            .unwrap_or_else(|| "None yet".to_string());
        let bottom = summary
            .bottom
            .map(|(user, favor)| format!("<@{user}> ({favor} favor)"))
            .unwrap_or_else(|| "None yet".to_string());
        Ok(format!(
            "Night mode: {}\nCurfew: {}\nActive reminders: {}\nTop behaved: {}\nMost chaotic: {}",
            if night_mode { "On" } else { "Off" },
            curfew,
            reminder_count,
            top,
            bottom
        ))
    }

    pub fn check_in(&self, ctx: &CommandCtx) -> Reply {
        let today = Local::now().date_naive().to_string();
        let outcome = self
            .store
            .with_guild(&ctx.guild_id, |guild| economy::check_in(guild, &ctx.user_id, &today));
        match outcome {
            CheckInOutcome::AlreadyCheckedIn => {
                Ok("You have already checked in today.".to_string())
            }
            CheckInOutcome::Completed { favor } => {
                self.persister.mark_dirty();
                Ok(format!(
                    "Daily check-in complete. You received 1 favor point. Current favor: {favor}"
                ))
            }
        }
    }

    // ---- misc household ----

    pub fn summon_guardians(&self, ctx: &CommandCtx) -> Reply {
        let mentions = self.store.with_guild(&ctx.guild_id, |guild| {
            guild
                .roles
                .iter()
                .filter(|(role, _)| GUARDIAN_ROLE_RE.is_match(role))
                .map(|(_, user)| format!("<@{user}>"))
                .collect::<Vec<_>>()
        });
        Ok(format!("Calm mode engaged. {}", mentions.join(" ")).trim().to_string())
    }

    pub fn set_sl_home(&self, ctx: &CommandCtx, url: &str) -> Reply {
        self.store.with_guild(&ctx.guild_id, |guild| guild.sl_home = Some(url.to_string()));
        self.persister.mark_dirty();
        Ok("Home link saved.".to_string())
    }

    pub fn sl_home(&self, ctx: &CommandCtx) -> Reply {
        let home = self.store.with_guild(&ctx.guild_id, |guild| guild.sl_home.clone());
        Ok(home.unwrap_or_else(|| "No home link set yet.".to_string()))
    }
}
