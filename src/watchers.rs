//! Ambient watchers: the idle-channel nudge, the nightly curfew notice,
//! and the presence rotation.
//!
//! All three run as heartbeat jobs. State is mutated before anything is
//! sent, so a dead transport can never stall the schedule; per-guild
//! failures are logged and the rest of the tick proceeds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::persist::Persister;
use crate::recurrence::{parse_time, resolve_local};
use crate::store::Store;
use crate::traits::Messenger;
use crate::types::{ChannelId, GuildId};

const NUDGE_LINES: [&str; 3] = [
    "Am I dismissed, or are we ignoring each other?",
    "The halls are quiet. Should I ring a bell?",
    "Silence noted. I am still watching.",
];

pub(crate) fn choose<'a>(lines: &'a [&'a str]) -> &'a str {
    lines.choose(&mut rand::thread_rng()).copied().unwrap_or("...")
}

/// Nudges a guild's last active channel after a long quiet spell, at most
/// once per cooldown window. New activity resets the window through the
/// idle cursors maintained by the activity observer.
pub struct IdleWatcher {
    store: Arc<Store>,
    persister: Arc<Persister>,
    messenger: Arc<dyn Messenger>,
    quiet_after: chrono::Duration,
    nudge_cooldown: chrono::Duration,
}

impl IdleWatcher {
    pub fn new(
        store: Arc<Store>,
        persister: Arc<Persister>,
        messenger: Arc<dyn Messenger>,
        quiet_after: chrono::Duration,
        nudge_cooldown: chrono::Duration,
    ) -> Self {
        Self { store, persister, messenger, quiet_after, nudge_cooldown }
    }

    pub async fn run_once(&self, now: DateTime<Local>) -> anyhow::Result<()> {
        let targets: Vec<(GuildId, ChannelId)> = self.store.with_data(|data| {
            data.guilds
                .iter_mut()
                .filter_map(|(guild_id, guild)| {
                    let channel = guild.last_active_channel_id.clone()?;
                    let last_message = guild.last_message_at?;
                    if now.signed_duration_since(last_message) < self.quiet_after {
                        return None;
                    }
                    if let Some(last_nudge) = guild.last_nudge_at {
                        if now.signed_duration_since(last_nudge) < self.nudge_cooldown {
                            return None;
                        }
                    }
                    guild.last_nudge_at = Some(now);
                    Some((guild_id.clone(), channel))
                })
                .collect()
        });

        for (guild_id, channel) in targets {
            self.persister.mark_dirty();
            let line = choose(&NUDGE_LINES);
            if let Err(e) = self.messenger.send_message(&channel, line).await {
                warn!(guild = %guild_id, channel = %channel, "idle nudge delivery failed: {e:#}");
            }
        }
        Ok(())
    }
}

/// Fires a curfew notice in each guild once per local calendar day, after
/// the guild's configured `HH:MM` curfew has passed. The day marker is set
/// before delivery, so firing is at-most-once regardless of tick frequency
/// or transport health.
pub struct CurfewWatcher {
    store: Arc<Store>,
    persister: Arc<Persister>,
    messenger: Arc<dyn Messenger>,
    kids_role: String,
}

impl CurfewWatcher {
    pub fn new(
        store: Arc<Store>,
        persister: Arc<Persister>,
        messenger: Arc<dyn Messenger>,
        kids_role: String,
    ) -> Self {
        Self { store, persister, messenger, kids_role }
    }

    pub async fn run_once(&self, now: DateTime<Local>) -> anyhow::Result<()> {
        let today = now.date_naive().to_string();
        let fired: Vec<(GuildId, ChannelId)> = self.store.with_data(|data| {
            data.guilds
                .iter_mut()
                .filter_map(|(guild_id, guild)| {
                    let time = parse_time(&guild.curfew)?;
                    let channel = guild.last_active_channel_id.clone()?;
                    let instant = resolve_local(
                        now.date_naive().and_hms_opt(time.hour, time.minute, 0)?,
                    )?;
                    if now < instant {
                        return None;
                    }
                    if guild.last_curfew_at.as_deref() == Some(today.as_str()) {
                        return None;
                    }
                    guild.last_curfew_at = Some(today.clone());
                    Some((guild_id.clone(), channel))
                })
                .collect()
        });

        for (guild_id, channel) in fired {
            self.persister.mark_dirty();
            let mention = match self.messenger.resolve_role(&guild_id, &self.kids_role).await {
                Ok(Some(role)) => {
                    debug!(guild = %guild_id, role = %role.name, "curfew mention resolved");
                    format!("<@&{}>", role.id)
                }
                Ok(None) => "Children".to_string(),
                Err(e) => {
                    warn!(guild = %guild_id, "role lookup failed: {e:#}");
                    "Children".to_string()
                }
            };
            let notice =
                format!("It is past curfew. {mention} should be asleep. I am watching.");
            if let Err(e) = self.messenger.send_message(&channel, &notice).await {
                warn!(guild = %guild_id, channel = %channel, "curfew delivery failed: {e:#}");
            }
        }
        Ok(())
    }
}

/// Cycles the configured presence lines through the transport.
pub struct StatusRotator {
    store: Arc<Store>,
    messenger: Arc<dyn Messenger>,
    index: AtomicUsize,
}

impl StatusRotator {
    pub fn new(store: Arc<Store>, messenger: Arc<dyn Messenger>) -> Self {
        Self { store, messenger, index: AtomicUsize::new(0) }
    }

    pub async fn run_once(&self) -> anyhow::Result<()> {
        let rotation = self.store.with_data(|data| data.global.status_rotation.clone());
        if rotation.is_empty() {
            return Ok(());
        }
        let i = self.index.fetch_add(1, Ordering::SeqCst) % rotation.len();
        if let Err(e) = self.messenger.set_status(&rotation[i]).await {
            warn!("status update failed: {e:#}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::harness;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[tokio::test]
    async fn idle_nudge_fires_once_then_respects_cooldown() {
        let h = harness();
        let now = local(2026, 8, 7, 15, 0);
        h.store.with_guild("g1", |g| {
            g.last_active_channel_id = Some("c1".into());
            g.last_message_at = Some(now - chrono::Duration::minutes(31));
            g.last_nudge_at = Some(now - chrono::Duration::minutes(40));
        });

        h.idle.run_once(now).await.unwrap();
        assert_eq!(h.messenger.sent_to("c1").await.len(), 1);
        h.store.with_guild("g1", |g| assert_eq!(g.last_nudge_at, Some(now)));

        h.idle.run_once(now + chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(h.messenger.sent_to("c1").await.len(), 1);
    }

    #[tokio::test]
    async fn recent_activity_suppresses_the_nudge() {
        let h = harness();
        let now = local(2026, 8, 7, 15, 0);
        h.store.with_guild("g1", |g| {
            g.last_active_channel_id = Some("c1".into());
            g.last_message_at = Some(now - chrono::Duration::minutes(5));
        });

        h.idle.run_once(now).await.unwrap();
        assert!(h.messenger.sent_to("c1").await.is_empty());
    }

    #[tokio::test]
    async fn guilds_without_a_known_channel_are_skipped() {
        let h = harness();
        let now = local(2026, 8, 7, 15, 0);
        h.store.with_guild("g1", |g| {
            g.last_message_at = Some(now - chrono::Duration::hours(2));
        });

        h.idle.run_once(now).await.unwrap();
        assert_eq!(h.messenger.sent_count().await, 0);
    }

    #[tokio::test]
    async fn curfew_fires_at_most_once_per_day() {
        let h = harness();
        h.store.with_guild("g1", |g| {
            g.curfew = "21:00".into();
            g.last_active_channel_id = Some("c1".into());
        });

        h.curfew.run_once(local(2026, 8, 7, 21, 30)).await.unwrap();
        h.curfew.run_once(local(2026, 8, 7, 21, 35)).await.unwrap();

        assert_eq!(h.messenger.sent_to("c1").await.len(), 1);
        h.store.with_guild("g1", |g| {
            assert_eq!(g.last_curfew_at.as_deref(), Some("2026-08-07"));
        });

        // The next day it fires again.
        h.curfew.run_once(local(2026, 8, 8, 22, 0)).await.unwrap();
        assert_eq!(h.messenger.sent_to("c1").await.len(), 2);
    }

    #[tokio::test]
    async fn curfew_waits_until_the_configured_time() {
        let h = harness();
        h.store.with_guild("g1", |g| {
            g.curfew = "23:00".into();
            g.last_active_channel_id = Some("c1".into());
        });

        h.curfew.run_once(local(2026, 8, 7, 22, 59)).await.unwrap();
        assert!(h.messenger.sent_to("c1").await.is_empty());
    }

    #[tokio::test]
    async fn invalid_curfew_strings_are_skipped() {
        let h = harness();
        h.store.with_guild("g1", |g| {
            g.curfew = "bedtime".into();
            g.last_active_channel_id = Some("c1".into());
        });

        h.curfew.run_once(local(2026, 8, 7, 23, 59)).await.unwrap();
        assert_eq!(h.messenger.sent_count().await, 0);
        h.store.with_guild("g1", |g| assert!(g.last_curfew_at.is_none()));
    }

    #[tokio::test]
    async fn curfew_mentions_the_kids_role_when_resolvable() {
        let h = harness();
        h.messenger.add_role("g1", "Kids", "900").await;
        h.store.with_guild("g1", |g| {
            g.curfew = "21:00".into();
            g.last_active_channel_id = Some("c1".into());
        });

        h.curfew.run_once(local(2026, 8, 7, 21, 30)).await.unwrap();

        let sent = h.messenger.sent_to("c1").await;
        assert!(sent[0].contains("<@&900>"), "got: {}", sent[0]);
    }

    #[tokio::test]
    async fn curfew_delivery_failure_is_isolated_per_guild() {
        let h = harness();
        h.messenger.fail_channel("dead").await;
        h.store.with_guild("g1", |g| {
            g.curfew = "21:00".into();
            g.last_active_channel_id = Some("dead".into());
        });
        h.store.with_guild("g2", |g| {
            g.curfew = "21:00".into();
            g.last_active_channel_id = Some("alive".into());
        });

        h.curfew.run_once(local(2026, 8, 7, 21, 30)).await.unwrap();

        assert_eq!(h.messenger.sent_to("alive").await.len(), 1);
        // Both guilds are marked fired; no retry for the dead one today.
        h.store.with_guild("g1", |g| assert!(g.last_curfew_at.is_some()));
    }

    #[tokio::test]
    async fn status_rotation_cycles_in_order() {
        let h = harness();
        h.store.with_data(|d| {
            d.global.status_rotation = vec!["a".into(), "b".into()];
        });
        let rotator = StatusRotator::new(Arc::clone(&h.store), h.messenger.clone());
        rotator.run_once().await.unwrap();
        rotator.run_once().await.unwrap();
        rotator.run_once().await.unwrap();
        assert_eq!(*h.messenger.statuses.lock().await, vec!["a", "b", "a"]);
    }
}
