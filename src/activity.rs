//! Inbound message observation: keeps the idle-detection cursors current
//! and runs the cooldown-gated calm-down responder.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{trace, warn};

use crate::persist::Persister;
use crate::store::Store;
use crate::traits::{ChatEvent, Messenger};
use crate::watchers::choose;

static DRAMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(drama|fight|argue)\b").expect("drama pattern"));

const CALM_LINES: [&str; 2] = [
    "Gentle reminder: breathe first, respond second.",
    "Let us lower the volume and raise the care.",
];

pub struct ActivityObserver {
    store: Arc<Store>,
    persister: Arc<Persister>,
    messenger: Arc<dyn Messenger>,
    calm_cooldown: chrono::Duration,
}

impl ActivityObserver {
    pub fn new(
        store: Arc<Store>,
        persister: Arc<Persister>,
        messenger: Arc<dyn Messenger>,
        calm_cooldown: chrono::Duration,
    ) -> Self {
        Self { store, persister, messenger, calm_cooldown }
    }

    /// Record one observed message. Always advances the idle cursors; when
    /// the text looks like brewing drama, sends a calming line at most once
    /// per cooldown window per channel.
    pub async fn observe(&self, event: &ChatEvent) {
        trace!(
            guild = %event.guild_id,
            channel = %event.channel_id,
            user = %event.user_id,
            "activity observed"
        );
        let calm_due = self.store.with_guild(&event.guild_id, |guild| {
            guild.last_message_at = Some(event.timestamp);
            guild.last_active_channel_id = Some(event.channel_id.clone());
            if !DRAMA_RE.is_match(&event.text) {
                return false;
            }
            let key = format!("calm:{}", event.channel_id);
            let due = guild
                .cooldowns
                .get(&key)
                .map_or(true, |last| event.timestamp.signed_duration_since(*last) > self.calm_cooldown);
            if due {
                guild.cooldowns.insert(key, event.timestamp);
            }
            due
        });
        self.persister.mark_dirty();

        if calm_due {
            let line = choose(&CALM_LINES);
            if let Err(e) = self.messenger.send_message(&event.channel_id, line).await {
                warn!(channel = %event.channel_id, "calm reminder delivery failed: {e:#}");
            }
        }
    }
}
