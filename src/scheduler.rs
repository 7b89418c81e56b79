//! Due-reminder sweep.
//!
//! Each run scans every guild for reminders whose time has arrived,
//! delivers them, then advances recurring ones or removes one-shots.
//! Delivery failures never block schedule advancement — there is no retry
//! queue, and a dead channel must not stall subsequent sweeps.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::persist::Persister;
use crate::recurrence::advance;
use crate::store::Store;
use crate::traits::Messenger;
use crate::types::{GuildId, Reminder};

pub struct ReminderSweep {
    store: Arc<Store>,
    persister: Arc<Persister>,
    messenger: Arc<dyn Messenger>,
}

impl ReminderSweep {
    pub fn new(store: Arc<Store>, persister: Arc<Persister>, messenger: Arc<dyn Messenger>) -> Self {
        Self { store, persister, messenger }
    }

    /// One sweep pass. Due reminders are snapshotted under the lock in
    /// insertion order, delivered with the lock released, then advanced or
    /// removed by id (a reminder deleted mid-flight is simply gone:
    /// last-write-wins). The dataset is marked dirty once per touched
    /// guild, not once per reminder.
    pub async fn run_once(&self, now: DateTime<Local>) -> anyhow::Result<()> {
        let due: Vec<(GuildId, Vec<Reminder>)> = self.store.with_data(|data| {
            data.guilds
                .iter()
                .filter_map(|(guild_id, guild)| {
                    let due: Vec<Reminder> =
                        guild.reminders.iter().filter(|r| r.time <= now).cloned().collect();
                    if due.is_empty() {
                        None
                    } else {
                        Some((guild_id.clone(), due))
                    }
                })
                .collect()
        });

        for (guild_id, reminders) in due {
            debug!(guild = %guild_id, count = reminders.len(), "delivering due reminders");
            for reminder in &reminders {
                if let Err(e) = self.messenger.send_message(&reminder.channel_id, &reminder.text).await
                {
                    warn!(
                        guild = %guild_id,
                        reminder = reminder.id,
                        "reminder delivery failed: {e:#}"
                    );
                }
            }

            self.store.with_guild(&guild_id, |guild| {
                for fired in &reminders {
                    match advance(fired.time, fired.repeat) {
                        Some(next) => {
                            if let Some(r) = guild.reminders.iter_mut().find(|r| r.id == fired.id)
                            {
                                r.time = next;
                            }
                        }
                        None => {
                            guild.remove_reminder(fired.id);
                        }
                    }
                }
            });
            self.persister.mark_dirty();
        }

        Ok(())
    }
}
