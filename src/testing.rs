//! Test infrastructure: MockMessenger and a fully wired harness.
//!
//! The harness assembles the real store, persister, engine, and watchers
//! against a mock transport, suitable for tests that exercise whole flows.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::Mutex;

use crate::activity::ActivityObserver;
use crate::commands::{CommandCtx, Engine};
use crate::config::RolesConfig;
use crate::persist::Persister;
use crate::scheduler::ReminderSweep;
use crate::store::Store;
use crate::traits::{ChannelRef, Messenger, RoleRef};
use crate::types::{Reminder, Repeat};
use crate::watchers::{CurfewWatcher, IdleWatcher};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: String,
    pub content: String,
}

/// Mock transport: records outbound traffic, and can be told to fail or
/// hide specific channels.
#[derive(Default)]
pub struct MockMessenger {
    pub sent: Mutex<Vec<SentMessage>>,
    pub statuses: Mutex<Vec<String>>,
    roles: Mutex<HashMap<(String, String), RoleRef>>,
    failing_channels: Mutex<HashSet<String>>,
    hidden_channels: Mutex<HashSet<String>>,
}

impl MockMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `send_message` to this channel fail from now on.
    pub async fn fail_channel(&self, channel_id: &str) {
        self.failing_channels.lock().await.insert(channel_id.to_string());
    }

    /// Make `fetch_channel` report this channel as absent.
    pub async fn hide_channel(&self, channel_id: &str) {
        self.hidden_channels.lock().await.insert(channel_id.to_string());
    }

    pub async fn add_role(&self, guild_id: &str, name: &str, role_id: &str) {
        self.roles.lock().await.insert(
            (guild_id.to_string(), name.to_string()),
            RoleRef { id: role_id.to_string(), name: name.to_string() },
        );
    }

    pub async fn sent_to(&self, channel_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .map(|m| m.content.clone())
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        if self.failing_channels.lock().await.contains(channel_id) {
            anyhow::bail!("channel {channel_id} unreachable");
        }
        self.sent.lock().await.push(SentMessage {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn fetch_channel(&self, channel_id: &str) -> anyhow::Result<Option<ChannelRef>> {
        if self.hidden_channels.lock().await.contains(channel_id) {
            return Ok(None);
        }
        Ok(Some(ChannelRef { id: channel_id.to_string() }))
    }

    async fn resolve_role(
        &self,
        guild_id: &str,
        role_name: &str,
    ) -> anyhow::Result<Option<RoleRef>> {
        Ok(self
            .roles
            .lock()
            .await
            .get(&(guild_id.to_string(), role_name.to_string()))
            .cloned())
    }

    async fn set_status(&self, text: &str) -> anyhow::Result<()> {
        self.statuses.lock().await.push(text.to_string());
        Ok(())
    }
}

pub struct Harness {
    _dir: tempfile::TempDir,
    pub store: Arc<Store>,
    pub messenger: Arc<MockMessenger>,
    pub engine: Engine,
    pub sweep: ReminderSweep,
    pub idle: IdleWatcher,
    pub curfew: CurfewWatcher,
    pub observer: ActivityObserver,
}

impl Harness {
    pub fn data_path(&self) -> PathBuf {
        self._dir.path().join("data.json")
    }
}

/// A wired engine + watchers over a temp-dir store, a short (25 ms)
/// persistence debounce window, and default role names.
pub fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(Store::load_or_default(dir.path().join("data.json")));
    let persister = Persister::new(Arc::clone(&store), Duration::from_millis(25));
    let messenger = MockMessenger::new();
    let transport: Arc<dyn Messenger> = messenger.clone();

    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&transport),
        RolesConfig::default(),
    );
    let sweep =
        ReminderSweep::new(Arc::clone(&store), Arc::clone(&persister), Arc::clone(&transport));
    let idle = IdleWatcher::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&transport),
        chrono::Duration::minutes(30),
        chrono::Duration::minutes(30),
    );
    let curfew = CurfewWatcher::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&transport),
        "Kids".to_string(),
    );
    let observer = ActivityObserver::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&transport),
        chrono::Duration::minutes(10),
    );

    Harness { _dir: dir, store, messenger, engine, sweep, idle, curfew, observer }
}

pub fn member_ctx(guild_id: &str, channel_id: &str, user_id: &str) -> CommandCtx {
    CommandCtx {
        guild_id: guild_id.to_string(),
        channel_id: channel_id.to_string(),
        user_id: user_id.to_string(),
        is_owner: false,
    }
}

pub fn owner_ctx(guild_id: &str, channel_id: &str, user_id: &str) -> CommandCtx {
    CommandCtx { is_owner: true, ..member_ctx(guild_id, channel_id, user_id) }
}

pub fn reminder_at(
    guild_id: &str,
    channel_id: &str,
    id: u32,
    time: DateTime<Local>,
    repeat: Repeat,
) -> Reminder {
    Reminder {
        id,
        guild_id: guild_id.to_string(),
        channel_id: channel_id.to_string(),
        user_id: "u1".to_string(),
        text: format!("Reminder: #{id}"),
        time,
        repeat,
    }
}
