use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::types::{ChannelId, GuildId, UserId};

/// A channel known to the messaging platform.
#[derive(Debug, Clone)]
pub struct ChannelRef {
    pub id: ChannelId,
}

/// A mentionable platform role.
#[derive(Debug, Clone)]
pub struct RoleRef {
    pub id: String,
    pub name: String,
}

/// One observed chat message, as delivered by the platform glue. Only used
/// to advance the idle-detection cursors and the keyword responders.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

/// The messaging transport boundary. The engine never assumes delivery
/// succeeds: watchers mutate state first and treat transport failures as
/// logged, non-fatal events.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()>;

    async fn fetch_channel(&self, channel_id: &str) -> anyhow::Result<Option<ChannelRef>>;

    async fn resolve_role(&self, guild_id: &str, role_name: &str)
        -> anyhow::Result<Option<RoleRef>>;

    /// Update the bot's presence line. Best-effort.
    async fn set_status(&self, text: &str) -> anyhow::Result<()>;
}
