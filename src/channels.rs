//! Default transport: logs outbound traffic instead of talking to a chat
//! platform. A real platform integration implements [`Messenger`] and is
//! handed to [`crate::core::run`] in its place.

use async_trait::async_trait;
use tracing::info;

use crate::traits::{ChannelRef, Messenger, RoleRef};

#[derive(Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        info!(channel = %channel_id, "outbound message: {content}");
        Ok(())
    }

    async fn fetch_channel(&self, channel_id: &str) -> anyhow::Result<Option<ChannelRef>> {
        Ok(Some(ChannelRef { id: channel_id.to_string() }))
    }

    async fn resolve_role(
        &self,
        _guild_id: &str,
        _role_name: &str,
    ) -> anyhow::Result<Option<RoleRef>> {
        Ok(None)
    }

    async fn set_status(&self, text: &str) -> anyhow::Result<()> {
        info!("status: {text}");
        Ok(())
    }
}
