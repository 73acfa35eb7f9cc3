use std::sync::{Arc, OnceLock};

use async_trait::async_trait as muaddib_async_trait;
use serenity::async_trait;
use serenity::model::channel::{ChannelType, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, UserId};
use serenity::prelude::{Context, EventHandler};
use tracing::{info, Instrument};

use muaddib_agent::{ReplySender, RoomMessage};
use muaddib_core::config::DiscordConfig;

use crate::context::DiscordAppContext;
use crate::send::send_chunked;

/// Serenity event handler wired to the message pipeline. One instance per
/// serenity `Client`; rebuilt on every gateway reconnect by `DiscordAdapter`.
pub struct DiscordHandler {
    pub ctx: Arc<DiscordAppContext>,
    pub config: DiscordConfig,
    pub bot_id: OnceLock<UserId>,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        info!(name = %ready.user.name, "Discord bot connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let is_guild = msg.guild_id.is_some();

        if is_guild && self.config.require_mention {
            let Some(bot_id) = self.bot_id.get() else {
                return;
            };
            if !msg.mentions_user_id(*bot_id) {
                return;
            }
        }

        let content = strip_mention(&msg.content).trim().to_string();
        if content.is_empty() {
            return;
        }

        let thread_id = is_thread(&ctx, &msg).then(|| msg.channel_id.to_string());

        let room_message = RoomMessage {
            server_tag: "discord".to_string(),
            channel_name: msg.channel_id.to_string(),
            nick: msg.author.name.clone(),
            mynick: self.ctx.mynick.clone(),
            content,
            platform_id: Some(msg.id.to_string()),
            thread_id,
            thread_starter_id: None,
            secrets: Default::default(),
        };

        let _ = msg.channel_id.broadcast_typing(&ctx.http).await;

        let handler = Arc::clone(&self.ctx.handler);
        let reply = SerenityReplySender { http: Arc::clone(&ctx.http), channel_id: msg.channel_id };
        let span = muaddib_core::logging::arc_span(&room_message.arc(), &room_message.nick, &room_message.content);

        tokio::spawn(
            async move {
                handler.handle(room_message, &reply).await;
            }
            .instrument(span),
        );
    }
}

/// Remove an @mention prefix (e.g. `<@123456789>`) from a message.
fn strip_mention(s: &str) -> &str {
    let trimmed = s.trim_start();
    if trimmed.starts_with("<@") {
        if let Some(end) = trimmed.find('>') {
            return trimmed[end + 1..].trim_start();
        }
    }
    trimmed
}

fn is_thread(ctx: &Context, msg: &Message) -> bool {
    msg.guild_id
        .and_then(|gid| ctx.cache.guild(gid))
        .and_then(|guild| guild.channels.get(&msg.channel_id).cloned())
        .map(|ch| {
            matches!(
                ch.kind,
                ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
            )
        })
        .unwrap_or(false)
}

/// Sends the handler's final reply text back into the originating channel,
/// chunked under Discord's message-length limit.
struct SerenityReplySender {
    http: Arc<serenity::http::Http>,
    channel_id: ChannelId,
}

#[muaddib_async_trait]
impl ReplySender for SerenityReplySender {
    async fn send(&self, text: &str) -> Result<(), muaddib_agent::AgentError> {
        send_chunked(&self.http, self.channel_id, text)
            .await
            .map_err(|e| muaddib_agent::AgentError::Transport(e.to_string()))
    }
}
