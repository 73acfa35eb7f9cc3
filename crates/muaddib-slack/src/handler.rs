use std::sync::Arc;

use async_trait::async_trait;
use slack_morphism::prelude::*;
use tracing::Instrument;

use muaddib_agent::{AgentError, ReplySender, RoomMessage};

use crate::context::SlackAppContext;
use crate::send::post_message;

/// Dispatches one incoming Slack push event to the message pipeline.
/// Bound as the socket-mode listener's push-event callback in `adapter.rs`.
pub async fn on_push_event(
    event: SlackPushEventCallback,
    client: Arc<SlackHyperClient>,
    app: Arc<SlackAppContext>,
    bot_token: SlackApiToken,
) {
    let SlackEventCallbackBody::Message(message) = event.event else {
        return;
    };

    // Ignore our own messages and anything without plain text (edits,
    // channel-topic changes, bot messages relayed by other integrations).
    if message.subtype.is_some() || message.bot_id.is_some() {
        return;
    }
    let Some(text) = message.content.as_ref().and_then(|c| c.text.clone()) else {
        return;
    };
    let Some(channel) = message.origin.channel.clone() else {
        return;
    };
    let Some(sender) = message.sender.user.clone() else {
        return;
    };

    let room_message = RoomMessage {
        server_tag: "slack".to_string(),
        channel_name: channel.to_string(),
        nick: sender.to_string(),
        mynick: app.mynick.clone(),
        content: text,
        platform_id: message.origin.ts.clone().map(|ts| ts.to_string()),
        thread_id: message.origin.thread_ts.clone().map(|ts| ts.to_string()),
        thread_starter_id: None,
        secrets: Default::default(),
    };

    let reply = SlackReplySender { client, token: bot_token, channel };
    let span = muaddib_core::logging::arc_span(&room_message.arc(), &room_message.nick, &room_message.content);

    tokio::spawn(
        async move {
            app.handler.handle(room_message, &reply).await;
        }
        .instrument(span),
    );
}

struct SlackReplySender {
    client: Arc<SlackHyperClient>,
    token: SlackApiToken,
    channel: SlackChannelId,
}

#[async_trait]
impl ReplySender for SlackReplySender {
    async fn send(&self, text: &str) -> Result<(), AgentError> {
        post_message(&self.client, &self.token, &self.channel, text)
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))
    }
}
