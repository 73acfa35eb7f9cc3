use std::sync::Arc;

use async_trait::async_trait;
use muaddib_agent::{AgentError, ReplySender, RoomMessage};
use tracing::Instrument;

use crate::context::IrcAppContext;
use crate::proto::{self, Line};
use crate::send::IrcWriter;

/// Dispatches one parsed `PRIVMSG` line to the message pipeline. Channel and
/// private-message targets are both routed here; IRC has no separate DM
/// transport, a private message just targets our own nick instead of a
/// channel name.
pub async fn on_privmsg(line: &Line, server_tag: &str, ctx: &Arc<IrcAppContext>, writer: &Arc<IrcWriter>) {
    let Some(nick) = line.prefix_nick() else { return };
    let [target, text] = &line.params[..] else { return };

    let mynick = ctx.current_nick().await;
    if nick == mynick {
        return;
    }

    // A private message targets our own nick; replies there go back to the
    // sender's nick rather than to a channel.
    let reply_target = if target.eq_ignore_ascii_case(&mynick) { nick.to_string() } else { target.clone() };

    let room_message = RoomMessage {
        server_tag: server_tag.to_string(),
        channel_name: reply_target.clone(),
        nick: nick.to_string(),
        mynick,
        content: text.clone(),
        platform_id: None,
        thread_id: None,
        thread_starter_id: None,
        secrets: Default::default(),
    };

    let reply = IrcReplySender { writer: Arc::clone(writer), target: reply_target };
    let handler = Arc::clone(&ctx.handler);
    let span = muaddib_core::logging::arc_span(&room_message.arc(), &room_message.nick, &room_message.content);

    tokio::spawn(
        async move {
            handler.handle(room_message, &reply).await;
        }
        .instrument(span),
    );
}

struct IrcReplySender {
    writer: Arc<IrcWriter>,
    target: String,
}

#[async_trait]
impl ReplySender for IrcReplySender {
    async fn send(&self, text: &str) -> Result<(), AgentError> {
        // Most IRC networks cap a full line around 512 bytes including the
        // command and target; chop long replies into chunks the server will
        // actually relay rather than silently truncating them.
        for chunk in chunk_for_irc(text, 420) {
            self.writer
                .write_raw(&proto::privmsg(&self.target, &chunk))
                .await
                .map_err(|e| AgentError::Transport(e.to_string()))?;
        }
        Ok(())
    }
}

fn chunk_for_irc(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }
    text.chars()
        .collect::<Vec<_>>()
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk_for_irc("hello", 420), vec!["hello".to_string()]);
    }

    #[test]
    fn long_text_splits_on_char_boundary() {
        let text = "a".repeat(1000);
        let chunks = chunk_for_irc(&text, 420);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 420);
        assert_eq!(chunks[2].len(), 160);
    }
}
