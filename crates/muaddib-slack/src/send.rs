use std::sync::Arc;

use slack_morphism::prelude::*;

use crate::error::SlackError;

/// Posts `text` into `channel` using the bot token session. Slack has no
/// practical per-message length limit worth chunking against at this scale.
pub async fn post_message(
    client: &Arc<SlackHyperClient>,
    token: &SlackApiToken,
    channel: &SlackChannelId,
    text: &str,
) -> Result<(), SlackError> {
    let session = client.open_session(token);
    let request = SlackApiChatPostMessageRequest::new(
        channel.clone(),
        SlackMessageContent::new().with_text(text.to_string()),
    );
    session
        .chat_post_message(&request)
        .await
        .map_err(|e| SlackError::Client(e.to_string()))?;
    Ok(())
}
